//! Distance bands with boundary hysteresis.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Near,
    Medium,
    Far,
    #[default]
    Away,
}

impl Zone {
    pub fn label(self) -> &'static str {
        match self {
            Zone::Near => "near",
            Zone::Medium => "medium",
            Zone::Far => "far",
            Zone::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneThresholds {
    pub near_cm: u32,
    pub medium_cm: u32,
    pub max_cm: u32,
}

impl ZoneThresholds {
    /// Raw band for a distance, before hysteresis.
    pub fn band(&self, distance_cm: Option<u32>) -> Zone {
        match distance_cm {
            Some(d) if d == 0 || d > self.max_cm => Zone::Away,
            Some(d) if d < self.near_cm => Zone::Near,
            Some(d) if d < self.medium_cm => Zone::Medium,
            Some(_) => Zone::Far,
            None => Zone::Away,
        }
    }

    pub fn in_range(&self, distance_cm: u32) -> bool {
        distance_cm > 0 && distance_cm <= self.max_cm
    }
}

/// Commits zone changes. Any new band, adjacent or not, must be seen again
/// in a later poll cycle before it sticks. The first reading after start-up
/// or signal loss has no committed band to cross and commits at once.
#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    thresholds: ZoneThresholds,
    committed: Zone,
    pending: Option<(Zone, u64)>,
    last_non_away: Option<Zone>,
    settled: bool,
}

impl ZoneClassifier {
    pub fn new(thresholds: ZoneThresholds) -> Self {
        Self {
            thresholds,
            committed: Zone::Away,
            pending: None,
            last_non_away: None,
            settled: false,
        }
    }

    pub fn thresholds(&self) -> &ZoneThresholds {
        &self.thresholds
    }

    pub fn zone(&self) -> Zone {
        self.committed
    }

    pub fn last_non_away(&self) -> Option<Zone> {
        self.last_non_away
    }

    /// Fold one distance observed during poll cycle `cycle` and return the
    /// committed zone.
    pub fn observe(&mut self, distance_cm: Option<u32>, cycle: u64) -> Zone {
        let candidate = self.thresholds.band(distance_cm);
        if !self.settled {
            self.settled = true;
            self.commit(candidate);
            return self.committed;
        }
        if candidate == self.committed {
            self.pending = None;
            return self.committed;
        }
        match self.pending {
            Some((zone, first_cycle)) if zone == candidate => {
                if cycle > first_cycle {
                    self.commit(candidate);
                }
            }
            _ => self.pending = Some((candidate, cycle)),
        }
        self.committed
    }

    /// Signal loss: drop to away without waiting.
    pub fn force_away(&mut self) {
        self.commit(Zone::Away);
        self.settled = false;
    }

    /// Commit the band for `distance_cm` directly. Used for simulated
    /// overrides, which are not noisy readings.
    pub fn assign(&mut self, distance_cm: Option<u32>) -> Zone {
        let zone = self.thresholds.band(distance_cm);
        self.settled = true;
        self.commit(zone);
        zone
    }

    fn commit(&mut self, zone: Zone) {
        if zone != self.committed {
            tracing::debug!(from = self.committed.label(), to = zone.label(), "zone change");
        }
        self.committed = zone;
        self.pending = None;
        if zone != Zone::Away {
            self.last_non_away = Some(zone);
        }
    }
}
