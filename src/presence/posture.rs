//! Sustained "too close" tracking.

use super::zone::Zone;
use std::time::{Duration, Instant};

/// Counts continuous near-zone time and raises an alert once it crosses the
/// threshold. Dismissing re-arms the alert at the dismiss instant without
/// touching the near-zone timer; leaving the near zone resets everything.
#[derive(Debug, Clone)]
pub struct PostureMonitor {
    threshold: Duration,
    near_since: Option<Instant>,
    armed_at: Option<Instant>,
    alert: bool,
}

impl PostureMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            near_since: None,
            armed_at: None,
            alert: false,
        }
    }

    pub fn alert(&self) -> bool {
        self.alert
    }

    pub fn too_close_duration(&self, now: Instant) -> Option<Duration> {
        self.near_since
            .map(|since| now.saturating_duration_since(since))
    }

    /// Returns true when this call raised the alert.
    pub fn update(&mut self, zone: Zone, now: Instant) -> bool {
        if zone != Zone::Near {
            if self.alert {
                tracing::info!("posture alert cleared; left near zone");
            }
            self.near_since = None;
            self.armed_at = None;
            self.alert = false;
            return false;
        }

        self.near_since.get_or_insert(now);
        let armed_at = *self.armed_at.get_or_insert(now);
        if !self.alert && now.saturating_duration_since(armed_at) >= self.threshold {
            self.alert = true;
            tracing::warn!(
                near_secs = self.too_close_duration(now).map(|d| d.as_secs()).unwrap_or(0),
                "posture alert raised"
            );
            return true;
        }
        false
    }

    /// Returns whether an alert was active.
    pub fn dismiss(&mut self, now: Instant) -> bool {
        let was_active = self.alert;
        self.alert = false;
        if self.near_since.is_some() {
            self.armed_at = Some(now);
        }
        was_active
    }
}
