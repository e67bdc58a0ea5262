//! Presence state folded from readings, edge levels and poll ticks.
//!
//! The tracker is plain data behind the engine's state lock: every method is
//! a short, non-blocking mutation and time always comes in as an argument.

use super::decoder::DecoderStats;
use super::frame::{MotionType, Reading};
use super::hybrid::{reconcile, EdgeStatus, UartView};
use super::posture::PostureMonitor;
use super::zone::{Zone, ZoneClassifier, ZoneThresholds};
use super::PresenceState;
use crate::config::PresenceConfig;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

pub const MOCK_DISTANCE_CM: u32 = 75;
const GATE_COUNT: usize = 16;

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    classifier: ZoneClassifier,
    posture: PostureMonitor,
    offline_timeout: Duration,
    edge: EdgeStatus,
    online: bool,
    mock: bool,
    cycle: u64,
    last_frame_at: Option<Instant>,
    last_seen: DateTime<Utc>,
    distance_cm: Option<u32>,
    motion_type: MotionType,
    gate_energies: Option<Vec<u16>>,
    debug_mode: bool,
    decoder_stats: DecoderStats,
}

impl PresenceTracker {
    pub fn new(config: &PresenceConfig, wall: DateTime<Utc>) -> Self {
        Self {
            classifier: ZoneClassifier::new(ZoneThresholds {
                near_cm: config.zone_near_cm,
                medium_cm: config.zone_medium_cm,
                max_cm: config.max_presence_cm,
            }),
            posture: PostureMonitor::new(config.posture_threshold),
            offline_timeout: config.offline_timeout,
            edge: EdgeStatus::default(),
            online: false,
            mock: false,
            cycle: 0,
            last_frame_at: None,
            last_seen: wall,
            distance_cm: None,
            motion_type: MotionType::None,
            gate_energies: None,
            debug_mode: false,
            decoder_stats: DecoderStats::default(),
        }
    }

    /// Simulated sensor: always online, person seated at the default distance.
    pub fn new_mock(config: &PresenceConfig, now: Instant, wall: DateTime<Utc>) -> Self {
        let mut tracker = Self::new(config, wall);
        tracker.mock = true;
        tracker.online = true;
        tracker.set_mock_presence(true, now, wall);
        tracker
    }

    pub fn is_mock(&self) -> bool {
        self.mock
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn set_edge_available(&mut self, available: bool) {
        self.edge.available = available;
    }

    /// Start of a poll cycle. Readings folded afterwards belong to it.
    pub fn begin_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.cycle
    }

    pub fn fold_reading(&mut self, reading: Reading, wall: DateTime<Utc>) {
        let now = reading.timestamp;
        if !self.online {
            tracing::info!(source = reading.protocol_source.label(), "presence sensor online");
        }
        self.online = true;
        self.last_frame_at = Some(now);

        let thresholds = *self.classifier.thresholds();
        let distance = reading.distance_cm.filter(|d| thresholds.in_range(*d));
        self.classifier.observe(distance, self.cycle);
        self.distance_cm = distance;
        self.motion_type = if distance.is_some() {
            reading.motion_type
        } else {
            MotionType::None
        };
        if self.debug_mode && reading.gate_energies.is_some() {
            self.gate_energies = reading.gate_energies;
        }
        if distance.is_some() {
            self.touch(wall);
        }
        self.posture.update(self.effective_zone(), now);
    }

    /// End-of-cycle housekeeping: offline detection and the posture clock.
    pub fn finish_cycle(&mut self, now: Instant) {
        if !self.mock && self.online {
            let stale = self
                .last_frame_at
                .map_or(true, |at| now.saturating_duration_since(at) >= self.offline_timeout);
            if stale {
                tracing::warn!(
                    timeout_ms = self.offline_timeout.as_millis() as u64,
                    "no sensor frames; marking offline"
                );
                self.go_offline();
            }
        }
        self.posture.update(self.effective_zone(), now);
    }

    fn go_offline(&mut self) {
        self.online = false;
        self.classifier.force_away();
        self.distance_cm = None;
        self.motion_type = MotionType::None;
    }

    pub fn fold_edge(&mut self, level: bool, now: Instant, wall: DateTime<Utc>) {
        if self.edge.present != level {
            tracing::debug!(level, "presence line changed");
        }
        self.edge.present = level;
        if level && self.edge.available {
            self.touch(wall);
        }
        self.posture.update(self.effective_zone(), now);
    }

    pub fn set_mock_presence(&mut self, present: bool, now: Instant, wall: DateTime<Utc>) {
        if !self.mock {
            return;
        }
        self.edge.present = present;
        let reading = Reading {
            timestamp: now,
            distance_cm: present.then_some(MOCK_DISTANCE_CM),
            motion_type: MotionType::Stationary,
            gate_energies: None,
            protocol_source: super::frame::ProtocolSource::Ascii,
        };
        self.classifier.assign(reading.distance_cm);
        self.fold_reading(reading, wall);
    }

    pub fn set_debug_mode(&mut self, enable: bool, seed: u64) {
        self.debug_mode = enable;
        self.gate_energies = match (enable, self.mock) {
            (true, true) => Some(synthetic_gate_energies(seed)),
            (true, false) => self.gate_energies.take(),
            (false, _) => None,
        };
    }

    pub fn dismiss_posture(&mut self, now: Instant) -> bool {
        self.posture.dismiss(now)
    }

    pub fn set_decoder_stats(&mut self, stats: DecoderStats) {
        self.decoder_stats = stats;
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder_stats
    }

    fn touch(&mut self, wall: DateTime<Utc>) {
        if wall > self.last_seen {
            self.last_seen = wall;
        }
    }

    fn reconciled(&self) -> super::hybrid::Reconciled {
        reconcile(
            &UartView {
                online: self.online,
                zone: self.classifier.zone(),
                distance_cm: self.distance_cm,
                last_non_away: self.classifier.last_non_away(),
            },
            self.edge,
        )
    }

    /// Zone as published; posture follows this, not the raw serial band.
    fn effective_zone(&self) -> Zone {
        self.reconciled().zone
    }

    pub fn snapshot(&self, now: Instant) -> PresenceState {
        let merged = self.reconciled();
        PresenceState {
            is_present: merged.is_present,
            distance_cm: merged.distance_cm,
            zone: merged.zone,
            last_seen: self.last_seen,
            sensor_online: self.online,
            mock: self.mock,
            motion_type: if merged.distance_cm.is_some() {
                self.motion_type
            } else {
                MotionType::None
            },
            gpio_available: self.edge.available,
            gpio_present: self.edge.present,
            posture_alert: self.posture.alert(),
            too_close_duration: self.posture.too_close_duration(now),
            debug_mode: self.debug_mode,
            gate_energies: if self.debug_mode {
                self.gate_energies.clone()
            } else {
                None
            },
        }
    }
}

/// Plausible engineering-mode energies for the simulated sensor.
fn synthetic_gate_energies(seed: u64) -> Vec<u16> {
    let mut state = seed | 1;
    (0..GATE_COUNT)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 501) as u16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::frame::ProtocolSource;

    fn config() -> PresenceConfig {
        PresenceConfig {
            offline_timeout: Duration::from_secs(3),
            posture_threshold: Duration::from_secs(300),
            ..PresenceConfig::default()
        }
    }

    fn reading(at: Instant, distance: Option<u32>) -> Reading {
        Reading {
            timestamp: at,
            distance_cm: distance,
            motion_type: MotionType::Moving,
            gate_energies: None,
            protocol_source: ProtocolSource::Binary,
        }
    }

    #[test]
    fn starts_offline_and_away() {
        let tracker = PresenceTracker::new(&config(), Utc::now());
        let state = tracker.snapshot(Instant::now());
        assert!(!state.sensor_online);
        assert_eq!(state.zone, Zone::Away);
        assert!(!state.is_present);
    }

    #[test]
    fn reading_brings_sensor_online_with_zone() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        tracker.begin_cycle();
        tracker.fold_reading(reading(t0, Some(80)), Utc::now());
        let state = tracker.snapshot(t0);
        assert!(state.sensor_online);
        assert!(state.is_present);
        assert_eq!(state.zone, Zone::Medium);
        assert_eq!(state.distance_cm, Some(80));
        assert_eq!(state.motion_type, MotionType::Moving);
    }

    #[test]
    fn beyond_max_distance_is_not_presence() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        tracker.begin_cycle();
        tracker.fold_reading(reading(t0, Some(300)), Utc::now());
        let state = tracker.snapshot(t0);
        assert!(state.sensor_online);
        assert!(!state.is_present);
        assert_eq!(state.distance_cm, None);
    }

    #[test]
    fn silence_past_timeout_goes_offline_and_away() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        tracker.begin_cycle();
        tracker.fold_reading(reading(t0, Some(30)), Utc::now());
        tracker.finish_cycle(t0 + Duration::from_millis(2900));
        assert!(tracker.snapshot(t0).sensor_online);

        tracker.finish_cycle(t0 + Duration::from_secs(3));
        let state = tracker.snapshot(t0 + Duration::from_secs(3));
        assert!(!state.sensor_online);
        assert_eq!(state.zone, Zone::Away);
        assert!(!state.is_present);
        assert_eq!(state.distance_cm, None);
        assert_eq!(state.too_close_duration, None);
    }

    #[test]
    fn recovers_online_on_next_frame() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        tracker.begin_cycle();
        tracker.fold_reading(reading(t0, Some(30)), Utc::now());
        tracker.finish_cycle(t0 + Duration::from_secs(4));
        tracker.begin_cycle();
        tracker.fold_reading(reading(t0 + Duration::from_secs(5), Some(30)), Utc::now());
        let state = tracker.snapshot(t0 + Duration::from_secs(5));
        assert!(state.sensor_online);
        assert_eq!(state.zone, Zone::Near);
    }

    #[test]
    fn posture_alert_fires_from_poll_ticks() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        let mut now = t0;
        while now <= t0 + Duration::from_secs(301) {
            tracker.begin_cycle();
            tracker.fold_reading(reading(now, Some(30)), Utc::now());
            tracker.finish_cycle(now);
            now += Duration::from_secs(1);
        }
        let state = tracker.snapshot(now);
        assert!(state.posture_alert);

        assert!(tracker.dismiss_posture(now));
        let state = tracker.snapshot(now);
        assert!(!state.posture_alert);
        assert!(state.too_close_duration.unwrap() >= Duration::from_secs(300));
    }

    #[test]
    fn one_frame_dropout_keeps_posture_timer() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        let mut now = t0;
        while now <= t0 + Duration::from_secs(298) {
            tracker.begin_cycle();
            tracker.fold_reading(reading(now, Some(30)), Utc::now());
            tracker.finish_cycle(now);
            now += Duration::from_secs(1);
        }
        let before = tracker.snapshot(now).too_close_duration.unwrap();
        assert!(before >= Duration::from_secs(298));

        tracker.begin_cycle();
        tracker.fold_reading(reading(now, None), Utc::now());
        tracker.finish_cycle(now);
        let state = tracker.snapshot(now);
        assert_eq!(state.zone, Zone::Near);
        assert!(state.too_close_duration.unwrap() >= before);

        while now <= t0 + Duration::from_secs(301) {
            now += Duration::from_secs(1);
            tracker.begin_cycle();
            tracker.fold_reading(reading(now, Some(30)), Utc::now());
            tracker.finish_cycle(now);
        }
        assert!(tracker.snapshot(now).posture_alert);
    }

    #[test]
    fn last_seen_never_moves_backwards() {
        let t0 = Instant::now();
        let later = Utc::now();
        let earlier = later - chrono::Duration::seconds(10);
        let mut tracker = PresenceTracker::new(&config(), earlier);
        tracker.begin_cycle();
        tracker.fold_reading(reading(t0, Some(60)), later);
        tracker.fold_reading(reading(t0, Some(60)), earlier);
        assert_eq!(tracker.snapshot(t0).last_seen, later);
    }

    #[test]
    fn edge_keeps_presence_while_uart_lags() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        tracker.set_edge_available(true);
        tracker.begin_cycle();
        tracker.fold_reading(reading(t0, Some(120)), Utc::now());
        assert_eq!(tracker.snapshot(t0).zone, Zone::Far);
        tracker.fold_edge(true, t0, Utc::now());
        // far -> away only commits once the dropout spans a second cycle.
        for _ in 0..2 {
            tracker.begin_cycle();
            tracker.fold_reading(reading(t0, None), Utc::now());
        }

        let state = tracker.snapshot(t0);
        assert!(state.is_present);
        assert_eq!(state.zone, Zone::Far);
        assert_eq!(state.distance_cm, None);
        assert!(state.gpio_present);
    }

    #[test]
    fn mock_presence_override_folds_through_classifier() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new_mock(&config(), t0, Utc::now());
        let state = tracker.snapshot(t0);
        assert!(state.mock);
        assert!(state.sensor_online);
        assert_eq!(state.distance_cm, Some(MOCK_DISTANCE_CM));
        assert_eq!(state.zone, Zone::Medium);
        assert_eq!(state.motion_type, MotionType::Stationary);

        tracker.set_mock_presence(false, t0, Utc::now());
        let state = tracker.snapshot(t0);
        assert!(!state.is_present);
        assert_eq!(state.zone, Zone::Away);
        assert!(!state.gpio_present);

        tracker.finish_cycle(t0 + Duration::from_secs(60));
        assert!(tracker.snapshot(t0).sensor_online);
    }

    #[test]
    fn mock_override_is_ignored_for_real_sensor() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        tracker.set_mock_presence(true, t0, Utc::now());
        assert!(!tracker.snapshot(t0).is_present);
    }

    #[test]
    fn debug_mode_exposes_gate_energies() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new_mock(&config(), t0, Utc::now());
        assert_eq!(tracker.snapshot(t0).gate_energies, None);
        tracker.set_debug_mode(true, 42);
        let energies = tracker.snapshot(t0).gate_energies.unwrap();
        assert_eq!(energies.len(), 16);
        assert!(energies.iter().all(|e| *e <= 500));
        tracker.set_debug_mode(false, 0);
        assert_eq!(tracker.snapshot(t0).gate_energies, None);
    }

    #[test]
    fn real_sensor_gate_energies_only_kept_in_debug_mode() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(&config(), Utc::now());
        let mut with_gates = reading(t0, Some(40));
        with_gates.gate_energies = Some(vec![5; 16]);
        tracker.begin_cycle();
        tracker.fold_reading(with_gates.clone(), Utc::now());
        assert_eq!(tracker.snapshot(t0).gate_energies, None);

        tracker.set_debug_mode(true, 0);
        tracker.fold_reading(with_gates, Utc::now());
        assert_eq!(tracker.snapshot(t0).gate_energies, Some(vec![5; 16]));
    }
}
