//! Presence engine: radar serial stream + digital presence line.
//!
//! Two worker threads feed a [`PresenceTracker`] held behind a short-lived
//! lock. The poll thread owns the serial port, decodes frames, runs the
//! offline check and the posture clock at a fixed cadence, and executes
//! queued sensor commands. The edge thread samples the GPIO line. Callers
//! only ever receive owned [`PresenceState`] snapshots.

pub mod decoder;
pub mod frame;
pub mod gpio;
pub mod hybrid;
pub mod posture;
pub mod serial;
pub mod tracker;
pub mod zone;

use crate::config::PresenceConfig;
use crate::shared::SharedState;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use decoder::{DecoderStats, FrameDecoder};
use frame::MotionType;
use gpio::EdgeSource;
use serial::{SensorCommand, SensorLink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracker::PresenceTracker;
use zone::Zone;

pub use decoder::{BinaryLayout, HmmdLayout};

/// Immutable copy of the published presence state.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceState {
    pub is_present: bool,
    pub distance_cm: Option<u32>,
    pub zone: Zone,
    pub last_seen: DateTime<Utc>,
    pub sensor_online: bool,
    pub mock: bool,
    pub motion_type: MotionType,
    pub gpio_available: bool,
    pub gpio_present: bool,
    pub posture_alert: bool,
    pub too_close_duration: Option<Duration>,
    pub debug_mode: bool,
    pub gate_energies: Option<Vec<u16>>,
}

struct DebugRequest {
    enable: bool,
    reply: Sender<bool>,
}

const READ_CHUNK: usize = 256;
const COMMAND_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

pub struct PresenceEngine {
    state: Arc<SharedState<PresenceTracker>>,
    commands: Sender<DebugRequest>,
    stop: Arc<AtomicBool>,
    workers: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    has_sensor: bool,
}

impl PresenceEngine {
    /// Spawn the worker threads. Without a sensor link the engine runs the
    /// simulated sensor for the whole process lifetime.
    pub fn start(
        config: PresenceConfig,
        sensor: Option<Box<dyn SensorLink>>,
        edge: Option<Box<dyn EdgeSource>>,
    ) -> Self {
        let now = Instant::now();
        let has_sensor = sensor.is_some();
        let mut tracker = if has_sensor {
            PresenceTracker::new(&config, Utc::now())
        } else {
            PresenceTracker::new_mock(&config, now, Utc::now())
        };
        tracker.set_edge_available(edge.is_some() && has_sensor);

        let state = Arc::new(SharedState::new("presence_state", tracker));
        let stop = Arc::new(AtomicBool::new(false));
        let (commands, command_rx) = bounded(4);
        let mut workers = Vec::new();

        let poll = PollLoop {
            state: Arc::clone(&state),
            stop: Arc::clone(&stop),
            commands: command_rx,
            period: config.poll_period,
        };
        let handle = thread::Builder::new()
            .name("presence-poll".into())
            .spawn(move || poll.run(sensor));
        match handle {
            Ok(handle) => workers.push(("presence-poll", handle)),
            Err(err) => tracing::error!(error = %err, "failed to spawn presence poll thread"),
        }

        // The edge line only means something next to a real radar.
        if let (Some(edge), true) = (edge, has_sensor) {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            let period = config.edge_poll_period;
            let handle = thread::Builder::new()
                .name("presence-edge".into())
                .spawn(move || run_edge_loop(state, edge, stop, period));
            match handle {
                Ok(handle) => workers.push(("presence-edge", handle)),
                Err(err) => tracing::error!(error = %err, "failed to spawn presence edge thread"),
            }
        }

        tracing::info!(mock = !has_sensor, workers = workers.len(), "presence engine started");
        Self {
            state,
            commands,
            stop,
            workers: Mutex::new(workers),
            has_sensor,
        }
    }

    pub fn is_mock(&self) -> bool {
        !self.has_sensor
    }

    pub fn snapshot(&self) -> PresenceState {
        let now = Instant::now();
        self.state.read(|tracker| tracker.snapshot(now))
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.state.read(PresenceTracker::decoder_stats)
    }

    /// Force the simulated presence value. Returns false (and changes
    /// nothing) when a real sensor is attached.
    pub fn set_mock_presence(&self, present: bool) -> bool {
        if self.has_sensor {
            return false;
        }
        let now = Instant::now();
        self.state
            .update(|tracker| tracker.set_mock_presence(present, now, Utc::now()));
        true
    }

    /// Toggle engineering mode. Blocks until the poll thread has written the
    /// command (or a one second timeout); call from a blocking context.
    pub fn set_debug_mode(&self, enable: bool) -> bool {
        if !self.has_sensor {
            let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
            self.state.update(|tracker| tracker.set_debug_mode(enable, seed));
            tracing::info!(enable, "debug mode toggled on simulated sensor");
            return true;
        }
        let (reply, reply_rx) = bounded(1);
        if self.commands.try_send(DebugRequest { enable, reply }).is_err() {
            tracing::warn!("sensor command queue full or closed");
            return false;
        }
        reply_rx.recv_timeout(COMMAND_REPLY_TIMEOUT).unwrap_or(false)
    }

    /// Clear the posture alert. Returns whether one was active.
    pub fn dismiss_posture(&self) -> bool {
        let now = Instant::now();
        let was_active = self.state.update(|tracker| tracker.dismiss_posture(now));
        if was_active {
            tracing::info!("posture alert dismissed");
        }
        was_active
    }

    /// Stop and join the workers. Each join failure is logged on its own.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let workers = std::mem::take(&mut *crate::lock_or_recover(&self.workers, "presence_workers"));
        for (name, handle) in workers {
            if handle.join().is_err() {
                tracing::error!(worker = name, "presence worker panicked during shutdown");
            }
        }
        tracing::info!("presence engine stopped");
    }
}

impl Drop for PresenceEngine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

struct PollLoop {
    state: Arc<SharedState<PresenceTracker>>,
    stop: Arc<AtomicBool>,
    commands: Receiver<DebugRequest>,
    period: Duration,
}

impl PollLoop {
    fn run(self, mut sensor: Option<Box<dyn SensorLink>>) {
        if let Some(link) = sensor.as_ref() {
            tracing::info!(link = %link.describe(), "polling presence sensor");
        }
        let mut decoder = FrameDecoder::default();
        let mut buf = [0u8; READ_CHUNK];
        let mut read_failing = false;

        while !self.stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            if let Some(link) = sensor.as_mut() {
                self.run_commands(link.as_mut());
                let readings = match link.read_available(&mut buf) {
                    Ok(n) => {
                        if read_failing {
                            tracing::info!("serial reads recovered");
                            read_failing = false;
                        }
                        decoder.push(&buf[..n]);
                        decoder.drain().collect::<Vec<_>>()
                    }
                    Err(err) => {
                        if !read_failing {
                            tracing::warn!(error = %err, "serial read failed");
                            read_failing = true;
                        }
                        Vec::new()
                    }
                };
                let stats = decoder.stats();
                let debug_mode = self.fold(readings, stats, started);
                if debug_mode {
                    tracing::debug!(
                        frames = stats.frames_decoded,
                        corrupt = stats.corrupt_frames,
                        discarded = stats.discarded_bytes,
                        "decoder stats"
                    );
                }
            } else {
                self.state.update(|tracker| {
                    tracker.begin_cycle();
                    tracker.finish_cycle(started);
                });
            }

            if let Some(rest) = self.period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    fn fold(&self, readings: Vec<frame::Reading>, stats: DecoderStats, now: Instant) -> bool {
        self.state.update(|tracker| {
            tracker.begin_cycle();
            let verbose = tracker.debug_mode();
            for reading in readings {
                if verbose {
                    tracing::debug!(
                        source = reading.protocol_source.label(),
                        distance = ?reading.distance_cm,
                        motion = reading.motion_type.label(),
                        "frame"
                    );
                } else {
                    tracing::trace!(distance = ?reading.distance_cm, "frame");
                }
                tracker.fold_reading(reading, Utc::now());
            }
            tracker.set_decoder_stats(stats);
            tracker.finish_cycle(now);
            verbose
        })
    }

    fn run_commands(&self, link: &mut dyn SensorLink) {
        while let Ok(request) = self.commands.try_recv() {
            let command = SensorCommand::for_debug(request.enable);
            let ok = match link.write_command(command) {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(error = %err, ?command, "sensor command failed");
                    false
                }
            };
            if ok {
                self.state
                    .update(|tracker| tracker.set_debug_mode(request.enable, 0));
                tracing::info!(enable = request.enable, "sensor debug mode toggled");
            }
            let _ = request.reply.send(ok);
        }
    }
}

fn run_edge_loop(
    state: Arc<SharedState<PresenceTracker>>,
    mut edge: Box<dyn EdgeSource>,
    stop: Arc<AtomicBool>,
    period: Duration,
) {
    let mut last: Option<bool> = None;
    let mut failing = false;
    while !stop.load(Ordering::Relaxed) {
        match edge.level() {
            Ok(level) => {
                failing = false;
                if last != Some(level) {
                    last = Some(level);
                    let now = Instant::now();
                    state.update(|tracker| tracker.fold_edge(level, now, Utc::now()));
                }
            }
            Err(err) => {
                if !failing {
                    tracing::warn!(error = %err, "presence line read failed");
                    failing = true;
                }
            }
        }
        thread::sleep(period);
    }
}
