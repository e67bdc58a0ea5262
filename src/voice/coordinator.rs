use super::cancel::CancelToken;
use super::notify::DashboardNotifier;
use super::queue::SpeakQueue;
use super::state::{RecordingMode, VoicePhase, VoiceState};
use super::transcript::TranscriptCleaner;
use super::worker::{self, Request};
use super::{Responder, VoiceError, MOCK_LISTEN_TRANSCRIPT};
use crate::audio::{AudioDevice, AudioInput};
use crate::config::{VoiceConfig, MAX_SPEAK_CHARS};
use crate::shared::SharedState;
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use crate::wake::{WakeGate, WakeWordModel};
use crossbeam_channel::{unbounded, Sender};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything the coordinator talks to, chosen by the hardware probe.
pub struct VoiceBackends {
    pub device: Arc<dyn AudioDevice>,
    pub wake: Option<Box<dyn WakeWordModel>>,
    pub stt: Option<Box<dyn SpeechToText>>,
    pub tts: Option<Box<dyn TextToSpeech>>,
    pub responder: Box<dyn Responder>,
    pub notifier: Option<DashboardNotifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub wake_word: bool,
    pub stt: bool,
    pub tts: bool,
}

/// Body of `GET /voice/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceStatus {
    #[serde(flatten)]
    pub voice: VoiceState,
    pub mock: bool,
    pub capabilities: Capabilities,
}

/// A reserved capture/speak cycle. Each one gets its own token.
#[derive(Debug, Clone)]
pub(super) struct ActiveCycle {
    pub(super) id: u64,
    pub(super) token: CancelToken,
    pub(super) mode: RecordingMode,
}

/// Everything behind the state lock.
pub(super) struct Core {
    pub(super) voice: VoiceState,
    pub(super) paused: bool,
    pub(super) cooldown_until: Option<Instant>,
    pub(super) flush: Option<Duration>,
    pub(super) cycle: Option<ActiveCycle>,
    pub(super) queue: SpeakQueue,
    next_cycle: u64,
    changes: Vec<VoicePhase>,
}

impl Core {
    fn new(config: &VoiceConfig) -> Self {
        Self {
            voice: VoiceState::new(config.tts_volume, config.wake_word_disabled),
            paused: false,
            cooldown_until: None,
            flush: None,
            cycle: None,
            queue: SpeakQueue::new(config.speak_queue),
            next_cycle: 1,
            changes: Vec::new(),
        }
    }

    /// Move along a permitted edge; anything else is logged and refused.
    pub(super) fn transition(&mut self, next: VoicePhase) -> bool {
        let from = self.voice.state;
        if from == next {
            return true;
        }
        if !from.can_transition_to(next) {
            tracing::warn!(from = from.label(), to = next.label(), "refused voice transition");
            return false;
        }
        if from == VoicePhase::Error {
            self.voice.error = None;
        }
        self.voice.state = next;
        self.changes.push(next);
        tracing::debug!(from = from.label(), to = next.label(), "voice state");
        true
    }

    /// The cycle still owns the coordinator: not superseded, not cancelled.
    pub(super) fn is_live(&self, cycle: &ActiveCycle) -> bool {
        !cycle.token.is_cancelled() && self.cycle.as_ref().is_some_and(|c| c.id == cycle.id)
    }

    pub(super) fn advance(&mut self, cycle: &ActiveCycle, next: VoicePhase) -> bool {
        self.is_live(cycle) && self.transition(next)
    }

    pub(super) fn fail(&mut self, cycle: &ActiveCycle, message: String) {
        if !self.is_live(cycle) {
            return;
        }
        tracing::error!(cycle = cycle.id, error = %message, "voice cycle failed");
        if self.transition(VoicePhase::Error) {
            self.voice.error = Some(message);
        }
    }

    pub(super) fn can_start(&self) -> bool {
        self.voice.enabled && !self.voice.state.is_busy()
    }

    /// Claim the coordinator for a new cycle starting in `first`.
    pub(super) fn reserve(
        &mut self,
        first: VoicePhase,
        mode: RecordingMode,
    ) -> Result<ActiveCycle, VoiceError> {
        if !self.voice.enabled {
            return Err(VoiceError::Disabled);
        }
        if self.voice.state.is_busy() {
            return Err(VoiceError::Busy(self.voice.state));
        }
        if self.voice.state == VoicePhase::Error {
            self.transition(VoicePhase::Idle);
        }
        if !self.transition(first) {
            return Err(VoiceError::Busy(self.voice.state));
        }
        let cycle = ActiveCycle {
            id: self.next_cycle,
            token: CancelToken::new(),
            mode,
        };
        self.next_cycle += 1;
        self.cycle = Some(cycle.clone());
        Ok(cycle)
    }

    /// Release the cycle, restart the wake cooldown and queue an input flush.
    pub(super) fn finish(&mut self, cycle: &ActiveCycle, cooldown_until: Instant, flush: Option<Duration>) {
        if self.is_live(cycle) && self.voice.state.is_busy() {
            self.transition(VoicePhase::Idle);
        }
        if self.cycle.as_ref().is_some_and(|c| c.id == cycle.id) {
            self.cycle = None;
        }
        self.cooldown_until = Some(cooldown_until);
        if let Some(flush) = flush {
            self.flush = Some(self.flush.map_or(flush, |pending| pending.max(flush)));
        }
    }

    pub(super) fn wake_armed(&self, now: Instant) -> bool {
        self.can_start()
            && !self.paused
            && !self.voice.wake_word_disabled
            && self.cycle.is_none()
            && self.cooldown_until.map_or(true, |until| now >= until)
    }
}

/// Audio path guarded by the audio lock.
pub(super) struct AudioPath {
    pub(super) input: Option<Box<dyn AudioInput>>,
    pub(super) wake: Option<Box<dyn WakeWordModel>>,
    pub(super) gate: WakeGate,
}

pub(super) struct Inner {
    pub(super) config: VoiceConfig,
    pub(super) state: SharedState<Core>,
    pub(super) audio: Mutex<AudioPath>,
    pub(super) device: Arc<dyn AudioDevice>,
    pub(super) stt: Option<Box<dyn SpeechToText>>,
    pub(super) tts: Option<Box<dyn TextToSpeech>>,
    pub(super) responder: Box<dyn Responder>,
    pub(super) notifier: Option<DashboardNotifier>,
    pub(super) cleaner: TranscriptCleaner,
    pub(super) capabilities: Capabilities,
}

impl Inner {
    /// Run `f` under the state lock, then publish phase changes after the
    /// lock is released.
    pub(super) fn with_core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        let (out, changes) = self.state.update(|core| {
            let out = f(core);
            (out, std::mem::take(&mut core.changes))
        });
        if let Some(notifier) = &self.notifier {
            for phase in changes {
                notifier.publish(phase);
            }
        }
        out
    }

    pub(super) fn audio(&self) -> MutexGuard<'_, AudioPath> {
        crate::lock_or_recover(&self.audio, "voice_audio")
    }

    pub(super) fn simulated(&self) -> bool {
        self.device.is_simulated()
    }
}

/// Handle shared by the API layer. Cheap to call from any thread; only
/// [`VoiceCoordinator::mock_wake`] blocks.
pub struct VoiceCoordinator {
    inner: Arc<Inner>,
    requests: Sender<Request>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceCoordinator {
    pub fn start(config: VoiceConfig, backends: VoiceBackends) -> Self {
        let VoiceBackends {
            device,
            wake,
            stt,
            tts,
            responder,
            notifier,
        } = backends;
        let capabilities = Capabilities {
            wake_word: wake.is_some() && !config.wake_word_disabled && !device.is_simulated(),
            stt: stt.is_some(),
            tts: tts.is_some(),
        };
        let gate = WakeGate::new(config.wake_threshold, config.audio_gain, config.wake_word_debug);
        let inner = Arc::new(Inner {
            cleaner: TranscriptCleaner::new(&config.wake_word),
            state: SharedState::new("voice_state", Core::new(&config)),
            audio: Mutex::new(AudioPath {
                input: None,
                wake,
                gate,
            }),
            device,
            stt,
            tts,
            responder,
            notifier,
            capabilities,
            config,
        });

        let (requests, receiver) = unbounded();
        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("voice-worker".into())
            .spawn(move || worker::run(worker_inner, receiver));
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn voice worker");
                None
            }
        };
        tracing::info!(
            device = inner.device.name(),
            mock = inner.simulated(),
            wake_word = capabilities.wake_word,
            stt = capabilities.stt,
            tts = capabilities.tts,
            "voice coordinator started"
        );
        Self {
            inner,
            requests,
            worker: Mutex::new(worker),
        }
    }

    pub fn state(&self) -> VoiceState {
        self.inner.state.read(|core| core.voice.clone())
    }

    pub fn status(&self) -> VoiceStatus {
        VoiceStatus {
            voice: self.state(),
            mock: self.inner.simulated(),
            capabilities: self.inner.capabilities,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.inner.simulated()
    }

    /// Start a capture without the wake word. Conflicts are decided before
    /// this returns; the capture itself runs on the worker.
    pub fn listen(&self, mode: RecordingMode) -> Result<(), VoiceError> {
        let cycle = self
            .inner
            .with_core(|core| core.reserve(VoicePhase::Listening, mode))?;
        tracing::info!(cycle = cycle.id, mode = mode.label(), "bypass listen");
        let request = if self.inner.simulated() {
            Request::Simulate {
                cycle: cycle.clone(),
                transcript: MOCK_LISTEN_TRANSCRIPT.to_string(),
            }
        } else {
            Request::Capture(cycle.clone())
        };
        if self.requests.send(request).is_err() {
            self.inner.with_core(|core| {
                core.fail(&cycle, "voice worker is not running".into());
                core.finish(&cycle, Instant::now(), None);
            });
            return Err(VoiceError::Stopped);
        }
        Ok(())
    }

    /// Run a simulated cycle with `transcript` on the calling thread and
    /// return the transcript it published.
    pub fn mock_wake(&self, transcript: &str) -> Result<Option<String>, VoiceError> {
        let cycle = self
            .inner
            .with_core(|core| core.reserve(VoicePhase::Listening, RecordingMode::Assistant))?;
        tracing::info!(cycle = cycle.id, "mock wake");
        Ok(self.inner.run_simulated(cycle, transcript))
    }

    pub fn speak(&self, text: &str, priority: i32) -> Result<(), VoiceError> {
        let chars = text.chars().count();
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::InvalidInput("text must not be empty".into()));
        }
        if chars > MAX_SPEAK_CHARS {
            return Err(VoiceError::InvalidInput(format!(
                "text exceeds {MAX_SPEAK_CHARS} characters ({chars})"
            )));
        }
        if self.inner.tts.is_none() {
            return Err(VoiceError::Unavailable("text-to-speech"));
        }
        self.inner.with_core(|core| {
            if !core.voice.enabled {
                return Err(VoiceError::Disabled);
            }
            if !core.queue.push(text.to_string(), priority) {
                return Err(VoiceError::QueueFull);
            }
            Ok(())
        })?;
        tracing::info!(priority, chars, "speech queued");
        let _ = self.requests.send(Request::Wakeup);
        Ok(())
    }

    pub fn set_enabled(&self, enabled: bool) -> VoiceStatus {
        self.inner.with_core(|core| core.voice.enabled = enabled);
        tracing::info!(enabled, "voice enabled flag changed");
        if enabled {
            let _ = self.requests.send(Request::Wakeup);
        }
        self.status()
    }

    /// Suppress wake triggers while someone else produces audio.
    pub fn pause(&self) {
        self.inner.with_core(|core| core.paused = true);
        tracing::info!("wake detection paused");
    }

    /// Re-arm wake triggers after flushing the input and a fresh cooldown.
    pub fn resume(&self) {
        let flush = self.inner.config.playback_flush;
        let cooldown = self.inner.config.cooldown;
        self.inner.with_core(|core| {
            core.paused = false;
            core.flush = Some(core.flush.map_or(flush, |pending| pending.max(flush)));
            core.cooldown_until = Some(Instant::now() + cooldown);
        });
        tracing::info!("wake detection resumed");
    }

    /// Abort a listening or thinking cycle. No-op otherwise.
    pub fn cancel(&self) -> bool {
        let cancelled = self.inner.with_core(|core| {
            if !matches!(core.voice.state, VoicePhase::Listening | VoicePhase::Thinking) {
                return false;
            }
            if let Some(cycle) = &core.cycle {
                cycle.token.cancel();
            }
            core.voice.last_transcript = None;
            core.transition(VoicePhase::Idle)
        });
        if cancelled {
            tracing::info!("voice cycle cancelled");
        }
        cancelled
    }

    /// End the current capture early and transcribe what was recorded.
    pub fn stop_recording(&self) -> bool {
        let stopped = self.inner.with_core(|core| {
            match (&core.cycle, core.voice.state) {
                (Some(cycle), VoicePhase::Listening) => {
                    cycle.token.request_stop();
                    true
                }
                _ => false,
            }
        });
        if stopped {
            tracing::info!("stop recording requested");
        }
        stopped
    }

    pub fn clear_transcript(&self) {
        self.inner.with_core(|core| core.voice.last_transcript = None);
    }

    pub fn volume(&self) -> u8 {
        self.inner.state.read(|core| core.voice.tts_volume)
    }

    pub fn set_volume(&self, volume: u8) -> Result<u8, VoiceError> {
        if volume > 100 {
            return Err(VoiceError::InvalidInput(format!(
                "volume must be between 0 and 100, got {volume}"
            )));
        }
        self.inner.with_core(|core| core.voice.tts_volume = volume);
        tracing::info!(volume, "tts volume set");
        Ok(volume)
    }

    /// Cancel any cycle, stop the worker and the dashboard notifier.
    pub fn shutdown(&self) {
        self.inner.with_core(|core| {
            if let Some(cycle) = &core.cycle {
                cycle.token.cancel();
            }
        });
        let _ = self.requests.send(Request::Shutdown);
        if let Some(handle) = crate::lock_or_recover(&self.worker, "voice_worker").take() {
            if handle.join().is_err() {
                tracing::error!("voice worker panicked during shutdown");
            }
        }
        if let Some(notifier) = &self.inner.notifier {
            notifier.shutdown();
        }
        tracing::info!("voice coordinator stopped");
    }
}

impl Drop for VoiceCoordinator {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
    }
}
