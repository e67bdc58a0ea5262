//! The voice worker thread: wake listening, capture cycles and queued
//! announcements. Only this thread (and `mock_wake` callers) drive cycles.

use super::coordinator::{ActiveCycle, Inner};
use super::state::{RecordingMode, VoicePhase};
use crate::audio::{
    capture, log_capture_metrics, scale_volume, AudioInput, CapturePlan, CaptureResult,
    SilencePolicy, StopReason,
};
use crate::error::AudioError;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(100);
const WAKE_ERROR_BACKOFF: Duration = Duration::from_secs(2);
const SIMULATED_SLICE: Duration = Duration::from_millis(20);
const CAPTURE_LOOKBACK: Duration = Duration::from_millis(300);
const SILENCE_SMOOTHING_FRAMES: usize = 3;

pub(super) enum Request {
    Capture(ActiveCycle),
    Simulate {
        cycle: ActiveCycle,
        transcript: String,
    },
    /// Something changed (speech queued, voice re-enabled); re-check.
    Wakeup,
    Shutdown,
}

pub(super) fn run(inner: Arc<Inner>, requests: Receiver<Request>) {
    tracing::debug!("voice worker running");
    let mut backoff_until: Option<Instant> = None;
    loop {
        let now = Instant::now();
        let armed = inner.capabilities.wake_word
            && backoff_until.map_or(true, |until| now >= until)
            && inner.with_core(|core| core.wake_armed(now));

        let request = if armed {
            match requests.try_recv() {
                Ok(request) => Some(request),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match requests.recv_timeout(IDLE_POLL) {
                Ok(request) => Some(request),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        match request {
            Some(Request::Shutdown) => break,
            Some(Request::Capture(cycle)) => {
                inner.run_capture_cycle(cycle);
                continue;
            }
            Some(Request::Simulate { cycle, transcript }) => {
                inner.run_simulated(cycle, &transcript);
                continue;
            }
            Some(Request::Wakeup) | None => {}
        }

        if inner.run_next_announcement() {
            continue;
        }
        if armed {
            if let Err(err) = inner.wake_step() {
                tracing::warn!(error = %err, "wake listening failed; backing off");
                backoff_until = Some(Instant::now() + WAKE_ERROR_BACKOFF);
            }
        }
    }
    inner.audio().input = None;
    tracing::debug!("voice worker exiting");
}

impl Inner {
    fn capture_plan(&self, mode: RecordingMode) -> CapturePlan {
        let (max_duration, silence) = match mode {
            RecordingMode::Assistant => (
                self.config.assistant_limit,
                Some(SilencePolicy {
                    rms_threshold: self.config.silence_rms,
                    duration: self.config.silence_duration,
                    smoothing_frames: SILENCE_SMOOTHING_FRAMES,
                }),
            ),
            RecordingMode::Notes => (self.config.notes_limit, None),
        };
        CapturePlan {
            sample_rate: self.config.sample_rate,
            chunk_samples: self.config.chunk_samples(),
            max_duration,
            silence,
            lookback: CAPTURE_LOOKBACK,
        }
    }

    /// Run `f` against the open input, opening it first if needed and
    /// applying any pending flush. A failing input is closed.
    fn with_input<R>(
        &self,
        f: impl FnOnce(&mut dyn AudioInput) -> Result<R, AudioError>,
    ) -> Result<R, AudioError> {
        let flush = self.with_core(|core| core.flush.take());
        let mut audio = self.audio();
        let input = match audio.input.take() {
            Some(input) => input,
            None => self.device.open_input(self.config.sample_rate)?,
        };
        let input = audio.input.insert(input);
        if let Some(flush) = flush {
            if let Err(err) = input.discard(self.config.samples_for(flush)) {
                audio.input = None;
                return Err(err);
            }
        }
        let result = f(input.as_mut());
        if result.is_err() {
            audio.input = None;
        }
        result
    }

    /// Read one chunk and score it. Starts a capture cycle on a trigger.
    fn wake_step(&self) -> Result<(), String> {
        let chunk_samples = self.config.chunk_samples();
        let chunk = self
            .with_input(|input| input.read_chunk(chunk_samples))
            .map_err(|err| err.to_string())?;

        let fired = {
            let mut audio = self.audio();
            let path = &mut *audio;
            match path.wake.as_mut() {
                Some(model) => path
                    .gate
                    .process(model.as_mut(), &chunk)
                    .map_err(|err| err.to_string())?,
                None => false,
            }
        };
        if !fired {
            return Ok(());
        }

        // An API request may have claimed the coordinator while we scored.
        let cycle = match self.with_core(|core| {
            if core.wake_armed(Instant::now()) {
                core.reserve(VoicePhase::Listening, RecordingMode::Assistant).ok()
            } else {
                None
            }
        }) {
            Some(cycle) => cycle,
            None => return Ok(()),
        };
        tracing::info!(cycle = cycle.id, "wake word detected");
        self.run_capture_cycle(cycle);
        Ok(())
    }

    pub(super) fn run_capture_cycle(&self, cycle: ActiveCycle) {
        let plan = self.capture_plan(cycle.mode);
        tracing::info!(cycle = cycle.id, mode = cycle.mode.label(), "capture started");
        let played = match self.with_input(|input| capture(input, &plan, &cycle.token)) {
            Ok(result) => self.process_capture(&cycle, result),
            Err(err) => {
                self.with_core(|core| core.fail(&cycle, format!("audio capture failed: {err}")));
                false
            }
        };
        let flush = if played {
            self.config.capture_flush.max(self.config.playback_flush)
        } else {
            self.config.capture_flush
        };
        self.finish_cycle(&cycle, Some(flush));
    }

    /// Returns true when a reply was played.
    fn process_capture(&self, cycle: &ActiveCycle, result: CaptureResult) -> bool {
        log_capture_metrics(&result.metrics);
        if result.metrics.stop_reason == StopReason::Cancelled {
            return false;
        }

        let duration = result.duration(self.config.sample_rate);
        if duration < self.config.min_command {
            tracing::info!(
                captured_ms = duration.as_millis() as u64,
                "capture too short; skipping transcription"
            );
            self.with_core(|core| core.advance(cycle, VoicePhase::Idle));
            return false;
        }

        if !self.with_core(|core| core.advance(cycle, VoicePhase::Thinking)) {
            return false;
        }
        let Some(stt) = self.stt.as_ref() else {
            self.with_core(|core| core.fail(cycle, "speech-to-text not configured".into()));
            return false;
        };

        let started = Instant::now();
        match stt.transcribe(&result.audio, self.config.sample_rate) {
            Ok(raw) => {
                tracing::info!(
                    backend = stt.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "transcription finished"
                );
                self.complete_transcript(cycle, &raw).1
            }
            Err(err) => {
                self.with_core(|core| core.fail(cycle, err.to_string()));
                false
            }
        }
    }

    /// Publish the cleaned transcript and optionally speak a reply. Must be
    /// called in `thinking`.
    fn complete_transcript(&self, cycle: &ActiveCycle, raw: &str) -> (Option<String>, bool) {
        let cleaned = self.cleaner.clean(raw);
        let published = self.with_core(|core| {
            if !core.is_live(cycle) {
                return false;
            }
            core.voice.last_transcript = cleaned.clone();
            true
        });
        if !published {
            return (None, false);
        }
        let Some(text) = cleaned else {
            tracing::info!("transcript discarded after cleanup");
            self.with_core(|core| core.advance(cycle, VoicePhase::Idle));
            return (None, false);
        };
        tracing::info!(chars = text.chars().count(), mode = cycle.mode.label(), "transcript ready");

        let reply = match cycle.mode {
            RecordingMode::Assistant => self.responder.respond(&text),
            RecordingMode::Notes => None,
        };
        let played = match reply {
            Some(reply) => self.speak_in_cycle(cycle, &reply),
            None => {
                self.with_core(|core| core.advance(cycle, VoicePhase::Idle));
                false
            }
        };
        (Some(text), played)
    }

    /// Synthesize and play `text`. Enters from `thinking`, leaves in `idle`
    /// or `error`. Returns true when audio was played.
    fn speak_in_cycle(&self, cycle: &ActiveCycle, text: &str) -> bool {
        let Some(tts) = self.tts.as_ref() else {
            tracing::warn!("reply dropped; text-to-speech unavailable");
            self.with_core(|core| core.advance(cycle, VoicePhase::Idle));
            return false;
        };
        let speech = match tts.synthesize(text) {
            Ok(speech) => speech,
            Err(err) => {
                self.with_core(|core| core.fail(cycle, err.to_string()));
                return false;
            }
        };
        let volume = match self.with_core(|core| {
            core.advance(cycle, VoicePhase::Speaking).then_some(core.voice.tts_volume)
        }) {
            Some(volume) => volume,
            None => return false,
        };

        let samples = scale_volume(&speech.samples, volume);
        let played = {
            let _audio = self.audio();
            self.device.play(&samples, speech.sample_rate)
        };
        if let Err(err) = played {
            self.with_core(|core| core.fail(cycle, format!("playback failed: {err}")));
            return false;
        }
        thread::sleep(self.config.playback_settle);
        self.with_core(|core| core.advance(cycle, VoicePhase::Idle));
        true
    }

    /// Listening and thinking driven by timers instead of audio.
    pub(super) fn run_simulated(&self, cycle: ActiveCycle, transcript: &str) -> Option<String> {
        self.simulated_wait(&cycle, self.config.mock_listen_delay, true);
        let published = if self.with_core(|core| core.advance(&cycle, VoicePhase::Thinking)) {
            self.simulated_wait(&cycle, self.config.mock_think_delay, false);
            self.complete_transcript(&cycle, transcript).0
        } else {
            None
        };
        self.finish_cycle(&cycle, None);
        published
    }

    fn simulated_wait(&self, cycle: &ActiveCycle, total: Duration, stoppable: bool) {
        let deadline = Instant::now() + total;
        loop {
            let now = Instant::now();
            if now >= deadline
                || cycle.token.is_cancelled()
                || (stoppable && cycle.token.is_stop_requested())
            {
                return;
            }
            thread::sleep(SIMULATED_SLICE.min(deadline - now));
        }
    }

    /// Speak the highest-priority queued announcement if the coordinator is
    /// free. Returns true when one was taken.
    fn run_next_announcement(&self) -> bool {
        let next = self.with_core(|core| {
            if !core.can_start() || core.cycle.is_some() || core.queue.is_empty() {
                return None;
            }
            let cycle = core
                .reserve(VoicePhase::Thinking, RecordingMode::Assistant)
                .ok()?;
            core.queue.pop().map(|request| (cycle, request))
        });
        let Some((cycle, request)) = next else {
            return false;
        };
        tracing::info!(cycle = cycle.id, priority = request.priority, "speaking announcement");
        let played = self.speak_in_cycle(&cycle, &request.text);
        self.finish_cycle(&cycle, played.then_some(self.config.playback_flush));
        true
    }

    fn finish_cycle(&self, cycle: &ActiveCycle, flush: Option<Duration>) {
        let cooldown_until = Instant::now() + self.config.cooldown;
        self.with_core(|core| core.finish(cycle, cooldown_until, flush));
        let mut audio = self.audio();
        audio.gate.reset();
        if let Some(model) = audio.wake.as_mut() {
            model.reset();
        }
        if !self.capabilities.wake_word {
            audio.input = None;
        }
        tracing::debug!(cycle = cycle.id, "cycle finished");
    }
}
