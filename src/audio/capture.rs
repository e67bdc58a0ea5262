//! Chunked capture loop with silence end-pointing.
//!
//! Reads fixed-size chunks from an [`AudioInput`], checks the caller's
//! control flags between chunks, and stops on trailing silence, an explicit
//! stop, the duration limit, or cancellation.

use super::convert::i16_to_f32;
use super::device::AudioInput;
use super::vad::{FrameLabel, SimpleThresholdVad, VadEngine, VadSmoother};
use crate::error::AudioError;
use std::collections::VecDeque;
use std::time::Duration;

/// Flags checked between chunks.
pub trait CaptureControl {
    /// Abort and discard the audio.
    fn cancelled(&self) -> bool;
    /// Finish now and keep what was recorded.
    fn stop_requested(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMetrics {
    pub capture_ms: u64,
    pub speech_ms: u64,
    pub silence_tail_ms: u64,
    pub chunks: usize,
    pub stop_reason: StopReason,
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self {
            capture_ms: 0,
            speech_ms: 0,
            silence_tail_ms: 0,
            chunks: 0,
            stop_reason: StopReason::MaxDuration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Silence { tail_ms: u64 },
    MaxDuration,
    ManualStop,
    Cancelled,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Silence { .. } => "silence",
            StopReason::MaxDuration => "max_duration",
            StopReason::ManualStop => "manual_stop",
            StopReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub audio: Vec<i16>,
    pub metrics: CaptureMetrics,
}

impl CaptureResult {
    pub fn duration(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.audio.len() as f64 / f64::from(sample_rate.max(1)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SilencePolicy {
    pub rms_threshold: f32,
    pub duration: Duration,
    pub smoothing_frames: usize,
}

#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub sample_rate: u32,
    pub chunk_samples: usize,
    pub max_duration: Duration,
    /// `None` records until stopped (notes dictation).
    pub silence: Option<SilencePolicy>,
    /// Trailing silence kept after a silence stop.
    pub lookback: Duration,
}

impl CapturePlan {
    fn chunk_ms(&self) -> u64 {
        (self.chunk_samples as u64 * 1000) / u64::from(self.sample_rate.max(1))
    }

    fn samples_for(&self, duration: Duration) -> usize {
        (u128::from(self.sample_rate) * duration.as_millis() / 1000) as usize
    }
}

struct FrameRecord {
    samples: Vec<i16>,
    label: FrameLabel,
}

struct FrameAccumulator {
    frames: VecDeque<FrameRecord>,
    total_samples: usize,
    lookback_samples: usize,
}

impl FrameAccumulator {
    fn new(lookback_samples: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            total_samples: 0,
            lookback_samples,
        }
    }

    fn push_frame(&mut self, samples: Vec<i16>, label: FrameLabel) {
        self.total_samples += samples.len();
        self.frames.push_back(FrameRecord { samples, label });
    }

    fn into_audio(mut self, stop_reason: &StopReason) -> Vec<i16> {
        if matches!(stop_reason, StopReason::Silence { .. }) {
            self.trim_trailing_silence();
        }
        let mut audio = Vec::with_capacity(self.total_samples);
        for record in self.frames {
            audio.extend(record.samples);
        }
        audio
    }

    fn trim_trailing_silence(&mut self) {
        let trailing: usize = self
            .frames
            .iter()
            .rev()
            .take_while(|record| record.label == FrameLabel::Silence)
            .map(|record| record.samples.len())
            .sum();
        let mut excess = trailing.saturating_sub(self.lookback_samples);
        while excess > 0 {
            let Some(mut record) = self.frames.pop_back() else {
                break;
            };
            if record.samples.len() <= excess {
                excess -= record.samples.len();
                self.total_samples -= record.samples.len();
            } else {
                let keep = record.samples.len() - excess;
                record.samples.truncate(keep);
                self.total_samples -= excess;
                excess = 0;
                self.frames.push_back(record);
            }
        }
    }
}

/// Run one capture. Cancellation yields an empty result tagged
/// [`StopReason::Cancelled`]; I/O failures are returned as errors.
pub fn capture(
    input: &mut dyn AudioInput,
    plan: &CapturePlan,
    control: &dyn CaptureControl,
) -> Result<CaptureResult, AudioError> {
    let chunk_ms = plan.chunk_ms();
    let max_samples = plan.samples_for(plan.max_duration).max(plan.chunk_samples);
    let mut vad = plan
        .silence
        .map(|policy| SimpleThresholdVad::from_rms(policy.rms_threshold));
    let mut smoother = VadSmoother::new(plan.silence.map_or(1, |p| p.smoothing_frames));
    let mut accumulator = FrameAccumulator::new(plan.samples_for(plan.lookback));
    let mut metrics = CaptureMetrics::default();
    let mut captured = 0usize;
    let mut silence_run_ms = 0u64;

    let stop_reason = loop {
        if control.cancelled() {
            break StopReason::Cancelled;
        }
        if control.stop_requested() {
            break StopReason::ManualStop;
        }
        if captured >= max_samples {
            break StopReason::MaxDuration;
        }

        let chunk = input.read_chunk(plan.chunk_samples)?;
        captured += chunk.len();
        metrics.chunks += 1;

        let label = match vad.as_mut() {
            Some(vad) => smoother.smooth(vad.process_frame(&i16_to_f32(&chunk)).into()),
            None => FrameLabel::Speech,
        };
        accumulator.push_frame(chunk, label);

        match label {
            FrameLabel::Silence => silence_run_ms += chunk_ms,
            FrameLabel::Speech => {
                metrics.speech_ms += chunk_ms;
                silence_run_ms = 0;
            }
            FrameLabel::Uncertain => {}
        }
        if let Some(policy) = plan.silence {
            if silence_run_ms >= policy.duration.as_millis() as u64 {
                break StopReason::Silence {
                    tail_ms: silence_run_ms,
                };
            }
        }
    };

    metrics.capture_ms = (captured as u64 * 1000) / u64::from(plan.sample_rate.max(1));
    metrics.silence_tail_ms = silence_run_ms;
    metrics.stop_reason = stop_reason.clone();
    let audio = if stop_reason == StopReason::Cancelled {
        Vec::new()
    } else {
        accumulator.into_audio(&stop_reason)
    };
    Ok(CaptureResult { audio, metrics })
}

/// One structured line per capture, in the same shape for every mode.
pub fn log_capture_metrics(metrics: &CaptureMetrics) {
    tracing::info!(
        capture_ms = metrics.capture_ms,
        speech_ms = metrics.speech_ms,
        silence_tail_ms = metrics.silence_tail_ms,
        chunks = metrics.chunks,
        stop = metrics.stop_reason.label(),
        "capture finished"
    );
}
