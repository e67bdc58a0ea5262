//! Speech/silence classification for capture end-pointing.

use super::meter::{amplitude_to_db, rms_db};
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;

/// Classifies one chunk of normalized samples.
pub trait VadEngine: Send {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
    Uncertain,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FrameLabel {
    Speech,
    Silence,
    Uncertain,
}

impl From<VadDecision> for FrameLabel {
    fn from(decision: VadDecision) -> Self {
        match decision {
            VadDecision::Speech => FrameLabel::Speech,
            VadDecision::Silence => FrameLabel::Silence,
            VadDecision::Uncertain => FrameLabel::Uncertain,
        }
    }
}

/// Sliding-window majority vote over chunk labels, so one loud click does
/// not reset a silence run.
pub(crate) struct VadSmoother {
    window: VecDeque<FrameLabel>,
    window_size: usize,
}

impl VadSmoother {
    pub(crate) fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::new(),
            window_size: window_size.max(1),
        }
    }

    pub(crate) fn smooth(&mut self, label: FrameLabel) -> FrameLabel {
        if self.window_size <= 1 {
            return label;
        }
        self.window.push_back(label);
        if self.window.len() > self.window_size {
            self.window.pop_front();
        }

        let mut speech = 0usize;
        let mut silence = 0usize;
        for item in &self.window {
            match item {
                FrameLabel::Speech => speech += 1,
                FrameLabel::Silence => silence += 1,
                FrameLabel::Uncertain => {}
            }
        }
        match speech.cmp(&silence) {
            CmpOrdering::Greater => FrameLabel::Speech,
            CmpOrdering::Less => FrameLabel::Silence,
            CmpOrdering::Equal => label,
        }
    }
}

/// RMS energy gate.
#[derive(Debug, Clone)]
pub struct SimpleThresholdVad {
    threshold_db: f32,
}

impl SimpleThresholdVad {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }

    /// Threshold given as a linear RMS level of normalized audio.
    pub fn from_rms(rms: f32) -> Self {
        Self::new(amplitude_to_db(rms))
    }
}

impl VadEngine for SimpleThresholdVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        if rms_db(samples) >= self.threshold_db {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "simple_threshold_vad"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_vad_splits_on_rms() {
        let mut vad = SimpleThresholdVad::from_rms(0.01);
        assert_eq!(vad.process_frame(&[0.005; 160]), VadDecision::Silence);
        assert_eq!(vad.process_frame(&[0.2; 160]), VadDecision::Speech);
        assert_eq!(vad.process_frame(&[]), VadDecision::Uncertain);
    }

    #[test]
    fn smoother_ignores_single_outlier() {
        let mut smoother = VadSmoother::new(3);
        assert_eq!(smoother.smooth(FrameLabel::Silence), FrameLabel::Silence);
        assert_eq!(smoother.smooth(FrameLabel::Silence), FrameLabel::Silence);
        assert_eq!(smoother.smooth(FrameLabel::Speech), FrameLabel::Silence);
        assert_eq!(smoother.smooth(FrameLabel::Silence), FrameLabel::Silence);
    }

    #[test]
    fn smoother_window_of_one_passes_through() {
        let mut smoother = VadSmoother::new(1);
        assert_eq!(smoother.smooth(FrameLabel::Speech), FrameLabel::Speech);
        assert_eq!(smoother.smooth(FrameLabel::Silence), FrameLabel::Silence);
    }
}
