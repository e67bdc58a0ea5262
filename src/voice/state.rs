use super::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoicePhase {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
}

impl VoicePhase {
    pub fn label(self) -> &'static str {
        match self {
            VoicePhase::Idle => "idle",
            VoicePhase::Listening => "listening",
            VoicePhase::Thinking => "thinking",
            VoicePhase::Speaking => "speaking",
            VoicePhase::Error => "error",
        }
    }

    /// A cycle owns the audio path in these phases.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            VoicePhase::Listening | VoicePhase::Thinking | VoicePhase::Speaking
        )
    }

    /// Edge table for the coordinator. `idle -> thinking` is only used by
    /// queued announcements; `listening -> idle` covers cancel and captures
    /// that produced nothing to transcribe.
    pub fn can_transition_to(self, next: VoicePhase) -> bool {
        use VoicePhase::*;
        match (self, next) {
            (Error, Error) => false,
            (_, Error) => true,
            (Error, Idle) => true,
            (Idle, Listening) | (Idle, Thinking) => true,
            (Listening, Thinking) | (Listening, Idle) => true,
            (Thinking, Speaking) | (Thinking, Idle) => true,
            (Speaking, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VoicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// Ends on trailing silence.
    #[default]
    Assistant,
    /// Ends only on an explicit stop.
    Notes,
}

impl RecordingMode {
    pub fn label(self) -> &'static str {
        match self {
            RecordingMode::Assistant => "assistant",
            RecordingMode::Notes => "notes",
        }
    }
}

impl FromStr for RecordingMode {
    type Err = VoiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "assistant" => Ok(RecordingMode::Assistant),
            "notes" => Ok(RecordingMode::Notes),
            other => Err(VoiceError::InvalidMode(other.to_string())),
        }
    }
}

/// Published coordinator state. Callers only ever get clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceState {
    pub state: VoicePhase,
    pub last_transcript: Option<String>,
    pub error: Option<String>,
    pub enabled: bool,
    pub tts_volume: u8,
    pub wake_word_disabled: bool,
}

impl VoiceState {
    pub fn new(tts_volume: u8, wake_word_disabled: bool) -> Self {
        Self {
            state: VoicePhase::Idle,
            last_transcript: None,
            error: None,
            enabled: true,
            tts_volume,
            wake_word_disabled,
        }
    }
}
