//! Voice coordinator: wake-word listening, command capture, transcription
//! and spoken replies.
//!
//! One worker thread owns the audio path. API callers reserve a cycle under
//! the state lock (so conflicts are decided synchronously) and hand it to
//! the worker; they never touch audio hardware themselves. The state lock
//! and the audio lock are never held at the same time.

mod cancel;
mod coordinator;
mod notify;
mod queue;
mod state;
mod transcript;
mod worker;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use cancel::CancelToken;
pub use coordinator::{Capabilities, VoiceBackends, VoiceCoordinator, VoiceStatus};
pub use notify::DashboardNotifier;
pub use queue::{SpeakQueue, SpeakRequest};
pub use state::{RecordingMode, VoicePhase, VoiceState};
pub use transcript::TranscriptCleaner;

/// Transcript used when a bypass listen runs without audio hardware.
pub const MOCK_LISTEN_TRANSCRIPT: &str = "test command";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voice coordinator busy ({0})")]
    Busy(VoicePhase),

    #[error("voice is disabled")]
    Disabled,

    #[error("invalid mode {0:?}; expected \"assistant\" or \"notes\"")]
    InvalidMode(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("speak queue is full")]
    QueueFull,

    #[error("{0} unavailable")]
    Unavailable(&'static str),

    #[error("voice worker is not running")]
    Stopped,
}

/// Decides whether a transcript gets a spoken reply.
pub trait Responder: Send + Sync {
    fn respond(&self, transcript: &str) -> Option<String>;
}

/// Publishes the transcript and never replies; the front-end acts on
/// `last_transcript` itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptOnly;

impl Responder for TranscriptOnly {
    fn respond(&self, _transcript: &str) -> Option<String> {
        None
    }
}
