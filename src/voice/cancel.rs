use crate::audio::CaptureControl;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-cycle cancellation handle. A fresh token is minted for every cycle,
/// so a late cancel can never leak into the next one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flags: Arc<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    cancelled: AtomicBool,
    stop: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the cycle and discard its audio.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    /// End capture early but keep the audio.
    pub fn request_stop(&self) {
        self.flags.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flags.stop.load(Ordering::SeqCst)
    }
}

impl CaptureControl for CancelToken {
    fn cancelled(&self) -> bool {
        self.is_cancelled()
    }

    fn stop_requested(&self) -> bool {
        self.is_stop_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_flags() {
        let token = CancelToken::new();
        let handle = token.clone();
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(!token.is_stop_requested());
    }

    #[test]
    fn fresh_tokens_start_clear() {
        let old = CancelToken::new();
        old.cancel();
        old.request_stop();
        let next = CancelToken::new();
        assert!(!next.cancelled());
        assert!(!next.stop_requested());
    }
}
