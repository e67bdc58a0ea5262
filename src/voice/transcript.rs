//! Transcript cleanup between the speech backend and `last_transcript`.

use regex::Regex;
use std::sync::OnceLock;

const MIN_TRANSCRIPT_CHARS: usize = 3;

/// Removes non-speech markers and a leading wake phrase, then rejects
/// results that are not a usable command.
#[derive(Debug, Clone)]
pub struct TranscriptCleaner {
    wake_prefix: Option<Regex>,
}

impl TranscriptCleaner {
    pub fn new(wake_word: &str) -> Self {
        let pattern = format!(
            r"(?i)^(?:hey|hi|okay),?\s*{}[.,!]?\s*",
            regex::escape(wake_word.trim())
        );
        let wake_prefix = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(error = %err, wake_word, "wake phrase stripping disabled");
                None
            }
        };
        Self { wake_prefix }
    }

    /// `None` when nothing worth keeping remains.
    pub fn clean(&self, raw: &str) -> Option<String> {
        let text = strip_non_speech(raw);
        let text = match &self.wake_prefix {
            Some(re) => re.replace(&text, "").trim().to_string(),
            None => text,
        };
        is_valid(&text).then_some(text)
    }
}

fn strip_non_speech(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background|wind blowing)\s*)\)",
        )
        .expect("non-speech regex should compile")
    });
    re.replace_all(trimmed, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_valid(text: &str) -> bool {
    if text.chars().count() < MIN_TRANSCRIPT_CHARS {
        return false;
    }
    // Hosted backends describe noise as "(white noise)", "(click)" and so on.
    !(text.starts_with('(') && text.ends_with(')'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TranscriptCleaner {
        TranscriptCleaner::new("jarvis")
    }

    #[test]
    fn strips_leading_wake_phrase() {
        let c = cleaner();
        assert_eq!(c.clean("Hey Jarvis, turn on the lights").as_deref(), Some("turn on the lights"));
        assert_eq!(c.clean("okay jarvis. what time is it").as_deref(), Some("what time is it"));
        assert_eq!(c.clean("hi,jarvis play music").as_deref(), Some("play music"));
    }

    #[test]
    fn keeps_wake_word_mid_sentence() {
        assert_eq!(
            cleaner().clean("tell jarvis hello").as_deref(),
            Some("tell jarvis hello")
        );
    }

    #[test]
    fn removes_non_speech_markers() {
        assert_eq!(
            cleaner().clean("[BLANK_AUDIO] lights  off (music)").as_deref(),
            Some("lights off")
        );
    }

    #[test]
    fn rejects_noise_descriptions() {
        let c = cleaner();
        assert_eq!(c.clean("(white noise)"), None);
        assert_eq!(c.clean("(click)"), None);
        assert_eq!(c.clean("[BLANK_AUDIO]"), None);
    }

    #[test]
    fn rejects_short_or_empty_text() {
        let c = cleaner();
        assert_eq!(c.clean(""), None);
        assert_eq!(c.clean("  ok "), None);
        assert_eq!(c.clean("Hey Jarvis."), None);
    }

    #[test]
    fn custom_wake_word_is_escaped() {
        let c = TranscriptCleaner::new("computer+");
        assert_eq!(c.clean("hey computer+ status").as_deref(), Some("status"));
    }
}
