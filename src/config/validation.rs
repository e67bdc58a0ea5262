use super::defaults::{FORBIDDEN_DEVICE_CHARS, MAX_CAPTURE_HARD_LIMIT_MS, MAX_COOLDOWN_MS};
use super::{AppConfig, PresenceConfig, VoiceConfig};
use anyhow::{bail, Result};
use clap::Parser;
use std::time::Duration;

impl AppConfig {
    /// Load `.env`, parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and normalize string options.
    pub fn validate(&mut self) -> Result<()> {
        if self.port == 0 {
            bail!("--port must be between 1 and 65535");
        }
        if !(1_200..=921_600).contains(&self.serial_baud) {
            bail!(
                "--serial-baud must be between 1200 and 921600, got {}",
                self.serial_baud
            );
        }
        if self.serial_port.trim().is_empty() {
            bail!("--serial-port cannot be empty");
        }
        if self.zone_near_cm == 0
            || self.zone_near_cm >= self.zone_medium_cm
            || self.zone_medium_cm >= self.max_presence_cm
        {
            bail!(
                "zone thresholds must satisfy 0 < near ({}) < medium ({}) < max presence ({})",
                self.zone_near_cm,
                self.zone_medium_cm,
                self.max_presence_cm
            );
        }
        if self.posture_alert_secs == 0 {
            bail!("--posture-alert-secs must be at least 1");
        }
        if !(1..=50).contains(&self.poll_hz) {
            bail!("--poll-hz must be between 1 and 50, got {}", self.poll_hz);
        }
        let poll_period_ms = 1000 / u64::from(self.poll_hz);
        if self.offline_timeout_ms < poll_period_ms {
            bail!(
                "--offline-timeout-ms ({}) must cover at least one poll period ({poll_period_ms} ms)",
                self.offline_timeout_ms
            );
        }

        if !(8_000..=48_000).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between 8000 and 48000 Hz, got {}",
                self.sample_rate
            );
        }
        if !(10..=1_000).contains(&self.chunk_ms) {
            bail!("--chunk-ms must be between 10 and 1000, got {}", self.chunk_ms);
        }
        if !(self.audio_gain > 0.0 && self.audio_gain <= 10.0) {
            bail!("--audio-gain must be in (0, 10], got {}", self.audio_gain);
        }
        if !(self.wake_threshold > 0.0 && self.wake_threshold <= 1.0) {
            bail!(
                "--wake-threshold must be in (0, 1], got {}",
                self.wake_threshold
            );
        }
        if !(self.silence_rms > 0.0 && self.silence_rms < 1.0) {
            bail!("--silence-rms must be in (0, 1), got {}", self.silence_rms);
        }
        for (flag, value) in [
            ("--assistant-limit-ms", self.assistant_limit_ms),
            ("--notes-limit-ms", self.notes_limit_ms),
        ] {
            if value == 0 || value > MAX_CAPTURE_HARD_LIMIT_MS {
                bail!("{flag} must be between 1 and {MAX_CAPTURE_HARD_LIMIT_MS} ms, got {value}");
            }
        }
        if self.silence_ms < self.chunk_ms || self.silence_ms > self.assistant_limit_ms {
            bail!(
                "--silence-ms must be between --chunk-ms ({}) and --assistant-limit-ms ({})",
                self.chunk_ms,
                self.assistant_limit_ms
            );
        }
        if self.min_command_ms > self.assistant_limit_ms {
            bail!(
                "--min-command-ms ({}) cannot exceed --assistant-limit-ms ({})",
                self.min_command_ms,
                self.assistant_limit_ms
            );
        }
        if self.cooldown_ms > MAX_COOLDOWN_MS {
            bail!(
                "--cooldown-ms must be at most {MAX_COOLDOWN_MS}, got {}",
                self.cooldown_ms
            );
        }
        if self.tts_volume > 100 {
            bail!("--tts-volume must be between 0 and 100, got {}", self.tts_volume);
        }
        if !(1..=64).contains(&self.speak_queue) {
            bail!("--speak-queue must be between 1 and 64, got {}", self.speak_queue);
        }

        self.audio_device = sanitize_device(&self.audio_device)?;
        self.wake_word = self.wake_word.trim().to_lowercase();
        if self.wake_word.is_empty() || !self.wake_word.chars().all(|c| c.is_alphanumeric() || c == ' ') {
            bail!("--wake-word must be a non-empty word, got {:?}", self.wake_word);
        }
        self.whisper_url = normalize_url(self.whisper_url.take(), "--whisper-url")?;
        self.dashboard_url = normalize_url(self.dashboard_url.take(), "--dashboard-url")?;
        self.elevenlabs_api_key = self
            .elevenlabs_api_key
            .take()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(())
    }

    pub fn presence_config(&self) -> PresenceConfig {
        PresenceConfig {
            max_presence_cm: self.max_presence_cm,
            zone_near_cm: self.zone_near_cm,
            zone_medium_cm: self.zone_medium_cm,
            posture_threshold: Duration::from_secs(self.posture_alert_secs),
            poll_period: Duration::from_millis(1000 / u64::from(self.poll_hz)),
            offline_timeout: Duration::from_millis(self.offline_timeout_ms),
            ..PresenceConfig::default()
        }
    }

    pub fn voice_config(&self) -> VoiceConfig {
        VoiceConfig {
            sample_rate: self.sample_rate,
            chunk_ms: self.chunk_ms,
            assistant_limit: Duration::from_millis(self.assistant_limit_ms),
            notes_limit: Duration::from_millis(self.notes_limit_ms),
            silence_rms: self.silence_rms,
            silence_duration: Duration::from_millis(self.silence_ms),
            min_command: Duration::from_millis(self.min_command_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
            wake_threshold: self.wake_threshold,
            audio_gain: self.audio_gain,
            wake_word: self.wake_word.clone(),
            wake_word_debug: self.wake_word_debug,
            wake_word_disabled: self.disable_wake_word,
            tts_volume: self.tts_volume,
            speak_queue: self.speak_queue,
            ..VoiceConfig::default()
        }
    }
}

pub(super) fn sanitize_device(device: &str) -> Result<String> {
    let trimmed = device.trim();
    if trimmed.is_empty() {
        bail!("--audio-device cannot be empty");
    }
    if trimmed.len() > 128 {
        bail!("--audio-device is too long ({} bytes, max 128)", trimmed.len());
    }
    if trimmed.contains(FORBIDDEN_DEVICE_CHARS) {
        bail!("--audio-device contains forbidden characters: {trimmed:?}");
    }
    Ok(trimmed.to_string())
}

pub(super) fn normalize_url(url: Option<String>, flag: &str) -> Result<Option<String>> {
    let Some(url) = url else {
        return Ok(None);
    };
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        bail!("{flag} must start with http:// or https://, got {trimmed:?}");
    }
    Ok(Some(trimmed.to_string()))
}
