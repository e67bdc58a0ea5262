//! Command-line and environment configuration.

mod defaults;
mod validation;

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::*;

/// Options for the hardware sidecar. Every knob that the deployment sets
/// through the environment also accepts the matching variable.
#[derive(Debug, Parser, Clone)]
#[command(about = "Presence sensing and voice coordination sidecar", author, version)]
pub struct AppConfig {
    /// HTTP listen port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// HTTP bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: String,

    /// Emit JSON log lines instead of human-readable ones
    #[arg(long = "log-json", env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Log filter used when RUST_LOG is unset (e.g. "info,hw_sidecar=debug")
    #[arg(long = "log-filter", env = "LOG_FILTER")]
    pub log_filter: Option<String>,

    /// Serial device connected to the radar sensor
    #[arg(long = "serial-port", env = "SERIAL_PORT", default_value = DEFAULT_SERIAL_PORT)]
    pub serial_port: String,

    /// Serial baud rate
    #[arg(long = "serial-baud", env = "SERIAL_BAUD", default_value_t = DEFAULT_SERIAL_BAUD)]
    pub serial_baud: u32,

    /// Skip the serial sensor and simulate presence
    #[arg(long = "mock-presence", env = "MOCK_PRESENCE", default_value_t = false)]
    pub mock_presence: bool,

    /// BCM pin wired to the sensor's digital presence output
    #[arg(long = "gpio-pin", env = "GPIO_PIN_OT2", default_value_t = DEFAULT_GPIO_PIN)]
    pub gpio_pin: u32,

    /// Disable the digital presence line
    #[arg(long = "no-gpio", env = "NO_GPIO", default_value_t = false)]
    pub no_gpio: bool,

    /// Maximum distance that still counts as presence (cm)
    #[arg(long = "max-presence-cm", env = "MAX_PRESENCE_DISTANCE", default_value_t = DEFAULT_MAX_PRESENCE_CM)]
    pub max_presence_cm: u32,

    /// Upper bound of the near zone (cm, exclusive)
    #[arg(long = "zone-near-cm", env = "ZONE_NEAR", default_value_t = DEFAULT_ZONE_NEAR_CM)]
    pub zone_near_cm: u32,

    /// Upper bound of the medium zone (cm, exclusive)
    #[arg(long = "zone-medium-cm", env = "ZONE_MEDIUM", default_value_t = DEFAULT_ZONE_MEDIUM_CM)]
    pub zone_medium_cm: u32,

    /// Continuous near-zone time before the posture alert fires (seconds)
    #[arg(long = "posture-alert-secs", env = "POSTURE_ALERT_SECONDS", default_value_t = DEFAULT_POSTURE_ALERT_SECS)]
    pub posture_alert_secs: u64,

    /// Serial poll rate (Hz)
    #[arg(long = "poll-hz", default_value_t = DEFAULT_POLL_HZ)]
    pub poll_hz: u32,

    /// Time without frames before the sensor is reported offline (ms)
    #[arg(long = "offline-timeout-ms", env = "ABSENT_TIMEOUT_MS", default_value_t = DEFAULT_OFFLINE_TIMEOUT_MS)]
    pub offline_timeout_ms: u64,

    /// Simulate audio hardware (no capture or playback)
    #[arg(long = "mock-audio", env = "MOCK_AUDIO", default_value_t = false)]
    pub mock_audio: bool,

    /// ALSA device used for capture and playback
    #[arg(long = "audio-device", env = "AUDIO_DEVICE", default_value = DEFAULT_AUDIO_DEVICE)]
    pub audio_device: String,

    /// Capture through cpal instead of arecord/aplay
    #[cfg(feature = "cpal-audio")]
    #[arg(long = "cpal", default_value_t = false)]
    pub use_cpal: bool,

    /// Capture sample rate (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Capture chunk size (ms)
    #[arg(long = "chunk-ms", default_value_t = DEFAULT_CHUNK_MS)]
    pub chunk_ms: u64,

    /// Gain applied to microphone audio before wake-word scoring
    #[arg(long = "audio-gain", env = "AUDIO_GAIN", default_value_t = DEFAULT_AUDIO_GAIN)]
    pub audio_gain: f32,

    /// Wake word name, used to strip it from transcripts
    #[arg(long = "wake-word", env = "WAKE_WORD", default_value = DEFAULT_WAKE_WORD)]
    pub wake_word: String,

    /// Wake-word detection threshold (0-1]
    #[arg(long = "wake-threshold", env = "WAKE_WORD_THRESHOLD", default_value_t = DEFAULT_WAKE_THRESHOLD)]
    pub wake_threshold: f32,

    /// Scorer process that reads raw S16LE chunks on stdin and prints one score per line
    #[arg(long = "wake-word-cmd", env = "WAKE_WORD_CMD")]
    pub wake_word_cmd: Option<String>,

    /// Log every wake-word score
    #[arg(long = "wake-word-debug", env = "WAKE_WORD_DEBUG", default_value_t = false)]
    pub wake_word_debug: bool,

    /// Disable wake-word triggering (bypass listen still works)
    #[arg(long = "disable-wake-word", env = "DISABLE_WAKE_WORD", default_value_t = false)]
    pub disable_wake_word: bool,

    /// Assistant-mode capture limit (ms)
    #[arg(long = "assistant-limit-ms", default_value_t = DEFAULT_ASSISTANT_LIMIT_MS)]
    pub assistant_limit_ms: u64,

    /// Notes-mode capture limit (ms)
    #[arg(long = "notes-limit-ms", default_value_t = DEFAULT_NOTES_LIMIT_MS)]
    pub notes_limit_ms: u64,

    /// RMS level below which a chunk counts as silence (0-1)
    #[arg(long = "silence-rms", env = "SILENCE_THRESHOLD", default_value_t = DEFAULT_SILENCE_RMS)]
    pub silence_rms: f32,

    /// Trailing silence that ends an assistant capture (ms)
    #[arg(long = "silence-ms", default_value_t = DEFAULT_SILENCE_DURATION_MS)]
    pub silence_ms: u64,

    /// Captures shorter than this are not transcribed (ms)
    #[arg(long = "min-command-ms", default_value_t = DEFAULT_MIN_COMMAND_MS)]
    pub min_command_ms: u64,

    /// Wake-word cooldown after each cycle (ms)
    #[arg(long = "cooldown-ms", env = "COMMAND_COOLDOWN_MS", default_value_t = DEFAULT_COOLDOWN_MS)]
    pub cooldown_ms: u64,

    /// Whisper ASR webservice base URL
    #[arg(long = "whisper-url", env = "WHISPER_URL")]
    pub whisper_url: Option<String>,

    /// ElevenLabs API key, used when no Whisper URL is configured
    #[arg(long = "elevenlabs-api-key", env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: Option<String>,

    /// Local whisper.cpp model (requires the `whisper` feature)
    #[arg(long = "whisper-model-path", env = "WHISPER_MODEL_PATH")]
    pub whisper_model_path: Option<PathBuf>,

    /// Transcription language
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Piper binary
    #[arg(long = "piper-cmd", env = "PIPER_CMD", default_value = "piper")]
    pub piper_cmd: String,

    /// Piper voice name or path to its .onnx model
    #[arg(long = "piper-voice", env = "PIPER_VOICE", default_value = DEFAULT_PIPER_VOICE)]
    pub piper_voice: String,

    /// Directory searched for Piper voices given by name
    #[arg(long = "piper-voice-dir", env = "PIPER_VOICE_DIR", default_value = "voices")]
    pub piper_voice_dir: PathBuf,

    /// Initial TTS volume (0-100)
    #[arg(long = "tts-volume", default_value_t = DEFAULT_TTS_VOLUME)]
    pub tts_volume: u8,

    /// Pending speak requests kept before rejecting new ones
    #[arg(long = "speak-queue", default_value_t = DEFAULT_SPEAK_QUEUE)]
    pub speak_queue: usize,

    /// Dashboard base URL notified of voice state changes
    #[arg(long = "dashboard-url", env = "DASHBOARD_URL")]
    pub dashboard_url: Option<String>,

    /// Bearer token for the dashboard sync endpoint
    #[arg(long = "sync-api-key", env = "SYNC_API_KEY", hide_env_values = true)]
    pub sync_api_key: Option<String>,
}

/// Presence engine tunables derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub max_presence_cm: u32,
    pub zone_near_cm: u32,
    pub zone_medium_cm: u32,
    pub posture_threshold: Duration,
    pub poll_period: Duration,
    pub offline_timeout: Duration,
    pub edge_poll_period: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            max_presence_cm: DEFAULT_MAX_PRESENCE_CM,
            zone_near_cm: DEFAULT_ZONE_NEAR_CM,
            zone_medium_cm: DEFAULT_ZONE_MEDIUM_CM,
            posture_threshold: Duration::from_secs(DEFAULT_POSTURE_ALERT_SECS),
            poll_period: Duration::from_millis(1000 / u64::from(DEFAULT_POLL_HZ)),
            offline_timeout: Duration::from_millis(DEFAULT_OFFLINE_TIMEOUT_MS),
            edge_poll_period: Duration::from_millis(EDGE_POLL_MS),
        }
    }
}

/// Voice coordinator tunables derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub sample_rate: u32,
    pub chunk_ms: u64,
    pub assistant_limit: Duration,
    pub notes_limit: Duration,
    pub silence_rms: f32,
    pub silence_duration: Duration,
    pub min_command: Duration,
    pub cooldown: Duration,
    pub capture_flush: Duration,
    pub playback_flush: Duration,
    pub playback_settle: Duration,
    pub wake_threshold: f32,
    pub audio_gain: f32,
    pub wake_word: String,
    pub wake_word_debug: bool,
    pub wake_word_disabled: bool,
    pub tts_volume: u8,
    pub speak_queue: usize,
    pub mock_listen_delay: Duration,
    pub mock_think_delay: Duration,
}

impl VoiceConfig {
    pub fn chunk_samples(&self) -> usize {
        ((u64::from(self.sample_rate) * self.chunk_ms) / 1000).max(1) as usize
    }

    pub fn samples_for(&self, duration: Duration) -> usize {
        (u128::from(self.sample_rate) * duration.as_millis() / 1000) as usize
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            chunk_ms: DEFAULT_CHUNK_MS,
            assistant_limit: Duration::from_millis(DEFAULT_ASSISTANT_LIMIT_MS),
            notes_limit: Duration::from_millis(DEFAULT_NOTES_LIMIT_MS),
            silence_rms: DEFAULT_SILENCE_RMS,
            silence_duration: Duration::from_millis(DEFAULT_SILENCE_DURATION_MS),
            min_command: Duration::from_millis(DEFAULT_MIN_COMMAND_MS),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            capture_flush: Duration::from_millis(DEFAULT_CAPTURE_FLUSH_MS),
            playback_flush: Duration::from_millis(DEFAULT_PLAYBACK_FLUSH_MS),
            playback_settle: Duration::from_millis(DEFAULT_PLAYBACK_SETTLE_MS),
            wake_threshold: DEFAULT_WAKE_THRESHOLD,
            audio_gain: DEFAULT_AUDIO_GAIN,
            wake_word: DEFAULT_WAKE_WORD.to_string(),
            wake_word_debug: false,
            wake_word_disabled: false,
            tts_volume: DEFAULT_TTS_VOLUME,
            speak_queue: DEFAULT_SPEAK_QUEUE,
            mock_listen_delay: Duration::from_millis(DEFAULT_MOCK_LISTEN_MS),
            mock_think_delay: Duration::from_millis(DEFAULT_MOCK_THINK_MS),
        }
    }
}
