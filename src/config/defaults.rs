pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyS0";
pub const DEFAULT_SERIAL_BAUD: u32 = 115_200;
pub const DEFAULT_GPIO_PIN: u32 = 23;

pub const DEFAULT_MAX_PRESENCE_CM: u32 = 140;
pub const DEFAULT_ZONE_NEAR_CM: u32 = 50;
pub const DEFAULT_ZONE_MEDIUM_CM: u32 = 100;
pub const DEFAULT_POSTURE_ALERT_SECS: u64 = 300;
pub const DEFAULT_POLL_HZ: u32 = 10;
pub const DEFAULT_OFFLINE_TIMEOUT_MS: u64 = 3_000;
pub const EDGE_POLL_MS: u64 = 10;

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_CHUNK_MS: u64 = 160;
pub const DEFAULT_ASSISTANT_LIMIT_MS: u64 = 10_000;
pub const DEFAULT_NOTES_LIMIT_MS: u64 = 120_000;
pub const DEFAULT_SILENCE_RMS: f32 = 0.01;
pub const DEFAULT_SILENCE_DURATION_MS: u64 = 1_500;
pub const DEFAULT_COOLDOWN_MS: u64 = 5_000;
pub const DEFAULT_MIN_COMMAND_MS: u64 = 500;
pub const DEFAULT_CAPTURE_FLUSH_MS: u64 = 500;
pub const DEFAULT_PLAYBACK_FLUSH_MS: u64 = 1_000;
pub const DEFAULT_PLAYBACK_SETTLE_MS: u64 = 300;
pub const DEFAULT_WAKE_THRESHOLD: f32 = 0.40;
pub const DEFAULT_AUDIO_GAIN: f32 = 1.0;
pub const DEFAULT_TTS_VOLUME: u8 = 80;
pub const DEFAULT_SPEAK_QUEUE: usize = 8;
pub const DEFAULT_WAKE_WORD: &str = "jarvis";
pub const DEFAULT_PIPER_VOICE: &str = "en_US-lessac-medium";
pub const DEFAULT_AUDIO_DEVICE: &str = "default";
pub const DEFAULT_MOCK_LISTEN_MS: u64 = 500;
pub const DEFAULT_MOCK_THINK_MS: u64 = 300;

pub const MAX_SPEAK_CHARS: usize = 5_000;
pub const MAX_COOLDOWN_MS: u64 = 60_000;
pub const MAX_CAPTURE_HARD_LIMIT_MS: u64 = 600_000;
pub const FORBIDDEN_DEVICE_CHARS: &[char] = &[';', '|', '&', '$', '`', '<', '>', '\n', '\r'];
