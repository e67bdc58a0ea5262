//! Text-to-speech backends.

use crate::config::AppConfig;
use crate::error::BackendError;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const PIPER_FALLBACK_RATE: u32 = 22_050;
const MOCK_MS_PER_CHAR: u64 = 50;
const MOCK_SAMPLE_RATE: u32 = 16_000;

/// Mono PCM ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

pub trait TextToSpeech: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Synthesized, BackendError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct VoiceMetadata {
    audio: VoiceAudio,
}

#[derive(Debug, Deserialize)]
struct VoiceAudio {
    sample_rate: u32,
}

/// The `piper` CLI with `--output-raw`: text on stdin, S16LE mono on stdout.
#[derive(Debug, Clone)]
pub struct PiperCommand {
    program: String,
    extra_args: Vec<String>,
    model: PathBuf,
    sample_rate: u32,
}

impl PiperCommand {
    /// `voice` is either a path to an `.onnx` model or a voice name looked up
    /// as `<voice_dir>/<voice>.onnx`.
    pub fn new(command: &str, voice: &str, voice_dir: &Path) -> Result<Self, BackendError> {
        let parts = shell_words::split(command.trim())
            .map_err(|err| BackendError::invalid("piper", err.to_string()))?;
        let Some((program, extra_args)) = parts.split_first() else {
            return Err(BackendError::NotConfigured("piper command"));
        };
        let model = resolve_voice(voice, voice_dir);
        if !model.is_file() {
            return Err(BackendError::invalid(
                "piper",
                format!("voice model {} not found", model.display()),
            ));
        }
        let sample_rate = read_sample_rate(&model).unwrap_or_else(|| {
            tracing::warn!(
                model = %model.display(),
                fallback = PIPER_FALLBACK_RATE,
                "voice metadata unreadable, assuming default sample rate"
            );
            PIPER_FALLBACK_RATE
        });
        Ok(Self {
            program: program.clone(),
            extra_args: extra_args.to_vec(),
            model,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn resolve_voice(voice: &str, voice_dir: &Path) -> PathBuf {
    let direct = Path::new(voice);
    if direct.extension().is_some_and(|ext| ext == "onnx") {
        return direct.to_path_buf();
    }
    voice_dir.join(format!("{voice}.onnx"))
}

fn read_sample_rate(model: &Path) -> Option<u32> {
    let mut meta = model.as_os_str().to_owned();
    meta.push(".json");
    let raw = std::fs::read_to_string(PathBuf::from(meta)).ok()?;
    let parsed: VoiceMetadata = serde_json::from_str(&raw).ok()?;
    Some(parsed.audio.sample_rate)
}

impl TextToSpeech for PiperCommand {
    fn synthesize(&self, text: &str) -> Result<Synthesized, BackendError> {
        let mut child = Command::new(&self.program)
            .args(&self.extra_args)
            .arg("--model")
            .arg(&self.model)
            .arg("--output-raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| BackendError::request("piper", err))?;
        if let Some(mut stdin) = child.stdin.take() {
            // One line per utterance; piper treats newlines as sentence breaks.
            let line = text.replace(['\n', '\r'], " ");
            stdin
                .write_all(line.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"))
                .map_err(|err| BackendError::request("piper", err))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|err| BackendError::request("piper", err))?;
        if !output.status.success() {
            return Err(BackendError::invalid(
                "piper",
                format!("exited with {}", output.status),
            ));
        }
        let samples: Vec<i16> = output
            .stdout
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if samples.is_empty() {
            return Err(BackendError::invalid("piper", "no audio produced"));
        }
        Ok(Synthesized {
            samples,
            sample_rate: self.sample_rate,
        })
    }

    fn name(&self) -> &'static str {
        "piper"
    }
}

/// Silence lasting 50 ms per character of input.
#[derive(Debug, Clone, Default)]
pub struct MockTts;

impl TextToSpeech for MockTts {
    fn synthesize(&self, text: &str) -> Result<Synthesized, BackendError> {
        let millis = text.chars().count() as u64 * MOCK_MS_PER_CHAR;
        let samples = (u64::from(MOCK_SAMPLE_RATE) * millis / 1000) as usize;
        Ok(Synthesized {
            samples: vec![0; samples],
            sample_rate: MOCK_SAMPLE_RATE,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Piper when its voice model is installed, otherwise nothing.
pub fn from_config(config: &AppConfig) -> Option<Box<dyn TextToSpeech>> {
    match PiperCommand::new(&config.piper_cmd, &config.piper_voice, &config.piper_voice_dir) {
        Ok(piper) => {
            tracing::info!(
                voice = %config.piper_voice,
                sample_rate = piper.sample_rate(),
                "text-to-speech via piper"
            );
            Some(Box::new(piper))
        }
        Err(err) => {
            tracing::warn!(error = %err, "text-to-speech unavailable");
            None
        }
    }
}
