//! Speech-to-text backends.
//!
//! Every backend takes 16-bit mono PCM and returns the raw transcript; the
//! voice coordinator cleans it up afterwards. Backends are blocking and are
//! only ever called from the coordinator thread.

use crate::audio::encode_wav;
use crate::config::AppConfig;
use crate::error::BackendError;
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ELEVENLABS_STT_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text";
const ELEVENLABS_MODEL: &str = "scribe_v1";

pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, BackendError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct TranscriptBody {
    #[serde(default)]
    text: String,
}

fn http_client(backend: &'static str) -> Result<Client, BackendError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|err| BackendError::request(backend, err))
}

fn wav_part(backend: &'static str, samples: &[i16], sample_rate: u32) -> Result<multipart::Part, BackendError> {
    let wav = encode_wav(samples, sample_rate).map_err(|err| BackendError::request(backend, err))?;
    multipart::Part::bytes(wav)
        .file_name("audio.wav")
        .mime_str("audio/wav")
        .map_err(|err| BackendError::request(backend, err))
}

fn read_transcript(
    backend: &'static str,
    response: reqwest::blocking::Response,
) -> Result<String, BackendError> {
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Status {
            backend,
            status: status.as_u16(),
        });
    }
    let body: TranscriptBody = response
        .json()
        .map_err(|err| BackendError::invalid(backend, err.to_string()))?;
    Ok(body.text.trim().to_string())
}

/// Self-hosted whisper ASR webservice (`POST {base}/asr?output=json`).
pub struct WhisperHttp {
    endpoint: String,
    language: String,
    client: Client,
}

impl WhisperHttp {
    pub fn new(base_url: &str, language: &str) -> Result<Self, BackendError> {
        Ok(Self {
            endpoint: format!("{}/asr", base_url.trim_end_matches('/')),
            language: language.to_string(),
            client: http_client("whisper")?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SpeechToText for WhisperHttp {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, BackendError> {
        let form = multipart::Form::new().part("audio_file", wav_part("whisper", samples, sample_rate)?);
        let mut query = vec![("output", "json")];
        if !self.language.eq_ignore_ascii_case("auto") {
            query.push(("language", self.language.as_str()));
        }
        let response = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .multipart(form)
            .send()
            .map_err(|err| BackendError::request("whisper", err))?;
        read_transcript("whisper", response)
    }

    fn name(&self) -> &'static str {
        "whisper-http"
    }
}

/// ElevenLabs hosted transcription.
pub struct ElevenLabsStt {
    api_key: String,
    language: String,
    client: Client,
}

impl ElevenLabsStt {
    pub fn new(api_key: &str, language: &str) -> Result<Self, BackendError> {
        Ok(Self {
            api_key: api_key.to_string(),
            language: language.to_string(),
            client: http_client("elevenlabs")?,
        })
    }
}

impl SpeechToText for ElevenLabsStt {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, BackendError> {
        let form = multipart::Form::new()
            .part("file", wav_part("elevenlabs", samples, sample_rate)?)
            .text("model_id", ELEVENLABS_MODEL)
            .text("language_code", self.language.clone());
        let response = self
            .client
            .post(ELEVENLABS_STT_URL)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .map_err(|err| BackendError::request("elevenlabs", err))?;
        read_transcript("elevenlabs", response)
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}

/// Canned transcript, for mock audio and tests.
#[derive(Debug, Clone)]
pub struct MockStt {
    pub response: Result<String, String>,
}

impl MockStt {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(message.into()),
        }
    }
}

impl SpeechToText for MockStt {
    fn transcribe(&self, _samples: &[i16], _sample_rate: u32) -> Result<String, BackendError> {
        self.response
            .clone()
            .map_err(|message| BackendError::request("mock-stt", message))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(feature = "whisper")]
mod local {
    use super::SpeechToText;
    use crate::audio::i16_to_f32;
    use crate::error::BackendError;
    use std::os::raw::{c_char, c_uint, c_void};
    use std::sync::Once;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// whisper.cpp model loaded once and reused for every capture.
    pub struct LocalWhisper {
        ctx: WhisperContext,
        language: String,
    }

    impl LocalWhisper {
        pub fn load(model_path: &str, language: &str) -> Result<Self, BackendError> {
            install_whisper_log_silencer();
            let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
                .map_err(|err| BackendError::request("local-whisper", err))?;
            Ok(Self {
                ctx,
                language: language.to_string(),
            })
        }
    }

    impl SpeechToText for LocalWhisper {
        fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, BackendError> {
            if sample_rate != 16_000 {
                return Err(BackendError::invalid(
                    "local-whisper",
                    format!("expects 16 kHz audio, got {sample_rate} Hz"),
                ));
            }
            let mut state = self
                .ctx
                .create_state()
                .map_err(|err| BackendError::request("local-whisper", err))?;
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            if self.language.eq_ignore_ascii_case("auto") {
                params.set_language(None);
                params.set_detect_language(true);
            } else {
                params.set_language(Some(&self.language));
                params.set_detect_language(false);
            }
            params.set_n_threads(num_cpus::get().min(4) as i32);
            params.set_print_progress(false);
            params.set_print_timestamps(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_translate(false);
            state
                .full(params, &i16_to_f32(samples))
                .map_err(|err| BackendError::request("local-whisper", err))?;

            let segments = state
                .full_n_segments()
                .map_err(|err| BackendError::request("local-whisper", err))?;
            let mut transcript = String::new();
            for i in 0..segments.max(0) {
                match state.full_get_segment_text_lossy(i) {
                    Ok(text) => transcript.push_str(&text),
                    Err(err) => tracing::debug!(segment = i, error = %err, "unreadable whisper segment"),
                }
            }
            Ok(transcript)
        }

        fn name(&self) -> &'static str {
            "local-whisper"
        }
    }

    fn install_whisper_log_silencer() {
        static INSTALL_LOG_CALLBACK: Once = Once::new();
        INSTALL_LOG_CALLBACK.call_once(|| unsafe {
            whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
        });
    }

    unsafe extern "C" fn whisper_log_callback(
        _level: c_uint,
        _text: *const c_char,
        _user_data: *mut c_void,
    ) {
    }
}

#[cfg(feature = "whisper")]
pub use local::LocalWhisper;

/// Pick the configured backend: the Whisper webservice first, ElevenLabs
/// when only its key is set, then a local model when built with `whisper`.
pub fn from_config(config: &AppConfig) -> Result<Option<Box<dyn SpeechToText>>, BackendError> {
    if let Some(url) = config.whisper_url.as_deref() {
        let backend = WhisperHttp::new(url, &config.lang)?;
        tracing::info!(endpoint = backend.endpoint(), "speech-to-text via whisper webservice");
        return Ok(Some(Box::new(backend)));
    }
    if let Some(key) = config.elevenlabs_api_key.as_deref() {
        tracing::info!("speech-to-text via elevenlabs");
        return Ok(Some(Box::new(ElevenLabsStt::new(key, &config.lang)?)));
    }
    #[cfg(feature = "whisper")]
    if let Some(path) = config.whisper_model_path.as_deref() {
        let path = path.to_string_lossy();
        tracing::info!(model = %path, "speech-to-text via local whisper");
        return Ok(Some(Box::new(LocalWhisper::load(&path, &config.lang)?)));
    }
    #[cfg(not(feature = "whisper"))]
    if config.whisper_model_path.is_some() {
        tracing::warn!("--whisper-model-path ignored: built without the `whisper` feature");
    }
    Ok(None)
}
