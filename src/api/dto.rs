//! Request bodies and response shapes for the HTTP surface.

use super::error::ApiError;
use crate::presence::decoder::DecoderStats;
use crate::presence::frame::MotionType;
use crate::presence::zone::Zone;
use crate::presence::PresenceState;
use crate::voice::{RecordingMode, VoiceStatus};
use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MOCK_WAKE_TRANSCRIPT: &str = "show news";

/// JSON body extractor. An empty body deserializes to `T::default()`;
/// malformed JSON and wrong field types are reported as 400 JSON.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| ApiError::validation(err.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        serde_json::from_slice(&bytes)
            .map(Self)
            .map_err(|err| ApiError::validation(format!("invalid request body: {err}")))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PresenceQuery {
    pub present: Option<String>,
}

impl PresenceQuery {
    pub fn present(&self) -> Result<Option<bool>, ApiError> {
        let Some(raw) = self.present.as_deref() else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ApiError::validation(format!(
                "present must be true or false, got {raw:?}"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DebugRequest {
    #[serde(default)]
    pub enable: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeakBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnableRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MockWakeRequest {
    #[serde(default)]
    pub transcript: Option<String>,
}

impl MockWakeRequest {
    pub fn transcript(&self) -> &str {
        match self.transcript.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => DEFAULT_MOCK_WAKE_TRANSCRIPT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListenRequest {
    #[serde(default)]
    pub mode: Option<String>,
}

impl ListenRequest {
    pub fn mode(&self) -> Result<RecordingMode, ApiError> {
        match self.mode.as_deref() {
            None => Ok(RecordingMode::Assistant),
            Some(raw) => raw.parse::<RecordingMode>().map_err(ApiError::from),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VolumeRequest {
    #[serde(default)]
    pub volume: Option<i64>,
}

impl VolumeRequest {
    pub fn volume(&self) -> Result<u8, ApiError> {
        let volume = self
            .volume
            .ok_or_else(|| ApiError::validation("volume is required"))?;
        u8::try_from(volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| {
                ApiError::validation(format!("volume must be between 0 and 100, got {volume}"))
            })
    }
}

/// `GET /presence` body.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceBody {
    pub is_present: bool,
    pub distance: Option<u32>,
    pub zone: Zone,
    pub last_seen: String,
    pub sensor_online: bool,
    pub mock: bool,
    pub motion_type: MotionType,
    pub gpio_available: bool,
    pub gpio_present: bool,
    pub posture_alert: bool,
    pub too_close_duration: Option<f64>,
    pub debug_mode: bool,
    pub gate_energies: Option<Vec<u16>>,
}

impl From<PresenceState> for PresenceBody {
    fn from(state: PresenceState) -> Self {
        Self {
            is_present: state.is_present,
            distance: state.distance_cm,
            zone: state.zone,
            last_seen: state.last_seen.to_rfc3339_opts(SecondsFormat::Millis, true),
            sensor_online: state.sensor_online,
            mock: state.mock,
            motion_type: state.motion_type,
            gpio_available: state.gpio_available,
            gpio_present: state.gpio_present,
            posture_alert: state.posture_alert,
            too_close_duration: state.too_close_duration.map(|d| d.as_secs_f64()),
            debug_mode: state.debug_mode,
            gate_energies: state.gate_energies,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DebugResponse {
    pub debug_mode: bool,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub dismissed: bool,
    pub posture_alert: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SpeakResponse {
    pub status: &'static str,
    pub text: String,
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct ListenResponse {
    pub status: &'static str,
    pub mode: RecordingMode,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub transcript: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    pub volume: u8,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub presence: PresenceBody,
    pub voice: VoiceStatus,
    pub decoder: DecoderStats,
}
