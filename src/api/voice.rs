use super::dto::{
    EnableRequest, JsonBody, ListenRequest, ListenResponse, MockWakeRequest, SpeakBody,
    SpeakResponse, StatusResponse, TranscriptResponse, VolumeRequest, VolumeResponse,
};
use super::error::ApiError;
use super::AppState;
use crate::voice::VoiceStatus;
use axum::extract::State;
use axum::Json;

pub async fn status(State(state): State<AppState>) -> Json<VoiceStatus> {
    Json(state.voice.status())
}

pub async fn speak(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SpeakBody>,
) -> Result<Json<SpeakResponse>, ApiError> {
    state.voice.speak(&body.text, body.priority)?;
    Ok(Json(SpeakResponse {
        status: "queued",
        text: body.text.trim().to_string(),
        priority: body.priority,
    }))
}

pub async fn enable(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EnableRequest>,
) -> Json<VoiceStatus> {
    Json(state.voice.set_enabled(body.enabled.unwrap_or(true)))
}

pub async fn mock_wake(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<MockWakeRequest>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let transcript = body.transcript().to_string();
    let voice = state.voice.clone();
    let transcript = tokio::task::spawn_blocking(move || voice.mock_wake(&transcript)).await??;
    Ok(Json(TranscriptResponse { transcript }))
}

pub async fn listen(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ListenRequest>,
) -> Result<Json<ListenResponse>, ApiError> {
    let mode = body.mode()?;
    state.voice.listen(mode)?;
    Ok(Json(ListenResponse {
        status: "listening",
        mode,
    }))
}

pub async fn stop_recording(State(state): State<AppState>) -> Json<StatusResponse> {
    state.voice.stop_recording();
    Json(StatusResponse { status: "stopped" })
}

pub async fn pause(State(state): State<AppState>) -> Json<StatusResponse> {
    state.voice.pause();
    Json(StatusResponse { status: "paused" })
}

pub async fn resume(State(state): State<AppState>) -> Json<StatusResponse> {
    state.voice.resume();
    Json(StatusResponse { status: "resumed" })
}

pub async fn cancel(State(state): State<AppState>) -> Json<StatusResponse> {
    state.voice.cancel();
    Json(StatusResponse { status: "cancelled" })
}

pub async fn clear_transcript(State(state): State<AppState>) -> Json<StatusResponse> {
    state.voice.clear_transcript();
    Json(StatusResponse { status: "cleared" })
}

pub async fn get_volume(State(state): State<AppState>) -> Json<VolumeResponse> {
    Json(VolumeResponse {
        volume: state.voice.volume(),
    })
}

pub async fn set_volume(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<VolumeRequest>,
) -> Result<Json<VolumeResponse>, ApiError> {
    let volume = state.voice.set_volume(body.volume()?)?;
    Ok(Json(VolumeResponse { volume }))
}
