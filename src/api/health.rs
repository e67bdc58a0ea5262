use super::dto::HealthResponse;
use super::error::ApiError;
use super::AppState;
use axum::extract::State;
use axum::Json;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        presence: state.presence.snapshot().into(),
        voice: state.voice.status(),
        decoder: state.presence.decoder_stats(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
