use super::dto::{DebugRequest, DebugResponse, DismissResponse, JsonBody, PresenceBody, PresenceQuery};
use super::error::ApiError;
use super::AppState;
use axum::extract::{Query, State};
use axum::extract::rejection::QueryRejection;
use axum::Json;

pub async fn get_presence(
    State(state): State<AppState>,
    query: Result<Query<PresenceQuery>, QueryRejection>,
) -> Result<Json<PresenceBody>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::validation(err.body_text()))?;
    if let Some(present) = query.present()? {
        if !state.presence.set_mock_presence(present) {
            tracing::debug!(present, "presence override ignored; real sensor attached");
        }
    }
    Ok(Json(state.presence.snapshot().into()))
}

pub async fn set_debug(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<DebugRequest>,
) -> Result<Json<DebugResponse>, ApiError> {
    let enable = body.enable.unwrap_or(true);
    let presence = state.presence.clone();
    let success = tokio::task::spawn_blocking(move || presence.set_debug_mode(enable)).await?;
    let debug_mode = state.presence.snapshot().debug_mode;
    Ok(Json(DebugResponse {
        debug_mode,
        success,
    }))
}

pub async fn dismiss_posture(State(state): State<AppState>) -> Json<DismissResponse> {
    state.presence.dismiss_posture();
    Json(DismissResponse {
        dismissed: true,
        posture_alert: state.presence.snapshot().posture_alert,
    })
}
