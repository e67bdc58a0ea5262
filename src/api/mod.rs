//! HTTP surface over the presence engine and the voice coordinator.

pub mod dto;
pub mod error;
mod health;
mod presence;
mod voice;

#[cfg(test)]
mod tests;

use crate::presence::PresenceEngine;
use crate::voice::VoiceCoordinator;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub presence: Arc<PresenceEngine>,
    pub voice: Arc<VoiceCoordinator>,
}

pub fn router(state: AppState) -> Router {
    let presence_routes = Router::new()
        .route("/presence", get(presence::get_presence))
        .route("/presence/debug", post(presence::set_debug))
        .route("/presence/posture/dismiss", post(presence::dismiss_posture));

    let voice_routes = Router::new()
        .route("/voice/status", get(voice::status))
        .route("/voice/speak", post(voice::speak))
        .route("/voice/enable", post(voice::enable))
        .route("/voice/mock-wake", post(voice::mock_wake))
        .route("/voice/listen", post(voice::listen))
        .route("/voice/stop-recording", post(voice::stop_recording))
        .route("/voice/pause", post(voice::pause))
        .route("/voice/resume", post(voice::resume))
        .route("/voice/cancel", post(voice::cancel))
        .route("/voice/clear-transcript", post(voice::clear_transcript))
        .route("/voice/volume", get(voice::get_volume).post(voice::set_volume));

    Router::new()
        .route("/health", get(health::health))
        .merge(presence_routes)
        .merge(voice_routes)
        .fallback(health::not_found)
        .layer(axum::middleware::map_response(json_method_not_allowed))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The router answers a known path with the wrong method using an empty
/// 405; give it the same JSON shape as every other error.
async fn json_method_not_allowed(response: Response) -> Response {
    if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        let allow = response.headers().get(axum::http::header::ALLOW).cloned();
        let mut json = ApiError::MethodNotAllowed.into_response();
        if let Some(allow) = allow {
            json.headers_mut().insert(axum::http::header::ALLOW, allow);
        }
        return json;
    }
    response
}
