use super::*;
use crate::audio::MockAudio;
use crate::config::{PresenceConfig, VoiceConfig};
use crate::tts::MockTts;
use crate::voice::{TranscriptOnly, VoiceBackends};
use axum::body::Body;
use axum::http::{Method, Request};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

fn voice_config() -> VoiceConfig {
    VoiceConfig {
        mock_listen_delay: Duration::from_millis(20),
        mock_think_delay: Duration::from_millis(20),
        playback_settle: Duration::from_millis(5),
        ..VoiceConfig::default()
    }
}

fn test_state(config: VoiceConfig) -> AppState {
    let presence = PresenceEngine::start(PresenceConfig::default(), None, None);
    let voice = VoiceCoordinator::start(
        config,
        VoiceBackends {
            device: Arc::new(MockAudio::default()),
            wake: None,
            stt: None,
            tts: Some(Box::new(MockTts)),
            responder: Box::new(TranscriptOnly),
            notifier: None,
        },
    );
    AppState {
        presence: Arc::new(presence),
        voice: Arc::new(voice),
    }
}

fn shutdown(state: &AppState) {
    state.voice.shutdown();
    state.presence.shutdown();
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_both_subsystems() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["presence"].is_object());
    assert_eq!(body["voice"]["state"], "idle");
    assert!(body["decoder"]["frames_decoded"].is_u64());
    shutdown(&state);
}

#[tokio::test]
async fn presence_uses_snake_case_and_accepts_override() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::GET, "/presence", None).await;
    assert_eq!(status, StatusCode::OK);
    for key in [
        "is_present",
        "distance",
        "zone",
        "last_seen",
        "sensor_online",
        "mock",
        "motion_type",
        "gpio_available",
        "gpio_present",
        "posture_alert",
        "too_close_duration",
        "debug_mode",
        "gate_energies",
    ] {
        assert!(body.get(key).is_some(), "missing {key}");
    }
    assert!(body.get("isPresent").is_none());
    assert_eq!(body["mock"], true);
    let last_seen = body["last_seen"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(last_seen).is_ok());

    let (_, body) = call(&app, Method::GET, "/presence?present=true", None).await;
    assert_eq!(body["is_present"], true);
    let (_, body) = call(&app, Method::GET, "/presence?present=false", None).await;
    assert_eq!(body["is_present"], false);

    let (status, body) = call(&app, Method::GET, "/presence?present=maybe", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    shutdown(&state);
}

#[tokio::test]
async fn debug_toggle_validates_boolean() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::POST, "/presence/debug", Some(json!({"enable": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["debug_mode"], true);
    assert_eq!(body["success"], true);

    let (_, body) = call(&app, Method::POST, "/presence/debug", Some(json!({"enable": false}))).await;
    assert_eq!(body["debug_mode"], false);

    let (status, body) = call(&app, Method::POST, "/presence/debug", Some(json!({"enable": "yes"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(state.presence.snapshot().debug_mode, false);

    let (status, body) = call(&app, Method::POST, "/presence/posture/dismiss", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dismissed"], true);
    assert_eq!(body["posture_alert"], false);
    shutdown(&state);
}

#[tokio::test]
async fn voice_status_shape() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::GET, "/voice/status", None).await;
    assert_eq!(status, StatusCode::OK);
    for key in ["state", "last_transcript", "error", "enabled", "tts_volume", "mock", "wake_word_disabled"] {
        assert!(body.get(key).is_some(), "missing {key}");
    }
    assert_eq!(body["capabilities"]["wake_word"], false);
    assert_eq!(body["capabilities"]["tts"], true);
    assert!(body.get("lastTranscript").is_none());
    shutdown(&state);
}

#[tokio::test]
async fn speak_validates_text() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::POST, "/voice/speak", Some(json!({"text": "hi", "priority": 2}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "queued", "text": "hi", "priority": 2}));

    let padded = format!("{} ", "x".repeat(5000));
    for bad in [json!({"text": ""}), json!({}), json!({"text": "x".repeat(5001)}), json!({"text": padded})] {
        let (status, body) = call(&app, Method::POST, "/voice/speak", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    let (status, _) = call(&app, Method::POST, "/voice/speak", Some(json!({"text": "hi", "priority": "high"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    shutdown(&state);
}

#[tokio::test]
async fn mock_wake_conflicts_while_listening() {
    let config = VoiceConfig {
        mock_listen_delay: Duration::from_secs(5),
        ..voice_config()
    };
    let state = test_state(config);
    let app = router(state.clone());

    let (status, body) = call(&app, Method::POST, "/voice/listen", Some(json!({"mode": "notes"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "listening", "mode": "notes"}));

    let before = state.voice.state();
    let (status, body) = call(&app, Method::POST, "/voice/mock-wake", Some(json!({"transcript": "hello"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "voice coordinator busy (listening)");
    assert_eq!(state.voice.state(), before);

    let (status, _) = call(&app, Method::POST, "/voice/listen", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, Method::POST, "/voice/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(state.voice.state().state, crate::voice::VoicePhase::Idle);
    shutdown(&state);
}

#[tokio::test]
async fn mock_wake_returns_transcript() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::POST, "/voice/mock-wake", Some(json!({"transcript": "hello"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"], "hello");

    let (_, body) = call(&app, Method::POST, "/voice/mock-wake", None).await;
    assert_eq!(body["transcript"], "show news");

    let (status, _) = call(&app, Method::POST, "/voice/listen", Some(json!({"mode": "invalid"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    shutdown(&state);
}

#[tokio::test]
async fn volume_rejects_bad_values_without_change() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::POST, "/voice/volume", Some(json!({"volume": 55}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["volume"], 55);

    for bad in [json!({"volume": "abc"}), json!({"volume": 150}), json!({"volume": -1}), json!({"volume": 12.5}), json!({})] {
        let (status, body) = call(&app, Method::POST, "/voice/volume", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
    let (_, body) = call(&app, Method::GET, "/voice/volume", None).await;
    assert_eq!(body["volume"], 55);
    shutdown(&state);
}

#[tokio::test]
async fn control_endpoints_report_status() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    for (path, expected) in [
        ("/voice/pause", "paused"),
        ("/voice/resume", "resumed"),
        ("/voice/cancel", "cancelled"),
        ("/voice/clear-transcript", "cleared"),
        ("/voice/stop-recording", "stopped"),
    ] {
        let (status, body) = call(&app, Method::POST, path, None).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(body["status"], expected);
    }

    let (status, body) = call(&app, Method::POST, "/voice/enable", Some(json!({"enabled": false}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);
    let (status, _) = call(&app, Method::POST, "/voice/mock-wake", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, body) = call(&app, Method::POST, "/voice/enable", None).await;
    assert_eq!(body["enabled"], true);
    shutdown(&state);
}

#[tokio::test]
async fn unknown_routes_and_methods_return_json() {
    let state = test_state(voice_config());
    let app = router(state.clone());

    let (status, body) = call(&app, Method::GET, "/nonexistent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");

    let (status, body) = call(&app, Method::DELETE, "/health", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "method not allowed");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/voice/speak")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    shutdown(&state);
}
