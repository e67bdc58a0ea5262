//! Error types shared by the hardware-facing collaborators.

use std::io;
use thiserror::Error;

/// Failures talking to the presence sensor or its digital line.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("gpio {pin}: {message}")]
    Gpio { pin: u32, message: String },
}

/// Failures from the microphone or speaker.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("audio stream closed")]
    StreamClosed,

    #[error("audio I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio hardware unavailable")]
    Unavailable,
}

/// Failures from the speech backends (wake-word scorer, STT, TTS).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} request failed: {message}")]
    Request {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} returned HTTP {status}")]
    Status { backend: &'static str, status: u16 },

    #[error("{backend} produced unusable output: {message}")]
    InvalidResponse {
        backend: &'static str,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

impl BackendError {
    pub fn request(backend: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Request {
            backend,
            message: err.to_string(),
        }
    }

    pub fn invalid(backend: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            backend,
            message: message.into(),
        }
    }
}
