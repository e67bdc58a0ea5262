pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod hardware;
mod lock;
pub mod presence;
mod shared;
pub mod stt;
mod telemetry;
pub mod tts;
pub mod voice;
pub mod wake;

pub(crate) use lock::lock_or_recover;
pub use shared::SharedState;
pub use telemetry::init_tracing;
