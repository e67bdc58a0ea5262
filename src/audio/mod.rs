//! Audio capture and voice activity detection.
//!
//! Captures 16 kHz mono PCM in fixed-size chunks from an [`AudioDevice`],
//! end-points assistant commands on trailing silence, and plays synthesized
//! speech back through the same device.

mod capture;
mod convert;
#[cfg(feature = "cpal-audio")]
mod cpal_device;
mod device;
mod meter;
mod vad;
mod wav;

pub use capture::{
    capture, log_capture_metrics, CaptureControl, CaptureMetrics, CapturePlan, CaptureResult,
    SilencePolicy, StopReason,
};
pub use convert::{apply_gain, downmix, f32_to_i16, i16_to_f32, resample_linear, scale_volume};
#[cfg(feature = "cpal-audio")]
pub use cpal_device::CpalDevice;
pub use device::{AlsaCommandDevice, AudioDevice, AudioInput, MockAudio};
pub use meter::{amplitude_to_db, rms, rms_db};
pub use vad::{SimpleThresholdVad, VadDecision, VadEngine};
pub use wav::encode_wav;
