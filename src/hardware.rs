//! Start-up capability probe.
//!
//! Every component is probed once. A failure falls back to the simulated
//! implementation for the rest of the process and is logged exactly once
//! here; nothing is retried mid-session.

use crate::audio::{AlsaCommandDevice, AudioDevice, MockAudio};
use crate::config::AppConfig;
use crate::presence::gpio::{EdgeSource, SysfsEdge};
use crate::presence::serial::{SensorLink, SerialSensor};
use crate::wake::{CommandWakeModel, WakeWordModel};
use std::sync::Arc;

pub struct HardwareProfile {
    pub sensor: Option<Box<dyn SensorLink>>,
    pub edge: Option<Box<dyn EdgeSource>>,
    pub audio: Arc<dyn AudioDevice>,
    pub wake: Option<Box<dyn WakeWordModel>>,
}

impl HardwareProfile {
    pub fn probe(config: &AppConfig) -> Self {
        let sensor = probe_sensor(config);
        let edge = if sensor.is_some() { probe_edge(config) } else { None };
        let audio = probe_audio(config);
        let wake = if audio.is_simulated() {
            None
        } else {
            probe_wake(config)
        };
        let profile = Self {
            sensor,
            edge,
            audio,
            wake,
        };
        tracing::info!(
            sensor = profile.sensor.is_some(),
            gpio = profile.edge.is_some(),
            audio = profile.audio.name(),
            wake_word = profile.wake.is_some(),
            "hardware probe finished"
        );
        profile
    }
}

fn probe_sensor(config: &AppConfig) -> Option<Box<dyn SensorLink>> {
    if config.mock_presence {
        tracing::info!("presence sensor simulated (--mock-presence)");
        return None;
    }
    match SerialSensor::open(&config.serial_port, config.serial_baud) {
        Ok(sensor) => Some(Box::new(sensor)),
        Err(err) => {
            tracing::warn!(
                port = %config.serial_port,
                error = %err,
                "presence sensor unavailable; using simulated sensor"
            );
            None
        }
    }
}

fn probe_edge(config: &AppConfig) -> Option<Box<dyn EdgeSource>> {
    if config.no_gpio {
        return None;
    }
    match SysfsEdge::export(config.gpio_pin) {
        Ok(edge) => Some(Box::new(edge)),
        Err(err) => {
            tracing::warn!(
                pin = config.gpio_pin,
                error = %err,
                "presence GPIO line unavailable; serial only"
            );
            None
        }
    }
}

fn probe_audio(config: &AppConfig) -> Arc<dyn AudioDevice> {
    if config.mock_audio {
        tracing::info!("audio simulated (MOCK_AUDIO)");
        return Arc::new(MockAudio::realtime());
    }
    #[cfg(feature = "cpal-audio")]
    if config.use_cpal {
        let preferred = (config.audio_device != crate::config::DEFAULT_AUDIO_DEVICE)
            .then_some(config.audio_device.as_str());
        match crate::audio::CpalDevice::new(preferred) {
            Ok(device) => return Arc::new(device),
            Err(err) => {
                tracing::warn!(error = %err, "cpal audio unavailable; using simulated audio");
                return Arc::new(MockAudio::realtime());
            }
        }
    }
    if AlsaCommandDevice::probe() {
        return Arc::new(AlsaCommandDevice::new(config.audio_device.clone()));
    }
    tracing::warn!(device = %config.audio_device, "no capture device found; using simulated audio");
    Arc::new(MockAudio::realtime())
}

fn probe_wake(config: &AppConfig) -> Option<Box<dyn WakeWordModel>> {
    if config.disable_wake_word {
        tracing::info!("wake word disabled by configuration");
        return None;
    }
    let Some(command) = config.wake_word_cmd.as_deref() else {
        tracing::info!("no wake word scorer configured; listen via API only");
        return None;
    };
    match CommandWakeModel::spawn(command) {
        Ok(model) => Some(Box::new(model)),
        Err(err) => {
            tracing::warn!(error = %err, "wake word scorer failed to start; listen via API only");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn mock_flags_skip_every_device() {
        let config = AppConfig::parse_from(["test-app", "--mock-presence", "--mock-audio"]);
        let profile = HardwareProfile::probe(&config);
        assert!(profile.sensor.is_none());
        assert!(profile.edge.is_none());
        assert!(profile.audio.is_simulated());
        assert!(profile.wake.is_none());
    }

    #[test]
    fn missing_serial_port_falls_back_to_simulation() {
        let config = AppConfig::parse_from([
            "test-app",
            "--serial-port",
            "/dev/does-not-exist-hw-sidecar",
            "--mock-audio",
        ]);
        let profile = HardwareProfile::probe(&config);
        assert!(profile.sensor.is_none());
        assert!(profile.edge.is_none());
    }
}
