//! Digital presence line, sampled through the sysfs GPIO interface.

use crate::error::SensorError;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// A binary "something is near" input.
pub trait EdgeSource: Send {
    fn level(&mut self) -> Result<bool, SensorError>;
}

pub struct SysfsEdge {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsEdge {
    const ROOT: &'static str = "/sys/class/gpio";

    /// Export `pin` as an input if needed and verify it can be read.
    pub fn export(pin: u32) -> Result<Self, SensorError> {
        Self::export_under(Path::new(Self::ROOT), pin)
    }

    fn export_under(root: &Path, pin: u32) -> Result<Self, SensorError> {
        let gpio_err = |message: String| SensorError::Gpio { pin, message };
        let dir = root.join(format!("gpio{pin}"));
        if !dir.exists() {
            fs::write(root.join("export"), pin.to_string())
                .map_err(|err| gpio_err(format!("export failed: {err}")))?;
            // udev applies permissions asynchronously after export.
            thread::sleep(Duration::from_millis(100));
        }
        fs::write(dir.join("direction"), "in")
            .map_err(|err| gpio_err(format!("set direction failed: {err}")))?;
        let mut edge = Self {
            pin,
            value_path: dir.join("value"),
        };
        edge.level()?;
        Ok(edge)
    }
}

impl EdgeSource for SysfsEdge {
    fn level(&mut self) -> Result<bool, SensorError> {
        let raw = fs::read_to_string(&self.value_path).map_err(|err| SensorError::Gpio {
            pin: self.pin,
            message: format!("read failed: {err}"),
        })?;
        Ok(raw.trim() == "1")
    }
}
