//! Serial link to the radar sensor.

use crate::error::SensorError;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Engineering-mode control frames understood by the sensor firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCommand {
    EnableEngineering,
    DisableEngineering,
}

impl SensorCommand {
    pub fn for_debug(enable: bool) -> Self {
        if enable {
            SensorCommand::EnableEngineering
        } else {
            SensorCommand::DisableEngineering
        }
    }

    pub fn frame(self) -> [u8; 12] {
        let opcode = match self {
            SensorCommand::EnableEngineering => 0x62,
            SensorCommand::DisableEngineering => 0x63,
        };
        [
            0xFD, 0xFC, 0xFB, 0xFA, 0x02, 0x00, opcode, 0x00, 0x04, 0x03, 0x02, 0x01,
        ]
    }
}

/// Byte source/sink the poll thread drives. Implemented by the real serial
/// port and by scripted links in tests.
pub trait SensorLink: Send {
    /// Read whatever is buffered without blocking longer than the link's
    /// timeout. `Ok(0)` means nothing arrived.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SensorError>;

    fn write_command(&mut self, command: SensorCommand) -> Result<(), SensorError>;

    fn describe(&self) -> String;
}

pub struct SerialSensor {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialSensor {
    const READ_TIMEOUT: Duration = Duration::from_millis(20);

    pub fn open(path: &str, baud: u32) -> Result<Self, SensorError> {
        let port = serialport::new(path, baud)
            .timeout(Self::READ_TIMEOUT)
            .open()
            .map_err(|source| SensorError::Open {
                path: path.to_string(),
                source,
            })?;
        // Stale bytes from before startup would only produce resync noise.
        let _ = port.clear(serialport::ClearBuffer::Input);
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl SensorLink for SerialSensor {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SensorError> {
        let waiting = self.port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(0);
        }
        let len = waiting.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn write_command(&mut self, command: SensorCommand) -> Result<(), SensorError> {
        self.port.write_all(&command.frame())?;
        self.port.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path, self.port.baud_rate().unwrap_or(0))
    }
}
