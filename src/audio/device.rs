//! Microphone and speaker access.
//!
//! The coordinator only sees the [`AudioDevice`] / [`AudioInput`] traits. The
//! default backend shells out to ALSA's `arecord`/`aplay` with raw S16LE
//! mono PCM; [`MockAudio`] stands in when no sound card is present.

use crate::error::AudioError;
use std::io::{Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

/// Largest block pulled per read while flushing input.
const DISCARD_BLOCK: usize = 4_096;

/// An open capture stream producing 16-bit mono samples.
pub trait AudioInput: Send {
    /// Block until `samples` samples are available.
    fn read_chunk(&mut self, samples: usize) -> Result<Vec<i16>, AudioError>;

    /// Drop `samples` worth of buffered input.
    fn discard(&mut self, samples: usize) -> Result<(), AudioError> {
        let mut left = samples;
        while left > 0 {
            let block = left.min(DISCARD_BLOCK);
            self.read_chunk(block)?;
            left -= block;
        }
        Ok(())
    }
}

pub trait AudioDevice: Send + Sync {
    fn name(&self) -> &str;

    fn is_simulated(&self) -> bool {
        false
    }

    fn open_input(&self, sample_rate: u32) -> Result<Box<dyn AudioInput>, AudioError>;

    /// Play mono samples to completion.
    fn play(&self, samples: &[i16], sample_rate: u32) -> Result<(), AudioError>;
}

/// `arecord`/`aplay` child processes on one ALSA device name.
#[derive(Debug, Clone)]
pub struct AlsaCommandDevice {
    device: String,
}

impl AlsaCommandDevice {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// True when `arecord -l` lists at least one capture card.
    pub fn probe() -> bool {
        match Command::new("arecord").arg("-l").stderr(Stdio::null()).output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).contains("card ")
            }
            Ok(_) => false,
            Err(err) => {
                tracing::debug!(error = %err, "arecord not runnable");
                false
            }
        }
    }

    fn pcm_args(&self, command: &mut Command, sample_rate: u32) {
        command
            .arg("-D")
            .arg(&self.device)
            .args(["-f", "S16_LE", "-c", "1", "-t", "raw", "-q", "-r"])
            .arg(sample_rate.to_string());
    }
}

impl AudioDevice for AlsaCommandDevice {
    fn name(&self) -> &str {
        &self.device
    }

    fn open_input(&self, sample_rate: u32) -> Result<Box<dyn AudioInput>, AudioError> {
        let mut command = Command::new("arecord");
        self.pcm_args(&mut command, sample_rate);
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AudioError::Spawn {
                command: "arecord".into(),
                source,
            })?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AudioError::StreamClosed);
        };
        tracing::debug!(device = %self.device, sample_rate, "capture stream opened");
        Ok(Box::new(ArecordInput { child, stdout }))
    }

    fn play(&self, samples: &[i16], sample_rate: u32) -> Result<(), AudioError> {
        let mut command = Command::new("aplay");
        self.pcm_args(&mut command, sample_rate);
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AudioError::Spawn {
                command: "aplay".into(),
                source,
            })?;
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(&bytes) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err.into());
            }
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(AudioError::Device(format!("aplay exited with {status}")));
        }
        Ok(())
    }
}

struct ArecordInput {
    child: Child,
    stdout: ChildStdout,
}

impl AudioInput for ArecordInput {
    fn read_chunk(&mut self, samples: usize) -> Result<Vec<i16>, AudioError> {
        let mut bytes = vec![0u8; samples * 2];
        self.stdout.read_exact(&mut bytes).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                AudioError::StreamClosed
            } else {
                AudioError::Io(err)
            }
        })?;
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }
}

impl Drop for ArecordInput {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Simulated sound card: silent input, playback that only takes time.
#[derive(Debug, Clone, Default)]
pub struct MockAudio {
    /// Pace reads and playback like a real device would.
    pub realtime: bool,
}

impl MockAudio {
    pub fn realtime() -> Self {
        Self { realtime: true }
    }
}

impl AudioDevice for MockAudio {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn open_input(&self, sample_rate: u32) -> Result<Box<dyn AudioInput>, AudioError> {
        Ok(Box::new(SilentInput {
            realtime: self.realtime,
            sample_rate,
        }))
    }

    fn play(&self, samples: &[i16], sample_rate: u32) -> Result<(), AudioError> {
        if self.realtime {
            thread::sleep(samples_duration(samples.len(), sample_rate));
        }
        Ok(())
    }
}

struct SilentInput {
    realtime: bool,
    sample_rate: u32,
}

impl AudioInput for SilentInput {
    fn read_chunk(&mut self, samples: usize) -> Result<Vec<i16>, AudioError> {
        if self.realtime {
            thread::sleep(samples_duration(samples, self.sample_rate));
        }
        Ok(vec![0; samples])
    }

    fn discard(&mut self, _samples: usize) -> Result<(), AudioError> {
        Ok(())
    }
}

pub(crate) fn samples_duration(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(samples as f64 / f64::from(sample_rate.max(1)))
}
