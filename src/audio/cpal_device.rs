//! Native audio through cpal (`cpal-audio` feature).
//!
//! cpal streams are not `Send`, so capture runs on a dedicated thread that
//! owns the stream and forwards converted 16-bit mono chunks over a channel.

use super::convert::{downmix, f32_to_i16, i16_to_f32, resample_linear};
use super::device::{samples_duration, AudioDevice, AudioInput};
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CHANNEL_CAPACITY: usize = 64;
const READ_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_POLL: Duration = Duration::from_millis(20);

pub struct CpalDevice {
    preferred: Option<String>,
    name: String,
}

impl CpalDevice {
    /// Resolve the input device up front so a missing card is reported at
    /// start-up rather than on first capture.
    pub fn new(preferred: Option<&str>) -> Result<Self, AudioError> {
        let device = find_input(preferred)?;
        let name = device.name().unwrap_or_else(|_| "unknown input".to_string());
        Ok(Self {
            preferred: preferred.map(str::to_string),
            name,
        })
    }
}

fn find_input(preferred: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match preferred {
        Some(name) => {
            let mut devices = host
                .input_devices()
                .map_err(|err| AudioError::Device(err.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::Device(format!("input device '{name}' not found")))
        }
        None => host.default_input_device().ok_or(AudioError::Unavailable),
    }
}

impl AudioDevice for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_input(&self, sample_rate: u32) -> Result<Box<dyn AudioInput>, AudioError> {
        let (chunk_tx, chunk_rx) = bounded::<Vec<i16>>(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let preferred = self.preferred.clone();
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("cpal-capture".into())
            .spawn(move || {
                let stream = match build_capture(preferred.as_deref(), sample_rate, chunk_tx) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                while !thread_stop.load(Ordering::Relaxed) {
                    thread::sleep(STOP_POLL);
                }
                if let Err(err) = stream.pause() {
                    tracing::debug!(error = %err, "failed to pause capture stream");
                }
            })?;
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalInput {
                chunks: chunk_rx,
                pending: VecDeque::new(),
                stop,
                handle: Some(handle),
            })),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => Err(AudioError::StreamClosed),
        }
    }

    fn play(&self, samples: &[i16], sample_rate: u32) -> Result<(), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::Unavailable)?;
        let default_config = device
            .default_output_config()
            .map_err(|err| AudioError::Device(err.to_string()))?;
        let format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let channels = usize::from(config.channels.max(1));
        let mono = resample_linear(&i16_to_f32(samples), sample_rate, config.sample_rate.0);
        let total = mono.len();
        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(mono.into_iter().collect()));

        let err_fn = |err| tracing::warn!(error = %err, "playback stream error");
        let stream = match format {
            SampleFormat::F32 => {
                let queue = Arc::clone(&queue);
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _| fill_output(&queue, data, channels, |s| s),
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let queue = Arc::clone(&queue);
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _| fill_output(&queue, data, channels, f32_to_i16),
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(AudioError::Device(format!(
                    "unsupported output sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| AudioError::Device(err.to_string()))?;
        stream
            .play()
            .map_err(|err| AudioError::Device(err.to_string()))?;

        let deadline = samples_duration(total, config.sample_rate.0) + Duration::from_secs(1);
        let started = std::time::Instant::now();
        while !crate::lock_or_recover(&queue, "cpal_playback").is_empty() {
            if started.elapsed() > deadline {
                tracing::warn!("playback did not drain before deadline");
                break;
            }
            thread::sleep(STOP_POLL);
        }
        // Let the device play out its last buffer.
        thread::sleep(Duration::from_millis(100));
        Ok(())
    }
}

fn fill_output<T: Copy + Default>(
    queue: &Mutex<VecDeque<f32>>,
    data: &mut [T],
    channels: usize,
    convert: impl Fn(f32) -> T,
) {
    let mut queue = crate::lock_or_recover(queue, "cpal_playback");
    for frame in data.chunks_mut(channels) {
        let value = queue.pop_front().map(&convert).unwrap_or_default();
        frame.fill(value);
    }
}

fn build_capture(
    preferred: Option<&str>,
    target_rate: u32,
    sender: Sender<Vec<i16>>,
) -> Result<cpal::Stream, AudioError> {
    let device = find_input(preferred)?;
    let default_config = device
        .default_input_config()
        .map_err(|err| AudioError::Device(err.to_string()))?;
    let format = default_config.sample_format();
    let config: StreamConfig = default_config.into();
    let device_rate = config.sample_rate.0;
    let channels = usize::from(config.channels.max(1));
    tracing::debug!(?format, device_rate, channels, "cpal capture config");

    let forward = move |mono: Vec<f32>| {
        let converted: Vec<i16> = resample_linear(&mono, device_rate, target_rate)
            .into_iter()
            .map(f32_to_i16)
            .collect();
        // A full channel means the reader fell behind; drop rather than block
        // the audio callback.
        let _ = sender.try_send(converted);
    };
    let err_fn = |err| tracing::warn!(error = %err, "capture stream error");
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| forward(downmix(data, channels, |s| s)),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| forward(downmix(data, channels, |s| s as f32 / 32_768.0)),
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _| {
                forward(downmix(data, channels, |s| (s as f32 - 32_768.0) / 32_768.0))
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::Device(format!(
                "unsupported input sample format: {other:?}"
            )))
        }
    }
    .map_err(|err| AudioError::Device(err.to_string()))?;
    stream
        .play()
        .map_err(|err| AudioError::Device(err.to_string()))?;
    Ok(stream)
}

struct CpalInput {
    chunks: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioInput for CpalInput {
    fn read_chunk(&mut self, samples: usize) -> Result<Vec<i16>, AudioError> {
        while self.pending.len() < samples {
            match self.chunks.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AudioError::Device("capture stream stalled".into()))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(AudioError::StreamClosed),
            }
        }
        Ok(self.pending.drain(..samples).collect())
    }

    fn discard(&mut self, _samples: usize) -> Result<(), AudioError> {
        self.pending.clear();
        while self.chunks.try_recv().is_ok() {}
        Ok(())
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("cpal capture thread panicked");
            }
        }
    }
}
