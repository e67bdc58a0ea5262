//! Wake-word scoring and trigger gating.
//!
//! A [`WakeWordModel`] turns one audio chunk into a confidence score. The
//! [`WakeGate`] decides when scores amount to a trigger: a single score above
//! the threshold, or a sustained run whose recent average clears 80% of it.

use crate::audio::apply_gain;
use crate::error::BackendError;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

const HISTORY_LEN: usize = 5;
const AVERAGE_WINDOW: usize = 3;
const AVERAGE_RATIO: f32 = 0.8;

/// Scores one chunk of 16-bit mono audio in `[0, 1]`.
pub trait WakeWordModel: Send {
    fn score(&mut self, chunk: &[i16]) -> Result<f32, BackendError>;

    fn reset(&mut self) {}

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct WakeGate {
    threshold: f32,
    gain: f32,
    debug: bool,
    history: VecDeque<f32>,
}

impl WakeGate {
    pub fn new(threshold: f32, gain: f32, debug: bool) -> Self {
        Self {
            threshold,
            gain,
            debug,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Fold one score. Returns true when the gate fires; firing clears the
    /// history so one utterance cannot trigger twice.
    pub fn observe(&mut self, score: f32) -> bool {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(score);

        let sustained = self.history.len() >= AVERAGE_WINDOW && {
            let recent: f32 = self.history.iter().rev().take(AVERAGE_WINDOW).sum();
            recent / AVERAGE_WINDOW as f32 > self.threshold * AVERAGE_RATIO
        };
        let fired = score > self.threshold || sustained;
        if self.debug && (fired || score > 0.1) {
            tracing::debug!(score, threshold = self.threshold, fired, "wake score");
        }
        if fired {
            self.history.clear();
        }
        fired
    }

    /// Score a raw chunk through `model` (after gain) and fold the result.
    pub fn process(
        &mut self,
        model: &mut dyn WakeWordModel,
        chunk: &[i16],
    ) -> Result<bool, BackendError> {
        let score = if (self.gain - 1.0).abs() > f32::EPSILON {
            model.score(&apply_gain(chunk, self.gain))?
        } else {
            model.score(chunk)?
        };
        Ok(self.observe(score))
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

/// External scorer process: receives raw S16LE chunks on stdin and answers
/// each with one line holding a float score.
pub struct CommandWakeModel {
    command: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl CommandWakeModel {
    pub fn spawn(command_line: &str) -> Result<Self, BackendError> {
        let parts = shell_words::split(command_line.trim())
            .map_err(|err| BackendError::invalid("wake-word", err.to_string()))?;
        let Some((program, args)) = parts.split_first() else {
            return Err(BackendError::NotConfigured("wake-word command"));
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| BackendError::request("wake-word", err))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackendError::request("wake-word", "scorer pipes unavailable"));
        };
        tracing::info!(command = %program, "wake-word scorer started");
        Ok(Self {
            command: program.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            line: String::new(),
        })
    }
}

impl WakeWordModel for CommandWakeModel {
    fn score(&mut self, chunk: &[i16]) -> Result<f32, BackendError> {
        let bytes: Vec<u8> = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.stdin
            .write_all(&bytes)
            .and_then(|()| self.stdin.flush())
            .map_err(|err| BackendError::request("wake-word", err))?;
        self.line.clear();
        let read = self
            .stdout
            .read_line(&mut self.line)
            .map_err(|err| BackendError::request("wake-word", err))?;
        if read == 0 {
            return Err(BackendError::request("wake-word", "scorer exited"));
        }
        parse_score(&self.line)
    }

    fn name(&self) -> &str {
        &self.command
    }
}

impl Drop for CommandWakeModel {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn parse_score(line: &str) -> Result<f32, BackendError> {
    let score: f32 = line
        .trim()
        .parse()
        .map_err(|_| BackendError::invalid("wake-word", format!("bad score line {line:?}")))?;
    if !score.is_finite() {
        return Err(BackendError::invalid("wake-word", "non-finite score"));
    }
    Ok(score.clamp(0.0, 1.0))
}
