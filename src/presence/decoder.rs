//! Incremental decoder for the radar's mixed text/binary serial stream.
//!
//! Bytes are pushed as they arrive; complete frames are pulled out through
//! [`FrameDecoder::drain`]. Partial frames stay buffered until more bytes
//! arrive. Anything that cannot be a frame is skipped one byte (or one broken
//! line) at a time, so a corrupt frame never stalls the stream.

use super::frame::{MotionType, ProtocolSource, Reading};
use regex::bytes::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;
use thiserror::Error;

/// Longest text line accepted before it is treated as noise.
pub const MAX_LINE_BYTES: usize = 64;
/// Buffered bytes that trigger compaction.
pub const MAX_BUFFER_BYTES: usize = 512;
/// Bytes retained after compaction.
pub const RETAIN_AFTER_COMPACT: usize = 256;

/// Frame-level problems. They are counted, logged at trace level and never
/// surfaced past the decoder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("declared payload length {declared} outside {min}..={max}")]
    BadLength {
        declared: usize,
        min: usize,
        max: usize,
    },

    #[error("frame trailer mismatch at offset {offset}")]
    BadTrailer { offset: usize },

    #[error("frame too short: need {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },
}

/// What a binary layout makes of the bytes at the head of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The buffer does not start with one of this layout's markers.
    NotMine,
    /// A marker (or a prefix of one) is present but more bytes are needed.
    NeedMore,
    /// A frame of `len` bytes starts at offset 0 (it may not be fully buffered yet).
    Frame { len: usize },
}

/// Vendor binary framing. The decoder only relies on this contract, so the
/// byte layout can be swapped for a different firmware revision.
pub trait BinaryLayout: Send {
    fn name(&self) -> &'static str;

    /// Classify the head of `buf`. Errors mean "a marker was found but the
    /// frame header is invalid".
    fn probe(&self, buf: &[u8]) -> Result<Probe, DecodeError>;

    /// Decode a complete frame. `Ok(None)` is a valid frame that carries no
    /// reading, such as a command acknowledgement.
    fn decode(&self, frame: &[u8], at: Instant) -> Result<Option<Reading>, DecodeError>;
}

/// Framing used by the HLK-LD2410-family radar on this board.
///
/// `header(4) | payload length u16 LE | payload | trailer(4)`. Data frames
/// carry motion at byte 8, detection at byte 10, distance (u16 LE) at 11 and
/// sixteen gate energies from byte 14 when the sensor is in engineering mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmmdLayout;

impl HmmdLayout {
    pub const DATA_HEADER: [u8; 4] = [0xF4, 0xF3, 0xF2, 0xF1];
    pub const DATA_TRAILER: [u8; 4] = [0xF8, 0xF7, 0xF6, 0xF5];
    pub const ACK_HEADER: [u8; 4] = [0xFD, 0xFC, 0xFB, 0xFA];
    pub const ACK_TRAILER: [u8; 4] = [0x04, 0x03, 0x02, 0x01];

    const LEN_OFFSET: usize = 4;
    const PAYLOAD_OFFSET: usize = 6;
    const OVERHEAD: usize = 10;
    const MIN_DATA_PAYLOAD: usize = 7;
    const MIN_ACK_PAYLOAD: usize = 2;
    const MAX_PAYLOAD: usize = 128;

    const MOTION_OFFSET: usize = 8;
    const DETECTION_OFFSET: usize = 10;
    const DISTANCE_OFFSET: usize = 11;
    const GATES_OFFSET: usize = 14;
    const GATE_COUNT: usize = 16;
    const GATE_ENERGY_CAP: u16 = 1000;
    const MAX_VALID_DISTANCE: u16 = 1600;

    fn frame_kind(buf: &[u8]) -> Option<Result<FrameKind, ()>> {
        for (header, kind) in [
            (Self::DATA_HEADER, FrameKind::Data),
            (Self::ACK_HEADER, FrameKind::Ack),
        ] {
            let n = buf.len().min(header.len());
            if buf[..n] == header[..n] {
                return Some(if n == header.len() { Ok(kind) } else { Err(()) });
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Data,
    Ack,
}

fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    let lo = *bytes.get(offset)?;
    let hi = *bytes.get(offset + 1)?;
    Some(u16::from_le_bytes([lo, hi]))
}

impl BinaryLayout for HmmdLayout {
    fn name(&self) -> &'static str {
        "hmmd"
    }

    fn probe(&self, buf: &[u8]) -> Result<Probe, DecodeError> {
        let kind = match Self::frame_kind(buf) {
            None => return Ok(Probe::NotMine),
            Some(Err(())) => return Ok(Probe::NeedMore),
            Some(Ok(kind)) => kind,
        };
        let Some(declared) = read_u16_le(buf, Self::LEN_OFFSET) else {
            return Ok(Probe::NeedMore);
        };
        let declared = usize::from(declared);
        let min = match kind {
            FrameKind::Data => Self::MIN_DATA_PAYLOAD,
            FrameKind::Ack => Self::MIN_ACK_PAYLOAD,
        };
        if !(min..=Self::MAX_PAYLOAD).contains(&declared) {
            return Err(DecodeError::BadLength {
                declared,
                min,
                max: Self::MAX_PAYLOAD,
            });
        }
        Ok(Probe::Frame {
            len: declared + Self::OVERHEAD,
        })
    }

    fn decode(&self, frame: &[u8], at: Instant) -> Result<Option<Reading>, DecodeError> {
        if frame.len() < Self::OVERHEAD {
            return Err(DecodeError::TooShort {
                needed: Self::OVERHEAD,
                got: frame.len(),
            });
        }
        let (kind, trailer) = match Self::frame_kind(frame) {
            Some(Ok(FrameKind::Data)) => (FrameKind::Data, Self::DATA_TRAILER),
            Some(Ok(FrameKind::Ack)) => (FrameKind::Ack, Self::ACK_TRAILER),
            _ => {
                return Err(DecodeError::TooShort {
                    needed: Self::OVERHEAD,
                    got: frame.len(),
                })
            }
        };
        let trailer_at = frame.len() - trailer.len();
        if frame[trailer_at..] != trailer {
            return Err(DecodeError::BadTrailer { offset: trailer_at });
        }
        if kind == FrameKind::Ack {
            return Ok(None);
        }

        let payload_end = trailer_at;
        let body = &frame[..payload_end];
        let needed = Self::DISTANCE_OFFSET + 2;
        if body.len() < needed {
            return Err(DecodeError::TooShort {
                needed: needed + trailer.len(),
                got: frame.len(),
            });
        }

        let motion_type = MotionType::from_vendor_byte(body[Self::MOTION_OFFSET]);
        let detected = body[Self::DETECTION_OFFSET] == 0x01;
        let distance = read_u16_le(body, Self::DISTANCE_OFFSET)
            .filter(|d| *d > 0 && *d <= Self::MAX_VALID_DISTANCE)
            .filter(|_| detected)
            .map(u32::from);

        let gates_end = Self::GATES_OFFSET + Self::GATE_COUNT * 2;
        let gate_energies = (body.len() >= gates_end).then(|| {
            (0..Self::GATE_COUNT)
                .filter_map(|gate| read_u16_le(body, Self::GATES_OFFSET + gate * 2))
                .map(|energy| energy.min(Self::GATE_ENERGY_CAP))
                .collect()
        });

        Ok(Some(Reading {
            timestamp: at,
            distance_cm: distance,
            motion_type: if distance.is_some() {
                motion_type
            } else {
                MotionType::None
            },
            gate_energies,
            protocol_source: ProtocolSource::Binary,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub text_frames: u64,
    pub binary_frames: u64,
    pub acks: u64,
    pub corrupt_frames: u64,
    pub discarded_bytes: u64,
}

fn range_pattern() -> &'static Regex {
    static RANGE_RE: OnceLock<Regex> = OnceLock::new();
    RANGE_RE.get_or_init(|| Regex::new(r"Range\s+(\d+)").expect("range regex should compile"))
}

fn is_text_byte(byte: u8) -> bool {
    matches!(byte, b'\t' | b'\r' | 0x20..=0x7E)
}

/// Parse a `Range <cm>` line. Other text lines yield `None`.
fn parse_text_line(line: &[u8], at: Instant) -> Option<Reading> {
    let caps = range_pattern().captures(line)?;
    let digits = std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?;
    let distance = digits.parse::<u32>().ok().filter(|d| *d > 0);
    Some(Reading::ascii(at, distance))
}

pub struct FrameDecoder {
    buf: Vec<u8>,
    layout: Box<dyn BinaryLayout>,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(Box::new(HmmdLayout))
    }
}

impl FrameDecoder {
    pub fn new(layout: Box<dyn BinaryLayout>) -> Self {
        Self {
            buf: Vec::with_capacity(MAX_BUFFER_BYTES),
            layout,
            stats: DecoderStats::default(),
        }
    }

    pub fn layout_name(&self) -> &'static str {
        self.layout.name()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_BUFFER_BYTES {
            let excess = self.buf.len() - RETAIN_AFTER_COMPACT;
            self.discard(excess);
            tracing::debug!(dropped = excess, "decoder buffer overflow; compacted");
        }
    }

    /// Lazily yield every complete frame currently buffered. Stopping early
    /// leaves the remaining bytes for the next call.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain {
            decoder: self,
            at: Instant::now(),
        }
    }

    fn discard(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
        self.stats.discarded_bytes += n as u64;
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
    }

    /// Decode at most one frame from the head of the buffer.
    fn step(&mut self, at: Instant) -> Step {
        let Some(&head) = self.buf.first() else {
            return Step::Wait;
        };

        match self.layout.probe(&self.buf) {
            Ok(Probe::NeedMore) => return Step::Wait,
            Ok(Probe::Frame { len }) => {
                if self.buf.len() < len {
                    return Step::Wait;
                }
                let result = self.layout.decode(&self.buf[..len], at);
                return match result {
                    Ok(reading) => {
                        self.consume(len);
                        self.stats.frames_decoded += 1;
                        match reading {
                            Some(reading) => {
                                self.stats.binary_frames += 1;
                                Step::Emit(reading)
                            }
                            None => {
                                self.stats.acks += 1;
                                Step::Skipped
                            }
                        }
                    }
                    Err(err) => self.reject(err),
                };
            }
            Ok(Probe::NotMine) => {}
            Err(err) => return self.reject(err),
        }

        if head == b'\n' || head == b'\r' {
            self.consume(1);
            return Step::Skipped;
        }
        if !is_text_byte(head) {
            self.discard(1);
            return Step::Skipped;
        }

        let end = self
            .buf
            .iter()
            .position(|b| *b == b'\n' || !is_text_byte(*b));
        match end {
            Some(pos) if self.buf[pos] == b'\n' => {
                let reading = parse_text_line(&self.buf[..pos], at);
                match reading {
                    Some(reading) => {
                        self.consume(pos + 1);
                        self.stats.frames_decoded += 1;
                        self.stats.text_frames += 1;
                        Step::Emit(reading)
                    }
                    None => {
                        self.discard(pos + 1);
                        Step::Skipped
                    }
                }
            }
            // A marker byte interrupted the line: drop the broken prefix.
            Some(pos) => {
                self.discard(pos);
                Step::Skipped
            }
            None if self.buf.len() > MAX_LINE_BYTES => {
                let len = self.buf.len();
                self.discard(len);
                Step::Skipped
            }
            None => Step::Wait,
        }
    }

    fn reject(&mut self, err: DecodeError) -> Step {
        self.stats.corrupt_frames += 1;
        tracing::trace!(layout = self.layout.name(), error = %err, "dropping corrupt frame");
        self.discard(1);
        Step::Skipped
    }
}

enum Step {
    Emit(Reading),
    Skipped,
    Wait,
}

pub struct Drain<'a> {
    decoder: &'a mut FrameDecoder,
    at: Instant,
}

impl Iterator for Drain<'_> {
    type Item = Reading;

    fn next(&mut self) -> Option<Reading> {
        loop {
            match self.decoder.step(self.at) {
                Step::Emit(reading) => return Some(reading),
                Step::Skipped => continue,
                Step::Wait => return None,
            }
        }
    }
}
