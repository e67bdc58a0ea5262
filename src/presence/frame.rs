//! Sensor readings produced by the frame decoder.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotionType {
    Stationary,
    Moving,
    #[default]
    None,
}

impl MotionType {
    pub fn from_vendor_byte(byte: u8) -> Self {
        match byte {
            0x01 => MotionType::Moving,
            0x02 => MotionType::Stationary,
            _ => MotionType::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MotionType::Stationary => "stationary",
            MotionType::Moving => "moving",
            MotionType::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolSource {
    Ascii,
    Binary,
}

impl ProtocolSource {
    pub fn label(self) -> &'static str {
        match self {
            ProtocolSource::Ascii => "ascii",
            ProtocolSource::Binary => "binary",
        }
    }
}

/// One decoded frame. `distance_cm` is `None` when the frame carried no target.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: Instant,
    pub distance_cm: Option<u32>,
    pub motion_type: MotionType,
    pub gate_energies: Option<Vec<u16>>,
    pub protocol_source: ProtocolSource,
}

impl Reading {
    pub fn ascii(timestamp: Instant, distance_cm: Option<u32>) -> Self {
        Self {
            timestamp,
            distance_cm,
            motion_type: MotionType::None,
            gate_energies: None,
            protocol_source: ProtocolSource::Ascii,
        }
    }
}
