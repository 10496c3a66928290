//! The status poll and its response.
//!
//! The response is a fixed length frame with no header check, length prefix or
//! checksum. Its length is the only framing signal, so anything of the right
//! length is taken as a valid frame.
//!
//! Start Byte | End Byte | Meaning
//! 2          | 3        | Cycle count, u16
//! 4          | 5        | Pack voltage in V/10, u16
//! 6          | 7        | Pack current in A/10, u16
//! 8          | 15       | Four temperature probes in °C/100, u16 each
//! 74         | 74       | State of charge in %, u8
//!
//! All multi-byte fields are big endian and unsigned.

use crate::battery_sample::BatterySample;
use crate::error::DecodeError;

/// A verbatim message to send which requests the status frame
pub const REQUEST: [u8; 6] = [0xdb, 0xdb, 0x00, 0x00, 0x00, 0x00];

/// The length in bytes of a complete status frame
pub const FRAME_LEN: usize = 140;

const CYCLE_INDEX: usize = 2;
const VOLTAGE: usize = 4;
const CURRENT: usize = 6;
const TEMPERATURES: usize = 8;
const TEMPERATURE_PROBES: usize = 4;
const STATE_OF_CHARGE: usize = 74;

/// The poll command, as sent on the wire
pub fn encode_poll_command() -> [u8; 6] {
    REQUEST
}

/// Decode a raw response into a sample.
///
/// Fails with [`DecodeError::IncompleteFrame`] unless `raw` is exactly
/// [`FRAME_LEN`] bytes long.
pub fn decode(raw: &[u8]) -> Result<BatterySample, DecodeError> {
    StatusFrame::new(raw).map(|frame| frame.sample())
}

/// A response of the right length, with accessors for each field.
pub struct StatusFrame<'a>(&'a [u8; FRAME_LEN]);

impl<'a> StatusFrame<'a> {
    pub fn new(raw: &'a [u8]) -> Result<Self, DecodeError> {
        raw.try_into()
            .map(Self)
            .map_err(|_| DecodeError::IncompleteFrame {
                expected: FRAME_LEN,
                actual: raw.len(),
            })
    }

    fn word(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.0[offset], self.0[offset + 1]])
    }

    pub fn cycle_index(&self) -> u16 {
        self.word(CYCLE_INDEX)
    }

    /// The pack voltage in V/10
    pub fn voltage_dv(&self) -> u16 {
        self.word(VOLTAGE)
    }

    /// The pack current in A/10
    pub fn current_da(&self) -> u16 {
        self.word(CURRENT)
    }

    /// Each temperature probe in °C/100
    pub fn temperatures_cc(&self) -> [u16; TEMPERATURE_PROBES] {
        std::array::from_fn(|i| self.word(TEMPERATURES + 2 * i))
    }

    pub fn state_of_charge_pct(&self) -> u8 {
        self.0[STATE_OF_CHARGE]
    }

    pub fn sample(&self) -> BatterySample {
        let temperature_sum: f64 = self
            .temperatures_cc()
            .iter()
            .map(|&t| f64::from(t) / 100.0)
            .sum();

        BatterySample {
            voltage_v: f64::from(self.voltage_dv()) / 10.0,
            current_a: f64::from(self.current_da()) / 10.0,
            temperature_c: temperature_sum / TEMPERATURE_PROBES as f64,
            cycle_index: self.cycle_index(),
            state_of_charge_pct: self.state_of_charge_pct(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_frame(voltage_dv: u16, state_of_charge_pct: u8) -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_LEN];
    frame[VOLTAGE..VOLTAGE + 2].copy_from_slice(&voltage_dv.to_be_bytes());
    frame[STATE_OF_CHARGE] = state_of_charge_pct;
    frame
}
