//! Oximetry notification parsing.
//!
//! Decodes the vendor continuous-oximetry frame into a [`Reading`].

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::data::Reading;
use crate::error::DecodeError;

/// Minimum size of an oximetry frame (through the heart-rate high byte).
pub const MIN_FRAME_SIZE: usize = 10;

/// Offset of the SpO2 byte.
const SPO2_OFFSET: usize = 7;
/// Offset of the heart-rate low byte.
const HEART_RATE_LOW_OFFSET: usize = 8;
/// Offset of the heart-rate high byte.
const HEART_RATE_HIGH_OFFSET: usize = 9;

/// Heart-rate code sent while the finger sensor is disconnected.
pub const HEART_RATE_MISSING: i16 = 511;
/// SpO2 code sent while the finger sensor is disconnected.
pub const SPO2_MISSING: u8 = 127;

/// Highest heart rate the device reports.
pub const HEART_RATE_MAX: u16 = 320;
/// Highest SpO2 the device reports.
pub const SPO2_MAX: u8 = 100;

/// Decode an oximetry frame received now.
pub fn decode(data: &[u8]) -> Result<Reading, DecodeError> {
    decode_at(data, Utc::now())
}

/// Decode an oximetry frame received at `timestamp`.
///
/// Frame layout (other bytes are vendor-reserved):
/// - Byte 7: SpO2 percent, 127 = sensor disconnected
/// - Bytes 8-9: Pulse rate (int16 little-endian), 511 = sensor disconnected
///
/// Disconnect codes and values outside the reported ranges decode as 0.
pub fn decode_at(data: &[u8], timestamp: DateTime<Utc>) -> Result<Reading, DecodeError> {
    if data.len() < MIN_FRAME_SIZE {
        return Err(DecodeError::TooShort {
            len: data.len(),
            min: MIN_FRAME_SIZE,
        });
    }

    trace!("Oximetry frame: {:02X?}", data);

    let raw_heart_rate =
        i16::from_le_bytes([data[HEART_RATE_LOW_OFFSET], data[HEART_RATE_HIGH_OFFSET]]);
    let raw_spo2 = data[SPO2_OFFSET];

    Ok(Reading::at(
        normalize_heart_rate(raw_heart_rate),
        normalize_spo2(raw_spo2),
        timestamp,
    ))
}

fn normalize_heart_rate(raw: i16) -> u16 {
    if raw == HEART_RATE_MISSING {
        return 0;
    }
    match u16::try_from(raw) {
        Ok(value) if value <= HEART_RATE_MAX => value,
        _ => {
            trace!("Heart rate {} out of range", raw);
            0
        }
    }
}

fn normalize_spo2(raw: u8) -> u8 {
    if raw == SPO2_MISSING {
        return 0;
    }
    if raw > SPO2_MAX {
        trace!("SpO2 {} out of range", raw);
        return 0;
    }
    raw
}
