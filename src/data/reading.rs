//! Oximetry reading data structures.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// One decoded oximetry sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Pulse rate in beats per minute (0-320), 0 when the sensor is off.
    pub heart_rate: u16,

    /// Oxygen saturation in percent (0-100), 0 when the sensor is off.
    pub spo2: u8,

    /// Time the notification was received.
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Create a new Reading stamped with the current time.
    pub fn new(heart_rate: u16, spo2: u8) -> Self {
        Self::at(heart_rate, spo2, Utc::now())
    }

    /// Create a new Reading with an explicit timestamp.
    pub fn at(heart_rate: u16, spo2: u8, timestamp: DateTime<Utc>) -> Self {
        Self {
            heart_rate,
            spo2,
            timestamp,
        }
    }

    /// Check if either channel reports the sensor as disconnected.
    pub fn signals_check_connection(&self) -> bool {
        self.heart_rate == 0 || self.spo2 == 0
    }

    /// Format as a record line: `SpO2;HeartRate`.
    pub fn to_record_line(&self) -> String {
        format!("{};{}", self.spo2, self.heart_rate)
    }
}

/// Record line for an optional reading; empty fields before the first sample.
pub fn record_line(reading: Option<&Reading>) -> String {
    match reading {
        Some(reading) => reading.to_record_line(),
        None => ";".to_string(),
    }
}

/// Shared "latest reading" slot, overwritten on each notification.
#[derive(Debug, Clone, Default)]
pub struct ReadingCell {
    inner: Arc<RwLock<Option<Reading>>>,
}

impl ReadingCell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest reading.
    pub fn set(&self, reading: Reading) {
        *self.inner.write() = Some(reading);
    }

    /// Get a copy of the latest reading.
    pub fn get(&self) -> Option<Reading> {
        self.inner.read().clone()
    }

    /// Format the latest reading as a record line.
    pub fn record_line(&self) -> String {
        record_line(self.inner.read().as_ref())
    }

    /// Forget the latest reading.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}
