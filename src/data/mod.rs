//! Data structures for oximeter data.

pub mod reading;

pub use reading::{record_line, Reading, ReadingCell};
