//! Protocol module for parsing device payloads.
//!
//! This module contains the decoder for the vendor oximetry frame.

pub mod oximetry;

pub use oximetry::{decode, decode_at, MIN_FRAME_SIZE};
