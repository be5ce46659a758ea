//! Protocol module for classifying and routing notification frames.
//!
//! This module contains the implementations for:
//! - Protocol tag definitions and header widths
//! - Frame routing into per-protocol accumulators
//! - ASCII heart-rate / SpO2 decoding

pub mod hr_spo2;
pub mod router;
pub mod tags;

pub use hr_spo2::HrSpO2Reading;
pub use router::{ProtocolRouter, RoutedFrame};
pub use tags::ProtocolId;
