//! ajacap - AJA capture card acquisition
//!
//! Captures video rasters and embedded audio from the inputs of AJA capture cards,
//! letting several clients share one card by leasing its channels.

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod ntv2;
pub mod routing;

pub use capture::{CaptureSession, FrameSink, SessionEvent};
pub use device::{Card, CardManager, CardProbe};
pub use error::{AjaError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
