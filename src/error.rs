//! Unified error types for ajacap

use crate::ntv2::{IoSelection, PixelFormat, VideoFormat};
use thiserror::Error;

/// Main error type for ajacap operations
#[derive(Error, Debug)]
pub enum AjaError {
    /// Device not found in the card manager
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device handle exists but is not open
    #[error("Device '{0}' is not open")]
    DeviceNotOpen(String),

    /// Device was unplugged or stopped responding
    #[error("Device '{0}' disconnected")]
    DeviceDisconnected(String),

    /// Device operation error
    #[error("Device '{device_id}' error: {message}")]
    DeviceError {
        device_id: String,
        message: String,
    },

    /// No input selection configured
    #[error("No input selected")]
    NoInputSelected,

    /// Input selection maps to no physical connectors
    #[error("No input sources found for input selection {0}")]
    NoInputSources(IoSelection),

    /// Input selection needs channels the device does not have
    #[error("Input selection {selection} is not available on device '{device_id}'")]
    UnsupportedSelection {
        selection: IoSelection,
        device_id: String,
    },

    /// Channels of the selection are leased by another client
    #[error("Input selection {selection} conflicts with channels owned by '{owner}'")]
    ChannelConflict {
        selection: IoSelection,
        owner: String,
    },

    /// Wire probing did not produce a usable format
    #[error("Unknown video/pixel format(s): {video:?} / {pixel:?}")]
    UnresolvedFormat {
        video: Option<VideoFormat>,
        pixel: Option<PixelFormat>,
    },

    /// Audio ring buffer overrun
    #[error("Audio overrun: {bytes} bytes captured, buffer holds {capacity}")]
    AudioOverrun { bytes: usize, capacity: usize },

    /// Capture thread could not be spawned
    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for ajacap operations
pub type Result<T> = std::result::Result<T, AjaError>;

impl AjaError {
    /// Create a device error with context
    pub fn device_error(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceError {
            device_id: device_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AjaError::DeviceError { .. }
                | AjaError::DeviceDisconnected(_)
                | AjaError::AudioOverrun { .. }
                | AjaError::UnresolvedFormat { .. }
        )
    }
}
