//! Capture card vocabulary: channels, input selections, formats, VPIDs and crosspoints

mod channel;
mod format;
mod vpid;
mod xpt;

pub use channel::{
    AudioSystem, Channel, HdmiColorSpace, InputSource, IoSelection, Reference, SdiTransport,
    SdiTransport4K,
};
pub use format::{FormatDesc, FrameRate, PixelFormat, VideoFormat};
pub use vpid::{VpidBitDepth, VpidData, VpidDataList, VpidSampling, VpidStandard};
pub use xpt::{XptInput, XptOutput};

/// Error returned when parsing a named value (format, selection, transport) fails
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseNameError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseNameError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
