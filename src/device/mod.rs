//! Capture card access, enumeration and channel leasing

mod filter;
mod lease;
mod manager;
pub mod sim;

pub use filter::CaptureFilter;
pub use lease::ChannelLeases;
pub use manager::{CardEntry, CardManager, CardProbe};

use crate::error::Result;
use crate::ntv2::{
    AudioSystem, Channel, HdmiColorSpace, InputSource, PixelFormat, Reference, VideoFormat,
    XptInput, XptOutput,
};
use std::fmt;

/// Static description of a physical card
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Unique card ID, stable across enumerations
    pub card_id: String,
    /// Model name
    pub model: String,
    /// Number of framestores
    pub num_channels: u8,
    pub num_sdi_inputs: u8,
    pub num_hdmi_inputs: u8,
    /// HDMI receiver generation; v1 does its own RGB to YCbCr conversion
    pub hdmi_version: u8,
    /// SDI connectors can be switched between receive and transmit
    pub bidirectional_sdi: bool,
    /// Card has no inputs at all
    pub output_only: bool,
}

impl DeviceInfo {
    /// Human-readable name for device lists
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.model, self.card_id)
    }

    /// Whether the card has the connector and framestore for `source`
    pub fn has_input(&self, source: InputSource) -> bool {
        let limit = match source {
            InputSource::Sdi(_) => self.num_sdi_inputs,
            InputSource::Hdmi(_) => self.num_hdmi_inputs,
        };
        source.number() >= 1
            && source.number() <= limit
            && source.channel().index() < self.num_channels as usize
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        channel.index() < self.num_channels as usize
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output_marker = if self.output_only { " [output only]" } else { "" };
        write!(f, "{}{}", self.display_name(), output_marker)
    }
}

impl fmt::Debug for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInfo")
            .field("card_id", &self.card_id)
            .field("model", &self.model)
            .field("num_channels", &self.num_channels)
            .field("output_only", &self.output_only)
            .finish()
    }
}

/// Hardware control interface of one capture card
///
/// Implementations are shared between the control thread and capture threads, so every
/// method takes `&self`. Waits are bounded to one frame interval and return `false` on
/// timeout rather than blocking indefinitely.
pub trait Card: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Model name as currently reported by the driver
    fn model_name(&self) -> String;

    /// Whether the card still answers; polled once per capture iteration
    fn is_present(&self) -> bool;

    fn is_open(&self) -> bool;

    // -- signal probing --

    fn enable_channel(&self, channel: Channel) -> Result<()>;

    fn set_sdi_transmit_enable(&self, channel: Channel, enable: bool) -> Result<()>;

    /// Block until the next input vertical interrupt on `channel`
    fn wait_for_input_vertical_interrupt(&self, channel: Channel) -> bool;

    /// Raw VPID payloads (link A, link B) of the SDI receiver feeding `channel`
    fn read_sdi_in_vpid(&self, channel: Channel) -> Result<(u32, u32)>;

    fn hdmi_input_color(&self, channel: Channel) -> Result<HdmiColorSpace>;

    /// Video format present on `source`, `None` when there is no usable signal
    fn input_video_format(&self, source: InputSource, level_b: bool) -> Option<VideoFormat>;

    /// Whether the receiver for `channel` is locked to a 3G level-B signal
    fn is_3g_level_b(&self, channel: Channel) -> bool;

    // -- framestores --

    fn set_capture_mode(&self, channel: Channel) -> Result<()>;

    fn set_video_format(&self, channel: Channel, format: VideoFormat) -> Result<()>;

    fn video_format(&self, channel: Channel) -> Option<VideoFormat>;

    fn set_frame_buffer_format(&self, channel: Channel, format: PixelFormat) -> Result<()>;

    /// Frame slot the hardware writes into from the next vertical interrupt on
    fn set_input_frame(&self, channel: Channel, frame: u32) -> Result<()>;

    /// DMA one raster from frame slot `frame` into `dest`
    fn dma_read_frame(&self, frame: u32, dest: &mut [u8]) -> Result<()>;

    fn set_reference(&self, reference: Reference) -> Result<()>;

    // -- audio --

    /// Base offset of the input audio ring in audio memory
    fn audio_read_offset(&self, system: AudioSystem) -> u32;

    /// Size of the input audio ring
    fn audio_wrap_address(&self, system: AudioSystem) -> u32;

    /// Hardware write pointer, relative to the ring base
    fn read_audio_last_in(&self, system: AudioSystem) -> u32;

    /// DMA `dest.len()` bytes of audio memory starting at absolute `address`
    fn dma_read_audio(&self, system: AudioSystem, dest: &mut [u8], address: u32) -> Result<()>;

    fn set_audio_input_source(&self, system: AudioSystem, source: InputSource) -> Result<()>;

    fn start_audio_input(&self, system: AudioSystem) -> Result<()>;

    fn stop_audio_input(&self, system: AudioSystem) -> Result<()>;

    // -- routing --

    fn connect(&self, input: XptInput, output: XptOutput) -> Result<()>;

    fn disconnect(&self, input: XptInput) -> Result<()>;

    /// Source currently feeding `input`
    fn connection(&self, input: XptInput) -> Option<XptOutput>;
}
