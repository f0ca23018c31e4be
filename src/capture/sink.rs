//! Host pipeline interface for captured video and audio

use crate::ntv2::PixelFormat;
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use tracing::trace;

/// Host-side pixel layout of a video unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostVideoFormat {
    Uyvy,
    V210,
    Bgra,
    Bgr3,
}

impl From<PixelFormat> for HostVideoFormat {
    fn from(pf: PixelFormat) -> Self {
        match pf {
            PixelFormat::Ycbcr8 => HostVideoFormat::Uyvy,
            PixelFormat::Ycbcr10 => HostVideoFormat::V210,
            PixelFormat::Argb8 => HostVideoFormat::Bgra,
            PixelFormat::Bgr24 => HostVideoFormat::Bgr3,
        }
    }
}

/// YCbCr to RGB conversion parameters attached to each video unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorParams {
    /// Row-major 4x4 matrix
    pub matrix: [f32; 16],
    pub range_min: [f32; 3],
    pub range_max: [f32; 3],
}

impl ColorParams {
    /// BT.709, full range
    pub fn bt709_full() -> Self {
        Self {
            matrix: [
                1.0, 0.0, 1.5748, -0.7874, //
                1.0, -0.187324, -0.468124, 0.327724, //
                1.0, 1.8556, 0.0, -0.9278, //
                0.0, 0.0, 0.0, 1.0,
            ],
            range_min: [0.0, 0.0, 0.0],
            range_max: [1.0, 1.0, 1.0],
        }
    }
}

/// Origin of a video unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Raster read from the card
    Captured,
    /// Black test pattern standing in for missing signal
    Placeholder,
}

/// One video unit; borrowed from the capture buffers for the duration of the call
pub struct VideoFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub linesize: u32,
    pub format: HostVideoFormat,
    pub timestamp_ns: u64,
    pub color: ColorParams,
    pub kind: FrameKind,
}

impl fmt::Debug for VideoFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("kind", &self.kind)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Embedded audio layout: 48 kHz, 8 channels, 32-bit samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub block_align: u16,
}

impl AudioFormat {
    pub const EMBEDDED: AudioFormat = AudioFormat {
        sample_rate: 48_000,
        channels: 8,
        bits_per_sample: 32,
        block_align: 32,
    };

    /// Calculate number of frames for given bytes
    pub fn bytes_to_frames(&self, bytes: usize) -> u32 {
        (bytes / self.block_align as usize) as u32
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// One audio unit: interleaved sample frames
pub struct AudioPacket<'a> {
    pub data: &'a [u8],
    pub frames: u32,
    pub format: AudioFormat,
    pub timestamp_ns: u64,
}

impl fmt::Debug for AudioPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPacket")
            .field("frames", &self.frames)
            .field("format", &self.format)
            .field("timestamp_ns", &self.timestamp_ns)
            .finish()
    }
}

/// Consumer of captured units, called from the capture thread
pub trait FrameSink: Send + Sync {
    fn output_video(&self, frame: &VideoFrame<'_>);

    fn output_audio(&self, packet: &AudioPacket<'_>);
}

/// Owned summary of a video unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummary {
    pub width: u32,
    pub height: u32,
    pub linesize: u32,
    pub format: HostVideoFormat,
    pub kind: FrameKind,
    pub timestamp_ns: u64,
    pub len: usize,
    /// First byte of the raster
    pub first_byte: Option<u8>,
}

/// Unit forwarded by [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Video(VideoSummary),
    Audio {
        data: Vec<u8>,
        frames: u32,
        timestamp_ns: u64,
    },
}

/// Sink forwarding units over a crossbeam channel
///
/// Video rasters are summarized, audio is copied in full.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SinkEvent>) -> Self {
        Self { tx }
    }

    pub fn unbounded() -> (Self, Receiver<SinkEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }
}

impl FrameSink for ChannelSink {
    fn output_video(&self, frame: &VideoFrame<'_>) {
        trace!("Video unit: {:?}", frame);
        let _ = self.tx.send(SinkEvent::Video(VideoSummary {
            width: frame.width,
            height: frame.height,
            linesize: frame.linesize,
            format: frame.format,
            kind: frame.kind,
            timestamp_ns: frame.timestamp_ns,
            len: frame.data.len(),
            first_byte: frame.data.first().copied(),
        }));
    }

    fn output_audio(&self, packet: &AudioPacket<'_>) {
        trace!("Audio unit: {:?}", packet);
        let _ = self.tx.send(SinkEvent::Audio {
            data: packet.data.to_vec(),
            frames: packet.frames,
            timestamp_ns: packet.timestamp_ns,
        });
    }
}
