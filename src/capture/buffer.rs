//! Host-side capture buffers and the hardware frame slot ring

use super::pattern::TestPatternCache;
use crate::ntv2::{Channel, FormatDesc, PixelFormat, VideoFormat};
use tracing::{debug, info};

/// Local audio buffer size: the largest span accepted from the card per poll
pub const AUDIO_BUFFER_SIZE: usize = 401 * 1024;

/// One raster of host memory, sized to the negotiated format
#[derive(Debug, Default)]
pub struct VideoBuffer {
    data: Vec<u8>,
    desc: Option<FormatDesc>,
}

impl VideoBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the buffer for `video_format` / `pixel_format`
    ///
    /// Memory is only reallocated when the raster size changes. Returns true if it was.
    pub fn reset(&mut self, video_format: VideoFormat, pixel_format: PixelFormat) -> bool {
        let desc = FormatDesc::new(video_format, pixel_format);
        self.desc = Some(desc);
        let size = desc.total_bytes();
        if size == self.data.len() {
            return false;
        }
        self.data = vec![0; size];
        info!(
            "Video buffer: {} | {} | {} bytes",
            video_format, pixel_format, size
        );
        true
    }

    pub fn desc(&self) -> Option<FormatDesc> {
        self.desc
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Fixed-size destination for audio DMA
#[derive(Debug)]
pub struct AudioBuffer {
    data: Box<[u8]>,
    filled: usize,
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Next `len` unfilled bytes; `None` if they do not fit
    pub fn reserve(&mut self, len: usize) -> Option<&mut [u8]> {
        let end = self.filled.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        let start = self.filled;
        self.filled = end;
        Some(&mut self.data[start..end])
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(AUDIO_BUFFER_SIZE)
    }
}

/// Two-slot ping-pong ring of hardware frames for one channel
///
/// Slot `counter mod 2` maps to hardware frame `channel * 2 + slot`. While the card fills
/// one slot the host reads the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlots {
    base: u32,
    counter: u64,
}

impl FrameSlots {
    pub fn new(channel: Channel) -> Self {
        Self {
            base: channel.base_frame(),
            counter: 0,
        }
    }

    /// Hardware frame index of the current slot
    pub fn current(&self) -> u32 {
        self.base + (self.counter % 2) as u32
    }

    /// Move to the other slot and return its hardware frame index
    pub fn flip(&mut self) -> u32 {
        self.counter += 1;
        self.current()
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

/// Everything the capture thread owns while it runs
///
/// Moves into the thread on activation and comes back through its join handle.
#[derive(Debug, Default)]
pub struct CaptureBuffers {
    pub video: VideoBuffer,
    pub audio: AudioBuffer,
    pub pattern: TestPatternCache,
}

impl CaptureBuffers {
    pub fn new() -> Self {
        debug!("Allocating capture buffers ({} byte audio buffer)", AUDIO_BUFFER_SIZE);
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_buffer_realloc_only_on_size_change() {
        let mut buffer = VideoBuffer::new();
        assert!(buffer.reset(VideoFormat::F1080i5994, PixelFormat::Ycbcr8));
        assert_eq!(buffer.len(), 1920 * 2 * 1080);

        // same raster size at a different rate
        assert!(!buffer.reset(VideoFormat::F1080p30, PixelFormat::Ycbcr8));
        assert!(buffer.reset(VideoFormat::F720p60, PixelFormat::Ycbcr8));
        assert_eq!(buffer.len(), 1280 * 2 * 720);
    }

    #[test]
    fn test_audio_buffer_reserve() {
        let mut buffer = AudioBuffer::new(16);
        buffer.reserve(8).unwrap().fill(1);
        buffer.reserve(8).unwrap().fill(2);
        assert!(buffer.reserve(1).is_none());
        assert_eq!(buffer.filled().len(), 16);
        assert_eq!(buffer.filled()[8], 2);

        buffer.clear();
        assert!(buffer.filled().is_empty());
    }

    #[test]
    fn test_frame_slots_ping_pong() {
        let mut slots = FrameSlots::new(Channel::Ch3);
        assert_eq!(slots.current(), 4);
        assert_eq!(slots.flip(), 5);
        assert_eq!(slots.flip(), 4);
        assert_eq!(slots.flip(), 5);
        assert_eq!(slots.counter(), 3);
    }
}
