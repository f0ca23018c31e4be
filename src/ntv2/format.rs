//! Video raster formats, frame rates and framebuffer pixel formats

use super::ParseNameError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Frame rate of a video format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameRate {
    Fr2398,
    Fr24,
    Fr25,
    Fr2997,
    Fr30,
    Fr50,
    Fr5994,
    Fr60,
}

impl FrameRate {
    /// Rate as a (numerator, denominator) fraction of frames per second
    pub fn fraction(self) -> (u32, u32) {
        match self {
            FrameRate::Fr2398 => (24000, 1001),
            FrameRate::Fr24 => (24, 1),
            FrameRate::Fr25 => (25, 1),
            FrameRate::Fr2997 => (30000, 1001),
            FrameRate::Fr30 => (30, 1),
            FrameRate::Fr50 => (50, 1),
            FrameRate::Fr5994 => (60000, 1001),
            FrameRate::Fr60 => (60, 1),
        }
    }

    /// Duration of one frame
    pub fn frame_duration(self) -> Duration {
        let (num, den) = self.fraction();
        Duration::from_nanos(1_000_000_000u64 * den as u64 / num as u64)
    }

    /// Clock family: rates in the same family can share the card's free-run clock
    pub fn family(self) -> FrameRate {
        match self {
            FrameRate::Fr25 | FrameRate::Fr50 => FrameRate::Fr25,
            FrameRate::Fr2997 | FrameRate::Fr5994 => FrameRate::Fr2997,
            FrameRate::Fr30 | FrameRate::Fr60 => FrameRate::Fr30,
            other => other,
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (num, den) = self.fraction();
        if den == 1 {
            write!(f, "{}", num)
        } else {
            write!(f, "{:.2}", num as f64 / den as f64)
        }
    }
}

/// Incoming raster format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    F525i5994,
    F625i50,
    F720p50,
    F720p5994,
    F720p60,
    F1080i50,
    F1080i5994,
    F1080i60,
    F1080p2398,
    F1080p24,
    F1080p25,
    F1080p2997,
    F1080p30,
    F1080p50A,
    F1080p5994A,
    F1080p60A,
    F1080p50B,
    F1080p5994B,
    F1080p60B,
    F2160p2398,
    F2160p24,
    F2160p25,
    F2160p2997,
    F2160p30,
    F2160p50,
    F2160p5994,
    F2160p60,
}

struct FormatInfo {
    name: &'static str,
    width: u32,
    height: u32,
    rate: FrameRate,
    progressive: bool,
}

const fn info(
    name: &'static str,
    width: u32,
    height: u32,
    rate: FrameRate,
    progressive: bool,
) -> FormatInfo {
    FormatInfo {
        name,
        width,
        height,
        rate,
        progressive,
    }
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 27] = [
        VideoFormat::F525i5994,
        VideoFormat::F625i50,
        VideoFormat::F720p50,
        VideoFormat::F720p5994,
        VideoFormat::F720p60,
        VideoFormat::F1080i50,
        VideoFormat::F1080i5994,
        VideoFormat::F1080i60,
        VideoFormat::F1080p2398,
        VideoFormat::F1080p24,
        VideoFormat::F1080p25,
        VideoFormat::F1080p2997,
        VideoFormat::F1080p30,
        VideoFormat::F1080p50A,
        VideoFormat::F1080p5994A,
        VideoFormat::F1080p60A,
        VideoFormat::F1080p50B,
        VideoFormat::F1080p5994B,
        VideoFormat::F1080p60B,
        VideoFormat::F2160p2398,
        VideoFormat::F2160p24,
        VideoFormat::F2160p25,
        VideoFormat::F2160p2997,
        VideoFormat::F2160p30,
        VideoFormat::F2160p50,
        VideoFormat::F2160p5994,
        VideoFormat::F2160p60,
    ];

    /// Placeholder format used when nothing has been detected yet
    pub const FALLBACK: VideoFormat = VideoFormat::F720p5994;

    fn info(self) -> FormatInfo {
        use FrameRate::*;
        match self {
            VideoFormat::F525i5994 => info("525i5994", 720, 486, Fr2997, false),
            VideoFormat::F625i50 => info("625i50", 720, 576, Fr25, false),
            VideoFormat::F720p50 => info("720p50", 1280, 720, Fr50, true),
            VideoFormat::F720p5994 => info("720p5994", 1280, 720, Fr5994, true),
            VideoFormat::F720p60 => info("720p60", 1280, 720, Fr60, true),
            VideoFormat::F1080i50 => info("1080i50", 1920, 1080, Fr25, false),
            VideoFormat::F1080i5994 => info("1080i5994", 1920, 1080, Fr2997, false),
            VideoFormat::F1080i60 => info("1080i60", 1920, 1080, Fr30, false),
            VideoFormat::F1080p2398 => info("1080p2398", 1920, 1080, Fr2398, true),
            VideoFormat::F1080p24 => info("1080p24", 1920, 1080, Fr24, true),
            VideoFormat::F1080p25 => info("1080p25", 1920, 1080, Fr25, true),
            VideoFormat::F1080p2997 => info("1080p2997", 1920, 1080, Fr2997, true),
            VideoFormat::F1080p30 => info("1080p30", 1920, 1080, Fr30, true),
            VideoFormat::F1080p50A => info("1080p50_a", 1920, 1080, Fr50, true),
            VideoFormat::F1080p5994A => info("1080p5994_a", 1920, 1080, Fr5994, true),
            VideoFormat::F1080p60A => info("1080p60_a", 1920, 1080, Fr60, true),
            VideoFormat::F1080p50B => info("1080p50_b", 1920, 1080, Fr50, true),
            VideoFormat::F1080p5994B => info("1080p5994_b", 1920, 1080, Fr5994, true),
            VideoFormat::F1080p60B => info("1080p60_b", 1920, 1080, Fr60, true),
            VideoFormat::F2160p2398 => info("2160p2398", 3840, 2160, Fr2398, true),
            VideoFormat::F2160p24 => info("2160p24", 3840, 2160, Fr24, true),
            VideoFormat::F2160p25 => info("2160p25", 3840, 2160, Fr25, true),
            VideoFormat::F2160p2997 => info("2160p2997", 3840, 2160, Fr2997, true),
            VideoFormat::F2160p30 => info("2160p30", 3840, 2160, Fr30, true),
            VideoFormat::F2160p50 => info("2160p50", 3840, 2160, Fr50, true),
            VideoFormat::F2160p5994 => info("2160p5994", 3840, 2160, Fr5994, true),
            VideoFormat::F2160p60 => info("2160p60", 3840, 2160, Fr60, true),
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn raster_width(self) -> u32 {
        self.info().width
    }

    pub fn raster_height(self) -> u32 {
        self.info().height
    }

    pub fn frame_rate(self) -> FrameRate {
        self.info().rate
    }

    pub fn is_progressive(self) -> bool {
        self.info().progressive
    }

    pub fn is_4k(self) -> bool {
        self.raster_width() >= 3840
    }

    /// 1080p above 30 fps, needs a 3G link (or better)
    pub fn is_3g(self) -> bool {
        matches!(
            self,
            VideoFormat::F1080p50A
                | VideoFormat::F1080p5994A
                | VideoFormat::F1080p60A
                | VideoFormat::F1080p50B
                | VideoFormat::F1080p5994B
                | VideoFormat::F1080p60B
        )
    }

    pub fn is_3g_level_b(self) -> bool {
        matches!(
            self,
            VideoFormat::F1080p50B | VideoFormat::F1080p5994B | VideoFormat::F1080p60B
        )
    }

    /// Level-A equivalent of a level-B format; other formats map to themselves
    pub fn level_a_equivalent(self) -> VideoFormat {
        match self {
            VideoFormat::F1080p50B => VideoFormat::F1080p50A,
            VideoFormat::F1080p5994B => VideoFormat::F1080p5994A,
            VideoFormat::F1080p60B => VideoFormat::F1080p60A,
            other => other,
        }
    }

    /// Level-B equivalent of a level-A format, used when the wire reports level B
    pub fn level_b_equivalent(self) -> VideoFormat {
        match self {
            VideoFormat::F1080p50A => VideoFormat::F1080p50B,
            VideoFormat::F1080p5994A => VideoFormat::F1080p5994B,
            VideoFormat::F1080p60A => VideoFormat::F1080p60B,
            other => other,
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VideoFormat {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|vf| vf.name() == wanted)
            .ok_or_else(|| ParseNameError::new("video format", s))
    }
}

/// Framebuffer pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit 4:2:2 YCbCr, Cb Y Cr Y byte order
    Ycbcr8,
    /// 10-bit 4:2:2 YCbCr packed as v210
    Ycbcr10,
    /// 8-bit ARGB, B G R A byte order in memory
    Argb8,
    /// 24-bit BGR
    Bgr24,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 4] = [
        PixelFormat::Ycbcr8,
        PixelFormat::Ycbcr10,
        PixelFormat::Argb8,
        PixelFormat::Bgr24,
    ];

    pub const DEFAULT: PixelFormat = PixelFormat::Ycbcr8;

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Ycbcr8 => "8bit_ycbcr",
            PixelFormat::Ycbcr10 => "10bit_ycbcr",
            PixelFormat::Argb8 => "8bit_argb",
            PixelFormat::Bgr24 => "24bit_bgr",
        }
    }

    pub fn is_rgb(self) -> bool {
        matches!(self, PixelFormat::Argb8 | PixelFormat::Bgr24)
    }

    /// Bytes in one raster line of `width` pixels
    pub fn bytes_per_row(self, width: u32) -> u32 {
        match self {
            PixelFormat::Ycbcr8 => width * 2,
            // 48 pixels are packed into 128 bytes; lines are padded to whole groups
            PixelFormat::Ycbcr10 => width.div_ceil(48) * 128,
            PixelFormat::Argb8 => width * 4,
            PixelFormat::Bgr24 => width * 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|pf| pf.name() == wanted)
            .ok_or_else(|| ParseNameError::new("pixel format", s))
    }
}

/// Raster geometry of a video/pixel format pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDesc {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl FormatDesc {
    pub fn new(video_format: VideoFormat, pixel_format: PixelFormat) -> Self {
        let width = video_format.raster_width();
        Self {
            width,
            height: video_format.raster_height(),
            bytes_per_row: pixel_format.bytes_per_row(width),
        }
    }

    /// Bytes in one full raster
    pub fn total_bytes(&self) -> usize {
        self.bytes_per_row as usize * self.height as usize
    }
}
