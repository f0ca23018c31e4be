//! Black placeholder rasters

use crate::ntv2::{FormatDesc, PixelFormat, VideoFormat};
use tracing::debug;

/// v210 words carrying black: Cb Y Cr and Y Cb Y (and the mirrored Cr Y Cb / Y Cr Y)
const V210_BLACK_A: u32 = 512 | (64 << 10) | (512 << 20);
const V210_BLACK_B: u32 = 64 | (512 << 10) | (64 << 20);

/// Placeholder raster ready to hand to a sink
#[derive(Debug)]
pub struct Placeholder<'a> {
    pub video_format: VideoFormat,
    pub pixel_format: PixelFormat,
    pub desc: FormatDesc,
    pub data: &'a [u8],
}

/// Keeps the last generated black raster around
#[derive(Debug, Default)]
pub struct TestPatternCache {
    key: Option<(u32, u32, PixelFormat)>,
    raster: Vec<u8>,
    generations: usize,
}

impl TestPatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Black raster for the given formats, generated only when the geometry changes
    ///
    /// Unknown formats fall back to 720p59.94 and 8-bit YCbCr.
    pub fn black(
        &mut self,
        video_format: Option<VideoFormat>,
        pixel_format: Option<PixelFormat>,
    ) -> Placeholder<'_> {
        let video_format = video_format.unwrap_or(VideoFormat::FALLBACK);
        let pixel_format = pixel_format.unwrap_or(PixelFormat::DEFAULT);
        let desc = FormatDesc::new(video_format, pixel_format);
        let key = (desc.width, desc.height, pixel_format);

        if self.key != Some(key) {
            self.raster = black_raster(&desc, pixel_format);
            self.key = Some(key);
            self.generations += 1;
            debug!(
                "Generated black test pattern {}x{} {}",
                desc.width, desc.height, pixel_format
            );
        }

        Placeholder {
            video_format,
            pixel_format,
            desc,
            data: &self.raster,
        }
    }

    /// How many rasters have been generated so far
    pub fn generations(&self) -> usize {
        self.generations
    }
}

/// Fill a full raster with black in the framebuffer layout of `pixel_format`
pub fn black_raster(desc: &FormatDesc, pixel_format: PixelFormat) -> Vec<u8> {
    let size = desc.total_bytes();
    let mut raster = vec![0u8; size];
    match pixel_format {
        PixelFormat::Ycbcr8 => {
            for pair in raster.chunks_exact_mut(2) {
                pair.copy_from_slice(&[0x80, 0x10]);
            }
        }
        PixelFormat::Ycbcr10 => {
            for (i, word) in raster.chunks_exact_mut(4).enumerate() {
                let value = if i % 2 == 0 { V210_BLACK_A } else { V210_BLACK_B };
                word.copy_from_slice(&value.to_le_bytes());
            }
        }
        PixelFormat::Argb8 => {
            for pixel in raster.chunks_exact_mut(4) {
                pixel.copy_from_slice(&[0, 0, 0, 0xFF]);
            }
        }
        PixelFormat::Bgr24 => {}
    }
    raster
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_layouts() {
        let desc = FormatDesc::new(VideoFormat::F525i5994, PixelFormat::Ycbcr8);
        let uyvy = black_raster(&desc, PixelFormat::Ycbcr8);
        assert_eq!(&uyvy[..4], &[0x80, 0x10, 0x80, 0x10]);

        let desc = FormatDesc::new(VideoFormat::F525i5994, PixelFormat::Ycbcr10);
        let v210 = black_raster(&desc, PixelFormat::Ycbcr10);
        assert_eq!(v210.len(), desc.total_bytes());
        assert_eq!(u32::from_le_bytes(v210[0..4].try_into().unwrap()), V210_BLACK_A);
        assert_eq!(u32::from_le_bytes(v210[4..8].try_into().unwrap()), V210_BLACK_B);

        let desc = FormatDesc::new(VideoFormat::F525i5994, PixelFormat::Argb8);
        let bgra = black_raster(&desc, PixelFormat::Argb8);
        assert_eq!(&bgra[4..8], &[0, 0, 0, 0xFF]);
    }

    #[test]
    fn test_cache_reuses_raster() {
        let mut cache = TestPatternCache::new();
        let placeholder = cache.black(None, None);
        assert_eq!(placeholder.video_format, VideoFormat::F720p5994);
        assert_eq!(placeholder.data.len(), 1280 * 2 * 720);

        cache.black(Some(VideoFormat::F720p50), Some(PixelFormat::Ycbcr8));
        assert_eq!(cache.generations(), 1);

        cache.black(Some(VideoFormat::F1080i50), Some(PixelFormat::Ycbcr8));
        assert_eq!(cache.generations(), 2);
    }
}
