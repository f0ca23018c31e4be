//! Wire format detection
//!
//! Probes the connectors of an input selection and works out what is actually arriving:
//! the raster format from the receiver, the pixel layout from embedded VPIDs (SDI) or the
//! negotiated color space (HDMI).

use super::props::handle_special_case_formats;
use crate::device::{Card, DeviceInfo};
use crate::error::{AjaError, Result};
use crate::ntv2::{
    HdmiColorSpace, InputSource, IoSelection, PixelFormat, VideoFormat, VpidData, VpidDataList,
    VpidSampling,
};
use tracing::{debug, info};

/// Formats detected on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFormats {
    /// `None` when no usable signal is present
    pub video_format: Option<VideoFormat>,
    /// Wanted pixel format, overridden by what the signal carries
    pub pixel_format: Option<PixelFormat>,
    /// VPIDs of every SDI connector that reported one, in connector order
    pub vpids: VpidDataList,
    /// HDMI input is delivering RGB
    pub hdmi_rgb: bool,
}

/// Probe every connector of `io_select` and resolve the incoming formats
///
/// Each connector costs one bounded vertical-interrupt wait, plus one more on the first
/// connector before its raster format is read.
pub fn resolve_wire_formats(
    card: &dyn Card,
    device: &DeviceInfo,
    io_select: IoSelection,
    wanted_pixel_format: Option<PixelFormat>,
) -> Result<WireFormats> {
    let sources = io_select.input_sources();
    let Some(initial) = sources.iter().next().copied() else {
        info!("No input sources found for input selection {}", io_select);
        return Err(AjaError::NoInputSources(io_select));
    };

    let mut pixel_format = wanted_pixel_format;
    let mut vpids = VpidDataList::new();
    let mut hdmi_rgb = false;

    for source in &sources {
        let channel = source.channel();
        card.enable_channel(channel)?;
        match source {
            InputSource::Sdi(_) => {
                if device.bidirectional_sdi {
                    card.set_sdi_transmit_enable(channel, false)?;
                }
                card.wait_for_input_vertical_interrupt(channel);
                match card.read_sdi_in_vpid(channel) {
                    Ok((a, b)) => vpids.push(VpidData::parse(a, b)),
                    Err(e) => debug!("No VPID on {}: {}", source, e),
                }
            }
            InputSource::Hdmi(_) => {
                card.wait_for_input_vertical_interrupt(channel);
                // HDMI v1 receivers convert RGB to YCbCr themselves
                if device.hdmi_version == 1 {
                    pixel_format = Some(PixelFormat::DEFAULT);
                } else {
                    match card.hdmi_input_color(channel)? {
                        HdmiColorSpace::YCbCr => pixel_format = Some(PixelFormat::DEFAULT),
                        HdmiColorSpace::Rgb => {
                            pixel_format = Some(PixelFormat::Bgr24);
                            hdmi_rgb = true;
                        }
                    }
                }
            }
        }
    }

    let initial_channel = initial.channel();
    card.wait_for_input_vertical_interrupt(initial_channel);
    let video_format =
        card.input_video_format(initial, card.is_3g_level_b(initial_channel));

    if initial.is_sdi() {
        if let Some(vpid) = vpids.first().filter(|v| v.is_valid()) {
            match vpid.sampling() {
                VpidSampling::Yuv422 => pixel_format = Some(PixelFormat::Ycbcr8),
                VpidSampling::Gbr444 => pixel_format = Some(PixelFormat::Bgr24),
                _ => {}
            }
            if let Some(pf) = pixel_format {
                info!("Detected pixel format {} on {}", pf, io_select);
            }
        }
    }

    let video_format = video_format.map(|vf| handle_special_case_formats(io_select, vf));
    match video_format {
        Some(vf) => info!("Detected video format {} on {}", vf, io_select),
        None => info!("No video format detected on {}", io_select),
    }

    Ok(WireFormats {
        video_format,
        pixel_format,
        vpids,
        hdmi_rgb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::SimulatedCard;
    use crate::ntv2::{Channel, FrameRate, VpidBitDepth, VpidStandard};
    use std::time::Duration;

    fn card() -> std::sync::Arc<SimulatedCard> {
        let card = SimulatedCard::new("sim-0");
        card.set_frame_period(Duration::from_millis(1));
        card
    }

    #[test]
    fn test_empty_selection() {
        let card = card();
        let err = resolve_wire_formats(&*card, card.info(), IoSelection::Invalid, None);
        assert!(matches!(err, Err(AjaError::NoInputSources(IoSelection::Invalid))));
    }

    #[test]
    fn test_sdi_422_signal() {
        let card = card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F1080i5994));
        card.set_sdi_transmit_enable(Channel::Ch1, true).unwrap();

        let wire = resolve_wire_formats(&*card, card.info(), IoSelection::Sdi1, None).unwrap();
        assert_eq!(wire.video_format, Some(VideoFormat::F1080i5994));
        assert_eq!(wire.pixel_format, Some(PixelFormat::Ycbcr8));
        assert_eq!(wire.vpids.len(), 1);
        assert!(card.is_channel_enabled(Channel::Ch1));
        assert!(!card.is_transmitting(Channel::Ch1));
    }

    #[test]
    fn test_gbr_vpid_selects_bgr() {
        let card = card();
        card.set_input_signal(InputSource::Sdi(2), Some(VideoFormat::F1080p30));
        let raw = VpidData::encode(
            VpidStandard::Hd1080,
            FrameRate::Fr30,
            true,
            VpidSampling::Gbr444,
            VpidBitDepth::Bits10,
        );
        card.set_vpid(InputSource::Sdi(2), raw, 0);

        let wire = resolve_wire_formats(
            &*card,
            card.info(),
            IoSelection::Sdi2,
            Some(PixelFormat::Ycbcr10),
        )
        .unwrap();
        assert_eq!(wire.pixel_format, Some(PixelFormat::Bgr24));
    }

    #[test]
    fn test_hdmi_color_space() {
        let card = card();
        card.set_input_signal(InputSource::Hdmi(1), Some(VideoFormat::F720p60));
        card.set_hdmi_color(InputSource::Hdmi(1), HdmiColorSpace::Rgb);

        let wire = resolve_wire_formats(&*card, card.info(), IoSelection::Hdmi1, None).unwrap();
        assert_eq!(wire.video_format, Some(VideoFormat::F720p60));
        assert_eq!(wire.pixel_format, Some(PixelFormat::Bgr24));
        assert!(wire.hdmi_rgb);
        assert!(wire.vpids.is_empty());
    }

    #[test]
    fn test_no_signal_keeps_wanted_pixel_format() {
        let card = card();
        let wire = resolve_wire_formats(
            &*card,
            card.info(),
            IoSelection::Sdi3,
            Some(PixelFormat::Ycbcr10),
        )
        .unwrap();
        assert_eq!(wire.video_format, None);
        assert_eq!(wire.pixel_format, Some(PixelFormat::Ycbcr10));
        assert!(!wire.vpids[0].is_valid());
    }

    #[test]
    fn test_level_b_dual_link_remap() {
        let card = card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F1080p50B));
        card.set_input_signal(InputSource::Sdi(2), Some(VideoFormat::F1080p50B));

        let single = resolve_wire_formats(&*card, card.info(), IoSelection::Sdi1, None).unwrap();
        assert_eq!(single.video_format, Some(VideoFormat::F1080p50B));

        let dual = resolve_wire_formats(&*card, card.info(), IoSelection::Sdi1_2, None).unwrap();
        assert_eq!(dual.video_format, Some(VideoFormat::F1080p50A));
        assert_eq!(dual.vpids.len(), 2);
    }

    #[test]
    fn test_resolver_is_idempotent() {
        let card = card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let first = resolve_wire_formats(&*card, card.info(), IoSelection::Sdi1, None).unwrap();
        let second = resolve_wire_formats(&*card, card.info(), IoSelection::Sdi1, None).unwrap();
        assert_eq!(first, second);
    }
}
