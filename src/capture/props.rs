//! Resolved properties of a capture session

use crate::ntv2::{
    AudioSystem, Channel, FormatDesc, InputSource, IoSelection, PixelFormat, SdiTransport,
    SdiTransport4K, VideoFormat, VpidDataList,
};

/// Everything that determines how the card is routed and captured for one session
///
/// Two sessions with equal props need identical hardware setup; any difference forces a
/// teardown and restart of the capture chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceProps {
    pub device_id: String,
    pub io_select: IoSelection,
    pub video_format: Option<VideoFormat>,
    pub pixel_format: Option<PixelFormat>,
    /// `None` derives the transport from the selection and signal
    pub sdi_transport: Option<SdiTransport>,
    pub sdi_4k_transport: SdiTransport4K,
    pub vpids: VpidDataList,
    pub auto_detect: bool,
    pub deactivate_while_not_showing: bool,
}

impl SourceProps {
    pub fn initial_input_source(&self) -> Option<InputSource> {
        self.io_select.initial_input_source()
    }

    /// Framestore the capture loop reads from
    pub fn channel(&self) -> Option<Channel> {
        self.initial_input_source().map(InputSource::channel)
    }

    pub fn audio_system(&self) -> Option<AudioSystem> {
        self.channel().map(Channel::audio_system)
    }

    /// Raster geometry of the configured formats
    pub fn frame_desc(&self) -> Option<FormatDesc> {
        Some(FormatDesc::new(self.video_format?, self.pixel_format?))
    }

    /// Whether the signal arrives as 3G level B
    pub fn is_level_b(&self) -> bool {
        self.video_format.is_some_and(VideoFormat::is_3g_level_b)
            || self.vpids.iter().any(|v| v.is_valid() && v.standard().is_level_b())
    }

    /// Configured transport, or the one implied by selection and format
    pub fn effective_transport(&self) -> SdiTransport {
        self.sdi_transport.unwrap_or_else(|| {
            guess_transport(
                self.io_select,
                self.video_format.unwrap_or(VideoFormat::FALLBACK),
                self.is_level_b(),
            )
        })
    }
}

/// SDI link framing implied by the selection and the incoming format
pub fn guess_transport(
    io_select: IoSelection,
    video_format: VideoFormat,
    level_b: bool,
) -> SdiTransport {
    if io_select.is_quad_link() {
        SdiTransport::QuadLink
    } else if io_select.is_squares() {
        SdiTransport::Sdi3GLevelB
    } else if io_select.is_dual_link() {
        if video_format.is_4k() {
            SdiTransport::Sdi6G
        } else if level_b {
            SdiTransport::Sdi3GLevelB
        } else {
            SdiTransport::DualLink
        }
    } else if video_format.is_4k() {
        SdiTransport::Sdi12G
    } else if level_b {
        SdiTransport::Sdi3GLevelB
    } else if video_format.is_3g() {
        SdiTransport::Sdi3GLevelA
    } else {
        SdiTransport::SingleLink
    }
}

/// Format corrections for selection/format combinations the card cannot capture as reported
///
/// A level-B 3G signal split over a dual-link selection is captured as its level-A
/// equivalent.
pub fn handle_special_case_formats(
    io_select: IoSelection,
    video_format: VideoFormat,
) -> VideoFormat {
    if io_select.is_dual_link() && video_format.is_3g_level_b() {
        video_format.level_a_equivalent()
    } else {
        video_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_channel_mapping() {
        let props = SourceProps {
            io_select: IoSelection::Sdi3_4,
            ..Default::default()
        };
        assert_eq!(props.channel(), Some(Channel::Ch3));
        assert_eq!(props.audio_system(), Some(AudioSystem(2)));
        assert_eq!(SourceProps::default().channel(), None);
    }

    #[test]
    fn test_guess_transport() {
        use SdiTransport::*;
        let cases = [
            (IoSelection::Sdi1, VideoFormat::F1080i5994, SingleLink),
            (IoSelection::Sdi1, VideoFormat::F1080p60A, Sdi3GLevelA),
            (IoSelection::Sdi2, VideoFormat::F1080p60B, Sdi3GLevelB),
            (IoSelection::Sdi1, VideoFormat::F2160p30, Sdi12G),
            (IoSelection::Sdi1_2, VideoFormat::F1080p30, DualLink),
            (IoSelection::Sdi1_2, VideoFormat::F2160p60, Sdi6G),
            (IoSelection::Sdi5_8, VideoFormat::F2160p60, QuadLink),
        ];
        for (io_select, vf, expected) in cases {
            assert_eq!(guess_transport(io_select, vf, false), expected, "{} {}", io_select, vf);
        }
    }

    #[test]
    fn test_explicit_transport_wins() {
        let props = SourceProps {
            io_select: IoSelection::Sdi1,
            video_format: Some(VideoFormat::F1080p60A),
            sdi_transport: Some(SdiTransport::Sdi3GLevelB),
            ..Default::default()
        };
        assert_eq!(props.effective_transport(), SdiTransport::Sdi3GLevelB);
    }

    #[test]
    fn test_level_b_on_dual_link() {
        assert_eq!(
            handle_special_case_formats(IoSelection::Sdi1_2, VideoFormat::F1080p5994B),
            VideoFormat::F1080p5994A
        );
        assert_eq!(
            handle_special_case_formats(IoSelection::Sdi1, VideoFormat::F1080p5994B),
            VideoFormat::F1080p5994B
        );
    }
}
