//! Signal routing for capture sessions
//!
//! Turns resolved [`SourceProps`] into crosspoint connections between input widgets and
//! framestores, programs the framestores and controls embedded audio extraction.

use crate::capture::SourceProps;
use crate::device::Card;
use crate::error::{AjaError, Result};
use crate::ntv2::{
    Channel, HdmiColorSpace, InputSource, PixelFormat, SdiTransport, SdiTransport4K,
    VideoFormat, VpidSampling, XptInput, XptOutput,
};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Crosspoint connections and framestores needed by one session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutePlan {
    /// Framestores to put into capture mode
    pub framestores: Vec<Channel>,
    pub connections: Vec<(XptInput, XptOutput)>,
    /// Router inputs owned by the session, cleared before connecting
    pub owned_inputs: Vec<XptInput>,
}

impl RoutePlan {
    fn connect(&mut self, input: XptInput, output: XptOutput) {
        self.connections.push((input, output));
    }

    fn add_framestore(&mut self, channel: Channel) {
        if !self.framestores.contains(&channel) {
            self.framestores.push(channel);
        }
    }

    /// Route `source` into a framestore, through the channel's color space converter
    /// when the wire and framebuffer color models differ
    fn feed(&mut self, channel: Channel, source: XptOutput, wire_rgb: bool, fb_rgb: bool) {
        if wire_rgb == fb_rgb {
            self.connect(fb(channel, false), source);
        } else {
            self.connect(XptInput::Csc(channel), source);
            let converted = if fb_rgb {
                XptOutput::CscRgb(channel)
            } else {
                XptOutput::CscYuv(channel)
            };
            self.connect(fb(channel, false), converted);
        }
        self.add_framestore(channel);
    }
}

fn fb(channel: Channel, ds2: bool) -> XptInput {
    XptInput::FrameBuffer { channel, ds2 }
}

fn sdi(input: u8, ds2: bool) -> XptOutput {
    XptOutput::SdiIn { input, ds2 }
}

fn tsi_mux(channel: Channel) -> u8 {
    (channel.index() / 2) as u8 + 1
}

/// Build the route for `props` without touching the card
pub fn build_route_plan(props: &SourceProps, wire_rgb: bool) -> Result<RoutePlan> {
    let io_select = props.io_select;
    let channels: Vec<Channel> = io_select.channels().into_iter().collect();
    let sources: Vec<InputSource> = io_select.input_sources().into_iter().collect();
    let (Some(&c0), Some(&first)) = (channels.first(), sources.first()) else {
        return Err(AjaError::NoInputSources(io_select));
    };
    let (Some(video_format), Some(pixel_format)) = (props.video_format, props.pixel_format) else {
        return Err(AjaError::UnresolvedFormat {
            video: props.video_format,
            pixel: props.pixel_format,
        });
    };
    let fb_rgb = pixel_format.is_rgb();

    let mut plan = RoutePlan::default();
    let muxes: BTreeSet<u8> = channels.iter().map(|ch| tsi_mux(*ch)).collect();
    for ch in &channels {
        plan.owned_inputs.push(fb(*ch, false));
        plan.owned_inputs.push(fb(*ch, true));
        plan.owned_inputs.push(XptInput::Csc(*ch));
    }
    for mux in muxes {
        for link in 0..2 {
            plan.owned_inputs.push(XptInput::Tsi425 { mux, link });
        }
    }

    let inputs: Vec<u8> = sources.iter().map(|s| s.number()).collect();

    if let InputSource::Hdmi(n) = first {
        plan.feed(c0, XptOutput::HdmiIn { input: n, rgb: wire_rgb }, wire_rgb, fb_rgb);
    } else if io_select.is_squares() {
        // each link carries two quadrants, one per data stream
        for (i, ch) in channels.iter().enumerate() {
            let input = inputs[(i / 2).min(inputs.len() - 1)];
            plan.connect(fb(*ch, false), sdi(input, i % 2 == 1));
            plan.add_framestore(*ch);
        }
    } else if io_select.is_quad_link() {
        match props.sdi_4k_transport {
            SdiTransport4K::Squares => {
                for (ch, input) in channels.iter().zip(&inputs) {
                    plan.connect(fb(*ch, false), sdi(*input, false));
                    plan.add_framestore(*ch);
                }
            }
            SdiTransport4K::TwoSampleInterleave => {
                for (pair, ch) in inputs.chunks(2).zip(channels.iter().step_by(2)) {
                    route_tsi(&mut plan, *ch, pair, c0);
                }
            }
        }
    } else if io_select.is_dual_link() {
        if video_format.is_4k() {
            route_tsi(&mut plan, c0, &inputs, c0);
        } else {
            plan.connect(fb(c0, false), sdi(inputs[0], false));
            plan.connect(fb(c0, true), sdi(inputs[inputs.len() - 1], false));
            plan.add_framestore(c0);
        }
    } else if props.effective_transport() == SdiTransport::Sdi3GLevelB {
        plan.connect(fb(c0, false), sdi(inputs[0], false));
        plan.connect(fb(c0, true), sdi(inputs[0], true));
        plan.add_framestore(c0);
    } else {
        plan.feed(c0, sdi(inputs[0], false), wire_rgb, fb_rgb);
    }

    debug!(
        "Route for {} ({} / {}): {} connections, framestores {:?}",
        io_select,
        video_format,
        pixel_format,
        plan.connections.len(),
        plan.framestores
    );
    Ok(plan)
}

/// Two-sample-interleave: a pair of links into one mux, the mux's two outputs into the
/// framestore following the first one of the group
fn route_tsi(plan: &mut RoutePlan, group_first: Channel, links: &[u8], first_channel: Channel) {
    let mux = tsi_mux(group_first);
    for (link, input) in links.iter().enumerate() {
        plan.connect(
            XptInput::Tsi425 {
                mux,
                link: link as u8,
            },
            sdi(*input, false),
        );
    }
    let offset = (group_first.index() - first_channel.index()) / 2;
    let channel = Channel::from_index(first_channel.index() + offset).unwrap_or(first_channel);
    plan.connect(fb(channel, false), XptOutput::Tsi425 { mux, ds2: false });
    plan.connect(fb(channel, true), XptOutput::Tsi425 { mux, ds2: true });
    plan.add_framestore(channel);
}

/// Whether the wire carries RGB for the session's first connector
fn wire_is_rgb(props: &SourceProps, card: &dyn Card) -> Result<bool> {
    match props.initial_input_source() {
        Some(InputSource::Hdmi(_)) => {
            if card.info().hdmi_version == 1 {
                return Ok(false);
            }
            let channel = props.channel().unwrap_or(Channel::Ch1);
            Ok(card.hdmi_input_color(channel)? == HdmiColorSpace::Rgb)
        }
        Some(InputSource::Sdi(_)) => Ok(props
            .vpids
            .iter()
            .find(|v| v.is_valid())
            .is_some_and(|v| v.sampling() == VpidSampling::Gbr444)),
        None => Ok(false),
    }
}

/// Program the card for `props`: framestores into capture mode, formats set, the session's
/// crosspoints cleared and reconnected
///
/// Running it twice with the same props leaves the card in the same state.
pub fn configure_source_route(props: &SourceProps, card: &dyn Card) -> Result<RoutePlan> {
    let plan = build_route_plan(props, wire_is_rgb(props, card)?)?;
    let (video_format, pixel_format) = formats(props)?;

    if card.info().bidirectional_sdi {
        for source in props.io_select.input_sources().iter().filter(|s| s.is_sdi()) {
            card.set_sdi_transmit_enable(source.channel(), false)?;
        }
    }

    for channel in &plan.framestores {
        card.enable_channel(*channel)?;
        card.set_capture_mode(*channel)?;
        card.set_frame_buffer_format(*channel, pixel_format)?;
        card.set_video_format(*channel, video_format)?;
    }

    for input in &plan.owned_inputs {
        card.disconnect(*input)?;
    }
    for (input, output) in &plan.connections {
        card.connect(*input, *output)?;
    }

    info!(
        "Configured route for {} on {}: {} / {}",
        props.io_select, props.device_id, video_format, pixel_format
    );
    Ok(plan)
}

fn formats(props: &SourceProps) -> Result<(VideoFormat, PixelFormat)> {
    match (props.video_format, props.pixel_format) {
        (Some(vf), Some(pf)) => Ok((vf, pf)),
        (video, pixel) => Err(AjaError::UnresolvedFormat { video, pixel }),
    }
}

/// Select the session's first connector as embedded audio source and start extraction
pub fn start_source_audio(props: &SourceProps, card: &dyn Card) -> Result<()> {
    let (Some(system), Some(source)) = (props.audio_system(), props.initial_input_source()) else {
        return Err(AjaError::NoInputSources(props.io_select));
    };
    card.set_audio_input_source(system, source)?;
    card.start_audio_input(system)?;
    debug!("Started {} from {}", system, source);
    Ok(())
}

pub fn stop_source_audio(props: &SourceProps, card: &dyn Card) -> Result<()> {
    let Some(system) = props.audio_system() else {
        return Ok(());
    };
    card.stop_audio_input(system)?;
    debug!("Stopped {}", system);
    Ok(())
}
