//! Crosspoint identifiers of the card's internal signal router

use super::Channel;
use std::fmt;

/// Signal source in the router: the output of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum XptOutput {
    /// SDI receiver; `ds2` selects the second data stream of a 3G/level-B link
    SdiIn { input: u8, ds2: bool },
    /// HDMI receiver, YCbCr or RGB output
    HdmiIn { input: u8, rgb: bool },
    /// Color space converter YCbCr output
    CscYuv(Channel),
    /// Color space converter RGB output
    CscRgb(Channel),
    /// Two-sample-interleave demux output
    Tsi425 { mux: u8, ds2: bool },
    Black,
}

/// Signal sink in the router: the input of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum XptInput {
    FrameBuffer { channel: Channel, ds2: bool },
    Csc(Channel),
    /// Two-sample-interleave demux input (`link` 0-3)
    Tsi425 { mux: u8, link: u8 },
}

impl fmt::Display for XptOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XptOutput::SdiIn { input, ds2 } => {
                write!(f, "SDIIn{}{}", input, if *ds2 { "DS2" } else { "" })
            }
            XptOutput::HdmiIn { input, rgb } => {
                write!(f, "HDMIIn{}{}", input, if *rgb { "RGB" } else { "" })
            }
            XptOutput::CscYuv(ch) => write!(f, "CSC{}VidYUV", ch.index() + 1),
            XptOutput::CscRgb(ch) => write!(f, "CSC{}VidRGB", ch.index() + 1),
            XptOutput::Tsi425 { mux, ds2 } => {
                write!(f, "425Mux{}{}", mux, if *ds2 { "b" } else { "a" })
            }
            XptOutput::Black => f.write_str("Black"),
        }
    }
}

impl fmt::Display for XptInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XptInput::FrameBuffer { channel, ds2 } => {
                write!(f, "FB{}{}", channel.index() + 1, if *ds2 { "DS2" } else { "" })
            }
            XptInput::Csc(ch) => write!(f, "CSC{}Vid", ch.index() + 1),
            XptInput::Tsi425 { mux, link } => write!(f, "425Mux{}In{}", mux, link + 1),
        }
    }
}
