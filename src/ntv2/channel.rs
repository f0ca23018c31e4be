//! Channels, physical connectors and named input selections

use super::ParseNameError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Framestore / signal-processing channel on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
    Ch5,
    Ch6,
    Ch7,
    Ch8,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::Ch1,
        Channel::Ch2,
        Channel::Ch3,
        Channel::Ch4,
        Channel::Ch5,
        Channel::Ch6,
        Channel::Ch7,
        Channel::Ch8,
    ];

    /// Zero-based channel index
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Audio system that extracts embedded audio for this channel
    pub fn audio_system(self) -> AudioSystem {
        AudioSystem(self.index() as u8)
    }

    /// First of the two hardware frame slots reserved for this channel
    pub fn base_frame(self) -> u32 {
        self.index() as u32 * 2
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ch{}", self.index() + 1)
    }
}

/// Audio capture engine, one per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioSystem(pub u8);

impl AudioSystem {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AudioSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioSystem{}", self.0 + 1)
    }
}

/// Physical input connector (1-based connector numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputSource {
    Sdi(u8),
    Hdmi(u8),
}

impl InputSource {
    pub fn is_sdi(self) -> bool {
        matches!(self, InputSource::Sdi(_))
    }

    pub fn is_hdmi(self) -> bool {
        matches!(self, InputSource::Hdmi(_))
    }

    pub fn number(self) -> u8 {
        match self {
            InputSource::Sdi(n) | InputSource::Hdmi(n) => n,
        }
    }

    /// Channel whose framestore is fed by this connector
    pub fn channel(self) -> Channel {
        let index = (self.number().max(1) - 1) as usize;
        Channel::from_index(index).unwrap_or(Channel::Ch1)
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Sdi(n) => write!(f, "SDI{}", n),
            InputSource::Hdmi(n) => write!(f, "HDMI{}", n),
        }
    }
}

/// Named combination of physical connectors a client captures from
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoSelection {
    Sdi1,
    Sdi2,
    Sdi3,
    Sdi4,
    Sdi5,
    Sdi6,
    Sdi7,
    Sdi8,
    Sdi1_2,
    #[serde(rename = "sdi1_2_squares")]
    Sdi1_2_Squares,
    Sdi3_4,
    #[serde(rename = "sdi3_4_squares")]
    Sdi3_4_Squares,
    Sdi5_6,
    Sdi7_8,
    Sdi1_4,
    Sdi5_8,
    Hdmi1,
    Hdmi2,
    Hdmi3,
    Hdmi4,
    #[default]
    Invalid,
}

impl IoSelection {
    pub const ALL: [IoSelection; 20] = [
        IoSelection::Sdi1,
        IoSelection::Sdi2,
        IoSelection::Sdi3,
        IoSelection::Sdi4,
        IoSelection::Sdi5,
        IoSelection::Sdi6,
        IoSelection::Sdi7,
        IoSelection::Sdi8,
        IoSelection::Sdi1_2,
        IoSelection::Sdi1_2_Squares,
        IoSelection::Sdi3_4,
        IoSelection::Sdi3_4_Squares,
        IoSelection::Sdi5_6,
        IoSelection::Sdi7_8,
        IoSelection::Sdi1_4,
        IoSelection::Sdi5_8,
        IoSelection::Hdmi1,
        IoSelection::Hdmi2,
        IoSelection::Hdmi3,
        IoSelection::Hdmi4,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IoSelection::Sdi1 => "sdi1",
            IoSelection::Sdi2 => "sdi2",
            IoSelection::Sdi3 => "sdi3",
            IoSelection::Sdi4 => "sdi4",
            IoSelection::Sdi5 => "sdi5",
            IoSelection::Sdi6 => "sdi6",
            IoSelection::Sdi7 => "sdi7",
            IoSelection::Sdi8 => "sdi8",
            IoSelection::Sdi1_2 => "sdi1_2",
            IoSelection::Sdi1_2_Squares => "sdi1_2_squares",
            IoSelection::Sdi3_4 => "sdi3_4",
            IoSelection::Sdi3_4_Squares => "sdi3_4_squares",
            IoSelection::Sdi5_6 => "sdi5_6",
            IoSelection::Sdi7_8 => "sdi7_8",
            IoSelection::Sdi1_4 => "sdi1_4",
            IoSelection::Sdi5_8 => "sdi5_8",
            IoSelection::Hdmi1 => "hdmi1",
            IoSelection::Hdmi2 => "hdmi2",
            IoSelection::Hdmi3 => "hdmi3",
            IoSelection::Hdmi4 => "hdmi4",
            IoSelection::Invalid => "invalid",
        }
    }

    /// Physical connectors, ordered; the first one is the timing reference
    pub fn input_sources(self) -> BTreeSet<InputSource> {
        let sdi = |range: std::ops::RangeInclusive<u8>| -> BTreeSet<InputSource> {
            range.map(InputSource::Sdi).collect()
        };
        match self {
            IoSelection::Sdi1 => sdi(1..=1),
            IoSelection::Sdi2 => sdi(2..=2),
            IoSelection::Sdi3 => sdi(3..=3),
            IoSelection::Sdi4 => sdi(4..=4),
            IoSelection::Sdi5 => sdi(5..=5),
            IoSelection::Sdi6 => sdi(6..=6),
            IoSelection::Sdi7 => sdi(7..=7),
            IoSelection::Sdi8 => sdi(8..=8),
            IoSelection::Sdi1_2 | IoSelection::Sdi1_2_Squares => sdi(1..=2),
            IoSelection::Sdi3_4 | IoSelection::Sdi3_4_Squares => sdi(3..=4),
            IoSelection::Sdi5_6 => sdi(5..=6),
            IoSelection::Sdi7_8 => sdi(7..=8),
            IoSelection::Sdi1_4 => sdi(1..=4),
            IoSelection::Sdi5_8 => sdi(5..=8),
            IoSelection::Hdmi1 => [InputSource::Hdmi(1)].into(),
            IoSelection::Hdmi2 => [InputSource::Hdmi(2)].into(),
            IoSelection::Hdmi3 => [InputSource::Hdmi(3)].into(),
            IoSelection::Hdmi4 => [InputSource::Hdmi(4)].into(),
            IoSelection::Invalid => BTreeSet::new(),
        }
    }

    /// Channels (framestores) the selection occupies
    ///
    /// Squares selections carry four quadrants over two links and need four framestores.
    pub fn channels(self) -> BTreeSet<Channel> {
        match self {
            IoSelection::Sdi1_2_Squares => Channel::ALL[0..4].iter().copied().collect(),
            IoSelection::Sdi3_4_Squares => Channel::ALL[2..6].iter().copied().collect(),
            other => other.input_sources().into_iter().map(InputSource::channel).collect(),
        }
    }

    /// First connector of the selection
    pub fn initial_input_source(self) -> Option<InputSource> {
        self.input_sources().into_iter().next()
    }

    pub fn is_dual_link(self) -> bool {
        matches!(
            self,
            IoSelection::Sdi1_2 | IoSelection::Sdi3_4 | IoSelection::Sdi5_6 | IoSelection::Sdi7_8
        )
    }

    pub fn is_quad_link(self) -> bool {
        matches!(self, IoSelection::Sdi1_4 | IoSelection::Sdi5_8)
    }

    pub fn is_squares(self) -> bool {
        matches!(self, IoSelection::Sdi1_2_Squares | IoSelection::Sdi3_4_Squares)
    }

    pub fn is_hdmi(self) -> bool {
        matches!(
            self,
            IoSelection::Hdmi1 | IoSelection::Hdmi2 | IoSelection::Hdmi3 | IoSelection::Hdmi4
        )
    }

    /// Squares variant of a dual-link selection, used for 4K squares transport
    pub fn squares_variant(self) -> Option<Self> {
        match self {
            IoSelection::Sdi1_2 => Some(IoSelection::Sdi1_2_Squares),
            IoSelection::Sdi3_4 => Some(IoSelection::Sdi3_4_Squares),
            _ => None,
        }
    }
}

impl fmt::Display for IoSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IoSelection {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "invalid" {
            return Ok(IoSelection::Invalid);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|sel| sel.name() == wanted)
            .ok_or_else(|| ParseNameError::new("input selection", s))
    }
}

/// SDI link framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdiTransport {
    SingleLink,
    Sdi3GLevelA,
    Sdi3GLevelB,
    DualLink,
    QuadLink,
    Sdi6G,
    Sdi12G,
}

impl SdiTransport {
    pub const ALL: [SdiTransport; 7] = [
        SdiTransport::SingleLink,
        SdiTransport::Sdi3GLevelA,
        SdiTransport::Sdi3GLevelB,
        SdiTransport::DualLink,
        SdiTransport::QuadLink,
        SdiTransport::Sdi6G,
        SdiTransport::Sdi12G,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SdiTransport::SingleLink => "single_link",
            SdiTransport::Sdi3GLevelA => "3g_level_a",
            SdiTransport::Sdi3GLevelB => "3g_level_b",
            SdiTransport::DualLink => "dual_link",
            SdiTransport::QuadLink => "quad_link",
            SdiTransport::Sdi6G => "6g",
            SdiTransport::Sdi12G => "12g",
        }
    }
}

impl fmt::Display for SdiTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SdiTransport {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| ParseNameError::new("SDI transport", s))
    }
}

/// How a 4K raster is split across SDI links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdiTransport4K {
    Squares,
    #[default]
    TwoSampleInterleave,
}

/// Color space negotiated on an HDMI input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdmiColorSpace {
    YCbCr,
    Rgb,
}

/// Card timing reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    FreeRun,
    Input(InputSource),
}
