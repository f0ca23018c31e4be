//! SMPTE ST 352 video payload identifiers embedded in SDI signals
//!
//! A VPID is four bytes carried in the ancillary space of each link. Byte 1 names the
//! payload standard, byte 2 the picture rate and scanning, byte 3 the sampling structure
//! and byte 4 the bit depth. Dual-stream signals carry a second VPID on link B.

use super::FrameRate;

/// Payload standard (VPID byte 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VpidStandard {
    Unknown,
    Sd483_576,
    Hd720,
    Hd1080,
    DualLink1080,
    Hd720_3Ga,
    Hd1080_3Ga,
    Hd1080_3Gb,
    DualLink1080_3Gb,
    Uhd2160Quad3Ga,
    Uhd2160Quad3Gb,
    Uhd2160_6G,
    Uhd2160_12G,
}

impl VpidStandard {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0x81 => VpidStandard::Sd483_576,
            0x84 => VpidStandard::Hd720,
            0x85 => VpidStandard::Hd1080,
            0x87 => VpidStandard::DualLink1080,
            0x88 => VpidStandard::Hd720_3Ga,
            0x89 => VpidStandard::Hd1080_3Ga,
            0x8A => VpidStandard::Hd1080_3Gb,
            0x8B => VpidStandard::DualLink1080_3Gb,
            0x97 => VpidStandard::Uhd2160Quad3Ga,
            0x98 => VpidStandard::Uhd2160Quad3Gb,
            0xC0 => VpidStandard::Uhd2160_6G,
            0xCE => VpidStandard::Uhd2160_12G,
            _ => VpidStandard::Unknown,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            VpidStandard::Unknown => 0x00,
            VpidStandard::Sd483_576 => 0x81,
            VpidStandard::Hd720 => 0x84,
            VpidStandard::Hd1080 => 0x85,
            VpidStandard::DualLink1080 => 0x87,
            VpidStandard::Hd720_3Ga => 0x88,
            VpidStandard::Hd1080_3Ga => 0x89,
            VpidStandard::Hd1080_3Gb => 0x8A,
            VpidStandard::DualLink1080_3Gb => 0x8B,
            VpidStandard::Uhd2160Quad3Ga => 0x97,
            VpidStandard::Uhd2160Quad3Gb => 0x98,
            VpidStandard::Uhd2160_6G => 0xC0,
            VpidStandard::Uhd2160_12G => 0xCE,
        }
    }

    /// Signal is carried as 3G level B
    pub fn is_level_b(self) -> bool {
        matches!(
            self,
            VpidStandard::Hd1080_3Gb
                | VpidStandard::DualLink1080_3Gb
                | VpidStandard::Uhd2160Quad3Gb
        )
    }
}

/// Sampling structure (VPID byte 3, low nibble)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VpidSampling {
    Yuv422,
    Yuv444,
    Gbr444,
    Yuv420,
    Yuva4224,
    Yuva4444,
    Gbra4444,
    Yuvd4224,
    Unknown,
}

impl VpidSampling {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x0 => VpidSampling::Yuv422,
            0x1 => VpidSampling::Yuv444,
            0x2 => VpidSampling::Gbr444,
            0x3 => VpidSampling::Yuv420,
            0x4 => VpidSampling::Yuva4224,
            0x5 => VpidSampling::Yuva4444,
            0x6 => VpidSampling::Gbra4444,
            0x8 => VpidSampling::Yuvd4224,
            _ => VpidSampling::Unknown,
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            VpidSampling::Yuv422 => 0x0,
            VpidSampling::Yuv444 => 0x1,
            VpidSampling::Gbr444 => 0x2,
            VpidSampling::Yuv420 => 0x3,
            VpidSampling::Yuva4224 => 0x4,
            VpidSampling::Yuva4444 => 0x5,
            VpidSampling::Gbra4444 => 0x6,
            VpidSampling::Yuvd4224 => 0x8,
            VpidSampling::Unknown => 0xF,
        }
    }
}

/// Bit depth (VPID byte 4, low two bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VpidBitDepth {
    Bits8,
    Bits10,
    Bits12,
    Unknown,
}

/// Parsed VPID pair for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VpidData {
    a: u32,
    b: u32,
    standard: VpidStandard,
    sampling: VpidSampling,
    picture_rate: Option<FrameRate>,
    progressive: bool,
    bit_depth: VpidBitDepth,
}

/// VPIDs collected across all connectors of an input selection
pub type VpidDataList = Vec<VpidData>;

impl VpidData {
    /// Parse raw link A / link B payloads
    pub fn parse(a: u32, b: u32) -> Self {
        let [byte1, byte2, byte3, byte4] = a.to_be_bytes();

        let picture_rate = match byte2 & 0x0F {
            0x2 => Some(FrameRate::Fr2398),
            0x3 => Some(FrameRate::Fr24),
            0x5 => Some(FrameRate::Fr25),
            0x6 => Some(FrameRate::Fr2997),
            0x7 => Some(FrameRate::Fr30),
            0x9 => Some(FrameRate::Fr50),
            0xA => Some(FrameRate::Fr5994),
            0xB => Some(FrameRate::Fr60),
            _ => None,
        };

        let bit_depth = match byte4 & 0x03 {
            0 => VpidBitDepth::Bits8,
            1 => VpidBitDepth::Bits10,
            2 => VpidBitDepth::Bits12,
            _ => VpidBitDepth::Unknown,
        };

        Self {
            a,
            b,
            standard: VpidStandard::from_byte(byte1),
            sampling: VpidSampling::from_nibble(byte3 & 0x0F),
            picture_rate,
            progressive: byte2 & 0x40 != 0,
            bit_depth,
        }
    }

    /// Build a raw link-A payload; used by signal generators and tests
    pub fn encode(
        standard: VpidStandard,
        rate: FrameRate,
        progressive: bool,
        sampling: VpidSampling,
        bit_depth: VpidBitDepth,
    ) -> u32 {
        let rate_code = match rate {
            FrameRate::Fr2398 => 0x2,
            FrameRate::Fr24 => 0x3,
            FrameRate::Fr25 => 0x5,
            FrameRate::Fr2997 => 0x6,
            FrameRate::Fr30 => 0x7,
            FrameRate::Fr50 => 0x9,
            FrameRate::Fr5994 => 0xA,
            FrameRate::Fr60 => 0xB,
        };
        let scan = if progressive { 0xC0 } else { 0x00 };
        let depth = match bit_depth {
            VpidBitDepth::Bits8 => 0,
            VpidBitDepth::Bits10 => 1,
            VpidBitDepth::Bits12 => 2,
            VpidBitDepth::Unknown => 3,
        };
        u32::from_be_bytes([standard.to_byte(), scan | rate_code, sampling.to_nibble(), depth])
    }

    pub fn raw_a(&self) -> u32 {
        self.a
    }

    pub fn raw_b(&self) -> u32 {
        self.b
    }

    /// A zero link-A payload means no VPID was present on the wire
    pub fn is_valid(&self) -> bool {
        self.a != 0
    }

    pub fn standard(&self) -> VpidStandard {
        self.standard
    }

    pub fn sampling(&self) -> VpidSampling {
        self.sampling
    }

    pub fn picture_rate(&self) -> Option<FrameRate> {
        self.picture_rate
    }

    pub fn is_progressive(&self) -> bool {
        self.progressive
    }

    pub fn bit_depth(&self) -> VpidBitDepth {
        self.bit_depth
    }
}
