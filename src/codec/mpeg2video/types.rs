use crate::av::timestamp::CLOCK_HZ;
use crate::av::{CodecData, StreamType};
use crate::error::{RemuxError, Result};

pub const PICTURE_START_CODE: u8 = 0x00;
pub const SEQUENCE_HEADER_CODE: u8 = 0xB3;
pub const EXTENSION_START_CODE: u8 = 0xB5;
pub const SEQUENCE_END_CODE: u8 = 0xB7;
pub const GROUP_START_CODE: u8 = 0xB8;

pub const FLAG_NON_INTRA_QUANT: u8 = 0x01;
pub const FLAG_INTRA_QUANT: u8 = 0x02;
pub const FLAG_CONSTRAINED: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    Pal,
    Ntsc,
}

/// Telecine cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pulldown {
    #[default]
    None,
    Pulldown32,
    Pulldown23,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressiveMode {
    #[default]
    Interlaced,
    Progressive,
    /// Progressive frames shown as two repeated field pairs
    TwoField,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChromaFormat {
    #[default]
    Reserved,
    Yuv420,
    Yuv422,
    Yuv444,
}

impl From<u8> for ChromaFormat {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            1 => ChromaFormat::Yuv420,
            2 => ChromaFormat::Yuv422,
            3 => ChromaFormat::Yuv444,
            _ => ChromaFormat::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionId {
    Sequence,
    SequenceDisplay,
    QuantMatrix,
    Copyright,
    SequenceScalable,
    PictureDisplay,
    PictureCoding,
    PictureSpatialScalable,
    PictureTemporalScalable,
    Reserved(u8),
}

impl From<u8> for ExtensionId {
    fn from(value: u8) -> Self {
        match value {
            1 => ExtensionId::Sequence,
            2 => ExtensionId::SequenceDisplay,
            3 => ExtensionId::QuantMatrix,
            4 => ExtensionId::Copyright,
            5 => ExtensionId::SequenceScalable,
            7 => ExtensionId::PictureDisplay,
            8 => ExtensionId::PictureCoding,
            9 => ExtensionId::PictureSpatialScalable,
            10 => ExtensionId::PictureTemporalScalable,
            other => ExtensionId::Reserved(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureCodingType {
    I,
    P,
    B,
    Other(u8),
}

impl From<u8> for PictureCodingType {
    fn from(value: u8) -> Self {
        match value {
            1 => PictureCodingType::I,
            2 => PictureCodingType::P,
            3 => PictureCodingType::B,
            other => PictureCodingType::Other(other),
        }
    }
}

/// Video sequence parameters, accumulated from the sequence header, the
/// sequence extension and picture coding extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSequenceInfo {
    pub h_size: u32,
    pub v_size: u32,
    /// Display aspect ratio times 100, 0 for reserved codes
    pub aspect_ratio: u32,
    /// Frames per 1000 seconds
    pub frame_rate: u32,
    pub video_format: Option<VideoFormat>,
    /// Units of 400 bit/s
    pub bit_rate: u32,
    /// Units of 16 kbit
    pub vbv_buffer_size: u32,
    /// `FLAG_*` bits
    pub flags: u8,
    pub intra_quant: [u8; 64],
    pub non_intra_quant: [u8; 64],
    pub profile: u8,
    pub progressive: ProgressiveMode,
    pub chroma: ChromaFormat,
    pub pulldown: Pulldown,
    pub current_tmpref: u16,
    /// Sequence header parsed
    pub set: bool,
    /// Sequence extension merged
    pub ext_set: bool,
    /// Cadence decided for this sequence
    pub pulldown_set: bool,
}

impl Default for VideoSequenceInfo {
    fn default() -> Self {
        Self {
            h_size: 0,
            v_size: 0,
            aspect_ratio: 0,
            frame_rate: 0,
            video_format: None,
            bit_rate: 0,
            vbv_buffer_size: 0,
            flags: 0,
            intra_quant: [0; 64],
            non_intra_quant: [0; 64],
            profile: 0,
            progressive: ProgressiveMode::default(),
            chroma: ChromaFormat::default(),
            pulldown: Pulldown::default(),
            current_tmpref: 0,
            set: false,
            ext_set: false,
            pulldown_set: false,
        }
    }
}

impl VideoSequenceInfo {
    /// Duration of one frame in 27 MHz ticks.
    pub fn frame_period(&self) -> Result<u64> {
        if self.frame_rate == 0 {
            return Err(RemuxError::InvalidData("video frame rate is not set".into()));
        }
        Ok(CLOCK_HZ * 1000 / u64::from(self.frame_rate))
    }

    pub fn is_progressive(&self) -> bool {
        self.progressive != ProgressiveMode::Interlaced
    }

    pub fn bit_rate_bps(&self) -> u32 {
        self.bit_rate.saturating_mul(400)
    }
}

impl CodecData for VideoSequenceInfo {
    fn stream_type(&self) -> StreamType {
        StreamType::Video
    }

    fn bit_rate(&self) -> u32 {
        self.bit_rate_bps()
    }
}
