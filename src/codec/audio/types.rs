use crate::av::{CodecData, StreamType};

/// MPEG audio bit rates in kb/s, indexed `[lsf][layer - 1][index]`.
pub static MPEG_AUDIO_BITRATES: [[[u16; 15]; 3]; 2] = [
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    ],
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    ],
];

/// MPEG-1 sampling frequencies; lower-rate variants shift these right.
pub static MPEG_AUDIO_FREQUENCIES: [u32; 3] = [44100, 48000, 32000];

/// AC-3 bit rates in kb/s indexed by `frmsizecod >> 1`.
pub static AC3_BITRATES: [u32; 32] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Sample-rate halving exponent indexed by `bsid`.
pub static AC3_HALF_RATE: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3];

/// AC-3 sampling frequencies in units of 100 Hz indexed by `fscod`.
pub static AC3_FREQUENCIES: [u32; 4] = [480, 441, 320, 0];

pub const MPEG_AUDIO_HEADER_LEN: usize = 4;
pub const AC3_HEADER_LEN: usize = 6;

/// Sync pattern to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    /// MPEG-1/2 audio layers 1 to 3: `0xFF` then five set bits
    MpegAudio,
    /// AC-3: `0x0B 0x77`
    Ac3,
}

impl AudioKind {
    /// First sync byte, second sync byte and the mask applied to the second.
    pub fn sync_pattern(self) -> (u8, u8, u8) {
        match self {
            AudioKind::MpegAudio => (0xFF, 0xF8, 0xF8),
            AudioKind::Ac3 => (0x0B, 0x77, 0xFF),
        }
    }

    pub fn header_len(self) -> usize {
        match self {
            AudioKind::MpegAudio => MPEG_AUDIO_HEADER_LEN,
            AudioKind::Ac3 => AC3_HEADER_LEN,
        }
    }
}

/// Outcome of re-validating a header against a locked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCheck {
    Consistent,
    /// Parameters changed; the caller has to resync.
    Inconsistent,
    /// The second header byte is `0xFF`, typically a run of fill bytes.
    AllOnes,
}

/// Parameters of an audio frame.
///
/// `layer` is 1 to 3 for MPEG audio and 0 for AC-3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFrameInfo {
    pub layer: u8,
    /// Bits per second
    pub bit_rate: u32,
    /// Effective sample rate after the LSF/MPEG-2.5 shift
    pub sample_rate: u32,
    /// Nominal frequency in Hz, used for timing
    pub frequency: u32,
    pub lsf: bool,
    pub mpg25: bool,
    pub padding: bool,
    /// Frame length in bytes including the header
    pub frame_size: usize,
    /// Sync offset within the last search window
    pub offset: usize,
    pub set: bool,
}

impl AudioFrameInfo {
    pub fn is_ac3(&self) -> bool {
        self.layer == 0
    }

    /// PCM samples per frame.
    pub fn samples_per_frame(&self) -> u32 {
        match self.layer {
            0 => 1536,
            1 => 384,
            _ => 1152,
        }
    }

    /// Frame length implied by the current MPEG audio fields, `None` for the
    /// free-format bit rate.
    pub fn mpeg_frame_size(&self) -> Option<usize> {
        let kbps = (self.bit_rate / 1000) as usize;
        let sample_rate = self.sample_rate as usize;
        if kbps == 0 || sample_rate == 0 {
            return None;
        }
        let padding = usize::from(self.padding);
        match self.layer {
            1 => Some((kbps * 12000 / sample_rate + padding) * 4),
            2 => Some(kbps * 144_000 / sample_rate + padding),
            3 => Some(kbps * 144_000 / (sample_rate << u8::from(self.lsf)) + padding),
            _ => None,
        }
    }
}

impl CodecData for AudioFrameInfo {
    fn stream_type(&self) -> StreamType {
        if self.is_ac3() {
            StreamType::Ac3
        } else {
            StreamType::MpegAudio
        }
    }

    fn bit_rate(&self) -> u32 {
        self.bit_rate
    }
}
