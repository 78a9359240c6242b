//! Stream-level types shared by the parsers and the muxer, plus the clock
//! arithmetic and timing engine.

/// Wraparound-aware clock arithmetic
pub mod timestamp;

/// Timestamp prediction and drift correction
pub mod timing;

mod packet;
pub use packet::*;

/// Kind of elementary stream carried in a program stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Video,
    MpegAudio,
    Ac3,
}

impl StreamType {
    pub fn is_audio(self) -> bool {
        !matches!(self, StreamType::Video)
    }
}

/// Parameters of an elementary stream as decoded from its headers.
pub trait CodecData: Send + Sync {
    fn stream_type(&self) -> StreamType;
    /// Nominal bit rate in bits per second, 0 when unknown.
    fn bit_rate(&self) -> u32;
}
