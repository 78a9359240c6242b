use crate::av::timestamp::MAX_PTS;
use crate::error::{RemuxError, Result};
use bytes::{BufMut, BytesMut};

// Start codes
pub const PROGRAM_END_CODE: u8 = 0xB9;
pub const PACK_START_CODE: u8 = 0xBA;
pub const SYSTEM_HEADER_CODE: u8 = 0xBB;

// Stream IDs
pub const PROGRAM_STREAM_MAP: u8 = 0xBC;
pub const PRIVATE_STREAM_1: u8 = 0xBD;
pub const PADDING_STREAM: u8 = 0xBE;
pub const PRIVATE_STREAM_2: u8 = 0xBF;
pub const AUDIO_STREAM_FIRST: u8 = 0xC0;
pub const AUDIO_STREAM_LAST: u8 = 0xDF;
pub const VIDEO_STREAM_FIRST: u8 = 0xE0;
pub const VIDEO_STREAM_LAST: u8 = 0xEF;
pub const ECM_STREAM: u8 = 0xF0;
pub const EMM_STREAM: u8 = 0xF1;
pub const DSMCC_STREAM: u8 = 0xF2;
pub const ISO13522_STREAM: u8 = 0xF3;
pub const PROGRAM_STREAM_DIRECTORY: u8 = 0xFF;

/// First AC-3 sub-stream id inside private stream 1.
pub const AC3_SUBSTREAM_FIRST: u8 = 0x80;

// Sizes
pub const PS_HEADER_LEN: usize = 14;
pub const PS_HEADER_WITH_SYSTEM_LEN: usize = 38;
/// Fixed PES header part: start code, id, length, two flag bytes, header length
pub const PES_HEADER_MIN: usize = 9;
/// Smallest padding PES worth emitting
pub const PES_MIN: usize = 7;
pub const PES_TIMESTAMP_LEN: usize = 5;
/// AC-3 sub-stream descriptor in front of the payload
pub const AC3_DESCRIPTOR_LEN: usize = 4;
/// Upper bound used for PES packets that declare length 0
pub const MAX_UNBOUNDED_PES: usize = 64 * 0xFFFF;
pub const DVD_PACK_SIZE: usize = 2048;

/// Stream list carried by the navigation system header.
pub const NAV_SYSTEM_HEADER_STREAMS: [u8; 12] = [
    0xB9, 0xE0, 0xE8, 0xB8, 0xC0, 0x20, 0xBD, 0xE0, 0x3A, 0xBF, 0xE0, 0x02,
];

/// Which timestamps follow a PES header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampFlags {
    #[default]
    None,
    PtsOnly,
    PtsDts,
}

impl TimestampFlags {
    /// Bits of the second PES flag byte.
    pub fn bits(self) -> u8 {
        match self {
            TimestampFlags::None => 0x00,
            TimestampFlags::PtsOnly => 0x80,
            TimestampFlags::PtsDts => 0xC0,
        }
    }

    pub fn from_bits(flags: u8) -> Self {
        match flags & 0xC0 {
            0xC0 => TimestampFlags::PtsDts,
            0x80 => TimestampFlags::PtsOnly,
            _ => TimestampFlags::None,
        }
    }

    /// Bytes of timestamp data in the header.
    pub fn len(self) -> usize {
        match self {
            TimestampFlags::None => 0,
            TimestampFlags::PtsOnly => PES_TIMESTAMP_LEN,
            TimestampFlags::PtsDts => 2 * PES_TIMESTAMP_LEN,
        }
    }
}

/// How the demultiplexer treats a stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClass {
    /// Audio, video or private stream 1: header and payload are kept
    Payload,
    /// Parsed for its length and skipped
    HeaderOnly,
    /// Not a PES packet; scanning starts over
    NotPes,
}

pub fn classify_stream_id(id: u8) -> StreamClass {
    match id {
        AUDIO_STREAM_FIRST..=AUDIO_STREAM_LAST
        | VIDEO_STREAM_FIRST..=VIDEO_STREAM_LAST
        | PRIVATE_STREAM_1 => StreamClass::Payload,
        PROGRAM_STREAM_MAP | PADDING_STREAM | PRIVATE_STREAM_2 | ECM_STREAM | EMM_STREAM
        | DSMCC_STREAM | ISO13522_STREAM | PROGRAM_STREAM_DIRECTORY => StreamClass::HeaderOnly,
        _ => StreamClass::NotPes,
    }
}

/// Packs a 27 MHz clock value into the 6-byte pack SCR field.
pub fn encode_scr(scr: u64) -> [u8; 6] {
    let base = (scr / 300) % MAX_PTS;
    let ext = scr % 300;
    [
        0x44 | ((base >> 27) & 0x38) as u8 | ((base >> 28) & 0x03) as u8,
        (base >> 20) as u8,
        0x04 | ((base >> 12) & 0xF8) as u8 | ((base >> 13) & 0x03) as u8,
        (base >> 5) as u8,
        0x04 | ((base << 3) & 0xF8) as u8 | ((ext >> 7) & 0x03) as u8,
        0x01 | ((ext << 1) & 0xFE) as u8,
    ]
}

/// Packs a rate in bytes per second into the 22-bit mux rate field.
pub fn encode_mux_rate(rate: u32) -> [u8; 3] {
    let m = rate / 50;
    [
        (m >> 14) as u8,
        (m >> 6) as u8,
        0x03 | ((m & 0x3F) << 2) as u8,
    ]
}

fn check_mux_rate(rate: u32) -> Result<()> {
    if rate / 50 > 0x3F_FFFF {
        return Err(RemuxError::InvalidData(format!(
            "mux rate {} exceeds the 22-bit field",
            rate
        )));
    }
    Ok(())
}

/// MPEG-2 pack header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackHeader {
    /// System clock reference in 27 MHz ticks
    pub scr: u64,
    /// Bytes per second
    pub mux_rate: u32,
    /// 0 to 3 stuffing bytes
    pub stuffing: u8,
}

impl PackHeader {
    pub fn new(scr: u64, mux_rate: u32) -> Self {
        Self {
            scr,
            mux_rate,
            stuffing: 0,
        }
    }

    pub fn len(&self) -> usize {
        PS_HEADER_LEN + usize::from(self.stuffing & 0x03)
    }

    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        check_mux_rate(self.mux_rate)?;
        buf.put_slice(&[0x00, 0x00, 0x01, PACK_START_CODE]);
        buf.put_slice(&encode_scr(self.scr));
        buf.put_slice(&encode_mux_rate(self.mux_rate));
        let stuffing = self.stuffing & 0x03;
        buf.put_u8(0xF8 | stuffing);
        buf.put_bytes(0xFF, usize::from(stuffing));
        Ok(())
    }
}

/// System header as written in front of navigation packs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemHeader {
    /// Bytes per second
    pub rate_bound: u32,
    pub audio_bound: u8,
    pub fixed: bool,
    pub csps: bool,
    pub audio_lock: bool,
    pub video_lock: bool,
    pub video_bound: u8,
    pub streams: Vec<u8>,
}

impl SystemHeader {
    /// The DVD navigation layout: one video stream, locked clocks and the
    /// fixed stream list.
    pub fn navigation(rate_bound: u32, audio_bound: u8) -> Self {
        Self {
            rate_bound,
            audio_bound,
            fixed: false,
            csps: false,
            audio_lock: true,
            video_lock: true,
            video_bound: 1,
            streams: NAV_SYSTEM_HEADER_STREAMS.to_vec(),
        }
    }

    /// Bytes written, including start code and length field.
    pub fn len(&self) -> usize {
        12 + self.streams.len()
    }

    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        check_mux_rate(self.rate_bound)?;
        if self.audio_bound > 0x3F || self.video_bound > 0x1F {
            return Err(RemuxError::InvalidData(format!(
                "stream bounds {} audio / {} video out of range",
                self.audio_bound, self.video_bound
            )));
        }
        let m = self.rate_bound / 50;
        buf.put_slice(&[0x00, 0x00, 0x01, SYSTEM_HEADER_CODE]);
        buf.put_u16((self.len() - 6) as u16);
        buf.put_slice(&[
            0x80 | (m >> 15) as u8,
            (m >> 7) as u8,
            0x01 | ((m & 0x7F) << 1) as u8,
        ]);
        buf.put_u8((self.audio_bound << 2) | (u8::from(self.fixed) << 1) | u8::from(self.csps));
        buf.put_u8(
            (u8::from(self.audio_lock) << 7)
                | (u8::from(self.video_lock) << 6)
                | 0x20
                | self.video_bound,
        );
        buf.put_u8(0x7F);
        buf.put_slice(&self.streams);
        Ok(())
    }
}

/// Writes a pack header, optionally followed by the navigation system
/// header, and returns the bytes written.
pub fn write_ps_header(
    buf: &mut BytesMut,
    scr: u64,
    mux_rate: u32,
    system_header: Option<&SystemHeader>,
) -> Result<usize> {
    let start = buf.len();
    PackHeader::new(scr, mux_rate).write_to(buf)?;
    if let Some(header) = system_header {
        header.write_to(buf)?;
    }
    Ok(buf.len() - start)
}
