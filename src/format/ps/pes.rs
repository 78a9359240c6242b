use super::types::*;
use crate::av::timestamp::MAX_PTS;
use crate::error::{RemuxError, Result};
use bytes::{BufMut, BytesMut};

/// Largest PES packet, prefix included.
const MAX_PES_LEN: usize = 0xFFFF + 6;

/// Timestamps carried by a PES header, in 27 MHz ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PesTimestamps {
    #[default]
    None,
    Pts(u64),
    PtsDts { pts: u64, dts: u64 },
}

impl PesTimestamps {
    pub fn flags(&self) -> TimestampFlags {
        match self {
            PesTimestamps::None => TimestampFlags::None,
            PesTimestamps::Pts(_) => TimestampFlags::PtsOnly,
            PesTimestamps::PtsDts { .. } => TimestampFlags::PtsDts,
        }
    }

    pub fn pts(&self) -> Option<u64> {
        match *self {
            PesTimestamps::None => None,
            PesTimestamps::Pts(pts) | PesTimestamps::PtsDts { pts, .. } => Some(pts),
        }
    }

    pub fn dts(&self) -> Option<u64> {
        match *self {
            PesTimestamps::PtsDts { dts, .. } => Some(dts),
            _ => None,
        }
    }
}

/// Packs a 27 MHz clock value into a 5-byte PES timestamp field.
///
/// `marker` is the prefix nibble in the high bits: `0x20` for a lone PTS,
/// `0x30` for the PTS of a pair and `0x10` for its DTS.
pub fn encode_timestamp(marker: u8, ticks: u64) -> [u8; 5] {
    let ts = (ticks / 300) % MAX_PTS;
    [
        marker | ((ts >> 29) & 0x0E) as u8 | 0x01,
        (ts >> 22) as u8,
        ((ts >> 14) & 0xFE) as u8 | 0x01,
        (ts >> 7) as u8,
        ((ts << 1) & 0xFE) as u8 | 0x01,
    ]
}

/// Unpacks a 5-byte PES timestamp field into 27 MHz ticks.
pub fn decode_timestamp(field: &[u8]) -> Result<u64> {
    if field.len() < PES_TIMESTAMP_LEN {
        return Err(RemuxError::Incomplete);
    }
    let ts = ((u64::from(field[0]) & 0x0E) << 29)
        | (u64::from(field[1]) << 22)
        | ((u64::from(field[2]) & 0xFE) << 14)
        | (u64::from(field[3]) << 7)
        | (u64::from(field[4]) >> 1);
    Ok(ts * 300)
}

/// PES header as written by the pack writers.
///
/// Padding and private stream 2 packets carry no flag bytes; their payload
/// follows the length field directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    pub stream_id: u8,
    /// Total packet length including the 6-byte prefix
    pub length: usize,
    pub timestamps: PesTimestamps,
    /// 0xFF bytes placed in front of the timestamps
    pub stuffing: usize,
}

impl PESHeader {
    /// Creates a header for a packet of `length` bytes in total.
    pub fn new(stream_id: u8, length: usize) -> Self {
        Self {
            stream_id,
            length,
            timestamps: PesTimestamps::None,
            stuffing: 0,
        }
    }

    /// A padding packet filling `length` bytes with 0xFF.
    pub fn padding(length: usize) -> Self {
        Self::new(PADDING_STREAM, length)
    }

    pub fn with_timestamps(mut self, timestamps: PesTimestamps) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_stuffing(mut self, stuffing: usize) -> Self {
        self.stuffing = stuffing;
        self
    }

    fn has_flags(&self) -> bool {
        !matches!(self.stream_id, PADDING_STREAM | PRIVATE_STREAM_2)
    }

    /// Bytes written by [`write_to`](Self::write_to) before the payload.
    pub fn header_len(&self) -> usize {
        if self.stream_id == PADDING_STREAM {
            self.length
        } else if self.has_flags() {
            PES_HEADER_MIN + self.stuffing + self.timestamps.flags().len()
        } else {
            6
        }
    }

    /// Writes the header and returns the bytes written.
    ///
    /// A padding header is written together with its 0xFF body.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<usize> {
        if self.length < 6 || self.length > MAX_PES_LEN || self.header_len() > self.length {
            return Err(RemuxError::InvalidData(format!(
                "PES length {} cannot hold a {} byte header",
                self.length,
                self.header_len()
            )));
        }

        buf.put_slice(&[0x00, 0x00, 0x01, self.stream_id]);
        buf.put_u16((self.length - 6) as u16);

        if self.stream_id == PADDING_STREAM {
            buf.put_bytes(0xFF, self.length - 6);
            return Ok(self.length);
        }
        if !self.has_flags() {
            return Ok(6);
        }

        let header_data = self.stuffing + self.timestamps.flags().len();
        if header_data > 0xFF {
            return Err(RemuxError::InvalidData(format!(
                "PES header data length {} exceeds 255",
                header_data
            )));
        }
        buf.put_u8(0x80);
        buf.put_u8(self.timestamps.flags().bits());
        buf.put_u8(header_data as u8);
        buf.put_bytes(0xFF, self.stuffing);

        match self.timestamps {
            PesTimestamps::None => {}
            PesTimestamps::Pts(pts) => buf.put_slice(&encode_timestamp(0x20, pts)),
            PesTimestamps::PtsDts { pts, dts } => {
                buf.put_slice(&encode_timestamp(0x30, pts));
                buf.put_slice(&encode_timestamp(0x10, dts));
            }
        }
        Ok(self.header_len())
    }
}

/// Writes a PES header for a packet of `length` total bytes and returns the
/// bytes written.
pub fn write_pes_header(
    buf: &mut BytesMut,
    stream_id: u8,
    length: usize,
    timestamps: PesTimestamps,
    stuffing: usize,
) -> Result<usize> {
    PESHeader::new(stream_id, length)
        .with_timestamps(timestamps)
        .with_stuffing(stuffing)
        .write_to(buf)
}
