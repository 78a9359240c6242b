use super::pes::{decode_timestamp, PESHeader, PesTimestamps};
use super::types::*;
use crate::error::{RemuxError, Result};

/// Recovers 27 MHz ticks from a 6-byte pack SCR field.
pub fn parse_scr(field: &[u8]) -> Result<u64> {
    if field.len() < 6 {
        return Err(RemuxError::Incomplete);
    }
    if field[0] & 0xC4 != 0x44 || field[2] & 0x04 == 0 || field[4] & 0x04 == 0 || field[5] & 0x01 == 0
    {
        return Err(RemuxError::InvalidHeader("SCR marker bits missing".into()));
    }
    let f: [u64; 6] = std::array::from_fn(|i| u64::from(field[i]));
    let base = ((f[0] & 0x38) << 27)
        | ((f[0] & 0x03) << 28)
        | (f[1] << 20)
        | ((f[2] & 0xF8) << 12)
        | ((f[2] & 0x03) << 13)
        | (f[3] << 5)
        | (f[4] >> 3);
    let ext = ((f[4] & 0x03) << 7) | (f[5] >> 1);
    Ok(base * 300 + ext)
}

/// Recovers the rate in bytes per second from the 3-byte mux rate field.
pub fn parse_mux_rate(field: &[u8]) -> Result<u32> {
    if field.len() < 3 {
        return Err(RemuxError::Incomplete);
    }
    let m = (u32::from(field[0]) << 14) | (u32::from(field[1]) << 6) | (u32::from(field[2]) >> 2);
    Ok(m * 50)
}

/// Reads back the headers the muxer writes.
#[derive(Debug, Default)]
pub struct PSPacketParser;

impl PSPacketParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses a pack header, stuffing included.
    pub fn parse_pack_header(&self, data: &[u8]) -> Result<PackHeader> {
        if data.len() < PS_HEADER_LEN {
            return Err(RemuxError::Incomplete);
        }
        if data[..4] != [0x00, 0x00, 0x01, PACK_START_CODE] {
            return Err(RemuxError::InvalidHeader("missing pack start code".into()));
        }
        let header = PackHeader {
            scr: parse_scr(&data[4..10])?,
            mux_rate: parse_mux_rate(&data[10..13])?,
            stuffing: data[13] & 0x03,
        };
        if data.len() < header.len() {
            return Err(RemuxError::Incomplete);
        }
        Ok(header)
    }

    /// Parses a system header.
    pub fn parse_system_header(&self, data: &[u8]) -> Result<SystemHeader> {
        if data.len() < 12 {
            return Err(RemuxError::Incomplete);
        }
        if data[..4] != [0x00, 0x00, 0x01, SYSTEM_HEADER_CODE] {
            return Err(RemuxError::InvalidHeader("missing system header start code".into()));
        }
        let length = usize::from(u16::from_be_bytes([data[4], data[5]]));
        if length < 6 {
            return Err(RemuxError::InvalidHeader(format!(
                "system header length {} too short",
                length
            )));
        }
        if data.len() < 6 + length {
            return Err(RemuxError::Incomplete);
        }
        let m = (u32::from(data[6] & 0x7F) << 15)
            | (u32::from(data[7]) << 7)
            | (u32::from(data[8]) >> 1);
        Ok(SystemHeader {
            rate_bound: m * 50,
            audio_bound: data[9] >> 2,
            fixed: data[9] & 0x02 != 0,
            csps: data[9] & 0x01 != 0,
            audio_lock: data[10] & 0x80 != 0,
            video_lock: data[10] & 0x40 != 0,
            video_bound: data[10] & 0x1F,
            streams: data[12..6 + length].to_vec(),
        })
    }

    /// Parses a PES header written by [`PESHeader::write_to`]. Returns the
    /// header and the offset of its payload.
    pub fn parse_pes_header(&self, data: &[u8]) -> Result<(PESHeader, usize)> {
        if data.len() < 6 {
            return Err(RemuxError::Incomplete);
        }
        if data[..3] != [0x00, 0x00, 0x01] {
            return Err(RemuxError::InvalidHeader("missing PES start code".into()));
        }
        let stream_id = data[3];
        let length = usize::from(u16::from_be_bytes([data[4], data[5]])) + 6;
        let header = PESHeader::new(stream_id, length);

        if matches!(stream_id, PADDING_STREAM | PRIVATE_STREAM_2) {
            return Ok((header, 6));
        }
        if data.len() < PES_HEADER_MIN {
            return Err(RemuxError::Incomplete);
        }
        if data[6] & 0xC0 != 0x80 {
            return Err(RemuxError::InvalidHeader("not an MPEG-2 PES header".into()));
        }

        let flags = TimestampFlags::from_bits(data[7]);
        let header_data = usize::from(data[8]);
        let payload = PES_HEADER_MIN + header_data;
        if header_data < flags.len() {
            return Err(RemuxError::InvalidHeader(format!(
                "header data length {} too short for timestamps",
                header_data
            )));
        }
        if data.len() < payload {
            return Err(RemuxError::Incomplete);
        }

        let stuffing = header_data - flags.len();
        let ts = &data[PES_HEADER_MIN + stuffing..payload];
        let timestamps = match flags {
            TimestampFlags::None => PesTimestamps::None,
            TimestampFlags::PtsOnly => PesTimestamps::Pts(decode_timestamp(ts)?),
            TimestampFlags::PtsDts => PesTimestamps::PtsDts {
                pts: decode_timestamp(&ts[..PES_TIMESTAMP_LEN])?,
                dts: decode_timestamp(&ts[PES_TIMESTAMP_LEN..])?,
            },
        };
        Ok((
            header.with_timestamps(timestamps).with_stuffing(stuffing),
            payload,
        ))
    }
}
