//! # MPEG-2 Program Stream (PS)
//!
//! Synthesis and reassembly of program stream packs and PES packets:
//!
//! - Pack headers with SCR and mux rate, the DVD navigation system header
//! - PES headers with PTS/DTS and header stuffing
//! - Exact-size pack writers for video, MPEG audio and AC-3, plus padding
//!   and navigation packs
//! - A resumable PES parser that accepts input in slices of any size
//!
//! ## Example
//!
//! ```rust
//! use psremux::format::ps::{PackWriter, PSPacketParser, PesTimestamps};
//! use psremux::utils::{ByteRing, RingBuffer};
//! use bytes::BytesMut;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let writer = PackWriter::new(2048, 1_260_000)?;
//! let mut staged = ByteRing::new(8192);
//! staged.write(&[0u8; 500])?;
//!
//! let mut pack = BytesMut::new();
//! let drawn = writer.write_video_pack(&mut pack, 0, PesTimestamps::Pts(27_000_000), 500, &mut staged)?;
//! assert_eq!(drawn, 500);
//! assert_eq!(pack.len(), 2048);
//!
//! let header = PSPacketParser::new().parse_pack_header(&pack)?;
//! assert_eq!(header.mux_rate, 1_260_000);
//! # Ok(())
//! # }
//! ```

/// Resumable PES reassembly and the program stream demuxer
pub mod demuxer;

/// Pack writers and the program stream muxer
pub mod muxer;

/// Header parsing for verification and demuxing
pub mod parser;

/// PES header synthesis and timestamp fields
pub mod pes;

/// Start codes, stream ids and pack/system headers
pub mod types;

pub use demuxer::{DemuxedStream, PSDemuxer, PesPacketHandler, PesParser, PesSink};
pub use muxer::{Ac3PackInfo, PSMuxer, PackWriter};
pub use parser::{parse_mux_rate, parse_scr, PSPacketParser};
pub use pes::{decode_timestamp, encode_timestamp, write_pes_header, PESHeader, PesTimestamps};
pub use types::{
    classify_stream_id, encode_mux_rate, encode_scr, write_ps_header, PackHeader, StreamClass,
    SystemHeader, TimestampFlags, DVD_PACK_SIZE, PS_HEADER_LEN, PS_HEADER_WITH_SYSTEM_LEN,
};

#[cfg(test)]
mod tests;
