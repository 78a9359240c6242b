#![doc(html_root_url = "https://docs.rs/psremux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # psremux - MPEG Program Stream Remultiplexer
//!
//! `psremux` turns MPEG elementary streams (MPEG-1/2 video, MPEG audio and
//! AC-3) into an MPEG-2 Program Stream while keeping presentation and decode
//! timing intact over arbitrarily long inputs.
//!
//! ## Features
//!
//! ### Timing
//! - Wraparound-safe comparison, difference and addition on the 27 MHz clock
//! - Video PTS/DTS prediction, including 3:2 and 2:3 pulldown cadences
//! - Audio PTS prediction and frame-count drift correction
//!
//! ### Elementary Stream Parsing
//! - MPEG audio and AC-3 sync search and header decoding
//! - MPEG-2 video sequence header, extensions and picture headers
//!
//! ### Program Stream
//! - Bit-exact pack, system and PES headers
//! - Pack writers that always emit exactly the configured pack size
//! - A resumable PES parser fed with input slices of any size
//!
//! ## Quick Start
//!
//! ```rust
//! use psremux::av::Packet;
//! use psremux::config::MuxConfig;
//! use psremux::format::{ps::PSMuxer, Muxer};
//! use psremux::codec::VideoSequenceInfo;
//! use std::io::Cursor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut muxer = PSMuxer::with_config(Cursor::new(Vec::new()), MuxConfig::default())?;
//!     let video = muxer.add_stream(Box::new(VideoSequenceInfo::default()))?;
//!     muxer.write_header(&[]).await?;
//!
//!     let frame = Packet::new(vec![0u8; 4096])
//!         .with_stream_index(video)
//!         .with_pts(2 * 900_900)
//!         .with_dts(900_900);
//!     muxer.write_packet(&frame).await?;
//!     muxer.write_trailer().await?;
//!
//!     let packs = muxer.packs_written();
//!     let output = muxer.into_inner().into_inner();
//!     assert_eq!(output.len() as u64, packs * 2048 + 4);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: Packets, stream types, clock arithmetic and the timing engine
//! - `codec`: MPEG audio, AC-3 and MPEG-2 video header parsers
//! - `format`: Program stream synthesis and PES reassembly
//! - `config`: Muxer settings from defaults, environment and config file
//! - `error`: Error type and result alias
//! - `utils`: Bit reader and the ring buffer collaborator

/// Audio/Video base types, clock arithmetic and timing
pub mod av;

/// Elementary stream header parsers
pub mod codec;

/// Error types and utilities
pub mod error;

/// Program stream format implementation
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use error::{RemuxError, Result};
