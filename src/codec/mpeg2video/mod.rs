//! # MPEG-2 Video Header Parsing
//!
//! Extracts the parameters the muxer and the timing engine need from an
//! MPEG-1/2 video elementary stream:
//!
//! - Sequence header: size, aspect ratio, frame rate, bit rate, VBV size
//!   and quantiser matrices
//! - Sequence extension: profile, chroma format and the high-order size,
//!   rate and buffer bits
//! - Picture coding extension: 3:2 / 2:3 pulldown and two-field detection
//! - Picture header: temporal reference
//! - GOP time code rewriting
//!
//! ## Example
//!
//! ```rust
//! use psremux::codec::mpeg2video::{get_video_info, VideoFormat, VideoSequenceInfo};
//! use psremux::utils::{ByteRing, RingBuffer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ring = ByteRing::new(64);
//! ring.write(&[0x00, 0x00, 0x01, 0xB3, 0x2D, 0x02, 0x40, 0x33, 0x24, 0x9F, 0x23, 0x80])?;
//!
//! let mut seq = VideoSequenceInfo::default();
//! get_video_info(&ring, &mut seq, 0, 4)?;
//! assert_eq!((seq.h_size, seq.v_size), (720, 576));
//! assert_eq!(seq.frame_rate, 25000);
//! assert_eq!(seq.video_format, Some(VideoFormat::Pal));
//! # Ok(())
//! # }
//! ```

pub mod parser;
pub mod types;

pub use parser::*;
pub use types::*;
