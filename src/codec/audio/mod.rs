//! # MPEG Audio and AC-3 Header Parsing
//!
//! Locates sync words in buffered elementary stream data and decodes the
//! frame headers that follow them:
//!
//! - MPEG-1/2 audio layers 1 to 3, including the LSF and MPEG-2.5 variants
//! - AC-3 sync frames
//! - Re-validation of a locked stream frame by frame
//!
//! ## Example
//!
//! ```rust
//! use psremux::codec::audio::{get_audio_info, AudioFrameInfo};
//! use psremux::utils::{ByteRing, RingBuffer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ring = ByteRing::new(64);
//! ring.write(&[0x00, 0xFF, 0xFD, 0x80, 0x04])?;
//!
//! let mut info = AudioFrameInfo::default();
//! let offset = get_audio_info(&ring, &mut info, 0, 5)?;
//! assert_eq!(offset, 1);
//! assert_eq!(info.layer, 2);
//! assert_eq!(info.bit_rate, 128_000);
//! # Ok(())
//! # }
//! ```

pub mod parser;
pub mod types;

pub use parser::*;
pub use types::*;
