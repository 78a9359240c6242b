//! # Utility Functions and Types
//!
//! Shared building blocks used by the parsers and the muxer:
//!
//! - Bit-level reading of unaligned header fields
//! - The ring buffer that stages elementary stream payload
//!
//! ## Ring Buffer
//!
//! ```rust
//! use psremux::utils::{ByteRing, RingBuffer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ring = ByteRing::new(16);
//! ring.write(&[0x00, 0x00, 0x01, 0xB3])?;
//! assert_eq!(ring.find_header(0xB3, 0, 4)?, 0);
//!
//! let mut out = [0u8; 4];
//! ring.read(&mut out)?;
//! assert!(ring.is_empty());
//! # Ok(())
//! # }
//! ```

/// Bitstream reading utilities
pub mod bits;

/// Ring buffer collaborator
pub mod ring;

// Re-export commonly used types
pub use bits::*;
pub use ring::{ByteRing, RingBuffer, SliceSource};
