/// MPEG audio and AC-3 header parsing
pub mod audio;
/// MPEG-2 video sequence and picture header parsing
pub mod mpeg2video;

// Re-export common types and functions
pub use audio::{AudioFrameInfo, AudioKind, HeaderCheck};
pub use mpeg2video::{ProgressiveMode, Pulldown, VideoSequenceInfo};
