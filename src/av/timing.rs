//! Timestamp prediction and drift correction for video and audio.
//!
//! The predictors extrapolate PTS/DTS from a reference timestamp and a frame
//! count. The correction routines compare what the stream carries against
//! those predictions and nudge the running frame counters; a non-zero
//! correction is drift, logged and absorbed, never an error.

use super::timestamp::{diff_signed, normalize, PtsDisplay, CLOCK_HZ, MAX_PTS2};
use crate::codec::audio::AudioFrameInfo;
use crate::codec::mpeg2video::{ProgressiveMode, Pulldown, VideoSequenceInfo};
use crate::error::{RemuxError, Result};
use log::debug;

/// A predicted presentation/decode pair in 27 MHz ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTimestamps {
    pub pts: u64,
    pub dts: u64,
}

/// Predicts PTS and DTS of the `frame_count`-th coded picture.
///
/// `pts` is the reference timestamp of the first picture. The display index
/// used for the PTS is the picture's temporal reference, minus `group_count`,
/// plus `frame_count`, so B-frame reordering within a GOP is honoured.
///
/// # Arguments
///
/// * `pts` - Reference timestamp in ticks
/// * `seq` - Sequence parameters: frame rate, cadence and current temporal reference
/// * `frame_count` - Decode-order picture count
/// * `group_count` - Pictures counted before the current GOP started
pub fn predict_video(
    pts: u64,
    seq: &VideoSequenceInfo,
    frame_count: u64,
    group_count: u64,
) -> Result<VideoTimestamps> {
    let period = seq.frame_period()? as i64;
    let base = pts as i64;
    let f = frame_count as i64;
    let fnum = i64::from(seq.current_tmpref) - group_count as i64 + f;

    let (dts, pts) = match seq.pulldown {
        Pulldown::None if seq.progressive == ProgressiveMode::TwoField => (
            (f - 2) * period * 2 + base,
            (fnum - 1) * period * 2 + base,
        ),
        Pulldown::None => ((f - 1) * period + base, fnum * period + base),
        cadence => {
            let extra = if cadence == Pulldown::Pulldown32 {
                period
            } else {
                3 * period / 2
            };
            let step = |n: i64| n * 5 * period / 4 + n.rem_euclid(2) * extra;

            let mut dts = step(f - 1) + base;
            if cadence == Pulldown::Pulldown23 && f != 1 {
                dts -= period / 2;
            }
            (dts, period + step(fnum - 1) + base)
        }
    };

    Ok(VideoTimestamps {
        pts: normalize(pts),
        dts: normalize(dts),
    })
}

/// Folds observed-vs-predicted drift into a video frame counter.
///
/// Each delta is converted to whole frames (field times scaled by 4/5 under
/// pulldown) and half of the signed sum is added to `frame_count`. Returns
/// the correction applied.
pub fn correct_video_count(
    seq: &VideoSequenceInfo,
    frame_count: &mut u64,
    observed_pts: u64,
    predicted_pts: u64,
    observed_dts: u64,
    predicted_dts: u64,
) -> Result<i64> {
    let period = seq.frame_period()?;
    let pulldown = seq.pulldown != Pulldown::None;
    let frames = |delta: i64| -> i64 {
        let mut mag = delta.unsigned_abs();
        if pulldown {
            mag = 4 * mag / 5;
        }
        let n = ((mag + period / 2) / period) as i64;
        if delta > 0 {
            n
        } else {
            -n
        }
    };

    let pframes = frames(diff_signed(observed_pts, predicted_pts));
    let dframes = frames(diff_signed(observed_dts, predicted_dts));
    let correction = (pframes + dframes) / 2;

    if correction != 0 {
        debug!(
            "Video: frame count correction {} (pts {} expected {}, dts {} expected {})",
            correction,
            PtsDisplay(observed_pts as i64),
            PtsDisplay(predicted_pts as i64),
            PtsDisplay(observed_dts as i64),
            PtsDisplay(predicted_dts as i64)
        );
    }
    *frame_count = frame_count.saturating_add_signed(correction);
    Ok(correction)
}

/// Ticks spanned by `frames` audio frames of the given format.
fn audio_ticks(frame: &AudioFrameInfo, frames: u64) -> Result<u128> {
    if frame.frequency == 0 {
        return Err(RemuxError::InvalidData(
            "audio frequency is not set".into(),
        ));
    }
    Ok(frames as u128 * frame.samples_per_frame() as u128 * CLOCK_HZ as u128
        / frame.frequency as u128)
}

/// Advances `pts` by `frames` audio frames.
pub fn predict_audio_pts(pts: u64, frame: &AudioFrameInfo, frames: u64) -> Result<u64> {
    let ticks = audio_ticks(frame, frames)?;
    Ok(((pts as u128 + ticks) % MAX_PTS2 as u128) as u64)
}

/// Folds observed-vs-predicted drift into an audio frame counter.
///
/// The delta is converted to frames rounded to the nearest whole frame.
/// Returns the correction applied.
pub fn correct_audio_count(
    frame: &AudioFrameInfo,
    frame_count: &mut u64,
    observed_pts: u64,
    predicted_pts: u64,
) -> Result<i64> {
    if frame.frequency == 0 {
        return Err(RemuxError::InvalidData(
            "audio frequency is not set".into(),
        ));
    }
    let scaled = frame.frequency as i128 * diff_signed(observed_pts, predicted_pts) as i128;
    let per_frame = frame.samples_per_frame() as i128 * CLOCK_HZ as i128;
    let rounded = (scaled.abs() + per_frame / 2) / per_frame;
    let correction = (if scaled < 0 { -rounded } else { rounded }) as i64;

    if correction != 0 {
        debug!(
            "Audio: frame count correction {} (pts {} expected {})",
            correction,
            PtsDisplay(observed_pts as i64),
            PtsDisplay(predicted_pts as i64)
        );
    }
    *frame_count = frame_count.saturating_add_signed(correction);
    Ok(correction)
}
