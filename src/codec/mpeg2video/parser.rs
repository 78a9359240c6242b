use super::types::*;
use crate::av::timestamp::{MAX_PTS, PTS_HZ};
use crate::error::{RemuxError, Result};
use crate::utils::{BitReader, RingBuffer};
use log::{debug, warn};

/// Sequence header body with both quantiser matrices.
const SEQUENCE_HEADER_MAX: usize = 136;
/// Longest extension body read here: the sequence extension.
const EXTENSION_MAX: usize = 6;
const PICTURE_HEADER_MIN: usize = 2;

fn aspect_ratio_for(code: u32) -> u32 {
    match code {
        1 => 100,
        2 => 133,
        3 => 177,
        4 => 221,
        _ => 0,
    }
}

fn aspect_label(ratio: u32) -> &'static str {
    match ratio {
        100 => "1:1",
        133 => "4:3",
        177 => "16:9",
        221 => "2.21:1",
        _ => "reserved",
    }
}

fn frame_rate_for(code: u32) -> Option<(u32, Option<VideoFormat>)> {
    match code {
        1 => Some((23976, None)),
        2 => Some((24000, None)),
        3 => Some((25000, Some(VideoFormat::Pal))),
        4 => Some((29970, Some(VideoFormat::Ntsc))),
        5 => Some((30000, Some(VideoFormat::Ntsc))),
        6 => Some((50000, Some(VideoFormat::Pal))),
        7 => Some((59940, Some(VideoFormat::Ntsc))),
        8 => Some((60000, Some(VideoFormat::Ntsc))),
        _ => None,
    }
}

/// Decodes a sequence header body, the bytes following `00 00 01 B3`.
///
/// Returns the body length consumed: 8, 72 or 136 depending on which
/// quantiser matrices are present. `seq` is left untouched on error.
pub fn parse_sequence_header(body: &[u8], seq: &mut VideoSequenceInfo) -> Result<usize> {
    let mut reader = BitReader::new(body);

    let h_size = reader.read_bits(12)?;
    let v_size = reader.read_bits(12)?;
    let aspect_code = reader.read_bits(4)?;
    let rate_code = reader.read_bits(4)?;
    let bit_rate = reader.read_bits(18)?;
    reader.skip_bits(1)?;
    let vbv_buffer_size = reader.read_bits(10)?;

    let mut flags = 0;
    if reader.read_flag()? {
        flags |= FLAG_CONSTRAINED;
    }
    let mut intra_quant = seq.intra_quant;
    if reader.read_flag()? {
        flags |= FLAG_INTRA_QUANT;
        reader.read_bytes(&mut intra_quant)?;
    }
    let mut non_intra_quant = seq.non_intra_quant;
    if reader.read_flag()? {
        flags |= FLAG_NON_INTRA_QUANT;
        reader.read_bytes(&mut non_intra_quant)?;
    }

    if aspect_code == 0 {
        return Err(RemuxError::InvalidHeader("forbidden aspect ratio code 0".into()));
    }

    seq.h_size = h_size;
    seq.v_size = v_size;
    seq.aspect_ratio = aspect_ratio_for(aspect_code);
    match frame_rate_for(rate_code) {
        Some((rate, format)) => {
            seq.frame_rate = rate;
            seq.video_format = format;
        }
        None => {
            warn!("Video: reserved frame rate code {}", rate_code);
            seq.video_format = None;
        }
    }
    seq.bit_rate = bit_rate;
    seq.vbv_buffer_size = vbv_buffer_size;
    seq.flags = flags;
    seq.intra_quant = intra_quant;
    seq.non_intra_quant = non_intra_quant;
    seq.set = true;

    debug!(
        "Video: aspect ratio {} size {}x{} frame rate {}.{:03} fps bit rate {} bit/s vbv {} kbit",
        aspect_label(seq.aspect_ratio),
        seq.h_size,
        seq.v_size,
        seq.frame_rate / 1000,
        seq.frame_rate % 1000,
        seq.bit_rate_bps(),
        seq.vbv_buffer_size * 16
    );
    Ok(reader.bytes_consumed())
}

fn merge_sequence_extension(body: &[u8], seq: &mut VideoSequenceInfo) -> Result<()> {
    let mut reader = BitReader::new(body);
    reader.skip_bits(4)?;
    let profile = reader.read_u8()?;
    let progressive = reader.read_flag()?;
    let chroma = reader.read_bits(2)? as u8;
    let h_ext = reader.read_bits(2)?;
    let v_ext = reader.read_bits(2)?;
    let bit_rate_ext = reader.read_bits(12)?;
    reader.skip_bits(1)?;
    let vbv_ext = reader.read_bits(8)?;
    let _low_delay = reader.read_flag()?;
    let rate_n = reader.read_bits(2)?;
    let rate_d = reader.read_bits(5)?;

    seq.profile = profile;
    seq.progressive = if progressive {
        ProgressiveMode::Progressive
    } else {
        ProgressiveMode::Interlaced
    };
    seq.chroma = ChromaFormat::from(chroma);
    seq.h_size |= h_ext << 12;
    seq.v_size |= v_ext << 12;
    seq.bit_rate |= bit_rate_ext << 18;
    seq.vbv_buffer_size |= vbv_ext << 10;
    seq.frame_rate = seq.frame_rate * (rate_n + 1) / (rate_d + 1);
    seq.ext_set = true;

    debug!(
        "Video: sequence extension profile {:#04x} {:?} {:?} frame rate {}.{:03} fps",
        seq.profile,
        seq.progressive,
        seq.chroma,
        seq.frame_rate / 1000,
        seq.frame_rate % 1000
    );
    Ok(())
}

fn apply_picture_coding_extension(body: &[u8], seq: &mut VideoSequenceInfo) -> Result<()> {
    let mut reader = BitReader::new(body);
    reader.skip_bits(4 + 16 + 2)?;
    let structure = reader.read_bits(2)?;
    let top_field_first = reader.read_flag()?;
    reader.skip_bits(5)?;
    let repeat_first_field = reader.read_flag()?;
    reader.skip_bits(1)?;
    let progressive_frame = reader.read_flag()?;

    // Only frame pictures carry cadence information.
    if structure != 3 || !repeat_first_field {
        return Ok(());
    }

    if !seq.is_progressive() {
        seq.pulldown = if seq.current_tmpref != 0 {
            Pulldown::Pulldown23
        } else {
            Pulldown::Pulldown32
        };
        seq.pulldown_set = true;
        debug!("Video: {:?} detected", seq.pulldown);
    } else if progressive_frame && top_field_first {
        seq.progressive = ProgressiveMode::TwoField;
    }
    Ok(())
}

/// Decodes an extension body, the bytes following `00 00 01 B5`.
///
/// The sequence extension is merged once per sequence and only after the
/// sequence header; the picture coding extension is consulted until the
/// cadence is decided. Other extensions are identified and skipped.
pub fn parse_extension(body: &[u8], seq: &mut VideoSequenceInfo) -> Result<ExtensionId> {
    let Some(&first) = body.first() else {
        return Err(RemuxError::Incomplete);
    };
    let id = ExtensionId::from(first >> 4);

    match id {
        ExtensionId::Sequence if seq.set && !seq.ext_set => {
            merge_sequence_extension(body, seq)?;
        }
        ExtensionId::PictureCoding if seq.set && !seq.pulldown_set => {
            apply_picture_coding_extension(body, seq)?;
        }
        _ => {}
    }
    Ok(id)
}

/// Decodes a picture header body, the bytes following `00 00 01 00`, and
/// records its temporal reference.
pub fn parse_picture_header(body: &[u8], seq: &mut VideoSequenceInfo) -> Result<PictureCodingType> {
    let mut reader = BitReader::new(body);
    let temporal_reference = reader.read_bits(10)? as u16;
    let coding_type = PictureCodingType::from(reader.read_bits(3)? as u8);
    seq.current_tmpref = temporal_reference;
    Ok(coding_type)
}

/// Peeks up to `buf.len()` body bytes following the start code at `start`.
fn peek_body<R: RingBuffer + ?Sized>(
    ring: &R,
    start: usize,
    buf: &mut [u8],
) -> Result<usize> {
    let body_start = start + 4;
    let have = ring.available().saturating_sub(body_start).min(buf.len());
    ring.peek(&mut buf[..have], body_start)?;
    Ok(have)
}

/// Finds and decodes the next sequence header, resetting the sequence state
/// first. Returns the offset of its start code.
pub fn get_video_info<R: RingBuffer + ?Sized>(
    ring: &R,
    seq: &mut VideoSequenceInfo,
    offset: usize,
    limit: usize,
) -> Result<usize> {
    seq.set = false;
    seq.ext_set = false;
    seq.pulldown_set = false;

    let start = ring.find_header(SEQUENCE_HEADER_CODE, offset, limit)?;
    let mut body = [0u8; SEQUENCE_HEADER_MAX];
    let have = peek_body(ring, start, &mut body)?;
    parse_sequence_header(&body[..have], seq)?;
    Ok(start)
}

/// Finds and decodes the next extension header.
pub fn get_video_ext_info<R: RingBuffer + ?Sized>(
    ring: &R,
    seq: &mut VideoSequenceInfo,
    offset: usize,
    limit: usize,
) -> Result<ExtensionId> {
    let start = ring.find_header(EXTENSION_START_CODE, offset, limit)?;
    let mut body = [0u8; EXTENSION_MAX];
    let have = peek_body(ring, start, &mut body)?;
    parse_extension(&body[..have], seq)
}

/// Finds and decodes the next picture header.
pub fn get_picture_info<R: RingBuffer + ?Sized>(
    ring: &R,
    seq: &mut VideoSequenceInfo,
    offset: usize,
    limit: usize,
) -> Result<PictureCodingType> {
    let start = ring.find_header(PICTURE_START_CODE, offset, limit)?;
    let mut body = [0u8; PICTURE_HEADER_MIN];
    let have = peek_body(ring, start, &mut body)?;
    parse_picture_header(&body[..have], seq)
}

/// Rewrites the time code of the first GOP header in `buf` from `pts`.
///
/// Only GOP headers with their marker bit set are touched; the drop-frame
/// flag and picture count are preserved. Returns true if a header was
/// rewritten.
pub fn insert_gop_timecode(buf: &mut [u8], pts: u64) -> bool {
    let seconds = (pts / 300) % MAX_PTS / PTS_HZ;
    let hours = (seconds / 3600) as u8;
    let minutes = (seconds / 60 % 60) as u8;
    let seconds = (seconds % 60) as u8;

    let Some(c) = buf.windows(8).position(|w| {
        w[..4] == [0x00, 0x00, 0x01, GROUP_START_CODE] && w[5] & 0x08 != 0
    }) else {
        return false;
    };

    buf[c + 4] = (buf[c + 4] & 0x80) | ((hours & 0x1F) << 2) | ((minutes & 0x30) >> 4);
    buf[c + 5] = (buf[c + 5] & 0x08) | ((minutes & 0x0F) << 4) | ((seconds & 0x38) >> 3);
    buf[c + 6] = (buf[c + 6] & 0x1F) | ((seconds & 0x07) << 5);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::timestamp::CLOCK_HZ;
    use crate::utils::ByteRing;
    use pretty_assertions::assert_eq;

    // 720x576, 16:9, 25 fps, 15 Mbit/s, vbv 112, no matrices
    const PAL_HEADER: [u8; 12] = [
        0x00, 0x00, 0x01, 0xB3, 0x2D, 0x02, 0x40, 0x33, 0x24, 0x9F, 0x23, 0x80,
    ];

    // main profile @ main level, interlaced, 4:2:0, no extension bits
    const SEQUENCE_EXTENSION: [u8; 10] = [
        0x00, 0x00, 0x01, 0xB5, 0x14, 0x82, 0x00, 0x01, 0x00, 0x00,
    ];

    fn picture_coding_extension(repeat_first: bool, top_field: bool, progressive: bool) -> [u8; 9] {
        let mut b3 = 0x00;
        if top_field {
            b3 |= 0x80;
        }
        if repeat_first {
            b3 |= 0x02;
        }
        let b4 = if progressive { 0x80 } else { 0x00 };
        [0x00, 0x00, 0x01, 0xB5, 0x8F, 0xFF, 0xF3, b3, b4]
    }

    fn ring_with(data: &[u8]) -> ByteRing {
        let mut ring = ByteRing::new(512);
        ring.write(data).unwrap();
        ring
    }

    fn pal_sequence() -> VideoSequenceInfo {
        let mut seq = VideoSequenceInfo::default();
        parse_sequence_header(&PAL_HEADER[4..], &mut seq).unwrap();
        seq
    }

    #[test]
    fn test_sequence_header() {
        let ring = ring_with(&[&[0xAB, 0xCD][..], &PAL_HEADER[..]].concat());
        let mut seq = VideoSequenceInfo::default();
        assert_eq!(get_video_info(&ring, &mut seq, 0, 8).unwrap(), 2);
        assert!(seq.set);
        assert_eq!(seq.h_size, 720);
        assert_eq!(seq.v_size, 576);
        assert_eq!(seq.aspect_ratio, 177);
        assert_eq!(seq.frame_rate, 25000);
        assert_eq!(seq.video_format, Some(VideoFormat::Pal));
        assert_eq!(seq.bit_rate, 37500);
        assert_eq!(seq.bit_rate_bps(), 15_000_000);
        assert_eq!(seq.vbv_buffer_size, 112);
        assert_eq!(seq.flags, 0);
        assert_eq!(seq.frame_period().unwrap(), CLOCK_HZ / 25);
    }

    #[test]
    fn test_ntsc_frame_rate() {
        let mut header = PAL_HEADER;
        header[7] = 0x34;
        let mut seq = VideoSequenceInfo::default();
        assert_eq!(parse_sequence_header(&header[4..], &mut seq).unwrap(), 8);
        assert_eq!(seq.frame_rate, 29970);
        assert_eq!(seq.video_format, Some(VideoFormat::Ntsc));
    }

    #[test]
    fn test_reserved_codes() {
        let mut header = PAL_HEADER;
        // aspect 7, frame rate 0
        header[7] = 0x70;
        let mut seq = VideoSequenceInfo::default();
        parse_sequence_header(&header[4..], &mut seq).unwrap();
        assert_eq!(seq.aspect_ratio, 0);
        assert_eq!(seq.frame_rate, 0);
        assert_eq!(seq.video_format, None);
        assert!(seq.frame_period().is_err());

        header[7] = 0x03;
        assert!(matches!(
            parse_sequence_header(&header[4..], &mut VideoSequenceInfo::default()),
            Err(RemuxError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_quantiser_matrices() {
        let matrix: Vec<u8> = (8..72).collect();

        // 62 header bits, load_intra set, 512 matrix bits, load_non_intra clear
        let mut bits: Vec<bool> = Vec::new();
        for byte in &PAL_HEADER[4..11] {
            for i in (0..8).rev() {
                bits.push(byte >> i & 1 == 1);
            }
        }
        for i in (2..8).rev() {
            bits.push(PAL_HEADER[11] >> i & 1 == 1);
        }
        bits.push(true);
        for m in &matrix {
            for i in (0..8).rev() {
                bits.push(m >> i & 1 == 1);
            }
        }
        bits.push(false);
        let packed: Vec<u8> = bits
            .chunks(8)
            .map(|c| c.iter().fold(0u8, |acc, &b| (acc << 1) | u8::from(b)))
            .collect();
        assert_eq!(packed.len(), 72);

        let mut seq = VideoSequenceInfo::default();
        assert_eq!(parse_sequence_header(&packed, &mut seq).unwrap(), 72);
        assert_eq!(seq.flags, FLAG_INTRA_QUANT);
        assert_eq!(seq.intra_quant.to_vec(), matrix);
        assert_eq!(seq.h_size, 720);
        assert_eq!(seq.vbv_buffer_size, 112);

        // Truncated matrix data is incomplete, not malformed.
        let mut seq = VideoSequenceInfo::default();
        assert!(parse_sequence_header(&packed[..40], &mut seq)
            .unwrap_err()
            .is_incomplete());
        assert!(!seq.set);
    }

    #[test]
    fn test_sequence_extension() {
        let mut seq = pal_sequence();
        let ring = ring_with(&SEQUENCE_EXTENSION);
        let id = get_video_ext_info(&ring, &mut seq, 0, 4).unwrap();
        assert_eq!(id, ExtensionId::Sequence);
        assert!(seq.ext_set);
        assert_eq!(seq.profile, 0x48);
        assert_eq!(seq.progressive, ProgressiveMode::Interlaced);
        assert_eq!(seq.chroma, ChromaFormat::Yuv420);
        assert_eq!(seq.frame_rate, 25000);
        assert_eq!(seq.h_size, 720);
    }

    #[test]
    fn test_sequence_extension_merges_high_bits() {
        let mut seq = pal_sequence();
        // progressive, 4:2:2, h_ext 1, v_ext 2, bit_rate_ext 3, vbv_ext 1,
        // frame_rate_extension n=1 d=0
        let body = [0x14, 0x8C, 0xC0, 0x07, 0x01, 0x20];
        parse_extension(&body, &mut seq).unwrap();
        assert_eq!(seq.progressive, ProgressiveMode::Progressive);
        assert_eq!(seq.chroma, ChromaFormat::Yuv422);
        assert_eq!(seq.h_size, 720 | 1 << 12);
        assert_eq!(seq.v_size, 576 | 2 << 12);
        assert_eq!(seq.bit_rate, 37500 | 3 << 18);
        assert_eq!(seq.vbv_buffer_size, 112 | 1 << 10);
        assert_eq!(seq.frame_rate, 50000);

        // Merged once per sequence.
        parse_extension(&body, &mut seq).unwrap();
        assert_eq!(seq.frame_rate, 50000);
    }

    #[test]
    fn test_extension_requires_sequence_header() {
        let mut seq = VideoSequenceInfo::default();
        let id = parse_extension(&SEQUENCE_EXTENSION[4..], &mut seq).unwrap();
        assert_eq!(id, ExtensionId::Sequence);
        assert!(!seq.ext_set);
        assert_eq!(
            parse_extension(&[0x20], &mut seq).unwrap(),
            ExtensionId::SequenceDisplay
        );
        assert!(parse_extension(&[], &mut seq).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_pulldown_detection() {
        let mut seq = pal_sequence();
        parse_extension(&picture_coding_extension(true, true, false)[4..], &mut seq).unwrap();
        assert_eq!(seq.pulldown, Pulldown::Pulldown32);
        assert!(seq.pulldown_set);

        let mut seq = pal_sequence();
        seq.current_tmpref = 2;
        parse_extension(&picture_coding_extension(true, false, false)[4..], &mut seq).unwrap();
        assert_eq!(seq.pulldown, Pulldown::Pulldown23);

        // Locked once decided.
        seq.current_tmpref = 0;
        parse_extension(&picture_coding_extension(true, false, false)[4..], &mut seq).unwrap();
        assert_eq!(seq.pulldown, Pulldown::Pulldown23);

        let mut seq = pal_sequence();
        parse_extension(&picture_coding_extension(false, true, false)[4..], &mut seq).unwrap();
        assert_eq!(seq.pulldown, Pulldown::None);
        assert!(!seq.pulldown_set);
    }

    #[test]
    fn test_two_field_detection() {
        let mut seq = pal_sequence();
        seq.progressive = ProgressiveMode::Progressive;
        parse_extension(&picture_coding_extension(true, true, true)[4..], &mut seq).unwrap();
        assert_eq!(seq.progressive, ProgressiveMode::TwoField);
        assert_eq!(seq.pulldown, Pulldown::None);

        // Field pictures are ignored.
        let mut seq = pal_sequence();
        let mut ext = picture_coding_extension(true, true, false);
        ext[6] = 0xF1;
        parse_extension(&ext[4..], &mut seq).unwrap();
        assert!(!seq.pulldown_set);
    }

    #[test]
    fn test_picture_header() {
        // temporal reference 5, B picture
        let ring = ring_with(&[0x00, 0x00, 0x01, 0x00, 0x01, 0x5F, 0xFF, 0xF8]);
        let mut seq = VideoSequenceInfo::default();
        let kind = get_picture_info(&ring, &mut seq, 0, 4).unwrap();
        assert_eq!(kind, PictureCodingType::B);
        assert_eq!(seq.current_tmpref, 5);
    }

    #[test]
    fn test_insert_gop_timecode() {
        let mut buf = vec![0xAA, 0x00, 0x00, 0x01, 0xB8, 0x80, 0x08, 0x05, 0x40, 0x00];
        let pts = (3600 + 23 * 60 + 45) * CLOCK_HZ;
        assert!(insert_gop_timecode(&mut buf, pts));
        let gop = &buf[1..];
        let hours = (gop[4] >> 2) & 0x1F;
        let minutes = ((gop[4] << 4) & 0x30) | (gop[5] >> 4);
        let seconds = ((gop[5] << 3) & 0x38) | (gop[6] >> 5);
        assert_eq!((hours, minutes, seconds), (1, 23, 45));
        // drop flag, marker and picture count preserved
        assert_eq!(gop[4] & 0x80, 0x80);
        assert_eq!(gop[5] & 0x08, 0x08);
        assert_eq!(gop[6] & 0x1F, 0x05);

        let mut no_marker = vec![0x00, 0x00, 0x01, 0xB8, 0x00, 0x00, 0x00, 0x00];
        assert!(!insert_gop_timecode(&mut no_marker, pts));
    }
}
