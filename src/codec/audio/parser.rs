use super::types::*;
use crate::error::{RemuxError, Result};
use crate::utils::RingBuffer;
use log::{debug, warn};

/// Two-state sync detector.
///
/// A byte equal to the first sync byte arms the scanner; the next byte either
/// completes the pattern or, unless it re-arms it, drops back to idle. A false
/// first byte therefore never swallows a real sync right behind it.
#[derive(Debug, Clone, Copy)]
pub struct SyncScanner {
    kind: AudioKind,
    candidate: bool,
}

impl SyncScanner {
    pub fn new(kind: AudioKind) -> Self {
        Self {
            kind,
            candidate: false,
        }
    }

    /// Feeds one byte. Returns true when it completes a sync word whose
    /// first byte was the previous one.
    pub fn push(&mut self, byte: u8) -> bool {
        let (first, second, mask) = self.kind.sync_pattern();
        if self.candidate && byte & mask == second {
            self.candidate = false;
            return true;
        }
        self.candidate = byte == first;
        false
    }

    /// True while the last byte seen could start a sync word.
    pub fn in_candidate(&self) -> bool {
        self.candidate
    }
}

/// Sync word located by [`find_audio_sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSync {
    /// Offset of the first sync byte relative to the search start
    pub offset: usize,
    /// Header bytes from the sync word on; only `kind.header_len()` are valid
    pub header: [u8; AC3_HEADER_LEN],
}

/// Scans `limit` bytes from `offset` for an audio sync word.
///
/// Returns [`RemuxError::Incomplete`] when the window ends on a possible first
/// sync byte or the header behind a sync word is not buffered yet.
pub fn find_audio_sync<R: RingBuffer + ?Sized>(
    ring: &R,
    kind: AudioKind,
    offset: usize,
    limit: usize,
) -> Result<AudioSync> {
    let mut scanner = SyncScanner::new(kind);
    let end = offset.saturating_add(limit).min(ring.available());
    let mut byte = [0u8; 1];

    for pos in offset..end {
        ring.peek(&mut byte, pos)?;
        if scanner.push(byte[0]) {
            let start = pos - 1;
            let len = kind.header_len();
            if start + len > ring.available() {
                return Err(RemuxError::Incomplete);
            }
            let mut header = [0u8; AC3_HEADER_LEN];
            ring.peek(&mut header[..len], start)?;
            return Ok(AudioSync {
                offset: start - offset,
                header,
            });
        }
    }

    if scanner.in_candidate() {
        Err(RemuxError::Incomplete)
    } else {
        Err(RemuxError::SyncNotFound)
    }
}

fn mpeg_layer(h1: u8) -> u8 {
    4 - ((h1 & 0x06) >> 1)
}

fn mpeg_bit_rate(lsf: bool, layer: u8, index: u8) -> Option<u32> {
    let row = MPEG_AUDIO_BITRATES[usize::from(lsf)].get(usize::from(layer).checked_sub(1)?)?;
    row.get(usize::from(index)).map(|&kbps| u32::from(kbps) * 1000)
}

fn ac3_frequency(h4: u8, h5: u8) -> Option<u32> {
    let half = *AC3_HALF_RATE.get(usize::from(h5 >> 3))?;
    let base = AC3_FREQUENCIES[usize::from(h4 >> 6)] * 100;
    (base != 0).then_some(base >> half)
}

/// Decodes the four bytes of an MPEG audio header, sync word included.
pub fn parse_mpeg_audio_header(header: &[u8]) -> Result<AudioFrameInfo> {
    if header.len() < MPEG_AUDIO_HEADER_LEN {
        return Err(RemuxError::Incomplete);
    }
    let (h1, h2) = (header[1], header[2]);

    let layer = mpeg_layer(h1);
    if layer > 3 {
        return Err(RemuxError::InvalidHeader("reserved MPEG audio layer".into()));
    }

    let (lsf, mpg25) = if h1 & 0x10 != 0 {
        (h1 & 0x08 == 0, false)
    } else {
        (true, true)
    };

    let rate_index = usize::from((h2 >> 2) & 0x03);
    let Some(&frequency) = MPEG_AUDIO_FREQUENCIES.get(rate_index) else {
        return Err(RemuxError::InvalidHeader(
            "reserved MPEG audio sampling frequency".into(),
        ));
    };

    let Some(bit_rate) = mpeg_bit_rate(lsf, layer, h2 >> 4) else {
        return Err(RemuxError::InvalidHeader(
            "reserved MPEG audio bit rate".into(),
        ));
    };

    let mut info = AudioFrameInfo {
        layer,
        bit_rate,
        sample_rate: frequency >> (u8::from(lsf) + u8::from(mpg25)),
        frequency,
        lsf,
        mpg25,
        padding: (h2 >> 1) & 0x01 != 0,
        ..Default::default()
    };
    info.frame_size = info.mpeg_frame_size().ok_or_else(|| {
        RemuxError::InvalidHeader("free format bit rate has no frame size".into())
    })?;
    info.set = true;

    debug!(
        "Audio: MPEG layer {}, {} kb/s, {} Hz, frame size {}",
        info.layer,
        info.bit_rate / 1000,
        info.sample_rate,
        info.frame_size
    );
    Ok(info)
}

/// Decodes the six bytes of an AC-3 sync frame header.
pub fn parse_ac3_header(header: &[u8]) -> Result<AudioFrameInfo> {
    if header.len() < AC3_HEADER_LEN {
        return Err(RemuxError::Incomplete);
    }
    let (h4, h5) = (header[4], header[5]);
    let frame = h4 & 0x3F;

    let bit_rate = AC3_BITRATES[usize::from(frame >> 1)] * 1000;
    if bit_rate == 0 {
        return Err(RemuxError::InvalidHeader("reserved AC-3 frame size code".into()));
    }
    let frequency = ac3_frequency(h4, h5).ok_or_else(|| {
        RemuxError::InvalidHeader("reserved AC-3 sample rate or bsid".into())
    })?;

    let kbps = (bit_rate / 1000) as usize;
    let frame_size = match h4 & 0xC0 {
        0x00 => 4 * kbps,
        0x40 => 2 * (320 * bit_rate as usize / 147_000 + usize::from(frame & 0x01)),
        _ => 6 * kbps,
    };

    let info = AudioFrameInfo {
        layer: 0,
        bit_rate,
        sample_rate: frequency,
        frequency,
        frame_size,
        set: true,
        ..Default::default()
    };
    debug!(
        "Audio: AC-3 {} kb/s, {} Hz, frame size {}",
        kbps, info.frequency, info.frame_size
    );
    Ok(info)
}

/// Finds and decodes the next MPEG audio header. Returns the sync offset.
pub fn get_audio_info<R: RingBuffer + ?Sized>(
    ring: &R,
    info: &mut AudioFrameInfo,
    offset: usize,
    limit: usize,
) -> Result<usize> {
    info.set = false;
    let sync = find_audio_sync(ring, AudioKind::MpegAudio, offset, limit)?;
    *info = parse_mpeg_audio_header(&sync.header)?;
    info.offset = sync.offset;
    Ok(sync.offset)
}

/// Finds and decodes the next AC-3 header. Returns the sync offset.
pub fn get_ac3_info<R: RingBuffer + ?Sized>(
    ring: &R,
    info: &mut AudioFrameInfo,
    offset: usize,
    limit: usize,
) -> Result<usize> {
    info.set = false;
    let sync = find_audio_sync(ring, AudioKind::Ac3, offset, limit)?;
    *info = parse_ac3_header(&sync.header)?;
    info.offset = sync.offset;
    Ok(sync.offset)
}

/// Checks that the frame at `offset` continues the locked stream in `info`.
///
/// The sync word must sit exactly at `offset`. A padding change is accepted
/// when the recomputed frame size stays within two bytes of the previous
/// one; `info` is then updated to the new padding and size.
pub fn check_audio_header<R: RingBuffer + ?Sized>(
    ring: &R,
    info: &mut AudioFrameInfo,
    offset: usize,
    limit: usize,
    kind: AudioKind,
) -> Result<HeaderCheck> {
    let sync = match find_audio_sync(ring, kind, offset, limit) {
        Ok(sync) => sync,
        Err(RemuxError::Incomplete) => {
            warn!("incomplete audio header at offset {}", offset);
            return Err(RemuxError::Incomplete);
        }
        Err(RemuxError::SyncNotFound) => return Ok(HeaderCheck::Inconsistent),
        Err(e) => return Err(e),
    };
    if sync.offset != 0 {
        return Ok(HeaderCheck::Inconsistent);
    }
    let h = sync.header;

    match kind {
        AudioKind::MpegAudio => {
            if info.layer != mpeg_layer(h[1]) {
                return Ok(if h[1] == 0xFF {
                    HeaderCheck::AllOnes
                } else {
                    HeaderCheck::Inconsistent
                });
            }
            if mpeg_bit_rate(info.lsf, info.layer, h[2] >> 4) != Some(info.bit_rate) {
                return Ok(HeaderCheck::Inconsistent);
            }

            let padding = (h[2] >> 1) & 0x01 != 0;
            if padding != info.padding {
                let mut next = info.clone();
                next.padding = padding;
                match next.mpeg_frame_size() {
                    Some(size) if size.abs_diff(info.frame_size) <= 2 => {
                        info.padding = padding;
                        info.frame_size = size;
                    }
                    _ => return Ok(HeaderCheck::Inconsistent),
                }
            }
        }
        AudioKind::Ac3 => {
            let bit_rate = AC3_BITRATES[usize::from((h[4] & 0x3F) >> 1)] * 1000;
            if bit_rate != info.bit_rate {
                return Ok(HeaderCheck::Inconsistent);
            }
            if ac3_frequency(h[4], h[5]) != Some(info.frequency) {
                return Ok(HeaderCheck::Inconsistent);
            }
        }
    }

    Ok(HeaderCheck::Consistent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ByteRing;
    use pretty_assertions::assert_eq;

    // MPEG-1 layer 2, 128 kb/s, 44.1 kHz, no CRC
    const MP2_HEADER: [u8; 4] = [0xFF, 0xFD, 0x80, 0x04];
    // 48 kHz, 128 kb/s, bsid 8
    const AC3_HEADER: [u8; 6] = [0x0B, 0x77, 0x12, 0x34, 0x10, 0x40];

    fn ring_with(data: &[u8]) -> ByteRing {
        let mut ring = ByteRing::new(256);
        ring.write(data).unwrap();
        ring
    }

    #[test]
    fn test_scanner_false_first_byte() {
        let mut scanner = SyncScanner::new(AudioKind::Ac3);
        assert!(!scanner.push(0x0B));
        assert!(!scanner.push(0x0B));
        assert!(scanner.push(0x77));
        assert!(!scanner.in_candidate());
    }

    #[test]
    fn test_find_sync() {
        let ring = ring_with(&[0x00, 0xFF, 0x12, 0xFF, 0xFD, 0x80, 0x04]);
        let sync = find_audio_sync(&ring, AudioKind::MpegAudio, 0, 7).unwrap();
        assert_eq!(sync.offset, 3);
        assert_eq!(&sync.header[..4], &MP2_HEADER);

        let sync = find_audio_sync(&ring, AudioKind::MpegAudio, 2, 5).unwrap();
        assert_eq!(sync.offset, 1);
    }

    #[test]
    fn test_find_sync_incomplete() {
        let ring = ring_with(&[0x00, 0x12, 0x0B]);
        assert!(matches!(
            find_audio_sync(&ring, AudioKind::Ac3, 0, 3),
            Err(RemuxError::Incomplete)
        ));
        // Sync word present but the header behind it is not.
        let ring = ring_with(&[0x0B, 0x77, 0x00]);
        assert!(find_audio_sync(&ring, AudioKind::Ac3, 0, 3)
            .unwrap_err()
            .is_incomplete());
        let ring = ring_with(&[0x00, 0x12, 0x34]);
        assert!(matches!(
            find_audio_sync(&ring, AudioKind::Ac3, 0, 3),
            Err(RemuxError::SyncNotFound)
        ));
    }

    #[test]
    fn test_mpeg_layer2_header() {
        let ring = ring_with(&MP2_HEADER);
        let mut info = AudioFrameInfo::default();
        assert_eq!(get_audio_info(&ring, &mut info, 0, 4).unwrap(), 0);
        assert!(info.set);
        assert_eq!(info.layer, 2);
        assert_eq!(info.bit_rate, 128_000);
        assert_eq!(info.sample_rate, 44100);
        assert!(!info.lsf);
        assert_eq!(info.frame_size, 417);

        let padded = parse_mpeg_audio_header(&[0xFF, 0xFD, 0x82, 0x04]).unwrap();
        assert!(padded.padding);
        assert_eq!(padded.frame_size, 418);
    }

    #[test]
    fn test_mpeg_lsf_headers() {
        // MPEG-2 layer 3, 64 kb/s, 24 kHz
        let info = parse_mpeg_audio_header(&[0xFF, 0xF3, 0x84, 0x00]).unwrap();
        assert_eq!(info.layer, 3);
        assert!(info.lsf);
        assert!(!info.mpg25);
        assert_eq!(info.sample_rate, 24000);
        assert_eq!(info.frequency, 48000);
        assert_eq!(info.bit_rate, 64_000);
        assert_eq!(info.frame_size, 64 * 144_000 / 48000);

        // MPEG-2 layer 2 keeps 1152 samples per frame, so only layer 3 halves
        // the size at low sample frequencies.
        let info = parse_mpeg_audio_header(&[0xFF, 0xF5, 0x84, 0x00]).unwrap();
        assert_eq!(info.layer, 2);
        assert!(info.lsf);
        assert_eq!(info.sample_rate, 24000);
        assert_eq!(info.bit_rate, 64_000);
        assert_eq!(info.frame_size, 384);

        // MPEG-2.5 layer 1
        let info = parse_mpeg_audio_header(&[0xFF, 0xE7, 0x10, 0x00]).unwrap();
        assert!(info.mpg25);
        assert_eq!(info.layer, 1);
        assert_eq!(info.sample_rate, 11025);
        assert_eq!(info.bit_rate, 32_000);
        assert_eq!(info.frame_size, (32 * 12000 / 11025) * 4);
    }

    #[test]
    fn test_mpeg_header_errors() {
        // free format
        assert!(matches!(
            parse_mpeg_audio_header(&[0xFF, 0xFD, 0x00, 0x00]),
            Err(RemuxError::InvalidHeader(_))
        ));
        // bit rate index 15
        assert!(parse_mpeg_audio_header(&[0xFF, 0xFD, 0xF0, 0x00]).is_err());
        // sampling index 3
        assert!(parse_mpeg_audio_header(&[0xFF, 0xFD, 0x8C, 0x00]).is_err());
        // layer field 0
        assert!(parse_mpeg_audio_header(&[0xFF, 0xF9, 0x80, 0x00]).is_err());
        assert!(parse_mpeg_audio_header(&[0xFF, 0xFD]).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_ac3_header() {
        let ring = ring_with(&AC3_HEADER);
        let mut info = AudioFrameInfo::default();
        assert_eq!(get_ac3_info(&ring, &mut info, 0, 6).unwrap(), 0);
        assert!(info.is_ac3());
        assert_eq!(info.bit_rate, 128_000);
        assert_eq!(info.frequency, 48000);
        assert_eq!(info.frame_size, 4 * 128);

        // 44.1 kHz with the odd frame size code carries one extra word.
        let info = parse_ac3_header(&[0x0B, 0x77, 0, 0, 0x51, 0x40]).unwrap();
        assert_eq!(info.frequency, 44100);
        assert_eq!(info.frame_size, 2 * (320 * 128_000 / 147_000 + 1));

        let info = parse_ac3_header(&[0x0B, 0x77, 0, 0, 0x90, 0x40]).unwrap();
        assert_eq!(info.frequency, 32000);
        assert_eq!(info.frame_size, 6 * 128);

        // Half-rate bsid
        let info = parse_ac3_header(&[0x0B, 0x77, 0, 0, 0x10, 0x48]).unwrap();
        assert_eq!(info.frequency, 24000);
    }

    #[test]
    fn test_ac3_header_errors() {
        // frame size code past the table
        assert!(parse_ac3_header(&[0x0B, 0x77, 0, 0, 0x3E, 0x40]).is_err());
        // fscod 3
        assert!(parse_ac3_header(&[0x0B, 0x77, 0, 0, 0xD0, 0x40]).is_err());
        // bsid beyond the halving table
        assert!(parse_ac3_header(&[0x0B, 0x77, 0, 0, 0x10, 0x80]).is_err());
    }

    #[test]
    fn test_check_same_header_is_consistent() {
        let ring = ring_with(&MP2_HEADER);
        let mut info = AudioFrameInfo::default();
        get_audio_info(&ring, &mut info, 0, 4).unwrap();
        let check = check_audio_header(&ring, &mut info, 0, 4, AudioKind::MpegAudio).unwrap();
        assert_eq!(check, HeaderCheck::Consistent);

        let ring = ring_with(&AC3_HEADER);
        get_ac3_info(&ring, &mut info, 0, 6).unwrap();
        let check = check_audio_header(&ring, &mut info, 0, 6, AudioKind::Ac3).unwrap();
        assert_eq!(check, HeaderCheck::Consistent);
    }

    #[test]
    fn test_check_padding_change() {
        let mut info = parse_mpeg_audio_header(&MP2_HEADER).unwrap();
        let ring = ring_with(&[0xFF, 0xFD, 0x82, 0x04]);
        let check = check_audio_header(&ring, &mut info, 0, 4, AudioKind::MpegAudio).unwrap();
        assert_eq!(check, HeaderCheck::Consistent);
        assert!(info.padding);
        assert_eq!(info.frame_size, 418);
    }

    #[test]
    fn test_check_inconsistent() {
        let mut info = parse_mpeg_audio_header(&MP2_HEADER).unwrap();

        // bit rate changed to 192 kb/s
        let ring = ring_with(&[0xFF, 0xFD, 0xA0, 0x04]);
        let check = check_audio_header(&ring, &mut info, 0, 4, AudioKind::MpegAudio).unwrap();
        assert_eq!(check, HeaderCheck::Inconsistent);

        // layer changed to 3
        let ring = ring_with(&[0xFF, 0xFB, 0x80, 0x04]);
        let check = check_audio_header(&ring, &mut info, 0, 4, AudioKind::MpegAudio).unwrap();
        assert_eq!(check, HeaderCheck::Inconsistent);

        // sync not at the expected position
        let ring = ring_with(&[0x00, 0xFF, 0xFD, 0x80, 0x04]);
        let check = check_audio_header(&ring, &mut info, 0, 5, AudioKind::MpegAudio).unwrap();
        assert_eq!(check, HeaderCheck::Inconsistent);

        let ring = ring_with(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let check = check_audio_header(&ring, &mut info, 0, 4, AudioKind::MpegAudio).unwrap();
        assert_eq!(check, HeaderCheck::AllOnes);
        assert_eq!(info.frame_size, 417);
    }
}
