use super::*;
use crate::av::StreamType;
use crate::codec::audio::{find_audio_sync, AudioKind};
use crate::error::Result;
use crate::utils::{ByteRing, RingBuffer, SliceSource};
use bytes::BytesMut;
use pretty_assertions::assert_eq;
use quickcheck_macros::quickcheck;

/// Splits packs written by the pack writers back into PES packets.
fn demux_all(data: &[u8]) -> Vec<(u8, Vec<u8>, Option<u64>)> {
    let mut parser = PesParser::direct(None);
    let mut out = Vec::new();
    parser
        .feed(data, &mut |p: &mut PesParser| -> Result<()> {
            out.push((p.stream_id(), p.payload().unwrap_or_default().to_vec(), p.pts()));
            Ok(())
        })
        .unwrap();
    out
}

#[test]
fn test_video_packs_round_trip() {
    let writer = PackWriter::new(DVD_PACK_SIZE, 1_260_000).unwrap();
    let source: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let mut ring = ByteRing::new(8192);
    ring.write(&source).unwrap();

    let mut out = BytesMut::new();
    let mut scr = 0;
    let mut first = true;
    while ring.available() > 0 {
        let ts = if first {
            PesTimestamps::Pts(90_000 * 300)
        } else {
            PesTimestamps::None
        };
        first = false;
        let available = ring.available();
        writer
            .write_video_pack(&mut out, scr, ts, available, &mut ring)
            .unwrap();
        scr += writer.scr_increment();
    }
    assert_eq!(out.len() % DVD_PACK_SIZE, 0);

    let packets = demux_all(&out);
    let video: Vec<u8> = packets
        .iter()
        .filter(|(id, _, _)| *id == 0xE0)
        .flat_map(|(_, payload, _)| payload.clone())
        .collect();
    assert_eq!(video, source);
    assert_eq!(packets[0].2, Some(90_000 * 300));
}

#[test]
fn test_ac3_descriptor_survives_demux() {
    let writer = PackWriter::new(DVD_PACK_SIZE, 1_260_000).unwrap();
    let mut ring = ByteRing::new(4096);
    ring.write(&[0x0B, 0x77, 0x01, 0x02]).unwrap();
    let info = Ac3PackInfo {
        frames: 1,
        first_frame_offset: 1,
        frame_length: 1536,
    };
    let mut out = BytesMut::new();
    writer
        .write_ac3_pack(&mut out, 0, 0, Some(300), info, 4, &mut ring)
        .unwrap();

    let packets = demux_all(&out);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].0, 0xBD);
    assert_eq!(packets[0].1, vec![0x80, 0x01, 0x00, 0x01, 0x0B, 0x77, 0x01, 0x02]);
    assert_eq!(packets[0].2, Some(300));
}

#[test]
fn test_stuffed_header_parses() {
    // Stuffing sits in front of the timestamps; the header parser skips it.
    let writer = PackWriter::new(DVD_PACK_SIZE, 1_260_000).unwrap();
    let length = DVD_PACK_SIZE - 14 - 14 - 5;
    let mut ring = ByteRing::new(4096);
    ring.write(&vec![1; length]).unwrap();
    let mut out = BytesMut::new();
    writer
        .write_audio_pack(&mut out, 0, 2, Some(1800 * 300), length, &mut ring)
        .unwrap();
    let (header, payload) = PSPacketParser::new()
        .parse_pes_header(&out[PS_HEADER_LEN..])
        .unwrap();
    assert_eq!(header.stuffing, 5);
    assert_eq!(header.timestamps, PesTimestamps::Pts(1800 * 300));
    assert_eq!(PS_HEADER_LEN + payload + length, DVD_PACK_SIZE);
}

#[test]
fn test_demuxer_ring_mode_collects_payload() {
    let writer = PackWriter::new(1024, 1_260_000).unwrap();
    let mut staged = ByteRing::new(4096);
    staged.write(&[9; 1500]).unwrap();
    let mut out = BytesMut::new();
    while staged.available() > 0 {
        let available = staged.available();
        writer
            .write_audio_pack(&mut out, 0, 0, None, available, &mut staged)
            .unwrap();
    }

    let mut parser = PesParser::with_ring(Some(StreamType::MpegAudio), ByteRing::new(4096));
    let mut sizes = Vec::new();
    parser
        .feed(&out, &mut |p: &mut PesParser| -> Result<()> {
            let end = p.ring().map_or(0, |r| r.write_position());
            sizes.push(end - p.ini_pos());
            Ok(())
        })
        .unwrap();
    assert_eq!(sizes.iter().sum::<u64>(), 1500);
    assert_eq!(parser.ring().map(|r| r.available()), Some(1500));
}

#[quickcheck]
fn prop_pack_exact_fit(pack_size: u16, length: u16, with_pts: bool) -> bool {
    let pack_size = 64 + usize::from(pack_size) % 4000;
    let length = 1 + usize::from(length) % pack_size;
    let writer = match PackWriter::new(pack_size, 1_260_000) {
        Ok(w) => w,
        Err(_) => return false,
    };

    let mut video = ByteRing::new(length);
    video.write(&vec![0xAA; length]).unwrap();
    let mut audio = ByteRing::new(length);
    audio.write(&vec![0xBB; length]).unwrap();

    let ts = if with_pts {
        PesTimestamps::PtsDts { pts: 3000, dts: 0 }
    } else {
        PesTimestamps::None
    };
    let mut buf = BytesMut::new();
    let video_ok = writer
        .write_video_pack(&mut buf, 0, ts, length, &mut video)
        .is_ok()
        && buf.len() == pack_size;

    let mut buf = BytesMut::new();
    let audio_ok = writer
        .write_audio_pack(&mut buf, 0, 0, with_pts.then_some(0), length, &mut audio)
        .is_ok()
        && buf.len() == pack_size;

    video_ok && audio_ok
}

#[test]
fn test_flat_buffer_ac3_pack() {
    // Two 768-byte AC-3 frames in a plain buffer.
    let mut frames = Vec::new();
    for fill in [0x10, 0x20] {
        frames.extend_from_slice(&[0x0B, 0x77]);
        frames.resize(frames.len() + 766, fill);
    }
    let mut source = SliceSource::new(&frames);
    let sync = find_audio_sync(&source, AudioKind::Ac3, 1, frames.len() - 1).unwrap();
    assert_eq!(sync.offset + 1, 768);

    let writer = PackWriter::new(DVD_PACK_SIZE, 1_260_000).unwrap();
    let info = Ac3PackInfo {
        frames: 2,
        first_frame_offset: 1,
        frame_length: 768,
    };
    let mut out = BytesMut::new();
    let drawn = writer
        .write_ac3_pack(&mut out, 0, 0, Some(0), info, frames.len(), &mut source)
        .unwrap();
    assert_eq!(drawn, frames.len());
    assert_eq!(source.consumed(), frames.len());
    assert_eq!(out.len(), DVD_PACK_SIZE);

    let packets = demux_all(&out);
    assert_eq!(packets.len(), 1);
    assert_eq!(&packets[0].1[..4], &[0x80, 2, 0x00, 0x01]);
    assert_eq!(&packets[0].1[4..], frames.as_slice());
}
