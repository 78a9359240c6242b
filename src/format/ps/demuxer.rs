use super::parser::PSPacketParser;
use super::pes::{decode_timestamp, PesTimestamps};
use super::types::*;
use crate::av::{CodecData, Packet, StreamType};
use crate::error::{RemuxError, Result};
use crate::format::Demuxer as FormatDemuxer;
use crate::utils::{ByteRing, RingBuffer};
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, error, warn};
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes requested from the reader per call.
const READ_CHUNK: usize = 64 * 1024;

/// Where reassembled PES bytes are stored.
#[derive(Debug)]
pub enum PesSink<R> {
    /// The whole packet, header included, in a flat buffer
    Direct(BytesMut),
    /// Header kept by the parser, payload appended to the ring
    Ring(R),
}

/// Position of the parser within the current packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PesState {
    /// Looking for `00 00 01`; `found` counts matched bytes
    Scan,
    StreamId,
    LengthHigh,
    LengthLow,
    Flags1,
    Flags2,
    HeaderLength,
    Timestamps,
    Payload,
    /// Consuming a packet whose contents are not kept
    Skip,
}

/// Receives every completely reassembled PES packet.
pub trait PesPacketHandler<R> {
    fn on_packet(&mut self, parser: &mut PesParser<R>) -> Result<()>;
}

impl<R, F> PesPacketHandler<R> for F
where
    F: FnMut(&mut PesParser<R>) -> Result<()>,
{
    fn on_packet(&mut self, parser: &mut PesParser<R>) -> Result<()> {
        self(parser)
    }
}

/// Resumable PES packet reassembler.
///
/// Input may be fed in slices of any size; the parser keeps its position
/// between calls to [`feed`](Self::feed). Audio, video and private stream 1
/// packets are handed to the handler once complete, all other PES packets are
/// skipped and pack or system headers restart the scan.
#[derive(Debug)]
pub struct PesParser<R = ByteRing> {
    stream_type: Option<StreamType>,
    sink: PesSink<R>,
    state: PesState,
    /// Bytes of the current packet consumed since the start code
    found: usize,
    stream_id: u8,
    /// Declared packet length minus the 6-byte prefix
    plength: usize,
    flag2: u8,
    header_data_len: u8,
    mpeg2: bool,
    header: Vec<u8>,
    pts: [u8; PES_TIMESTAMP_LEN],
    dts: [u8; PES_TIMESTAMP_LEN],
    ini_pos: u64,
}

impl PesParser<ByteRing> {
    /// A parser collecting each packet into a flat buffer.
    pub fn direct(stream_type: Option<StreamType>) -> Self {
        Self::with_sink(stream_type, PesSink::Direct(BytesMut::new()))
    }
}

impl<R: RingBuffer> PesParser<R> {
    /// A parser appending payload bytes to `ring`.
    pub fn with_ring(stream_type: Option<StreamType>, ring: R) -> Self {
        Self::with_sink(stream_type, PesSink::Ring(ring))
    }

    fn with_sink(stream_type: Option<StreamType>, sink: PesSink<R>) -> Self {
        let mut parser = Self {
            stream_type,
            sink,
            state: PesState::Scan,
            found: 0,
            stream_id: 0,
            plength: 0,
            flag2: 0,
            header_data_len: 0,
            mpeg2: false,
            header: Vec::with_capacity(PES_HEADER_MIN + 0xFF),
            pts: [0; PES_TIMESTAMP_LEN],
            dts: [0; PES_TIMESTAMP_LEN],
            ini_pos: 0,
        };
        parser.reinit();
        parser
    }

    /// Clears the packet state. Stream type, sink and buffering mode survive.
    pub fn reinit(&mut self) {
        self.state = PesState::Scan;
        self.found = 0;
        self.stream_id = 0;
        self.plength = 0;
        self.flag2 = 0;
        self.header_data_len = 0;
        self.mpeg2 = false;
        self.header.clear();
        self.pts = [0; PES_TIMESTAMP_LEN];
        self.dts = [0; PES_TIMESTAMP_LEN];
        match &mut self.sink {
            PesSink::Direct(buf) => buf.clear(),
            PesSink::Ring(ring) => self.ini_pos = ring.write_position(),
        }
    }

    /// Consumes `data`, invoking `handler` for every packet it completes.
    ///
    /// Ring overflow and handler errors abort the call and drop the current
    /// packet, so the next call starts scanning afresh. Malformed headers are
    /// logged and scanning resumes.
    pub fn feed<H>(&mut self, mut data: &[u8], handler: &mut H) -> Result<()>
    where
        H: PesPacketHandler<R> + ?Sized,
    {
        while !data.is_empty() {
            let used = match self.state {
                PesState::Scan => self.scan(data),
                PesState::StreamId => self.on_stream_id(data[0]),
                PesState::LengthHigh => self.on_length_high(data[0]),
                PesState::LengthLow => self.on_length_low(data[0]),
                PesState::Flags1 => self.on_flags1(data[0]),
                PesState::Flags2 => self.on_flags2(data[0]),
                PesState::HeaderLength => self.on_header_length(data[0]),
                PesState::Timestamps => self.copy_timestamps(data),
                PesState::Payload => self.copy_payload(data)?,
                PesState::Skip => self.skip_payload(data),
            };
            data = &data[used..];

            if self.found == self.total_len() {
                match self.state {
                    PesState::Payload => {
                        let result = handler.on_packet(self);
                        self.reinit();
                        result?;
                    }
                    PesState::Skip => self.reinit(),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn total_len(&self) -> usize {
        if self.state == PesState::Scan {
            usize::MAX
        } else {
            self.plength + 6
        }
    }

    fn keep_header_byte(&mut self, byte: u8) {
        self.header.push(byte);
        if let PesSink::Direct(buf) = &mut self.sink {
            buf.put_u8(byte);
        }
        self.found += 1;
    }

    fn reset_scan(&mut self, reason: &str) {
        warn!(
            "Error in PES header 0x{:02x}: {}, rescanning",
            self.stream_id, reason
        );
        self.reinit();
    }

    fn scan(&mut self, data: &[u8]) -> usize {
        for (i, &byte) in data.iter().enumerate() {
            match (self.found, byte) {
                (0 | 1, 0x00) => self.found += 1,
                (2, 0x00) => {}
                (2, 0x01) => {
                    self.found = 3;
                    self.state = PesState::StreamId;
                    return i + 1;
                }
                _ => self.found = 0,
            }
        }
        data.len()
    }

    fn on_stream_id(&mut self, id: u8) -> usize {
        match classify_stream_id(id) {
            StreamClass::NotPes => {
                self.found = 0;
                self.state = PesState::Scan;
            }
            _ => {
                self.stream_id = id;
                self.header.clear();
                self.header.extend_from_slice(&[0x00, 0x00, 0x01, id]);
                if let PesSink::Direct(buf) = &mut self.sink {
                    buf.clear();
                    buf.put_slice(&[0x00, 0x00, 0x01, id]);
                }
                self.found = 4;
                self.state = PesState::LengthHigh;
            }
        }
        1
    }

    fn is_header_only(&self) -> bool {
        classify_stream_id(self.stream_id) == StreamClass::HeaderOnly
    }

    fn on_length_high(&mut self, byte: u8) -> usize {
        self.keep_header_byte(byte);
        self.state = PesState::LengthLow;
        1
    }

    fn on_length_low(&mut self, byte: u8) -> usize {
        self.keep_header_byte(byte);
        self.plength = usize::from(u16::from_be_bytes([self.header[4], byte]));
        if self.plength == 0 {
            self.plength = MAX_UNBOUNDED_PES - 6;
        }
        self.state = if self.is_header_only() {
            PesState::Skip
        } else {
            PesState::Flags1
        };
        1
    }

    fn on_flags1(&mut self, byte: u8) -> usize {
        if byte & 0xC0 != 0x80 {
            self.reset_scan("not MPEG-2 framing");
            return 1;
        }
        self.mpeg2 = true;
        self.keep_header_byte(byte);
        self.state = PesState::Flags2;
        1
    }

    fn on_flags2(&mut self, byte: u8) -> usize {
        self.flag2 = byte;
        self.keep_header_byte(byte);
        self.state = PesState::HeaderLength;
        1
    }

    fn on_header_length(&mut self, byte: u8) -> usize {
        self.header_data_len = byte;
        self.keep_header_byte(byte);

        let header_len = self.header_len();
        if header_len > self.total_len() {
            self.reset_scan("header longer than packet");
            return 1;
        }
        if self.timestamp_flags().len() > usize::from(byte) {
            self.reset_scan("header data too short for timestamps");
            return 1;
        }
        self.state = if self.timestamp_flags().len() > 0 {
            PesState::Timestamps
        } else {
            PesState::Payload
        };
        1
    }

    fn copy_timestamps(&mut self, data: &[u8]) -> usize {
        let end = PES_HEADER_MIN + self.timestamp_flags().len();
        let n = data.len().min(end - self.found);
        for &byte in &data[..n] {
            let idx = self.found - PES_HEADER_MIN;
            if idx < PES_TIMESTAMP_LEN {
                self.pts[idx] = byte;
            } else {
                self.dts[idx - PES_TIMESTAMP_LEN] = byte;
            }
            self.keep_header_byte(byte);
        }
        if self.found == end {
            self.state = PesState::Payload;
        }
        n
    }

    fn copy_payload(&mut self, data: &[u8]) -> Result<usize> {
        let mut used = 0;

        // Stuffing and extension bytes still belong to the header.
        let header_rest = self.header_len().saturating_sub(self.found).min(data.len());
        for &byte in &data[..header_rest] {
            self.keep_header_byte(byte);
        }
        used += header_rest;

        let n = (data.len() - used).min(self.total_len() - self.found);
        let body = &data[used..used + n];
        match &mut self.sink {
            PesSink::Direct(buf) => buf.put_slice(body),
            PesSink::Ring(ring) => {
                if let Err(e) = ring.write(body) {
                    error!(
                        "ring buffer overflow for PES 0x{:02x}: {}",
                        self.stream_id, e
                    );
                    self.reinit();
                    return Err(e);
                }
            }
        }
        self.found += n;
        Ok(used + n)
    }

    fn skip_payload(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.total_len() - self.found);
        self.found += n;
        n
    }

    /// Elementary stream type the parser was created for.
    pub fn stream_type(&self) -> Option<StreamType> {
        self.stream_type
    }

    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    /// True once an MPEG-2 flag byte has been accepted for this packet.
    pub fn is_mpeg2(&self) -> bool {
        self.mpeg2
    }

    /// Bytes consumed from the current packet, start code included.
    pub fn found(&self) -> usize {
        self.found
    }

    /// Declared packet length minus the 6-byte prefix. Unbounded packets
    /// report the cap.
    pub fn payload_length(&self) -> usize {
        self.plength
    }

    pub fn timestamp_flags(&self) -> TimestampFlags {
        TimestampFlags::from_bits(self.flag2)
    }

    /// Header length up to the first payload byte.
    pub fn header_len(&self) -> usize {
        PES_HEADER_MIN + usize::from(self.header_data_len)
    }

    /// Header bytes received so far, start code included.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Presentation timestamp in 27 MHz ticks.
    pub fn pts(&self) -> Option<u64> {
        if self.timestamp_flags() == TimestampFlags::None {
            return None;
        }
        decode_timestamp(&self.pts).ok()
    }

    /// Decoding timestamp in 27 MHz ticks.
    pub fn dts(&self) -> Option<u64> {
        if self.timestamp_flags() != TimestampFlags::PtsDts {
            return None;
        }
        decode_timestamp(&self.dts).ok()
    }

    /// Timestamps decoded from the complete header, stuffing skipped.
    ///
    /// [`pts`](Self::pts) and [`dts`](Self::dts) read the fields right after
    /// the header data length byte; packs that place stuffing in front of the
    /// timestamps need this instead.
    pub fn header_timestamps(&self) -> PesTimestamps {
        if self.found < self.header_len() {
            return PesTimestamps::None;
        }
        match PSPacketParser::new().parse_pes_header(&self.header) {
            Ok((header, _)) => header.timestamps,
            Err(e) => {
                warn!("PES 0x{:02x} timestamps unreadable: {}", self.stream_id, e);
                PesTimestamps::None
            }
        }
    }

    /// Raw 5-byte timestamp fields as copied from the header.
    pub fn raw_timestamps(&self) -> (&[u8; PES_TIMESTAMP_LEN], &[u8; PES_TIMESTAMP_LEN]) {
        (&self.pts, &self.dts)
    }

    /// The whole packet in direct mode.
    pub fn packet(&self) -> Option<&[u8]> {
        match &self.sink {
            PesSink::Direct(buf) => Some(buf),
            PesSink::Ring(_) => None,
        }
    }

    /// Payload bytes in direct mode.
    pub fn payload(&self) -> Option<&[u8]> {
        let start = self.header_len().min(self.found);
        self.packet().map(|buf| &buf[start.min(buf.len())..])
    }

    /// Ring write position when the current packet started. In ring mode
    /// the payload occupies `ini_pos()..ring.write_position()`.
    pub fn ini_pos(&self) -> u64 {
        self.ini_pos
    }

    pub fn ring(&self) -> Option<&R> {
        match &self.sink {
            PesSink::Ring(ring) => Some(ring),
            PesSink::Direct(_) => None,
        }
    }

    pub fn ring_mut(&mut self) -> Option<&mut R> {
        match &mut self.sink {
            PesSink::Ring(ring) => Some(ring),
            PesSink::Direct(_) => None,
        }
    }

    pub fn into_sink(self) -> PesSink<R> {
        self.sink
    }
}

/// Stream discovered by [`PSDemuxer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxedStream {
    pub stream_type: StreamType,
    pub stream_id: u8,
    /// AC-3 sub-stream id inside private stream 1
    pub substream_id: Option<u8>,
}

impl CodecData for DemuxedStream {
    fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    fn bit_rate(&self) -> u32 {
        0
    }
}

/// Reads a program stream and returns its elementary stream packets.
///
/// AC-3 sub-stream descriptors are stripped from private stream 1 payloads;
/// other private sub-streams are dropped.
pub struct PSDemuxer<R: AsyncRead + Unpin + Send> {
    reader: R,
    /// Reused read buffer
    chunk: Vec<u8>,
    parser: PesParser,
    pending: VecDeque<Packet>,
    streams: Vec<DemuxedStream>,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> PSDemuxer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk: vec![0u8; READ_CHUNK],
            parser: PesParser::direct(None),
            pending: VecDeque::new(),
            streams: Vec::new(),
            eof: false,
        }
    }

    fn stream_index(streams: &mut Vec<DemuxedStream>, stream: DemuxedStream) -> usize {
        if let Some(index) = streams.iter().position(|s| *s == stream) {
            return index;
        }
        debug!(
            "new stream 0x{:02x} {:?} ({:?})",
            stream.stream_id, stream.substream_id, stream.stream_type
        );
        streams.push(stream);
        streams.len() - 1
    }

    async fn fill(&mut self) -> Result<()> {
        let n = self.reader.read(&mut self.chunk).await?;
        if n == 0 {
            self.eof = true;
            return Ok(());
        }

        let pending = &mut self.pending;
        let streams = &mut self.streams;
        self.parser
            .feed(&self.chunk[..n], &mut |parser: &mut PesParser| -> Result<()> {
                let Some(payload) = parser.payload() else {
                    return Ok(());
                };
                let id = parser.stream_id();
                let (stream, data) = match id {
                    VIDEO_STREAM_FIRST..=VIDEO_STREAM_LAST => (
                        DemuxedStream {
                            stream_type: StreamType::Video,
                            stream_id: id,
                            substream_id: None,
                        },
                        payload,
                    ),
                    AUDIO_STREAM_FIRST..=AUDIO_STREAM_LAST => (
                        DemuxedStream {
                            stream_type: StreamType::MpegAudio,
                            stream_id: id,
                            substream_id: None,
                        },
                        payload,
                    ),
                    PRIVATE_STREAM_1
                        if payload.len() >= AC3_DESCRIPTOR_LEN
                            && payload[0] & 0xF8 == AC3_SUBSTREAM_FIRST =>
                    {
                        (
                            DemuxedStream {
                                stream_type: StreamType::Ac3,
                                stream_id: id,
                                substream_id: Some(payload[0]),
                            },
                            &payload[AC3_DESCRIPTOR_LEN..],
                        )
                    }
                    _ => return Ok(()),
                };

                let mut packet = Packet::new(Bytes::copy_from_slice(data))
                    .with_stream_index(Self::stream_index(streams, stream));
                let timestamps = parser.header_timestamps();
                packet.pts = timestamps.pts();
                packet.dts = timestamps.dts();
                pending.push_back(packet);
                Ok(())
            })
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> FormatDemuxer for PSDemuxer<R> {
    async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Ok(packet);
            }
            if self.eof {
                return Err(RemuxError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "end of program stream",
                )));
            }
            self.fill().await?;
        }
    }

    async fn streams(&mut self) -> Result<Vec<Box<dyn CodecData>>> {
        Ok(self
            .streams
            .iter()
            .map(|s| Box::new(*s) as Box<dyn CodecData>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ps::muxer::PackWriter;
    use crate::format::ps::pes::write_pes_header;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    fn pes_packet(id: u8, timestamps: PesTimestamps, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let header_len = PES_HEADER_MIN + timestamps.flags().len();
        write_pes_header(&mut buf, id, header_len + payload.len(), timestamps, 0).unwrap();
        buf.put_slice(payload);
        buf.to_vec()
    }

    #[derive(Debug, Default, PartialEq)]
    struct Seen {
        id: u8,
        header: Vec<u8>,
        payload: Vec<u8>,
        pts: Option<u64>,
        dts: Option<u64>,
    }

    fn collect_direct(chunks: &[&[u8]]) -> Vec<Seen> {
        let mut parser = PesParser::direct(Some(StreamType::Video));
        let mut seen = Vec::new();
        for chunk in chunks {
            parser
                .feed(chunk, &mut |p: &mut PesParser| -> Result<()> {
                    seen.push(Seen {
                        id: p.stream_id(),
                        header: p.header().to_vec(),
                        payload: p.payload().unwrap_or_default().to_vec(),
                        pts: p.pts(),
                        dts: p.dts(),
                    });
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(parser.stream_type(), Some(StreamType::Video));
        seen
    }

    #[test]
    fn test_single_packet() {
        let data = pes_packet(
            0xE0,
            PesTimestamps::PtsDts {
                pts: 6000 * 300,
                dts: 3000 * 300,
            },
            &[1, 2, 3, 4],
        );
        let seen = collect_direct(&[&data]);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, 0xE0);
        assert_eq!(seen[0].header.len(), 19);
        assert_eq!(seen[0].payload, vec![1, 2, 3, 4]);
        assert_eq!(seen[0].pts, Some(6000 * 300));
        assert_eq!(seen[0].dts, Some(3000 * 300));
    }

    #[test]
    fn test_skips_pack_headers_and_padding() {
        let mut data = Vec::new();
        let mut pack = BytesMut::new();
        write_ps_header(&mut pack, 0, 1_260_000, None).unwrap();
        data.extend_from_slice(&pack);
        let mut padding = BytesMut::new();
        crate::format::ps::pes::PESHeader::padding(40)
            .write_to(&mut padding)
            .unwrap();
        data.extend_from_slice(&padding);
        data.extend_from_slice(&pes_packet(0xC1, PesTimestamps::Pts(900 * 300), &[9; 10]));

        let seen = collect_direct(&[&data]);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, 0xC1);
        assert_eq!(seen[0].pts, Some(900 * 300));
        assert_eq!(seen[0].dts, None);
        assert_eq!(seen[0].payload, vec![9; 10]);
    }

    #[test]
    fn test_mpeg1_header_rescans() {
        let mut data = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x08, 0x0F, 0xFF];
        data.extend_from_slice(&pes_packet(0xE0, PesTimestamps::None, &[7, 7]));
        let seen = collect_direct(&[&data]);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload, vec![7, 7]);
    }

    #[test]
    fn test_inconsistent_length_rescans() {
        // Declared length leaves no room for the 20-byte header data.
        let mut data = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x04, 0x80, 0x00, 0x14];
        data.extend_from_slice(&pes_packet(0xE0, PesTimestamps::None, &[5]));
        let seen = collect_direct(&[&data]);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload, vec![5]);
    }

    #[test]
    fn test_unbounded_length() {
        let mut parser = PesParser::direct(None);
        let data = [0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x00, 0x00, 1, 2, 3];
        parser
            .feed(&data, &mut |_: &mut PesParser| -> Result<()> {
                panic!("unbounded packet cannot complete")
            })
            .unwrap();
        assert_eq!(parser.payload_length(), MAX_UNBOUNDED_PES - 6);
        assert_eq!(parser.payload(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_ring_sink() {
        let data = pes_packet(0xC0, PesTimestamps::Pts(300), &[0xAA; 32]);
        let mut parser = PesParser::with_ring(Some(StreamType::MpegAudio), ByteRing::new(64));
        let mut starts = Vec::new();
        parser
            .feed(&data, &mut |p: &mut PesParser| -> Result<()> {
                starts.push((p.ini_pos(), p.ring().map(|r| r.write_position())));
                assert!(p.packet().is_none());
                assert_eq!(p.header().len(), 14);
                Ok(())
            })
            .unwrap();
        assert_eq!(starts, vec![(0, Some(32))]);
        // The next packet starts where the previous payload ended.
        assert_eq!(parser.ini_pos(), 32);
        assert_eq!(parser.ring().map(|r| r.available()), Some(32));
    }

    #[test]
    fn test_ring_overflow_is_fatal() {
        let data = pes_packet(0xC0, PesTimestamps::None, &[0; 16]);
        let mut parser = PesParser::with_ring(None, ByteRing::new(8));
        let mut packets = Vec::new();
        let mut handler = |p: &mut PesParser| -> Result<()> {
            packets.push((p.stream_id(), p.ini_pos(), p.ring().map(|r| r.write_position())));
            Ok(())
        };
        let result = parser.feed(&data, &mut handler);
        assert!(matches!(result, Err(RemuxError::BufferOverflow(_))));

        // The failed packet is dropped and the next one parses normally.
        parser
            .feed(&pes_packet(0xC1, PesTimestamps::None, &[1; 4]), &mut handler)
            .unwrap();
        assert_eq!(packets, vec![(0xC1, 0, Some(4))]);
    }

    #[test]
    fn test_handler_error_drops_packet() {
        let data = pes_packet(0xE0, PesTimestamps::None, &[1]);
        let mut parser = PesParser::direct(None);
        let mut calls = 0;
        let mut handler = |_: &mut PesParser| -> Result<()> {
            calls += 1;
            if calls == 1 {
                Err(RemuxError::InvalidData("stop".into()))
            } else {
                Ok(())
            }
        };
        assert!(parser.feed(&data, &mut handler).is_err());
        parser.feed(&[0], &mut handler).unwrap();
        parser.feed(&data[1..], &mut handler).unwrap();
        assert_eq!(calls, 2);
        assert_eq!(parser.found(), 0);
    }

    fn stuffed_audio_pack(pts: u64) -> (BytesMut, usize) {
        let writer = PackWriter::new(DVD_PACK_SIZE, 1_260_000).unwrap();
        // Five bytes short of a full pack, so the header carries stuffing.
        let length = DVD_PACK_SIZE - PS_HEADER_LEN - PES_HEADER_MIN - PES_TIMESTAMP_LEN - 5;
        let mut ring = ByteRing::new(DVD_PACK_SIZE);
        ring.write(&vec![0x42; length]).unwrap();
        let mut pack = BytesMut::new();
        writer
            .write_audio_pack(&mut pack, 0, 0, Some(pts), length, &mut ring)
            .unwrap();
        assert_eq!(pack.len(), DVD_PACK_SIZE);
        (pack, length)
    }

    #[test]
    fn test_header_timestamps_skip_stuffing() {
        let (pack, length) = stuffed_audio_pack(1800 * 300);
        let mut parser = PesParser::direct(None);
        let mut seen = Vec::new();
        parser
            .feed(&pack, &mut |p: &mut PesParser| -> Result<()> {
                seen.push((p.header_timestamps(), p.payload().map(|d| d.len())));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![(PesTimestamps::Pts(1800 * 300), Some(length))]);
    }

    #[tokio::test]
    async fn test_ps_demuxer_stuffed_pack() {
        let (pack, length) = stuffed_audio_pack(1800 * 300);
        let mut demuxer = PSDemuxer::new(std::io::Cursor::new(pack.to_vec()));
        let audio = demuxer.read_packet().await.unwrap();
        assert_eq!(audio.pts, Some(1800 * 300));
        assert_eq!(audio.dts, None);
        assert_eq!(audio.data.len(), length);
    }

    #[quickcheck]
    fn prop_resumable(payload: Vec<u8>, cuts: Vec<usize>) -> bool {
        let payload = &payload[..payload.len().min(2000)];
        let mut stream = pes_packet(
            0xE0,
            PesTimestamps::PtsDts {
                pts: 12_345 * 300,
                dts: 12_000 * 300,
            },
            payload,
        );
        stream.extend(pes_packet(0xC0, PesTimestamps::Pts(77 * 300), payload));

        let whole = collect_direct(&[&stream]);

        let mut points: Vec<usize> = cuts.iter().map(|c| c % (stream.len() + 1)).collect();
        points.push(0);
        points.push(stream.len());
        points.sort_unstable();
        points.dedup();
        let chunks: Vec<&[u8]> = points.windows(2).map(|w| &stream[w[0]..w[1]]).collect();

        whole.len() == 2 && collect_direct(&chunks) == whole
    }

    #[test]
    fn test_byte_by_byte() {
        let stream = pes_packet(0xE0, PesTimestamps::Pts(1_000 * 300), &[3; 100]);
        let chunks: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(collect_direct(&chunks), collect_direct(&[&stream]));
    }

    #[tokio::test]
    async fn test_ps_demuxer() {
        let mut data = Vec::new();
        data.extend_from_slice(&pes_packet(0xE0, PesTimestamps::Pts(3600 * 300), &[1, 2]));
        let mut ac3 = vec![0x80, 0x01, 0x00, 0x01];
        ac3.extend_from_slice(&[0x0B, 0x77]);
        data.extend_from_slice(&pes_packet(PRIVATE_STREAM_1, PesTimestamps::None, &ac3));

        let mut demuxer = PSDemuxer::new(std::io::Cursor::new(data));
        let video = demuxer.read_packet().await.unwrap();
        assert_eq!(video.data.as_ref(), &[1, 2]);
        assert_eq!(video.pts, Some(3600 * 300));
        assert_eq!(video.stream_index, 0);

        let audio = demuxer.read_packet().await.unwrap();
        assert_eq!(audio.data.as_ref(), &[0x0B, 0x77]);
        assert_eq!(audio.stream_index, 1);

        let streams = demuxer.streams().await.unwrap();
        assert_eq!(streams[1].stream_type(), StreamType::Ac3);
        assert!(demuxer.read_packet().await.is_err());
    }
}
