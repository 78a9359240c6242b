use super::pes::{write_pes_header, PESHeader, PesTimestamps};
use super::types::*;
use crate::av::timestamp::{PtsDisplay, CLOCK_HZ};
use crate::av::{CodecData, Packet, StreamType};
use crate::config::{self, MuxConfig, MAX_PACK_SIZE, MIN_PACK_SIZE};
use crate::error::{RemuxError, Result};
use crate::format::Muxer;
use crate::utils::{ByteRing, RingBuffer};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use log::{debug, error, info};
use std::collections::VecDeque;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Payload of the PCI packet in a navigation pack.
const NAV_PCI_LEN: usize = 0x3D4;
/// Payload of the DSI packet in a navigation pack.
const NAV_DSI_LEN: usize = 0x3FA;
const NAV_PCI_SUBSTREAM: u8 = 0x00;
const NAV_DSI_SUBSTREAM: u8 = 0x01;

/// Extra data for an AC-3 pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3PackInfo {
    /// Frames starting in this pack
    pub frames: u8,
    /// Offset of the first frame start, counted from the last descriptor byte
    pub first_frame_offset: u16,
    /// Bytes per AC-3 frame
    pub frame_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PesLayout {
    /// Pack header plus PES packet, before any trailing padding
    length: usize,
    stuffing: usize,
}

/// Writes fixed-size packs, each carrying one PES packet of a single stream.
///
/// Every pack written is exactly `pack_size` bytes: a short payload is either
/// stuffed inside the PES header or followed by a padding packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackWriter {
    pack_size: usize,
    mux_rate: u32,
}

impl PackWriter {
    pub fn new(pack_size: usize, mux_rate: u32) -> Result<Self> {
        if !(MIN_PACK_SIZE..=MAX_PACK_SIZE).contains(&pack_size) {
            return Err(RemuxError::Config(format!(
                "pack size {} outside {}..={}",
                pack_size, MIN_PACK_SIZE, MAX_PACK_SIZE
            )));
        }
        if mux_rate == 0 || mux_rate / 50 > 0x3F_FFFF {
            return Err(RemuxError::Config(format!("invalid mux rate {}", mux_rate)));
        }
        Ok(Self {
            pack_size,
            mux_rate,
        })
    }

    pub fn from_config(config: &MuxConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.pack_size, config.mux_rate)
    }

    pub fn pack_size(&self) -> usize {
        self.pack_size
    }

    pub fn mux_rate(&self) -> u32 {
        self.mux_rate
    }

    /// SCR advance for one pack at the mux rate, in 27 MHz ticks.
    pub fn scr_increment(&self) -> u64 {
        self.pack_size as u64 * CLOCK_HZ / u64::from(self.mux_rate)
    }

    /// Bytes in front of the payload: pack header, PES header and `extra`.
    fn overhead(timestamps: TimestampFlags, extra: usize) -> usize {
        PS_HEADER_LEN + PES_HEADER_MIN + timestamps.len() + extra
    }

    fn layout(&self, payload: usize, overhead: usize) -> PesLayout {
        let size = self.pack_size;
        if payload + overhead >= size {
            PesLayout {
                length: size,
                stuffing: 0,
            }
        } else if size - payload - overhead <= PES_MIN {
            PesLayout {
                length: size,
                stuffing: size - payload - overhead,
            }
        } else {
            PesLayout {
                length: payload + overhead,
                stuffing: 0,
            }
        }
    }

    /// Payload bytes a pack would carry for `available` buffered bytes.
    pub fn payload_capacity(&self, available: usize, timestamps: TimestampFlags, extra: usize) -> usize {
        let overhead = Self::overhead(timestamps, extra);
        let layout = self.layout(available, overhead);
        layout.length - overhead - layout.stuffing
    }

    #[allow(clippy::too_many_arguments)]
    fn emit<R: RingBuffer>(
        &self,
        buf: &mut BytesMut,
        scr: u64,
        stream_id: u8,
        timestamps: PesTimestamps,
        layout: PesLayout,
        descriptor: Option<[u8; AC3_DESCRIPTOR_LEN]>,
        ring: &mut R,
    ) -> Result<usize> {
        let start = buf.len();
        let result = self.emit_inner(buf, start, scr, stream_id, timestamps, layout, descriptor, ring);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_inner<R: RingBuffer>(
        &self,
        buf: &mut BytesMut,
        start: usize,
        scr: u64,
        stream_id: u8,
        timestamps: PesTimestamps,
        layout: PesLayout,
        descriptor: Option<[u8; AC3_DESCRIPTOR_LEN]>,
        ring: &mut R,
    ) -> Result<usize> {
        let header_len = write_ps_header(buf, scr, self.mux_rate, None)?;
        write_pes_header(
            buf,
            stream_id,
            layout.length - header_len,
            timestamps,
            layout.stuffing,
        )?;
        if let Some(descriptor) = descriptor {
            buf.put_slice(&descriptor);
        }

        let draw = layout.length - (buf.len() - start);
        let at = buf.len();
        buf.resize(at + draw, 0);
        ring.read(&mut buf[at..])?;

        let pos = buf.len() - start;
        if pos + PES_MIN < self.pack_size {
            PESHeader::padding(self.pack_size - pos).write_to(buf)?;
        }

        let written = buf.len() - start;
        if written != self.pack_size {
            error!(
                "pack for stream 0x{:02x} is {} bytes, expected {}",
                stream_id, written, self.pack_size
            );
            return Err(RemuxError::PackSize {
                written,
                expected: self.pack_size,
            });
        }
        Ok(draw)
    }

    fn check_available<R: RingBuffer>(length: usize, ring: &R) -> Result<()> {
        if length > ring.available() {
            return Err(RemuxError::BufferUnderflow(format!(
                "{} payload bytes requested, {} buffered",
                length,
                ring.available()
            )));
        }
        Ok(())
    }

    /// Writes one video pack from the first `length` bytes of `ring` and
    /// returns the payload bytes consumed.
    pub fn write_video_pack<R: RingBuffer>(
        &self,
        buf: &mut BytesMut,
        scr: u64,
        timestamps: PesTimestamps,
        length: usize,
        ring: &mut R,
    ) -> Result<usize> {
        if length == 0 {
            return Ok(0);
        }
        Self::check_available(length, ring)?;
        let layout = self.layout(length, Self::overhead(timestamps.flags(), 0));
        self.emit(buf, scr, VIDEO_STREAM_FIRST, timestamps, layout, None, ring)
    }

    /// Writes one MPEG audio pack for audio stream `n`.
    pub fn write_audio_pack<R: RingBuffer>(
        &self,
        buf: &mut BytesMut,
        scr: u64,
        n: u8,
        pts: Option<u64>,
        length: usize,
        ring: &mut R,
    ) -> Result<usize> {
        if length == 0 {
            return Ok(0);
        }
        Self::check_available(length, ring)?;
        let timestamps = pts.map_or(PesTimestamps::None, PesTimestamps::Pts);
        let layout = self.layout(length, Self::overhead(timestamps.flags(), 0));
        self.emit(buf, scr, AUDIO_STREAM_FIRST + n, timestamps, layout, None, ring)
    }

    /// Writes one AC-3 pack for sub-stream `n` inside private stream 1.
    ///
    /// When the bytes left over after this pack are exactly one frame, the
    /// last counted frame does not start here and `frames` is reduced by one.
    #[allow(clippy::too_many_arguments)]
    pub fn write_ac3_pack<R: RingBuffer>(
        &self,
        buf: &mut BytesMut,
        scr: u64,
        n: u8,
        pts: Option<u64>,
        info: Ac3PackInfo,
        length: usize,
        ring: &mut R,
    ) -> Result<usize> {
        if length == 0 {
            return Ok(0);
        }
        Self::check_available(length, ring)?;
        let timestamps = pts.map_or(PesTimestamps::None, PesTimestamps::Pts);
        let overhead = Self::overhead(timestamps.flags(), AC3_DESCRIPTOR_LEN);
        let layout = self.layout(length, overhead);

        let mut frames = info.frames;
        if length + overhead >= self.pack_size
            && length + overhead - self.pack_size == info.frame_length
        {
            frames = frames.saturating_sub(1);
        }
        let descriptor = [
            AC3_SUBSTREAM_FIRST + n,
            frames,
            (info.first_frame_offset >> 8) as u8,
            info.first_frame_offset as u8,
        ];
        self.emit(
            buf,
            scr,
            PRIVATE_STREAM_1,
            timestamps,
            layout,
            Some(descriptor),
            ring,
        )
    }

    /// Writes a pack holding only padding.
    pub fn write_padding_pack(&self, buf: &mut BytesMut, scr: u64) -> Result<()> {
        let start = buf.len();
        let pos = write_ps_header(buf, scr, self.mux_rate, None)?;
        if let Err(e) = PESHeader::padding(self.pack_size - pos).write_to(buf) {
            buf.truncate(start);
            return Err(e);
        }
        Ok(())
    }

    /// Writes a DVD navigation pack: system header, then PCI and DSI packets
    /// in private stream 2 with zeroed bodies.
    pub fn write_nav_pack(&self, buf: &mut BytesMut, scr: u64, audio_bound: u8) -> Result<()> {
        if self.pack_size != DVD_PACK_SIZE {
            return Err(RemuxError::InvalidData(format!(
                "navigation packs need {} byte packs, configured {}",
                DVD_PACK_SIZE, self.pack_size
            )));
        }
        let start = buf.len();
        let system = SystemHeader::navigation(self.mux_rate, audio_bound);
        if let Err(e) = write_ps_header(buf, scr, self.mux_rate, Some(&system)) {
            buf.truncate(start);
            return Err(e);
        }
        for (substream, len) in [(NAV_PCI_SUBSTREAM, NAV_PCI_LEN), (NAV_DSI_SUBSTREAM, NAV_DSI_LEN)] {
            PESHeader::new(PRIVATE_STREAM_2, len + 6).write_to(buf)?;
            buf.put_u8(substream);
            buf.put_bytes(0, len - 1);
        }
        Ok(())
    }
}

/// Start of an access unit in a staging ring.
#[derive(Debug, Clone, Copy)]
struct AccessUnit {
    /// Absolute ring position of its first byte
    pos: u64,
    pts: Option<u64>,
    dts: Option<u64>,
}

#[derive(Debug)]
struct MuxStream {
    stream_type: StreamType,
    /// Number among streams of the same kind
    number: u8,
    ring: ByteRing,
    units: VecDeque<AccessUnit>,
    /// Size of the last access unit, the AC-3 frame length
    last_unit_len: usize,
}

impl MuxStream {
    fn read_pos(&self) -> u64 {
        self.ring.write_position() - self.ring.available() as u64
    }

    /// First access unit starting within `len` bytes of the read position.
    fn unit_in(&self, len: usize) -> Option<AccessUnit> {
        let start = self.read_pos();
        self.units
            .iter()
            .find(|u| u.pos >= start && u.pos < start + len as u64)
            .copied()
    }

    fn drop_units_before(&mut self, pos: u64) {
        while self.units.front().is_some_and(|u| u.pos < pos) {
            self.units.pop_front();
        }
    }
}

/// Program stream muxer.
///
/// Access units are staged per stream and written out as fixed-size packs
/// whenever a stream has a full pack buffered; the trailer drains what is
/// left. Each pack takes its timestamps from the first access unit that
/// starts inside it.
pub struct PSMuxer<W: AsyncWrite + Unpin + Send> {
    stream_writer: tokio::io::BufWriter<W>,
    packer: PackWriter,
    config: MuxConfig,
    streams: Vec<MuxStream>,
    scr: u64,
    packs_written: u64,
    header_written: bool,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin + Send> PSMuxer<W> {
    /// Creates a muxer using the process-wide configuration.
    pub fn new(writer: W) -> Result<Self> {
        Self::with_config(writer, config::current())
    }

    pub fn with_config(writer: W, config: MuxConfig) -> Result<Self> {
        let packer = PackWriter::from_config(&config)?;
        Ok(Self {
            stream_writer: tokio::io::BufWriter::new(writer),
            packer,
            buf: BytesMut::with_capacity(config.pack_size),
            config,
            streams: Vec::new(),
            scr: 0,
            packs_written: 0,
            header_written: false,
        })
    }

    /// Sets the SCR of the next pack.
    pub fn set_scr(&mut self, scr: u64) {
        self.scr = scr;
    }

    pub fn scr(&self) -> u64 {
        self.scr
    }

    pub fn packs_written(&self) -> u64 {
        self.packs_written
    }

    /// Registers a stream and returns its index for [`Packet::stream_index`].
    pub fn add_stream(&mut self, codec: Box<dyn CodecData>) -> Result<usize> {
        self.register(codec.stream_type(), codec.bit_rate())
    }

    fn register(&mut self, stream_type: StreamType, bit_rate: u32) -> Result<usize> {
        if self.header_written {
            return Err(RemuxError::InvalidData(
                "streams must be added before the header".into(),
            ));
        }
        let number = self
            .streams
            .iter()
            .filter(|s| s.stream_type == stream_type)
            .count();
        let limit = match stream_type {
            StreamType::Video => 1,
            StreamType::MpegAudio => usize::from(AUDIO_STREAM_LAST - AUDIO_STREAM_FIRST) + 1,
            StreamType::Ac3 => 8,
        };
        if number >= limit {
            return Err(RemuxError::InvalidData(format!(
                "too many {:?} streams",
                stream_type
            )));
        }
        let capacity = match stream_type {
            StreamType::Video => self.config.video_buffer_size,
            _ => self.config.audio_buffer_size,
        };
        debug!(
            "stream {}: {:?} #{} at {} bit/s",
            self.streams.len(),
            stream_type,
            number,
            bit_rate
        );
        self.streams.push(MuxStream {
            stream_type,
            number: number as u8,
            ring: ByteRing::new(capacity),
            units: VecDeque::new(),
            last_unit_len: 0,
        });
        Ok(self.streams.len() - 1)
    }

    fn audio_bound(&self) -> u8 {
        self.streams.iter().filter(|s| s.stream_type.is_audio()).count() as u8
    }

    async fn write_buffered_pack(&mut self) -> Result<()> {
        self.stream_writer.write_all(&self.buf).await?;
        self.buf.clear();
        self.scr += self.packer.scr_increment();
        self.packs_written += 1;
        Ok(())
    }

    /// Writes one pack of stream `index`, drawing at most the buffered bytes.
    async fn write_stream_pack(&mut self, index: usize) -> Result<usize> {
        let stream = &mut self.streams[index];
        let available = stream.ring.available();
        if available == 0 {
            return Ok(0);
        }
        let extra = if stream.stream_type == StreamType::Ac3 {
            AC3_DESCRIPTOR_LEN
        } else {
            0
        };
        let read_pos = stream.read_pos();
        let untimed = self
            .packer
            .payload_capacity(available, TimestampFlags::None, extra);
        let timestamps = match stream.unit_in(untimed) {
            Some(unit) => {
                let timestamps = match (unit.pts, unit.dts) {
                    (Some(pts), Some(dts))
                        if dts != pts && stream.stream_type == StreamType::Video =>
                    {
                        PesTimestamps::PtsDts { pts, dts }
                    }
                    (Some(pts), _) => PesTimestamps::Pts(pts),
                    _ => PesTimestamps::None,
                };
                // A unit starting in the bytes the timestamp field would
                // displace goes out untimed.
                let capacity = self
                    .packer
                    .payload_capacity(available, timestamps.flags(), extra);
                if unit.pos < read_pos + capacity as u64 {
                    timestamps
                } else {
                    PesTimestamps::None
                }
            }
            None => PesTimestamps::None,
        };
        let capacity = self
            .packer
            .payload_capacity(available, timestamps.flags(), extra) as u64;

        let drawn = match stream.stream_type {
            StreamType::Video => self.packer.write_video_pack(
                &mut self.buf,
                self.scr,
                timestamps,
                available,
                &mut stream.ring,
            )?,
            StreamType::MpegAudio => self.packer.write_audio_pack(
                &mut self.buf,
                self.scr,
                stream.number,
                timestamps.pts(),
                available,
                &mut stream.ring,
            )?,
            StreamType::Ac3 => {
                let end = read_pos + capacity;
                let frames = stream
                    .units
                    .iter()
                    .filter(|u| u.pos >= read_pos && u.pos <= end)
                    .count();
                let first_frame_offset = stream
                    .units
                    .iter()
                    .find(|u| u.pos >= read_pos && u.pos < end)
                    .map_or(0, |u| (u.pos - read_pos + 1) as u16);
                let info = Ac3PackInfo {
                    frames: frames.min(usize::from(u8::MAX)) as u8,
                    first_frame_offset,
                    frame_length: stream.last_unit_len,
                };
                self.packer.write_ac3_pack(
                    &mut self.buf,
                    self.scr,
                    stream.number,
                    timestamps.pts(),
                    info,
                    available,
                    &mut stream.ring,
                )?
            }
        };
        stream.drop_units_before(read_pos + drawn as u64);
        self.write_buffered_pack().await?;
        Ok(drawn)
    }

    /// Drains stream `index` while a full pack is buffered, or completely
    /// when `all` is set.
    async fn drain_stream(&mut self, index: usize, all: bool) -> Result<()> {
        loop {
            let available = self.streams[index].ring.available();
            if available == 0 || (!all && available < self.packer.pack_size()) {
                return Ok(());
            }
            self.write_stream_pack(index).await?;
        }
    }

    /// Writes a padding pack, for rate filling.
    pub async fn write_padding(&mut self) -> Result<()> {
        self.packer.write_padding_pack(&mut self.buf, self.scr)?;
        self.write_buffered_pack().await
    }

    /// Writes a navigation pack.
    pub async fn write_navigation(&mut self) -> Result<()> {
        let audio_bound = self.audio_bound();
        self.packer.write_nav_pack(&mut self.buf, self.scr, audio_bound)?;
        self.write_buffered_pack().await
    }

    pub fn into_inner(self) -> W {
        self.stream_writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Muxer for PSMuxer<W> {
    async fn write_header(&mut self, streams: &[Box<dyn CodecData>]) -> Result<()> {
        for codec in streams {
            self.register(codec.stream_type(), codec.bit_rate())?;
        }
        if self.streams.is_empty() {
            return Err(RemuxError::InvalidData("no streams to mux".into()));
        }
        self.header_written = true;
        info!(
            "PS muxer: {} streams, {} byte packs at {} bytes/s",
            self.streams.len(),
            self.packer.pack_size(),
            self.packer.mux_rate()
        );
        if self.config.navigation_packs {
            self.write_navigation().await?;
        }
        Ok(())
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        if !self.header_written {
            return Err(RemuxError::InvalidData("write_header was not called".into()));
        }
        let index = packet.stream_index;
        let Some(stream) = self.streams.get_mut(index) else {
            return Err(RemuxError::InvalidData(format!("unknown stream {}", index)));
        };

        if packet.data.len() > stream.ring.free() {
            error!(
                "staging buffer overflow on stream {}: {} bytes, {} free",
                index,
                packet.data.len(),
                stream.ring.free()
            );
        }
        let pos = stream.ring.write_position();
        stream.ring.write(&packet.data)?;
        if !packet.data.is_empty() {
            stream.units.push_back(AccessUnit {
                pos,
                pts: packet.pts,
                dts: packet.dts,
            });
            stream.last_unit_len = packet.data.len();
        }
        if let Some(pts) = packet.pts {
            debug!("stream {} unit at {} pts {}", index, pos, PtsDisplay(pts as i64));
        }
        self.drain_stream(index, false).await
    }

    async fn write_trailer(&mut self) -> Result<()> {
        for index in 0..self.streams.len() {
            self.drain_stream(index, true).await?;
        }
        self.stream_writer
            .write_all(&[0x00, 0x00, 0x01, PROGRAM_END_CODE])
            .await?;
        self.stream_writer.flush().await?;
        info!("PS muxer: wrote {} packs", self.packs_written);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.stream_writer.flush().await?;
        Ok(())
    }
}
