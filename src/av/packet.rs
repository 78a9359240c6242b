use bytes::Bytes;

/// One access unit handed to the muxer.
///
/// Timestamps are 27 MHz ticks; see [`crate::av::timestamp`].
#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Bytes,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub stream_index: usize,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            stream_index: 0,
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }
}
