use crate::error::{RemuxError, Result};

/// Byte source/sink shared between the PES parser and the pack writers.
///
/// Offsets passed to [`peek`](RingBuffer::peek) and
/// [`find_header`](RingBuffer::find_header) are relative to the current read
/// position. A single writer and a single reader use one instance at a time.
pub trait RingBuffer {
    /// Copies `dst.len()` bytes starting `offset` bytes past the read position
    /// without consuming them.
    fn peek(&self, dst: &mut [u8], offset: usize) -> Result<()>;

    /// Copies and consumes exactly `dst.len()` bytes.
    fn read(&mut self, dst: &mut [u8]) -> Result<usize>;

    /// Appends all of `src`, failing without writing anything on overflow.
    fn write(&mut self, src: &[u8]) -> Result<()>;

    /// Absolute number of bytes ever written.
    fn write_position(&self) -> u64;

    /// Bytes currently buffered.
    fn available(&self) -> usize;

    /// Locates `00 00 01 <code>` starting within `[offset, offset + limit)`.
    ///
    /// Returns the offset of the first start-code byte. If the window ends
    /// inside a partial match, or the whole start code is not buffered yet,
    /// the result is [`RemuxError::Incomplete`]; otherwise
    /// [`RemuxError::SyncNotFound`].
    fn find_header(&self, code: u8, offset: usize, limit: usize) -> Result<usize> {
        let mut window = [0u8; 4];
        let mut partial = false;
        for start in offset..offset.saturating_add(limit) {
            if start >= self.available() {
                return Err(if partial || start == offset {
                    RemuxError::Incomplete
                } else {
                    RemuxError::SyncNotFound
                });
            }
            let have = (self.available() - start).min(4);
            self.peek(&mut window[..have], start)?;
            let pattern = [0x00, 0x00, 0x01, code];
            if window[..have] == pattern[..have] {
                if have == 4 {
                    return Ok(start);
                }
                partial = true;
            }
        }
        Err(if partial {
            RemuxError::Incomplete
        } else {
            RemuxError::SyncNotFound
        })
    }
}

/// Fixed-capacity byte ring.
#[derive(Debug)]
pub struct ByteRing {
    data: Vec<u8>,
    read_pos: usize,
    len: usize,
    written: u64,
}

impl ByteRing {
    /// Creates an empty ring able to hold `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            read_pos: 0,
            len: 0,
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn free(&self) -> usize {
        self.data.len() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops `n` buffered bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.len {
            return Err(RemuxError::BufferUnderflow(format!(
                "cannot skip {} of {} buffered bytes",
                n, self.len
            )));
        }
        self.read_pos = (self.read_pos + n) % self.capacity().max(1);
        self.len -= n;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }

    fn copy_out(&self, dst: &mut [u8], offset: usize) {
        let cap = self.capacity();
        let start = (self.read_pos + offset) % cap;
        let first = dst.len().min(cap - start);
        dst[..first].copy_from_slice(&self.data[start..start + first]);
        let rest = dst.len() - first;
        dst[first..].copy_from_slice(&self.data[..rest]);
    }
}

impl RingBuffer for ByteRing {
    fn peek(&self, dst: &mut [u8], offset: usize) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        if offset + dst.len() > self.len {
            return Err(RemuxError::BufferUnderflow(format!(
                "peek of {} bytes at {} with {} buffered",
                dst.len(),
                offset,
                self.len
            )));
        }
        self.copy_out(dst, offset);
        Ok(())
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.peek(dst, 0)?;
        self.skip(dst.len())?;
        Ok(dst.len())
    }

    fn write(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.free() {
            return Err(RemuxError::BufferOverflow(format!(
                "{} bytes do not fit, {} of {} free",
                src.len(),
                self.free(),
                self.capacity()
            )));
        }
        let cap = self.capacity();
        if cap == 0 {
            return Ok(());
        }
        let start = (self.read_pos + self.len) % cap;
        let first = src.len().min(cap - start);
        self.data[start..start + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        self.data[..rest].copy_from_slice(&src[first..]);
        self.len += src.len();
        self.written += src.len() as u64;
        Ok(())
    }

    fn write_position(&self) -> u64 {
        self.written
    }

    fn available(&self) -> usize {
        self.len
    }
}

/// Read-only source over a flat buffer.
///
/// Lets the sync search and the pack writers work on a plain slice. Writes
/// always overflow.
#[derive(Debug, Clone, Copy)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }
}

impl RingBuffer for SliceSource<'_> {
    fn peek(&self, dst: &mut [u8], offset: usize) -> Result<()> {
        let start = self.pos + offset;
        let Some(src) = self.data.get(start..start + dst.len()) else {
            return Err(RemuxError::BufferUnderflow(format!(
                "peek of {} bytes at {} with {} left",
                dst.len(),
                offset,
                self.available()
            )));
        };
        dst.copy_from_slice(src);
        Ok(())
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.peek(dst, 0)?;
        self.pos += dst.len();
        Ok(dst.len())
    }

    fn write(&mut self, src: &[u8]) -> Result<()> {
        Err(RemuxError::BufferOverflow(format!(
            "{} bytes written to a read-only slice",
            src.len()
        )))
    }

    fn write_position(&self) -> u64 {
        self.data.len() as u64
    }

    fn available(&self) -> usize {
        self.data.len() - self.pos
    }
}
