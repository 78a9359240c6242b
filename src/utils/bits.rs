use crate::error::{RemuxError, Result};

/// A big-endian bit reader over a byte slice.
///
/// MPEG-2 video headers are bit-packed without byte alignment; fields such as
/// the quantiser matrices start one bit before a byte boundary. Reading them
/// through this reader avoids any byte-punning.
///
/// Running off the end of the slice reports [`RemuxError::Incomplete`], so a
/// caller peeking a header from a partially filled buffer can simply retry.
///
/// Example:
/// ```
/// use psremux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_flag().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit, true for 1.
    pub fn read_flag(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(RemuxError::Incomplete);
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits (n <= 32) as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(RemuxError::InvalidData(format!(
                "cannot read {} bits at once",
                n
            )));
        }
        if (n as usize) > self.available_bits() {
            return Err(RemuxError::Incomplete);
        }

        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_flag()? as u32;
        }
        Ok(value)
    }

    /// Reads eight bits regardless of alignment.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Fills `dst` with consecutive unaligned bytes.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() * 8 > self.available_bits() {
            return Err(RemuxError::Incomplete);
        }
        for byte in dst.iter_mut() {
            *byte = self.read_u8()?;
        }
        Ok(())
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if (n as usize) > self.available_bits() {
            return Err(RemuxError::Incomplete);
        }
        let total = self.bit_offset as usize + n as usize;
        self.byte_offset += total / 8;
        self.bit_offset = (total % 8) as u8;
        Ok(())
    }

    /// Number of whole or partial bytes touched so far.
    pub fn bytes_consumed(&self) -> usize {
        self.byte_offset + usize::from(self.bit_offset != 0)
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len() - self.byte_offset) * 8 - self.bit_offset as usize
    }
}
