use crate::error::DecodeError;

/// A cursor over a byte slice that reads big-endian integers and fixed-size arrays.
///
/// Every read names the field it is decoding so a short buffer is reported as
/// [`DecodeError::TruncatedInput`] with the field, the offset and how much was missing.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, cursor: 0 }
    }

    pub fn offset(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    pub fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if remaining < len {
            return Err(DecodeError::TruncatedInput {
                field,
                offset: self.cursor,
                needed: len,
                remaining,
            });
        }

        let start = self.cursor;
        self.cursor += len;
        Ok(&self.bytes[start..self.cursor])
    }

    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, field)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        self.read_array::<1>(field).map(|[b]| b)
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        self.read_array(field).map(u16::from_be_bytes)
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        self.read_array(field).map(u32::from_be_bytes)
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        self.read_array(field).map(u64::from_be_bytes)
    }

    /// Consumes everything that is left.
    pub fn rest(&mut self) -> &'a [u8] {
        let start = self.cursor.min(self.bytes.len());
        self.cursor = self.bytes.len();
        &self.bytes[start..]
    }

    /// Fails with [`DecodeError::TrailingBytes`] unless the input was fully consumed.
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}
