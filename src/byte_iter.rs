use crate::error::*;
use crate::leb128::{safe_read_leb128, safe_read_sleb128};

/// Bounds-checked cursor over a module's bytes.
#[derive(Clone, Copy)]
pub struct ByteIter<'a> {
    pub bytes: &'a [u8],
    pub idx: usize,
}

impl<'a> ByteIter<'a> {
    #[inline]
    pub fn new(bytes: &'a [u8], idx: usize) -> Self { Self { bytes, idx } }
    #[inline]
    pub fn empty(&self) -> bool { self.idx >= self.bytes.len() }
    #[inline]
    pub fn has_n_left(&self, n: usize) -> bool { self.idx.checked_add(n).is_some_and(|end| end <= self.bytes.len()) }
    #[inline]
    pub fn cur(&self) -> usize { self.idx }
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let b = *self.bytes.get(self.idx).ok_or(Error::Malformed(UNEXPECTED_END))?;
        self.idx += 1;
        Ok(b)
    }
    #[inline]
    pub fn peek_u8(&self) -> Result<u8, Error> {
        self.bytes.get(self.idx).copied().ok_or(Error::Malformed(UNEXPECTED_END))
    }
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, Error> { safe_read_leb128(self.bytes, &mut self.idx, 32) }
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, Error> { safe_read_sleb128(self.bytes, &mut self.idx, 32) }
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64, Error> { safe_read_sleb128(self.bytes, &mut self.idx, 64) }
    /// Block types are signed 33-bit so that type indices and value types share an encoding.
    #[inline]
    pub fn read_s33(&mut self) -> Result<i64, Error> { safe_read_sleb128(self.bytes, &mut self.idx, 33) }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if !self.has_n_left(len) { return Err(Error::Malformed(UNEXPECTED_END)); }
        let slice = &self.bytes[self.idx..self.idx + len];
        self.idx += len;
        Ok(slice)
    }

    pub fn read_f32_bits(&mut self) -> Result<u32, Error> {
        let raw = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn read_f64_bits(&mut self) -> Result<u64, Error> {
        let raw = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    /// Length-prefixed byte vector.
    pub fn read_vec_bytes(&mut self) -> Result<&'a [u8], Error> {
        let len = self.read_u32()? as usize;
        if !self.has_n_left(len) { return Err(Error::Malformed(LENGTH_OUT_OF_BOUNDS)); }
        self.read_bytes(len)
    }

    pub fn read_name(&mut self) -> Result<String, Error> {
        let raw = self.read_vec_bytes()?;
        match std::str::from_utf8(raw) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => malformed(INVALID_UTF8),
        }
    }

    /// Reads a vector count, rejecting counts that could not possibly fit in
    /// the remaining bytes (each element takes at least `min_elem_size`).
    pub fn read_count(&mut self, min_elem_size: usize) -> Result<u32, Error> {
        let n = self.read_u32()?;
        let remaining = self.bytes.len() - self.idx.min(self.bytes.len());
        if (n as usize).saturating_mul(min_elem_size) > remaining { return malformed(UNEXPECTED_END); }
        Ok(n)
    }
}
