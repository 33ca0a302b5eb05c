use crate::error::Error::*;
use crate::error::*;

/// Reads an unsigned LEB128 integer of at most `bits` bits starting at `*pc`.
/// On success `*pc` points past the last byte consumed.
#[inline]
pub fn safe_read_leb128<T>(bytes: &[u8], pc: &mut usize, bits: u32) -> Result<T, Error>
where T: TryFrom<u64> {
    let max_len = bits.div_ceil(7) as usize;
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut end = *pc;
    for i in 0..max_len {
        let byte = *bytes.get(end).ok_or(Malformed(UNEXPECTED_END))?;
        end += 1;
        if i == max_len - 1 {
            if byte & 0x80 != 0 { return Err(Malformed(INT_TOO_LONG)); }
            let valid = bits - shift;
            if valid < 7 && (byte & 0x7f) >> valid != 0 { return Err(Malformed(INT_TOO_LARGE)); }
        }
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            *pc = end;
            return T::try_from(result).map_err(|_| Malformed(INT_TOO_LARGE));
        }
        shift += 7;
    }
    Err(Malformed(INT_TOO_LONG))
}

/// Reads a signed LEB128 integer of at most `bits` bits starting at `*pc`.
#[inline]
pub fn safe_read_sleb128<T>(bytes: &[u8], pc: &mut usize, bits: u32) -> Result<T, Error>
where T: TryFrom<i64> {
    let max_len = bits.div_ceil(7) as usize;
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut end = *pc;
    for i in 0..max_len {
        let byte = *bytes.get(end).ok_or(Malformed(UNEXPECTED_END))?;
        end += 1;
        if i == max_len - 1 {
            if byte & 0x80 != 0 { return Err(Malformed(INT_TOO_LONG)); }
            // The unused high bits must all repeat the sign bit
            let valid = bits - shift;
            let ext = (byte & 0x7f) >> (valid - 1);
            if ext != 0 && ext != 0x7f >> (valid - 1) { return Err(Malformed(INT_TOO_LARGE)); }
        }
        result |= ((byte & 0x7f) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= !0i64 << shift;
            }
            *pc = end;
            return T::try_from(result).map_err(|_| Malformed(INT_TOO_LARGE));
        }
    }
    Err(Malformed(INT_TOO_LONG))
}

pub fn write_leb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_sleb128(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
