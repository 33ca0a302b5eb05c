use crate::error::Trap;

macro_rules! impl_unsigned {
    ($type:ty, $size:literal, $load_name:ident, $store_name:ident) => {
        #[inline(always)]
        pub fn $load_name(&self, ptr: u32, offset: u32) -> Result<$type, Trap> {
            let addr = self.effective_addr(ptr, offset, $size)?;
            let mut buf = [0u8; $size];
            buf.copy_from_slice(&self.data[addr..addr + $size]);
            Ok(<$type>::from_le_bytes(buf))
        }
        #[inline(always)]
        pub fn $store_name(&mut self, ptr: u32, offset: u32, v: $type) -> Result<(), Trap> {
            let addr = self.effective_addr(ptr, offset, $size)?;
            self.data[addr..addr + $size].copy_from_slice(&v.to_le_bytes());
            Ok(())
        }
    };
}

macro_rules! impl_signed_load {
    ($name:ident, $target:ty, $source:ident) => {
        #[inline(always)]
        pub fn $name(&self, ptr: u32, offset: u32) -> Result<$target, Trap> {
            Ok(self.$source(ptr, offset)? as $target)
        }
    };
}

/// Linear memory: a zero-initialised byte array measured in 64KiB pages.
/// It can grow up to its maximum but never shrinks.
pub struct WasmMemory {
    data: Vec<u8>,
    current: u32,
    maximum: u32,
    declared_max: Option<u32>,
}

impl std::fmt::Debug for WasmMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmMemory")
            .field("pages", &self.current)
            .field("maximum", &self.maximum)
            .finish()
    }
}

impl WasmMemory {
    pub const MAX_PAGES: u32 = 65536;
    pub const PAGE_SIZE: u32 = 65536;

    /// Fails with [`Trap::OutOfMemory`] when the initial pages cannot be allocated.
    pub fn new(initial: u32, maximum: Option<u32>) -> Result<Self, Trap> {
        let current = initial.min(Self::MAX_PAGES);
        let mut data = Vec::new();
        reserve_zeroed(&mut data, Self::byte_len(current))?;
        Ok(Self {
            data,
            current,
            maximum: maximum.unwrap_or(Self::MAX_PAGES).min(Self::MAX_PAGES),
            declared_max: maximum,
        })
    }

    fn byte_len(pages: u32) -> usize { (pages as usize) * (Self::PAGE_SIZE as usize) }

    /// Current size in pages.
    pub fn size(&self) -> u32 { self.current }
    /// Largest size in pages this memory may grow to.
    pub fn max(&self) -> u32 { self.maximum }
    /// The maximum the memory was created with, if any.
    pub fn declared_max(&self) -> Option<u32> { self.declared_max }
    pub fn data(&self) -> &[u8] { &self.data }

    /// Grows by `delta` pages and returns the previous size. Fails without
    /// changing anything when the result would exceed the maximum or the
    /// pages cannot be allocated.
    pub fn grow(&mut self, delta: u32) -> Result<u32, Trap> {
        if delta > self.maximum.saturating_sub(self.current) { return Err(Trap::OutOfMemory); }
        let old = self.current;
        reserve_zeroed(&mut self.data, Self::byte_len(old + delta))?;
        self.current = old + delta;
        Ok(old)
    }

    #[inline(always)]
    fn effective_addr(&self, ptr: u32, offset: u32, size: usize) -> Result<usize, Trap> {
        let addr = (ptr as usize).checked_add(offset as usize).ok_or(Trap::MemoryOutOfBounds)?;
        if addr.saturating_add(size) > self.data.len() { return Err(Trap::MemoryOutOfBounds); }
        Ok(addr)
    }

    impl_unsigned!(u8,  1, load_u8, store_u8);    impl_unsigned!(u16, 2, load_u16, store_u16);
    impl_unsigned!(u32, 4, load_u32, store_u32);  impl_unsigned!(u64, 8, load_u64, store_u64);
    impl_signed_load!(load_i8,  i8,  load_u8);    impl_signed_load!(load_i16, i16, load_u16);
    impl_signed_load!(load_i32, i32, load_u32);

    #[inline(always)]
    pub fn load_f32(&self, ptr: u32, offset: u32) -> Result<f32, Trap> {
        Ok(f32::from_bits(self.load_u32(ptr, offset)?))
    }
    #[inline(always)]
    pub fn store_f32(&mut self, ptr: u32, offset: u32, v: f32) -> Result<(), Trap> {
        self.store_u32(ptr, offset, v.to_bits())
    }
    #[inline(always)]
    pub fn load_f64(&self, ptr: u32, offset: u32) -> Result<f64, Trap> {
        Ok(f64::from_bits(self.load_u64(ptr, offset)?))
    }
    #[inline(always)]
    pub fn store_f64(&mut self, ptr: u32, offset: u32, v: f64) -> Result<(), Trap> {
        self.store_u64(ptr, offset, v.to_bits())
    }

    /// Copies `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), Trap> {
        let start = self.effective_addr(offset, 0, buf.len())?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    pub fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Trap> {
        let start = self.effective_addr(offset, 0, bytes.len())?;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Whether `len` bytes starting at `offset` lie inside the memory.
    pub(crate) fn fits(&self, offset: u32, len: usize) -> bool {
        self.effective_addr(offset, 0, len).is_ok()
    }
}

/// Extends `data` with zeros up to `len` bytes, reporting allocation failure
/// instead of aborting.
pub(crate) fn reserve_zeroed<T: Clone + Default>(data: &mut Vec<T>, len: usize) -> Result<(), Trap> {
    let extra = len.saturating_sub(data.len());
    data.try_reserve_exact(extra).map_err(|_| Trap::OutOfMemory)?;
    data.resize(len, T::default());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_access() {
        let mut mem = WasmMemory::new(1, None).unwrap();
        mem.store_u32(0, 4, 0x1122_3344).unwrap();
        assert_eq!(mem.load_u8(4, 0).unwrap(), 0x44);
        assert_eq!(mem.load_u16(0, 6).unwrap(), 0x1122);
        mem.store_u8(8, 0, 0xff).unwrap();
        assert_eq!(mem.load_i8(8, 0).unwrap(), -1);
        mem.store_f64(16, 0, 1.5).unwrap();
        assert_eq!(mem.load_f64(16, 0).unwrap(), 1.5);
    }

    #[test]
    fn out_of_bounds_is_never_clamped() {
        let mut mem = WasmMemory::new(1, None).unwrap();
        let last = WasmMemory::PAGE_SIZE - 4;
        assert!(mem.store_u32(last, 0, 7).is_ok());
        assert!(matches!(mem.load_u32(last, 1), Err(Trap::MemoryOutOfBounds)));
        assert!(matches!(mem.load_u64(u32::MAX, u32::MAX), Err(Trap::MemoryOutOfBounds)));
        assert!(matches!(mem.write(last, &[0; 8]), Err(Trap::MemoryOutOfBounds)));
        // Failed writes leave memory untouched
        assert_eq!(mem.load_u32(last, 0).unwrap(), 7);
    }

    #[test]
    fn grow_respects_maximum() {
        let mut mem = WasmMemory::new(1, Some(2)).unwrap();
        assert_eq!(mem.grow(1).unwrap(), 1);
        assert_eq!(mem.size(), 2);
        assert!(matches!(mem.grow(1), Err(Trap::OutOfMemory)));
        assert_eq!(mem.size(), 2);
        assert_eq!(mem.grow(0).unwrap(), 2);
        assert_eq!(mem.data().len(), 2 * WasmMemory::PAGE_SIZE as usize);
    }

    #[test]
    fn default_maximum_is_the_address_space() {
        let mut mem = WasmMemory::new(0, None).unwrap();
        assert_eq!(mem.max(), WasmMemory::MAX_PAGES);
        assert!(matches!(mem.grow(WasmMemory::MAX_PAGES + 1), Err(Trap::OutOfMemory)));
        assert_eq!(mem.size(), 0);
    }

    #[test]
    fn failed_allocation_is_reported() {
        let mut slots: Vec<u64> = vec![1, 2];
        assert!(matches!(reserve_zeroed(&mut slots, usize::MAX), Err(Trap::OutOfMemory)));
        assert_eq!(slots, vec![1, 2]);
        reserve_zeroed(&mut slots, 4).unwrap();
        assert_eq!(slots, vec![1, 2, 0, 0]);
    }
}
