// Memory utility functions for bootloader

use core::ptr;

use crate::utils::boot_traits::PhysicalMemory;

/// Physical address as seen by the boot core
pub type PhysAddr = u64;

/// Physical memory access failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// Range not backed by accessible memory
    OutOfRange { addr: PhysAddr, len: usize },
    /// `addr + len` wraps the address space
    AddressOverflow,
}

impl MemoryError {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryError::OutOfRange { .. } => "Physical range not accessible",
            MemoryError::AddressOverflow => "Physical range wraps address space",
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            MemoryError::OutOfRange { .. } => 1,
            MemoryError::AddressOverflow => 2,
        }
    }
}

/** Copy memory region (memmove equivalent)
 *
 * # Safety
 * - `dst` must be valid for writes of `size` bytes
 * - `src` must be valid for reads of `size` bytes
 * - Overlapping regions are allowed
 */
pub unsafe fn mem_move(dst: *mut u8, src: *const u8, size: usize) {
    ptr::copy(src, dst, size);
}

/** Zero memory region (memset equivalent)
 *
 * # Safety
 * - `ptr` must be valid for writes of `size` bytes
 */
pub unsafe fn mem_zero(ptr: *mut u8, size: usize) {
    ptr::write_bytes(ptr, 0, size);
}

/// Align value up to boundary
pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// Align value down to boundary
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Check if value is aligned
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    (addr & (align - 1)) == 0
}

fn range_end(addr: PhysAddr, len: usize) -> Result<PhysAddr, MemoryError> {
    addr.checked_add(len as u64)
        .ok_or(MemoryError::AddressOverflow)
}

/// Identity-mapped physical memory of the running board.
///
/// The loader runs with the MMU mapping physical addresses 1:1, so every
/// address is dereferenced directly.
pub struct RawPhysicalMemory {
    _private: (),
}

impl RawPhysicalMemory {
    /** Create the accessor for identity-mapped RAM
     *
     * # Safety
     * Every range later passed to this accessor must be RAM that the boot
     * core may read and write, and no Rust reference may alias a range
     * while it is written.
     */
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn as_ptr(addr: PhysAddr, len: usize) -> Result<*mut u8, MemoryError> {
        let end = range_end(addr, len)?;
        if usize::try_from(end).is_err() {
            return Err(MemoryError::OutOfRange { addr, len });
        }
        Ok(addr as usize as *mut u8)
    }
}

impl PhysicalMemory for RawPhysicalMemory {
    fn read(&self, addr: PhysAddr, len: usize) -> Result<&[u8], MemoryError> {
        let p = Self::as_ptr(addr, len)?;
        // SAFETY: covered by the contract of `RawPhysicalMemory::new`.
        Ok(unsafe { core::slice::from_raw_parts(p, len) })
    }

    fn read_mut(&mut self, addr: PhysAddr, len: usize) -> Result<&mut [u8], MemoryError> {
        let p = Self::as_ptr(addr, len)?;
        // SAFETY: covered by the contract of `RawPhysicalMemory::new`.
        Ok(unsafe { core::slice::from_raw_parts_mut(p, len) })
    }

    fn copy(&mut self, dst: PhysAddr, src: PhysAddr, len: usize) -> Result<(), MemoryError> {
        let d = Self::as_ptr(dst, len)?;
        let s = Self::as_ptr(src, len)?;
        // SAFETY: covered by the contract of `RawPhysicalMemory::new`.
        unsafe { mem_move(d, s, len) };
        Ok(())
    }

    fn zero(&mut self, dst: PhysAddr, len: usize) -> Result<(), MemoryError> {
        let d = Self::as_ptr(dst, len)?;
        // SAFETY: covered by the contract of `RawPhysicalMemory::new`.
        unsafe { mem_zero(d, len) };
        Ok(())
    }
}

/// Physical memory window backed by a borrowed buffer.
///
/// Maps `[base, base + buf.len())` onto `buf`. Used to stage images on the
/// host and to observe every write the loaders perform.
pub struct BufferMemory<'a> {
    base: PhysAddr,
    buf: &'a mut [u8],
    writes: usize,
}

impl<'a> BufferMemory<'a> {
    pub fn new(base: PhysAddr, buf: &'a mut [u8]) -> Self {
        Self { base, buf, writes: 0 }
    }

    /// Number of `copy`/`zero` calls that modified memory
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn base(&self) -> PhysAddr {
        self.base
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..]
    }

    fn window(&self, addr: PhysAddr, len: usize) -> Result<core::ops::Range<usize>, MemoryError> {
        let end = range_end(addr, len)?;
        let limit = self.base.saturating_add(self.buf.len() as u64);
        if addr < self.base || end > limit {
            return Err(MemoryError::OutOfRange { addr, len });
        }
        let start = (addr - self.base) as usize;
        Ok(start..start + len)
    }
}

impl PhysicalMemory for BufferMemory<'_> {
    fn read(&self, addr: PhysAddr, len: usize) -> Result<&[u8], MemoryError> {
        let r = self.window(addr, len)?;
        Ok(&self.buf[r])
    }

    fn read_mut(&mut self, addr: PhysAddr, len: usize) -> Result<&mut [u8], MemoryError> {
        let r = self.window(addr, len)?;
        Ok(&mut self.buf[r])
    }

    fn copy(&mut self, dst: PhysAddr, src: PhysAddr, len: usize) -> Result<(), MemoryError> {
        let d = self.window(dst, len)?;
        let s = self.window(src, len)?;
        if len > 0 {
            self.buf.copy_within(s, d.start);
            self.writes += 1;
        }
        Ok(())
    }

    fn zero(&mut self, dst: PhysAddr, len: usize) -> Result<(), MemoryError> {
        let d = self.window(dst, len)?;
        if len > 0 {
            self.buf[d].fill(0);
            self.writes += 1;
        }
        Ok(())
    }
}
