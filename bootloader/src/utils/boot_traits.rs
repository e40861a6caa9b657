//! Core bootloader traits for dependency injection
//!
//! The loader talks to the board only through these interfaces, so the
//! whole pipeline runs unchanged on the host under test.

use arrayvec::ArrayVec;

use crate::utils::mem_util::{MemoryError, PhysAddr};

/// Upper bound on RAM regions reported by a board
pub const MAX_MEM_REGIONS: usize = 8;

/// Physical memory access with a defined address space
pub trait PhysicalMemory {
    /// Borrow `len` bytes at `addr`
    fn read(&self, addr: PhysAddr, len: usize) -> Result<&[u8], MemoryError>;

    /// Borrow `len` bytes at `addr` for in-place editing
    fn read_mut(&mut self, addr: PhysAddr, len: usize) -> Result<&mut [u8], MemoryError>;

    /// Copy `len` bytes from `src` to `dst`; ranges may overlap
    fn copy(&mut self, dst: PhysAddr, src: PhysAddr, len: usize) -> Result<(), MemoryError>;

    /// Zero `len` bytes at `dst`
    fn zero(&mut self, dst: PhysAddr, len: usize) -> Result<(), MemoryError>;
}

/// One installed RAM region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemDesc {
    pub addr: u64,
    pub size: u64,
}

/// Board memory-descriptor table
#[cfg_attr(test, mockall::automock)]
pub trait MemoryDescriptorProvider {
    fn memory_regions(&self) -> ArrayVec<MemDesc, MAX_MEM_REGIONS>;
}

/// Identity of the executing core
#[cfg_attr(test, mockall::automock)]
pub trait CpuIdentity {
    /// Hardware id matching the `reg` of this core's `/cpus` node
    fn current_core_id(&self) -> u32;
}

/// Final jump into a loaded image
#[cfg_attr(test, mockall::automock)]
pub trait EntryTrampoline {
    /// Call `entry` with the given argument registers.
    ///
    /// Returns only if the image handed control back.
    fn enter(&mut self, entry: PhysAddr, args: [usize; 7]);
}

/// Fixed single-region memory table
pub struct StaticMemoryMap {
    regions: ArrayVec<MemDesc, MAX_MEM_REGIONS>,
}

impl StaticMemoryMap {
    pub fn new(regions: &[MemDesc]) -> Self {
        Self {
            regions: regions.iter().copied().take(MAX_MEM_REGIONS).collect(),
        }
    }
}

impl MemoryDescriptorProvider for StaticMemoryMap {
    fn memory_regions(&self) -> ArrayVec<MemDesc, MAX_MEM_REGIONS> {
        self.regions.clone()
    }
}

/// Core id fixed at build time for single-cluster boards
pub struct FixedCoreId(pub u32);

impl CpuIdentity for FixedCoreId {
    fn current_core_id(&self) -> u32 {
        self.0
    }
}
