//! ePAPR spin table
//!
//! Secondary cores spin on their entry until `entry` changes from
//! [`ENTRY_SPINNING`], then load `r3` and `pir` and branch. The release
//! writer below therefore stores `entry` last, upper word before lower word,
//! with a full fence between each step.

use core::mem::size_of;
use core::sync::atomic::{fence, Ordering};

use static_assertions::const_assert_eq;

use crate::utils::boot_traits::PhysicalMemory;
use crate::utils::endian::{be_u32, be_u64};
use crate::utils::mem_util::{MemoryError, PhysAddr};

/// One entry per core, laid out as the kernel expects it
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinTableEntry {
    pub entry: u64,
    pub r3: u64,
    pub rsvd1: u32,
    pub pir: u32,
    pub pad: [u8; 40],
}

pub const SPIN_TABLE_ENTRY_SIZE: usize = size_of::<SpinTableEntry>();
const_assert_eq!(SPIN_TABLE_ENTRY_SIZE, 64);

/// `entry` value of a core still waiting for release
pub const ENTRY_SPINNING: u64 = 1;

const OFF_ENTRY: usize = 0;
const OFF_R3: usize = 8;
const OFF_PIR: usize = 20;

impl SpinTableEntry {
    /// Decode from big-endian bytes
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf = buf.get(..SPIN_TABLE_ENTRY_SIZE)?;
        Some(Self {
            entry: be_u64(buf, OFF_ENTRY)?,
            r3: be_u64(buf, OFF_R3)?,
            rsvd1: be_u32(buf, 16)?,
            pir: be_u32(buf, OFF_PIR)?,
            pad: buf[24..64].try_into().ok()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinTableError {
    /// Core index beyond the table
    NoSuchCore(u32),
    Memory(MemoryError),
}

impl From<MemoryError> for SpinTableError {
    fn from(e: MemoryError) -> Self {
        SpinTableError::Memory(e)
    }
}

/// Spin table at a fixed physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinTable {
    base: PhysAddr,
    entries: u32,
}

impl SpinTable {
    pub const fn new(base: PhysAddr, entries: u32) -> Self {
        Self { base, entries }
    }

    pub fn base(&self) -> PhysAddr {
        self.base
    }

    pub fn entries(&self) -> u32 {
        self.entries
    }

    /// Bytes covered by the table, as reserved in the device tree
    pub fn size(&self) -> u64 {
        self.entries as u64 * SPIN_TABLE_ENTRY_SIZE as u64
    }

    /// Physical address of the entry for `cpu`
    pub fn entry_addr(&self, cpu: u32) -> Result<PhysAddr, SpinTableError> {
        if cpu >= self.entries {
            return Err(SpinTableError::NoSuchCore(cpu));
        }
        Ok(self.base + cpu as u64 * SPIN_TABLE_ENTRY_SIZE as u64)
    }

    pub fn read<M>(&self, mem: &M, cpu: u32) -> Result<SpinTableEntry, SpinTableError>
    where
        M: PhysicalMemory + ?Sized,
    {
        let raw = mem.read(self.entry_addr(cpu)?, SPIN_TABLE_ENTRY_SIZE)?;
        SpinTableEntry::decode(raw).ok_or(SpinTableError::NoSuchCore(cpu))
    }

    /// Release `cpu` to `entry` with `r3` as its first argument
    pub fn release<M>(&self, mem: &mut M, cpu: u32, entry: u64, r3: u64) -> Result<(), SpinTableError>
    where
        M: PhysicalMemory + ?Sized,
    {
        let slot = mem.read_mut(self.entry_addr(cpu)?, SPIN_TABLE_ENTRY_SIZE)?;
        let p = slot.as_mut_ptr();

        log::info!("releasing core {} to {:#x}", cpu, entry);

        // SAFETY: `slot` is SPIN_TABLE_ENTRY_SIZE bytes long and every
        // store below stays within it; `[u8; N]` has alignment 1.
        unsafe {
            core::ptr::write_volatile(p.add(OFF_R3) as *mut [u8; 8], r3.to_be_bytes());
            fence(Ordering::SeqCst);
            core::ptr::write_volatile(p.add(OFF_PIR) as *mut [u8; 4], cpu.to_be_bytes());
            fence(Ordering::SeqCst);

            let entry = entry.to_be_bytes();
            let (upper, lower) = entry.split_at(4);
            core::ptr::write_volatile(
                p.add(OFF_ENTRY) as *mut [u8; 4],
                [upper[0], upper[1], upper[2], upper[3]],
            );
            fence(Ordering::SeqCst);
            core::ptr::write_volatile(
                p.add(OFF_ENTRY + 4) as *mut [u8; 4],
                [lower[0], lower[1], lower[2], lower[3]],
            );
        }
        fence(Ordering::SeqCst);
        Ok(())
    }
}
