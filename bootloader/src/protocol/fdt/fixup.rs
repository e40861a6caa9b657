//! Boot-time device tree fixups
//!
//! Applied in order to the blob handed to the kernel:
//!
//! 1. header check and `FDT_PADDING` growth
//! 2. `/chosen/bootargs`
//! 3. per-core `status`, `enable-method` and `cpu-release-addr`
//! 4. a reservation covering the spin table
//! 5. `/memory` from the board memory map (best effort)

use crate::protocol::fdt::{DtBlob, FdtError, FDT_PADDING};
use crate::protocol::spin_table::SpinTable;
use crate::utils::boot_traits::{MemDesc, MAX_MEM_REGIONS};
use crate::utils::endian::{be_u32, put_be_u32, put_be_u64};
use crate::utils::mem_util::PhysAddr;

/// Fixup stage, carried in [`FixupError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FixupStep {
    Header = 1,
    Padding = 2,
    Chosen = 3,
    CpuNodes = 4,
    MemReserve = 5,
    MemoryNode = 6,
}

impl FixupStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixupStep::Header => "fdt header check",
            FixupStep::Padding => "fdt padding",
            FixupStep::Chosen => "chosen fixup",
            FixupStep::CpuNodes => "cpu fixup",
            FixupStep::MemReserve => "spin table reservation",
            FixupStep::MemoryNode => "memory fixup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupError {
    pub step: FixupStep,
    pub code: FdtError,
}

trait AtStep<T> {
    fn at(self, step: FixupStep) -> Result<T, FixupError>;
}

impl<T> AtStep<T> for Result<T, FdtError> {
    fn at(self, step: FixupStep) -> Result<T, FixupError> {
        self.map_err(|code| {
            log::error!("{} failed: {}", step.as_str(), code);
            FixupError { step, code }
        })
    }
}

/// What to do with `/memory`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryNodePolicy {
    /// Leave the node alone
    Skip,
    /// Create the node if absent; keep an existing one
    #[default]
    CreateIfMissing,
    /// Create the node if absent; rewrite `reg` of an existing one
    Overwrite,
}

/// Inputs of one fixup pass
#[derive(Debug, Clone, Copy)]
pub struct FixupParams<'p> {
    pub bootargs: &'p str,
    pub spin_table_addr: PhysAddr,
    pub spin_table_entries: u32,
    /// `reg` of the boot core's `/cpus` node
    pub this_core_id: u32,
    pub memory_policy: MemoryNodePolicy,
}

/// Patch `dtb` for the running configuration.
///
/// `memory` is the board memory map for `/memory`; failures while writing
/// that node are logged and otherwise ignored.
pub fn fixup(dtb: &mut DtBlob<'_>, params: &FixupParams<'_>, memory: &[MemDesc]) -> Result<(), FixupError> {
    dtb.check_header().at(FixupStep::Header)?;
    add_padding(dtb).at(FixupStep::Padding)?;
    fixup_bootargs(dtb, params.bootargs).at(FixupStep::Chosen)?;

    let table = SpinTable::new(params.spin_table_addr, params.spin_table_entries);
    fixup_cpus(dtb, &table, params.this_core_id).at(FixupStep::CpuNodes)?;
    dtb.add_mem_rsv(table.base(), table.size())
        .at(FixupStep::MemReserve)?;

    if let Err(e) = fixup_memory(dtb, memory, params.memory_policy) {
        log::warn!("{} failed: {}", FixupStep::MemoryNode.as_str(), e);
    }
    Ok(())
}

/// Grow `totalsize` by `FDT_PADDING`
pub fn add_padding(dtb: &mut DtBlob<'_>) -> Result<(), FdtError> {
    let size = dtb
        .totalsize()
        .checked_add(FDT_PADDING)
        .ok_or(FdtError::NoSpace)?;
    dtb.set_totalsize(size)
}

/// Make sure `/chosen` exists and carries `bootargs` when non-empty
pub fn fixup_bootargs(dtb: &mut DtBlob<'_>, bootargs: &str) -> Result<(), FdtError> {
    let chosen = match dtb.path_offset("/chosen") {
        Ok(off) => off,
        Err(_) => dtb.add_subnode(0, "chosen")?,
    };
    if bootargs.is_empty() {
        return Ok(());
    }
    dtb.setprop_string(chosen, "bootargs", bootargs)
}

/// Enable the boot core and park every other core on the spin table.
///
/// A parked core whose `reg` has no entry in `table` fails with `BadValue`:
/// its release address would lie outside the reserved region.
pub fn fixup_cpus(dtb: &mut DtBlob<'_>, table: &SpinTable, this_core_id: u32) -> Result<(), FdtError> {
    let mut offset = dtb.path_offset("/cpus")?;
    let mut depth = 0;

    loop {
        offset = match dtb.next_node(offset, &mut depth) {
            Ok(off) => off,
            Err(FdtError::NotFound) => break,
            Err(e) => return Err(e),
        };
        if depth < 0 {
            break;
        }
        if depth != 1 {
            continue;
        }
        let Some(cpuid) = dtb.getprop(offset, "reg").ok().and_then(|reg| be_u32(reg, 0)) else {
            continue;
        };

        if cpuid == this_core_id {
            dtb.setprop_string(offset, "status", "okay")?;
            continue;
        }

        let release = table.entry_addr(cpuid).map_err(|_| {
            log::error!("cpu {}: no spin table entry ({} entries)", cpuid, table.entries());
            FdtError::BadValue
        })?;
        log::debug!("cpu {}: release address {:#x}", cpuid, release);
        dtb.setprop_string(offset, "status", "disabled")?;
        dtb.setprop_u64(offset, "cpu-release-addr", release)?;
        dtb.setprop_string(offset, "enable-method", "spin-table")?;
    }
    Ok(())
}

/// Cell count of a root property mapped to a field width in bytes
fn cell_width(dtb: &DtBlob<'_>, name: &str, default: u32) -> usize {
    match dtb.getprop_u32(0, name).unwrap_or(default) {
        2 => 8,
        _ => 4,
    }
}

/// Write `/memory` `reg` from the board memory map, following `policy`
pub fn fixup_memory(dtb: &mut DtBlob<'_>, memory: &[MemDesc], policy: MemoryNodePolicy) -> Result<(), FdtError> {
    if memory.is_empty() {
        log::warn!("memory descriptors not available");
        return Ok(());
    }

    let node = match (dtb.path_offset("/memory"), policy) {
        (_, MemoryNodePolicy::Skip) => return Ok(()),
        (Err(FdtError::NotFound), _) => {
            let node = dtb.add_subnode(0, "memory")?;
            dtb.setprop_string(node, "device_type", "memory")?;
            node
        }
        (Err(e), _) => return Err(e),
        (Ok(node), MemoryNodePolicy::Overwrite) => node,
        (Ok(_), MemoryNodePolicy::CreateIfMissing) => return Ok(()),
    };

    let addr_width = cell_width(dtb, "#address-cells", 2);
    let size_width = cell_width(dtb, "#size-cells", 1);

    let mut reg = [0u8; MAX_MEM_REGIONS * 16];
    let mut len = 0;
    for desc in memory.iter().take(MAX_MEM_REGIONS) {
        write_val(&mut reg, len, desc.addr, addr_width).ok_or(FdtError::Internal)?;
        len += addr_width;
        write_val(&mut reg, len, desc.size, size_width).ok_or(FdtError::Internal)?;
        len += size_width;
    }
    dtb.setprop(node, "reg", &reg[..len])
}

fn write_val(buf: &mut [u8], off: usize, val: u64, width: usize) -> Option<()> {
    if width == 4 {
        put_be_u32(buf, off, val as u32)
    } else {
        put_be_u64(buf, off, val)
    }
}
