//! Boot Orchestrator - Coordinates one complete boot attempt
//!
//! Implements the `boot` use case:
//! 1. Classify the image resident at the image address
//! 2. Load it with the matching loader (ELF32, uImage or raw binary)
//! 3. Patch the device tree, when one was supplied
//! 4. Enter the image with the ePAPR register convention
//!
//! Progress is tracked in a [`BootState`]; every failure moves it to
//! `Failed`. Memory already written by a loader is left as it is.

use core::convert::Infallible;

use crate::boot_stage::BootConfig;
use crate::core::boot_state::{BootPhase, BootState};
use crate::error::BootError;
use crate::kernel_if::elf_loader::load_elf32;
use crate::kernel_if::image_type::{classify, ClassifyError, ImageKind, CLASSIFY_WINDOW};
use crate::kernel_if::kernel_entry::{EpaprTrampoline, LoaderParam, OsFlavor};
use crate::kernel_if::uimage::load_uimage;
use crate::protocol::fdt::fixup::{fixup, FixupError, FixupStep};
use crate::protocol::fdt::{print, DtBlob, FdtError, FDT_MAGIC, FDT_PADDING, FDT_V17_HEADER_SIZE};
use crate::utils::boot_traits::{
    CpuIdentity, EntryTrampoline, FixedCoreId, MemoryDescriptorProvider, PhysicalMemory,
    StaticMemoryMap,
};
use crate::utils::endian::be_u32;
use crate::utils::mem_util::{PhysAddr, RawPhysicalMemory};

/// Image and device tree addresses for one `boot` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootRequest {
    pub image_addr: PhysAddr,
    pub dtb_addr: Option<PhysAddr>,
}

impl BootRequest {
    pub const fn new(image_addr: PhysAddr, dtb_addr: Option<PhysAddr>) -> Self {
        Self {
            image_addr,
            dtb_addr,
        }
    }

    /// Kernel staged at 32 MiB with the board tree at 240 MiB
    pub const fn board_default() -> Self {
        Self::new(0x0200_0000, Some(0x0f00_0000))
    }

    /// Bare image at 1 MiB, entered without a device tree
    pub const fn low_memory() -> Self {
        Self::new(0x0010_0000, None)
    }
}

/// Orchestrator wired to the running board
pub type BoardOrchestrator =
    BootOrchestrator<RawPhysicalMemory, FixedCoreId, StaticMemoryMap, EpaprTrampoline>;

/// Boot Orchestrator
///
/// Owns the board collaborators for the lifetime of the loader. Each call
/// to [`boot`](Self::boot) starts again from a cold classification of the
/// image currently in memory.
pub struct BootOrchestrator<M, C, P, T> {
    /// Physical address space holding the image and the tree
    mem: M,
    /// Identity of the boot core
    cpu: C,
    /// Board RAM table for the `/memory` node
    memory_map: P,
    /// Final jump into the image
    trampoline: T,
    /// Settings applied to every attempt
    config: BootConfig,
    /// Phase of the current attempt
    state: BootState,
}

impl<M, C, P, T> BootOrchestrator<M, C, P, T>
where
    M: PhysicalMemory,
    C: CpuIdentity,
    P: MemoryDescriptorProvider,
    T: EntryTrampoline,
{
    pub fn new(mem: M, cpu: C, memory_map: P, trampoline: T, config: BootConfig) -> Self {
        Self {
            mem,
            cpu,
            memory_map,
            trampoline,
            config,
            state: BootState::new(),
        }
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut BootConfig {
        &mut self.config
    }

    /// Phase reached by the last attempt
    pub fn phase(&self) -> BootPhase {
        self.state.get_phase()
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    pub fn trampoline(&self) -> &T {
        &self.trampoline
    }

    /// Boot the image at `image_addr`
    ///
    /// # Arguments
    /// * `image_addr` - Physical address of the resident image
    /// * `dtb_addr` - Device tree to patch and pass in r3, if any
    ///
    /// # Returns
    /// Never returns on success. On failure the error has already been
    /// logged and the state is `Failed`.
    pub fn boot(&mut self, image_addr: PhysAddr, dtb_addr: Option<PhysAddr>) -> Result<Infallible, BootError> {
        self.state.reset();
        if self.config.is_verbose() {
            self.config.print_config();
        }

        let Err(err) = self.run(image_addr, dtb_addr);

        self.state.set_error();
        log::error!("{}", err);
        if err.image_was_loaded() {
            log::error!("image is in memory but was not started");
        }
        Err(err)
    }

    /// Boot with the addresses of a canned request
    pub fn boot_request(&mut self, req: BootRequest) -> Result<Infallible, BootError> {
        self.boot(req.image_addr, req.dtb_addr)
    }

    fn run(&mut self, image_addr: PhysAddr, dtb_addr: Option<PhysAddr>) -> Result<Infallible, BootError> {
        let kind = classify(self.mem.read(image_addr, CLASSIFY_WINDOW)?)?;
        log::info!("image at {:#x}: {}", image_addr, kind.description());
        self.state.set_phase(BootPhase::Classified);

        let (entry, flavor) = self.load(kind, image_addr)?;
        self.state.set_phase(BootPhase::Loaded);

        match dtb_addr {
            Some(dtb) => {
                self.fixup_tree(dtb)?;
                self.state.set_phase(BootPhase::FixedUp);
            }
            None => log::info!("no device tree supplied, skipping fixup"),
        }

        let param = LoaderParam::new(image_addr, dtb_addr, entry, flavor);
        self.state.set_phase(BootPhase::Transferred);
        param.transfer(&mut self.trampoline).map_err(BootError::from)
    }

    fn load(&mut self, kind: ImageKind, image_addr: PhysAddr) -> Result<(PhysAddr, OsFlavor), BootError> {
        match kind {
            ImageKind::Elf32 => {
                let entry = load_elf32(
                    &mut self.mem,
                    image_addr,
                    self.config.image_window_size,
                    self.config.build_tag_policy,
                )
                .map_err(BootError::ElfFormat)?;
                Ok((entry, OsFlavor::VxWorks))
            }
            ImageKind::UImage => {
                let loaded = load_uimage(&mut self.mem, image_addr, self.config.verify_uimage_crc)
                    .map_err(BootError::UImageFormat)?;
                Ok((loaded.entry, loaded.flavor))
            }
            ImageKind::RawBinary => Ok((image_addr, OsFlavor::Raw)),
            ImageKind::Elf64 => Err(BootError::UnsupportedImage(kind)),
            ImageKind::Unknown => Err(ClassifyError::Unrecognized.into()),
        }
    }

    /// Patch the tree at `dtb_addr`.
    ///
    /// The image is already in place, so every failure here, including an
    /// unmapped tree, is reported as a fixup error.
    fn fixup_tree(&mut self, dtb_addr: PhysAddr) -> Result<(), BootError> {
        let header = self.mem.read(dtb_addr, FDT_V17_HEADER_SIZE).map_err(|e| {
            log::error!("device tree at {:#x} not readable: {}", dtb_addr, e.as_str());
            tree_error(FixupStep::Header, FdtError::Truncated)
        })?;
        let (Some(FDT_MAGIC), Some(totalsize)) = (be_u32(header, 0), be_u32(header, 4)) else {
            return Err(tree_error(FixupStep::Header, FdtError::BadMagic));
        };

        // The blob grows in place by at most the fixup padding.
        let window_len = dtb_window_len(totalsize)
            .ok_or_else(|| tree_error(FixupStep::Header, FdtError::Truncated))?;
        let window = self.mem.read_mut(dtb_addr, window_len).map_err(|e| {
            log::error!(
                "no room for device tree at {:#x} ({:#x} bytes): {}",
                dtb_addr,
                window_len,
                e.as_str()
            );
            tree_error(FixupStep::Padding, FdtError::NoSpace)
        })?;
        let mut dtb = DtBlob::new(window);

        let regions = self.memory_map.memory_regions();
        let params = self.config.fixup_params(self.cpu.current_core_id());
        fixup(&mut dtb, &params, &regions)?;
        log::info!(
            "device tree at {:#x} fixed up, totalsize = {:#x}",
            dtb_addr,
            dtb.totalsize()
        );

        if self.config.is_verbose() {
            if let Err(e) = print::dump(&dtb) {
                log::warn!("device tree dump stopped: {}", e);
            }
        }
        Ok(())
    }
}

fn tree_error(step: FixupStep, code: FdtError) -> BootError {
    BootError::Fixup(FixupError { step, code })
}

/// Bytes mapped for a tree of `totalsize` bytes plus the fixup padding
fn dtb_window_len(totalsize: u32) -> Option<usize> {
    totalsize
        .checked_add(FDT_PADDING)
        .and_then(|len| usize::try_from(len).ok())
}
