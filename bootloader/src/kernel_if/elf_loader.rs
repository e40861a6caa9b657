// ELF32 kernel loader for bootloader
//
// Every program header is decoded and bounds-checked before the first byte
// is written, so a malformed image never leaves a partial load behind.

use arrayvec::ArrayVec;

use crate::kernel_if::elf32::{Elf32Image, PT_LOAD};
use crate::kernel_if::elf_info;
use crate::kernel_if::load_error::LoadError;
use crate::utils::boot_traits::PhysicalMemory;
use crate::utils::endian::contains_subslice;
use crate::utils::mem_util::PhysAddr;

/// Section carrying the VxWorks build variables
pub const BUILD_TAG_SECTION: &str = ".wrs_build_vars";
/// Tag a VxWorks 7 kernel must carry
pub const BUILD_TAG_VXW7: &[u8] = b"tag VXW7";
/// Tag of images built in 6.9 compatibility mode
pub const BUILD_TAG_COMPAT69: &[u8] = b"tag COMPAT69";

/// Loadable segments beyond this count are rejected
pub const MAX_LOAD_SEGMENTS: usize = 32;

/// What to do when the build tag cannot be found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildTagPolicy {
    /// Warn and accept the image
    #[default]
    Lenient,
    /// Reject the image with `MissingBuildTag`
    Strict,
}

/// One `PT_LOAD` segment, validated against the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    pub offset: u32,
    pub paddr: u32,
    pub filesz: u32,
    pub memsz: u32,
}

impl LoadSegment {
    /// Zero-filled tail (`.bss`) length
    pub fn bss_len(&self) -> u32 {
        self.memsz.saturating_sub(self.filesz)
    }
}

/// Fully validated load plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfLoadPlan {
    pub entry: PhysAddr,
    pub segments: ArrayVec<LoadSegment, MAX_LOAD_SEGMENTS>,
}

/// Look for the VxWorks 7 build tag in `.wrs_build_vars`.
///
/// The section table itself must be present and sane under either policy.
pub fn check_build_tag(elf: &Elf32Image<'_>, policy: BuildTagPolicy) -> Result<(), LoadError> {
    elf.check_section_table()?;

    let mut compat69 = false;
    if let Some(sh) = elf.find_section_by_name(BUILD_TAG_SECTION)? {
        let vars = elf.section_data(&sh)?;
        for entry in vars.split(|&b| b == 0) {
            if contains_subslice(entry, BUILD_TAG_VXW7) {
                return Ok(());
            }
            compat69 |= contains_subslice(entry, BUILD_TAG_COMPAT69);
        }
    }

    match policy {
        BuildTagPolicy::Lenient => {
            log::warn!(
                "ELF32: no VxWorks 7 build tag{}, booting anyway",
                if compat69 { " (COMPAT69 image)" } else { "" }
            );
            Ok(())
        }
        BuildTagPolicy::Strict => {
            log::error!("Not a valid VxWorks 7 kernel image (make sure COMPAT69 is turned OFF).");
            Err(LoadError::MissingBuildTag)
        }
    }
}

/// Validate `image` and build the list of segment copies.
///
/// Performs no writes.
pub fn plan_elf32(image: &[u8], policy: BuildTagPolicy) -> Result<ElfLoadPlan, LoadError> {
    let elf = Elf32Image::parse(image)?;

    elf_info::describe_elf_header(elf.header());
    elf_info::describe_first_load(&elf);
    elf_info::list_needed_libraries(&elf);

    check_build_tag(&elf, policy)?;

    let mut segments = ArrayVec::new();
    for ph in elf.program_headers() {
        let ph = ph?;
        if ph.p_type != PT_LOAD {
            continue;
        }

        let file_end = ph.p_offset as u64 + ph.p_filesz as u64;
        if file_end > image.len() as u64 {
            return Err(LoadError::SegmentOutOfBounds);
        }
        let mem_end = ph.p_paddr as u64 + (ph.p_memsz.max(ph.p_filesz)) as u64;
        if mem_end > u32::MAX as u64 + 1 {
            return Err(LoadError::SegmentOutOfBounds);
        }

        segments
            .try_push(LoadSegment {
                offset: ph.p_offset,
                paddr: ph.p_paddr,
                filesz: ph.p_filesz,
                memsz: ph.p_memsz,
            })
            .map_err(|_| LoadError::TooManySegments)?;
    }

    Ok(ElfLoadPlan {
        entry: elf.header().e_entry as PhysAddr,
        segments,
    })
}

/// Load the ELF32 image at `image_addr` and return its entry point.
///
/// `image_len` bounds every offset the headers may reference. The entry is
/// returned unrelocated: images are linked for their physical address.
pub fn load_elf32<M>(
    mem: &mut M,
    image_addr: PhysAddr,
    image_len: usize,
    policy: BuildTagPolicy,
) -> Result<PhysAddr, LoadError>
where
    M: PhysicalMemory + ?Sized,
{
    let plan = plan_elf32(mem.read(image_addr, image_len)?, policy)?;

    for seg in &plan.segments {
        log::info!(
            "loading ELF32 segment from {:#x} to {:#x}, size = {:#x}",
            image_addr + seg.offset as u64,
            seg.paddr,
            seg.filesz
        );
        mem.copy(seg.paddr as PhysAddr, image_addr + seg.offset as u64, seg.filesz as usize)?;

        if seg.bss_len() > 0 {
            mem.zero(seg.paddr as PhysAddr + seg.filesz as u64, seg.bss_len() as usize)?;
        }
    }

    Ok(plan.entry)
}
