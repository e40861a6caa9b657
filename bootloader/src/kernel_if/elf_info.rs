//! ELF32 diagnostics
//!
//! Human-readable header description and the `DT_NEEDED` dependency list.
//! Purely informational: nothing here can fail a load.

use arrayvec::ArrayVec;

use crate::kernel_if::elf32::*;
use crate::utils::endian::{be_u32, c_str_at};

/// Dependencies beyond this count are not reported
pub const MAX_NEEDED: usize = 16;

pub fn type_name(e_type: u16) -> (&'static str, &'static str) {
    match e_type {
        ET_NONE => ("NONE", "None"),
        ET_REL => ("REL", "Relocatable file"),
        ET_EXEC => ("EXEC", "Executable file"),
        ET_DYN => ("DYN", "Shared object file"),
        ET_CORE => ("CORE", "Core file"),
        _ => ("Unknown", "Unknown"),
    }
}

pub fn machine_name(machine: u16) -> &'static str {
    match machine {
        0 => "No machine",
        2 => "SUN SPARC",
        3 => "Intel 80386",
        4 => "Motorola m68k family",
        8 => "MIPS R3000 big-endian",
        EM_PPC_OLD => "PowerPC (old)",
        EM_PPC => "PowerPC",
        EM_PPC64 => "PowerPC 64-bit",
        40 => "ARM",
        62 => "AMD x86-64 architecture",
        183 => "AArch64",
        243 => "RISC-V",
        _ => "unknown",
    }
}

fn class_name(class: u8) -> &'static str {
    match class {
        0 => "Invalid class",
        ELFCLASS32 => "ELF32",
        ELFCLASS64 => "ELF64",
        _ => "Unknown",
    }
}

fn data_name(data: u8) -> &'static str {
    match data {
        0 => "Invalid data encoding",
        1 => "2's complement, little endian",
        2 => "2's complement, big endian",
        _ => "Unknown",
    }
}

fn osabi_name(abi: u8) -> &'static str {
    match abi {
        0 => "UNIX - System V",
        1 => "UNIX - HP-UX",
        2 => "UNIX - NetBSD",
        3 => "UNIX - Linux",
        6 => "UNIX - Solaris",
        9 => "UNIX - FreeBSD",
        12 => "UNIX - OpenBSD",
        97 => "ARM",
        255 => "Standalone App",
        _ => "Unknown",
    }
}

/// Log the identification and type fields of an ELF header
pub fn describe_elf_header(h: &Elf32Header) {
    let (short, long) = type_name(h.e_type);
    log::info!("Type({:#x}):\t\t{} ({})", h.e_type, short, long);
    log::info!("Machine({:#x}):\t\t{}", h.e_machine, machine_name(h.e_machine));
    log::info!("Class({:#x}):\t\t{}", h.ident[EI_CLASS], class_name(h.ident[EI_CLASS]));
    log::info!("Data({:#x}):\t\t{}", h.ident[EI_DATA], data_name(h.ident[EI_DATA]));
    log::info!(
        "Version:\t\t{} {}",
        h.ident[EI_VERSION],
        if h.ident[EI_VERSION] == 1 { "(current)" } else { "(unknown)" }
    );
    log::info!("OS/ABI({:#x}):\t\t{}", h.ident[EI_OSABI], osabi_name(h.ident[EI_OSABI]));
    log::info!("ABI Version:\t\t{}", h.ident[EI_ABIVERSION]);
}

/// Log the file offset of the first loadable segment
pub fn describe_first_load(elf: &Elf32Image<'_>) {
    let h = elf.header();
    log::debug!(
        "program header table @{:#x}, {} entries",
        h.e_phoff,
        h.e_phnum
    );
    if let Some(ph) = elf.find_program_header(PT_LOAD) {
        log::info!("first load segment @ file offset {:#x}", ph.p_offset);
    }
}

/// Names listed by `DT_NEEDED` entries of the dynamic section.
///
/// `DT_STRTAB` holds a virtual address; it is mapped back to a file offset
/// through the first `PT_LOAD` segment. Returns an empty list when the image
/// is not dynamically linked or any piece is out of bounds.
pub fn needed_libraries<'a>(elf: &Elf32Image<'a>) -> ArrayVec<&'a [u8], MAX_NEEDED> {
    let mut names = ArrayVec::new();

    let Some(dynsec) = elf.find_section_by_type(SHT_DYNAMIC) else {
        return names;
    };
    let Ok(dynamic) = elf.section_data(&dynsec) else {
        return names;
    };
    let Some(text) = elf.find_program_header(PT_LOAD) else {
        return names;
    };
    let reloc = text.p_vaddr.wrapping_sub(text.p_offset);

    let entries = move || {
        dynamic
            .chunks_exact(ELF32_DYN_SIZE)
            .map(|d| (be_u32(d, 0).unwrap_or(DT_NULL), be_u32(d, 4).unwrap_or(0)))
            .take_while(|&(tag, _)| tag != DT_NULL)
    };

    let Some(strtab_off) = entries()
        .find(|&(tag, _)| tag == DT_STRTAB)
        .map(|(_, val)| val.wrapping_sub(reloc) as usize)
    else {
        return names;
    };
    let Some(strtab) = elf.data().get(strtab_off..) else {
        return names;
    };

    for (_, val) in entries().filter(|&(tag, _)| tag == DT_NEEDED) {
        if let Some(name) = c_str_at(strtab, val as usize) {
            if names.try_push(name).is_err() {
                break;
            }
        }
    }
    names
}

/// Log the dependency list, if any
pub fn list_needed_libraries(elf: &Elf32Image<'_>) {
    let names = needed_libraries(elf);
    if names.is_empty() {
        return;
    }
    log::info!("Dependencies:");
    for name in names {
        match core::str::from_utf8(name) {
            Ok(s) => log::info!("\t{}", s),
            Err(_) => log::info!("\t<{} bytes, not UTF-8>", name.len()),
        }
    }
}
