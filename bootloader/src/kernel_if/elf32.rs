//! ELF32 big-endian on-disk records
//!
//! Headers are decoded field by field from byte slices; nothing is
//! reinterpreted in place, so alignment and host byte order never matter.

use static_assertions::const_assert_eq;

use crate::kernel_if::load_error::LoadError;
use crate::utils::endian::{be_u16, be_u32, c_str_at, put_be_u16, put_be_u32};

/// ELF Magic Number
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// ELF constants
pub mod constants {
    pub const EI_CLASS: usize = 4;
    pub const EI_DATA: usize = 5;
    pub const EI_VERSION: usize = 6;
    pub const EI_OSABI: usize = 7;
    pub const EI_ABIVERSION: usize = 8;

    pub const ELFCLASS32: u8 = 1;
    pub const ELFCLASS64: u8 = 2;

    pub const ET_NONE: u16 = 0;
    pub const ET_REL: u16 = 1; // Relocatable file
    pub const ET_EXEC: u16 = 2; // Executable file
    pub const ET_DYN: u16 = 3; // Shared object
    pub const ET_CORE: u16 = 4;

    pub const EM_PPC_OLD: u16 = 17; // Fujitsu VPP500 slot, used by old PowerPC tools
    pub const EM_PPC: u16 = 20;
    pub const EM_PPC64: u16 = 21;

    pub const PT_LOAD: u32 = 1;

    pub const SHN_UNDEF: u16 = 0;
    pub const SHT_STRTAB: u32 = 3;
    pub const SHT_DYNAMIC: u32 = 6;

    pub const DT_NULL: u32 = 0;
    pub const DT_NEEDED: u32 = 1;
    pub const DT_STRTAB: u32 = 5;
}

pub use constants::*;

pub const ELF32_EHDR_SIZE: usize = 52;
pub const ELF32_PHDR_SIZE: usize = 32;
pub const ELF32_SHDR_SIZE: usize = 40;
pub const ELF32_DYN_SIZE: usize = 8;

// Header field offsets
const E_TYPE: usize = 16;
const E_MACHINE: usize = 18;
const E_VERSION: usize = 20;
const E_ENTRY: usize = 24;
const E_PHOFF: usize = 28;
const E_SHOFF: usize = 32;
const E_FLAGS: usize = 36;
const E_EHSIZE: usize = 40;
const E_PHENTSIZE: usize = 42;
const E_PHNUM: usize = 44;
const E_SHENTSIZE: usize = 46;
const E_SHNUM: usize = 48;
const E_SHSTRNDX: usize = 50;

const_assert_eq!(E_SHSTRNDX + 2, ELF32_EHDR_SIZE);
const_assert_eq!(8 * 4, ELF32_PHDR_SIZE);
const_assert_eq!(10 * 4, ELF32_SHDR_SIZE);

bitflags::bitflags! {
    /// Segment permission bits (`p_flags`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const X = 0x1;
        const W = 0x2;
        const R = 0x4;
    }
}

/// ELF32 File Header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32Header {
    pub ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u32,
    pub e_phoff: u32,
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl Elf32Header {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let ident: [u8; 16] = buf.get(..16)?.try_into().ok()?;
        Some(Self {
            ident,
            e_type: be_u16(buf, E_TYPE)?,
            e_machine: be_u16(buf, E_MACHINE)?,
            e_version: be_u32(buf, E_VERSION)?,
            e_entry: be_u32(buf, E_ENTRY)?,
            e_phoff: be_u32(buf, E_PHOFF)?,
            e_shoff: be_u32(buf, E_SHOFF)?,
            e_flags: be_u32(buf, E_FLAGS)?,
            e_ehsize: be_u16(buf, E_EHSIZE)?,
            e_phentsize: be_u16(buf, E_PHENTSIZE)?,
            e_phnum: be_u16(buf, E_PHNUM)?,
            e_shentsize: be_u16(buf, E_SHENTSIZE)?,
            e_shnum: be_u16(buf, E_SHNUM)?,
            e_shstrndx: be_u16(buf, E_SHSTRNDX)?,
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> Option<()> {
        out.get_mut(..16)?.copy_from_slice(&self.ident);
        put_be_u16(out, E_TYPE, self.e_type)?;
        put_be_u16(out, E_MACHINE, self.e_machine)?;
        put_be_u32(out, E_VERSION, self.e_version)?;
        put_be_u32(out, E_ENTRY, self.e_entry)?;
        put_be_u32(out, E_PHOFF, self.e_phoff)?;
        put_be_u32(out, E_SHOFF, self.e_shoff)?;
        put_be_u32(out, E_FLAGS, self.e_flags)?;
        put_be_u16(out, E_EHSIZE, self.e_ehsize)?;
        put_be_u16(out, E_PHENTSIZE, self.e_phentsize)?;
        put_be_u16(out, E_PHNUM, self.e_phnum)?;
        put_be_u16(out, E_SHENTSIZE, self.e_shentsize)?;
        put_be_u16(out, E_SHNUM, self.e_shnum)?;
        put_be_u16(out, E_SHSTRNDX, self.e_shstrndx)
    }

    pub fn class(&self) -> u8 {
        self.ident[EI_CLASS]
    }
}

/// Accepted PowerPC machine encodings; all are treated alike
pub fn is_powerpc(machine: u16) -> bool {
    matches!(machine, EM_PPC | EM_PPC64 | EM_PPC_OLD)
}

/// ELF32 Program Header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32ProgramHeader {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: u32,
    pub p_paddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub p_align: u32,
}

impl Elf32ProgramHeader {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        Some(Self {
            p_type: be_u32(buf, 0)?,
            p_offset: be_u32(buf, 4)?,
            p_vaddr: be_u32(buf, 8)?,
            p_paddr: be_u32(buf, 12)?,
            p_filesz: be_u32(buf, 16)?,
            p_memsz: be_u32(buf, 20)?,
            p_flags: be_u32(buf, 24)?,
            p_align: be_u32(buf, 28)?,
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> Option<()> {
        put_be_u32(out, 0, self.p_type)?;
        put_be_u32(out, 4, self.p_offset)?;
        put_be_u32(out, 8, self.p_vaddr)?;
        put_be_u32(out, 12, self.p_paddr)?;
        put_be_u32(out, 16, self.p_filesz)?;
        put_be_u32(out, 20, self.p_memsz)?;
        put_be_u32(out, 24, self.p_flags)?;
        put_be_u32(out, 28, self.p_align)
    }

    pub fn flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.p_flags)
    }
}

/// ELF32 Section Header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub sh_size: u32,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u32,
    pub sh_entsize: u32,
}

impl Elf32SectionHeader {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        Some(Self {
            sh_name: be_u32(buf, 0)?,
            sh_type: be_u32(buf, 4)?,
            sh_flags: be_u32(buf, 8)?,
            sh_addr: be_u32(buf, 12)?,
            sh_offset: be_u32(buf, 16)?,
            sh_size: be_u32(buf, 20)?,
            sh_link: be_u32(buf, 24)?,
            sh_info: be_u32(buf, 28)?,
            sh_addralign: be_u32(buf, 32)?,
            sh_entsize: be_u32(buf, 36)?,
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> Option<()> {
        put_be_u32(out, 0, self.sh_name)?;
        put_be_u32(out, 4, self.sh_type)?;
        put_be_u32(out, 8, self.sh_flags)?;
        put_be_u32(out, 12, self.sh_addr)?;
        put_be_u32(out, 16, self.sh_offset)?;
        put_be_u32(out, 20, self.sh_size)?;
        put_be_u32(out, 24, self.sh_link)?;
        put_be_u32(out, 28, self.sh_info)?;
        put_be_u32(out, 32, self.sh_addralign)?;
        put_be_u32(out, 36, self.sh_entsize)
    }
}

fn table_fits(base: u32, count: u16, entsize: usize, len: usize) -> bool {
    (base as usize)
        .checked_add(count as usize * entsize)
        .is_some_and(|end| end <= len)
}

/// Validated view over an ELF32 image resident in memory
pub struct Elf32Image<'a> {
    data: &'a [u8],
    header: Elf32Header,
}

impl<'a> Elf32Image<'a> {
    /// Validate the file header. Checks run in a fixed order and the first
    /// failure wins.
    pub fn parse(data: &'a [u8]) -> Result<Self, LoadError> {
        let header = Elf32Header::decode(data).ok_or(LoadError::Truncated)?;

        if header.ident[..4] != ELF_MAGIC {
            return Err(LoadError::BadMagic);
        }
        if header.e_ehsize as usize != ELF32_EHDR_SIZE {
            return Err(LoadError::BadHeaderSize);
        }
        if !is_powerpc(header.e_machine) {
            return Err(LoadError::BadMachine);
        }
        if header.e_type != ET_REL && header.e_type != ET_EXEC {
            return Err(LoadError::BadType);
        }
        if header.e_phoff == 0
            || header.e_phnum == 0
            || header.e_phentsize as usize != ELF32_PHDR_SIZE
        {
            return Err(LoadError::BadProgramHeaders);
        }
        if !table_fits(header.e_phoff, header.e_phnum, ELF32_PHDR_SIZE, data.len()) {
            return Err(LoadError::BadProgramHeaders);
        }

        Ok(Self { data, header })
    }

    pub fn header(&self) -> &Elf32Header {
        &self.header
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Program header `index`; the table extent was checked by `parse`
    pub fn program_header(&self, index: u16) -> Result<Elf32ProgramHeader, LoadError> {
        if index >= self.header.e_phnum {
            return Err(LoadError::BadProgramHeaders);
        }
        let off = self.header.e_phoff as usize + index as usize * ELF32_PHDR_SIZE;
        self.data
            .get(off..)
            .and_then(Elf32ProgramHeader::decode)
            .ok_or(LoadError::BadProgramHeaders)
    }

    pub fn program_headers(&self) -> impl Iterator<Item = Result<Elf32ProgramHeader, LoadError>> + '_ {
        (0..self.header.e_phnum).map(move |i| self.program_header(i))
    }

    /// Check the section header table is present and inside the image
    pub fn check_section_table(&self) -> Result<(), LoadError> {
        let h = &self.header;
        if h.e_shoff == 0 || h.e_shstrndx == SHN_UNDEF {
            return Err(LoadError::BadSectionHeaders);
        }
        if h.e_shentsize as usize != ELF32_SHDR_SIZE
            || h.e_shstrndx >= h.e_shnum
            || !table_fits(h.e_shoff, h.e_shnum, ELF32_SHDR_SIZE, self.data.len())
        {
            return Err(LoadError::BadSectionHeaders);
        }
        Ok(())
    }

    pub fn section_header(&self, index: u16) -> Result<Elf32SectionHeader, LoadError> {
        if index >= self.header.e_shnum || self.header.e_shoff == 0 {
            return Err(LoadError::BadSectionHeaders);
        }
        let off = self.header.e_shoff as usize + index as usize * ELF32_SHDR_SIZE;
        self.data
            .get(off..)
            .and_then(Elf32SectionHeader::decode)
            .ok_or(LoadError::BadSectionHeaders)
    }

    /// Contents of a section, bounds-checked against the image
    pub fn section_data(&self, sh: &Elf32SectionHeader) -> Result<&'a [u8], LoadError> {
        let start = sh.sh_offset as usize;
        let end = start
            .checked_add(sh.sh_size as usize)
            .ok_or(LoadError::BadSectionHeaders)?;
        self.data.get(start..end).ok_or(LoadError::BadSectionHeaders)
    }

    /// Name of a section, looked up through `e_shstrndx`
    pub fn section_name(&self, sh: &Elf32SectionHeader) -> Result<&'a [u8], LoadError> {
        let strtab = self.section_header(self.header.e_shstrndx)?;
        let names = self.section_data(&strtab)?;
        c_str_at(names, sh.sh_name as usize).ok_or(LoadError::BadSectionHeaders)
    }

    pub fn find_section_by_name(&self, name: &str) -> Result<Option<Elf32SectionHeader>, LoadError> {
        for i in 0..self.header.e_shnum {
            let sh = self.section_header(i)?;
            if self.section_name(&sh).is_ok_and(|n| n == name.as_bytes()) {
                return Ok(Some(sh));
            }
        }
        Ok(None)
    }

    /// First section of the given type, or `None` without a usable table
    pub fn find_section_by_type(&self, sh_type: u32) -> Option<Elf32SectionHeader> {
        if self.header.e_shoff == 0 {
            return None;
        }
        (0..self.header.e_shnum)
            .filter_map(|i| self.section_header(i).ok())
            .find(|sh| sh.sh_type == sh_type)
    }

    /// First program header of the given type
    pub fn find_program_header(&self, p_type: u32) -> Option<Elf32ProgramHeader> {
        self.program_headers()
            .filter_map(Result::ok)
            .find(|ph| ph.p_type == p_type)
    }
}
