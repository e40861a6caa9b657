//! Legacy uImage loader
//!
//! A uImage is a 64-byte big-endian header followed by the payload. The
//! payload is moved to `ih_load` unless it already sits there (XIP).

use core::fmt;

use static_assertions::const_assert_eq;

use crate::kernel_if::kernel_entry::OsFlavor;
use crate::kernel_if::load_error::LoadError;
use crate::utils::boot_traits::PhysicalMemory;
use crate::utils::crc32::{crc32, Crc32};
use crate::utils::endian::{be_u32, put_be_u32};
use crate::utils::mem_util::PhysAddr;

pub const IH_MAGIC: u32 = 0x2705_1956;
pub const IH_NMLEN: usize = 32;
pub const UIMAGE_HEADER_SIZE: usize = 64;

const_assert_eq!(7 * 4 + 4 + IH_NMLEN, UIMAGE_HEADER_SIZE);

/// Header constants shared with mkimage
pub mod ih {
    pub const OS_INVALID: u8 = 0;
    pub const OS_NETBSD: u8 = 2;
    pub const OS_LINUX: u8 = 5;
    pub const OS_VXWORKS: u8 = 14;
    pub const OS_QNX: u8 = 16;
    pub const OS_PPCBOOT: u8 = 17;

    pub const CPU_INVALID: u8 = 0;
    pub const CPU_ALPHA: u8 = 1;
    pub const CPU_ARM: u8 = 2;
    pub const CPU_I386: u8 = 3;
    pub const CPU_IA64: u8 = 4;
    pub const CPU_MIPS: u8 = 5;
    pub const CPU_MIPS64: u8 = 6;
    pub const CPU_PPC: u8 = 7;
    pub const CPU_S390: u8 = 8;
    pub const CPU_SH: u8 = 9;
    pub const CPU_SPARC: u8 = 10;
    pub const CPU_SPARC64: u8 = 11;

    pub const TYPE_INVALID: u8 = 0;
    pub const TYPE_STANDALONE: u8 = 1;
    pub const TYPE_KERNEL: u8 = 2;
    pub const TYPE_RAMDISK: u8 = 3;
    pub const TYPE_MULTI: u8 = 4;
    pub const TYPE_FIRMWARE: u8 = 5;
    pub const TYPE_SCRIPT: u8 = 6;

    pub const COMP_NONE: u8 = 0;
    pub const COMP_GZIP: u8 = 1;
    pub const COMP_BZIP2: u8 = 2;
}

/// Sub-images listed for a multi-file image, at most
const MAX_MULTI_LISTED: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UImageHeader {
    pub ih_magic: u32,
    pub ih_hcrc: u32,
    pub ih_time: u32,
    pub ih_size: u32,
    pub ih_load: u32,
    pub ih_ep: u32,
    pub ih_dcrc: u32,
    pub ih_os: u8,
    pub ih_arch: u8,
    pub ih_type: u8,
    pub ih_comp: u8,
    pub ih_name: [u8; IH_NMLEN],
}

impl UImageHeader {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let bytes: &[u8; UIMAGE_HEADER_SIZE] = buf.get(..UIMAGE_HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            ih_magic: be_u32(bytes, 0)?,
            ih_hcrc: be_u32(bytes, 4)?,
            ih_time: be_u32(bytes, 8)?,
            ih_size: be_u32(bytes, 12)?,
            ih_load: be_u32(bytes, 16)?,
            ih_ep: be_u32(bytes, 20)?,
            ih_dcrc: be_u32(bytes, 24)?,
            ih_os: bytes[28],
            ih_arch: bytes[29],
            ih_type: bytes[30],
            ih_comp: bytes[31],
            ih_name: bytes[32..64].try_into().ok()?,
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> Option<()> {
        let out = out.get_mut(..UIMAGE_HEADER_SIZE)?;
        put_be_u32(out, 0, self.ih_magic)?;
        put_be_u32(out, 4, self.ih_hcrc)?;
        put_be_u32(out, 8, self.ih_time)?;
        put_be_u32(out, 12, self.ih_size)?;
        put_be_u32(out, 16, self.ih_load)?;
        put_be_u32(out, 20, self.ih_ep)?;
        put_be_u32(out, 24, self.ih_dcrc)?;
        out[28] = self.ih_os;
        out[29] = self.ih_arch;
        out[30] = self.ih_type;
        out[31] = self.ih_comp;
        out[32..64].copy_from_slice(&self.ih_name);
        Some(())
    }

    /// Image name up to the first NUL
    pub fn name(&self) -> &str {
        let len = self.ih_name.iter().position(|&b| b == 0).unwrap_or(IH_NMLEN);
        core::str::from_utf8(&self.ih_name[..len]).unwrap_or("<invalid>")
    }

    /// CRC-32 of the header with `ih_hcrc` taken as zero
    pub fn compute_hcrc(&self) -> u32 {
        let mut raw = [0u8; UIMAGE_HEADER_SIZE];
        let mut copy = *self;
        copy.ih_hcrc = 0;
        // Cannot fail: `raw` is exactly one header long.
        let _ = copy.encode(&mut raw);
        crc32(&raw)
    }
}

pub fn os_name(os: u8) -> &'static str {
    match os {
        ih::OS_INVALID => "Invalid OS",
        ih::OS_NETBSD => "NetBSD",
        ih::OS_LINUX => "Linux",
        ih::OS_VXWORKS => "VxWorks",
        ih::OS_QNX => "QNX",
        ih::OS_PPCBOOT => "PPCBoot",
        _ => "Unknown OS",
    }
}

pub fn arch_name(arch: u8) -> &'static str {
    match arch {
        ih::CPU_INVALID => "Invalid CPU",
        ih::CPU_ALPHA => "Alpha",
        ih::CPU_ARM => "ARM",
        ih::CPU_I386 => "Intel x86",
        ih::CPU_IA64 => "IA64",
        ih::CPU_MIPS => "MIPS",
        ih::CPU_MIPS64 => "MIPS 64 Bit",
        ih::CPU_PPC => "PowerPC",
        ih::CPU_S390 => "IBM S390",
        ih::CPU_SH => "SuperH",
        ih::CPU_SPARC => "SPARC",
        ih::CPU_SPARC64 => "SPARC 64 Bit",
        _ => "Unknown Architecture",
    }
}

pub fn type_name(image_type: u8) -> &'static str {
    match image_type {
        ih::TYPE_INVALID => "Invalid Image",
        ih::TYPE_STANDALONE => "Standalone Program",
        ih::TYPE_KERNEL => "Kernel Image",
        ih::TYPE_RAMDISK => "RAMDisk Image",
        ih::TYPE_MULTI => "Multi-File Image",
        ih::TYPE_FIRMWARE => "Firmware",
        ih::TYPE_SCRIPT => "Script",
        _ => "Unknown Image",
    }
}

pub fn comp_name(comp: u8) -> &'static str {
    match comp {
        ih::COMP_NONE => "uncompressed",
        ih::COMP_GZIP => "gzip compressed",
        ih::COMP_BZIP2 => "bzip2 compressed",
        _ => "unknown compression",
    }
}

/// Byte count rendered as "xxx kB", "xxx.y kB", "xxx MB" or "xxx.y MB"
#[derive(Debug, Clone, Copy)]
pub struct SizeDisplay(pub u64);

impl fmt::Display for SizeDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.0;
        let (d, unit) = if size < (1 << 20) { (1u64 << 10, 'k') } else { (1u64 << 20, 'M') };
        let mut n = size / d;
        let mut m = (10 * (size - n * d) + d / 2) / d;
        if m >= 10 {
            n += 1;
            m = 0;
        }
        if m != 0 {
            write!(f, "{}.{} {}B", n, m, unit)
        } else {
            write!(f, "{} {}B", n, unit)
        }
    }
}

/// Log the header the way mkimage -l prints it
pub fn print_image_header<M>(mem: &M, image_base: PhysAddr, hdr: &UImageHeader)
where
    M: PhysicalMemory + ?Sized,
{
    log::info!("   Image Name:   {}", hdr.name());
    log::info!(
        "   Image Type:   {} {} {} ({})",
        arch_name(hdr.ih_arch),
        os_name(hdr.ih_os),
        type_name(hdr.ih_type),
        comp_name(hdr.ih_comp)
    );
    log::info!(
        "   Data Size:    {} Bytes = {}",
        hdr.ih_size,
        SizeDisplay(hdr.ih_size as u64)
    );
    log::info!("   Load Address: {:#010x}", hdr.ih_load);
    log::info!("   Entry Point:  {:#010x}", hdr.ih_ep);

    if hdr.ih_type == ih::TYPE_MULTI {
        log::info!("   Contents:");
        let table = image_base + UIMAGE_HEADER_SIZE as u64;
        let listed = (hdr.ih_size as usize / 4).min(MAX_MULTI_LISTED);
        let Ok(lens) = mem.read(table, listed * 4) else {
            return;
        };
        for (i, len) in lens
            .chunks_exact(4)
            .filter_map(|c| be_u32(c, 0))
            .take_while(|&len| len != 0)
            .enumerate()
        {
            log::info!("   Image {}: {:8} Bytes = {}", i, len, SizeDisplay(len as u64));
        }
    }
}

/// Result of a successful uImage load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UImageLoad {
    pub entry: PhysAddr,
    pub load_addr: PhysAddr,
    pub flavor: OsFlavor,
    /// `false` for execute-in-place images
    pub copied: bool,
}

/// Load the uImage at `image_base`.
///
/// All header checks, including the compression gate, run before the
/// payload is touched.
pub fn load_uimage<M>(mem: &mut M, image_base: PhysAddr, verify_crc: bool) -> Result<UImageLoad, LoadError>
where
    M: PhysicalMemory + ?Sized,
{
    log::info!("## Checking Image at {:#010x} ...", image_base);
    let hdr = UImageHeader::decode(mem.read(image_base, UIMAGE_HEADER_SIZE)?)
        .ok_or(LoadError::Truncated)?;

    if hdr.ih_magic != IH_MAGIC {
        log::error!("   Bad Magic Number");
        return Err(LoadError::BadMagic);
    }
    print_image_header(&*mem, image_base, &hdr);

    let flavor = OsFlavor::from_ih_os(hdr.ih_os).ok_or_else(|| {
        log::error!("unsupported target OS: {}", hdr.ih_os);
        LoadError::UnsupportedOs(hdr.ih_os)
    })?;

    if hdr.ih_comp != ih::COMP_NONE {
        log::error!("unsupported image compression type: {}", comp_name(hdr.ih_comp));
        return Err(LoadError::UnsupportedCompression(hdr.ih_comp));
    }

    let src_addr = image_base + UIMAGE_HEADER_SIZE as u64;
    let load_addr = hdr.ih_load as PhysAddr;
    let size = hdr.ih_size as usize;

    if verify_crc {
        if hdr.compute_hcrc() != hdr.ih_hcrc {
            return Err(LoadError::BadHeaderCrc);
        }
        let mut dcrc = Crc32::new();
        dcrc.update(mem.read(src_addr, size)?);
        if dcrc.finish() != hdr.ih_dcrc {
            return Err(LoadError::BadDataCrc);
        }
        log::info!("   Verifying Checksum ... OK");
    }

    let copied = load_addr != src_addr;
    if copied {
        log::info!(
            "copying image to {:#x} from {:#x}, size = {:#x} bytes",
            load_addr,
            src_addr,
            size
        );
        mem.copy(load_addr, src_addr, size)?;
    } else {
        log::info!("image is XIP, start image directly");
    }

    Ok(UImageLoad {
        entry: hdr.ih_ep as PhysAddr,
        load_addr,
        flavor,
        copied,
    })
}
