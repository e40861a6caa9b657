//! Utility Library - byte order, raw memory, command line, checksums

pub mod endian;
pub mod mem_util;
pub mod cmdline;
pub mod boot_traits;
pub mod crc32;
