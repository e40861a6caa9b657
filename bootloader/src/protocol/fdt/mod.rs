//! Flattened device tree support
//!
//! `blob` edits a DTB in place, `fixup` applies the boot-time patches and
//! `print` dumps a tree to the log.

pub mod blob;
pub mod fixup;
pub mod print;

pub use blob::DtBlob;

pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// Structure block tokens
pub const FDT_BEGIN_NODE: u32 = 0x1;
pub const FDT_END_NODE: u32 = 0x2;
pub const FDT_PROP: u32 = 0x3;
pub const FDT_NOP: u32 = 0x4;
pub const FDT_END: u32 = 0x9;

pub const FDT_TAGSIZE: usize = 4;

pub const FDT_FIRST_SUPPORTED_VERSION: u32 = 0x10;
pub const FDT_LAST_SUPPORTED_VERSION: u32 = 0x11;

/// Header length for version 17 blobs
pub const FDT_V17_HEADER_SIZE: usize = 40;
/// Version 16 headers lack `size_dt_struct`
pub const FDT_V16_HEADER_SIZE: usize = 36;

/// One memory reservation entry (address, size)
pub const FDT_RESERVE_ENTRY_SIZE: usize = 16;

/// Spare bytes guaranteed after the blob once fixup has run
pub const FDT_PADDING: u32 = 0x3000;

/// Device tree error codes; values match libfdt's `FDT_ERR_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FdtError {
    NotFound = 1,
    Exists = 2,
    NoSpace = 3,
    BadOffset = 4,
    BadPath = 5,
    BadPhandle = 6,
    BadState = 7,
    Truncated = 8,
    BadMagic = 9,
    BadVersion = 10,
    BadStructure = 11,
    BadLayout = 12,
    Internal = 13,
    BadNCells = 14,
    BadValue = 15,
}

impl FdtError {
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// libfdt `fdt_strerror` name
    pub fn as_str(&self) -> &'static str {
        match self {
            FdtError::NotFound => "FDT_ERR_NOTFOUND",
            FdtError::Exists => "FDT_ERR_EXISTS",
            FdtError::NoSpace => "FDT_ERR_NOSPACE",
            FdtError::BadOffset => "FDT_ERR_BADOFFSET",
            FdtError::BadPath => "FDT_ERR_BADPATH",
            FdtError::BadPhandle => "FDT_ERR_BADPHANDLE",
            FdtError::BadState => "FDT_ERR_BADSTATE",
            FdtError::Truncated => "FDT_ERR_TRUNCATED",
            FdtError::BadMagic => "FDT_ERR_BADMAGIC",
            FdtError::BadVersion => "FDT_ERR_BADVERSION",
            FdtError::BadStructure => "FDT_ERR_BADSTRUCTURE",
            FdtError::BadLayout => "FDT_ERR_BADLAYOUT",
            FdtError::Internal => "FDT_ERR_INTERNAL",
            FdtError::BadNCells => "FDT_ERR_BADNCELLS",
            FdtError::BadValue => "FDT_ERR_BADVALUE",
        }
    }
}

impl core::fmt::Display for FdtError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_match_libfdt() {
        assert_eq!(FdtError::NotFound.code(), 1);
        assert_eq!(FdtError::NoSpace.code(), 3);
        assert_eq!(FdtError::BadLayout.code(), 12);
        assert_eq!(FdtError::BadValue.code(), 15);
        assert_eq!(FdtError::BadVersion.as_str(), "FDT_ERR_BADVERSION");
    }
}
