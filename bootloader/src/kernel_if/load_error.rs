//! Image loader failures shared by the ELF32 and uImage paths

use crate::utils::mem_util::MemoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    BadMagic,
    BadHeaderSize,
    BadMachine,
    BadType,
    BadProgramHeaders,
    BadSectionHeaders,
    MissingBuildTag,
    SegmentOutOfBounds,
    TooManySegments,
    Truncated,
    UnsupportedOs(u8),
    UnsupportedCompression(u8),
    BadHeaderCrc,
    BadDataCrc,
    Memory(MemoryError),
}

impl LoadError {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadError::BadMagic => "Bad magic number",
            LoadError::BadHeaderSize => "ELF32 header size is incorrect",
            LoadError::BadMachine => "Not a PowerPC image",
            LoadError::BadType => "No relocatable or executable contents",
            LoadError::BadProgramHeaders => "Program header table is invalid",
            LoadError::BadSectionHeaders => "Section header table is invalid",
            LoadError::MissingBuildTag => "Build tag missing (not a VxWorks 7 kernel image)",
            LoadError::SegmentOutOfBounds => "Segment exceeds image bounds",
            LoadError::TooManySegments => "Too many loadable segments",
            LoadError::Truncated => "Image truncated",
            LoadError::UnsupportedOs(_) => "Unsupported target OS",
            LoadError::UnsupportedCompression(_) => "Unsupported image compression type",
            LoadError::BadHeaderCrc => "Header checksum mismatch",
            LoadError::BadDataCrc => "Data checksum mismatch",
            LoadError::Memory(e) => e.as_str(),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            LoadError::BadMagic => 0x01,
            LoadError::BadHeaderSize => 0x02,
            LoadError::BadMachine => 0x03,
            LoadError::BadType => 0x04,
            LoadError::BadProgramHeaders => 0x05,
            LoadError::BadSectionHeaders => 0x06,
            LoadError::MissingBuildTag => 0x07,
            LoadError::SegmentOutOfBounds => 0x08,
            LoadError::TooManySegments => 0x09,
            LoadError::Truncated => 0x0A,
            LoadError::UnsupportedOs(_) => 0x0B,
            LoadError::UnsupportedCompression(_) => 0x0C,
            LoadError::BadHeaderCrc => 0x0D,
            LoadError::BadDataCrc => 0x0E,
            LoadError::Memory(e) => 0x80 + e.code(),
        }
    }
}

impl From<MemoryError> for LoadError {
    fn from(e: MemoryError) -> Self {
        LoadError::Memory(e)
    }
}
