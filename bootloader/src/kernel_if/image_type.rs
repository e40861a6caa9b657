//! Boot Image Classifier
//!
//! Decides from the first 64 bytes at the load address which loader owns
//! the image. The 64-byte window covers both the uImage header and the
//! ELF identification bytes.

use crate::kernel_if::elf32::{ELFCLASS32, ELFCLASS64, ELF_MAGIC, EI_CLASS};
use crate::kernel_if::uimage::IH_MAGIC;

/// Bytes inspected by [`classify`]
pub const CLASSIFY_WINDOW: usize = 64;

/// Binary format of a resident image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ImageKind {
    UImage = 1,
    Elf32 = 2,
    Elf64 = 3,
    RawBinary = 4,
    Unknown = 5,
}

impl ImageKind {
    pub fn description(&self) -> &'static str {
        match self {
            Self::UImage => "Legacy uImage",
            Self::Elf32 => "ELF32 executable",
            Self::Elf64 => "ELF64 executable",
            Self::RawBinary => "Raw binary",
            Self::Unknown => "Unknown image format",
        }
    }

    /// Whether this loader can place and enter the image
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::UImage | Self::Elf32 | Self::RawBinary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyError {
    /// Fewer than 64 bytes available at the image address
    WindowTooShort,
    /// Image carries the ELF signature with an unknown class
    Unrecognized,
}

impl ClassifyError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifyError::WindowTooShort => "Image window shorter than 64 bytes",
            ClassifyError::Unrecognized => "uImage or ELF not detected",
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ClassifyError::WindowTooShort => 1,
            ClassifyError::Unrecognized => 2,
        }
    }
}

/// Classify the image whose first bytes are `window`.
///
/// Only `window[..64]` is inspected; shorter windows are rejected.
pub fn classify(window: &[u8]) -> Result<ImageKind, ClassifyError> {
    let header: &[u8; CLASSIFY_WINDOW] = window
        .get(..CLASSIFY_WINDOW)
        .and_then(|w| w.try_into().ok())
        .ok_or(ClassifyError::WindowTooShort)?;

    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if magic == IH_MAGIC {
        return Ok(ImageKind::UImage);
    }

    if header[..4] == ELF_MAGIC {
        return Ok(match header[EI_CLASS] {
            ELFCLASS32 => ImageKind::Elf32,
            ELFCLASS64 => ImageKind::Elf64,
            _ => ImageKind::Unknown,
        });
    }

    // A full window is never empty, so anything else is a raw binary.
    Ok(ImageKind::RawBinary)
}
