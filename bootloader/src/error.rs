//! Bootloader error handling
//!
//! Every stage of a boot attempt reports its own error type; this module
//! folds them into [`BootError`] so the shell gets a single code to print.
//! Nothing here is retried: all failures are structural problems with the
//! image or the tree, not transient conditions.

use core::fmt;

use crate::kernel_if::image_type::{ClassifyError, ImageKind};
use crate::kernel_if::kernel_entry::TransferError;
use crate::kernel_if::load_error::LoadError;
use crate::protocol::fdt::fixup::FixupError;
use crate::utils::mem_util::MemoryError;

/// Bootloader error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Window too short, or an ELF with an unrecognised class
    Classification(ClassifyError),

    /// ELF32 structural validation or segment placement failed
    ElfFormat(LoadError),

    /// uImage header rejected or payload copy failed
    UImageFormat(LoadError),

    /// Image recognised but not bootable by this loader (ELF64)
    UnsupportedImage(ImageKind),

    /// Image is in memory but the device tree could not be patched
    Fixup(FixupError),

    /// Entry point returned control
    Transfer(TransferError),

    /// Physical memory outside the accessible range
    Memory(MemoryError),
}

impl BootError {
    /// Convert to an error code suitable for the shell prompt
    pub fn as_error_code(&self) -> u32 {
        match self {
            BootError::Classification(e) => 0x1000 + e.code(),
            BootError::ElfFormat(e) => 0x2000 + e.code(),
            BootError::UImageFormat(e) => 0x3000 + e.code(),
            BootError::UnsupportedImage(kind) => 0x4000 + *kind as u32,
            BootError::Fixup(e) => 0x5000 + ((e.step as u32) << 4) + e.code.code(),
            BootError::Transfer(_) => 0x6000,
            BootError::Memory(e) => 0x7000 + e.code(),
        }
    }

    /// Get a human-readable description of the error
    pub fn description(&self) -> &'static str {
        match self {
            BootError::Classification(e) => e.as_str(),
            BootError::ElfFormat(e) => e.as_str(),
            BootError::UImageFormat(e) => e.as_str(),
            BootError::UnsupportedImage(kind) => kind.description(),
            BootError::Fixup(e) => e.code.as_str(),
            BootError::Transfer(e) => e.as_str(),
            BootError::Memory(e) => e.as_str(),
        }
    }

    /// Stage that produced the error, for the failure banner
    pub fn stage(&self) -> &'static str {
        match self {
            BootError::Classification(_) | BootError::UnsupportedImage(_) => "classify",
            BootError::ElfFormat(_) => "elf32 load",
            BootError::UImageFormat(_) => "uImage load",
            BootError::Fixup(e) => e.step.as_str(),
            BootError::Transfer(_) => "transfer",
            BootError::Memory(_) => "memory",
        }
    }

    /// Whether the kernel image already sits at its load address.
    ///
    /// Distinguishes "kernel loaded but tree rejected" from "nothing
    /// loaded" when diagnosing a failed boot.
    pub fn image_was_loaded(&self) -> bool {
        matches!(self, BootError::Fixup(_) | BootError::Transfer(_))
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BootError: {} failed: {} (code: {:#x})",
            self.stage(),
            self.description(),
            self.as_error_code()
        )
    }
}

impl From<ClassifyError> for BootError {
    fn from(e: ClassifyError) -> Self {
        BootError::Classification(e)
    }
}

impl From<FixupError> for BootError {
    fn from(e: FixupError) -> Self {
        BootError::Fixup(e)
    }
}

impl From<TransferError> for BootError {
    fn from(e: TransferError) -> Self {
        BootError::Transfer(e)
    }
}

impl From<MemoryError> for BootError {
    fn from(e: MemoryError) -> Self {
        BootError::Memory(e)
    }
}

/// Result type used throughout the bootloader
pub type Result<T = ()> = core::result::Result<T, BootError>;
