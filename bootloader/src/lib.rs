//! PPC Bootloader Library
//!
//! Second-stage boot-image loader for e500 PowerPC boards. Classifies the
//! image resident in memory (ELF32, legacy uImage or raw binary), places it
//! at its load address, patches the flattened device tree for the running
//! configuration and enters the kernel with the ePAPR register convention.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_op_in_unsafe_fn)]

/// Core bootloader state tracking
pub mod core;

/// Kernel interface - classification, ELF32/uImage loading, entry
pub mod kernel_if;

/// Boot protocol - flattened device tree and spin table
pub mod protocol;

/// Boot configuration parsed from the bootline
pub mod boot_stage;

/// Application layer - boot orchestration
pub mod application;

/// Diagnostics - console logger
pub mod diagnostics;

/// Utility library - byte order, raw memory, command line, checksums
pub mod utils;

/// Error taxonomy for a boot attempt
pub mod error;

#[cfg(test)]
mod testutil;

pub use application::boot_orchestrator::{BootOrchestrator, BootRequest};
pub use error::{BootError, Result};
pub use kernel_if::image_type::{classify, ImageKind};
pub use utils::boot_traits::{
    CpuIdentity, EntryTrampoline, MemoryDescriptorProvider, PhysicalMemory,
};

// ============================================================================
// PANIC HANDLER
// ============================================================================

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &::core::panic::PanicInfo) -> ! {
    log::error!("panic: {}", info);
    loop {
        ::core::hint::spin_loop();
    }
}
