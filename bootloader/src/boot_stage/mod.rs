//! Boot Stage - configuration for a boot attempt

pub mod boot_config;

// Re-export commonly used types
pub use boot_config::BootConfig;
pub use crate::kernel_if::elf_loader::BuildTagPolicy;
pub use crate::protocol::fdt::fixup::MemoryNodePolicy;
