//! Kernel Interface - classification, ELF32/uImage loading, entry

pub mod image_type;
pub mod load_error;
pub mod elf32;
pub mod elf_info;
pub mod elf_loader;
pub mod uimage;
pub mod kernel_entry;
