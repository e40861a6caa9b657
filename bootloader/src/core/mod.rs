//! Core - Bootloader state tracking

pub mod boot_state;
