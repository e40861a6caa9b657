//! Application Layer - Use case orchestration
//!
//! Drives one boot attempt through classification, loading, device tree
//! fixup and entry. Format knowledge stays in `kernel_if` and `protocol`.

pub mod boot_orchestrator;

pub use boot_orchestrator::{BoardOrchestrator, BootOrchestrator, BootRequest};
