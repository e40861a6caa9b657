//! Diagnostics - console logging

pub mod boot_log;

// Re-export key diagnostics components
pub use boot_log::{init, ConsoleSink, MemorySink};
