//! Boot protocol layer
//!
//! Structures shared with the kernel at handoff: the flattened device tree
//! and the ePAPR spin table used to release secondary cores.

pub mod fdt;
pub mod spin_table;
