// Boot configuration and runtime settings

use arrayvec::ArrayString;
use log::LevelFilter;

use crate::kernel_if::elf_loader::BuildTagPolicy;
use crate::protocol::fdt::fixup::{FixupParams, MemoryNodePolicy};
use crate::utils::boot_traits::MemDesc;
use crate::utils::cmdline::{parse_number, split_pair, CmdLine};
use crate::utils::mem_util::PhysAddr;

pub const MAX_BOOTARGS_LEN: usize = 512;

/// Spin table location on the P2020RDB
pub const DEFAULT_SPIN_TABLE_ADDR: PhysAddr = 0x0fff_f000;
pub const DEFAULT_SPIN_TABLE_ENTRIES: u32 = 2;

/// Bytes of the image window the ELF loader may reference
pub const DEFAULT_IMAGE_WINDOW: usize = 0x0100_0000;

/// Installed RAM on the P2020RDB
pub const BOARD_MEMORY: [MemDesc; 1] = [MemDesc {
    addr: 0,
    size: 0x4000_0000,
}];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    pub bootargs: ArrayString<MAX_BOOTARGS_LEN>,
    pub spin_table_addr: PhysAddr,
    pub spin_table_entries: u32,
    pub build_tag_policy: BuildTagPolicy,
    pub verify_uimage_crc: bool,
    pub memory_node_policy: MemoryNodePolicy,
    pub image_window_size: usize,
    pub log_level: LevelFilter,
}

impl BootConfig {
    pub fn new() -> Self {
        Self {
            bootargs: ArrayString::new(),
            spin_table_addr: DEFAULT_SPIN_TABLE_ADDR,
            spin_table_entries: DEFAULT_SPIN_TABLE_ENTRIES,
            build_tag_policy: BuildTagPolicy::Lenient,
            verify_uimage_crc: false,
            memory_node_policy: MemoryNodePolicy::CreateIfMissing,
            image_window_size: DEFAULT_IMAGE_WINDOW,
            log_level: LevelFilter::Info,
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.log_level >= LevelFilter::Debug
    }

    /// Replace the kernel boot arguments; fails if they do not fit
    pub fn set_bootargs(&mut self, args: &str) -> bool {
        match ArrayString::from(args) {
            Ok(s) => {
                self.bootargs = s;
                true
            }
            Err(_) => {
                log::warn!("bootargs longer than {} bytes ignored", MAX_BOOTARGS_LEN);
                false
            }
        }
    }

    /// Parse loader flags from a bootline
    ///
    /// Unknown or malformed parameters are skipped.
    ///
    /// # Example command lines
    /// - `bootargs="console=ttyS0,115200 root=/dev/ram" strict-tag`
    /// - `spin_table=0xffff000 spin_entries=4 memory=overwrite debug`
    pub fn apply_cmdline_flags(&mut self, cmdline: &str) {
        for arg in CmdLine::parse(cmdline).iter() {
            self.apply_single_flag(arg);
        }
    }

    /// Apply a single flag from command line
    fn apply_single_flag(&mut self, flag: &str) {
        match flag {
            "verbose" => self.log_level = LevelFilter::Debug,
            "debug" => self.log_level = LevelFilter::Trace,
            "strict-tag" => self.build_tag_policy = BuildTagPolicy::Strict,
            "lenient-tag" => self.build_tag_policy = BuildTagPolicy::Lenient,
            "verify-crc" => self.verify_uimage_crc = true,
            _ => {
                let Some((key, value)) = split_pair(flag) else {
                    log::debug!("cmdline: ignoring '{}'", flag);
                    return;
                };
                self.apply_key_value(key, value);
            }
        }
    }

    fn apply_key_value(&mut self, key: &str, value: &str) {
        match key {
            "bootargs" => {
                self.set_bootargs(value);
            }
            "spin_table" => match parse_number(value) {
                Some(addr) => self.spin_table_addr = addr,
                None => log::warn!("cmdline: bad spin_table '{}'", value),
            },
            "spin_entries" => match parse_number(value).and_then(|n| u32::try_from(n).ok()) {
                Some(n) => self.spin_table_entries = n,
                None => log::warn!("cmdline: bad spin_entries '{}'", value),
            },
            "memory" => match value {
                "skip" => self.memory_node_policy = MemoryNodePolicy::Skip,
                "create" => self.memory_node_policy = MemoryNodePolicy::CreateIfMissing,
                "overwrite" => self.memory_node_policy = MemoryNodePolicy::Overwrite,
                _ => log::warn!("cmdline: bad memory policy '{}'", value),
            },
            "image_size" => match parse_number(value).and_then(|n| usize::try_from(n).ok()) {
                Some(n) if n > 0 => self.image_window_size = n,
                _ => log::warn!("cmdline: bad image_size '{}'", value),
            },
            _ => log::debug!("cmdline: ignoring '{}={}'", key, value),
        }
    }

    /// Device tree fixup inputs for the core `this_core_id`
    pub fn fixup_params(&self, this_core_id: u32) -> FixupParams<'_> {
        FixupParams {
            bootargs: &self.bootargs,
            spin_table_addr: self.spin_table_addr,
            spin_table_entries: self.spin_table_entries,
            this_core_id,
            memory_policy: self.memory_node_policy,
        }
    }

    pub fn print_config(&self) {
        log::info!("Boot Configuration:");
        log::info!("  bootargs:     \"{}\"", self.bootargs);
        log::info!(
            "  spin table:   {:#x} ({} entries)",
            self.spin_table_addr,
            self.spin_table_entries
        );
        log::info!("  build tag:    {:?}", self.build_tag_policy);
        log::info!("  uImage CRC:   {}", if self.verify_uimage_crc { "verify" } else { "skip" });
        log::info!("  /memory:      {:?}", self.memory_node_policy);
        log::info!("  image window: {:#x}", self.image_window_size);
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::new()
    }
}
