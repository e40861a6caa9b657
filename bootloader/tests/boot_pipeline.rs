//! End-to-end boot attempts against a simulated board
//!
//! Each test stages an image and a device tree in one RAM buffer, runs the
//! orchestrator with the board collaborators and records the final jump.

#[path = "../src/testutil.rs"]
mod testutil;

use ppc_bootloader::boot_stage::BootConfig;
use ppc_bootloader::core::boot_state::BootPhase;
use ppc_bootloader::kernel_if::kernel_entry::{epapr_args, TransferError, BOOT_MAP_SIZE, EPAPR_MAGIC};
use ppc_bootloader::kernel_if::load_error::LoadError;
use ppc_bootloader::protocol::fdt::DtBlob;
use ppc_bootloader::utils::boot_traits::{FixedCoreId, MemDesc, StaticMemoryMap};
use ppc_bootloader::utils::mem_util::{BufferMemory, PhysAddr};
use ppc_bootloader::{BootError, BootOrchestrator, EntryTrampoline, PhysicalMemory};

use testutil::{board_tree, uimage, ElfBuilder, Segment, UImageSpec};

const BASE: u64 = 0x0200_0000;
const RAM: usize = 0x20_0000;
const IMAGE: u64 = BASE;
const KERNEL: u64 = BASE + 0x10_0000;
const DTB: u64 = BASE + 0x1C_0000;

/// Trampoline that records the jump and returns
#[derive(Default)]
struct RecordingTrampoline {
    calls: Vec<(PhysAddr, [usize; 7])>,
}

impl EntryTrampoline for RecordingTrampoline {
    fn enter(&mut self, entry: PhysAddr, args: [usize; 7]) {
        self.calls.push((entry, args));
    }
}

type Board<'a> = BootOrchestrator<BufferMemory<'a>, FixedCoreId, StaticMemoryMap, RecordingTrampoline>;

fn board(ram: &mut [u8], config: BootConfig) -> Board<'_> {
    BootOrchestrator::new(
        BufferMemory::new(BASE, ram),
        FixedCoreId(0),
        StaticMemoryMap::new(&[MemDesc {
            addr: 0,
            size: 0x2000_0000,
        }]),
        RecordingTrampoline::default(),
        config,
    )
}

fn stage(ram: &mut [u8], addr: u64, bytes: &[u8]) {
    let off = (addr - BASE) as usize;
    ram[off..off + bytes.len()].copy_from_slice(bytes);
}

fn entered(orch: &Board<'_>) -> Vec<(PhysAddr, [usize; 7])> {
    orch.trampoline().calls.clone()
}

#[test]
fn test_vxworks_elf_with_tree() {
    let mut ram = vec![0u8; RAM];
    let image = ElfBuilder::new(KERNEL as u32 + 0x100)
        .segment(Segment::new(KERNEL as u32, vec![0x38; 0x1000], 0x3000))
        .segment(Segment::new(KERNEL as u32 + 0x4000, vec![0x60; 0x10], 0x10))
        .build_tag("CPU=PPCE500V2 tag VXW7")
        .build();
    stage(&mut ram, IMAGE, &image);
    stage(&mut ram, DTB, &board_tree(&[0, 1], Some(2), Some(1), true, true, 0));

    let mut config = BootConfig::new();
    config.image_window_size = image.len();
    config.apply_cmdline_flags("bootargs=\"console=ttyS0,115200\" memory=overwrite");
    let mut orch = board(&mut ram, config);

    let err = orch.boot(IMAGE, Some(DTB)).unwrap_err();
    assert_eq!(err, BootError::Transfer(TransferError::EntryReturned));
    assert!(err.image_was_loaded());
    assert_eq!(orch.phase(), BootPhase::Failed);
    assert_eq!(entered(&orch), vec![(KERNEL + 0x100, epapr_args(DTB))]);

    let kernel = orch.memory().read(KERNEL, 0x4010).unwrap();
    assert!(kernel[..0x1000].iter().all(|&b| b == 0x38));
    assert!(kernel[0x1000..0x3000].iter().all(|&b| b == 0));
    assert!(kernel[0x4000..].iter().all(|&b| b == 0x60));

    let mut tree = orch.memory().read(DTB, 0x4000).unwrap().to_vec();
    let blob = DtBlob::new(&mut tree);
    let memory = blob.path_offset("/memory").unwrap();
    assert_eq!(
        blob.getprop(memory, "reg"),
        Ok(&[0u8, 0, 0, 0, 0, 0, 0, 0, 0x20, 0, 0, 0][..])
    );
    let cpu1 = blob.path_offset("/cpus/PowerPC,P2020@1").unwrap();
    assert_eq!(blob.getprop_u64(cpu1, "cpu-release-addr"), Ok(0x0fff_f040));
}

#[test]
fn test_linux_uimage_copied_to_load_address() {
    let mut ram = vec![0u8; RAM];
    let payload: Vec<u8> = (0..0x800u32).map(|i| i as u8).collect();
    let spec = UImageSpec {
        os: 5,
        load: KERNEL as u32,
        entry: KERNEL as u32,
        name: "Linux-6.6.0",
        ..UImageSpec::default()
    };
    stage(&mut ram, IMAGE, &uimage(&spec, &payload));
    stage(&mut ram, DTB, &board_tree(&[0], None, None, false, false, 0));

    let mut config = BootConfig::new();
    config.apply_cmdline_flags("verify-crc");
    let mut orch = board(&mut ram, config);

    assert!(matches!(orch.boot(IMAGE, Some(DTB)), Err(BootError::Transfer(_))));
    assert_eq!(orch.memory().read(KERNEL, payload.len()).unwrap(), &payload[..]);

    let calls = entered(&orch);
    assert_eq!(calls.len(), 1);
    let (entry, regs) = calls[0];
    assert_eq!(entry, KERNEL);
    assert_eq!(regs[0], DTB as usize);
    assert_eq!(regs[3], EPAPR_MAGIC as usize);
    assert_eq!(regs[4], BOOT_MAP_SIZE as usize);
}

#[test]
fn test_corrupted_uimage_rejected_with_crc_check() {
    let mut ram = vec![0u8; RAM];
    let mut image = uimage(
        &UImageSpec {
            load: KERNEL as u32,
            entry: KERNEL as u32,
            ..UImageSpec::default()
        },
        &[0xAB; 0x200],
    );
    image[64 + 0x10] ^= 0xFF;
    stage(&mut ram, IMAGE, &image);

    let mut config = BootConfig::new();
    config.verify_uimage_crc = true;
    let mut orch = board(&mut ram, config);

    assert_eq!(
        orch.boot(IMAGE, None),
        Err(BootError::UImageFormat(LoadError::BadDataCrc))
    );
    assert_eq!(orch.memory().writes(), 0);
    assert!(entered(&orch).is_empty());
}

#[test]
fn test_compressed_uimage_never_copied() {
    let mut ram = vec![0u8; RAM];
    let spec = UImageSpec {
        comp: 1,
        load: KERNEL as u32,
        entry: KERNEL as u32,
        ..UImageSpec::default()
    };
    stage(&mut ram, IMAGE, &uimage(&spec, &[0x1F, 0x8B, 0x08, 0x00]));
    let mut orch = board(&mut ram, BootConfig::new());

    let err = orch.boot(IMAGE, None).unwrap_err();
    assert_eq!(err, BootError::UImageFormat(LoadError::UnsupportedCompression(1)));
    assert!(!err.image_was_loaded());
    assert_eq!(orch.memory().writes(), 0);
}

#[test]
fn test_raw_binary_without_tree() {
    let mut ram = vec![0u8; RAM];
    stage(&mut ram, IMAGE, &[0x7C, 0x3F, 0x0B, 0x78]);
    let mut orch = board(&mut ram, BootConfig::new());

    assert!(orch.boot(IMAGE, None).is_err());
    assert_eq!(entered(&orch), vec![(IMAGE, epapr_args(0))]);
    assert_eq!(orch.memory().writes(), 0);
}

#[test]
fn test_error_codes_distinguish_stages() {
    let mut ram = vec![0u8; RAM];
    stage(&mut ram, IMAGE, b"\x7fELF\x02\x02\x01");
    let mut orch = board(&mut ram, BootConfig::new());

    let err = orch.boot(IMAGE, None).unwrap_err();
    assert_eq!(err.as_error_code() & 0xF000, 0x4000);
    assert!(err.to_string().contains("classify"));
}
