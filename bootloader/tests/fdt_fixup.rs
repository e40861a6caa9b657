//! Device tree fixup checked by an independent parser

#[path = "../src/testutil.rs"]
mod testutil;

use ppc_bootloader::protocol::fdt::fixup::{fixup, FixupError, FixupParams, FixupStep, MemoryNodePolicy};
use ppc_bootloader::protocol::fdt::{DtBlob, FdtError, FDT_PADDING};
use ppc_bootloader::protocol::spin_table::SPIN_TABLE_ENTRY_SIZE;
use ppc_bootloader::utils::boot_traits::MemDesc;

use testutil::{board_tree, FdtBuilder};

const SPIN: u64 = 0x0fff_f000;
const RAM: [MemDesc; 1] = [MemDesc {
    addr: 0,
    size: 0x4000_0000,
}];

fn params(bootargs: &str, core: u32, entries: u32) -> FixupParams<'_> {
    FixupParams {
        bootargs,
        spin_table_addr: SPIN,
        spin_table_entries: entries,
        this_core_id: core,
        memory_policy: MemoryNodePolicy::CreateIfMissing,
    }
}

/// Run fixup and return the blob trimmed to its new totalsize
fn fixed(mut buf: Vec<u8>, p: &FixupParams<'_>) -> Vec<u8> {
    let total = {
        let mut blob = DtBlob::new(&mut buf);
        fixup(&mut blob, p, &RAM).unwrap();
        blob.totalsize() as usize
    };
    buf.truncate(total);
    buf
}

#[test]
fn test_three_cores_released_through_spin_table() {
    let tree = board_tree(&[0, 1, 2], Some(1), Some(1), true, false, FDT_PADDING as usize);
    let out = fixed(tree, &params("root=/dev/ram rw", 1, 3));
    let fdt = fdt::Fdt::new(&out).unwrap();

    let status = |path: &str| fdt.find_node(path).and_then(|n| n.property("status")).map(|p| p.value);
    assert_eq!(status("/cpus/PowerPC,P2020@1"), Some(&b"okay\0"[..]));
    assert_eq!(status("/cpus/PowerPC,P2020@0"), Some(&b"disabled\0"[..]));
    assert_eq!(status("/cpus/PowerPC,P2020@2"), Some(&b"disabled\0"[..]));

    let release = |path: &str| {
        fdt.find_node(path)
            .and_then(|n| n.property("cpu-release-addr"))
            .and_then(|p| p.as_usize())
    };
    assert_eq!(release("/cpus/PowerPC,P2020@0"), Some(SPIN as usize));
    assert_eq!(
        release("/cpus/PowerPC,P2020@2"),
        Some(SPIN as usize + 2 * SPIN_TABLE_ENTRY_SIZE)
    );
    assert_eq!(release("/cpus/PowerPC,P2020@1"), None);

    let method = fdt
        .find_node("/cpus/PowerPC,P2020@0")
        .and_then(|n| n.property("enable-method"))
        .map(|p| p.value);
    assert_eq!(method, Some(&b"spin-table\0"[..]));

    let bootargs = fdt
        .find_node("/chosen")
        .and_then(|n| n.property("bootargs"))
        .map(|p| p.value);
    assert_eq!(bootargs, Some(&b"root=/dev/ram rw\0"[..]));
}

#[test]
fn test_spin_table_reserved() {
    let mut b = FdtBuilder::new();
    b.reserve(0x0080_0000, 0x1000);
    b.begin_node("");
    b.begin_node("cpus");
    b.begin_node("cpu@0").prop_u32("reg", 0).end_node();
    b.end_node();
    b.end_node();
    let out = fixed(b.finish(FDT_PADDING as usize), &params("", 0, 2));

    let fdt = fdt::Fdt::new(&out).unwrap();
    let rsv: Vec<(usize, usize)> = fdt
        .memory_reservations()
        .map(|r| (r.address() as usize, r.size()))
        .collect();
    assert_eq!(
        rsv,
        vec![(0x0080_0000, 0x1000), (SPIN as usize, 2 * SPIN_TABLE_ENTRY_SIZE)]
    );
}

#[test]
fn test_memory_node_created_with_root_cells() {
    let tree = board_tree(&[0], Some(2), Some(2), false, false, FDT_PADDING as usize);
    let out = fixed(tree, &params("", 0, 2));
    let fdt = fdt::Fdt::new(&out).unwrap();

    let memory = fdt.find_node("/memory").unwrap();
    assert_eq!(memory.property("device_type").map(|p| p.value), Some(&b"memory\0"[..]));
    let reg = memory.property("reg").unwrap().value;
    assert_eq!(reg.len(), 16);
    assert_eq!(u64::from_be_bytes(reg[8..].try_into().unwrap()), 0x4000_0000);
}

#[test]
fn test_unrelated_nodes_survive() {
    let tree = board_tree(&[0, 1], Some(1), Some(1), true, true, FDT_PADDING as usize);
    let out = fixed(tree, &params("console=ttyS0", 0, 2));
    let fdt = fdt::Fdt::new(&out).unwrap();

    let serial = fdt.find_node("/soc@ffe00000/serial@4500").unwrap();
    assert_eq!(
        serial.property("compatible").map(|p| p.value),
        Some(&b"fsl,ns16550\0ns16550\0"[..])
    );
    let stdout = fdt
        .find_node("/chosen")
        .and_then(|n| n.property("stdout-path"))
        .map(|p| p.value);
    assert_eq!(stdout, Some(&b"/soc/serial@4500\0"[..]));
    assert!(fdt.find_node("/cpus/PowerPC,P2020@0/l2-cache").is_some());
}

#[test]
fn test_no_room_for_padding() {
    let mut buf = board_tree(&[0, 1], None, None, true, false, 0x100);
    let mut blob = DtBlob::new(&mut buf);
    assert_eq!(
        fixup(&mut blob, &params("", 0, 2), &RAM),
        Err(FixupError {
            step: FixupStep::Padding,
            code: FdtError::NoSpace,
        })
    );
}

#[test]
fn test_core_without_spin_entry_rejected() {
    let mut buf = board_tree(&[0, 1, 2, 3], Some(1), Some(1), true, false, FDT_PADDING as usize);
    let mut blob = DtBlob::new(&mut buf);
    assert_eq!(
        fixup(&mut blob, &params("", 0, 2), &RAM),
        Err(FixupError {
            step: FixupStep::CpuNodes,
            code: FdtError::BadValue,
        })
    );
    assert_eq!(blob.num_mem_rsv(), Ok(0));
}
