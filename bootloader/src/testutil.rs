//! Synthetic boot images for tests
//!
//! Byte-level builders for ELF32, uImage and flattened device trees. Kept
//! free of crate paths so integration tests can include the same file.

#![allow(dead_code)]

pub const EM_PPC: u16 = 20;
const PT_LOAD: u32 = 1;
const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_DYNAMIC: u32 = 6;

fn push_be16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_be32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn pad_to(out: &mut Vec<u8>, align: usize) {
    while out.len() % align != 0 {
        out.push(0);
    }
}

/// One program header plus its file contents
#[derive(Clone)]
pub struct Segment {
    pub p_type: u32,
    pub paddr: u32,
    pub data: Vec<u8>,
    pub memsz: u32,
}

impl Segment {
    pub fn new(paddr: u32, data: Vec<u8>, memsz: u32) -> Self {
        Self { p_type: PT_LOAD, paddr, data, memsz }
    }

    pub fn with_type(mut self, p_type: u32) -> Self {
        self.p_type = p_type;
        self
    }
}

/// Big-endian ELF32 image builder
pub struct ElfBuilder {
    entry: u32,
    machine: u16,
    e_type: u16,
    segments: Vec<Segment>,
    build_tag: Option<String>,
    needed: Vec<String>,
    sections: bool,
}

impl ElfBuilder {
    pub fn new(entry: u32) -> Self {
        Self {
            entry,
            machine: EM_PPC,
            e_type: 2,
            segments: Vec::new(),
            build_tag: None,
            needed: Vec::new(),
            sections: true,
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn e_type(mut self, e_type: u16) -> Self {
        self.e_type = e_type;
        self
    }

    pub fn segment(mut self, seg: Segment) -> Self {
        self.segments.push(seg);
        self
    }

    pub fn build_tag(mut self, vars: &str) -> Self {
        self.build_tag = Some(vars.to_string());
        self
    }

    pub fn needed(mut self, libs: &[&str]) -> Self {
        self.needed = libs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn without_sections(mut self) -> Self {
        self.sections = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len();
        let mut body = Vec::new();
        let data_start = 52 + phnum * 32;

        // Segment contents, each 4-byte aligned
        let mut offsets = Vec::new();
        for seg in &self.segments {
            pad_to_abs(&mut body, data_start, 4);
            offsets.push((data_start + body.len()) as u32);
            body.extend_from_slice(&seg.data);
        }

        let (shoff, shnum, shstrndx) = if self.sections {
            self.append_sections(&mut body, data_start, &offsets)
        } else {
            (0, 0, 0)
        };
        self.assemble(&offsets, body, shoff, shnum, shstrndx)
    }

    /// Append section contents and the section header table to `body`.
    /// Returns `(e_shoff, e_shnum, e_shstrndx)`.
    fn append_sections(&self, body: &mut Vec<u8>, data_start: usize, offsets: &[u32]) -> (u32, u16, u16) {
        // (name, type, offset, size)
        let mut sections: Vec<(&str, u32, u32, u32)> = Vec::new();

        if let Some(tag) = &self.build_tag {
            pad_to_abs(body, data_start, 4);
            let off = (data_start + body.len()) as u32;
            let mut vars = b"CPU=PPCE500V2\0".to_vec();
            vars.extend_from_slice(tag.as_bytes());
            vars.push(0);
            body.extend_from_slice(&vars);
            sections.push((".wrs_build_vars", SHT_PROGBITS, off, vars.len() as u32));
        }

        if !self.needed.is_empty() {
            let (load_vaddr, load_off) = self
                .segments
                .iter()
                .zip(offsets)
                .find(|(s, _)| s.p_type == PT_LOAD)
                .map(|(s, &o)| (s.paddr, o))
                .unwrap_or((0, 0));
            let reloc = load_vaddr.wrapping_sub(load_off);

            pad_to_abs(body, data_start, 4);
            let dynstr_off = (data_start + body.len()) as u32;
            let mut dynstr = vec![0u8];
            let mut name_offs = Vec::new();
            for lib in &self.needed {
                name_offs.push(dynstr.len() as u32);
                dynstr.extend_from_slice(lib.as_bytes());
                dynstr.push(0);
            }
            body.extend_from_slice(&dynstr);
            sections.push((".dynstr", SHT_STRTAB, dynstr_off, dynstr.len() as u32));

            pad_to_abs(body, data_start, 4);
            let dyn_off = (data_start + body.len()) as u32;
            let mut dynamic = Vec::new();
            for off in &name_offs {
                push_be32(&mut dynamic, 1);
                push_be32(&mut dynamic, *off);
            }
            push_be32(&mut dynamic, 5);
            push_be32(&mut dynamic, dynstr_off.wrapping_add(reloc));
            push_be32(&mut dynamic, 0);
            push_be32(&mut dynamic, 0);
            body.extend_from_slice(&dynamic);
            sections.push((".dynamic", SHT_DYNAMIC, dyn_off, dynamic.len() as u32));
        }

        // Section name table goes last so every name is known
        let mut shstrtab = vec![0u8];
        let mut table = vec![(0u32, 0u32, 0u32, 0u32)];
        let shstr_name = 1u32;
        shstrtab.extend_from_slice(b".shstrtab\0");
        table.push((shstr_name, SHT_STRTAB, 0, 0));
        for (name, ty, off, size) in &sections {
            table.push((shstrtab.len() as u32, *ty, *off, *size));
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }
        pad_to_abs(body, data_start, 4);
        table[1].2 = (data_start + body.len()) as u32;
        table[1].3 = shstrtab.len() as u32;
        body.extend_from_slice(&shstrtab);

        pad_to_abs(body, data_start, 4);
        let shoff = (data_start + body.len()) as u32;
        for (name, ty, off, size) in &table {
            push_be32(body, *name);
            push_be32(body, *ty);
            push_be32(body, 0);
            push_be32(body, 0);
            push_be32(body, *off);
            push_be32(body, *size);
            for _ in 0..4 {
                push_be32(body, 0);
            }
        }
        (shoff, table.len() as u16, 1)
    }

    fn assemble(&self, offsets: &[u32], body: Vec<u8>, shoff: u32, shnum: u16, shstrndx: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 2, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        push_be16(&mut out, self.e_type);
        push_be16(&mut out, self.machine);
        push_be32(&mut out, 1);
        push_be32(&mut out, self.entry);
        push_be32(&mut out, 52);
        push_be32(&mut out, shoff);
        push_be32(&mut out, 0x8000_0000);
        push_be16(&mut out, 52);
        push_be16(&mut out, 32);
        push_be16(&mut out, self.segments.len() as u16);
        push_be16(&mut out, 40);
        push_be16(&mut out, shnum);
        push_be16(&mut out, shstrndx);

        for (seg, off) in self.segments.iter().zip(offsets) {
            push_be32(&mut out, seg.p_type);
            push_be32(&mut out, *off);
            push_be32(&mut out, seg.paddr);
            push_be32(&mut out, seg.paddr);
            push_be32(&mut out, seg.data.len() as u32);
            push_be32(&mut out, seg.memsz);
            push_be32(&mut out, 7);
            push_be32(&mut out, 4);
        }
        out.extend_from_slice(&body);
        out
    }
}

fn pad_to_abs(body: &mut Vec<u8>, start: usize, align: usize) {
    while (start + body.len()) % align != 0 {
        body.push(0);
    }
}

/// Bitwise CRC-32 (IEEE), independent of the crate's table version
pub fn crc32_ref(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in data {
        crc ^= b as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}

/// Legacy uImage header fields
#[derive(Clone)]
pub struct UImageSpec {
    pub os: u8,
    pub arch: u8,
    pub image_type: u8,
    pub comp: u8,
    pub load: u32,
    pub entry: u32,
    pub name: &'static str,
}

impl Default for UImageSpec {
    fn default() -> Self {
        Self {
            os: 14,
            arch: 7,
            image_type: 2,
            comp: 0,
            load: 0,
            entry: 0,
            name: "VxWorks7",
        }
    }
}

/// Build a uImage with valid header and data CRCs
pub fn uimage(spec: &UImageSpec, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + payload.len());
    push_be32(&mut out, 0x2705_1956);
    push_be32(&mut out, 0);
    push_be32(&mut out, 0x5F00_0000);
    push_be32(&mut out, payload.len() as u32);
    push_be32(&mut out, spec.load);
    push_be32(&mut out, spec.entry);
    push_be32(&mut out, crc32_ref(payload));
    out.extend_from_slice(&[spec.os, spec.arch, spec.image_type, spec.comp]);
    let mut name = [0u8; 32];
    let n = spec.name.len().min(32);
    name[..n].copy_from_slice(&spec.name.as_bytes()[..n]);
    out.extend_from_slice(&name);
    let hcrc = crc32_ref(&out[..64]);
    out[4..8].copy_from_slice(&hcrc.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Flattened device tree (version 17) builder
pub struct FdtBuilder {
    rsv: Vec<(u64, u64)>,
    structure: Vec<u8>,
    strings: Vec<u8>,
    boot_cpuid: u32,
}

impl FdtBuilder {
    pub fn new() -> Self {
        Self {
            rsv: Vec::new(),
            structure: Vec::new(),
            strings: Vec::new(),
            boot_cpuid: 0,
        }
    }

    pub fn reserve(&mut self, addr: u64, size: u64) -> &mut Self {
        self.rsv.push((addr, size));
        self
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        push_be32(&mut self.structure, 1);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        pad_to(&mut self.structure, 4);
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        push_be32(&mut self.structure, 2);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        push_be32(&mut self.structure, 4);
        self
    }

    fn name_offset(&mut self, name: &str) -> u32 {
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        off
    }

    pub fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let nameoff = self.name_offset(name);
        push_be32(&mut self.structure, 3);
        push_be32(&mut self.structure, value.len() as u32);
        push_be32(&mut self.structure, nameoff);
        self.structure.extend_from_slice(value);
        pad_to(&mut self.structure, 4);
        self
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop(name, &value.to_be_bytes())
    }

    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.prop(name, &bytes)
    }

    /// Serialise; the returned buffer has `slack` spare bytes past totalsize
    pub fn finish(&mut self, slack: usize) -> Vec<u8> {
        let mut structure = self.structure.clone();
        push_be32(&mut structure, 9);

        let off_rsv = 40usize;
        let rsv_len = (self.rsv.len() + 1) * 16;
        let off_struct = off_rsv + rsv_len;
        let off_strings = off_struct + structure.len();
        let total = off_strings + self.strings.len();

        let mut out = Vec::with_capacity(total + slack);
        for v in [
            0xd00d_feedu32,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            off_rsv as u32,
            17,
            16,
            self.boot_cpuid,
            self.strings.len() as u32,
            structure.len() as u32,
        ] {
            push_be32(&mut out, v);
        }
        for (addr, size) in &self.rsv {
            out.extend_from_slice(&addr.to_be_bytes());
            out.extend_from_slice(&size.to_be_bytes());
        }
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&structure);
        out.extend_from_slice(&self.strings);
        out.resize(total + slack, 0);
        out
    }
}

impl Default for FdtBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A P2020-style tree with one `/cpus/cpu@N` node per entry of `cpu_regs`.
///
/// `address_cells`/`size_cells` of `None` leave the root property out.
pub fn board_tree(
    cpu_regs: &[u32],
    address_cells: Option<u32>,
    size_cells: Option<u32>,
    with_chosen: bool,
    with_memory: bool,
    slack: usize,
) -> Vec<u8> {
    let mut b = FdtBuilder::new();
    b.begin_node("");
    b.prop_str("model", "fsl,P2020RDB");
    b.prop_str("compatible", "fsl,P2020RDB");
    if let Some(ac) = address_cells {
        b.prop_u32("#address-cells", ac);
    }
    if let Some(sc) = size_cells {
        b.prop_u32("#size-cells", sc);
    }

    b.begin_node("cpus");
    b.prop_u32("#address-cells", 1);
    b.prop_u32("#size-cells", 0);
    for reg in cpu_regs {
        b.begin_node(&format!("PowerPC,P2020@{}", reg));
        b.prop_str("device_type", "cpu");
        b.prop_u32("reg", *reg);
        b.begin_node("l2-cache");
        b.prop_u32("reg", 0xFF);
        b.end_node();
        b.end_node();
    }
    b.end_node();

    if with_memory {
        b.begin_node("memory");
        b.prop_str("device_type", "memory");
        b.prop("reg", &[0u8; 12]);
        b.end_node();
    }
    if with_chosen {
        b.begin_node("chosen");
        b.prop_str("stdout-path", "/soc/serial@4500");
        b.end_node();
    }

    b.begin_node("soc@ffe00000");
    b.prop_u32("#address-cells", 1);
    b.begin_node("serial@4500");
    b.prop_str("compatible", "fsl,ns16550\0ns16550");
    b.end_node();
    b.end_node();

    b.end_node();
    b.finish(slack)
}
