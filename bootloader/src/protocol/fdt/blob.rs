//! In-place flattened device tree editor
//!
//! Works directly on the blob bytes with libfdt semantics: node and
//! property offsets are relative to the start of the structure block, and
//! every edit shifts the blocks that follow it within `totalsize`. The
//! region past `totalsize` up to the end of the backing buffer is the only
//! room the editor may grow into.

use crate::protocol::fdt::*;
use crate::utils::endian::{be_u32, be_u64, c_str_at, put_be_u32, put_be_u64};
use crate::utils::mem_util::align_up;

const HDR_MAGIC: usize = 0;
const HDR_TOTALSIZE: usize = 4;
const HDR_OFF_DT_STRUCT: usize = 8;
const HDR_OFF_DT_STRINGS: usize = 12;
const HDR_OFF_MEM_RSVMAP: usize = 16;
const HDR_VERSION: usize = 20;
const HDR_LAST_COMP_VERSION: usize = 24;
const HDR_BOOT_CPUID_PHYS: usize = 28;
const HDR_SIZE_DT_STRINGS: usize = 32;
const HDR_SIZE_DT_STRUCT: usize = 36;

/// Property header: tag, len, nameoff
const PROP_HEADER_SIZE: usize = 12;

fn tag_align(v: usize) -> usize {
    align_up(v, FDT_TAGSIZE)
}

/// Decoded property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property<'b> {
    pub name: &'b [u8],
    pub value: &'b [u8],
}

/// Mutable view of a device tree blob
pub struct DtBlob<'a> {
    buf: &'a mut [u8],
}

impl<'a> DtBlob<'a> {
    /// Wrap `buf`; the blob starts at `buf[0]` and may grow to `buf.len()`
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Blob bytes up to `totalsize`
    pub fn as_bytes(&self) -> &[u8] {
        let end = (self.totalsize() as usize).min(self.buf.len());
        &self.buf[..end]
    }

    fn hdr(&self, field: usize) -> u32 {
        be_u32(self.buf, field).unwrap_or(0)
    }

    fn set_hdr(&mut self, field: usize, v: u32) {
        // Header presence is established by check_header before any edit.
        let _ = put_be_u32(self.buf, field, v);
    }

    fn adjust_hdr(&mut self, field: usize, delta: isize) {
        let v = (self.hdr(field) as isize + delta) as u32;
        self.set_hdr(field, v);
    }

    pub fn magic(&self) -> u32 {
        self.hdr(HDR_MAGIC)
    }

    pub fn totalsize(&self) -> u32 {
        self.hdr(HDR_TOTALSIZE)
    }

    pub fn off_dt_struct(&self) -> u32 {
        self.hdr(HDR_OFF_DT_STRUCT)
    }

    pub fn off_dt_strings(&self) -> u32 {
        self.hdr(HDR_OFF_DT_STRINGS)
    }

    pub fn off_mem_rsvmap(&self) -> u32 {
        self.hdr(HDR_OFF_MEM_RSVMAP)
    }

    pub fn version(&self) -> u32 {
        self.hdr(HDR_VERSION)
    }

    pub fn last_comp_version(&self) -> u32 {
        self.hdr(HDR_LAST_COMP_VERSION)
    }

    pub fn boot_cpuid_phys(&self) -> u32 {
        self.hdr(HDR_BOOT_CPUID_PHYS)
    }

    pub fn size_dt_strings(&self) -> u32 {
        self.hdr(HDR_SIZE_DT_STRINGS)
    }

    pub fn size_dt_struct(&self) -> u32 {
        self.hdr(HDR_SIZE_DT_STRUCT)
    }

    fn header_size(&self) -> usize {
        if self.version() >= 17 {
            FDT_V17_HEADER_SIZE
        } else {
            FDT_V16_HEADER_SIZE
        }
    }

    /// Validate magic, version and block placement against `totalsize`
    /// and the backing buffer.
    pub fn check_header(&self) -> Result<(), FdtError> {
        if self.buf.len() < FDT_V16_HEADER_SIZE || self.magic() != FDT_MAGIC {
            return Err(FdtError::BadMagic);
        }
        let version = self.version();
        let last_comp = self.last_comp_version();
        if version < FDT_FIRST_SUPPORTED_VERSION
            || last_comp > FDT_LAST_SUPPORTED_VERSION
            || version < last_comp
        {
            return Err(FdtError::BadVersion);
        }

        let hdrsize = self.header_size();
        let total = self.totalsize() as usize;
        if total < hdrsize || total > self.buf.len() {
            return Err(FdtError::Truncated);
        }

        let rsv = self.off_mem_rsvmap() as usize;
        if rsv < hdrsize || rsv > total {
            return Err(FdtError::Truncated);
        }

        let off_struct = self.off_dt_struct() as usize;
        if version < 17 {
            if off_struct < hdrsize || off_struct > total {
                return Err(FdtError::Truncated);
            }
        } else if !block_fits(hdrsize, total, off_struct, self.size_dt_struct() as usize) {
            return Err(FdtError::Truncated);
        }

        if !block_fits(hdrsize, total, self.off_dt_strings() as usize, self.size_dt_strings() as usize) {
            return Err(FdtError::Truncated);
        }
        Ok(())
    }

    /// Set `totalsize`; fails if the backing buffer is smaller
    pub fn set_totalsize(&mut self, size: u32) -> Result<(), FdtError> {
        if size as usize > self.buf.len() {
            return Err(FdtError::NoSpace);
        }
        self.set_hdr(HDR_TOTALSIZE, size);
        Ok(())
    }

    fn struct_end(&self) -> usize {
        let off = self.off_dt_struct() as usize;
        if self.version() >= 17 {
            off + self.size_dt_struct() as usize
        } else {
            self.totalsize() as usize
        }
    }

    /// Absolute range of `len` bytes at structure offset `offset`
    fn struct_range(&self, offset: usize, len: usize) -> Option<core::ops::Range<usize>> {
        let start = (self.off_dt_struct() as usize).checked_add(offset)?;
        let end = start.checked_add(len)?;
        (end <= self.struct_end() && end <= self.buf.len()).then_some(start..end)
    }

    fn struct_u32(&self, offset: usize) -> Option<u32> {
        let r = self.struct_range(offset, 4)?;
        be_u32(self.buf, r.start)
    }

    /// Decode the token at `offset`; returns it with the aligned offset of
    /// the next token.
    pub fn next_tag(&self, offset: usize) -> Result<(u32, usize), FdtError> {
        let tag = self.struct_u32(offset).ok_or(FdtError::Truncated)?;
        let mut next = offset + FDT_TAGSIZE;

        match tag {
            FDT_BEGIN_NODE => {
                let start = self.struct_range(next, 0).ok_or(FdtError::Truncated)?.start;
                let limit = self.struct_end().min(self.buf.len());
                let name = c_str_at(&self.buf[..limit], start).ok_or(FdtError::Truncated)?;
                next += name.len() + 1;
            }
            FDT_PROP => {
                let len = self.struct_u32(next).ok_or(FdtError::Truncated)? as usize;
                next = next
                    .checked_add(PROP_HEADER_SIZE - FDT_TAGSIZE + len)
                    .ok_or(FdtError::Truncated)?;
            }
            FDT_END | FDT_END_NODE | FDT_NOP => {}
            _ => return Err(FdtError::BadStructure),
        }

        self.struct_range(offset, next - offset).ok_or(FdtError::Truncated)?;
        Ok((tag, tag_align(next)))
    }

    /// Offset just past the node's name, if `offset` is a node
    fn check_node_offset(&self, offset: usize) -> Result<usize, FdtError> {
        if offset % FDT_TAGSIZE != 0 {
            return Err(FdtError::BadOffset);
        }
        match self.next_tag(offset) {
            Ok((FDT_BEGIN_NODE, next)) => Ok(next),
            _ => Err(FdtError::BadOffset),
        }
    }

    fn check_prop_offset(&self, offset: usize) -> Result<usize, FdtError> {
        if offset % FDT_TAGSIZE != 0 {
            return Err(FdtError::BadOffset);
        }
        match self.next_tag(offset) {
            Ok((FDT_PROP, next)) => Ok(next),
            _ => Err(FdtError::BadOffset),
        }
    }

    /// Next node in document order, tracking depth.
    ///
    /// When an `END_NODE` takes `depth` below zero the walk has left the
    /// starting subtree: the offset after that token is returned and the
    /// caller sees `*depth < 0`.
    pub fn next_node(&self, offset: usize, depth: &mut i32) -> Result<usize, FdtError> {
        let mut next = self.check_node_offset(offset)?;
        loop {
            let here = next;
            let (tag, after) = self.next_tag(here)?;
            next = after;
            match tag {
                FDT_PROP | FDT_NOP => {}
                FDT_BEGIN_NODE => {
                    *depth += 1;
                    return Ok(here);
                }
                FDT_END_NODE => {
                    *depth -= 1;
                    if *depth < 0 {
                        return Ok(next);
                    }
                }
                FDT_END => return Err(FdtError::NotFound),
                _ => return Err(FdtError::BadStructure),
            }
        }
    }

    pub fn first_subnode(&self, parent: usize) -> Result<usize, FdtError> {
        let mut depth = 0;
        let offset = self.next_node(parent, &mut depth)?;
        if depth != 1 {
            return Err(FdtError::NotFound);
        }
        Ok(offset)
    }

    pub fn next_subnode(&self, node: usize) -> Result<usize, FdtError> {
        let mut depth = 1;
        let mut offset = node;
        loop {
            offset = self.next_node(offset, &mut depth)?;
            if depth < 1 {
                return Err(FdtError::NotFound);
            }
            if depth == 1 {
                return Ok(offset);
            }
        }
    }

    /// Node name including any unit address; empty for the root
    pub fn get_name(&self, node: usize) -> Result<&[u8], FdtError> {
        self.check_node_offset(node)?;
        let start = self.struct_range(node + FDT_TAGSIZE, 0).ok_or(FdtError::BadOffset)?.start;
        let limit = self.struct_end().min(self.buf.len());
        c_str_at(&self.buf[..limit], start).ok_or(FdtError::Truncated)
    }

    /// Child of `parent` named `name`, or `name@unit` when `name` has no
    /// unit address of its own.
    pub fn subnode_offset(&self, parent: usize, name: &[u8]) -> Result<usize, FdtError> {
        let mut child = self.first_subnode(parent);
        loop {
            let offset = child?;
            if name_matches(self.get_name(offset)?, name) {
                return Ok(offset);
            }
            child = self.next_subnode(offset);
        }
    }

    /// Resolve an absolute path such as `/cpus` or `/soc/serial@4500`
    pub fn path_offset(&self, path: &str) -> Result<usize, FdtError> {
        if !path.starts_with('/') {
            return Err(FdtError::BadPath);
        }
        path.split('/')
            .filter(|c| !c.is_empty())
            .try_fold(0, |node, comp| self.subnode_offset(node, comp.as_bytes()))
    }

    fn next_property(&self, mut offset: usize) -> Result<usize, FdtError> {
        loop {
            let (tag, next) = self.next_tag(offset)?;
            match tag {
                FDT_NOP => offset = next,
                FDT_PROP => return Ok(offset),
                FDT_END => return Err(FdtError::BadStructure),
                _ => return Err(FdtError::NotFound),
            }
        }
    }

    pub fn first_property_offset(&self, node: usize) -> Result<usize, FdtError> {
        let next = self.check_node_offset(node)?;
        self.next_property(next)
    }

    pub fn next_property_offset(&self, prop: usize) -> Result<usize, FdtError> {
        let next = self.check_prop_offset(prop)?;
        self.next_property(next)
    }

    /// Look up a string in the strings block
    pub fn string(&self, stroff: u32) -> Result<&[u8], FdtError> {
        let base = self.off_dt_strings() as usize;
        let end = (base + self.size_dt_strings() as usize).min(self.buf.len());
        let abs = base.checked_add(stroff as usize).ok_or(FdtError::BadOffset)?;
        if abs >= end {
            return Err(FdtError::BadOffset);
        }
        c_str_at(&self.buf[..end], abs).ok_or(FdtError::Truncated)
    }

    /// Property at structure offset `prop`
    pub fn property(&self, prop: usize) -> Result<Property<'_>, FdtError> {
        self.check_prop_offset(prop)?;
        let len = self.struct_u32(prop + 4).ok_or(FdtError::Truncated)? as usize;
        let nameoff = self.struct_u32(prop + 8).ok_or(FdtError::Truncated)?;
        let data = self
            .struct_range(prop + PROP_HEADER_SIZE, len)
            .ok_or(FdtError::Truncated)?;
        Ok(Property {
            name: self.string(nameoff)?,
            value: &self.buf[data],
        })
    }

    fn find_property(&self, node: usize, name: &[u8]) -> Result<usize, FdtError> {
        let mut prop = self.first_property_offset(node);
        loop {
            let offset = prop?;
            if self.property(offset)?.name == name {
                return Ok(offset);
            }
            prop = self.next_property_offset(offset);
        }
    }

    pub fn getprop(&self, node: usize, name: &str) -> Result<&[u8], FdtError> {
        let prop = self.find_property(node, name.as_bytes())?;
        Ok(self.property(prop)?.value)
    }

    pub fn getprop_u32(&self, node: usize, name: &str) -> Result<u32, FdtError> {
        let value = self.getprop(node, name)?;
        if value.len() != 4 {
            return Err(FdtError::BadValue);
        }
        be_u32(value, 0).ok_or(FdtError::BadValue)
    }

    pub fn getprop_u64(&self, node: usize, name: &str) -> Result<u64, FdtError> {
        let value = self.getprop(node, name)?;
        if value.len() != 8 {
            return Err(FdtError::BadValue);
        }
        be_u64(value, 0).ok_or(FdtError::BadValue)
    }

    /// Number of memory reservation entries before the terminator
    pub fn num_mem_rsv(&self) -> Result<usize, FdtError> {
        let base = self.off_mem_rsvmap() as usize;
        let total = (self.totalsize() as usize).min(self.buf.len());
        let mut n = 0;
        loop {
            let entry = base + n * FDT_RESERVE_ENTRY_SIZE;
            if entry + FDT_RESERVE_ENTRY_SIZE > total {
                return Err(FdtError::Truncated);
            }
            if be_u64(self.buf, entry + 8) == Some(0) {
                return Ok(n);
            }
            n += 1;
        }
    }

    /// Reservation entry `n` as (address, size)
    pub fn mem_rsv(&self, n: usize) -> Result<(u64, u64), FdtError> {
        if n >= self.num_mem_rsv()? {
            return Err(FdtError::BadOffset);
        }
        let entry = self.off_mem_rsvmap() as usize + n * FDT_RESERVE_ENTRY_SIZE;
        let addr = be_u64(self.buf, entry).ok_or(FdtError::Truncated)?;
        let size = be_u64(self.buf, entry + 8).ok_or(FdtError::Truncated)?;
        Ok((addr, size))
    }

    fn blocks_misordered(&self) -> Result<bool, FdtError> {
        let rsv = self.off_mem_rsvmap() as usize;
        let rsv_size = (self.num_mem_rsv()? + 1) * FDT_RESERVE_ENTRY_SIZE;
        let off_struct = self.off_dt_struct() as usize;
        let off_strings = self.off_dt_strings() as usize;
        Ok(rsv < align_up(FDT_V17_HEADER_SIZE, 8)
            || off_struct < rsv + rsv_size
            || off_strings < off_struct + self.size_dt_struct() as usize
            || (self.totalsize() as usize) < off_strings + self.size_dt_strings() as usize)
    }

    /// Gate for every edit: a sane v17 blob with blocks in canonical order
    fn ensure_writable(&mut self) -> Result<(), FdtError> {
        self.check_header()?;
        if self.version() < 17 {
            return Err(FdtError::BadVersion);
        }
        if self.blocks_misordered()? {
            return Err(FdtError::BadLayout);
        }
        if self.version() > 17 {
            self.set_hdr(HDR_VERSION, 17);
        }
        Ok(())
    }

    /// Replace `oldlen` bytes at absolute `pos` with `newlen` bytes of room
    fn splice(&mut self, pos: usize, oldlen: usize, newlen: usize) -> Result<(), FdtError> {
        let end = self.off_dt_strings() as usize + self.size_dt_strings() as usize;
        let old_end = pos.checked_add(oldlen).ok_or(FdtError::BadOffset)?;
        if old_end > end || pos < self.off_mem_rsvmap() as usize {
            return Err(FdtError::BadOffset);
        }
        if end - oldlen + newlen > self.totalsize() as usize {
            return Err(FdtError::NoSpace);
        }
        self.buf.copy_within(old_end..end, pos + newlen);
        Ok(())
    }

    fn splice_struct(&mut self, pos: usize, oldlen: usize, newlen: usize) -> Result<(), FdtError> {
        self.splice(pos, oldlen, newlen)?;
        let delta = newlen as isize - oldlen as isize;
        self.adjust_hdr(HDR_SIZE_DT_STRUCT, delta);
        self.adjust_hdr(HDR_OFF_DT_STRINGS, delta);
        Ok(())
    }

    fn splice_mem_rsv(&mut self, pos: usize, oldn: usize, newn: usize) -> Result<(), FdtError> {
        self.splice(pos, oldn * FDT_RESERVE_ENTRY_SIZE, newn * FDT_RESERVE_ENTRY_SIZE)?;
        let delta = (newn as isize - oldn as isize) * FDT_RESERVE_ENTRY_SIZE as isize;
        self.adjust_hdr(HDR_OFF_DT_STRUCT, delta);
        self.adjust_hdr(HDR_OFF_DT_STRINGS, delta);
        Ok(())
    }

    /// Offset of `name` in the strings block, appending it if absent.
    ///
    /// Any string ending in `name` is reused.
    pub fn find_add_string(&mut self, name: &[u8]) -> Result<u32, FdtError> {
        let base = self.off_dt_strings() as usize;
        let size = self.size_dt_strings() as usize;
        if let Some(off) = find_string(&self.buf[base..base + size], name) {
            return Ok(off as u32);
        }

        let len = name.len() + 1;
        let pos = base + size;
        self.splice(pos, 0, len)?;
        self.buf[pos..pos + name.len()].copy_from_slice(name);
        self.buf[pos + name.len()] = 0;
        self.adjust_hdr(HDR_SIZE_DT_STRINGS, len as isize);
        Ok(size as u32)
    }

    /// Create or resize property `name` to `len` bytes and return its value
    /// for the caller to fill.
    pub fn setprop_placeholder(&mut self, node: usize, name: &str, len: usize) -> Result<&mut [u8], FdtError> {
        self.ensure_writable()?;

        let prop = match self.find_property(node, name.as_bytes()) {
            Ok(prop) => {
                let oldlen = self.struct_u32(prop + 4).ok_or(FdtError::Truncated)? as usize;
                let data = self.off_dt_struct() as usize + prop + PROP_HEADER_SIZE;
                self.splice_struct(data, tag_align(oldlen), tag_align(len))?;
                prop
            }
            Err(FdtError::NotFound) => {
                let after_name = self.check_node_offset(node)?;
                let nameoff = self.find_add_string(name.as_bytes())?;
                let pos = self.off_dt_struct() as usize + after_name;
                self.splice_struct(pos, 0, PROP_HEADER_SIZE + tag_align(len))?;
                let _ = put_be_u32(self.buf, pos, FDT_PROP);
                let _ = put_be_u32(self.buf, pos + 8, nameoff);
                after_name
            }
            Err(e) => return Err(e),
        };

        let hdr = self.off_dt_struct() as usize + prop;
        let _ = put_be_u32(self.buf, hdr + 4, len as u32);
        let data = hdr + PROP_HEADER_SIZE;
        self.buf[data + len..data + tag_align(len)].fill(0);
        Ok(&mut self.buf[data..data + len])
    }

    pub fn setprop(&mut self, node: usize, name: &str, value: &[u8]) -> Result<(), FdtError> {
        self.setprop_placeholder(node, name, value.len())?
            .copy_from_slice(value);
        Ok(())
    }

    /// Set a NUL-terminated string property
    pub fn setprop_string(&mut self, node: usize, name: &str, value: &str) -> Result<(), FdtError> {
        let n = value.len();
        let data = self.setprop_placeholder(node, name, n + 1)?;
        data[..n].copy_from_slice(value.as_bytes());
        data[n] = 0;
        Ok(())
    }

    pub fn setprop_u32(&mut self, node: usize, name: &str, value: u32) -> Result<(), FdtError> {
        self.setprop(node, name, &value.to_be_bytes())
    }

    pub fn setprop_u64(&mut self, node: usize, name: &str, value: u64) -> Result<(), FdtError> {
        let data = self.setprop_placeholder(node, name, 8)?;
        put_be_u64(data, 0, value).ok_or(FdtError::Internal)
    }

    /// Add an empty child `name` under `parent`, after the parent's
    /// properties. Fails with `Exists` if a matching child is present.
    pub fn add_subnode(&mut self, parent: usize, name: &str) -> Result<usize, FdtError> {
        self.ensure_writable()?;
        match self.subnode_offset(parent, name.as_bytes()) {
            Ok(_) => return Err(FdtError::Exists),
            Err(FdtError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let mut next = self.check_node_offset(parent)?;
        let offset = loop {
            let here = next;
            let (tag, after) = self.next_tag(here)?;
            next = after;
            if tag != FDT_PROP && tag != FDT_NOP {
                break here;
            }
        };

        let name_len = tag_align(name.len() + 1);
        let node_len = FDT_TAGSIZE + name_len + FDT_TAGSIZE;
        let pos = self.off_dt_struct() as usize + offset;
        self.splice_struct(pos, 0, node_len)?;

        let _ = put_be_u32(self.buf, pos, FDT_BEGIN_NODE);
        let name_at = pos + FDT_TAGSIZE;
        self.buf[name_at..name_at + name_len].fill(0);
        self.buf[name_at..name_at + name.len()].copy_from_slice(name.as_bytes());
        let _ = put_be_u32(self.buf, name_at + name_len, FDT_END_NODE);
        Ok(offset)
    }

    /// Append a memory reservation entry
    pub fn add_mem_rsv(&mut self, addr: u64, size: u64) -> Result<(), FdtError> {
        self.ensure_writable()?;
        let n = self.num_mem_rsv()?;
        let pos = self.off_mem_rsvmap() as usize + n * FDT_RESERVE_ENTRY_SIZE;
        self.splice_mem_rsv(pos, 0, 1)?;
        let _ = put_be_u64(self.buf, pos, addr);
        let _ = put_be_u64(self.buf, pos + 8, size);
        Ok(())
    }
}

fn block_fits(hdrsize: usize, total: usize, base: usize, size: usize) -> bool {
    if base < hdrsize || base > total {
        return false;
    }
    matches!(base.checked_add(size), Some(end) if end <= total)
}

fn name_matches(node: &[u8], query: &[u8]) -> bool {
    if node == query {
        return true;
    }
    !query.contains(&b'@')
        && node.len() > query.len()
        && node.starts_with(query)
        && node[query.len()] == b'@'
}

fn find_string(strtab: &[u8], name: &[u8]) -> Option<usize> {
    let len = name.len() + 1;
    let last = strtab.len().checked_sub(len)?;
    (0..=last).find(|&p| &strtab[p..p + name.len()] == name && strtab[p + name.len()] == 0)
}
