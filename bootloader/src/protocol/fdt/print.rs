// Device tree dump
//
// Renders every node and property of a blob to the log, one line each.
// Values that look like string lists print quoted, values made of whole
// cells print as `<0x........>` and anything else as a byte list.

use core::fmt::Write;

use arrayvec::ArrayString;

use crate::protocol::fdt::blob::Property;
use crate::protocol::fdt::{DtBlob, FdtError, FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_NOP, FDT_PROP};
use crate::utils::endian::be_u32;

/// Longest rendered line; longer values are cut short with "..."
const LINE_LEN: usize = 160;

type Line = ArrayString<LINE_LEN>;

fn is_print(b: u8) -> bool {
    (0x20..0x7f).contains(&b)
}

/// Whether `data` reads as one or more NUL-separated printable strings
pub fn is_string(data: &[u8]) -> bool {
    let Some((&last, body)) = data.split_last() else {
        return false;
    };
    if data == [0u8] {
        return true;
    }
    if last != 0 && last != b'\n' {
        return false;
    }
    body.iter().enumerate().all(|(i, &b)| {
        if b == 0 {
            data.get(i + 1).copied().is_some_and(is_print)
        } else {
            is_print(b)
        }
    })
}

/// Render a property value into `out`
pub fn format_value(out: &mut impl Write, data: &[u8]) -> core::fmt::Result {
    if is_string(data) {
        let body = data.strip_suffix(b"\0").unwrap_or(data);
        for (i, s) in body.split(|&b| b == 0).enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            out.write_char('"')?;
            for &b in s {
                out.write_char(b as char)?;
            }
            out.write_char('"')?;
        }
        Ok(())
    } else if data.len() % 4 == 0 {
        out.write_char('<')?;
        for (i, cell) in data.chunks_exact(4).filter_map(|c| be_u32(c, 0)).enumerate() {
            if i > 0 {
                out.write_char(' ')?;
            }
            write!(out, "{:#010x}", cell)?;
        }
        out.write_char('>')
    } else {
        out.write_char('[')?;
        for (i, b) in data.iter().enumerate() {
            if i > 0 {
                out.write_char(' ')?;
            }
            write!(out, "{:02x}", b)?;
        }
        out.write_char(']')
    }
}

fn push_bytes(line: &mut Line, bytes: &[u8]) -> core::fmt::Result {
    bytes
        .iter()
        .try_for_each(|&b| line.try_push(b as char).map_err(|_| core::fmt::Error))
}

fn indent(line: &mut Line, depth: usize) -> core::fmt::Result {
    write!(line, "{:width$}", "", width = depth * 4)
}

fn node_line(line: &mut Line, depth: usize, name: &[u8]) -> core::fmt::Result {
    indent(line, depth)?;
    push_bytes(line, if name.is_empty() { &b"/"[..] } else { name })?;
    line.write_str(" {")
}

fn prop_line(line: &mut Line, depth: usize, prop: &Property<'_>) -> core::fmt::Result {
    indent(line, depth)?;
    push_bytes(line, prop.name)?;
    if !prop.value.is_empty() {
        line.write_str(" = ")?;
        format_value(line, prop.value)?;
    }
    line.write_char(';')
}

fn emit(line: &Line, complete: core::fmt::Result) {
    match complete {
        Ok(()) => log::debug!("{}", line),
        Err(_) => log::debug!("{}...", line),
    }
}

/// Log the whole tree at debug level
pub fn dump(dtb: &DtBlob<'_>) -> Result<(), FdtError> {
    dtb.check_header()?;

    for i in 0..dtb.num_mem_rsv()? {
        let (addr, size) = dtb.mem_rsv(i)?;
        log::debug!("/memreserve/ {:#x} {:#x};", addr, size);
    }

    let mut offset = 0;
    let mut depth = 0usize;
    loop {
        let (tag, next) = dtb.next_tag(offset)?;
        let mut line = Line::new();
        match tag {
            FDT_BEGIN_NODE => {
                let res = node_line(&mut line, depth, dtb.get_name(offset)?);
                emit(&line, res);
                depth += 1;
            }
            FDT_PROP => {
                let res = prop_line(&mut line, depth, &dtb.property(offset)?);
                emit(&line, res);
            }
            FDT_END_NODE => {
                depth = depth.saturating_sub(1);
                let res = indent(&mut line, depth).and_then(|_| line.write_str("};"));
                emit(&line, res);
            }
            FDT_NOP => {}
            FDT_END => return Ok(()),
            _ => return Err(FdtError::BadStructure),
        }
        offset = next;
    }
}
