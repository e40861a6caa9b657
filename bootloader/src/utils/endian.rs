// Big-endian field access over byte slices
//
// Every on-disk format the loader reads (ELF32, uImage, FDT) stores its
// fields big-endian. Reads return `None` instead of indexing past the end so
// callers can map truncation onto their own error type.

#[inline]
fn field<const N: usize>(buf: &[u8], off: usize) -> Option<[u8; N]> {
    let end = off.checked_add(N)?;
    buf.get(off..end)?.try_into().ok()
}

/// Read a big-endian u16 at `off`
#[inline]
pub fn be_u16(buf: &[u8], off: usize) -> Option<u16> {
    field::<2>(buf, off).map(u16::from_be_bytes)
}

/// Read a big-endian u32 at `off`
#[inline]
pub fn be_u32(buf: &[u8], off: usize) -> Option<u32> {
    field::<4>(buf, off).map(u32::from_be_bytes)
}

/// Read a big-endian u64 at `off`
#[inline]
pub fn be_u64(buf: &[u8], off: usize) -> Option<u64> {
    field::<8>(buf, off).map(u64::from_be_bytes)
}

/// Store a big-endian u16 at `off`
#[inline]
pub fn put_be_u16(buf: &mut [u8], off: usize, val: u16) -> Option<()> {
    buf.get_mut(off..off.checked_add(2)?)?
        .copy_from_slice(&val.to_be_bytes());
    Some(())
}

/// Store a big-endian u32 at `off`
#[inline]
pub fn put_be_u32(buf: &mut [u8], off: usize, val: u32) -> Option<()> {
    buf.get_mut(off..off.checked_add(4)?)?
        .copy_from_slice(&val.to_be_bytes());
    Some(())
}

/// Store a big-endian u64 at `off`
#[inline]
pub fn put_be_u64(buf: &mut [u8], off: usize, val: u64) -> Option<()> {
    buf.get_mut(off..off.checked_add(8)?)?
        .copy_from_slice(&val.to_be_bytes());
    Some(())
}

/// Bytes of the NUL-terminated string starting at `off`, without the NUL.
///
/// Returns `None` when `off` is out of range or no terminator follows.
pub fn c_str_at(buf: &[u8], off: usize) -> Option<&[u8]> {
    let tail = buf.get(off..)?;
    let len = tail.iter().position(|&b| b == 0)?;
    Some(&tail[..len])
}

/// Naive substring search, used on short tag strings only
pub fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_big_endian() {
        let buf = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0];
        assert_eq!(be_u16(&buf, 0), Some(0x1234));
        assert_eq!(be_u32(&buf, 0), Some(0x1234_5678));
        assert_eq!(be_u64(&buf, 0), Some(0x1234_5678_9abc_def0));
    }

    #[test]
    fn test_reads_past_end() {
        let buf = [0u8; 6];
        assert_eq!(be_u32(&buf, 3), None);
        assert_eq!(be_u64(&buf, 0), None);
        assert_eq!(be_u16(&buf, usize::MAX), None);
    }

    #[test]
    fn test_put_rejects_short_buffer() {
        let mut buf = [0u8; 4];
        assert_eq!(put_be_u32(&mut buf, 0, 0xd00d_feed), Some(()));
        assert_eq!(buf, [0xd0, 0x0d, 0xfe, 0xed]);
        assert_eq!(put_be_u32(&mut buf, 1, 0), None);
    }

    #[test]
    fn test_c_str_at() {
        let buf = b"cpus\0memory\0";
        assert_eq!(c_str_at(buf, 0), Some(&b"cpus"[..]));
        assert_eq!(c_str_at(buf, 5), Some(&b"memory"[..]));
        assert_eq!(c_str_at(b"abc", 0), None);
    }

    #[test]
    fn test_contains_subslice() {
        assert!(contains_subslice(b"build tag VXW7 smp", b"tag VXW7"));
        assert!(!contains_subslice(b"tag COMPAT69", b"tag VXW7"));
    }
}
