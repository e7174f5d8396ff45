//! Bounds-checked big-endian reads from the RDRAM image.

#[inline]
pub(crate) fn slice(ram: &[u8], addr: u32, len: usize) -> Option<&[u8]> {
    let start = addr as usize;
    ram.get(start..start.checked_add(len)?)
}

#[inline]
pub(crate) fn read_u8(ram: &[u8], addr: u32) -> Option<u8> {
    ram.get(addr as usize).copied()
}

#[inline]
pub(crate) fn read_u16(ram: &[u8], addr: u32) -> Option<u16> {
    let b = slice(ram, addr, 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

#[inline]
pub(crate) fn read_u32(ram: &[u8], addr: u32) -> Option<u32> {
    let b = slice(ram, addr, 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Big-endian `u16` at `offset` within an already bounds-checked record.
#[inline]
pub(crate) fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
pub(crate) fn be_i16(bytes: &[u8], offset: usize) -> i16 {
    be_u16(bytes, offset) as i16
}

#[inline]
pub(crate) fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_big_endian() {
        let ram = [0x12, 0x34, 0x56, 0x78, 0x9A];
        assert_eq!(read_u32(&ram, 0), Some(0x1234_5678));
        assert_eq!(read_u16(&ram, 3), Some(0x789A));
        assert_eq!(read_u8(&ram, 4), Some(0x9A));
        assert_eq!(be_i16(&ram, 3), 0x789A);
    }

    #[test]
    fn test_reads_past_end_fail() {
        let ram = [0u8; 8];
        assert_eq!(read_u32(&ram, 5), None);
        assert_eq!(read_u16(&ram, 7), None);
        assert_eq!(read_u8(&ram, 8), None);
        assert!(slice(&ram, u32::MAX, 4).is_none());
        assert_eq!(slice(&ram, 4, 4).map(<[u8]>::len), Some(4));
    }
}
