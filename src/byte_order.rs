//! Helpers for the little-endian integers used throughout the CM wire format.
//!
//! Every fixed header field on the wire is little-endian. These helpers keep
//! the Clippy expectations scoped to the conversion points and give the
//! header parsers a cursor that reports truncation as `None` instead of
//! panicking.

/// Serialise a `u32` in wire byte order (little-endian).
///
/// # Examples
///
/// ```
/// use steamframe::byte_order::write_wire_u32;
///
/// assert_eq!(write_wire_u32(0x1234_5678), [0x78, 0x56, 0x34, 0x12]);
/// ```
#[must_use]
pub fn write_wire_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The CM wire format is little-endian."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `u32`.
///
/// # Examples
///
/// ```
/// use steamframe::byte_order::read_wire_u32;
///
/// assert_eq!(read_wire_u32([0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
/// ```
#[must_use]
pub fn read_wire_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The CM wire format is little-endian."
    )]
    u32::from_le_bytes(bytes)
}

/// Serialise a `u64` in wire byte order (little-endian).
#[must_use]
pub fn write_wire_u64(value: u64) -> [u8; 8] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The CM wire format is little-endian."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `u64`.
#[must_use]
pub fn read_wire_u64(bytes: [u8; 8]) -> u64 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The CM wire format is little-endian."
    )]
    u64::from_le_bytes(bytes)
}

/// Forward-only reader over a byte slice.
///
/// Each accessor returns `None` once the input is exhausted so header parsing
/// can bail out with `?` on truncated packets.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }

    pub(crate) fn position(&self) -> usize { self.pos }

    pub(crate) fn remaining(&self) -> usize { self.buf.len() - self.pos }

    pub(crate) fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8> { self.take_array::<1>().map(|[b]| b) }

    pub(crate) fn read_u16(&mut self) -> Option<u16> {
        #[expect(
            clippy::little_endian_bytes,
            reason = "The CM wire format is little-endian."
        )]
        self.take_array().map(u16::from_le_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Option<u32> { self.take_array().map(read_wire_u32) }

    pub(crate) fn read_u64(&mut self) -> Option<u64> { self.take_array().map(read_wire_u64) }
}
