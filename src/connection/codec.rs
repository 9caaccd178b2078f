//! `VT01` stream framing.
//!
//! Every packet on a TCP connection is preceded by an 8-byte header: the
//! payload length as a little-endian `u32` followed by the ASCII magic
//! `VT01`.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::byte_order::{read_wire_u32, write_wire_u32};

/// Magic following the length prefix.
pub const VT01_MAGIC: [u8; 4] = *b"VT01";

/// Size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload accepted by default (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Wire-level framing failures. Surfaced as [`io::ErrorKind::InvalidData`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The header magic was not `VT01`.
    #[error("invalid frame magic {found:02x?}")]
    BadMagic { found: [u8; 4] },
    /// The declared payload length exceeds the configured limit.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self { Self::new(io::ErrorKind::InvalidData, err) }
}

/// Codec for `u32 LE length · "VT01" · payload` frames.
#[derive(Clone, Copy, Debug)]
pub struct Vt01Codec {
    max_frame_length: usize,
}

impl Default for Vt01Codec {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

impl Vt01Codec {
    /// Create a codec rejecting payloads longer than `max_frame_length`.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self { Self { max_frame_length } }

    /// Largest payload this codec accepts.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Decoder for Vt01Codec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = src.get(..FRAME_HEADER_SIZE) else {
            return Ok(None);
        };
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[..4]);
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[4..]);

        if magic != VT01_MAGIC {
            return Err(FramingError::BadMagic { found: magic }.into());
        }
        let size = usize::try_from(read_wire_u32(len_bytes)).unwrap_or(usize::MAX);
        if size > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size,
                max: self.max_frame_length,
            }
            .into());
        }

        let total = FRAME_HEADER_SIZE + size;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        Ok(Some(src.split_to(size).freeze()))
    }
}

impl Encoder<Bytes> for Vt01Codec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.len();
        let len = u32::try_from(size)
            .ok()
            .filter(|_| size <= self.max_frame_length)
            .ok_or(FramingError::OversizedFrame {
                size,
                max: self.max_frame_length,
            })?;
        dst.reserve(FRAME_HEADER_SIZE + size);
        dst.put_slice(&write_wire_u32(len));
        dst.put_slice(&VT01_MAGIC);
        dst.put_slice(&item);
        Ok(())
    }
}
