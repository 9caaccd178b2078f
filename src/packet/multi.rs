//! Unpacking of `Multi` batches.
//!
//! A multi packet wraps a [`CMsgMulti`] body whose `message_body` is a
//! concatenation of `u32 LE length · packet` records, gzip-compressed when
//! `size_unzipped` is non-zero. [`unpack_multi`] yields the decompressed
//! record stream and [`SubPackets`] walks it.

use std::io::{self, Read};

use bytes::Bytes;
use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;

use super::{ClientMsgProtobuf, PacketMsg};
use crate::{byte_order::read_wire_u32, connection::codec::MAX_FRAME_LENGTH, protobufs::CMsgMulti};

/// Reasons a multi batch is abandoned.
#[derive(Debug, Error)]
pub enum MultiError {
    /// Multi batches must use the protobuf header.
    #[error("multi message is not protobuf-encoded")]
    NotProtobuf,
    /// The `CMsgMulti` body did not decode.
    #[error("multi body failed to decode")]
    Decode,
    /// The gzip payload was corrupt.
    #[error("failed to decompress multi payload: {0}")]
    Decompress(#[source] io::Error),
    /// The payload declares, or inflates to, more than it may hold.
    #[error("multi payload exceeds its limit of {limit} bytes")]
    TooLarge { limit: u32 },
}

/// Largest decompressed payload a multi batch may declare.
pub const MAX_UNZIPPED_LENGTH: u32 = 64 * 1024 * 1024;

/// Decode a multi packet and return its (decompressed) record stream.
///
/// # Errors
///
/// Returns [`MultiError`] when the packet is not protobuf-encoded, the body
/// does not decode, or decompression fails. A compressed payload that
/// declares more than [`MAX_UNZIPPED_LENGTH`] bytes, or inflates to more
/// than it declares, is rejected as [`MultiError::TooLarge`] without
/// inflating past the limit.
pub fn unpack_multi(packet: &PacketMsg) -> Result<Bytes, MultiError> {
    if !packet.is_proto() {
        return Err(MultiError::NotProtobuf);
    }
    let multi = ClientMsgProtobuf::<CMsgMulti>::from_packet(packet).ok_or(MultiError::Decode)?;
    let body = multi.body();
    let payload = Bytes::from(body.message_body().to_vec());

    let size_unzipped = body.size_unzipped();
    if size_unzipped == 0 {
        return Ok(payload);
    }

    if size_unzipped > MAX_UNZIPPED_LENGTH {
        return Err(MultiError::TooLarge {
            limit: MAX_UNZIPPED_LENGTH,
        });
    }

    // One byte past the declared size is enough to detect overflow.
    let mut decoder = GzDecoder::new(&payload[..]).take(u64::from(size_unzipped) + 1);
    let capacity = usize::try_from(size_unzipped).map_or(MAX_FRAME_LENGTH, |size| size.min(MAX_FRAME_LENGTH));
    let mut decompressed = Vec::with_capacity(capacity);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(MultiError::Decompress)?;
    if usize::try_from(size_unzipped).is_ok_and(|declared| decompressed.len() > declared) {
        return Err(MultiError::TooLarge { limit: size_unzipped });
    }
    Ok(Bytes::from(decompressed))
}

/// Iterator over the length-prefixed records of a multi payload.
///
/// Iteration ends at the end of the payload or at the first truncated
/// record; a truncated record is logged and never yielded.
pub struct SubPackets {
    payload: Bytes,
    pos: usize,
}

impl SubPackets {
    /// Walk the records in `payload`.
    #[must_use]
    pub fn new(payload: Bytes) -> Self { Self { payload, pos: 0 } }
}

impl Iterator for SubPackets {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.payload.len() - self.pos;
        if remaining == 0 {
            return None;
        }

        let Some(prefix) = self
            .payload
            .get(self.pos..self.pos + 4)
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        else {
            debug!(remaining, "multi payload ends inside a length prefix");
            self.pos = self.payload.len();
            return None;
        };

        let len = usize::try_from(read_wire_u32(prefix)).unwrap_or(usize::MAX);
        let start = self.pos + 4;
        let Some(end) = start.checked_add(len).filter(|end| *end <= self.payload.len()) else {
            debug!(len, available = self.payload.len() - start, "multi sub-packet is truncated");
            self.pos = self.payload.len();
            return None;
        };

        self.pos = end;
        Some(self.payload.slice(start..end))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bytes::BytesMut;
    use flate2::{Compression, write::GzEncoder};

    use super::*;
    use crate::{
        byte_order::write_wire_u32,
        enums::EMsg,
        packet::{ClientMessage, ClientMsg, parse_packet},
    };

    fn records(parts: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for part in parts {
            #[expect(clippy::cast_possible_truncation, reason = "test records are tiny")]
            out.extend_from_slice(&write_wire_u32(part.len() as u32));
            out.extend_from_slice(part);
        }
        out
    }

    fn multi_packet(body: Vec<u8>, size_unzipped: u32) -> PacketMsg {
        let mut msg = ClientMsgProtobuf::<CMsgMulti>::new(EMsg::Multi);
        msg.body_mut().message_body = Some(body);
        msg.body_mut().size_unzipped = Some(size_unzipped);
        parse_packet(msg.serialize()).expect("multi frames")
    }

    #[test]
    fn uncompressed_payload_is_returned_verbatim() {
        let payload = records(&[b"abcd", b"efgh"]);
        let packet = multi_packet(payload.clone(), 0);
        let unpacked = unpack_multi(&packet).expect("unpack");
        assert_eq!(&unpacked[..], &payload[..]);
    }

    #[test]
    fn compressed_payload_is_inflated() {
        let payload = records(&[b"one", b"two", b"three"]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).expect("compress");
        let compressed = encoder.finish().expect("finish");

        #[expect(clippy::cast_possible_truncation, reason = "test payload is tiny")]
        let packet = multi_packet(compressed, payload.len() as u32);
        let unpacked = unpack_multi(&packet).expect("unpack");
        let parts: Vec<Bytes> = SubPackets::new(unpacked).collect();
        assert_eq!(parts, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
    }

    #[test]
    fn corrupt_gzip_is_reported() {
        let packet = multi_packet(vec![0x1f, 0x8b, 0xde, 0xad], 64);
        assert!(matches!(unpack_multi(&packet), Err(MultiError::Decompress(_))));
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("compress");
        encoder.finish().expect("finish")
    }

    #[test]
    fn inflation_beyond_declared_size_is_rejected() {
        let bomb = gzip(&vec![0_u8; 1024 * 1024]);
        let packet = multi_packet(bomb, 16);
        assert!(matches!(
            unpack_multi(&packet),
            Err(MultiError::TooLarge { limit: 16 })
        ));
    }

    #[test]
    fn declared_size_above_ceiling_is_rejected() {
        let packet = multi_packet(gzip(b"tiny"), MAX_UNZIPPED_LENGTH + 1);
        assert!(matches!(
            unpack_multi(&packet),
            Err(MultiError::TooLarge {
                limit: MAX_UNZIPPED_LENGTH
            })
        ));
    }

    #[test]
    fn shorter_output_than_declared_is_accepted() {
        let payload = records(&[b"one"]);
        let packet = multi_packet(gzip(&payload), 4096);
        let unpacked = unpack_multi(&packet).expect("unpack");
        assert_eq!(&unpacked[..], &payload[..]);
    }

    #[test]
    fn non_proto_multi_is_rejected() {
        let mut msg = ClientMsg::new(EMsg::Multi);
        msg.payload_mut().extend_from_slice(b"junk");
        let packet = parse_packet(msg.serialize()).expect("extended header frames");
        assert!(matches!(unpack_multi(&packet), Err(MultiError::NotProtobuf)));
    }

    #[test]
    fn truncated_record_ends_iteration() {
        let mut payload = BytesMut::from(&records(&[b"whole"])[..]);
        payload.extend_from_slice(&write_wire_u32(10));
        payload.extend_from_slice(b"short");
        let parts: Vec<Bytes> = SubPackets::new(payload.freeze()).collect();
        assert_eq!(parts, vec![&b"whole"[..]]);
    }

    #[test]
    fn dangling_prefix_ends_iteration() {
        let mut payload = records(&[b"x"]);
        payload.extend_from_slice(&[1, 0]);
        let parts: Vec<Bytes> = SubPackets::new(Bytes::from(payload)).collect();
        assert_eq!(parts.len(), 1);
    }
}
