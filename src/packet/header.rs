//! Fixed and protobuf message headers.
//!
//! Three layouts exist on the wire. [`MsgHdr`] is the 20-byte basic header
//! used only by the channel handshake; [`ExtendedClientMsgHdr`] is the 36-byte
//! header used by non-protobuf client messages; [`MsgHdrProtoBuf`] prefixes a
//! length-delimited [`CMsgProtoBufHeader`].

use bytes::{BufMut, BytesMut};
use prost::Message as _;

use crate::{
    byte_order::{WireReader, write_wire_u32, write_wire_u64},
    enums::{EMsg, make_msg},
    ids::{JobId, SteamId},
    protobufs::CMsgProtoBufHeader,
};

/// Basic header: `emsg(4) · target_job(8) · source_job(8)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsgHdr {
    pub msg: EMsg,
    pub target_job: JobId,
    pub source_job: JobId,
}

impl MsgHdr {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;

    /// Create a header for `msg` with no job correlation.
    #[must_use]
    pub fn new(msg: EMsg) -> Self {
        Self {
            msg,
            target_job: JobId::INVALID,
            source_job: JobId::INVALID,
        }
    }

    pub(crate) fn parse(reader: &mut WireReader<'_>) -> Option<Self> {
        let msg = EMsg::from_raw(reader.read_u32()?);
        let target_job = JobId::new(reader.read_u64()?);
        let source_job = JobId::new(reader.read_u64()?);
        Some(Self {
            msg,
            target_job,
            source_job,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(&write_wire_u32(self.msg.code()));
        buf.put_slice(&write_wire_u64(self.target_job.as_u64()));
        buf.put_slice(&write_wire_u64(self.source_job.as_u64()));
    }
}

/// Extended header for non-protobuf client messages.
///
/// Layout: `emsg(4) · header_size(1) · header_version(2) · target_job(8) ·
/// source_job(8) · header_canary(1) · steam_id(8) · session_id(4)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtendedClientMsgHdr {
    pub msg: EMsg,
    pub header_size: u8,
    pub header_version: u16,
    pub target_job: JobId,
    pub source_job: JobId,
    pub header_canary: u8,
    pub steam_id: SteamId,
    pub session_id: i32,
}

impl ExtendedClientMsgHdr {
    /// Encoded size in bytes.
    pub const SIZE: usize = 36;
    /// Default header version.
    pub const VERSION: u16 = 2;
    /// Default canary byte.
    pub const CANARY: u8 = 239;

    /// Create a header for `msg` with default framing values.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "SIZE is 36")]
    pub fn new(msg: EMsg) -> Self {
        Self {
            msg,
            header_size: Self::SIZE as u8,
            header_version: Self::VERSION,
            target_job: JobId::INVALID,
            source_job: JobId::INVALID,
            header_canary: Self::CANARY,
            steam_id: SteamId::default(),
            session_id: 0,
        }
    }

    pub(crate) fn parse(reader: &mut WireReader<'_>) -> Option<Self> {
        let msg = EMsg::from_raw(reader.read_u32()?);
        let header_size = reader.read_u8()?;
        let header_version = reader.read_u16()?;
        let target_job = JobId::new(reader.read_u64()?);
        let source_job = JobId::new(reader.read_u64()?);
        let header_canary = reader.read_u8()?;
        let steam_id = SteamId::new(reader.read_u64()?);
        let session_id = i32::from_le_bytes(reader.read_u32()?.to_le_bytes());
        Some(Self {
            msg,
            header_size,
            header_version,
            target_job,
            source_job,
            header_canary,
            steam_id,
            session_id,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(&write_wire_u32(self.msg.code()));
        buf.put_u8(self.header_size);
        buf.put_u16_le(self.header_version);
        buf.put_slice(&write_wire_u64(self.target_job.as_u64()));
        buf.put_slice(&write_wire_u64(self.source_job.as_u64()));
        buf.put_u8(self.header_canary);
        buf.put_slice(&write_wire_u64(self.steam_id.as_u64()));
        buf.put_i32_le(self.session_id);
    }
}

/// Header for protobuf-flagged messages:
/// `emsg|0x80000000 (4) · header_len(4) · CMsgProtoBufHeader(header_len)`.
#[derive(Clone, Debug, PartialEq)]
pub struct MsgHdrProtoBuf {
    pub msg: EMsg,
    pub proto: CMsgProtoBufHeader,
}

impl MsgHdrProtoBuf {
    /// Create a header for `msg` with an empty protobuf header.
    #[must_use]
    pub fn new(msg: EMsg) -> Self {
        Self {
            msg,
            proto: CMsgProtoBufHeader::default(),
        }
    }

    pub(crate) fn parse(reader: &mut WireReader<'_>) -> Option<Self> {
        let msg = EMsg::from_raw(reader.read_u32()?);
        let header_len = usize::try_from(reader.read_u32()?).ok()?;
        let proto = CMsgProtoBufHeader::decode(reader.take(header_len)?).ok()?;
        Some(Self { msg, proto })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) {
        let header_len = self.proto.encoded_len();
        buf.reserve(8 + header_len);
        buf.put_slice(&write_wire_u32(make_msg(self.msg, true)));
        #[expect(
            clippy::cast_possible_truncation,
            reason = "protobuf headers are far smaller than 4 GiB"
        )]
        buf.put_slice(&write_wire_u32(header_len as u32));
        // Encoding into a BytesMut only fails for lack of capacity, which
        // `reserve` ruled out.
        let _ = self.proto.encode(buf);
    }

    /// Target job recorded in the protobuf header.
    #[must_use]
    pub fn target_job(&self) -> JobId { JobId::new(self.proto.jobid_target()) }

    /// Source job recorded in the protobuf header.
    #[must_use]
    pub fn source_job(&self) -> JobId { JobId::new(self.proto.jobid_source()) }
}
