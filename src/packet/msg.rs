//! Outgoing message builders.
//!
//! Each builder pairs one of the three header layouts with a body and knows
//! how to serialise itself. [`ClientMessage`] is what
//! [`CmClient::send`](crate::client::CmClient::send) accepts: it lets the
//! client stamp session and identity fields regardless of the layout.

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message as ProtoMessage;

use super::{ExtendedClientMsgHdr, MsgHdr, MsgHdrProtoBuf, PacketHeader, PacketMsg};
use crate::{
    enums::EMsg,
    ids::{JobId, SteamId},
};

/// A message that can be stamped and sent by the client.
pub trait ClientMessage: Send {
    /// Message kind.
    fn msg_type(&self) -> EMsg;

    /// Returns `true` when the message uses the protobuf header.
    fn is_proto(&self) -> bool;

    /// Session id recorded in the header, or 0 when the layout has none.
    fn session_id(&self) -> i32;

    /// Record the session id. Layouts without the field ignore it.
    fn set_session_id(&mut self, session_id: i32);

    /// Identity recorded in the header.
    fn steam_id(&self) -> SteamId;

    /// Record the identity. Layouts without the field ignore it.
    fn set_steam_id(&mut self, steam_id: SteamId);

    /// Job this message answers.
    fn target_job(&self) -> JobId;

    /// Set the job this message answers.
    fn set_target_job(&mut self, job: JobId);

    /// Job expecting an answer to this message.
    fn source_job(&self) -> JobId;

    /// Set the job expecting an answer to this message.
    fn set_source_job(&mut self, job: JobId);

    /// Serialise header and body into wire bytes.
    fn serialize(&self) -> Bytes;
}

/// Protobuf-flagged message with a typed body.
#[derive(Clone, Debug)]
pub struct ClientMsgProtobuf<T> {
    header: MsgHdrProtoBuf,
    body: T,
}

impl<T: ProtoMessage + Default> ClientMsgProtobuf<T> {
    /// Create a message of kind `msg` with a default body.
    #[must_use]
    pub fn new(msg: EMsg) -> Self {
        Self {
            header: MsgHdrProtoBuf::new(msg),
            body: T::default(),
        }
    }

    /// Create a reply to `packet`, targeting the job that sent it.
    #[must_use]
    pub fn reply_to(msg: EMsg, packet: &PacketMsg) -> Self {
        let mut reply = Self::new(msg);
        reply.set_target_job(packet.source_job());
        reply
    }

    /// Decode a received protobuf packet into a typed message.
    ///
    /// Returns `None` for non-protobuf packets or undecodable bodies.
    #[must_use]
    pub fn from_packet(packet: &PacketMsg) -> Option<Self> {
        let PacketHeader::Protobuf(header) = packet.header() else {
            return None;
        };
        let body = T::decode(packet.body()).ok()?;
        Some(Self {
            header: header.clone(),
            body,
        })
    }

    /// Typed body.
    #[must_use]
    pub fn body(&self) -> &T { &self.body }

    /// Mutable typed body.
    pub fn body_mut(&mut self) -> &mut T { &mut self.body }

    /// Protobuf header.
    #[must_use]
    pub fn proto_header(&self) -> &MsgHdrProtoBuf { &self.header }

    /// Mutable protobuf header.
    pub fn proto_header_mut(&mut self) -> &mut MsgHdrProtoBuf { &mut self.header }
}

impl<T: ProtoMessage + Default> ClientMessage for ClientMsgProtobuf<T> {
    fn msg_type(&self) -> EMsg { self.header.msg }

    fn is_proto(&self) -> bool { true }

    fn session_id(&self) -> i32 { self.header.proto.client_sessionid() }

    fn set_session_id(&mut self, session_id: i32) {
        self.header.proto.client_sessionid = Some(session_id);
    }

    fn steam_id(&self) -> SteamId { SteamId::new(self.header.proto.steamid()) }

    fn set_steam_id(&mut self, steam_id: SteamId) {
        self.header.proto.steamid = Some(steam_id.as_u64());
    }

    fn target_job(&self) -> JobId { self.header.target_job() }

    fn set_target_job(&mut self, job: JobId) { self.header.proto.jobid_target = Some(job.as_u64()); }

    fn source_job(&self) -> JobId { self.header.source_job() }

    fn set_source_job(&mut self, job: JobId) { self.header.proto.jobid_source = Some(job.as_u64()); }

    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.header.write(&mut buf);
        buf.reserve(self.body.encoded_len());
        let _ = self.body.encode(&mut buf);
        buf.freeze()
    }
}

/// Non-protobuf client message using the extended header.
#[derive(Clone, Debug)]
pub struct ClientMsg {
    header: ExtendedClientMsgHdr,
    payload: BytesMut,
}

impl ClientMsg {
    /// Create a message of kind `msg` with an empty payload.
    #[must_use]
    pub fn new(msg: EMsg) -> Self {
        Self {
            header: ExtendedClientMsgHdr::new(msg),
            payload: BytesMut::new(),
        }
    }

    /// Copy a received extended-header packet.
    #[must_use]
    pub fn from_packet(packet: &PacketMsg) -> Option<Self> {
        let PacketHeader::Extended(header) = packet.header() else {
            return None;
        };
        Some(Self {
            header: *header,
            payload: BytesMut::from(&packet.body()[..]),
        })
    }

    /// Extended header.
    #[must_use]
    pub fn header(&self) -> &ExtendedClientMsgHdr { &self.header }

    /// Raw body bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Writable body buffer.
    pub fn payload_mut(&mut self) -> &mut BytesMut { &mut self.payload }
}

impl ClientMessage for ClientMsg {
    fn msg_type(&self) -> EMsg { self.header.msg }

    fn is_proto(&self) -> bool { false }

    fn session_id(&self) -> i32 { self.header.session_id }

    fn set_session_id(&mut self, session_id: i32) { self.header.session_id = session_id; }

    fn steam_id(&self) -> SteamId { self.header.steam_id }

    fn set_steam_id(&mut self, steam_id: SteamId) { self.header.steam_id = steam_id; }

    fn target_job(&self) -> JobId { self.header.target_job }

    fn set_target_job(&mut self, job: JobId) { self.header.target_job = job; }

    fn source_job(&self) -> JobId { self.header.source_job }

    fn set_source_job(&mut self, job: JobId) { self.header.source_job = job; }

    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ExtendedClientMsgHdr::SIZE + self.payload.len());
        self.header.write(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Message using the basic header; only the channel handshake uses this.
#[derive(Clone, Debug)]
pub struct Msg {
    header: MsgHdr,
    payload: BytesMut,
}

impl Msg {
    /// Create a message of kind `msg` with an empty payload.
    #[must_use]
    pub fn new(msg: EMsg) -> Self {
        Self {
            header: MsgHdr::new(msg),
            payload: BytesMut::new(),
        }
    }

    /// Copy a received basic-header packet.
    #[must_use]
    pub fn from_packet(packet: &PacketMsg) -> Option<Self> {
        let PacketHeader::Basic(header) = packet.header() else {
            return None;
        };
        Some(Self {
            header: *header,
            payload: BytesMut::from(&packet.body()[..]),
        })
    }

    /// Raw body bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Writable body buffer.
    pub fn payload_mut(&mut self) -> &mut BytesMut { &mut self.payload }
}

impl ClientMessage for Msg {
    fn msg_type(&self) -> EMsg { self.header.msg }

    fn is_proto(&self) -> bool { false }

    fn session_id(&self) -> i32 { 0 }

    fn set_session_id(&mut self, _session_id: i32) {}

    fn steam_id(&self) -> SteamId { SteamId::default() }

    fn set_steam_id(&mut self, _steam_id: SteamId) {}

    fn target_job(&self) -> JobId { self.header.target_job }

    fn set_target_job(&mut self, job: JobId) { self.header.target_job = job; }

    fn source_job(&self) -> JobId { self.header.source_job }

    fn set_source_job(&mut self, job: JobId) { self.header.source_job = job; }

    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MsgHdr::SIZE + self.payload.len());
        self.header.write(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
