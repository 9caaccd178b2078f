//! Packet framing for inbound CM messages.
//!
//! [`parse_packet`] turns the raw bytes of one packet into a [`PacketMsg`]:
//! the decoded message kind, the header in whichever of the three wire
//! layouts the packet uses, and the untouched packet bytes. Parsing never
//! fails loudly; malformed input yields `None` and a debug log.
//!
//! ```
//! use steamframe::{
//!     enums::EMsg,
//!     packet::{ClientMessage, ClientMsgProtobuf, parse_packet},
//!     protobufs::CMsgClientHeartBeat,
//! };
//!
//! let heartbeat = ClientMsgProtobuf::<CMsgClientHeartBeat>::new(EMsg::ClientHeartBeat);
//! let packet = parse_packet(heartbeat.serialize()).expect("heartbeat frames");
//! assert_eq!(packet.msg_type(), EMsg::ClientHeartBeat);
//! assert!(packet.is_proto());
//! ```

use bytes::Bytes;
use tracing::debug;

use crate::{
    byte_order::WireReader,
    enums::{EMsg, is_proto},
    ids::JobId,
};

mod header;
mod msg;
pub mod multi;

pub use header::{ExtendedClientMsgHdr, MsgHdr, MsgHdrProtoBuf};
pub use msg::{ClientMessage, ClientMsg, ClientMsgProtobuf, Msg};

/// Header of a received packet, in the layout it arrived with.
#[derive(Clone, Debug, PartialEq)]
pub enum PacketHeader {
    /// Basic 20-byte header used by the channel handshake.
    Basic(MsgHdr),
    /// 36-byte extended header of non-protobuf client messages.
    Extended(ExtendedClientMsgHdr),
    /// Protobuf header.
    Protobuf(MsgHdrProtoBuf),
}

/// A framed inbound packet.
///
/// Produced once by [`parse_packet`]; the payload is shared, never copied or
/// mutated.
#[derive(Clone, Debug)]
pub struct PacketMsg {
    msg: EMsg,
    header: PacketHeader,
    data: Bytes,
    body_offset: usize,
}

impl PacketMsg {
    /// Message kind, with the protobuf flag removed.
    #[must_use]
    pub fn msg_type(&self) -> EMsg { self.msg }

    /// Returns `true` when the packet carries a protobuf header.
    #[must_use]
    pub fn is_proto(&self) -> bool { matches!(self.header, PacketHeader::Protobuf(_)) }

    /// Parsed header.
    #[must_use]
    pub fn header(&self) -> &PacketHeader { &self.header }

    /// Job this packet answers, or [`JobId::INVALID`].
    #[must_use]
    pub fn target_job(&self) -> JobId {
        match &self.header {
            PacketHeader::Basic(hdr) => hdr.target_job,
            PacketHeader::Extended(hdr) => hdr.target_job,
            PacketHeader::Protobuf(hdr) => hdr.target_job(),
        }
    }

    /// Job that sent this packet, or [`JobId::INVALID`].
    #[must_use]
    pub fn source_job(&self) -> JobId {
        match &self.header {
            PacketHeader::Basic(hdr) => hdr.source_job,
            PacketHeader::Extended(hdr) => hdr.source_job,
            PacketHeader::Protobuf(hdr) => hdr.source_job(),
        }
    }

    /// The complete packet, header included.
    #[must_use]
    pub fn data(&self) -> &Bytes { &self.data }

    /// The message body following the header.
    #[must_use]
    pub fn body(&self) -> Bytes { self.data.slice(self.body_offset..) }
}

/// Frame raw packet bytes into a [`PacketMsg`].
///
/// Returns `None` when the input is shorter than the 4-byte message code or
/// when the header for the detected layout cannot be parsed. The channel
/// handshake kinds always use the basic header, whatever the protobuf flag
/// says.
#[must_use]
pub fn parse_packet(data: Bytes) -> Option<PacketMsg> {
    if data.len() < 4 {
        debug!(len = data.len(), "packet too small to contain a message");
        return None;
    }

    let mut reader = WireReader::new(&data);
    let raw = reader.read_u32()?;
    let msg = EMsg::from_raw(raw);
    let proto = is_proto(raw);

    let mut reader = WireReader::new(&data);
    let header = if msg.is_channel_handshake() {
        MsgHdr::parse(&mut reader).map(PacketHeader::Basic)
    } else if proto {
        MsgHdrProtoBuf::parse(&mut reader).map(PacketHeader::Protobuf)
    } else {
        ExtendedClientMsgHdr::parse(&mut reader).map(PacketHeader::Extended)
    };

    let Some(header) = header else {
        debug!(emsg = ?msg, proto, len = data.len(), "failed to parse packet header");
        return None;
    };

    let body_offset = reader.position();
    Some(PacketMsg {
        msg,
        header,
        data,
        body_offset,
    })
}
