//! Builders for the raw packets a CM server sends.

use std::{io::Write as _, net::Ipv4Addr};

use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use steamframe::{
    byte_order::write_wire_u32,
    enums::{EMsg, EResult},
    packet::{ClientMessage, ClientMsgProtobuf},
    protobufs::{
        CMsgClientCMList,
        CMsgClientLoggedOff,
        CMsgClientLogonResponse,
        CMsgClientServerList,
        CMsgClientSessionToken,
        CMsgMulti,
        cmsg_client_server_list::Server,
    },
};

/// Serialise `body` behind a protobuf header for `emsg`.
pub fn proto<T: prost::Message + Default>(emsg: EMsg, body: T) -> Bytes {
    let mut msg = ClientMsgProtobuf::<T>::new(emsg);
    *msg.body_mut() = body;
    msg.serialize()
}

/// Logon response carrying `result`, the session identity and the
/// heartbeat period in seconds.
pub fn logon_response(result: EResult, session_id: i32, steam_id: u64, heartbeat_seconds: i32) -> Bytes {
    let mut msg = ClientMsgProtobuf::<CMsgClientLogonResponse>::new(EMsg::ClientLogOnResponse);
    *msg.body_mut() = CMsgClientLogonResponse {
        eresult: Some(result.code()),
        out_of_game_heartbeat_seconds: Some(heartbeat_seconds),
        cell_id: Some(4),
        rtime32_server_time: Some(1_700_000_000),
        ..Default::default()
    };
    let header = &mut msg.proto_header_mut().proto;
    header.client_sessionid = Some(session_id);
    header.steamid = Some(steam_id);
    msg.serialize()
}

/// Logoff notice carrying `result`.
pub fn logged_off(result: EResult) -> Bytes {
    proto(
        EMsg::ClientLoggedOff,
        CMsgClientLoggedOff {
            eresult: Some(result.code()),
        },
    )
}

/// Session token notice.
pub fn session_token(token: u64) -> Bytes {
    proto(EMsg::ClientSessionToken, CMsgClientSessionToken { token: Some(token) })
}

/// CM list with socket servers and WebSocket addresses.
pub fn cm_list(sockets: &[(Ipv4Addr, u16)], websockets: &[&str]) -> Bytes {
    proto(
        EMsg::ClientCMList,
        CMsgClientCMList {
            cm_addresses: sockets.iter().map(|(ip, _)| u32::from(*ip)).collect(),
            cm_ports: sockets.iter().map(|(_, port)| u32::from(*port)).collect(),
            cm_websocket_addresses: websockets.iter().map(|address| (*address).to_owned()).collect(),
            ..Default::default()
        },
    )
}

/// Server list of `(server type code, address, port)` entries.
pub fn server_list(servers: &[(u32, Ipv4Addr, u16)]) -> Bytes {
    proto(
        EMsg::ClientServerList,
        CMsgClientServerList {
            servers: servers
                .iter()
                .map(|(kind, ip, port)| Server {
                    server_type: Some(*kind),
                    server_ip: Some(u32::from(*ip)),
                    server_port: Some(u32::from(*port)),
                })
                .collect(),
        },
    )
}

/// Concatenate `parts` as `u32 LE length · packet` records.
pub fn multi_payload(parts: &[Bytes]) -> Vec<u8> {
    let mut payload = Vec::new();
    for part in parts {
        let len = u32::try_from(part.len()).unwrap_or(u32::MAX);
        payload.extend_from_slice(&write_wire_u32(len));
        payload.extend_from_slice(part);
    }
    payload
}

/// Gzip `data` in memory.
///
/// # Panics
///
/// Panics if compression into memory fails.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory gzip write");
    encoder.finish().expect("in-memory gzip finish")
}

/// Multi batch of `parts`, gzip-compressed when `compress` is set.
///
/// # Panics
///
/// Panics if compression into memory fails.
pub fn multi(parts: &[Bytes], compress: bool) -> Bytes {
    let payload = multi_payload(parts);
    let body = if compress {
        CMsgMulti {
            size_unzipped: Some(u32::try_from(payload.len()).unwrap_or(u32::MAX)),
            message_body: Some(gzip(&payload)),
        }
    } else {
        CMsgMulti {
            size_unzipped: Some(0),
            message_body: Some(payload),
        }
    };
    proto(EMsg::Multi, body)
}
