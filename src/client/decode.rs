//! Conversions from server announcements to discovery types.

use std::net::{IpAddr, SocketAddr};

use tracing::debug;

use crate::{
    discovery::{ServerRecord, ipv4_from_wire},
    enums::ServerType,
    protobufs::{CMsgClientCMList, CMsgClientServerList},
};

fn socket_addr(ip: u32, port: u32) -> Option<SocketAddr> {
    let Ok(port) = u16::try_from(port) else {
        debug!(port, "ignoring announced server with out-of-range port");
        return None;
    };
    Some(SocketAddr::new(IpAddr::V4(ipv4_from_wire(ip)), port))
}

/// Socket servers from the address/port overlap, followed by WebSocket
/// servers.
pub(crate) fn cm_list_records(list: &CMsgClientCMList) -> Vec<ServerRecord> {
    if list.cm_addresses.len() != list.cm_ports.len() {
        debug!(
            addresses = list.cm_addresses.len(),
            ports = list.cm_ports.len(),
            "CM list address and port counts differ"
        );
    }

    let sockets = list
        .cm_addresses
        .iter()
        .zip(&list.cm_ports)
        .filter_map(|(&ip, &port)| socket_addr(ip, port))
        .map(ServerRecord::socket_server);
    let websockets = list.cm_websocket_addresses.iter().filter_map(|address| {
        let record = ServerRecord::websocket_server(address);
        if record.is_none() {
            debug!(address = %address, "ignoring malformed websocket address");
        }
        record
    });
    sockets.chain(websockets).collect()
}

/// Typed endpoints from a server list announcement, in message order.
pub(crate) fn server_list_entries(list: &CMsgClientServerList) -> Vec<(ServerType, SocketAddr)> {
    list.servers
        .iter()
        .filter_map(|server| {
            let addr = socket_addr(server.server_ip(), server.server_port())?;
            Some((ServerType::from_code(server.server_type()), addr))
        })
        .collect()
}
