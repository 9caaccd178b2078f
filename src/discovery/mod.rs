//! Candidate CM servers and their quality.
//!
//! The client asks a [`ServerList`] for the next server to try, reports
//! back whether a connection to it was good or bad, and replaces the whole
//! candidate set when the server announces a fresh CM list.

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr},
};

use crate::connection::ProtocolTypes;

mod basic;

pub use basic::BasicServerList;

/// Default port assumed for a WebSocket address without one.
pub const DEFAULT_WEBSOCKET_PORT: u16 = 443;

/// Address of a CM server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServerEndpoint {
    /// Resolved socket address.
    Socket(SocketAddr),
    /// Host name resolved at connect time.
    Host { host: String, port: u16 },
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(addr) => write!(f, "{addr}"),
            Self::Host { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

impl From<SocketAddr> for ServerEndpoint {
    fn from(addr: SocketAddr) -> Self { Self::Socket(addr) }
}

/// A candidate server and the protocols it accepts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerRecord {
    endpoint: ServerEndpoint,
    protocols: ProtocolTypes,
}

impl ServerRecord {
    /// Create a record for `endpoint` speaking `protocols`.
    #[must_use]
    pub fn new(endpoint: ServerEndpoint, protocols: ProtocolTypes) -> Self { Self { endpoint, protocols } }

    /// Socket server reachable over TCP and UDP.
    #[must_use]
    pub fn socket_server(addr: SocketAddr) -> Self {
        Self::new(ServerEndpoint::Socket(addr), ProtocolTypes::TCP | ProtocolTypes::UDP)
    }

    /// WebSocket server from a `host[:port]` address.
    ///
    /// Returns `None` when the host is empty or the port does not parse.
    ///
    /// ```
    /// use steamframe::discovery::{ServerEndpoint, ServerRecord};
    ///
    /// let record = ServerRecord::websocket_server("cm1.example.net:27019").expect("valid");
    /// assert_eq!(
    ///     record.endpoint(),
    ///     &ServerEndpoint::Host {
    ///         host: "cm1.example.net".into(),
    ///         port: 27019,
    ///     }
    /// );
    /// ```
    #[must_use]
    pub fn websocket_server(address: &str) -> Option<Self> {
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (address, DEFAULT_WEBSOCKET_PORT),
        };
        if host.is_empty() {
            return None;
        }
        Some(Self::new(
            ServerEndpoint::Host {
                host: host.to_owned(),
                port,
            },
            ProtocolTypes::WEB_SOCKET,
        ))
    }

    /// Server address.
    #[must_use]
    pub fn endpoint(&self) -> &ServerEndpoint { &self.endpoint }

    /// Protocols the server accepts.
    #[must_use]
    pub fn protocols(&self) -> ProtocolTypes { self.protocols }
}

/// Convert the packed big-endian IPv4 representation used on the wire.
#[must_use]
pub fn ipv4_from_wire(raw: u32) -> Ipv4Addr { Ipv4Addr::from(raw) }

/// Outcome reported for a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerQuality {
    Good,
    Bad,
}

/// Source of candidate servers.
pub trait ServerList: Send + Sync {
    /// Best server accepting at least one of `protocols`, if any.
    fn next_candidate(&self, protocols: ProtocolTypes) -> Option<ServerRecord>;

    /// Record the quality of `endpoint` for `protocols`.
    ///
    /// Returns `false` when the endpoint is unknown.
    fn try_mark(&self, endpoint: &ServerEndpoint, protocols: ProtocolTypes, quality: ServerQuality) -> bool;

    /// Replace every candidate with `records`.
    fn replace_list(&self, records: Vec<ServerRecord>);

    /// Snapshot of every candidate.
    fn records(&self) -> Vec<ServerRecord>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("cm.example.net", "cm.example.net", 443)]
    #[case("cm.example.net:27020", "cm.example.net", 27020)]
    fn websocket_addresses_parse(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let record = ServerRecord::websocket_server(input).expect("valid address");
        assert_eq!(
            record.endpoint(),
            &ServerEndpoint::Host {
                host: host.into(),
                port
            }
        );
        assert_eq!(record.protocols(), ProtocolTypes::WEB_SOCKET);
    }

    #[rstest]
    #[case("")]
    #[case(":443")]
    #[case("host:notaport")]
    fn malformed_websocket_addresses_are_rejected(#[case] input: &str) {
        assert!(ServerRecord::websocket_server(input).is_none());
    }

    #[test]
    fn wire_ipv4_is_big_endian() {
        assert_eq!(ipv4_from_wire(0x7F00_0001), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn socket_servers_accept_tcp_and_udp() {
        let record = ServerRecord::socket_server("10.0.0.1:27017".parse().expect("addr"));
        assert!(record.protocols().contains(ProtocolTypes::TCP | ProtocolTypes::UDP));
        assert_eq!(record.endpoint().to_string(), "10.0.0.1:27017");
    }
}
