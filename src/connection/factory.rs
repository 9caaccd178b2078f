//! Construction of transports for a protocol selection.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use super::{
    Connection,
    ConnectionError,
    EnvelopeEncryptedConnection,
    ProtocolTypes,
    SessionKeyExchange,
    SocketOptions,
    TcpConnection,
};
use crate::enums::EUniverse;

/// Builds a fresh transport for every connection attempt.
pub trait ConnectionFactory: Send + Sync {
    /// Create a transport speaking one of `protocols`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NoProtocol`] for an empty set and
    /// [`ConnectionError::UnsupportedProtocol`] when no requested protocol
    /// has an implementation.
    fn create(
        &self,
        protocols: ProtocolTypes,
        universe: EUniverse,
        runtime: &Handle,
    ) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Creates envelope-encrypted TCP transports.
///
/// TCP is chosen whenever the set contains it. Sets holding only UDP
/// and/or WebSocket are rejected.
pub struct DefaultConnectionFactory {
    key_exchange: Arc<dyn SessionKeyExchange>,
    socket_options: SocketOptions,
}

impl DefaultConnectionFactory {
    /// Create a factory using `key_exchange` for the channel handshake.
    #[must_use]
    pub fn new(key_exchange: Arc<dyn SessionKeyExchange>) -> Self {
        Self {
            key_exchange,
            socket_options: SocketOptions::default().nodelay(true),
        }
    }

    /// Replace the socket options applied to new TCP connections.
    #[must_use]
    pub fn socket_options(mut self, options: SocketOptions) -> Self {
        self.socket_options = options;
        self
    }
}

impl ConnectionFactory for DefaultConnectionFactory {
    fn create(
        &self,
        protocols: ProtocolTypes,
        universe: EUniverse,
        runtime: &Handle,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        if protocols.is_empty() {
            return Err(ConnectionError::NoProtocol);
        }
        if !protocols.contains(ProtocolTypes::TCP) {
            return Err(ConnectionError::UnsupportedProtocol(protocols));
        }

        debug!(%protocols, ?universe, "creating encrypted tcp connection");
        let tcp = TcpConnection::new(runtime.clone(), self.socket_options);
        Ok(Box::new(EnvelopeEncryptedConnection::new(
            Box::new(tcp),
            universe,
            Arc::clone(&self.key_exchange),
        )))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::connection::KeyExchangeOutcome;

    struct NoKeys;

    impl SessionKeyExchange for NoKeys {
        fn exchange(&self, _universe: EUniverse, _challenge: Option<&[u8]>) -> Result<KeyExchangeOutcome, ConnectionError> {
            Err(ConnectionError::Handshake("no keys".into()))
        }
    }

    fn factory() -> DefaultConnectionFactory { DefaultConnectionFactory::new(Arc::new(NoKeys)) }

    #[rstest]
    #[case(ProtocolTypes::TCP)]
    #[case(ProtocolTypes::ALL)]
    #[case(ProtocolTypes::TCP | ProtocolTypes::UDP)]
    #[tokio::test]
    async fn tcp_selections_build_a_tcp_transport(#[case] protocols: ProtocolTypes) {
        let connection = factory()
            .create(protocols, EUniverse::Public, &Handle::current())
            .expect("tcp is supported");
        assert_eq!(connection.protocol_types(), ProtocolTypes::TCP);
    }

    #[rstest]
    #[case(ProtocolTypes::UDP)]
    #[case(ProtocolTypes::WEB_SOCKET)]
    #[case(ProtocolTypes::UDP | ProtocolTypes::WEB_SOCKET)]
    #[tokio::test]
    async fn other_protocols_fail_fast(#[case] protocols: ProtocolTypes) {
        let result = factory().create(protocols, EUniverse::Public, &Handle::current());
        assert!(matches!(result, Err(ConnectionError::UnsupportedProtocol(p)) if p == protocols));
    }

    #[tokio::test]
    async fn empty_set_is_rejected() {
        let result = factory().create(ProtocolTypes::NONE, EUniverse::Public, &Handle::current());
        assert!(matches!(result, Err(ConnectionError::NoProtocol)));
    }
}
