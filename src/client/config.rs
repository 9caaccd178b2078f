//! Read-only configuration for [`CmClient`](super::CmClient).

use std::{fmt, sync::Arc, time::Duration};

use tokio::runtime::Handle;

use super::ClientError;
use crate::{
    connection::{ConnectionFactory, DefaultConnectionFactory, ProtocolTypes, SessionKeyExchange, SocketOptions},
    discovery::{BasicServerList, ServerList, ServerRecord},
    enums::EUniverse,
};

/// Default time allowed for a transport to connect.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat interval used until a logon response supplies one.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Settings shared by every connection a client makes.
///
/// Built once through [`ClientConfig::builder`] and never modified.
#[derive(Clone)]
pub struct ClientConfig {
    universe: EUniverse,
    protocol_types: ProtocolTypes,
    connection_timeout: Duration,
    heartbeat_interval: Duration,
    server_list: Arc<dyn ServerList>,
    connection_factory: Arc<dyn ConnectionFactory>,
    runtime: Handle,
}

impl ClientConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder { ClientConfigBuilder::default() }

    /// Universe expected from servers.
    #[must_use]
    pub fn universe(&self) -> EUniverse { self.universe }

    /// Protocols the client may use.
    #[must_use]
    pub fn protocol_types(&self) -> ProtocolTypes { self.protocol_types }

    /// Time allowed for a transport to connect.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration { self.connection_timeout }

    /// Heartbeat interval used before logon.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration { self.heartbeat_interval }

    /// Candidate server source.
    #[must_use]
    pub fn server_list(&self) -> &Arc<dyn ServerList> { &self.server_list }

    /// Transport factory.
    #[must_use]
    pub fn connection_factory(&self) -> &Arc<dyn ConnectionFactory> { &self.connection_factory }

    /// Runtime used for transport and heartbeat tasks.
    #[must_use]
    pub fn runtime(&self) -> &Handle { &self.runtime }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("universe", &self.universe)
            .field("protocol_types", &self.protocol_types)
            .field("connection_timeout", &self.connection_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientConfig`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use steamframe::{client::ClientConfig, connection::ProtocolTypes, enums::EUniverse};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let result = ClientConfig::builder()
///     .universe(EUniverse::Public)
///     .protocol_types(ProtocolTypes::TCP)
///     .connection_timeout(Duration::from_secs(10))
///     .build();
/// // A transport factory or key exchange is required.
/// assert!(result.is_err());
/// # }
/// ```
pub struct ClientConfigBuilder {
    universe: EUniverse,
    protocol_types: ProtocolTypes,
    connection_timeout: Duration,
    heartbeat_interval: Duration,
    server_list: Option<Arc<dyn ServerList>>,
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    key_exchange: Option<Arc<dyn SessionKeyExchange>>,
    socket_options: SocketOptions,
    runtime: Option<Handle>,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            universe: EUniverse::Public,
            protocol_types: ProtocolTypes::TCP,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            server_list: None,
            connection_factory: None,
            key_exchange: None,
            socket_options: SocketOptions::default().nodelay(true),
            runtime: None,
        }
    }
}

impl ClientConfigBuilder {
    /// Universe expected from servers.
    #[must_use]
    pub fn universe(mut self, universe: EUniverse) -> Self {
        self.universe = universe;
        self
    }

    /// Protocols the client may use.
    #[must_use]
    pub fn protocol_types(mut self, protocols: ProtocolTypes) -> Self {
        self.protocol_types = protocols;
        self
    }

    /// Time allowed for a transport to connect.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Heartbeat interval used before logon.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Use a custom server list.
    #[must_use]
    pub fn server_list(mut self, list: Arc<dyn ServerList>) -> Self {
        self.server_list = Some(list);
        self
    }

    /// Seed a [`BasicServerList`] with `records`.
    #[must_use]
    pub fn servers(self, records: Vec<ServerRecord>) -> Self { self.server_list(Arc::new(BasicServerList::new(records))) }

    /// Use a custom transport factory. Takes precedence over
    /// [`key_exchange`](Self::key_exchange).
    #[must_use]
    pub fn connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connection_factory = Some(factory);
        self
    }

    /// Build transports with [`DefaultConnectionFactory`] using this key
    /// exchange.
    #[must_use]
    pub fn key_exchange(mut self, key_exchange: Arc<dyn SessionKeyExchange>) -> Self {
        self.key_exchange = Some(key_exchange);
        self
    }

    /// Socket options for transports built from a key exchange.
    #[must_use]
    pub fn socket_options(mut self, options: SocketOptions) -> Self {
        self.socket_options = options;
        self
    }

    /// Runtime for transport and heartbeat tasks. Defaults to the current
    /// runtime at build time.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the protocol set is empty, the timeout is
    /// zero, no transport source was supplied, or no runtime is available.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        if self.protocol_types.is_empty() {
            return Err(ClientError::EmptyProtocols);
        }
        if self.connection_timeout.is_zero() {
            return Err(ClientError::InvalidTimeout(self.connection_timeout));
        }
        let connection_factory: Arc<dyn ConnectionFactory> = match (self.connection_factory, self.key_exchange) {
            (Some(factory), _) => factory,
            (None, Some(key_exchange)) => {
                Arc::new(DefaultConnectionFactory::new(key_exchange).socket_options(self.socket_options))
            }
            (None, None) => return Err(ClientError::MissingConnectionFactory),
        };
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };

        Ok(ClientConfig {
            universe: self.universe,
            protocol_types: self.protocol_types,
            connection_timeout: self.connection_timeout,
            heartbeat_interval: self.heartbeat_interval,
            server_list: self
                .server_list
                .unwrap_or_else(|| Arc::new(BasicServerList::default())),
            connection_factory,
            runtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::connection::{ConnectionError, KeyExchangeOutcome};

    struct NoKeys;

    impl SessionKeyExchange for NoKeys {
        fn exchange(&self, _universe: EUniverse, _challenge: Option<&[u8]>) -> Result<KeyExchangeOutcome, ConnectionError> {
            Err(ConnectionError::Handshake("no keys".into()))
        }
    }

    #[tokio::test]
    async fn defaults_apply() {
        let config = ClientConfig::builder()
            .key_exchange(Arc::new(NoKeys))
            .build()
            .expect("valid config");
        assert_eq!(config.universe(), EUniverse::Public);
        assert_eq!(config.protocol_types(), ProtocolTypes::TCP);
        assert_eq!(config.connection_timeout(), DEFAULT_CONNECTION_TIMEOUT);
        assert_eq!(config.heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL);
        assert!(config.server_list().records().is_empty());
    }

    #[tokio::test]
    async fn empty_protocols_are_rejected() {
        let err = ClientConfig::builder()
            .key_exchange(Arc::new(NoKeys))
            .protocol_types(ProtocolTypes::NONE)
            .build()
            .expect_err("empty protocol set");
        assert!(matches!(err, ClientError::EmptyProtocols));
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let err = ClientConfig::builder()
            .key_exchange(Arc::new(NoKeys))
            .connection_timeout(Duration::ZERO)
            .build()
            .expect_err("zero timeout");
        assert!(matches!(err, ClientError::InvalidTimeout(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn transport_source_is_required() {
        let err = ClientConfig::builder().build().expect_err("no factory");
        assert!(matches!(err, ClientError::MissingConnectionFactory));
    }

    #[test]
    fn runtime_is_required_outside_tokio() {
        let err = ClientConfig::builder()
            .key_exchange(Arc::new(NoKeys))
            .build()
            .expect_err("no runtime");
        assert!(matches!(err, ClientError::NoRuntime(_)));
    }
}
