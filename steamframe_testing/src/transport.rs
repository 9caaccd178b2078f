//! In-memory transport whose events are driven by the test.

use std::{
    io,
    net::{IpAddr, Ipv4Addr},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use steamframe::{
    connection::{Connection, ConnectionError, ConnectionEvent, ConnectionEvents, ConnectionFactory, ProtocolTypes},
    discovery::ServerEndpoint,
    enums::EUniverse,
};
use tokio::runtime::Handle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

#[derive(Default)]
struct MockState {
    events: ConnectionEvents,
    protocols: ProtocolTypes,
    endpoint: Mutex<Option<ServerEndpoint>>,
    connects: Mutex<Vec<(ServerEndpoint, Duration)>>,
    sent: Mutex<Vec<Bytes>>,
    disconnects: AtomicUsize,
    refuse_connect: AtomicBool,
    refuse_send: AtomicBool,
}

/// Scriptable [`Connection`].
///
/// Nothing happens on its own: `connect` and `disconnect` are recorded and
/// the test decides which events follow. Clones share state.
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<MockState>,
}

impl MockConnection {
    /// Create a transport reporting `protocols`.
    pub fn new(protocols: ProtocolTypes) -> Self {
        Self {
            state: Arc::new(MockState {
                protocols,
                ..MockState::default()
            }),
        }
    }

    /// Make the next `connect` calls fail immediately.
    pub fn refuse_connect(&self, refuse: bool) { self.state.refuse_connect.store(refuse, Ordering::SeqCst); }

    /// Make `send` return an error.
    pub fn refuse_send(&self, refuse: bool) { self.state.refuse_send.store(refuse, Ordering::SeqCst); }

    /// Report that the channel is ready.
    pub fn emit_connected(&self) { self.state.events.emit(&ConnectionEvent::Connected); }

    /// Report that the transport closed.
    pub fn emit_disconnected(&self, user_initiated: bool) {
        self.state
            .events
            .emit(&ConnectionEvent::Disconnected { user_initiated });
    }

    /// Deliver raw packet bytes.
    pub fn emit_packet(&self, data: Bytes) { self.state.events.emit(&ConnectionEvent::NetMsgReceived(data)); }

    /// Endpoints passed to `connect`, with their timeouts.
    pub fn connects(&self) -> Vec<(ServerEndpoint, Duration)> { lock(&self.state.connects).clone() }

    /// Payloads accepted by `send`, in order.
    pub fn sent(&self) -> Vec<Bytes> { lock(&self.state.sent).clone() }

    /// Number of `disconnect` calls.
    pub fn disconnect_count(&self) -> usize { self.state.disconnects.load(Ordering::SeqCst) }
}

impl Connection for MockConnection {
    fn connect(&self, endpoint: ServerEndpoint, timeout: Duration) -> Result<(), ConnectionError> {
        lock(&self.state.connects).push((endpoint.clone(), timeout));
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock connection refused",
            )));
        }
        *lock(&self.state.endpoint) = Some(endpoint);
        Ok(())
    }

    fn disconnect(&self) { self.state.disconnects.fetch_add(1, Ordering::SeqCst); }

    fn send(&self, data: Bytes) -> io::Result<()> {
        if self.state.refuse_send.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock send refused"));
        }
        lock(&self.state.sent).push(data);
        Ok(())
    }

    fn current_endpoint(&self) -> Option<ServerEndpoint> { lock(&self.state.endpoint).clone() }

    fn local_address(&self) -> Option<IpAddr> {
        self.current_endpoint().map(|_| IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn protocol_types(&self) -> ProtocolTypes { self.state.protocols }

    fn events(&self) -> &ConnectionEvents { &self.state.events }
}

/// [`ConnectionFactory`] handing out [`MockConnection`]s.
///
/// Every request is recorded. Created transports report
/// [`ProtocolTypes::TCP`].
#[derive(Default)]
pub struct MockConnectionFactory {
    created: Mutex<Vec<MockConnection>>,
    requests: Mutex<Vec<ProtocolTypes>>,
    refuse_connect: AtomicBool,
}

impl MockConnectionFactory {
    /// Create an empty factory.
    pub fn new() -> Self { Self::default() }

    /// Hand out transports whose `connect` fails.
    pub fn refuse_connect(&self, refuse: bool) { self.refuse_connect.store(refuse, Ordering::SeqCst); }

    /// Transports created so far, oldest first.
    pub fn connections(&self) -> Vec<MockConnection> { lock(&self.created).clone() }

    /// Most recently created transport.
    pub fn last(&self) -> Option<MockConnection> { lock(&self.created).last().cloned() }

    /// Protocol sets passed to `create`.
    pub fn requests(&self) -> Vec<ProtocolTypes> { lock(&self.requests).clone() }
}

impl ConnectionFactory for MockConnectionFactory {
    fn create(
        &self,
        protocols: ProtocolTypes,
        _universe: EUniverse,
        _runtime: &Handle,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        lock(&self.requests).push(protocols);
        if protocols.is_empty() {
            return Err(ConnectionError::NoProtocol);
        }
        if !protocols.contains(ProtocolTypes::TCP) {
            return Err(ConnectionError::UnsupportedProtocol(protocols));
        }

        let connection = MockConnection::new(ProtocolTypes::TCP);
        connection.refuse_connect(self.refuse_connect.load(Ordering::SeqCst));
        lock(&self.created).push(connection.clone());
        Ok(Box::new(connection))
    }
}
