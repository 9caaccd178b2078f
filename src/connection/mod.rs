//! Transports carrying CM packets.
//!
//! A [`Connection`] moves whole packets between the client and one server.
//! It reports what happens through its [`ConnectionEvents`] registry rather
//! than through return values: `connect` only *starts* the attempt, and both
//! its success and every later failure arrive as events. Listeners are
//! attached and detached explicitly so a client can cut a dying transport
//! off deterministically.

use std::{
    fmt,
    io,
    net::IpAddr,
    ops::{BitAnd, BitOr, BitOrAssign},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use thiserror::Error;

use crate::discovery::ServerEndpoint;

pub mod codec;
mod envelope;
mod factory;
mod socket;
mod tcp;

pub use envelope::{ChannelCipher, EnvelopeEncryptedConnection, KeyExchangeOutcome, SessionKeyExchange};
pub use factory::{ConnectionFactory, DefaultConnectionFactory};
pub use socket::SocketOptions;
pub use tcp::TcpConnection;

/// Set of transport protocols.
///
/// ```
/// use steamframe::connection::ProtocolTypes;
///
/// let both = ProtocolTypes::TCP | ProtocolTypes::WEB_SOCKET;
/// assert!(both.contains(ProtocolTypes::TCP));
/// assert!(!both.contains(ProtocolTypes::UDP));
/// assert_eq!(both & ProtocolTypes::UDP, ProtocolTypes::NONE);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProtocolTypes(u8);

impl ProtocolTypes {
    /// Empty set.
    pub const NONE: Self = Self(0);
    /// Stream socket.
    pub const TCP: Self = Self(1);
    /// Datagram socket.
    pub const UDP: Self = Self(1 << 1);
    /// WebSocket.
    pub const WEB_SOCKET: Self = Self(1 << 2);
    /// Every protocol.
    pub const ALL: Self = Self(0b111);

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 { self.0 }

    /// Returns `true` when every protocol in `other` is also in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    /// Returns `true` when the sets share a protocol.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool { self.0 & other.0 != 0 }

    /// Returns `true` for the empty set.
    #[must_use]
    pub const fn is_empty(self) -> bool { self.0 == 0 }
}

impl BitOr for ProtocolTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl BitOrAssign for ProtocolTypes {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

impl BitAnd for ProtocolTypes {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self { Self(self.0 & rhs.0) }
}

impl fmt::Debug for ProtocolTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::TCP, "Tcp"),
            (Self::UDP, "Udp"),
            (Self::WEB_SOCKET, "WebSocket"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl fmt::Display for ProtocolTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

/// Something that happened on a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport is ready to carry application packets.
    Connected,
    /// The transport closed. `user_initiated` is `true` when
    /// [`Connection::disconnect`] caused it.
    Disconnected { user_initiated: bool },
    /// A whole packet arrived.
    NetMsgReceived(Bytes),
}

/// Identifies a listener registered with [`ConnectionEvents`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Explicit listener registry for one transport.
///
/// Emission snapshots the listener list, so a listener may detach itself
/// (or others) while an event is being delivered.
#[derive(Default)]
pub struct ConnectionEvents {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ConnectionEvents {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `listener`; it receives every event emitted afterwards.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, Arc::new(listener)));
        id
    }

    /// Detach a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize { self.listeners().len() }

    /// Deliver `event` to every attached listener.
    pub fn emit(&self, event: &ConnectionEvent) {
        let snapshot: Vec<(ListenerId, Listener)> = self.listeners().clone();
        for (id, listener) in snapshot {
            if self.is_attached(id) {
                listener(event);
            }
        }
    }

    fn is_attached(&self, id: ListenerId) -> bool {
        self.listeners().iter().any(|(existing, _)| *existing == id)
    }
}

/// Failures starting a transport.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport is already connected or connecting.
    #[error("connection already in progress")]
    AlreadyConnected,
    /// Socket level failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The channel handshake was malformed or refused.
    #[error("channel handshake failed: {0}")]
    Handshake(String),
    /// None of the requested protocols has a transport implementation.
    #[error("no supported transport for protocols {0}")]
    UnsupportedProtocol(ProtocolTypes),
    /// The protocol set was empty.
    #[error("protocol set has no protocols")]
    NoProtocol,
}

/// A packet transport to one server.
///
/// Implementations must emit exactly one
/// [`ConnectionEvent::Disconnected`] per successful `connect`, including
/// when a write fails, so callers may treat that event as the only failure
/// signal.
pub trait Connection: Send + Sync {
    /// Start connecting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the attempt cannot be started at all.
    /// Failures after the attempt starts are reported as
    /// [`ConnectionEvent::Disconnected`].
    fn connect(&self, endpoint: ServerEndpoint, timeout: Duration) -> Result<(), ConnectionError>;

    /// Close the transport. Idempotent.
    fn disconnect(&self);

    /// Queue one packet for transmission.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport is not connected.
    fn send(&self, data: Bytes) -> io::Result<()>;

    /// Endpoint of the current or most recent connection.
    fn current_endpoint(&self) -> Option<ServerEndpoint>;

    /// Local address of the connected socket.
    fn local_address(&self) -> Option<IpAddr>;

    /// Protocols this transport speaks.
    fn protocol_types(&self) -> ProtocolTypes;

    /// Listener registry for this transport.
    fn events(&self) -> &ConnectionEvents;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ProtocolTypes::ALL, ProtocolTypes::TCP, true)]
    #[case(ProtocolTypes::TCP | ProtocolTypes::UDP, ProtocolTypes::UDP, true)]
    #[case(ProtocolTypes::TCP, ProtocolTypes::WEB_SOCKET, false)]
    #[case(ProtocolTypes::NONE, ProtocolTypes::TCP, false)]
    fn protocol_containment(
        #[case] set: ProtocolTypes,
        #[case] flag: ProtocolTypes,
        #[case] expected: bool,
    ) {
        assert_eq!(set.contains(flag), expected);
        assert_eq!(set.intersects(flag), expected);
    }

    #[test]
    fn protocol_debug_lists_members() {
        assert_eq!(format!("{:?}", ProtocolTypes::TCP | ProtocolTypes::WEB_SOCKET), "Tcp|WebSocket");
        assert_eq!(ProtocolTypes::NONE.to_string(), "None");
    }

    #[test]
    fn unsubscribed_listener_receives_nothing() {
        let events = ConnectionEvents::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let id = events.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        events.emit(&ConnectionEvent::Connected);
        assert!(events.unsubscribe(id));
        assert!(!events.unsubscribe(id), "second detach is a no-op");
        events.emit(&ConnectionEvent::Connected);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn listener_may_detach_another_during_emit() {
        let events = Arc::new(ConnectionEvents::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let victim = Arc::new(Mutex::new(None::<ListenerId>));

        let registry = Arc::downgrade(&events);
        let target = Arc::clone(&victim);
        let first_hits = Arc::clone(&hits);
        let first = events.subscribe(move |_| {
            first_hits.fetch_add(1, Ordering::SeqCst);
            let id = *target.lock().expect("victim poisoned");
            if let (Some(events), Some(id)) = (registry.upgrade(), id) {
                events.unsubscribe(id);
            }
        });
        let second_hits = Arc::clone(&hits);
        let second = events.subscribe(move |_| {
            second_hits.fetch_add(100, Ordering::SeqCst);
        });
        *victim.lock().expect("victim poisoned") = Some(second);

        events.emit(&ConnectionEvent::Disconnected { user_initiated: false });

        assert_eq!(hits.load(Ordering::SeqCst), 1, "detached listener is skipped");
        assert!(events.unsubscribe(first));
    }
}
