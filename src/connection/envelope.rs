//! Envelope encryption over an inner transport.
//!
//! The server opens every connection with a `ChannelEncryptRequest`. The
//! client answers with a session key encrypted for the server, then waits
//! for `ChannelEncryptResult`. Only after an `OK` result does the wrapper
//! report [`ConnectionEvent::Connected`]; from then on every packet is
//! passed through the negotiated [`ChannelCipher`].
//!
//! The cryptographic primitives are supplied by a [`SessionKeyExchange`].

use std::{
    fmt,
    io,
    net::IpAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use bytes::{BufMut, Bytes};
use flate2::Crc;
use tracing::{debug, warn};

use super::{Connection, ConnectionError, ConnectionEvent, ConnectionEvents, ProtocolTypes};
use crate::{
    byte_order::{WireReader, write_wire_u32},
    discovery::ServerEndpoint,
    enums::{EMsg, EResult, EUniverse},
    packet::{ClientMessage, Msg, PacketMsg, parse_packet},
};

/// Handshake protocol version sent in `ChannelEncryptResponse`.
pub const CHANNEL_PROTOCOL_VERSION: u32 = 1;
/// Declared key size sent in `ChannelEncryptResponse`.
pub const CHANNEL_KEY_SIZE: u32 = 128;
/// Length of the optional server challenge.
pub const CHALLENGE_LEN: usize = 16;

/// Symmetric cipher negotiated for one connection.
pub trait ChannelCipher: Send + Sync {
    /// Encrypt an outgoing packet.
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;

    /// Decrypt an incoming packet.
    ///
    /// # Errors
    ///
    /// Returns an error when the ciphertext fails authentication or is
    /// malformed.
    fn decrypt(&self, ciphertext: &[u8]) -> io::Result<Vec<u8>>;
}

/// Result of generating a session key.
pub struct KeyExchangeOutcome {
    /// Session key (and challenge, if any) encrypted for the server.
    pub encrypted_key: Vec<u8>,
    /// Cipher to use once the server accepts the key.
    pub cipher: Arc<dyn ChannelCipher>,
}

impl fmt::Debug for KeyExchangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyExchangeOutcome")
            .field("encrypted_key_len", &self.encrypted_key.len())
            .finish_non_exhaustive()
    }
}

/// Generates session keys for the channel handshake.
pub trait SessionKeyExchange: Send + Sync {
    /// Create a session key for a server of `universe`, binding `challenge`
    /// when the server supplied one.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Handshake`] when no key can be produced,
    /// for example because no public key is known for `universe`.
    fn exchange(&self, universe: EUniverse, challenge: Option<&[u8]>) -> Result<KeyExchangeOutcome, ConnectionError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Disconnected,
    AwaitingRequest,
    Challenged,
    Encrypted,
}

struct EnvelopeState {
    phase: Phase,
    pending: Option<Arc<dyn ChannelCipher>>,
    cipher: Option<Arc<dyn ChannelCipher>>,
    protocol_failure: bool,
}

struct Shared {
    inner: Box<dyn Connection>,
    universe: EUniverse,
    key_exchange: Arc<dyn SessionKeyExchange>,
    events: ConnectionEvents,
    state: Mutex<EnvelopeState>,
}

/// Wraps a transport with the channel encryption handshake.
pub struct EnvelopeEncryptedConnection {
    shared: Arc<Shared>,
}

impl EnvelopeEncryptedConnection {
    /// Wrap `inner`, expecting servers of `universe`.
    #[must_use]
    pub fn new(inner: Box<dyn Connection>, universe: EUniverse, key_exchange: Arc<dyn SessionKeyExchange>) -> Self {
        let shared = Arc::new(Shared {
            inner,
            universe,
            key_exchange,
            events: ConnectionEvents::new(),
            state: Mutex::new(EnvelopeState {
                phase: Phase::Disconnected,
                pending: None,
                cipher: None,
                protocol_failure: false,
            }),
        });
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.inner.events().subscribe(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_inner_event(event);
            }
        });
        Self { shared }
    }

    /// Returns `true` once the handshake has completed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool { self.shared.state().phase == Phase::Encrypted }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, EnvelopeState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    fn on_inner_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                debug!("transport connected; awaiting channel encrypt request");
                self.state().phase = Phase::AwaitingRequest;
            }
            ConnectionEvent::Disconnected { user_initiated } => {
                let protocol_failure = {
                    let mut state = self.state();
                    state.phase = Phase::Disconnected;
                    state.pending = None;
                    state.cipher = None;
                    std::mem::take(&mut state.protocol_failure)
                };
                self.events.emit(&ConnectionEvent::Disconnected {
                    user_initiated: *user_initiated && !protocol_failure,
                });
            }
            ConnectionEvent::NetMsgReceived(data) => self.on_data(data),
        }
    }

    fn on_data(&self, data: &Bytes) {
        let (phase, cipher) = {
            let state = self.state();
            (state.phase, state.cipher.clone())
        };
        if phase == Phase::Encrypted {
            let Some(cipher) = cipher else {
                self.fail("encrypted channel has no cipher");
                return;
            };
            match cipher.decrypt(data) {
                Ok(plain) => self.events.emit(&ConnectionEvent::NetMsgReceived(Bytes::from(plain))),
                Err(err) => self.fail(&format!("failed to decrypt packet: {err}")),
            }
            return;
        }

        let Some(packet) = parse_packet(data.clone()) else {
            self.fail("unparseable packet during channel setup");
            return;
        };
        match (phase, packet.msg_type()) {
            (Phase::AwaitingRequest, EMsg::ChannelEncryptRequest) => self.on_encrypt_request(&packet),
            (Phase::Challenged, EMsg::ChannelEncryptResult) => self.on_encrypt_result(&packet),
            (phase, msg) => {
                warn!(?phase, emsg = ?msg, "rejected message during channel setup");
                self.fail("unexpected message during channel setup");
            }
        }
    }

    fn on_encrypt_request(&self, packet: &PacketMsg) {
        let body = packet.body();
        let mut reader = WireReader::new(&body);
        let (Some(version), Some(universe)) = (reader.read_u32(), reader.read_u32()) else {
            self.fail("truncated channel encrypt request");
            return;
        };
        let universe = EUniverse::from_code(universe);
        if universe != self.universe {
            warn!(expected = ?self.universe, got = ?universe, "server universe mismatch");
            self.fail("universe mismatch");
            return;
        }
        let challenge = if reader.remaining() >= CHALLENGE_LEN {
            reader.take(CHALLENGE_LEN)
        } else {
            None
        };
        debug!(version, ?universe, challenged = challenge.is_some(), "got channel encrypt request");

        let outcome = match self.key_exchange.exchange(universe, challenge) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail(&format!("session key exchange failed: {err}"));
                return;
            }
        };

        let mut crc = Crc::new();
        crc.update(&outcome.encrypted_key);
        let mut response = Msg::new(EMsg::ChannelEncryptResponse);
        let payload = response.payload_mut();
        payload.put_slice(&write_wire_u32(CHANNEL_PROTOCOL_VERSION));
        payload.put_slice(&write_wire_u32(CHANNEL_KEY_SIZE));
        payload.put_slice(&outcome.encrypted_key);
        payload.put_slice(&write_wire_u32(crc.sum()));
        payload.put_slice(&write_wire_u32(0));

        {
            let mut state = self.state();
            state.phase = Phase::Challenged;
            state.pending = Some(outcome.cipher);
        }
        if let Err(err) = self.inner.send(response.serialize()) {
            debug!(error = %err, "failed to send channel encrypt response");
        }
    }

    fn on_encrypt_result(&self, packet: &PacketMsg) {
        let body = packet.body();
        let Some(code) = WireReader::new(&body).read_u32() else {
            self.fail("truncated channel encrypt result");
            return;
        };
        #[expect(clippy::cast_possible_wrap, reason = "result codes are signed on the wire")]
        let result = EResult::from_code(code as i32);
        if result != EResult::OK {
            warn!(?result, "channel encryption refused");
            self.fail("channel encryption refused");
            return;
        }

        {
            let mut state = self.state();
            state.cipher = state.pending.take();
            state.phase = Phase::Encrypted;
        }
        debug!("channel encrypted");
        self.events.emit(&ConnectionEvent::Connected);
    }

    fn fail(&self, reason: &str) {
        debug!(reason, "tearing down connection");
        self.state().protocol_failure = true;
        self.inner.disconnect();
    }
}

impl Connection for EnvelopeEncryptedConnection {
    fn connect(&self, endpoint: ServerEndpoint, timeout: Duration) -> Result<(), ConnectionError> {
        {
            let mut state = self.shared.state();
            state.protocol_failure = false;
            state.pending = None;
            state.cipher = None;
        }
        self.shared.inner.connect(endpoint, timeout)
    }

    fn disconnect(&self) { self.shared.inner.disconnect(); }

    fn send(&self, data: Bytes) -> io::Result<()> {
        let (phase, cipher) = {
            let state = self.shared.state();
            (state.phase, state.cipher.clone())
        };
        match (phase, cipher) {
            (Phase::Encrypted, Some(cipher)) => self.shared.inner.send(Bytes::from(cipher.encrypt(&data))),
            _ => {
                debug!(?phase, "dropping packet sent before channel encryption");
                Ok(())
            }
        }
    }

    fn current_endpoint(&self) -> Option<ServerEndpoint> { self.shared.inner.current_endpoint() }

    fn local_address(&self) -> Option<IpAddr> { self.shared.inner.local_address() }

    fn protocol_types(&self) -> ProtocolTypes { self.shared.inner.protocol_types() }

    fn events(&self) -> &ConnectionEvents { &self.shared.events }
}
