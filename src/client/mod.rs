//! Session client for CM servers.
//!
//! [`CmClient`] owns at most one transport at a time. It picks a server,
//! drives the transport's lifecycle events, routes inbound packets through
//! the session handlers (logon, logoff, server lists, session tokens and
//! multi batches) and keeps the session alive with a heartbeat once logged
//! on. Everything the client observes is reported through a
//! [`ClientHandler`]; [`SteamClient`] is the ready-made pairing of a client
//! with a [`CallbackQueue`](crate::callbacks::CallbackQueue).

use std::{
    collections::HashMap,
    mem,
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        RwLock,
        RwLockReadGuard,
        RwLockWriteGuard,
        Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use tracing::{debug, info, info_span, warn};

use crate::{
    connection::{Connection, ConnectionEvent, ListenerId},
    discovery::{ServerList, ServerQuality, ServerRecord},
    enums::{EMsg, EResult, EUniverse, ServerType},
    heartbeat::Heartbeat,
    ids::{JobId, SteamId},
    metrics::{self, Direction},
    packet::{
        ClientMessage,
        ClientMsgProtobuf,
        PacketMsg,
        multi::{SubPackets, unpack_multi},
        parse_packet,
    },
    protobufs::{
        CMsgClientCMList,
        CMsgClientHeartBeat,
        CMsgClientLoggedOff,
        CMsgClientLogonResponse,
        CMsgClientServerList,
        CMsgClientSessionToken,
    },
};

mod config;
mod decode;
mod error;
mod hooks;
mod poster;
mod state;

pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL};
pub use error::ClientError;
pub use hooks::{ClientHandler, DebugNetworkListener};
pub use poster::{CallbackPoster, SteamClient};
pub use state::ConnectionState;
use state::SessionState;

/// Added to the server-provided heartbeat period.
pub const HEARTBEAT_SLACK: Duration = Duration::from_secs(1);

/// Transport currently owned by the client.
struct Attached {
    connection: Arc<dyn Connection>,
    listener: ListenerId,
    generation: u64,
}

struct Inner<H> {
    config: ClientConfig,
    handler: H,
    connection_lock: Mutex<()>,
    transport: Mutex<Option<Attached>>,
    state: Mutex<ConnectionState>,
    session: RwLock<SessionState>,
    session_token: Mutex<Option<u64>>,
    expect_disconnection: AtomicBool,
    server_map: Mutex<HashMap<ServerType, Vec<SocketAddr>>>,
    heartbeat: Heartbeat,
    debug_listener: RwLock<Option<Arc<dyn DebugNetworkListener>>>,
    next_job: AtomicU64,
    generation: AtomicU64,
}

/// Client for a single CM session.
///
/// Cloning is cheap; clones share the same session.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use steamframe::{
///     client::{ClientConfig, CmClient, ConnectionState},
///     connection::{ConnectionError, KeyExchangeOutcome, SessionKeyExchange},
///     enums::EUniverse,
/// };
///
/// struct Unavailable;
///
/// impl SessionKeyExchange for Unavailable {
///     fn exchange(
///         &self,
///         _universe: EUniverse,
///         _challenge: Option<&[u8]>,
///     ) -> Result<KeyExchangeOutcome, ConnectionError> {
///         Err(ConnectionError::Handshake("no keys".into()))
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = ClientConfig::builder()
///     .key_exchange(Arc::new(Unavailable))
///     .build()
///     .expect("valid configuration");
/// let client = CmClient::new(config, ());
///
/// // No servers are known yet, so the attempt ends immediately.
/// client.connect(None);
/// assert_eq!(client.state(), ConnectionState::Disconnected);
/// # }
/// ```
pub struct CmClient<H: ClientHandler = ()> {
    inner: Arc<Inner<H>>,
}

impl<H: ClientHandler> Clone for CmClient<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> { lock.read().unwrap_or_else(PoisonError::into_inner) }

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> { lock.write().unwrap_or_else(PoisonError::into_inner) }

impl<H: ClientHandler> CmClient<H> {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(config: ClientConfig, handler: H) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner<H>>| {
            let target = weak.clone();
            let heartbeat = Heartbeat::new(config.runtime().clone(), config.heartbeat_interval(), move || {
                if let Some(inner) = target.upgrade() {
                    inner.send(&mut ClientMsgProtobuf::<CMsgClientHeartBeat>::new(EMsg::ClientHeartBeat));
                }
            });
            Inner {
                config,
                handler,
                connection_lock: Mutex::new(()),
                transport: Mutex::new(None),
                state: Mutex::new(ConnectionState::Disconnected),
                session: RwLock::new(SessionState::default()),
                session_token: Mutex::new(None),
                expect_disconnection: AtomicBool::new(false),
                server_map: Mutex::new(HashMap::new()),
                heartbeat,
                debug_listener: RwLock::new(None),
                next_job: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }
        });
        Self { inner }
    }

    /// Connect to `server`, or to the next candidate from the server list.
    ///
    /// Any existing connection is torn down first and reported through
    /// [`ClientHandler::on_disconnected`] with `user_initiated` set. The
    /// outcome of the new attempt arrives asynchronously through the
    /// handler; a failure to even start it is reported as
    /// `on_disconnected(false)` before this method returns.
    pub fn connect(&self, server: Option<ServerRecord>) {
        let (released, failed) = {
            let _serialized = lock(&self.inner.connection_lock);
            self.inner.expect_disconnection.store(false, Ordering::SeqCst);
            let released = self.inner.release_transport();

            let failed = match Inner::start_connection(&self.inner, server) {
                Ok(()) => false,
                Err(error) => {
                    warn!(%error, "failed to start CM connection");
                    *lock(&self.inner.state) = ConnectionState::Disconnected;
                    true
                }
            };
            (released, failed)
        };

        // Hooks run unlocked so they may call back into the client.
        if let Some(reported) = released {
            self.inner.handler.on_disconnected(reported);
        }
        if failed {
            self.inner.handler.on_disconnected(false);
        }
    }

    /// Stop the heartbeat and close the transport, if any.
    ///
    /// Completion is reported through [`ClientHandler::on_disconnected`].
    pub fn disconnect(&self) { self.inner.disconnect(); }

    /// Send `msg`, stamping the session id and steam id once logged on.
    ///
    /// Transport failures are logged and otherwise ignored; they surface
    /// later as a disconnect.
    pub fn send<M: ClientMessage + ?Sized>(&self, msg: &mut M) { self.inner.send(msg); }

    /// Route an inbound packet through the session handlers and then to
    /// [`ClientHandler::on_message`].
    ///
    /// `None` marks a packet that failed to parse: the connection is closed
    /// and `false` returned.
    pub fn on_client_msg_received(&self, packet: Option<PacketMsg>) -> bool {
        self.inner.on_client_msg_received(packet)
    }

    /// Returns `true` once the encrypted channel is established.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.state() == ConnectionState::Connected }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { *lock(&self.inner.state) }

    /// Session id assigned at logon.
    #[must_use]
    pub fn session_id(&self) -> Option<i32> { read(&self.inner.session).session_id() }

    /// Steam id assigned at logon.
    #[must_use]
    pub fn steam_id(&self) -> Option<SteamId> { read(&self.inner.session).steam_id() }

    /// Cell id assigned at logon.
    #[must_use]
    pub fn cell_id(&self) -> Option<u32> { read(&self.inner.session).cell_id() }

    /// Most recent session token issued by the server.
    #[must_use]
    pub fn session_token(&self) -> Option<u64> { *lock(&self.inner.session_token) }

    /// Servers of `server_type` announced during this connection.
    #[must_use]
    pub fn servers(&self, server_type: ServerType) -> Vec<SocketAddr> {
        lock(&self.inner.server_map)
            .get(&server_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Local address of the current transport.
    #[must_use]
    pub fn local_ip(&self) -> Option<IpAddr> { self.inner.connection()?.local_address() }

    /// Configured universe.
    #[must_use]
    pub fn universe(&self) -> EUniverse { self.inner.config.universe() }

    /// Configured connection timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration { self.inner.config.connection_timeout() }

    /// Configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig { &self.inner.config }

    /// Candidate server source.
    #[must_use]
    pub fn server_list(&self) -> &Arc<dyn ServerList> { self.inner.config.server_list() }

    /// Install or remove the raw traffic observer.
    pub fn set_debug_network_listener(&self, listener: Option<Arc<dyn DebugNetworkListener>>) {
        *write(&self.inner.debug_listener) = listener;
    }

    /// Installed raw traffic observer.
    #[must_use]
    pub fn debug_network_listener(&self) -> Option<Arc<dyn DebugNetworkListener>> { self.inner.debug_listener() }

    /// Returns `true` when the next disconnect is expected.
    #[must_use]
    pub fn expect_disconnection(&self) -> bool { self.inner.expect_disconnection.load(Ordering::SeqCst) }

    /// Declare that the server is about to close the connection, for example
    /// after a logoff request. Cleared by [`connect`](Self::connect).
    pub fn set_expect_disconnection(&self, expected: bool) {
        self.inner.expect_disconnection.store(expected, Ordering::SeqCst);
    }

    /// Allocate a job id for correlating a request with its response.
    #[must_use]
    pub fn next_job_id(&self) -> JobId { JobId::new(self.inner.next_job.fetch_add(1, Ordering::Relaxed) + 1) }

    /// Interval the heartbeat runs (or will next run) at.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration { self.inner.heartbeat.interval() }

    /// Returns `true` while the heartbeat is scheduled.
    #[must_use]
    pub fn is_heartbeat_running(&self) -> bool { self.inner.heartbeat.is_running() }

    /// Handler receiving this client's notifications.
    #[must_use]
    pub fn handler(&self) -> &H { &self.inner.handler }
}

impl<H: ClientHandler> Inner<H> {
    fn connection(&self) -> Option<Arc<dyn Connection>> {
        lock(&self.transport)
            .as_ref()
            .map(|attached| Arc::clone(&attached.connection))
    }

    fn current_connection(&self, generation: u64) -> Option<Arc<dyn Connection>> {
        lock(&self.transport)
            .as_ref()
            .filter(|attached| attached.generation == generation)
            .map(|attached| Arc::clone(&attached.connection))
    }

    fn take_transport(&self, generation: Option<u64>) -> Option<Attached> {
        let mut transport = lock(&self.transport);
        match (transport.as_ref(), generation) {
            (Some(attached), Some(wanted)) if attached.generation != wanted => None,
            _ => transport.take(),
        }
    }

    fn debug_listener(&self) -> Option<Arc<dyn DebugNetworkListener>> { read(&self.debug_listener).clone() }

    fn start_connection(this: &Arc<Self>, server: Option<ServerRecord>) -> Result<(), ClientError> {
        let allowed = this.config.protocol_types();
        let record = match server {
            Some(record) => record,
            None => this
                .config
                .server_list()
                .next_candidate(allowed)
                .ok_or(ClientError::NoCandidate(allowed))?,
        };

        let span = info_span!("client.connect", endpoint = %record.endpoint(), protocols = %record.protocols());
        let _entered = span.enter();

        let connection: Arc<dyn Connection> = Arc::from(this.config.connection_factory().create(
            record.protocols() & allowed,
            this.config.universe(),
            this.config.runtime(),
        )?);

        let generation = this.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(this);
        let listener = connection.events().subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connection_event(generation, event);
            }
        });
        *lock(&this.transport) = Some(Attached {
            connection: Arc::clone(&connection),
            listener,
            generation,
        });
        *lock(&this.state) = ConnectionState::Connecting;
        debug!(generation, "connecting");

        if let Err(error) = connection.connect(record.endpoint().clone(), this.config.connection_timeout()) {
            if let Some(attached) = this.take_transport(Some(generation)) {
                attached.connection.events().unsubscribe(attached.listener);
            }
            return Err(error.into());
        }
        Ok(())
    }

    /// Detach and close the current transport, completing its teardown now.
    ///
    /// Returns the flag owed to [`ClientHandler::on_disconnected`] if a
    /// transport was released; the caller reports it once unlocked.
    fn release_transport(&self) -> Option<bool> {
        self.heartbeat.stop();
        let attached = self.take_transport(None)?;
        attached.connection.events().unsubscribe(attached.listener);
        attached.connection.disconnect();
        Some(self.teardown(attached.connection.as_ref(), true))
    }

    fn disconnect(&self) {
        let connection = {
            let _serialized = lock(&self.connection_lock);
            self.heartbeat.stop();
            self.connection()
        };
        if let Some(connection) = connection {
            connection.disconnect();
        }
    }

    fn on_connection_event(&self, generation: u64, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.on_transport_connected(generation),
            ConnectionEvent::Disconnected { user_initiated } => self.on_transport_disconnected(generation, *user_initiated),
            ConnectionEvent::NetMsgReceived(data) => {
                if self.current_connection(generation).is_some() {
                    self.on_client_msg_received(parse_packet(data.clone()));
                } else {
                    debug!(generation, "ignoring packet from a stale transport");
                }
            }
        }
    }

    fn on_transport_connected(&self, generation: u64) {
        let Some(connection) = self.current_connection(generation) else {
            debug!(generation, "ignoring connect from a stale transport");
            return;
        };
        self.mark(connection.as_ref(), ServerQuality::Good);
        let previous = mem::replace(&mut *lock(&self.state), ConnectionState::Connected);
        if previous != ConnectionState::Connected {
            metrics::inc_connections();
        }
        info!(endpoint = ?connection.current_endpoint(), "connected to CM server");
        self.handler.on_connected();
    }

    fn on_transport_disconnected(&self, generation: u64, user_initiated: bool) {
        let Some(attached) = self.take_transport(Some(generation)) else {
            debug!(generation, "ignoring disconnect from a stale transport");
            return;
        };
        attached.connection.events().unsubscribe(attached.listener);
        let reported = self.teardown(attached.connection.as_ref(), user_initiated);
        self.handler.on_disconnected(reported);
    }

    /// Reset session state after a transport closed and return the
    /// `user_initiated` flag to report.
    fn teardown(&self, connection: &dyn Connection, user_initiated: bool) -> bool {
        let expected = self.expect_disconnection.load(Ordering::SeqCst);
        let previous = mem::replace(&mut *lock(&self.state), ConnectionState::Disconnected);
        if previous == ConnectionState::Connected {
            metrics::dec_connections();
        }
        if user_initiated && expected {
            self.mark(connection, ServerQuality::Bad);
        }
        write(&self.session).clear_identity();
        self.heartbeat.stop();
        lock(&self.server_map).clear();

        info!(
            endpoint = ?connection.current_endpoint(),
            user_initiated,
            expected,
            "disconnected from CM server"
        );
        user_initiated || expected
    }

    fn mark(&self, connection: &dyn Connection, quality: ServerQuality) {
        let Some(endpoint) = connection.current_endpoint() else {
            debug!(?quality, "transport has no endpoint to mark");
            return;
        };
        self.config
            .server_list()
            .try_mark(&endpoint, connection.protocol_types(), quality);
    }

    fn send<M: ClientMessage + ?Sized>(&self, msg: &mut M) {
        if let Some((session_id, steam_id)) = read(&self.session).identity() {
            msg.set_session_id(session_id);
            msg.set_steam_id(steam_id);
        }

        let emsg = msg.msg_type();
        debug!(emsg = ?emsg, proto = msg.is_proto(), "sending packet");
        let data = msg.serialize();

        if let Some(listener) = self.debug_listener() {
            hooks::observe("outgoing", emsg, || listener.on_outgoing(emsg, &data));
        }

        let Some(connection) = self.connection() else {
            debug!(emsg = ?emsg, "no transport; packet discarded");
            return;
        };
        match connection.send(data) {
            Ok(()) => metrics::inc_packets(Direction::Outbound),
            Err(error) => debug!(emsg = ?emsg, %error, "transport send failed"),
        }
    }

    fn on_client_msg_received(&self, packet: Option<PacketMsg>) -> bool {
        let Some(packet) = packet else {
            debug!("packet failed to parse; shutting down connection");
            metrics::inc_dropped();
            self.disconnect();
            return false;
        };

        let emsg = packet.msg_type();
        debug!(emsg = ?emsg, code = emsg.code(), proto = packet.is_proto(), "received packet");
        metrics::inc_packets(Direction::Inbound);

        // Multi batches are reported per sub-packet once unpacked.
        if emsg == EMsg::Multi {
            self.handle_multi(&packet);
            return true;
        }

        if let Some(listener) = self.debug_listener() {
            hooks::observe("incoming", emsg, || listener.on_incoming(emsg, packet.data()));
        }

        match emsg {
            EMsg::ClientLogOnResponse => self.handle_logon_response(&packet),
            EMsg::ClientLoggedOff => self.handle_logged_off(&packet),
            EMsg::ClientServerList => self.handle_server_list(&packet),
            EMsg::ClientCMList => self.handle_cm_list(&packet),
            EMsg::ClientSessionToken => self.handle_session_token(&packet),
            _ => {}
        }

        self.handler.on_message(&packet);
        true
    }

    fn handle_multi(&self, packet: &PacketMsg) {
        let payload = match unpack_multi(packet) {
            Ok(payload) => payload,
            Err(error) => {
                debug!(%error, "discarding multi batch");
                metrics::inc_dropped();
                return;
            }
        };

        for sub_packet in SubPackets::new(payload) {
            if !self.on_client_msg_received(parse_packet(sub_packet)) {
                break;
            }
        }
    }

    fn handle_logon_response(&self, packet: &PacketMsg) {
        if !packet.is_proto() {
            debug!("non-protobuf logon response; no logon was attempted after connecting");
            return;
        }
        let Some(response) = ClientMsgProtobuf::<CMsgClientLogonResponse>::from_packet(packet) else {
            debug!("logon response body failed to decode");
            metrics::inc_dropped();
            return;
        };

        let result = EResult::from_code(response.body().eresult());
        if result != EResult::OK {
            debug!(?result, "logon was not accepted");
            return;
        }

        let header = &response.proto_header().proto;
        let steam_id = SteamId::new(header.steamid());
        write(&self.session).logged_on(header.client_sessionid(), steam_id, response.body().cell_id());

        let seconds = u64::try_from(response.body().out_of_game_heartbeat_seconds()).unwrap_or(0);
        self.heartbeat.restart(Duration::from_secs(seconds) + HEARTBEAT_SLACK);
        info!(%steam_id, cell_id = response.body().cell_id(), "logged on");
    }

    fn handle_logged_off(&self, packet: &PacketMsg) {
        write(&self.session).clear();
        self.heartbeat.stop();

        if !packet.is_proto() {
            return;
        }
        let Some(logged_off) = ClientMsgProtobuf::<CMsgClientLoggedOff>::from_packet(packet) else {
            debug!("logged-off body failed to decode");
            metrics::inc_dropped();
            return;
        };

        let result = EResult::from_code(logged_off.body().eresult());
        info!(?result, "logged off");
        if matches!(result, EResult::TryAnotherCM | EResult::ServiceUnavailable) {
            if let Some(connection) = self.connection() {
                self.mark(connection.as_ref(), ServerQuality::Bad);
            }
        }
    }

    fn handle_server_list(&self, packet: &PacketMsg) {
        let Some(list) = ClientMsgProtobuf::<CMsgClientServerList>::from_packet(packet) else {
            debug!("server list body failed to decode");
            metrics::inc_dropped();
            return;
        };

        let mut server_map = lock(&self.server_map);
        for (server_type, addr) in decode::server_list_entries(list.body()) {
            let known = server_map.entry(server_type).or_default();
            if !known.contains(&addr) {
                known.push(addr);
            }
        }
    }

    fn handle_cm_list(&self, packet: &PacketMsg) {
        let Some(list) = ClientMsgProtobuf::<CMsgClientCMList>::from_packet(packet) else {
            debug!("CM list body failed to decode");
            metrics::inc_dropped();
            return;
        };

        let records = decode::cm_list_records(list.body());
        debug!(count = records.len(), "replacing CM server list");
        self.config.server_list().replace_list(records);
    }

    fn handle_session_token(&self, packet: &PacketMsg) {
        let Some(token) = ClientMsgProtobuf::<CMsgClientSessionToken>::from_packet(packet) else {
            debug!("session token body failed to decode");
            metrics::inc_dropped();
            return;
        };
        *lock(&self.session_token) = Some(token.body().token());
    }
}
