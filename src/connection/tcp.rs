//! Stream-socket transport with `VT01` framing.

use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::info;
use tokio::{
    net::{TcpSocket, TcpStream, lookup_host},
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::debug;

use super::{
    Connection,
    ConnectionError,
    ConnectionEvent,
    ConnectionEvents,
    ProtocolTypes,
    SocketOptions,
    codec::{MAX_FRAME_LENGTH, Vt01Codec},
};
use crate::discovery::ServerEndpoint;

#[derive(Default)]
struct TcpState {
    endpoint: Option<ServerEndpoint>,
    local: Option<IpAddr>,
    outbound: Option<UnboundedSender<Bytes>>,
    cancel: Option<CancellationToken>,
}

struct Shared {
    runtime: Handle,
    options: SocketOptions,
    max_frame_length: usize,
    events: ConnectionEvents,
    state: Mutex<TcpState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TcpState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }
}

/// Plain TCP transport.
///
/// Each `connect` spawns one I/O task on the configured runtime. The task
/// owns the socket, writes queued packets, emits every decoded packet as
/// [`ConnectionEvent::NetMsgReceived`] and always finishes with exactly one
/// [`ConnectionEvent::Disconnected`]. A failed write ends the task, so a
/// swallowed send error is always followed by a disconnect event.
pub struct TcpConnection {
    shared: Arc<Shared>,
}

impl TcpConnection {
    /// Create an idle transport that spawns its I/O task on `runtime`.
    #[must_use]
    pub fn new(runtime: Handle, options: SocketOptions) -> Self {
        Self::with_max_frame_length(runtime, options, MAX_FRAME_LENGTH)
    }

    /// Create a transport rejecting frames longer than `max_frame_length`.
    #[must_use]
    pub fn with_max_frame_length(runtime: Handle, options: SocketOptions, max_frame_length: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                runtime,
                options,
                max_frame_length,
                events: ConnectionEvents::new(),
                state: Mutex::new(TcpState::default()),
            }),
        }
    }
}

impl Connection for TcpConnection {
    fn connect(&self, endpoint: ServerEndpoint, timeout: Duration) -> Result<(), ConnectionError> {
        let mut state = self.shared.state();
        if state.cancel.is_some() {
            return Err(ConnectionError::AlreadyConnected);
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        state.endpoint = Some(endpoint.clone());
        state.local = None;
        state.outbound = Some(tx);
        state.cancel = Some(cancel.clone());
        drop(state);

        debug!(%endpoint, ?timeout, "connecting");
        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(run(shared, endpoint, timeout, cancel, rx));
        Ok(())
    }

    fn disconnect(&self) {
        if let Some(cancel) = self.shared.state().cancel.as_ref() {
            cancel.cancel();
        }
    }

    fn send(&self, data: Bytes) -> io::Result<()> {
        let state = self.shared.state();
        let outbound = state
            .outbound
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        outbound
            .send(data)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn current_endpoint(&self) -> Option<ServerEndpoint> { self.shared.state().endpoint.clone() }

    fn local_address(&self) -> Option<IpAddr> { self.shared.state().local }

    fn protocol_types(&self) -> ProtocolTypes { ProtocolTypes::TCP }

    fn events(&self) -> &ConnectionEvents { &self.shared.events }
}

async fn run(
    shared: Arc<Shared>,
    endpoint: ServerEndpoint,
    timeout: Duration,
    cancel: CancellationToken,
    outbound: UnboundedReceiver<Bytes>,
) {
    let user_initiated = drive(&shared, &endpoint, timeout, &cancel, outbound).await;
    {
        let mut state = shared.state();
        state.outbound = None;
        state.cancel = None;
    }
    debug!(%endpoint, user_initiated, "connection closed");
    shared
        .events
        .emit(&ConnectionEvent::Disconnected { user_initiated });
}

/// Returns `true` when the connection ended through [`Connection::disconnect`].
async fn drive(
    shared: &Shared,
    endpoint: &ServerEndpoint,
    timeout: Duration,
    cancel: &CancellationToken,
    mut outbound: UnboundedReceiver<Bytes>,
) -> bool {
    let opened = tokio::select! {
        biased;

        () = cancel.cancelled() => return true,

        result = tokio::time::timeout(timeout, open(&shared.options, endpoint)) => result,
    };
    let stream = match opened {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            debug!(%endpoint, error = %err, "failed to connect");
            return false;
        }
        Err(_) => {
            debug!(%endpoint, ?timeout, "connect timed out");
            return false;
        }
    };

    shared.state().local = stream.local_addr().ok().map(|addr| addr.ip());
    info!("connected to {endpoint}");

    let (mut sink, mut frames) = Framed::new(stream, Vt01Codec::new(shared.max_frame_length)).split();
    shared.events.emit(&ConnectionEvent::Connected);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                if let Err(err) = sink.close().await {
                    debug!(error = %err, "error closing socket");
                }
                return true;
            }

            Some(packet) = outbound.recv() => {
                if let Err(err) = sink.send(packet).await {
                    debug!(%endpoint, error = %err, "socket write failed");
                    return false;
                }
            }

            frame = frames.next() => match frame {
                Some(Ok(packet)) => shared.events.emit(&ConnectionEvent::NetMsgReceived(packet)),
                Some(Err(err)) => {
                    debug!(%endpoint, error = %err, "socket read failed");
                    return false;
                }
                None => {
                    debug!(%endpoint, "server closed the connection");
                    return false;
                }
            },
        }
    }
}

async fn open(options: &SocketOptions, endpoint: &ServerEndpoint) -> io::Result<TcpStream> {
    let addr = resolve(endpoint).await?;
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    options.apply(&socket)?;
    socket.connect(addr).await
}

async fn resolve(endpoint: &ServerEndpoint) -> io::Result<SocketAddr> {
    match endpoint {
        ServerEndpoint::Socket(addr) => Ok(*addr),
        ServerEndpoint::Host { host, port } => lookup_host((host.as_str(), *port))
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {endpoint}"))),
    }
}
