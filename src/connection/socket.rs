//! Socket options for CM stream connections.

use std::{io, time::Duration};

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpSocket;

/// Socket options applied before a [`TcpConnection`](super::TcpConnection)
/// connects. Unset options keep the operating system defaults.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use steamframe::connection::SocketOptions;
///
/// let options = SocketOptions::default()
///     .nodelay(true)
///     .keepalive(Some(Duration::from_secs(30)));
/// assert_ne!(options, SocketOptions::default());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SocketOptions {
    nodelay: Option<bool>,
    keepalive: Option<Option<Duration>>,
    linger: Option<Option<Duration>>,
    send_buffer_size: Option<u32>,
    recv_buffer_size: Option<u32>,
}

impl SocketOptions {
    /// Configure `TCP_NODELAY`.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = Some(enabled);
        self
    }

    /// Enable `SO_KEEPALIVE` with the given idle time, or disable it with
    /// `None`.
    #[must_use]
    pub fn keepalive(mut self, idle: Option<Duration>) -> Self {
        self.keepalive = Some(idle);
        self
    }

    /// Configure `SO_LINGER`; `None` disables lingering.
    #[must_use]
    pub fn linger(mut self, duration: Option<Duration>) -> Self {
        self.linger = Some(duration);
        self
    }

    /// Configure the socket send buffer size.
    #[must_use]
    pub fn send_buffer_size(mut self, size: u32) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    /// Configure the socket receive buffer size.
    #[must_use]
    pub fn recv_buffer_size(mut self, size: u32) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }

    pub(crate) fn apply(&self, socket: &TcpSocket) -> io::Result<()> {
        if let Some(enabled) = self.nodelay {
            socket.set_nodelay(enabled)?;
        }
        if let Some(keepalive) = self.keepalive {
            apply_keepalive(socket, keepalive)?;
        }
        if let Some(linger) = self.linger {
            SockRef::from(socket).set_linger(linger)?;
        }
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        Ok(())
    }
}

fn apply_keepalive(socket: &TcpSocket, idle: Option<Duration>) -> io::Result<()> {
    let Some(idle) = idle else {
        return socket.set_keepalive(false);
    };
    socket.set_keepalive(true)?;
    let config = TcpKeepalive::new().with_time(idle);
    SockRef::from(socket).set_tcp_keepalive(&config)
}
