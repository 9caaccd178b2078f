//! Decoded callback items and their type-filtered dispatch.
//!
//! Items are posted to a [`CallbackQueue`] by the network side and pulled by
//! a [`CallbackManager`] on the application side. Subscriptions filter by
//! [`CallbackKind`] and, optionally, by job id. Kinds form a small closed
//! hierarchy so that a subscription to [`CallbackKind::Account`] also
//! receives [`LoggedOnCallback`] and [`LoggedOffCallback`] items.

use std::net::SocketAddr;

use crate::{
    discovery::ServerRecord,
    enums::{EResult, ServerType},
    ids::{JobId, SteamId},
    packet::PacketMsg,
};

mod manager;
mod queue;

pub use manager::{CallbackManager, Subscription};
pub use queue::CallbackQueue;

/// Node in the callback kind hierarchy.
///
/// ```text
/// Any
/// ├── Connection { Connected, Disconnected }
/// ├── Account    { LoggedOn, LoggedOff, SessionToken }
/// ├── Discovery  { ServerList, CmList }
/// └── Packet
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Root of the hierarchy; matches every item.
    Any,
    /// Transport lifecycle items.
    Connection,
    /// See [`ConnectedCallback`].
    Connected,
    /// See [`DisconnectedCallback`].
    Disconnected,
    /// Logon session items.
    Account,
    /// See [`LoggedOnCallback`].
    LoggedOn,
    /// See [`LoggedOffCallback`].
    LoggedOff,
    /// See [`SessionTokenCallback`].
    SessionToken,
    /// Server directory items.
    Discovery,
    /// See [`ServerListCallback`].
    ServerList,
    /// See [`CmListCallback`].
    CmList,
    /// See [`PacketCallback`].
    Packet,
}

impl CallbackKind {
    /// Direct supertype, or `None` for [`CallbackKind::Any`].
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Any => None,
            Self::Connection | Self::Account | Self::Discovery | Self::Packet => Some(Self::Any),
            Self::Connected | Self::Disconnected => Some(Self::Connection),
            Self::LoggedOn | Self::LoggedOff | Self::SessionToken => Some(Self::Account),
            Self::ServerList | Self::CmList => Some(Self::Discovery),
        }
    }

    /// Returns `true` if `self` is `other` or one of its descendants.
    ///
    /// ```
    /// use steamframe::callbacks::CallbackKind;
    ///
    /// assert!(CallbackKind::LoggedOn.is_a(CallbackKind::Account));
    /// assert!(CallbackKind::LoggedOn.is_a(CallbackKind::Any));
    /// assert!(!CallbackKind::Account.is_a(CallbackKind::LoggedOn));
    /// ```
    #[must_use]
    pub fn is_a(self, other: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// Job filter attached to a subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JobFilter {
    /// Receive items regardless of job.
    #[default]
    Any,
    /// Receive only items correlated with this job.
    Job(JobId),
}

impl JobFilter {
    /// Returns `true` if an item for `job` passes this filter.
    #[must_use]
    pub fn matches(self, job: JobId) -> bool {
        match self {
            Self::Any => true,
            Self::Job(wanted) => wanted == job,
        }
    }
}

/// The transport finished connecting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectedCallback;

/// The transport closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisconnectedCallback {
    /// `true` when the disconnect was requested or expected.
    pub user_initiated: bool,
}

/// Result of a logon attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedOnCallback {
    pub job_id: JobId,
    pub result: EResult,
    pub steam_id: SteamId,
    pub session_id: i32,
    pub cell_id: u32,
    pub out_of_game_heartbeat_seconds: i32,
    pub server_time: u32,
}

/// The server ended the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoggedOffCallback {
    pub job_id: JobId,
    pub result: EResult,
}

/// A session token was issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTokenCallback {
    pub job_id: JobId,
    pub token: u64,
}

/// Servers announced by type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerListCallback {
    pub job_id: JobId,
    pub servers: Vec<(ServerType, SocketAddr)>,
}

/// CM candidates announced by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CmListCallback {
    pub job_id: JobId,
    pub servers: Vec<ServerRecord>,
}

/// Any other inbound packet, undecoded.
#[derive(Clone, Debug)]
pub struct PacketCallback {
    pub packet: PacketMsg,
}

/// A decoded item travelling through the callback queue.
#[derive(Clone, Debug)]
pub enum Callback {
    Connected(ConnectedCallback),
    Disconnected(DisconnectedCallback),
    LoggedOn(LoggedOnCallback),
    LoggedOff(LoggedOffCallback),
    SessionToken(SessionTokenCallback),
    ServerList(ServerListCallback),
    CmList(CmListCallback),
    Packet(PacketCallback),
}

impl Callback {
    /// Most specific kind of this item.
    #[must_use]
    pub fn kind(&self) -> CallbackKind {
        match self {
            Self::Connected(_) => CallbackKind::Connected,
            Self::Disconnected(_) => CallbackKind::Disconnected,
            Self::LoggedOn(_) => CallbackKind::LoggedOn,
            Self::LoggedOff(_) => CallbackKind::LoggedOff,
            Self::SessionToken(_) => CallbackKind::SessionToken,
            Self::ServerList(_) => CallbackKind::ServerList,
            Self::CmList(_) => CallbackKind::CmList,
            Self::Packet(_) => CallbackKind::Packet,
        }
    }

    /// Job this item is correlated with, or [`JobId::INVALID`].
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Connected(_) | Self::Disconnected(_) => JobId::INVALID,
            Self::LoggedOn(cb) => cb.job_id,
            Self::LoggedOff(cb) => cb.job_id,
            Self::SessionToken(cb) => cb.job_id,
            Self::ServerList(cb) => cb.job_id,
            Self::CmList(cb) => cb.job_id,
            Self::Packet(cb) => cb.packet.target_job(),
        }
    }
}

/// A type that can be subscribed to through [`CallbackManager::subscribe`].
pub trait CallbackMsg: Send + Sync + 'static {
    /// Kind that selects items of this type.
    const KIND: CallbackKind;

    /// Borrow the typed payload out of `callback`, if it holds one.
    fn from_callback(callback: &Callback) -> Option<&Self>;
}

impl CallbackMsg for Callback {
    const KIND: CallbackKind = CallbackKind::Any;

    fn from_callback(callback: &Callback) -> Option<&Self> { Some(callback) }
}

macro_rules! callback_msg {
    ($($ty:ident => $variant:ident),+ $(,)?) => {
        $(
            impl CallbackMsg for $ty {
                const KIND: CallbackKind = CallbackKind::$variant;

                fn from_callback(callback: &Callback) -> Option<&Self> {
                    match callback {
                        Callback::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Callback {
                fn from(value: $ty) -> Self { Self::$variant(value) }
            }
        )+
    };
}

callback_msg! {
    ConnectedCallback => Connected,
    DisconnectedCallback => Disconnected,
    LoggedOnCallback => LoggedOn,
    LoggedOffCallback => LoggedOff,
    SessionTokenCallback => SessionToken,
    ServerListCallback => ServerList,
    CmListCallback => CmList,
    PacketCallback => Packet,
}

#[cfg(test)]
mod tests;
