#![doc(html_root_url = "https://docs.rs/steamframe/latest")]
//! Public API for the `steamframe` library.
//!
//! This crate implements the session layer of a Steam CM client: packet
//! framing, an envelope-encrypted TCP transport, server discovery, the
//! session state machine with its heartbeat, and a callback dispatcher that
//! delivers decoded messages to application code.

pub mod byte_order;
pub mod callbacks;
pub mod client;
pub mod connection;
pub mod discovery;
pub mod enums;
pub mod heartbeat;
pub mod ids;
pub mod metrics;
pub mod packet;
pub mod protobufs;

pub use callbacks::{Callback, CallbackKind, CallbackManager, CallbackQueue, Subscription};
pub use client::{ClientConfig, ClientError, ClientHandler, CmClient, ConnectionState, SteamClient};
pub use connection::{Connection, ConnectionError, ConnectionEvent, ProtocolTypes};
pub use discovery::{ServerList, ServerRecord};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, PACKETS_DROPPED, PACKETS_PROCESSED};
pub use packet::{PacketMsg, parse_packet};
