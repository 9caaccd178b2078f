//! Error types for CM client configuration and connection set-up.

use std::time::Duration;

use crate::connection::{ConnectionError, ProtocolTypes};

/// Errors reported by [`ClientConfigBuilder::build`](super::ClientConfigBuilder::build)
/// and logged when [`CmClient::connect`](super::CmClient::connect) cannot
/// start a connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured protocol set is empty.
    #[error("at least one protocol type must be allowed")]
    EmptyProtocols,
    /// The connection timeout is zero.
    #[error("connection timeout must be non-zero, got {0:?}")]
    InvalidTimeout(Duration),
    /// Neither a connection factory nor a key exchange was supplied.
    #[error("no connection factory configured; supply a key exchange or a factory")]
    MissingConnectionFactory,
    /// No runtime handle was supplied and none is current.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    /// The server list has no candidate for the allowed protocols.
    #[error("no server candidate for protocols {0}")]
    NoCandidate(ProtocolTypes),
    /// Transport creation or start-up failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
