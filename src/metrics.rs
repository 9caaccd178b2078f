//! Metric helpers for `steamframe`.
//!
//! This module defines metric names and simple helper functions wrapping
//! the [`metrics`](https://docs.rs/metrics) crate. Without the `metrics`
//! feature the helpers do nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking established CM connections.
pub const CONNECTIONS_ACTIVE: &str = "steamframe_cm_connections_active";
/// Name of the counter tracking routed and sent packets.
pub const PACKETS_PROCESSED: &str = "steamframe_packets_processed_total";
/// Name of the counter tracking packets that failed to parse or decode.
pub const PACKETS_DROPPED: &str = "steamframe_packets_dropped_total";

/// Direction of packet processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Packets received from the server.
    Inbound,
    /// Packets sent to the server.
    Outbound,
}

impl Direction {
    /// Label value recorded for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed packet for the given direction.
pub fn inc_packets(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(PACKETS_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a packet that could not be parsed or decoded.
pub fn inc_dropped() {
    #[cfg(feature = "metrics")]
    counter!(PACKETS_DROPPED).increment(1);
}
