//! Client lifecycle hooks and the debug network observer.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
};

use log::debug;

use crate::{enums::EMsg, packet::PacketMsg};

/// Receives connection lifecycle notifications and inbound packets.
///
/// All methods run on the network task and should return quickly. Every
/// method has an empty default.
pub trait ClientHandler: Send + Sync + 'static {
    /// The encrypted channel is ready.
    fn on_connected(&self) {}

    /// The connection ended. `user_initiated` is `true` when the disconnect
    /// was requested or expected.
    fn on_disconnected(&self, user_initiated: bool) { let _ = user_initiated; }

    /// A packet was routed. Multi batches are delivered as their individual
    /// sub-packets.
    fn on_message(&self, packet: &PacketMsg) { let _ = packet; }
}

impl ClientHandler for () {}

/// Observer of raw traffic, for debugging only.
///
/// Panics raised by an observer are caught and logged.
pub trait DebugNetworkListener: Send + Sync {
    /// A packet arrived. Multi batches are reported per sub-packet.
    fn on_incoming(&self, msg: EMsg, data: &[u8]);

    /// A packet is about to be sent.
    fn on_outgoing(&self, msg: EMsg, data: &[u8]);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&'static str>().copied())
        .unwrap_or("non-string panic payload")
}

/// Run an observer callback, logging instead of propagating a panic.
pub(crate) fn observe(direction: &str, msg: EMsg, notify: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(notify)) {
        debug!(
            "debug network listener panicked: direction={direction}, emsg={msg:?}, panic={}",
            panic_message(payload.as_ref())
        );
    }
}
