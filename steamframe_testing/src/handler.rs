//! Recorders for client notifications and raw traffic.

use std::sync::{Mutex, MutexGuard, PoisonError};

use steamframe::{
    client::{ClientHandler, DebugNetworkListener},
    enums::EMsg,
    packet::PacketMsg,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// A notification observed by [`RecordingHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerEvent {
    Connected,
    Disconnected { user_initiated: bool },
    Message(EMsg),
}

/// [`ClientHandler`] keeping every notification in arrival order.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<HandlerEvent>>,
}

impl RecordingHandler {
    /// Notifications so far.
    pub fn events(&self) -> Vec<HandlerEvent> { lock(&self.events).clone() }

    /// Message kinds passed to `on_message`.
    pub fn messages(&self) -> Vec<EMsg> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                HandlerEvent::Message(msg) => Some(*msg),
                _ => None,
            })
            .collect()
    }

    /// `user_initiated` flags passed to `on_disconnected`.
    pub fn disconnects(&self) -> Vec<bool> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                HandlerEvent::Disconnected { user_initiated } => Some(*user_initiated),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) { lock(&self.events).clear(); }
}

impl ClientHandler for RecordingHandler {
    fn on_connected(&self) { lock(&self.events).push(HandlerEvent::Connected); }

    fn on_disconnected(&self, user_initiated: bool) {
        lock(&self.events).push(HandlerEvent::Disconnected { user_initiated });
    }

    fn on_message(&self, packet: &PacketMsg) { lock(&self.events).push(HandlerEvent::Message(packet.msg_type())); }
}

/// [`DebugNetworkListener`] keeping the kinds it saw per direction.
///
/// With `panicking` set, every callback panics after recording.
#[derive(Default)]
pub struct RecordingDebugListener {
    incoming: Mutex<Vec<EMsg>>,
    outgoing: Mutex<Vec<EMsg>>,
    panicking: bool,
}

impl RecordingDebugListener {
    /// A listener that panics on every callback.
    pub fn panicking() -> Self {
        Self {
            panicking: true,
            ..Self::default()
        }
    }

    /// Kinds reported by `on_incoming`.
    pub fn incoming(&self) -> Vec<EMsg> { lock(&self.incoming).clone() }

    /// Kinds reported by `on_outgoing`.
    pub fn outgoing(&self) -> Vec<EMsg> { lock(&self.outgoing).clone() }
}

impl DebugNetworkListener for RecordingDebugListener {
    fn on_incoming(&self, msg: EMsg, _data: &[u8]) {
        lock(&self.incoming).push(msg);
        assert!(!self.panicking, "debug listener failure");
    }

    fn on_outgoing(&self, msg: EMsg, _data: &[u8]) {
        lock(&self.outgoing).push(msg);
        assert!(!self.panicking, "debug listener failure");
    }
}
