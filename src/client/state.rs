//! Connection and session state owned by the client.

use crate::ids::SteamId;

/// Lifecycle of the client's connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Logon session fields.
///
/// `session_id` and `steam_id` are always set and cleared together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SessionState {
    identity: Option<(i32, SteamId)>,
    cell_id: Option<u32>,
}

impl SessionState {
    pub(crate) fn logged_on(&mut self, session_id: i32, steam_id: SteamId, cell_id: u32) {
        self.identity = Some((session_id, steam_id));
        self.cell_id = Some(cell_id);
    }

    /// Forget the session identity, keeping the cell id.
    pub(crate) fn clear_identity(&mut self) { self.identity = None; }

    pub(crate) fn clear(&mut self) { *self = Self::default(); }

    pub(crate) fn identity(&self) -> Option<(i32, SteamId)> { self.identity }

    pub(crate) fn session_id(&self) -> Option<i32> { self.identity.map(|(id, _)| id) }

    pub(crate) fn steam_id(&self) -> Option<SteamId> { self.identity.map(|(_, id)| id) }

    pub(crate) fn cell_id(&self) -> Option<u32> { self.cell_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_fields_move_together() {
        let mut state = SessionState::default();
        state.logged_on(3, SteamId::new(9), 4);
        assert_eq!(state.session_id(), Some(3));
        assert_eq!(state.steam_id(), Some(SteamId::new(9)));

        state.clear_identity();
        assert_eq!((state.session_id(), state.steam_id()), (None, None));
        assert_eq!(state.cell_id(), Some(4));

        state.clear();
        assert_eq!(state, SessionState::default());
    }
}
