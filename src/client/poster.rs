//! Handler that turns client notifications into queued callbacks.

use std::{ops::Deref, sync::Arc};

use super::{ClientConfig, ClientHandler, CmClient, decode};
use crate::{
    callbacks::{
        Callback,
        CallbackManager,
        CallbackQueue,
        CmListCallback,
        ConnectedCallback,
        DisconnectedCallback,
        LoggedOffCallback,
        LoggedOnCallback,
        PacketCallback,
        ServerListCallback,
        SessionTokenCallback,
    },
    enums::{EMsg, EResult},
    ids::SteamId,
    packet::{ClientMsgProtobuf, PacketMsg},
    protobufs::{
        CMsgClientCMList,
        CMsgClientLoggedOff,
        CMsgClientLogonResponse,
        CMsgClientServerList,
        CMsgClientSessionToken,
    },
};

/// [`ClientHandler`] posting every notification to a [`CallbackQueue`].
///
/// Recognised protobuf packets become their typed callback; everything
/// else, including packets whose body fails to decode, is posted as a
/// [`PacketCallback`].
#[derive(Clone, Debug)]
pub struct CallbackPoster {
    queue: Arc<CallbackQueue>,
}

impl CallbackPoster {
    /// Post to `queue`.
    #[must_use]
    pub fn new(queue: Arc<CallbackQueue>) -> Self { Self { queue } }

    /// Queue receiving callbacks.
    #[must_use]
    pub fn queue(&self) -> &Arc<CallbackQueue> { &self.queue }
}

fn typed_callback(packet: &PacketMsg) -> Option<Callback> {
    if !packet.is_proto() {
        return None;
    }
    let job_id = packet.target_job();
    let callback = match packet.msg_type() {
        EMsg::ClientLogOnResponse => {
            let msg = ClientMsgProtobuf::<CMsgClientLogonResponse>::from_packet(packet)?;
            let body = msg.body();
            let header = &msg.proto_header().proto;
            LoggedOnCallback {
                job_id,
                result: EResult::from_code(body.eresult()),
                steam_id: SteamId::new(header.steamid()),
                session_id: header.client_sessionid(),
                cell_id: body.cell_id(),
                out_of_game_heartbeat_seconds: body.out_of_game_heartbeat_seconds(),
                server_time: body.rtime32_server_time(),
            }
            .into()
        }
        EMsg::ClientLoggedOff => {
            let msg = ClientMsgProtobuf::<CMsgClientLoggedOff>::from_packet(packet)?;
            LoggedOffCallback {
                job_id,
                result: EResult::from_code(msg.body().eresult()),
            }
            .into()
        }
        EMsg::ClientSessionToken => {
            let msg = ClientMsgProtobuf::<CMsgClientSessionToken>::from_packet(packet)?;
            SessionTokenCallback {
                job_id,
                token: msg.body().token(),
            }
            .into()
        }
        EMsg::ClientServerList => {
            let msg = ClientMsgProtobuf::<CMsgClientServerList>::from_packet(packet)?;
            ServerListCallback {
                job_id,
                servers: decode::server_list_entries(msg.body()),
            }
            .into()
        }
        EMsg::ClientCMList => {
            let msg = ClientMsgProtobuf::<CMsgClientCMList>::from_packet(packet)?;
            CmListCallback {
                job_id,
                servers: decode::cm_list_records(msg.body()),
            }
            .into()
        }
        _ => return None,
    };
    Some(callback)
}

impl ClientHandler for CallbackPoster {
    fn on_connected(&self) { self.queue.post(ConnectedCallback); }

    fn on_disconnected(&self, user_initiated: bool) { self.queue.post(DisconnectedCallback { user_initiated }); }

    fn on_message(&self, packet: &PacketMsg) {
        let callback = typed_callback(packet).unwrap_or_else(|| {
            Callback::Packet(PacketCallback {
                packet: packet.clone(),
            })
        });
        self.queue.post(callback);
    }
}

/// A [`CmClient`] posting to its own callback queue.
///
/// Dereferences to the underlying client.
pub struct SteamClient {
    client: CmClient<CallbackPoster>,
    callbacks: CallbackManager,
}

impl SteamClient {
    /// Create a disconnected client with an empty queue.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let queue = Arc::new(CallbackQueue::new());
        Self {
            client: CmClient::new(config, CallbackPoster::new(Arc::clone(&queue))),
            callbacks: CallbackManager::new(queue),
        }
    }

    /// Dispatcher draining this client's queue.
    #[must_use]
    pub fn callback_manager(&self) -> &CallbackManager { &self.callbacks }

    /// The underlying session client.
    #[must_use]
    pub fn client(&self) -> &CmClient<CallbackPoster> { &self.client }
}

impl Deref for SteamClient {
    type Target = CmClient<CallbackPoster>;

    fn deref(&self) -> &Self::Target { &self.client }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        callbacks::CallbackKind,
        packet::{ClientMessage, ClientMsg, parse_packet},
    };

    #[fixture]
    fn poster() -> CallbackPoster { CallbackPoster::new(Arc::new(CallbackQueue::new())) }

    fn packet<T: prost::Message + Default>(emsg: EMsg, body: T) -> PacketMsg {
        let mut msg = ClientMsgProtobuf::<T>::new(emsg);
        *msg.body_mut() = body;
        parse_packet(msg.serialize()).expect("packet frames")
    }

    #[rstest]
    fn lifecycle_notifications_are_posted(poster: CallbackPoster) {
        poster.on_connected();
        poster.on_disconnected(true);

        assert_eq!(poster.queue().try_pop().map(|cb| cb.kind()), Some(CallbackKind::Connected));
        let Some(Callback::Disconnected(cb)) = poster.queue().try_pop() else {
            panic!("expected a disconnect callback");
        };
        assert!(cb.user_initiated);
    }

    #[rstest]
    fn logon_response_becomes_logged_on(poster: CallbackPoster) {
        let mut msg = ClientMsgProtobuf::<CMsgClientLogonResponse>::new(EMsg::ClientLogOnResponse);
        msg.body_mut().eresult = Some(EResult::OK.code());
        msg.body_mut().cell_id = Some(7);
        msg.body_mut().out_of_game_heartbeat_seconds = Some(9);
        msg.proto_header_mut().proto.steamid = Some(76_561_197_960_278_073);
        msg.proto_header_mut().proto.client_sessionid = Some(42);
        msg.proto_header_mut().proto.jobid_target = Some(5);

        poster.on_message(&parse_packet(msg.serialize()).expect("packet frames"));

        let Some(Callback::LoggedOn(cb)) = poster.queue().try_pop() else {
            panic!("expected a logon callback");
        };
        assert_eq!(cb.result, EResult::OK);
        assert_eq!(cb.session_id, 42);
        assert_eq!(cb.cell_id, 7);
        assert_eq!(cb.out_of_game_heartbeat_seconds, 9);
        assert_eq!(cb.steam_id, SteamId::new(76_561_197_960_278_073));
        assert_eq!(cb.job_id.as_u64(), 5);
    }

    #[rstest]
    fn session_token_is_typed(poster: CallbackPoster) {
        poster.on_message(&packet(
            EMsg::ClientSessionToken,
            CMsgClientSessionToken { token: Some(99) },
        ));
        let Some(Callback::SessionToken(cb)) = poster.queue().try_pop() else {
            panic!("expected a session token callback");
        };
        assert_eq!(cb.token, 99);
    }

    #[rstest]
    fn cm_list_is_typed(poster: CallbackPoster) {
        poster.on_message(&packet(
            EMsg::ClientCMList,
            CMsgClientCMList {
                cm_addresses: vec![0x7F00_0001],
                cm_ports: vec![27017],
                ..Default::default()
            },
        ));
        let Some(Callback::CmList(cb)) = poster.queue().try_pop() else {
            panic!("expected a CM list callback");
        };
        assert_eq!(cb.servers.len(), 1);
    }

    #[rstest]
    fn unrecognised_packets_pass_through(poster: CallbackPoster) {
        let mut raw = ClientMsg::new(EMsg::ClientLogOnResponse);
        raw.payload_mut().extend_from_slice(&[2, 0, 0, 0]);
        poster.on_message(&parse_packet(raw.serialize()).expect("packet frames"));
        poster.on_message(&packet(EMsg::ServiceMethod, CMsgClientSessionToken::default()));

        for _ in 0..2 {
            assert_eq!(poster.queue().try_pop().map(|cb| cb.kind()), Some(CallbackKind::Packet));
        }
        assert!(poster.queue().is_empty());
    }
}
