//! Integration tests for the client connection lifecycle.
//!
//! These tests drive a [`CmClient`] through scripted transports and verify
//! the state transitions, server quality marks and handler notifications
//! around connecting, disconnecting and reconnecting.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use log::Level;
use rstest::rstest;
use serial_test::serial;
use steamframe::{
    client::{ClientConfig, CmClient, ConnectionState},
    connection::{Connection, ProtocolTypes},
    discovery::{ServerEndpoint, ServerQuality, ServerRecord},
    enums::{EResult, ServerType},
};
use steamframe_testing::{
    HandlerEvent,
    LoggerHandle,
    MockConnectionFactory,
    MockServerList,
    RecordingHandler,
    logger,
    packets,
};

mod common;
use common::{Harness, STEAM_ID, addr, record};

fn endpoint(last: u8) -> ServerEndpoint { ServerEndpoint::Socket(addr(last)) }

#[tokio::test]
async fn connect_uses_first_candidate_and_marks_it_good() {
    let harness = Harness::new(RecordingHandler::default());
    harness.client.connect(None);

    assert_eq!(harness.client.state(), ConnectionState::Connecting);
    assert_eq!(harness.factory.requests(), vec![ProtocolTypes::TCP]);
    let transport = harness.transport();
    assert_eq!(transport.connects(), vec![(endpoint(1), Duration::from_secs(5))]);

    transport.emit_connected();

    assert!(harness.client.is_connected());
    assert_eq!(harness.client.handler().events(), vec![HandlerEvent::Connected]);
    assert_eq!(harness.servers.marked(ServerQuality::Good), vec![endpoint(1)]);
}

#[tokio::test]
async fn explicit_server_overrides_the_list() {
    let harness = Harness::new(RecordingHandler::default());
    harness.client.connect(Some(record(9)));

    assert_eq!(harness.transport().connects()[0].0, endpoint(9));
}

#[tokio::test]
async fn user_disconnect_is_reported_without_marking() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let transport = harness.transport();

    harness.client.disconnect();
    assert_eq!(transport.disconnect_count(), 1);
    transport.emit_disconnected(true);

    assert_eq!(harness.client.state(), ConnectionState::Disconnected);
    assert_eq!(harness.client.handler().disconnects(), vec![true]);
    assert!(harness.servers.marked(ServerQuality::Bad).is_empty());
    assert_eq!(transport.events().listener_count(), 0);
}

#[rstest]
#[case::expected_user_close(true, true, true, true)]
#[case::unexpected_user_close(false, true, true, false)]
#[case::expected_server_close(true, false, true, false)]
#[case::unexpected_server_close(false, false, false, false)]
#[tokio::test]
async fn disconnect_outcome_depends_on_expectation(
    #[case] expected: bool,
    #[case] user_initiated: bool,
    #[case] reported: bool,
    #[case] marked_bad: bool,
) {
    let harness = Harness::new(RecordingHandler::default()).connected();
    harness.client.set_expect_disconnection(expected);

    harness.transport().emit_disconnected(user_initiated);

    assert_eq!(harness.client.handler().disconnects(), vec![reported]);
    let bad = harness.servers.marked(ServerQuality::Bad);
    assert_eq!(bad == vec![endpoint(1)], marked_bad, "bad marks: {bad:?}");
}

#[tokio::test]
async fn disconnect_clears_session_and_announced_servers() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let transport = harness.transport();
    transport.emit_packet(packets::logon_response(EResult::OK, 7, STEAM_ID, 9));
    transport.emit_packet(packets::server_list(&[(7, [10, 1, 1, 1].into(), 27017)]));
    assert_eq!(harness.client.session_id(), Some(7));
    assert_eq!(harness.client.servers(ServerType::Cm).len(), 1);
    assert!(harness.client.is_heartbeat_running());

    transport.emit_disconnected(false);

    assert_eq!(harness.client.session_id(), None);
    assert_eq!(harness.client.steam_id(), None);
    assert_eq!(harness.client.cell_id(), Some(4));
    assert!(harness.client.servers(ServerType::Cm).is_empty());
    assert!(!harness.client.is_heartbeat_running());
}

#[tokio::test]
async fn reconnect_tears_down_the_previous_transport() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let first = harness.transport();

    harness.client.connect(None);

    assert_eq!(first.disconnect_count(), 1);
    assert_eq!(first.events().listener_count(), 0);
    assert_eq!(harness.factory.connections().len(), 2);
    assert_eq!(harness.client.state(), ConnectionState::Connecting);
    assert_eq!(
        harness.client.handler().events(),
        vec![HandlerEvent::Connected, HandlerEvent::Disconnected { user_initiated: true }]
    );

    first.emit_disconnected(false);
    first.emit_connected();
    assert_eq!(harness.client.handler().events().len(), 2, "stale events are ignored");

    harness.transport().emit_connected();
    assert!(harness.client.is_connected());
}

#[tokio::test]
async fn reconnect_clears_expected_disconnection() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    harness.client.set_expect_disconnection(true);

    harness.client.connect(None);

    assert!(!harness.client.expect_disconnection());
    assert!(harness.servers.marked(ServerQuality::Bad).is_empty());
}

#[tokio::test]
async fn refused_connect_reports_disconnect() {
    let harness = Harness::new(RecordingHandler::default());
    harness.factory.refuse_connect(true);

    harness.client.connect(None);

    assert_eq!(harness.client.state(), ConnectionState::Disconnected);
    assert_eq!(harness.client.handler().disconnects(), vec![false]);
    assert_eq!(harness.transport().events().listener_count(), 0);
}

#[tokio::test]
async fn empty_server_list_reports_disconnect() {
    let harness = Harness::with_records(RecordingHandler::default(), Vec::new());
    harness.client.connect(None);

    assert!(harness.factory.requests().is_empty());
    assert_eq!(harness.client.handler().disconnects(), vec![false]);
}

#[rstest]
#[tokio::test]
#[serial(logging)]
async fn websocket_only_candidate_fails_fast(mut logger: LoggerHandle) {
    let factory = Arc::new(MockConnectionFactory::new());
    let websocket = ServerRecord::websocket_server("cm.example.net:443").expect("valid address");
    let config = ClientConfig::builder()
        .protocol_types(ProtocolTypes::ALL)
        .connection_factory(factory.clone())
        .server_list(Arc::new(MockServerList::new(vec![websocket])))
        .build()
        .expect("valid config");
    let client = CmClient::new(config, RecordingHandler::default());

    client.connect(None);

    assert_eq!(factory.requests(), vec![ProtocolTypes::WEB_SOCKET]);
    assert_eq!(client.handler().disconnects(), vec![false]);
    assert!(logger.contains(Level::Warn, "failed to start CM connection"));
}

#[rstest]
#[case(EResult::TryAnotherCM, true)]
#[case(EResult::ServiceUnavailable, true)]
#[case(EResult::LoggedInElsewhere, false)]
#[tokio::test]
async fn logoff_result_decides_bad_mark(#[case] result: EResult, #[case] marked_bad: bool) {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let transport = harness.transport();
    transport.emit_packet(packets::logon_response(EResult::OK, 7, STEAM_ID, 9));

    transport.emit_packet(packets::logged_off(result));

    assert_eq!(harness.client.session_id(), None);
    assert_eq!(harness.client.cell_id(), None);
    assert!(!harness.client.is_heartbeat_running());
    assert_eq!(!harness.servers.marked(ServerQuality::Bad).is_empty(), marked_bad);
}

#[tokio::test]
async fn unparsable_packet_closes_the_transport() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let transport = harness.transport();

    transport.emit_packet(Bytes::from_static(&[1, 0]));

    assert_eq!(transport.disconnect_count(), 1);
    assert!(harness.client.handler().messages().is_empty());
}

#[tokio::test]
async fn cm_list_replaces_server_candidates() {
    let harness = Harness::new(RecordingHandler::default()).connected();

    harness.transport().emit_packet(packets::cm_list(
        &[([10, 9, 9, 9].into(), 27020)],
        &["cm.example.net"],
    ));

    let replaced = harness.servers.replacements();
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0][0].endpoint().to_string(), "10.9.9.9:27020");
    assert_eq!(replaced[0][1].endpoint().to_string(), "cm.example.net:443");
}

#[tokio::test]
async fn local_ip_follows_the_transport() {
    let harness = Harness::new(RecordingHandler::default());
    assert_eq!(harness.client.local_ip(), None);

    harness.client.connect(None);
    assert!(harness.client.local_ip().is_some());
}
