//! Integration tests for multi batches arriving over a transport.

use std::sync::Arc;

use bytes::Bytes;
use rstest::rstest;
use steamframe::{
    client::DebugNetworkListener,
    enums::{EMsg, EResult},
    packet::{ClientMessage, ClientMsg},
};
use steamframe_testing::{RecordingDebugListener, RecordingHandler, packets};

mod common;
use common::{Harness, STEAM_ID};

#[rstest]
#[case::plain(false)]
#[case::gzip(true)]
#[tokio::test]
async fn sub_packets_are_routed_in_order(#[case] compress: bool) {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let listener = Arc::new(RecordingDebugListener::default());
    harness
        .client
        .set_debug_network_listener(Some(listener.clone() as Arc<dyn DebugNetworkListener>));

    harness.transport().emit_packet(packets::multi(
        &[
            packets::logon_response(EResult::OK, 7, STEAM_ID, 9),
            packets::session_token(11),
        ],
        compress,
    ));

    assert_eq!(harness.client.session_id(), Some(7));
    assert_eq!(harness.client.session_token(), Some(11));
    assert_eq!(
        harness.client.handler().messages(),
        vec![EMsg::ClientLogOnResponse, EMsg::ClientSessionToken]
    );
    assert_eq!(
        listener.incoming(),
        vec![EMsg::ClientLogOnResponse, EMsg::ClientSessionToken],
        "the batch itself is not mirrored"
    );
}

#[tokio::test]
async fn nested_batches_are_flattened() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let inner = packets::multi(&[packets::session_token(1), packets::session_token(2)], true);

    harness
        .transport()
        .emit_packet(packets::multi(&[inner, packets::session_token(3)], false));

    assert_eq!(harness.client.session_token(), Some(3));
    assert_eq!(harness.client.handler().messages().len(), 3);
}

#[tokio::test]
async fn unparsable_sub_packet_stops_the_batch_and_closes() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let transport = harness.transport();

    transport.emit_packet(packets::multi(
        &[
            packets::session_token(1),
            Bytes::from_static(b"xy"),
            packets::session_token(2),
        ],
        false,
    ));

    assert_eq!(harness.client.session_token(), Some(1));
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test]
async fn non_protobuf_batch_is_ignored() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let mut batch = ClientMsg::new(EMsg::Multi);
    batch.payload_mut().extend_from_slice(&packets::multi_payload(&[packets::session_token(1)]));

    harness.transport().emit_packet(batch.serialize());

    assert_eq!(harness.client.session_token(), None);
    assert!(harness.client.handler().messages().is_empty());
    assert_eq!(harness.transport().disconnect_count(), 0);
}

#[tokio::test]
async fn truncated_batch_keeps_complete_sub_packets() {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let mut payload = packets::multi_payload(&[packets::session_token(4)]);
    payload.extend_from_slice(&64_u32.to_le_bytes());
    payload.extend_from_slice(b"short");

    harness.transport().emit_packet(packets::proto(
        EMsg::Multi,
        steamframe::protobufs::CMsgMulti {
            size_unzipped: Some(0),
            message_body: Some(payload),
        },
    ));

    assert_eq!(harness.client.session_token(), Some(4));
    assert_eq!(harness.transport().disconnect_count(), 0);
}

#[rstest]
#[case::corrupt_gzip(vec![0x1f, 0x8b, 0xde, 0xad], 64)]
#[case::inflates_past_declared_size(packets::gzip(&[0; 4096]), 16)]
#[tokio::test]
async fn undecodable_batch_keeps_the_connection(#[case] body: Vec<u8>, #[case] size_unzipped: u32) {
    let harness = Harness::new(RecordingHandler::default()).connected();
    let transport = harness.transport();

    transport.emit_packet(packets::proto(
        EMsg::Multi,
        steamframe::protobufs::CMsgMulti {
            size_unzipped: Some(size_unzipped),
            message_body: Some(body),
        },
    ));
    transport.emit_packet(packets::session_token(6));

    assert_eq!(transport.disconnect_count(), 0);
    assert!(harness.client.is_connected());
    assert_eq!(harness.client.handler().messages(), vec![EMsg::ClientSessionToken]);
}
