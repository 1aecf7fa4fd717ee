//! Many views multiplexed onto one link machine: single machine per triple,
//! kind checking, idempotent close, the unlink grace period, and the
//! late-attach replay.

use warp_client::{ClientConfig, ClientError, DownlinkKind, DownlinkOptions, WarpClient};
use warp_shared::{Envelope, EnvelopeKind, Instant, Value};
use warp_test::{MockTransport, Recorder};

const HOST: &str = "warp://example.com";
const NODE: &str = "/unit/1";
const LANE: &str = "info";

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn two_views_share_one_machine_and_one_link() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let first = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let second = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let first_rec = Recorder::new();
    let second_rec = Recorder::new();
    first.observe(first_rec.clone());
    second.observe(second_rec.clone());

    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    transport.deliver(Envelope::event(NODE, LANE, Value::from(7)));
    client.tick(&now);

    // One physical connection, one link request.
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.sent_kinds(), vec![EnvelopeKind::Link]);

    // Both views observe the same machine state.
    assert_eq!(first.get(), Value::Int(7));
    assert_eq!(second.get(), Value::Int(7));
    assert!(first_rec.take().contains(&"did_link".to_string()));
    assert!(second_rec.take().contains(&"did_link".to_string()));
}

#[test]
fn kind_mismatch_is_rejected_synchronously() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());

    let _value = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let err = client
        .open_map_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap_err();
    assert_eq!(
        err,
        ClientError::TypeMismatch {
            expected: DownlinkKind::Map,
            found: DownlinkKind::Value,
        }
    );
}

#[test]
fn closing_one_view_leaves_the_link_up() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let mut first = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let second = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();

    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);

    first.close(&now);
    first.close(&now); // idempotent
    client.tick(&now);

    assert!(second.is_linked());
    assert!(!transport.sent_kinds().contains(&EnvelopeKind::Unlink));
}

#[test]
fn reattach_within_grace_period_cancels_the_unlink() {
    init_logs();
    let transport = MockTransport::new();
    let config = ClientConfig {
        unlink_delay_millis: 5_000,
        ..ClientConfig::default()
    };
    let mut client = WarpClient::new(transport.connector(), config);
    let now = Instant::default();

    let mut view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    transport.deliver(Envelope::event(NODE, LANE, Value::from(3)));
    client.tick(&now);

    view.close(&now);
    client.tick(&now);

    // Re-attach before the grace period elapses.
    let reattached = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let recorder = Recorder::new();
    reattached.observe(recorder.clone());

    client.tick(&now.add_millis(10_000));
    assert!(!transport.sent_kinds().contains(&EnvelopeKind::Unlink));
    assert!(reattached.is_linked());

    // The new view got the attach replay instead of a fresh handshake.
    assert_eq!(recorder.take(), vec!["did_link", "did_set 3 <- "]);
}

#[test]
fn negative_grace_period_unlinks_synchronously() {
    init_logs();
    let transport = MockTransport::new();
    let config = ClientConfig {
        unlink_delay_millis: -1,
        ..ClientConfig::default()
    };
    let mut client = WarpClient::new(transport.connector(), config);
    let now = Instant::default();

    let mut view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);

    view.close(&now);
    // No tick needed: the unlink request went out from close itself.
    assert_eq!(
        transport.sent_kinds(),
        vec![EnvelopeKind::Link, EnvelopeKind::Unlink]
    );
}

#[test]
fn late_attach_replays_full_state_and_sync() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let first = client
        .open_map_downlink(HOST, NODE, LANE, DownlinkOptions::synced())
        .unwrap();
    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    transport.deliver(Envelope::event(
        NODE,
        LANE,
        map_update(Value::text("a"), Value::from(1)),
    ));
    transport.deliver(Envelope::event(
        NODE,
        LANE,
        map_update(Value::text("b"), Value::from(2)),
    ));
    transport.deliver(Envelope::synced(NODE, LANE));
    client.tick(&now);
    assert!(first.is_synced());

    let second = client
        .open_map_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let recorder = Recorder::new();
    second.observe(recorder.clone());

    client.tick(&now);
    assert_eq!(
        recorder.take(),
        vec![
            "did_link",
            "did_update \"a\" 1 <- ",
            "did_update \"b\" 2 <- ",
            "did_sync"
        ]
    );
    assert_eq!(second.get(&Value::text("a")), Value::Int(1));
}

fn map_update(key: Value, value: Value) -> Value {
    use warp_shared::Item;
    Value::Record(vec![
        Item::attr("update", Value::Record(vec![Item::slot("key", key)])),
        Item::of(value),
    ])
}
