//! Link state machine walk-throughs: the link and sync handshakes, totality
//! under out-of-order envelopes, and the unlink/re-link race.

use warp_client::{ClientConfig, DownlinkOptions, WarpClient};
use warp_shared::{Envelope, EnvelopeKind, Instant, Value};
use warp_test::{MockTransport, Recorder};

const HOST: &str = "warp://example.com";
const NODE: &str = "/unit/1";
const LANE: &str = "info";

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn client_with(transport: &MockTransport) -> WarpClient {
    WarpClient::new(transport.connector(), ClientConfig::default())
}

#[test]
fn link_handshake_notifies_in_order() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = client_with(&transport);
    let now = Instant::default();

    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let recorder = Recorder::new();
    view.observe(recorder.clone());

    assert!(!view.is_connected());
    assert!(!view.is_linked());

    transport.open();
    client.tick(&now);
    assert!(view.is_connected());
    assert_eq!(transport.sent_kinds(), vec![EnvelopeKind::Link]);
    assert!(!view.is_linked());

    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);
    assert!(view.is_linked());
    assert!(!view.is_synced());

    assert_eq!(
        recorder.take(),
        vec!["did_connect", "will_link", "did_link"]
    );
}

#[test]
fn sync_handshake_passes_through_linked() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = client_with(&transport);
    let now = Instant::default();

    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::synced())
        .unwrap();
    let recorder = Recorder::new();
    view.observe(recorder.clone());

    transport.open();
    client.tick(&now);
    assert_eq!(transport.sent_kinds(), vec![EnvelopeKind::Sync]);

    transport.deliver(Envelope::linked(NODE, LANE));
    transport.deliver(Envelope::event(NODE, LANE, Value::from(5)));
    transport.deliver(Envelope::synced(NODE, LANE));
    client.tick(&now);

    assert!(view.is_linked());
    assert!(view.is_synced());
    assert_eq!(view.get(), Value::Int(5));
    assert_eq!(
        recorder.take(),
        vec![
            "did_connect",
            "will_sync",
            "did_link",
            "on_event 5",
            "did_set 5 <- ",
            "did_sync"
        ]
    );
}

#[test]
fn out_of_order_envelopes_are_ignored() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = client_with(&transport);
    let now = Instant::default();

    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let recorder = Recorder::new();
    view.observe(recorder.clone());

    transport.open();
    client.tick(&now);

    // Synced in the Linking state, then a duplicate linked response.
    transport.deliver(Envelope::synced(NODE, LANE));
    transport.deliver(Envelope::linked(NODE, LANE));
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);

    assert!(view.is_linked());
    assert!(!view.is_synced());
    let events = recorder.take();
    assert_eq!(
        events.iter().filter(|line| *line == "did_link").count(),
        1
    );
    assert!(!events.contains(&"did_sync".to_string()));
}

#[test]
fn relink_during_unlink_reissues_at_response_time() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = client_with(&transport);
    let now = Instant::default();

    let mut view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);

    // Last view detaches; the zero grace period sends the unlink on the
    // next tick.
    view.close(&now);
    client.tick(&now);
    assert_eq!(
        transport.sent_kinds(),
        vec![EnvelopeKind::Link, EnvelopeKind::Unlink]
    );

    // A new view attaches while the unlink response is in flight.
    let relinked = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let recorder = Recorder::new();
    relinked.observe(recorder.clone());

    transport.deliver(Envelope::unlinked(NODE, LANE));
    client.tick(&now);

    // Exactly one unlink request ever goes out, and the link is re-issued
    // once the response arrives.
    assert_eq!(
        transport.sent_kinds(),
        vec![EnvelopeKind::Link, EnvelopeKind::Unlink, EnvelopeKind::Link]
    );

    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);
    assert!(relinked.is_linked());
    assert_eq!(recorder.take(), vec!["will_link", "did_link"]);
}

#[test]
fn resync_after_reconnect_is_not_linked_until_acknowledged() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = client_with(&transport);
    let now = Instant::default();

    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::synced())
        .unwrap();
    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    transport.deliver(Envelope::synced(NODE, LANE));
    client.tick(&now);
    assert!(view.is_linked());
    assert!(view.is_synced());

    transport.close_remote();
    client.tick(&now);
    assert!(!view.is_linked());

    // After the reconnect the sync request is back in flight; the view must
    // not report linked on the strength of the previous cycle.
    let later = now.add_millis(2_000);
    client.tick(&later);
    transport.open();
    client.tick(&later);
    assert_eq!(
        transport.sent_kinds(),
        vec![EnvelopeKind::Sync, EnvelopeKind::Sync]
    );
    assert!(!view.is_linked());
    assert!(!view.is_synced());

    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&later);
    assert!(view.is_linked());
    assert!(!view.is_synced());

    transport.deliver(Envelope::synced(NODE, LANE));
    client.tick(&later);
    assert!(view.is_synced());
}

#[test]
fn unsolicited_unlink_closes_the_link() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = client_with(&transport);
    let now = Instant::default();

    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    let recorder = Recorder::new();
    view.observe(recorder.clone());

    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);
    recorder.take();

    // The remote lane goes away without a request from our side.
    transport.deliver(Envelope::unlinked(NODE, LANE));
    client.tick(&now);

    assert_eq!(recorder.take(), vec!["did_unlink", "did_close"]);
    assert!(!view.is_linked());
    assert!(view.set(Value::from(1)).is_err());
}
