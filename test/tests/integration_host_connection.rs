//! Host connection lifecycle: send buffering and overflow, reconnect with
//! link re-issue, idle teardown, and tolerance of unroutable envelopes.

use std::time::Duration;

use warp_client::{ClientConfig, ClientError, DownlinkOptions, WarpClient};
use warp_shared::{Envelope, EnvelopeKind, Instant, Value};
use warp_test::{MockTransport, Recorder};

const HOST: &str = "warp://example.com";
const NODE: &str = "/unit/1";
const LANE: &str = "info";

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn commands_buffer_while_disconnected_and_flush_on_open() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    client.command(HOST, NODE, LANE, Value::from(1)).unwrap();
    client.command(HOST, NODE, LANE, Value::from(2)).unwrap();
    assert!(transport.sent().is_empty());

    transport.open();
    client.tick(&now);

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], Envelope::command(NODE, LANE, Value::from(1)));
    assert_eq!(sent[1], Envelope::command(NODE, LANE, Value::from(2)));
}

#[test]
fn buffer_overflow_fails_the_offending_push_only() {
    init_logs();
    let transport = MockTransport::new();
    let config = ClientConfig {
        send_buffer_capacity: 2,
        ..ClientConfig::default()
    };
    let mut client = WarpClient::new(transport.connector(), config);
    let now = Instant::default();

    client.command(HOST, NODE, LANE, Value::from(1)).unwrap();
    client.command(HOST, NODE, LANE, Value::from(2)).unwrap();
    let err = client.command(HOST, NODE, LANE, Value::from(3)).unwrap_err();
    assert_eq!(err, ClientError::BufferOverflow { capacity: 2 });

    // The buffered envelopes survive the rejected push.
    transport.open();
    client.tick(&now);
    assert_eq!(transport.sent().len(), 2);
}

#[test]
fn reconnect_reissues_links_after_backoff() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
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
    assert_eq!(transport.connects(), 1);
    recorder.take();

    transport.close_remote();
    client.tick(&now);
    assert!(!view.is_connected());
    assert!(!view.is_linked());
    assert_eq!(recorder.take(), vec!["did_disconnect"]);

    // The first reconnect delay is at most 3x the configured minimum.
    let later = now.add_duration(Duration::from_secs(2));
    client.tick(&later);
    assert_eq!(transport.connects(), 2);

    transport.open();
    client.tick(&later);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&later);

    assert!(view.is_linked());
    assert_eq!(
        recorder.take(),
        vec!["did_connect", "will_link", "did_link"]
    );
    assert_eq!(
        transport.sent_kinds(),
        vec![EnvelopeKind::Link, EnvelopeKind::Link]
    );
}

#[test]
fn command_during_backoff_reconnects_without_waiting() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);
    transport.take_sent();

    // The drop schedules a reconnect after the backoff delay.
    transport.close_remote();
    client.tick(&now);
    assert!(!view.is_connected());
    assert_eq!(transport.connects(), 1);

    // A command abandons the wait and reconnects right away.
    client.command(HOST, NODE, LANE, Value::from(7)).unwrap();
    assert_eq!(transport.connects(), 2);

    transport.open();
    client.tick(&now);
    let sent = transport.take_sent();
    assert_eq!(sent[0], Envelope::command(NODE, LANE, Value::from(7)));
}

#[test]
fn sending_restarts_the_idle_countdown() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    client.command(HOST, NODE, LANE, Value::from(1)).unwrap();
    transport.open();
    client.tick(&now);
    assert_eq!(client.host_count(), 1);

    // A link-less host starts its one-second idle countdown; a fresh send
    // pushes the deadline out.
    client.command(HOST, NODE, LANE, Value::from(2)).unwrap();
    client.tick(&now.add_millis(1100));
    assert_eq!(client.host_count(), 1);
    client.tick(&now.add_millis(1500));
    assert_eq!(client.host_count(), 1);

    client.tick(&now.add_millis(2200));
    assert_eq!(client.host_count(), 0);
}

#[test]
fn disconnect_kills_links_that_do_not_relink() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let options = DownlinkOptions {
        relinks: false,
        ..DownlinkOptions::default()
    };
    let view = client
        .open_value_downlink(HOST, NODE, LANE, options)
        .unwrap();
    let recorder = Recorder::new();
    view.observe(recorder.clone());

    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);
    recorder.take();

    transport.error("connection reset");
    client.tick(&now);

    assert_eq!(
        recorder.take(),
        vec!["did_fail connection reset", "did_disconnect", "did_close"]
    );
    // With no surviving links and nothing buffered, the host closes rather
    // than reconnecting.
    client.tick(&now.add_duration(Duration::from_secs(60)));
    assert_eq!(transport.connects(), 1);
    assert_eq!(client.host_count(), 0);
}

#[test]
fn idle_host_closes_after_grace_period() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let mut view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    transport.open();
    client.tick(&now);
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);

    view.close(&now);
    client.tick(&now);
    transport.deliver(Envelope::unlinked(NODE, LANE));
    client.tick(&now);
    client.tick(&now);
    assert_eq!(client.host_count(), 1);

    // One second of disuse and the host tears itself down.
    client.tick(&now.add_duration(Duration::from_secs(2)));
    assert_eq!(client.host_count(), 0);
}

#[test]
fn unroutable_and_unparseable_frames_are_tolerated() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();
    transport.open();
    client.tick(&now);

    transport.deliver(Envelope::event("/other", "lane", Value::from(9)));
    transport.deliver_text("not an envelope at all");
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);

    assert!(view.is_linked());
    assert_eq!(view.get(), Value::Absent);
}

#[test]
fn authenticate_sends_credentials_and_resends_on_reconnect() {
    init_logs();
    let transport = MockTransport::new();
    let mut client = WarpClient::new(transport.connector(), ClientConfig::default());
    let now = Instant::default();

    let credentials = Value::of_attr("secret", Value::text("s3cr3t"));
    client.authenticate(HOST, credentials.clone()).unwrap();
    let view = client
        .open_value_downlink(HOST, NODE, LANE, DownlinkOptions::default())
        .unwrap();

    transport.open();
    client.tick(&now);
    // Credentials go out before the link request.
    assert_eq!(
        transport.sent_kinds(),
        vec![EnvelopeKind::Auth, EnvelopeKind::Link]
    );
    assert!(!view.is_authenticated());

    transport.deliver(Envelope::authed(Value::of_attr(
        "session",
        Value::text("token"),
    )));
    transport.deliver(Envelope::linked(NODE, LANE));
    client.tick(&now);
    assert!(view.is_authenticated());

    transport.close_remote();
    client.tick(&now);
    assert!(!view.is_authenticated());

    let later = now.add_duration(Duration::from_secs(2));
    client.tick(&later);
    transport.open();
    client.tick(&later);

    let kinds = transport.sent_kinds();
    assert_eq!(
        kinds,
        vec![
            EnvelopeKind::Auth,
            EnvelopeKind::Link,
            EnvelopeKind::Auth,
            EnvelopeKind::Link
        ]
    );
}
