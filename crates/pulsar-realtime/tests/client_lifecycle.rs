//! Client lifecycle against a scripted transport, on paused time.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use pulsar_realtime::{
    ClientEvent, ConnectionState, Envelope, EventCategory, PING_FRAME, PullRequest,
    RealtimeClient, RealtimeError, TokenStore,
};
use pulsar_settings::RealtimeSettings;
use serde_json::json;
use tokio::time::sleep;

use common::{MockTransport, OpenScript, wait_for};

fn client_with(transport: &MockTransport) -> RealtimeClient {
    RealtimeClient::builder(RealtimeSettings::default())
        .transport(transport.clone())
        .build()
        .unwrap()
}

fn is_connected(e: &ClientEvent) -> bool {
    matches!(e, ClientEvent::Connected { .. })
}

fn pr_opened() -> Envelope {
    Envelope::new(
        EventCategory::PrOpened,
        "p1",
        json!({
            "id": "pr_1",
            "project_id": "p1",
            "pr_number": 42,
            "title": "Add retries",
            "state": "open",
            "author": "octocat",
            "url": "https://github.com/o/r/pull/42"
        }),
        1_700_000_000_000,
    )
}

#[tokio::test(start_paused = true)]
async fn connect_twice_opens_one_transport() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    client.connect();

    client.disconnect();
    let _ = wait_for(&mut events, |e| *e == ClientEvent::Disconnected).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn consecutive_failures_back_off_1s_2s_4s() {
    let transport = MockTransport::new();
    let _ = transport.fail_next(3, "connection refused");
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let mut delays = Vec::new();
    loop {
        match common::next_event(&mut events).await {
            ClientEvent::ReconnectScheduled { attempt, delay } => {
                assert_eq!(attempt as usize, delays.len() + 1);
                delays.push(delay);
            }
            ClientEvent::Connected { .. } => break,
            _ => {}
        }
    }

    let expected: Vec<Duration> = [1000, 2000, 4000].map(Duration::from_millis).to_vec();
    assert_eq!(delays, expected);
    assert_eq!(transport.open_gaps(), expected);
    assert_eq!(transport.open_count(), 4);
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_max_attempts() {
    let transport = MockTransport::new();
    transport.always(OpenScript::Fail("connection refused".into()));
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let exhausted = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::RetriesExhausted { .. })
    })
    .await;

    assert_eq!(exhausted, ClientEvent::RetriesExhausted { attempts: 5 });
    assert_eq!(transport.open_count(), 6);
    assert_eq!(client.state(), ConnectionState::Idle);

    sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.open_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn connect_after_exhaustion_starts_fresh() {
    let transport = MockTransport::new();
    let _ = transport.fail_next(6, "connection refused");
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::RetriesExhausted { .. })
    })
    .await;

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    assert_eq!(transport.open_count(), 7);
    assert_eq!(client.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_scheduled_reconnect() {
    let transport = MockTransport::new();
    transport.always(OpenScript::Fail("connection refused".into()));
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::ReconnectScheduled { .. })
    })
    .await;
    client.disconnect();
    let _ = wait_for(&mut events, |e| *e == ClientEvent::Disconnected).await;

    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_connecting_abandons_open() {
    let transport = MockTransport::new();
    let _ = transport.then(OpenScript::Hang);
    let client = client_with(&transport);
    let mut events = client.events();
    let mut states = client.state_changes();

    client.connect();
    let _ = states
        .wait_for(|s| *s == ConnectionState::Connecting)
        .await
        .unwrap();
    client.disconnect();
    let _ = wait_for(&mut events, |e| *e == ClientEvent::Disconnected).await;

    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_reconnects_after_base_delay() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    assert!(client.is_connected());

    transport.link(0).fail("connection reset by peer");
    // the ready flag is read live, before the driver sees the close
    assert!(!client.is_connected());

    let lost = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::ConnectionLost { .. })
    })
    .await;
    assert_matches!(lost, ClientEvent::ConnectionLost { reason } if reason.contains("reset"));
    assert_eq!(
        common::next_event(&mut events).await,
        ClientEvent::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );
    let _ = wait_for(&mut events, is_connected).await;

    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.open_gaps(), vec![Duration::from_secs(1)]);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn server_close_is_treated_as_loss() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    transport.link(0).close();

    let _ = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::ReconnectScheduled { attempt: 1, .. })
    })
    .await;
    let _ = wait_for(&mut events, is_connected).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn envelope_reaches_only_its_category() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    let opened = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let _pr_sub = {
        let opened = Arc::clone(&opened);
        client.on(EventCategory::PrOpened, move |env| {
            assert_eq!(env.payload::<PullRequest>().unwrap().pr_number, 42);
            let _ = opened.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _wf_sub = {
        let failed = Arc::clone(&failed);
        client.on(EventCategory::WorkflowFailed, move |_| {
            let _ = failed.fetch_add(1, Ordering::SeqCst);
        })
    };
    let mut stream = client.stream(EventCategory::PrOpened);

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    transport.link(0).push_envelope(&pr_opened());

    let received = stream.recv().await.unwrap();
    assert_eq!(received.project_id(), "p1");
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(failed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_does_not_block_next() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();
    let mut stream = client.stream("pr_opened");

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    let link = transport.link(0);
    link.push("not json at all");
    link.push(r#"{"type":"pr_opened","project_id":"p1"}"#);
    link.push_envelope(&pr_opened());

    let malformed = common::next_event(&mut events).await;
    assert_matches!(malformed, ClientEvent::MalformedFrame { .. });
    let received = stream.recv().await.unwrap();
    assert_eq!(received.timestamp(), 1_700_000_000_000);
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(transport.open_count(), 1);
}

fn exploding(_: &Envelope) {
    panic!("handler bug");
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_is_isolated() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    let calls = Arc::new(AtomicUsize::new(0));
    let _bad = client.on(EventCategory::PrOpened, exploding);
    let _good = {
        let calls = Arc::clone(&calls);
        client.on(EventCategory::PrOpened, move |_| {
            let _ = calls.fetch_add(1, Ordering::SeqCst);
        })
    };
    let mut stream = client.stream(EventCategory::PrOpened);

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    transport.link(0).push_envelope(&pr_opened());
    transport.link(0).push_envelope(&pr_opened());

    let _ = stream.recv().await.unwrap();
    let _ = stream.recv().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_handler_stops_receiving() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    let calls = Arc::new(AtomicUsize::new(0));
    let handler: pulsar_realtime::Handler = {
        let calls = Arc::clone(&calls);
        Arc::new(move |_: &Envelope| {
            let _ = calls.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _sub = client.subscribe(EventCategory::PrOpened, Arc::clone(&handler));
    let mut stream = client.stream(EventCategory::PrOpened);

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    transport.link(0).push_envelope(&pr_opened());
    let _ = stream.recv().await.unwrap();

    assert!(client.unsubscribe(&EventCategory::PrOpened, &handler));
    transport.link(0).push_envelope(&pr_opened());
    let _ = stream.recv().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pings_every_interval() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    let link = transport.link(0);

    sleep(Duration::from_secs(29)).await;
    assert!(link.sent().is_empty());
    sleep(Duration::from_secs(2)).await;
    assert_eq!(link.sent(), vec![PING_FRAME.to_string()]);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(link.sent().len(), 2);

    client.disconnect();
    let _ = wait_for(&mut events, |e| *e == ClientEvent::Disconnected).await;
    sleep(Duration::from_secs(120)).await;
    assert_eq!(link.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_skips_link_that_is_not_open() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    let link = transport.link(0);
    link.mark_not_ready();

    sleep(Duration::from_secs(31)).await;
    assert!(link.sent().is_empty());
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn token_is_resolved_per_attempt() {
    let transport = MockTransport::new();
    let tokens = TokenStore::new();
    tokens.set("first");
    let client = RealtimeClient::builder(RealtimeSettings::default())
        .transport(transport.clone())
        .credentials(tokens.clone())
        .build()
        .unwrap();
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    tokens.set("second");
    transport.link(0).fail("reset");
    let _ = wait_for(&mut events, is_connected).await;

    let urls: Vec<String> = transport.open_urls().iter().map(ToString::to_string).collect();
    assert_eq!(
        urls,
        vec![
            "ws://localhost:8080/ws?token=first",
            "ws://localhost:8080/ws?token=second"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn no_token_means_bare_endpoint() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    assert_eq!(transport.open_urls()[0].as_str(), "ws://localhost:8080/ws");
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_link() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    client.shutdown().await;

    assert!(transport.link(0).closed_by_client());
    assert!(!client.is_connected());
    assert_eq!(client.state(), ConnectionState::Idle);

    // the handle outlives the driver; commands are dropped quietly
    client.connect();
    client.shutdown().await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_is_logged() {
    let (logs, _guard) = pulsar_logging::capture_logs();
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;
    transport.link(0).push("{oops");
    let _ = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::MalformedFrame { .. })
    })
    .await;

    assert!(logs.has_event(tracing::Level::WARN, "dropping malformed frame"));
    assert!(logs.has_message("opening connection"));
}

#[tokio::test]
async fn invalid_url_is_rejected_at_build() {
    let settings = RealtimeSettings {
        url: "https://example.com".into(),
        ..RealtimeSettings::default()
    };
    let result = RealtimeClient::builder(settings).build();
    assert_matches!(result, Err(RealtimeError::Settings(_)));
}

#[test]
fn build_outside_runtime_fails() {
    let result = RealtimeClient::builder(RealtimeSettings::default()).build();
    assert_matches!(result, Err(RealtimeError::NoRuntime));
}

#[tokio::test(start_paused = true)]
async fn token_is_redacted_in_logs() {
    let (logs, _guard) = pulsar_logging::capture_logs();
    let transport = MockTransport::new();
    let client = RealtimeClient::builder(RealtimeSettings::default())
        .transport(transport.clone())
        .credentials(pulsar_realtime::StaticToken("hunter2".into()))
        .build()
        .unwrap();
    let mut events = client.events();

    client.connect();
    let _ = wait_for(&mut events, is_connected).await;

    let opening = logs.find("opening connection").unwrap();
    assert_eq!(
        opening.field("url"),
        Some("ws://localhost:8080/ws?token=REDACTED")
    );
    assert!(!logs.events().iter().any(|e| {
        e.message.contains("hunter2") || e.fields.iter().any(|(_, v)| v.contains("hunter2"))
    }));
}
