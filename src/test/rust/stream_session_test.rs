mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use pipeline_ws_to_rtmp::{
    ClientEvent, ConnectionId, ErrorKind, ExitReport, ServerEvent, SessionRegistry,
    SessionSettings, SessionState, StreamSession,
};
use support::{eventually, Call, CountingMetrics, FakeLauncher, RecordingNotifier};

fn configure(url: &str, key: &str) -> ClientEvent {
    ClientEvent::Configure {
        stream_url: url.to_string(),
        stream_key: key.to_string(),
    }
}

fn chunk(data: &'static [u8]) -> ClientEvent {
    ClientEvent::Chunk(Bytes::from_static(data))
}

fn create_session(
    launcher: &FakeLauncher,
    settings: SessionSettings,
) -> (StreamSession, Arc<RecordingNotifier>, Arc<CountingMetrics>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let metrics = Arc::new(CountingMetrics::default());
    let session = StreamSession::new(
        ConnectionId::new(),
        Arc::new(launcher.clone()),
        notifier.clone(),
        metrics.clone(),
        settings,
    );
    (session, notifier, metrics)
}

async fn next_exit(session: &mut StreamSession) -> ExitReport {
    tokio::time::timeout(Duration::from_secs(2), session.wait_for_exit())
        .await
        .expect("transcoder exit was not reported")
}

#[tokio::test]
async fn test_configure_launches_transcoder_and_notifies_ready() {
    let launcher = FakeLauncher::new();
    let (mut session, notifier, _) = create_session(&launcher, SessionSettings::default());

    session
        .handle(configure("rtmp://example.com/live", "abc123"))
        .await;

    assert_eq!(
        launcher.calls(),
        vec![Call::Launch("rtmp://example.com/live/abc123".to_string())]
    );
    assert_eq!(notifier.events(), vec![ServerEvent::Ready]);
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.process_count(), 1);
    assert_eq!(
        session.destination().map(|d| d.url()),
        Some("rtmp://example.com/live/abc123".to_string())
    );
}

#[tokio::test]
async fn test_reconfigure_stops_previous_transcoder_first() {
    let launcher = FakeLauncher::new();
    let (mut session, notifier, metrics) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://a.example.com/live", "one")).await;
    session.handle(configure("rtmp://b.example.com/live", "two")).await;

    assert_eq!(
        launcher.calls(),
        vec![
            Call::Launch("rtmp://a.example.com/live/one".to_string()),
            Call::Stop(0),
            Call::Launch("rtmp://b.example.com/live/two".to_string()),
        ]
    );
    assert_eq!(notifier.ready_count(), 2);
    assert_eq!(session.process_count(), 1);
    assert_eq!(session.stats().transcoders_started, 2);
    assert_eq!(metrics.active_transcoders.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.unexpected_exits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reconfigure_gives_up_waiting_for_stuck_transcoder() {
    let launcher = FakeLauncher::ignoring_stop();
    let settings = SessionSettings::new(Duration::from_millis(50), 8).unwrap();
    let (mut session, _, _) = create_session(&launcher, settings);

    session.handle(configure("rtmp://example.com/live", "one")).await;
    session.handle(configure("rtmp://example.com/live", "two")).await;

    assert_eq!(launcher.launch_count(), 2);
    assert_eq!(launcher.stop_count(), 1);
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.process_count(), 1);
}

#[tokio::test]
async fn test_invalid_reconfigure_leaves_running_stream_alone() {
    let launcher = FakeLauncher::new();
    let (mut session, notifier, _) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    session
        .handle(configure("rtmp://example.com/live", "key; rm -rf /"))
        .await;

    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(launcher.stop_count(), 0);
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(notifier.errors(ErrorKind::InvalidDestination).len(), 1);
}

#[tokio::test]
async fn test_unexpected_exit_notifies_client_and_returns_to_idle() {
    let launcher = FakeLauncher::new();
    let (mut session, notifier, metrics) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    assert!(launcher.exit(
        0,
        ExitReport::with_code(1)
            .with_stderr_tail(vec!["rtmp://example.com/live: Connection refused".to_string()]),
    ));

    let report = next_exit(&mut session).await;
    session.on_exit(report);

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.process_count(), 0);
    let errors = notifier.errors(ErrorKind::UnexpectedExit);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("exited with code 1"));
    assert!(errors[0].contains("Connection refused"));
    assert_eq!(metrics.unexpected_exits.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.active_transcoders.load(Ordering::SeqCst), 0);

    // A chunk arriving after the exit is not written anywhere.
    session.handle(chunk(b"late")).await;
    assert_eq!(session.stats().chunks_dropped_not_streaming, 1);
}

#[tokio::test]
async fn test_session_can_be_reconfigured_after_unexpected_exit() {
    let launcher = FakeLauncher::new();
    let (mut session, notifier, _) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    launcher.exit(0, ExitReport::with_code(1));
    let report = next_exit(&mut session).await;
    session.on_exit(report);

    session.handle(configure("rtmp://example.com/live", "abc123")).await;

    assert_eq!(launcher.launch_count(), 2);
    assert_eq!(launcher.stop_count(), 0);
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(notifier.ready_count(), 2);
}

#[tokio::test]
async fn test_spawn_failure_is_reported() {
    let launcher = FakeLauncher::failing();
    let (mut session, notifier, metrics) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.process_count(), 0);
    assert_eq!(notifier.errors(ErrorKind::SpawnError).len(), 1);
    assert_eq!(metrics.spawn_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_chunks_are_written_in_arrival_order() {
    let launcher = FakeLauncher::new();
    let (mut session, _, _) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    let parts: [&[u8]; 4] = [b"\x1a\x45\xdf\xa3", b"first", b"second", b"\x00\xff"];
    for part in parts {
        session
            .handle(ClientEvent::Chunk(Bytes::copy_from_slice(part)))
            .await;
    }

    assert_eq!(
        launcher.written(0),
        b"\x1a\x45\xdf\xa3firstsecond\x00\xff".to_vec()
    );
    assert_eq!(session.stats().chunks_forwarded, 4);
}

#[tokio::test]
async fn test_stalled_transcoder_bounds_buffered_chunks() {
    let launcher = FakeLauncher::stalled(100);
    let (mut session, notifier, metrics) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    for _ in 0..10_000 {
        session.handle(chunk(b"0123456789")).await;
        assert!(session.pending_chunks() <= 100);
    }

    assert_eq!(launcher.chunk_count(0), 100);
    assert_eq!(session.stats().chunks_forwarded, 100);
    assert_eq!(session.stats().chunks_dropped_backpressure, 9_900);
    assert_eq!(metrics.chunks_dropped.load(Ordering::SeqCst), 9_900);
    assert_eq!(session.state(), SessionState::Streaming);
    // One notification per congestion episode, not per dropped chunk
    assert_eq!(notifier.errors(ErrorKind::Backpressure).len(), 1);
}

#[tokio::test]
async fn test_chunks_after_stop_are_dropped() {
    let launcher = FakeLauncher::new();
    let (mut session, notifier, _) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    session.handle(chunk(b"before")).await;
    session.handle(ClientEvent::Stop).await;
    assert_eq!(session.state(), SessionState::Stopping);

    session.handle(chunk(b"after")).await;

    assert_eq!(launcher.written(0), b"before".to_vec());
    assert_eq!(session.stats().chunks_dropped_not_streaming, 1);

    let report = next_exit(&mut session).await;
    session.on_exit(report);

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.process_count(), 0);
    // A requested stop is not an error.
    assert_eq!(notifier.events(), vec![ServerEvent::Ready]);
}

#[tokio::test]
async fn test_stop_without_transcoder_is_noop() {
    let launcher = FakeLauncher::new();
    let (mut session, notifier, _) = create_session(&launcher, SessionSettings::default());

    session.handle(ClientEvent::Stop).await;
    session.handle(ClientEvent::Stop).await;

    assert!(launcher.calls().is_empty());
    assert!(notifier.events().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_disconnect_stops_transcoder_once_and_terminates() {
    let launcher = FakeLauncher::new();
    let (mut session, _, metrics) = create_session(&launcher, SessionSettings::default());

    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    session.handle(ClientEvent::Disconnect).await;

    assert_eq!(launcher.stop_count(), 1);
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.process_count(), 0);
    assert_eq!(metrics.active_transcoders.load(Ordering::SeqCst), 0);

    // Terminated is final.
    session.handle(configure("rtmp://example.com/live", "abc123")).await;
    session.handle(chunk(b"late")).await;
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(session.state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_registry_returns_same_session_for_same_id() {
    let launcher = FakeLauncher::new();
    let registry = SessionRegistry::new(
        Arc::new(launcher.clone()),
        Arc::new(CountingMetrics::default()),
        SessionSettings::default(),
    );
    let id = ConnectionId::new();
    let notifier = Arc::new(RecordingNotifier::default());

    let first = registry.get_or_create(id, notifier.clone()).await;
    let second = registry.get_or_create(id, notifier.clone()).await;

    assert_eq!(first.id(), second.id());
    assert_eq!(registry.len().await, 1);

    registry.get_or_create(ConnectionId::new(), notifier).await;
    assert_eq!(registry.len().await, 2);
}

#[tokio::test]
async fn test_registry_streams_through_session_task() {
    let launcher = FakeLauncher::new();
    let metrics = Arc::new(CountingMetrics::default());
    let registry = SessionRegistry::new(
        Arc::new(launcher.clone()),
        metrics.clone(),
        SessionSettings::default(),
    );
    let id = ConnectionId::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let handle = registry.get_or_create(id, notifier.clone()).await;

    handle
        .dispatch(configure("rtmp://example.com/live", "abc123"))
        .await
        .unwrap();
    handle.dispatch(chunk(b"one")).await.unwrap();
    handle.dispatch(chunk(b"two")).await.unwrap();

    eventually("chunks to reach the transcoder", || launcher.written(0) == b"onetwo").await;
    assert_eq!(notifier.events(), vec![ServerEvent::Ready]);

    assert!(registry.disconnect(id).await);
    assert_eq!(launcher.stop_count(), 1);
    assert!(!registry.contains(id).await);
    assert_eq!(metrics.active_sessions.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.active_transcoders.load(Ordering::SeqCst), 0);
    assert!(handle.dispatch(chunk(b"late")).await.is_err());
}

#[tokio::test]
async fn test_registry_reports_unexpected_exit() {
    let launcher = FakeLauncher::new();
    let registry = SessionRegistry::new(
        Arc::new(launcher.clone()),
        Arc::new(CountingMetrics::default()),
        SessionSettings::default(),
    );
    let id = ConnectionId::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let handle = registry.get_or_create(id, notifier.clone()).await;

    handle
        .dispatch(configure("rtmp://example.com/live", "abc123"))
        .await
        .unwrap();
    eventually("stream ready", || notifier.ready_count() == 1).await;

    launcher.exit(0, ExitReport::with_code(1));
    eventually("unexpected exit notification", || {
        notifier.errors(ErrorKind::UnexpectedExit).len() == 1
    })
    .await;

    // Disconnecting an idle session has nothing left to stop.
    assert!(registry.disconnect(id).await);
    assert_eq!(launcher.stop_count(), 0);
}

#[tokio::test]
async fn test_concurrent_disconnects_remove_session_once() {
    let launcher = FakeLauncher::new();
    let registry = SessionRegistry::new(
        Arc::new(launcher.clone()),
        Arc::new(CountingMetrics::default()),
        SessionSettings::default(),
    );
    let id = ConnectionId::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let handle = registry.get_or_create(id, notifier.clone()).await;

    handle
        .dispatch(configure("rtmp://example.com/live", "abc123"))
        .await
        .unwrap();
    for _ in 0..50 {
        handle.dispatch(chunk(b"in-flight")).await.unwrap();
    }

    let (first, second) = tokio::join!(registry.disconnect(id), registry.disconnect(id));

    assert!(first ^ second, "exactly one disconnect removes the session");
    assert!(registry.is_empty().await);
    assert_eq!(launcher.stop_count(), 1);
    assert!(!registry.disconnect(id).await);
}

#[tokio::test]
async fn test_registry_shutdown_stops_every_session() {
    let launcher = FakeLauncher::new();
    let registry = SessionRegistry::new(
        Arc::new(launcher.clone()),
        Arc::new(CountingMetrics::default()),
        SessionSettings::default(),
    );
    let notifier = Arc::new(RecordingNotifier::default());

    for key in ["cam1", "cam2"] {
        let handle = registry
            .get_or_create(ConnectionId::new(), notifier.clone())
            .await;
        handle
            .dispatch(configure("rtmp://example.com/live", key))
            .await
            .unwrap();
    }
    eventually("both streams ready", || notifier.ready_count() == 2).await;

    registry.shutdown().await;

    assert!(registry.is_empty().await);
    assert_eq!(launcher.stop_count(), 2);
}

#[tokio::test]
async fn test_cancel_aborts_reconfigure_wait_without_spawning() {
    let launcher = FakeLauncher::ignoring_stop();
    let settings = SessionSettings::new(Duration::from_secs(3), 8).unwrap();
    let (mut session, notifier, metrics) = create_session(&launcher, settings);

    session.handle(configure("rtmp://example.com/live", "one")).await;
    let canceller = session.canceller();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    session.handle(configure("rtmp://example.com/live", "two")).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.process_count(), 0);
    assert_eq!(
        launcher.calls(),
        vec![
            Call::Launch("rtmp://example.com/live/one".to_string()),
            Call::Stop(0),
        ]
    );
    assert_eq!(notifier.ready_count(), 1);
    assert_eq!(metrics.active_transcoders.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_disconnect_during_reconfigure_is_prompt() {
    let launcher = FakeLauncher::ignoring_stop();
    let registry = SessionRegistry::new(
        Arc::new(launcher.clone()),
        Arc::new(CountingMetrics::default()),
        SessionSettings::new(Duration::from_secs(3), 8).unwrap(),
    );
    let id = ConnectionId::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let handle = registry.get_or_create(id, notifier.clone()).await;

    handle
        .dispatch(configure("rtmp://example.com/live", "one"))
        .await
        .unwrap();
    eventually("stream ready", || notifier.ready_count() == 1).await;
    handle
        .dispatch(configure("rtmp://example.com/live", "two"))
        .await
        .unwrap();
    eventually("old transcoder stop", || launcher.stop_count() == 1).await;

    let started = tokio::time::Instant::now();
    assert!(registry.disconnect(id).await);

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "disconnect waited {:?}",
        started.elapsed()
    );
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(launcher.stop_count(), 1);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_transcoder_owned_only_while_active() {
    let launcher = FakeLauncher::new();
    let (mut session, _, _) = create_session(&launcher, SessionSettings::default());

    let steps = vec![
        configure("rtmp://example.com/live", "one"),
        chunk(b"frame"),
        ClientEvent::Stop,
        configure("rtmp://example.com/live", "two"),
        configure("rtmp://example.com/live", "three"),
        ClientEvent::Stop,
        ClientEvent::Stop,
        ClientEvent::Disconnect,
    ];

    for event in steps {
        session.handle(event).await;
        session.check_invariants();
        assert_eq!(session.process_count() == 1, session.state().has_process());
    }

    assert_eq!(session.state(), SessionState::Terminated);
}
