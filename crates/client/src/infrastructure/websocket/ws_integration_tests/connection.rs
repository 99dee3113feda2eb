use super::*;

fn quick_retry(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy::new(Duration::from_millis(20), max_attempts)
}

#[tokio::test]
async fn when_connect_succeeds_then_state_is_connected_and_event_published() {
    let (addr, mut sockets, _server) = spawn_ws_server().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(addr, &events, ReconnectPolicy::default());

    manager.connect().await.unwrap();
    let _server_ws = ws_accept(&mut sockets).await;

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(manager.is_connected());
    assert_eq!(count_kind(&recorded, EventKind::Connected), 1);
    assert_eq!(manager.status().reconnect_attempts, 0);

    // Connecting again while connected is a no-op
    manager.connect().await.unwrap();
    assert_eq!(count_kind(&recorded, EventKind::Connected), 1);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_connect_fails_then_error_is_published_and_no_retry_happens() {
    let addr = unused_addr().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(addr, &events, quick_retry(3));

    let err = manager.connect().await.unwrap_err();

    assert!(matches!(err, ConnectionError::Transport(_)), "got {err:?}");
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(count_kind(&recorded, EventKind::Error), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.status().reconnect_attempts, 0);
    assert_eq!(count_kind(&recorded, EventKind::Error), 1);
}

#[tokio::test]
async fn when_handshake_never_completes_then_connect_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let events = EventBus::new();
    let manager = ConnectionManager::new(
        url::Url::parse(&format!("ws://{addr}")).unwrap(),
        events.clone(),
        ReconnectPolicy::disabled(),
        Duration::from_millis(100),
    )
    .unwrap();

    let err = manager.connect().await.unwrap_err();
    assert_eq!(err, ConnectionError::ConnectTimeout(Duration::from_millis(100)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn when_server_drops_connection_then_disconnected_fires_and_client_reconnects() {
    let (addr, mut sockets, _server) = spawn_ws_server().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(
        addr,
        &events,
        ReconnectPolicy::new(Duration::from_millis(200), 3),
    );

    manager.connect().await.unwrap();
    let server_ws = ws_accept(&mut sockets).await;
    drop(server_ws);

    wait_until(|| count_kind(&recorded, EventKind::Disconnected) == 1).await;
    assert_eq!(manager.state(), ConnectionState::Reconnecting);

    let _second = ws_accept(&mut sockets).await;
    wait_until(|| count_kind(&recorded, EventKind::Connected) == 2).await;

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.status().reconnect_attempts, 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_reconnect_attempts_are_exhausted_then_state_is_disconnected() {
    let (addr, mut sockets, server) = spawn_ws_server().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(addr, &events, quick_retry(2));

    manager.connect().await.unwrap();
    let server_ws = ws_accept(&mut sockets).await;

    // Take the whole server down so every retry is refused.
    server.abort();
    let _ = server.await;
    drop(server_ws);

    wait_until(|| {
        manager.state() == ConnectionState::Disconnected
            && manager.status().reconnect_attempts == 2
    })
    .await;
    assert_eq!(count_kind(&recorded, EventKind::Disconnected), 1);
    assert_eq!(count_kind(&recorded, EventKind::Error), 2);

    // No further automatic attempts.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.status().reconnect_attempts, 2);
    assert_eq!(count_kind(&recorded, EventKind::Error), 2);
}

#[tokio::test]
async fn when_disconnect_is_called_then_no_event_and_no_reconnect() {
    let (addr, mut sockets, _server) = spawn_ws_server().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(addr, &events, quick_retry(3));

    manager.connect().await.unwrap();
    let mut server_ws = ws_accept(&mut sockets).await;

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // The server sees the close frame.
    let closed = tokio::time::timeout(TEST_TIMEOUT, async {
        use futures_util::StreamExt;
        loop {
            match server_ws.next().await {
                Some(Ok(tokio_tungstenite::tungstenite::Message::Close(_))) | None => return,
                Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count_kind(&recorded, EventKind::Disconnected), 0);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(sockets.try_recv().is_err(), "client must not reconnect");

    // Idempotent
    manager.disconnect().await;
}

#[tokio::test]
async fn when_disconnect_during_reconnect_wait_then_retry_is_cancelled() {
    let (addr, mut sockets, _server) = spawn_ws_server().await;
    let events = EventBus::new();
    let manager = test_manager(
        addr,
        &events,
        ReconnectPolicy::new(Duration::from_millis(150), 3),
    );

    manager.connect().await.unwrap();
    drop(ws_accept(&mut sockets).await);
    wait_for_state(&manager, ConnectionState::Reconnecting).await;

    manager.disconnect().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(sockets.try_recv().is_err(), "scheduled reconnect must not run");
}

#[tokio::test]
async fn when_connect_is_called_while_reconnecting_then_it_connects_immediately() {
    let (addr, mut sockets, _server) = spawn_ws_server().await;
    let events = EventBus::new();
    let manager = test_manager(addr, &events, ReconnectPolicy::new(Duration::from_secs(30), 3));

    manager.connect().await.unwrap();
    drop(ws_accept(&mut sockets).await);
    wait_for_state(&manager, ConnectionState::Reconnecting).await;

    manager.connect().await.unwrap();
    let _again = ws_accept(&mut sockets).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.status().reconnect_attempts, 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_connect_is_called_concurrently_then_both_calls_share_one_socket() {
    let (addr, mut sockets, _server) = spawn_ws_server().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(addr, &events, ReconnectPolicy::default());

    let (first, second) = tokio::join!(manager.connect(), manager.connect());
    assert_eq!(first, Ok(()));
    assert_eq!(second, Ok(()));

    let _server_ws = ws_accept(&mut sockets).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sockets.try_recv().is_err(), "only one socket expected");
    assert_eq!(count_kind(&recorded, EventKind::Connected), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect().await;
}
