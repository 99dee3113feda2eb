use super::*;
use rehaflow_shared::CommandError;

struct Harness {
    manager: ConnectionManager,
    channel: CommandChannel,
    recorded: std::sync::Arc<std::sync::Mutex<Vec<ClientEvent>>>,
    server_ws: ServerSocket,
    _server: tokio::task::JoinHandle<()>,
}

async fn harness(timeout: Duration, cancel_on_disconnect: bool) -> Harness {
    let (addr, mut sockets, server) = spawn_ws_server().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(addr, &events, ReconnectPolicy::disabled());
    let channel = CommandChannel::new(manager.clone(), timeout, cancel_on_disconnect);

    manager.connect().await.unwrap();
    let server_ws = ws_accept(&mut sockets).await;

    Harness {
        manager,
        channel,
        recorded,
        server_ws,
        _server: server,
    }
}

#[tokio::test]
async fn when_command_succeeds_then_response_resolves_the_call() {
    let mut h = harness(TEST_TIMEOUT, false).await;

    let channel = h.channel.clone();
    let call = tokio::spawn(async move { channel.init_scale(500.0).await });

    let request = ws_recv_json(&mut h.server_ws).await;
    assert_eq!(request["command"], "init");
    assert_eq!(request["known_weight"], 500.0);
    assert!(request["timestamp"].is_i64());
    let request_id = request["request_id"].as_str().unwrap().to_string();
    assert!(!request_id.is_empty());
    assert_eq!(h.channel.pending_count(), 1);

    let mut response = response_to(&request, "success", true);
    response["weight"] = json!(499.8);
    ws_send_json(&mut h.server_ws, response).await;

    let response = call.await.unwrap().unwrap();
    assert!(response.is_success());
    assert_eq!(response.command, "init");
    assert_eq!(response.request_id.as_deref(), Some(request_id.as_str()));
    assert_eq!(response.number("weight"), Some(499.8));
    assert_eq!(h.channel.pending_count(), 0);
    assert_eq!(count_kind(&h.recorded, EventKind::CommandResponse), 1);

    h.manager.disconnect().await;
}

#[tokio::test]
async fn when_history_has_no_limit_then_default_limit_is_sent() {
    let mut h = harness(TEST_TIMEOUT, false).await;

    let channel = h.channel.clone();
    let call = tokio::spawn(async move { channel.weight_history(None).await });

    let request = ws_recv_json(&mut h.server_ws).await;
    assert_eq!(request["command"], "get_history");
    assert_eq!(request["limit"], 50);

    ws_send_json(&mut h.server_ws, response_to(&request, "success", true)).await;
    assert!(call.await.unwrap().is_ok());

    h.manager.disconnect().await;
}

#[tokio::test]
async fn when_server_rejects_command_then_error_carries_message() {
    let mut h = harness(TEST_TIMEOUT, false).await;

    let channel = h.channel.clone();
    let call = tokio::spawn(async move { channel.tare_scale().await });

    let request = ws_recv_json(&mut h.server_ws).await;
    let mut response = response_to(&request, "error", true);
    response["message"] = json!("Scale not initialized");
    ws_send_json(&mut h.server_ws, response).await;

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        CommandError::Rejected {
            command: "tare_scale".to_string(),
            message: "Scale not initialized".to_string(),
        }
    );
    assert_eq!(h.channel.pending_count(), 0);

    h.manager.disconnect().await;
}

#[tokio::test]
async fn when_rejection_has_no_message_then_generic_message_is_used() {
    let mut h = harness(TEST_TIMEOUT, false).await;

    let channel = h.channel.clone();
    let call = tokio::spawn(async move { channel.trigger_zero().await });

    let request = ws_recv_json(&mut h.server_ws).await;
    assert_eq!(request["command"], "start_zero_measurement");
    ws_send_json(&mut h.server_ws, response_to(&request, "failed", true)).await;

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(
        err,
        CommandError::rejected("start_zero_measurement", None)
    );

    h.manager.disconnect().await;
}

#[tokio::test]
async fn when_server_stays_silent_then_command_times_out_and_late_response_is_ignored() {
    let timeout = Duration::from_millis(100);
    let mut h = harness(timeout, false).await;

    let err = h.channel.get_current_weight().await.unwrap_err();
    assert_eq!(
        err,
        CommandError::Timeout {
            command: "get_current_weight".to_string(),
            after: timeout,
        }
    );
    assert!(err.is_timeout());
    assert_eq!(h.channel.pending_count(), 0);

    let request = ws_recv_json(&mut h.server_ws).await;
    ws_send_json(&mut h.server_ws, response_to(&request, "success", true)).await;
    wait_until(|| count_kind(&h.recorded, EventKind::CommandResponse) == 1).await;
    assert_eq!(h.channel.pending_count(), 0);
    assert!(h.manager.is_connected());

    h.manager.disconnect().await;
}

#[tokio::test]
async fn when_same_command_is_in_flight_twice_then_request_id_routes_each_response() {
    let mut h = harness(TEST_TIMEOUT, false).await;

    let first = tokio::spawn({
        let channel = h.channel.clone();
        async move { channel.calibrate_scale(100.0).await }
    });
    let first_request = ws_recv_json(&mut h.server_ws).await;

    let second = tokio::spawn({
        let channel = h.channel.clone();
        async move { channel.calibrate_scale(200.0).await }
    });
    let second_request = ws_recv_json(&mut h.server_ws).await;
    assert_ne!(first_request["request_id"], second_request["request_id"]);
    assert_eq!(h.channel.pending_count(), 2);

    // Answer in reverse order.
    let mut second_response = response_to(&second_request, "success", true);
    second_response["known_weight"] = second_request["known_weight"].clone();
    ws_send_json(&mut h.server_ws, second_response).await;

    let mut first_response = response_to(&first_request, "success", true);
    first_response["known_weight"] = first_request["known_weight"].clone();
    ws_send_json(&mut h.server_ws, first_response).await;

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.number("known_weight"), Some(100.0));
    assert_eq!(second.number("known_weight"), Some(200.0));
    assert_eq!(h.channel.pending_count(), 0);

    h.manager.disconnect().await;
}

#[tokio::test]
async fn when_response_has_no_request_id_then_oldest_same_name_command_settles() {
    let mut h = harness(TEST_TIMEOUT, false).await;

    let first = tokio::spawn({
        let channel = h.channel.clone();
        async move { channel.start_measuring().await }
    });
    let request = ws_recv_json(&mut h.server_ws).await;

    let second = tokio::spawn({
        let channel = h.channel.clone();
        async move { channel.start_measuring().await }
    });
    let _ = ws_recv_json(&mut h.server_ws).await;

    ws_send_json(&mut h.server_ws, response_to(&request, "success", false)).await;
    let settled = first.await.unwrap().unwrap();
    assert_eq!(settled.request_id, None);
    assert_eq!(h.channel.pending_count(), 1);

    ws_send_json(&mut h.server_ws, response_to(&request, "success", false)).await;
    assert!(second.await.unwrap().is_ok());
    assert_eq!(h.channel.pending_count(), 0);

    h.manager.disconnect().await;
}

#[tokio::test]
async fn when_not_connected_then_command_fails_without_sending() {
    let mut h = harness(TEST_TIMEOUT, false).await;
    h.manager.disconnect().await;

    let err = h.channel.stop_measuring().await.unwrap_err();
    assert_eq!(err, CommandError::NotConnected);
    assert_eq!(h.channel.pending_count(), 0);

    let nothing = tokio::time::timeout(Duration::from_millis(100), async {
        use futures_util::StreamExt;
        loop {
            match h.server_ws.next().await {
                Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => return Some(text),
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await;
    assert!(!matches!(nothing, Ok(Some(_))), "no command frame expected");
}

#[tokio::test]
async fn when_cancel_on_disconnect_then_in_flight_command_is_cancelled() {
    let mut h = harness(TEST_TIMEOUT, true).await;

    let channel = h.channel.clone();
    let call = tokio::spawn(async move { channel.tare_scale().await });
    let _ = ws_recv_json(&mut h.server_ws).await;

    drop(h.server_ws);

    let err = tokio::time::timeout(TEST_TIMEOUT, call)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert_eq!(err, CommandError::Cancelled);
    assert_eq!(h.channel.pending_count(), 0);
    assert_eq!(count_kind(&h.recorded, EventKind::Disconnected), 1);
}

#[tokio::test]
async fn when_disconnected_by_default_then_in_flight_command_times_out() {
    let timeout = Duration::from_millis(200);
    let mut h = harness(timeout, false).await;

    let channel = h.channel.clone();
    let call = tokio::spawn(async move { channel.tare_scale().await });
    let _ = ws_recv_json(&mut h.server_ws).await;

    drop(h.server_ws);
    wait_until(|| count_kind(&h.recorded, EventKind::Disconnected) == 1).await;

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(h.channel.pending_count(), 0);
}

#[tokio::test]
async fn when_extra_field_collides_with_reserved_key_then_it_is_dropped() {
    let mut h = harness(TEST_TIMEOUT, false).await;

    let channel = h.channel.clone();
    let call = tokio::spawn(async move {
        let mut extra = serde_json::Map::new();
        extra.insert("command".to_string(), json!("stop_measuring"));
        extra.insert("request_id".to_string(), json!("forged"));
        extra.insert("mode".to_string(), json!("fast"));
        channel.send_command("start_measuring", extra).await
    });

    let request = ws_recv_json(&mut h.server_ws).await;
    assert_eq!(request["command"], "start_measuring");
    assert_ne!(request["request_id"], "forged");
    assert_eq!(request["mode"], "fast");

    ws_send_json(&mut h.server_ws, response_to(&request, "success", true)).await;
    assert!(call.await.unwrap().is_ok());

    h.manager.disconnect().await;
}
