use super::*;
use futures_util::SinkExt;
use rehaflow_domain::{ExerciseContext, FeedbackCategory, HandPressure, SensorClassifier};
use tokio_tungstenite::tungstenite::Message as WsMessage;

async fn connected() -> (
    ConnectionManager,
    EventBus,
    std::sync::Arc<std::sync::Mutex<Vec<ClientEvent>>>,
    ServerSocket,
    tokio::task::JoinHandle<()>,
) {
    let (addr, mut sockets, server) = spawn_ws_server().await;
    let events = EventBus::new();
    let recorded = record_events(&events);
    let manager = test_manager(addr, &events, ReconnectPolicy::disabled());
    manager.connect().await.unwrap();
    let server_ws = ws_accept(&mut sockets).await;
    (manager, events, recorded, server_ws, server)
}

fn readings(recorded: &std::sync::Arc<std::sync::Mutex<Vec<ClientEvent>>>) -> Vec<f64> {
    recorded
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            ClientEvent::WeightData(reading) => Some(reading.secondary_scale),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn when_weight_data_arrives_then_reading_is_published() {
    let (manager, _events, recorded, mut server_ws, _server) = connected().await;

    ws_send_json(
        &mut server_ws,
        json!({
            "type": "weight_data",
            "waage1": 12.5,
            "waage2": 1000,
            "drucksensoren": {"sensor1": 0.2, "sensor2": 0.1, "sensor3": 0.1},
            "timestamp": 1000
        }),
    )
    .await;

    wait_until(|| count_kind(&recorded, EventKind::WeightData) == 1).await;
    let reading = recorded
        .lock()
        .unwrap()
        .iter()
        .find_map(|event| match event {
            ClientEvent::WeightData(reading) => Some(*reading),
            _ => None,
        })
        .unwrap();

    assert_eq!(reading.primary_scale, Some(12.5));
    assert_eq!(reading.secondary_scale, 1000.0);
    assert_eq!(reading.timestamp, 1000.0);
    assert_eq!(reading.pressure, HandPressure::new(0.2, 0.1, 0.1));

    let context = ExerciseContext {
        elapsed_secs: 0,
        reference_weight: Some(1000.0),
    };
    let result = SensorClassifier::default().classify(&reading, &context);
    assert_eq!(result.category, FeedbackCategory::BalancedPraise);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_frames_are_malformed_then_they_are_dropped_and_later_frames_delivered() {
    let (manager, _events, recorded, mut server_ws, _server) = connected().await;

    ws_send_raw(&mut server_ws, "not json at all").await;
    ws_send_raw(&mut server_ws, r#"{"waage2": 5}"#).await;
    ws_send_json(&mut server_ws, json!({"type": "firmware_update", "version": 2})).await;
    ws_send_json(&mut server_ws, json!({"type": "weight_data", "waage2": 7})).await;

    wait_until(|| count_kind(&recorded, EventKind::WeightData) == 1).await;
    assert_eq!(readings(&recorded), vec![7.0]);
    assert_eq!(count_kind(&recorded, EventKind::Error), 0);
    assert_eq!(count_kind(&recorded, EventKind::ServerError), 0);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_frames_arrive_then_events_keep_arrival_order() {
    let (manager, _events, recorded, mut server_ws, _server) = connected().await;

    for scale in [1.0, 2.0, 3.0, 4.0, 5.0] {
        ws_send_json(&mut server_ws, json!({"type": "weight_data", "waage2": scale})).await;
    }

    wait_until(|| count_kind(&recorded, EventKind::WeightData) == 5).await;
    assert_eq!(readings(&recorded), vec![1.0, 2.0, 3.0, 4.0, 5.0]);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_server_confirms_connection_then_notice_is_published() {
    let (manager, _events, recorded, mut server_ws, _server) = connected().await;

    ws_send_json(
        &mut server_ws,
        json!({"type": "connection", "message": "Willkommen", "clients": 1}),
    )
    .await;

    wait_until(|| count_kind(&recorded, EventKind::ConnectionConfirmed) == 1).await;
    let notice = recorded
        .lock()
        .unwrap()
        .iter()
        .find_map(|event| match event {
            ClientEvent::ConnectionConfirmed(notice) => Some(notice.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(notice.message.as_deref(), Some("Willkommen"));
    assert_eq!(notice.extra.get("clients"), Some(&json!(1)));

    manager.disconnect().await;
}

#[tokio::test]
async fn when_server_reports_error_then_server_error_is_published() {
    let (manager, _events, recorded, mut server_ws, _server) = connected().await;

    ws_send_json(
        &mut server_ws,
        json!({"type": "error", "message": "Sensor not responding"}),
    )
    .await;

    wait_until(|| count_kind(&recorded, EventKind::ServerError) == 1).await;
    let message = recorded
        .lock()
        .unwrap()
        .iter()
        .find_map(|event| match event {
            ClientEvent::ServerError(error) => error.message.clone(),
            _ => None,
        });
    assert_eq!(message.as_deref(), Some("Sensor not responding"));
    // A server error frame is not a transport error.
    assert_eq!(count_kind(&recorded, EventKind::Error), 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_frame_is_sent_as_binary_utf8_then_it_is_decoded() {
    let (manager, _events, recorded, mut server_ws, _server) = connected().await;

    let payload = json!({"type": "weight_data", "waage2": 42}).to_string();
    server_ws
        .send(WsMessage::Binary(payload.into_bytes()))
        .await
        .unwrap();
    server_ws
        .send(WsMessage::Binary(vec![0xff, 0xfe, 0x00]))
        .await
        .unwrap();
    ws_send_json(&mut server_ws, json!({"type": "weight_data", "waage2": 43})).await;

    wait_until(|| count_kind(&recorded, EventKind::WeightData) == 2).await;
    assert_eq!(readings(&recorded), vec![42.0, 43.0]);

    manager.disconnect().await;
}

#[tokio::test]
async fn when_subscriber_panics_then_other_subscribers_still_receive() {
    let (manager, events, recorded, mut server_ws, _server) = connected().await;
    events.subscribe(EventKind::WeightData, |_| panic!("broken subscriber"));

    ws_send_json(&mut server_ws, json!({"type": "weight_data", "waage2": 1})).await;
    ws_send_json(&mut server_ws, json!({"type": "weight_data", "waage2": 2})).await;

    wait_until(|| count_kind(&recorded, EventKind::WeightData) == 2).await;
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect().await;
}

/// Server that greets every client the moment the handshake completes.
async fn spawn_greeting_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let greeting = json!({"type": "connection", "message": "hello"}).to_string();
                let _ = ws.send(WsMessage::Text(greeting)).await;
                let _ = ws.send(WsMessage::Text(
                    json!({"type": "weight_data", "waage2": 1}).to_string(),
                ))
                .await;
                // Keep the socket open until the client leaves.
                use futures_util::StreamExt;
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });
    (addr, handle)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn when_server_sends_immediately_then_connected_is_published_first() {
    let (addr, _server) = spawn_greeting_server().await;

    for _ in 0..50 {
        let events = EventBus::new();
        let recorded = record_events(&events);
        let manager = test_manager(addr, &events, ReconnectPolicy::disabled());

        manager.connect().await.unwrap();
        wait_until(|| count_kind(&recorded, EventKind::WeightData) == 1).await;

        let kinds: Vec<EventKind> = recorded.lock().unwrap().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Connected,
                EventKind::ConnectionConfirmed,
                EventKind::WeightData
            ]
        );

        manager.disconnect().await;
    }
}
