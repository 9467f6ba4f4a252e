//! End-to-end tests: real server, real WebSocket clients

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use location_hub::client::Subscription;
use location_hub::types::HubResult;
use location_hub::{
    server, ClientEvent, ConnectionState, Hub, HubConfig, LocationClient, LocationStore,
    MemoryStore, OutboundMessage, PresenceStatus, ReconnectConfig, SendLocation, WsConnector,
};

struct TestServer {
    url: String,
    store: Arc<MemoryStore>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<HubResult<()>>,
}

async fn start_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(Hub::new(store.clone()));
    let (stop, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(server::serve(listener, HubConfig::default(), hub, async move {
        let _ = stopped.await;
    }));

    TestServer {
        url: format!("ws://{}/hubs/location", addr),
        store,
        stop,
        task,
    }
}

fn client(url: &str) -> LocationClient<WsConnector> {
    LocationClient::new(WsConnector::new(url), ReconnectConfig::default())
}

fn record(client: &LocationClient<WsConnector>) -> (mpsc::UnboundedReceiver<ClientEvent>, Subscription<ClientEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = client.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });
    (rx, subscription)
}

async fn wait_for<P>(events: &mut mpsc::UnboundedReceiver<ClientEvent>, wanted: P) -> ClientEvent
where
    P: Fn(&ClientEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_location_reaches_group_member() {
    let server = start_server().await;

    let watcher = client(&server.url);
    let (mut events, _subscription) = record(&watcher);
    watcher.connect().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::Message(OutboundMessage::Connected { .. }))
    })
    .await;

    // The pong confirms the join was processed first
    watcher.join_group("dev-7").unwrap();
    watcher.ping().unwrap();
    wait_for(&mut events, |e| matches!(e, ClientEvent::Message(OutboundMessage::Pong))).await;

    let device = client(&server.url);
    device.connect().await.unwrap();
    device.send_location(SendLocation::new("dev-9", 1.0, 1.0)).unwrap();
    device.send_location(SendLocation::new("dev-7", 52.52, 13.405)).unwrap();

    let received = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::Message(OutboundMessage::ReceiveLocation(_)))
    })
    .await;
    match received {
        ClientEvent::Message(OutboundMessage::ReceiveLocation(update)) => {
            assert_eq!(update.device_id, "dev-7");
            assert_eq!(update.latitude, 52.52);
            assert_eq!(update.longitude, 13.405);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // The reporter going away marks the device offline
    device.disconnect();
    wait_for(&mut events, |e| {
        *e == ClientEvent::Message(OutboundMessage::DeviceStatusChanged {
            device_id: "dev-7".to_string(),
            status: PresenceStatus::Offline,
        })
    })
    .await;

    let stored = server.store.query_by_device("dev-7", 10).await.unwrap();
    assert_eq!(stored.len(), 1);

    watcher.disconnect();
    assert_eq!(watcher.state(), ConnectionState::Closed);

    let _ = server.stop.send(());
    let result = timeout(Duration::from_secs(5), server.task).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn test_connect_to_missing_server_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("ws://{}/hubs/location", addr));
    let (mut events, _subscription) = record(&client);

    assert!(client.connect().await.is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    wait_for(&mut events, |e| matches!(e, ClientEvent::ConnectionFailed(_))).await;
}
