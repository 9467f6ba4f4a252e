//! Reconnection controller
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connected
//!                                                        \-> Closed
//! ```
//!
//! `disconnect()` moves to `Closed` from any state and is the only way to
//! stop retries before the attempt budget runs out.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::*;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::observer::{Observers, Subscription};
use super::{ClientError, Connector, Link, ReconnectConfig};
use crate::protocol::{HistoryRequest, InboundMessage, OutboundMessage, SendLocation};
use crate::types::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Notifications delivered to client observers
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    /// A frame from the hub
    Message(OutboundMessage),
    /// The initial `connect()` failed
    ConnectionFailed(String),
    /// A retry is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },
    /// The client reached `Closed`; no more automatic retries
    Disconnected,
}

struct Shared {
    state: Mutex<ConnectionState>,
    attempts: AtomicU32,
    groups: Mutex<BTreeSet<DeviceId>>,
    outgoing: Mutex<Option<UnboundedSender<InboundMessage>>>,
    observers: Observers<ClientEvent>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn emit(&self, event: ClientEvent) {
        self.observers.notify(&event);
    }

    /// Unconditionally move to `next`, returning the previous state
    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            self.emit(ClientEvent::StateChanged(next));
        }
        previous
    }

    /// Move from `from` to `to`; fails if another path changed the state first
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        {
            let mut state = self.state.lock();
            if *state != from {
                return false;
            }
            *state = to;
        }
        self.emit(ClientEvent::StateChanged(to));
        true
    }
}

/// Hub client with automatic reconnection
pub struct LocationClient<C: Connector> {
    connector: Arc<C>,
    config: ReconnectConfig,
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> LocationClient<C> {
    pub fn new(connector: C, config: ReconnectConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                attempts: AtomicU32::new(0),
                groups: Mutex::new(BTreeSet::new()),
                outgoing: Mutex::new(None),
                observers: Observers::new(),
            }),
            driver: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Consecutive failed reconnect attempts
    pub fn attempt_count(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Groups that will be replayed after a reconnect
    pub fn groups(&self) -> Vec<DeviceId> {
        self.shared.groups.lock().iter().cloned().collect()
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Register an observer; dropping the handle unregisters it
    pub fn subscribe<F>(&self, listener: F) -> Subscription<ClientEvent>
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(listener)
    }

    /// Open the connection. On failure the client returns to `Disconnected`
    /// and the caller decides whether to try again.
    pub async fn connect(&self) -> Result<(), ClientError> {
        {
            let mut state = self.shared.state.lock();
            match *state {
                ConnectionState::Disconnected | ConnectionState::Closed => {
                    *state = ConnectionState::Connecting;
                }
                other => return Err(ClientError::AlreadyActive(other.as_str())),
            }
        }
        self.shared.emit(ClientEvent::StateChanged(ConnectionState::Connecting));

        if let Some(stale) = self.driver.lock().take() {
            stale.abort();
        }

        let link = match self.connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                warn!("Connection to hub failed: {}", e);
                if self
                    .shared
                    .transition(ConnectionState::Connecting, ConnectionState::Disconnected)
                {
                    self.shared.emit(ClientEvent::ConnectionFailed(e.to_string()));
                }
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        for device_id in self.shared.groups.lock().iter() {
            let _ = tx.send(InboundMessage::JoinDeviceGroup {
                device_id: device_id.clone(),
            });
        }
        *self.shared.outgoing.lock() = Some(tx);
        self.shared.attempts.store(0, Ordering::SeqCst);

        if !self
            .shared
            .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            // disconnect() ran while the handshake was in flight
            self.shared.outgoing.lock().take();
            return Err(ClientError::Closed);
        }
        info!("Connected to hub");

        let driver = tokio::spawn(drive(
            self.connector.clone(),
            self.config.clone(),
            self.shared.clone(),
            link,
            rx,
        ));
        *self.driver.lock() = Some(driver);
        Ok(())
    }

    /// Close the connection and cancel any pending retry
    pub fn disconnect(&self) {
        let previous = self.shared.set_state(ConnectionState::Closed);
        self.shared.outgoing.lock().take();
        if let Some(driver) = self.driver.lock().take() {
            // A connected driver sees its command queue end, sends a close
            // frame and exits on its own
            if previous != ConnectionState::Connected {
                driver.abort();
            }
        }
        if previous != ConnectionState::Closed {
            info!("Disconnected from hub");
            self.shared.emit(ClientEvent::Disconnected);
        }
    }

    /// Join a device group. The membership is remembered and replayed after
    /// reconnects; it is sent immediately only while connected.
    pub fn join_group(&self, device_id: impl Into<DeviceId>) -> Result<(), ClientError> {
        let device_id = device_id.into();
        if !self.shared.groups.lock().insert(device_id.clone()) {
            return Ok(());
        }
        if self.state() != ConnectionState::Connected {
            return Ok(());
        }
        self.send(InboundMessage::JoinDeviceGroup { device_id })
    }

    pub fn leave_group(&self, device_id: &str) -> Result<(), ClientError> {
        if !self.shared.groups.lock().remove(device_id) {
            return Ok(());
        }
        if self.state() != ConnectionState::Connected {
            return Ok(());
        }
        self.send(InboundMessage::LeaveDeviceGroup {
            device_id: device_id.to_string(),
        })
    }

    pub fn send_location(&self, report: SendLocation) -> Result<(), ClientError> {
        self.send(InboundMessage::SendLocation(report))
    }

    pub fn request_history(&self, request: HistoryRequest) -> Result<(), ClientError> {
        self.send(InboundMessage::GetDeviceHistory(request))
    }

    pub fn ping(&self) -> Result<(), ClientError> {
        self.send(InboundMessage::Ping)
    }

    fn send(&self, message: InboundMessage) -> Result<(), ClientError> {
        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::Closed => return Err(ClientError::Closed),
            _ => return Err(ClientError::NotConnected),
        }
        let outgoing = self.shared.outgoing.lock();
        let tx = outgoing.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(message).map_err(|_| ClientError::NotConnected)
    }
}

impl<C: Connector> Drop for LocationClient<C> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PumpExit {
    LinkLost,
    Stopped,
}

/// Background task owning the live link for the lifetime of a session
async fn drive<C: Connector>(
    connector: Arc<C>,
    config: ReconnectConfig,
    shared: Arc<Shared>,
    mut link: C::Link,
    mut outgoing: UnboundedReceiver<InboundMessage>,
) {
    loop {
        if pump(&shared, &mut link, &mut outgoing).await == PumpExit::Stopped {
            if let Err(e) = link.close().await {
                debug!("Closing hub connection failed: {}", e);
            }
            return;
        }
        drop(link);

        if !shared.transition(ConnectionState::Connected, ConnectionState::Reconnecting) {
            return;
        }
        warn!("Connection to hub lost, reconnecting");

        match reconnect(connector.as_ref(), &config, &shared, &mut outgoing).await {
            Some(next) => link = next,
            None => return,
        }
    }
}

/// Shuttle frames between the link, the observers and the command queue
async fn pump<L: Link>(
    shared: &Shared,
    link: &mut L,
    outgoing: &mut UnboundedReceiver<InboundMessage>,
) -> PumpExit {
    loop {
        tokio::select! {
            frame = link.recv() => {
                match frame {
                    Some(Ok(message)) => shared.emit(ClientEvent::Message(message)),
                    Some(Err(ClientError::Decode(e))) => warn!("Ignoring frame from hub: {}", e),
                    Some(Err(e)) => {
                        warn!("Receive from hub failed: {}", e);
                        return PumpExit::LinkLost;
                    }
                    None => return PumpExit::LinkLost,
                }
            }

            command = outgoing.recv() => {
                match command {
                    Some(message) => {
                        if let Err(e) = link.send(&message).await {
                            warn!("Send to hub failed: {}", e);
                            return PumpExit::LinkLost;
                        }
                    }
                    None => return PumpExit::Stopped,
                }
            }
        }
    }
}

/// Retry with backoff until a link is up, the budget is spent or the
/// client is closed
async fn reconnect<C: Connector>(
    connector: &C,
    config: &ReconnectConfig,
    shared: &Shared,
    outgoing: &mut UnboundedReceiver<InboundMessage>,
) -> Option<C::Link> {
    loop {
        let attempt = shared.attempts.load(Ordering::SeqCst);
        if config.exhausted(attempt) {
            if shared.transition(ConnectionState::Reconnecting, ConnectionState::Closed) {
                shared.outgoing.lock().take();
                warn!("Giving up on hub after {} reconnect attempts", attempt);
                shared.emit(ClientEvent::Disconnected);
            }
            return None;
        }

        let delay = config.delay_for(attempt);
        shared.emit(ClientEvent::Reconnecting { attempt, delay });
        tokio::time::sleep(delay).await;

        if shared.state() != ConnectionState::Reconnecting {
            return None;
        }

        match connector.connect().await {
            Ok(mut link) => {
                // Commands queued for the dead link are not carried over
                while outgoing.try_recv().is_ok() {}

                match replay_groups(shared, &mut link).await {
                    Ok(()) => {
                        shared.attempts.store(0, Ordering::SeqCst);
                        if !shared.transition(ConnectionState::Reconnecting, ConnectionState::Connected) {
                            return None;
                        }
                        info!("Reconnected to hub");
                        return Some(link);
                    }
                    Err(e) => warn!("Replaying group subscriptions failed: {}", e),
                }
            }
            Err(e) => debug!("Reconnect attempt {} failed: {}", attempt + 1, e),
        }

        shared.attempts.fetch_add(1, Ordering::SeqCst);
    }
}

async fn replay_groups<L: Link>(shared: &Shared, link: &mut L) -> Result<(), ClientError> {
    let groups: Vec<DeviceId> = shared.groups.lock().iter().cloned().collect();
    for device_id in groups {
        link.send(&InboundMessage::JoinDeviceGroup { device_id }).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    /// Test side of an accepted mock link
    struct Peer {
        to_client: UnboundedSender<OutboundMessage>,
        from_client: UnboundedReceiver<InboundMessage>,
        closed: Arc<AtomicBool>,
    }

    struct MockLink {
        incoming: UnboundedReceiver<OutboundMessage>,
        sent: UnboundedSender<InboundMessage>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Link for MockLink {
        async fn send(&mut self, message: &InboundMessage) -> Result<(), ClientError> {
            self.sent
                .send(message.clone())
                .map_err(|e| ClientError::Transport(e.to_string()))
        }

        async fn recv(&mut self) -> Option<Result<OutboundMessage, ClientError>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<(), ClientError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Succeeds or fails according to a script; fails once the script runs out
    struct MockConnector {
        outcomes: Mutex<VecDeque<bool>>,
        calls: Arc<AtomicUsize>,
        peers: UnboundedSender<Peer>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Link = MockLink;

        async fn connect(&self) -> Result<MockLink, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.outcomes.lock().pop_front().unwrap_or(false) {
                return Err(ClientError::ConnectFailed("refused".to_string()));
            }
            let (to_client, incoming) = mpsc::unbounded_channel();
            let (sent, from_client) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            let _ = self.peers.send(Peer {
                to_client,
                from_client,
                closed: closed.clone(),
            });
            Ok(MockLink {
                incoming,
                sent,
                closed,
            })
        }
    }

    struct Harness {
        client: LocationClient<MockConnector>,
        calls: Arc<AtomicUsize>,
        peers: UnboundedReceiver<Peer>,
        events: UnboundedReceiver<ClientEvent>,
        _subscription: Subscription<ClientEvent>,
    }

    fn harness(outcomes: &[bool]) -> Harness {
        let calls = Arc::new(AtomicUsize::new(0));
        let (peer_tx, peers) = mpsc::unbounded_channel();
        let connector = MockConnector {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            calls: calls.clone(),
            peers: peer_tx,
        };
        let client = LocationClient::new(connector, ReconnectConfig::default());

        let (event_tx, events) = mpsc::unbounded_channel();
        let subscription = client.subscribe(move |event| {
            let _ = event_tx.send(event.clone());
        });

        Harness {
            client,
            calls,
            peers,
            events,
            _subscription: subscription,
        }
    }

    async fn wait_for(events: &mut UnboundedReceiver<ClientEvent>, wanted: ClientEvent) -> Vec<ClientEvent> {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            let done = event == wanted;
            seen.push(event);
            if done {
                return seen;
            }
        }
        panic!("event stream ended before {:?}", wanted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success_resets_attempts() {
        let mut h = harness(&[true]);
        h.client.connect().await.unwrap();

        assert_eq!(h.client.state(), ConnectionState::Connected);
        assert_eq!(h.client.attempt_count(), 0);
        let seen = wait_for(&mut h.events, ClientEvent::StateChanged(ConnectionState::Connected)).await;
        assert_eq!(seen[0], ClientEvent::StateChanged(ConnectionState::Connecting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_returns_to_disconnected() {
        let mut h = harness(&[false]);
        let result = h.client.connect().await;

        assert!(matches!(result, Err(ClientError::ConnectFailed(_))));
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
        wait_for(&mut h.events, ClientEvent::ConnectionFailed("failed to connect: refused".to_string())).await;

        // No automatic retry after an initial failure
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_is_rejected() {
        let h = harness(&[true]);
        h.client.connect().await.unwrap();
        assert!(matches!(
            h.client.connect().await,
            Err(ClientError::AlreadyActive("connected"))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_are_forwarded_to_observers() {
        let mut h = harness(&[true]);
        h.client.connect().await.unwrap();
        let peer = h.peers.recv().await.unwrap();

        peer.to_client.send(OutboundMessage::Pong).unwrap();
        wait_for(&mut h.events, ClientEvent::Message(OutboundMessage::Pong)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replays_groups() {
        let mut h = harness(&[true, true]);
        h.client.connect().await.unwrap();
        wait_for(&mut h.events, ClientEvent::StateChanged(ConnectionState::Connected)).await;
        let mut first = h.peers.recv().await.unwrap();

        h.client.join_group("dev-7").unwrap();
        assert_eq!(
            first.from_client.recv().await.unwrap(),
            InboundMessage::JoinDeviceGroup {
                device_id: "dev-7".to_string()
            }
        );

        drop(first.to_client);
        let mut second = h.peers.recv().await.unwrap();
        assert_eq!(
            second.from_client.recv().await.unwrap(),
            InboundMessage::JoinDeviceGroup {
                device_id: "dev-7".to_string()
            }
        );

        let seen = wait_for(&mut h.events, ClientEvent::StateChanged(ConnectionState::Connected)).await;
        assert!(seen.contains(&ClientEvent::StateChanged(ConnectionState::Reconnecting)));
        assert_eq!(h.client.state(), ConnectionState::Connected);
        assert_eq!(h.client.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_retry_resets_attempt_count() {
        let mut h = harness(&[true, false, false, true]);
        h.client.connect().await.unwrap();
        let first = h.peers.recv().await.unwrap();
        drop(first.to_client);

        let _second = h.peers.recv().await.unwrap();
        wait_for(&mut h.events, ClientEvent::StateChanged(ConnectionState::Connected)).await;
        wait_for(&mut h.events, ClientEvent::StateChanged(ConnectionState::Connected)).await;
        assert_eq!(h.client.attempt_count(), 0);
        assert_eq!(h.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let mut h = harness(&[true]);
        h.client.connect().await.unwrap();
        let peer = h.peers.recv().await.unwrap();
        drop(peer.to_client);

        let seen = wait_for(&mut h.events, ClientEvent::Disconnected).await;
        let delays: Vec<u128> = seen
            .iter()
            .filter_map(|event| match event {
                ClientEvent::Reconnecting { delay, .. } => Some(delay.as_millis()),
                _ => None,
            })
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
        assert_eq!(h.client.state(), ConnectionState::Closed);
        assert_eq!(h.calls.load(Ordering::SeqCst), 11);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 11);
        assert!(matches!(h.client.ping(), Err(ClientError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_retry() {
        let mut h = harness(&[true]);
        h.client.connect().await.unwrap();
        let peer = h.peers.recv().await.unwrap();
        drop(peer.to_client);

        wait_for(
            &mut h.events,
            ClientEvent::Reconnecting {
                attempt: 0,
                delay: Duration::from_millis(1000),
            },
        )
        .await;
        h.client.disconnect();

        assert_eq!(h.client.state(), ConnectionState::Closed);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_require_connection() {
        let h = harness(&[]);
        assert!(matches!(h.client.ping(), Err(ClientError::NotConnected)));

        // Group membership is remembered while offline
        h.client.join_group("dev-1").unwrap();
        assert_eq!(h.client.groups(), vec!["dev-1".to_string()]);
        h.client.leave_group("dev-1").unwrap();
        assert!(h.client.groups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups_joined_offline_are_sent_on_connect() {
        let mut h = harness(&[true]);
        h.client.join_group("dev-3").unwrap();
        h.client.connect().await.unwrap();

        let mut peer = h.peers.recv().await.unwrap();
        assert_eq!(
            peer.from_client.recv().await.unwrap(),
            InboundMessage::JoinDeviceGroup {
                device_id: "dev-3".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_link_cleanly() {
        let mut h = harness(&[true]);
        h.client.connect().await.unwrap();
        let peer = h.peers.recv().await.unwrap();

        h.client.disconnect();
        for _ in 0..100 {
            if peer.closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(peer.closed.load(Ordering::SeqCst));
        assert_eq!(h.client.state(), ConnectionState::Closed);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }
}
