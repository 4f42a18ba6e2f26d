//! Push channel
//!
//! One STOMP connection per signed-in session. Components register topic
//! handlers through [`EventChannel::subscribe`]; the channel keeps the broker
//! subscriptions in sync and reconnects with a fixed delay until it is torn
//! down.
//!
//! Delivery is at most once: messages published while the connection is down
//! are lost and nothing is replayed on reconnect.

pub mod registry;
pub mod stomp;
pub mod transport;

use parking_lot::Mutex;
use serde_json::Value;
use shared::Topic;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionIdentity;
use registry::{ChannelCommand, Registry};

pub use registry::Handler;
pub use stomp::{Command, Frame, HeartBeat};
pub use transport::{ChannelTransport, Connector, MemoryBroker};

/// Time allowed for DISCONNECT + close on teardown
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(2);
const DISCONNECT_RECEIPT: &str = "disconnect";
/// Missed inbound heart-beats tolerated before the link counts as dead
const HEARTBEAT_GRACE: u32 = 2;

/// Connection state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No session
    Idle,
    /// First connection attempt of a session
    Connecting,
    /// CONNECTED received, subscriptions replayed
    Connected,
    /// Waiting for / attempting a reconnect
    Reconnecting,
}

struct ActiveSession {
    identity: SessionIdentity,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl ActiveSession {
    async fn stop(&mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.worker).await {
            if e.is_panic() {
                tracing::error!("EventChannel worker panicked: {e}");
            }
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ChannelInner {
    config: ClientConfig,
    connector: Connector,
    registry: Arc<Mutex<Registry>>,
    /// Serializes connect / disconnect
    session: tokio::sync::Mutex<Option<ActiveSession>>,
    state: Arc<watch::Sender<ChannelState>>,
}

/// Shared handle to the session's push connection
///
/// Cheap to clone. Subscribers only register handlers; the session lifecycle
/// owner calls [`connect`](Self::connect) and [`disconnect`](Self::disconnect).
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("connector", &self.inner.connector)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl EventChannel {
    /// WebSocket channel at `config.channel_url()`
    pub fn new(config: ClientConfig) -> Self {
        let connector = Connector::websocket(config.channel_url());
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: ClientConfig, connector: Connector) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                connector,
                registry: Arc::new(Mutex::new(Registry::default())),
                session: tokio::sync::Mutex::new(None),
                state: Arc::new(state),
            }),
        }
    }

    /// Open the session connection
    ///
    /// No-op without an identity, or when already running for the same
    /// identity. A new credential for the same user reconnects and keeps
    /// every handler. A different user tears the current session down
    /// first, handlers included.
    pub async fn connect(&self, identity: Option<SessionIdentity>) {
        let Some(identity) = identity else {
            tracing::debug!("EventChannel connect skipped: no session");
            return;
        };

        let mut session = self.inner.session.lock().await;
        if let Some(active) = session.as_mut() {
            if active.identity == identity {
                return;
            }
            if active.identity.user_id == identity.user_id {
                tracing::info!(
                    user_id = identity.user_id,
                    "EventChannel credential refreshed, reconnecting"
                );
                self.inner.registry.lock().detach();
            } else {
                tracing::info!(
                    from = active.identity.user_id,
                    to = identity.user_id,
                    "EventChannel identity changed, tearing down previous session"
                );
                self.inner.registry.lock().clear();
            }
            active.stop().await;
            *session = None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = {
            let mut registry = self.inner.registry.lock();
            registry.attach(tx);
            registry.epoch()
        };
        let cancel = CancellationToken::new();
        self.inner.state.send_replace(ChannelState::Connecting);

        let worker = ChannelWorker {
            config: self.inner.config.clone(),
            connector: self.inner.connector.clone(),
            identity: identity.clone(),
            registry: self.inner.registry.clone(),
            state: self.inner.state.clone(),
            commands: rx,
            cancel: cancel.clone(),
            epoch,
        };
        let handle = tokio::spawn(worker.run());
        *session = Some(ActiveSession {
            identity,
            cancel,
            worker: handle,
        });
    }

    /// Register a handler for a topic
    ///
    /// Works before the connection is up; the topic is subscribed as soon as
    /// a session is established (and again after every reconnect).
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        let handler_id = registry.add(&topic, Arc::new(handler));
        tracing::debug!(topic = %topic, handler_id, "Handler registered");
        Subscription {
            registry: Arc::downgrade(&self.inner.registry),
            topic,
            handler_id,
            epoch: registry.epoch(),
            active: AtomicBool::new(true),
        }
    }

    /// Tear the session down
    ///
    /// Cancels reconnects, says DISCONNECT, closes the transport and drops
    /// every registered handler. Idempotent.
    pub async fn disconnect(&self) {
        let mut session = self.inner.session.lock().await;
        self.inner.registry.lock().clear();
        if let Some(mut active) = session.take() {
            active.stop().await;
            tracing::info!(user_id = active.identity.user_id, "EventChannel disconnected");
        }
        self.inner.state.send_replace(ChannelState::Idle);
    }

    /// Watch the connection state
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Handlers currently registered for a topic
    pub fn handler_count(&self, topic: &Topic) -> usize {
        self.inner.registry.lock().handler_count(topic)
    }
}

/// Unsubscribe handle returned by [`EventChannel::subscribe`]
///
/// Dropping it unsubscribes as well.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    topic: Topic,
    handler_id: u64,
    epoch: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove the handler; idempotent
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock();
        // torn down since: the handler is already gone
        if registry.epoch() != self.epoch {
            return;
        }
        registry.remove(&self.topic, self.handler_id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("handler_id", &self.handler_id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Background task owning the transport of one session
struct ChannelWorker {
    config: ClientConfig,
    connector: Connector,
    identity: SessionIdentity,
    registry: Arc<Mutex<Registry>>,
    state: Arc<watch::Sender<ChannelState>>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    cancel: CancellationToken,
    /// Registry epoch this session belongs to
    epoch: u64,
}

impl ChannelWorker {
    /// Connect, serve, reconnect after a fixed delay until cancelled
    async fn run(mut self) {
        let user_id = self.identity.user_id;
        tracing::info!(user_id, "EventChannel worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.open_session().await {
                Ok(Some((transport, heartbeat))) => self.run_session(transport, heartbeat).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        delay_ms = self.config.reconnect_delay.as_millis() as u64,
                        "EventChannel connection failed: {e}"
                    );
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(ChannelState::Reconnecting);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {},
            }
        }

        tracing::info!(user_id, "EventChannel worker stopped");
    }

    /// Publish a state change unless the session was torn down
    fn set_state(&self, state: ChannelState) {
        let registry = self.registry.lock();
        if registry.epoch() == self.epoch && !self.cancel.is_cancelled() {
            self.state.send_replace(state);
        }
    }

    /// Transport + STOMP handshake; `None` when cancelled meanwhile
    async fn open_session(&self) -> ClientResult<Option<(ChannelTransport, HeartBeat)>> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(None),
            result = tokio::time::timeout(self.config.connect_timeout, self.handshake()) => {
                match result {
                    Ok(transport) => transport.map(Some),
                    Err(_) => Err(ClientError::Channel("STOMP handshake timed out".into())),
                }
            }
        }
    }

    async fn handshake(&self) -> ClientResult<(ChannelTransport, HeartBeat)> {
        let mut transport = self.connector.connect(&self.identity).await?;
        let connect = Frame::connect(
            &self.connector.host(),
            &self.identity.bearer(),
            &self.config.heartbeat_header(),
        );
        transport.send(&connect).await?;

        loop {
            let frames = match transport.recv().await {
                Some(frames) => frames?,
                None => {
                    return Err(ClientError::Channel(
                        "connection closed during handshake".into(),
                    ));
                }
            };
            for frame in frames {
                match frame.command {
                    Command::Connected => {
                        let heartbeat = HeartBeat::negotiate(
                            self.config.heartbeat_interval,
                            frame.header("heart-beat"),
                        );
                        return Ok((transport, heartbeat));
                    }
                    Command::Error => {
                        let message = frame.header("message").unwrap_or("broker error");
                        return Err(ClientError::Protocol(message.to_string()));
                    }
                    other => tracing::debug!("Ignoring {other} before CONNECTED"),
                }
            }
        }
    }

    async fn run_session(&mut self, mut transport: ChannelTransport, heartbeat: HeartBeat) {
        // Queued commands are superseded by the snapshot
        let subscriptions = {
            let registry = self.registry.lock();
            if registry.epoch() != self.epoch {
                return;
            }
            while self.commands.try_recv().is_ok() {}
            registry.subscriptions()
        };
        for (sub_id, topic) in &subscriptions {
            if let Err(e) = transport
                .send(&Frame::subscribe(sub_id, &topic.destination()))
                .await
            {
                tracing::warn!("Replaying subscriptions failed: {e}");
                return;
            }
        }
        self.set_state(ChannelState::Connected);
        tracing::info!(
            user_id = self.identity.user_id,
            topics = subscriptions.len(),
            "EventChannel connected"
        );

        let outgoing = heartbeat.outgoing.unwrap_or(Duration::ZERO);
        let mut heartbeat_interval =
            tokio::time::interval(outgoing.max(Duration::from_millis(1)));
        heartbeat_interval.tick().await; // skip immediate tick

        // 读空闲超时: 对端按协商的间隔发送心跳, 超过 GRACE 倍视为断线
        let idle_limit = heartbeat.incoming.map(|d| d * HEARTBEAT_GRACE);
        let mut last_read = tokio::time::Instant::now();

        loop {
            let idle_deadline = last_read + idle_limit.unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    Self::goodbye(&mut transport).await;
                    return;
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        // registry detached: teardown in progress
                        Self::goodbye(&mut transport).await;
                        return;
                    };
                    if let Err(e) = Self::apply(&mut transport, command).await {
                        tracing::warn!("Subscription update failed, reconnecting: {e}");
                        return;
                    }
                }

                _ = heartbeat_interval.tick(), if heartbeat.outgoing.is_some() => {
                    if let Err(e) = transport.send_heartbeat().await {
                        tracing::warn!("Heart-beat failed, reconnecting: {e}");
                        return;
                    }
                }

                _ = tokio::time::sleep_until(idle_deadline), if idle_limit.is_some() => {
                    tracing::warn!(
                        idle_ms = idle_limit.unwrap_or_default().as_millis() as u64,
                        "No traffic from broker, reconnecting"
                    );
                    return;
                }

                incoming = transport.recv() => {
                    match incoming {
                        None => {
                            tracing::info!("EventChannel closed by broker");
                            return;
                        }
                        Some(Err(e)) => {
                            tracing::warn!("EventChannel read failed: {e}");
                            return;
                        }
                        Some(Ok(frames)) => {
                            last_read = tokio::time::Instant::now();
                            for frame in frames {
                                if !self.handle_frame(&frame) {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    async fn apply(transport: &mut ChannelTransport, command: ChannelCommand) -> ClientResult<()> {
        match command {
            ChannelCommand::Subscribe { sub_id, topic } => {
                tracing::debug!(topic = %topic, sub_id = %sub_id, "SUBSCRIBE");
                transport
                    .send(&Frame::subscribe(&sub_id, &topic.destination()))
                    .await
            }
            ChannelCommand::Unsubscribe { sub_id } => {
                tracing::debug!(sub_id = %sub_id, "UNSUBSCRIBE");
                transport.send(&Frame::unsubscribe(&sub_id)).await
            }
        }
    }

    async fn goodbye(transport: &mut ChannelTransport) {
        let close = async {
            if let Err(e) = transport.send(&Frame::disconnect(DISCONNECT_RECEIPT)).await {
                tracing::debug!("DISCONNECT not sent: {e}");
            }
            transport.close().await;
        };
        if tokio::time::timeout(GOODBYE_TIMEOUT, close).await.is_err() {
            tracing::debug!("EventChannel close timed out");
        }
    }

    /// Returns `false` when the session must be dropped
    fn handle_frame(&self, frame: &Frame) -> bool {
        match frame.command {
            Command::Message => {
                self.dispatch(frame);
                true
            }
            Command::Error => {
                tracing::warn!(
                    message = frame.header("message").unwrap_or_default(),
                    "Broker sent ERROR, reconnecting"
                );
                false
            }
            other => {
                tracing::debug!("Ignoring {other} frame");
                true
            }
        }
    }

    fn dispatch(&self, frame: &Frame) {
        let destination = frame.header("destination").unwrap_or_default();
        let handlers = {
            let registry = self.registry.lock();
            if registry.epoch() != self.epoch {
                return;
            }
            registry.handlers_for(frame.header("subscription"), frame.header("destination"))
        };
        if handlers.is_empty() {
            tracing::debug!(destination, "No handler for message");
            return;
        }

        let payload: Value = match serde_json::from_str(&frame.body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(destination, "Dropping malformed message: {e}");
                return;
            }
        };

        for handler in handlers {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(&payload))).is_err() {
                tracing::error!(destination, "Message handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_channel(broker: &MemoryBroker) -> EventChannel {
        let config = ClientConfig::default()
            .with_reconnect_delay(Duration::from_millis(20))
            .with_heartbeat_interval(Duration::ZERO);
        EventChannel::with_connector(config, Connector::Memory(broker.clone()))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn forward(tx: mpsc::UnboundedSender<Value>) -> impl Fn(&Value) + Send + Sync + 'static {
        move |value: &Value| {
            let _ = tx.send(value.clone());
        }
    }

    #[tokio::test]
    async fn test_connect_without_identity_is_noop() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);
        channel.connect(None).await;
        assert_eq!(channel.current_state(), ChannelState::Idle);
        assert!(broker.connect_log().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_and_deliver() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);
        let topic = Topic::ticket(42);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = channel.subscribe(topic.clone(), forward(tx));

        channel
            .connect(Some(SessionIdentity::new(1, "token-1")))
            .await;
        let mut state = channel.state();
        state
            .wait_for(|s| *s == ChannelState::Connected)
            .await
            .unwrap();
        assert_eq!(broker.connect_log(), vec![Some("Bearer token-1".to_string())]);
        assert_eq!(broker.subscriber_count(&topic), 1);

        assert_eq!(broker.publish(&topic, &json!({"id": 5})), 1);
        assert_eq!(rx.recv().await.unwrap(), json!({"id": 5}));

        // same identity again: no second connection
        channel
            .connect(Some(SessionIdentity::new(1, "token-1")))
            .await;
        assert_eq!(broker.connect_log().len(), 1);

        channel.disconnect().await;
        assert_eq!(channel.current_state(), ChannelState::Idle);
        assert_eq!(broker.frames_received(Command::Disconnect), 1);
        assert_eq!(channel.handler_count(&topic), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_last_handler_sends_unsubscribe() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);
        channel.connect(Some(SessionIdentity::new(1, "t"))).await;
        channel
            .state()
            .wait_for(|s| *s == ChannelState::Connected)
            .await
            .unwrap();

        let topic = Topic::user_notifications(1);
        let first = channel.subscribe(topic.clone(), |_| {});
        let second = channel.subscribe(topic.clone(), |_| {});
        eventually(|| broker.subscriber_count(&topic) == 1).await;

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(channel.handler_count(&topic), 1);
        drop(second);
        assert_eq!(channel.handler_count(&topic), 0);
        eventually(|| broker.subscriber_count(&topic) == 0).await;
        assert_eq!(broker.frames_received(Command::Unsubscribe), 1);

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn test_reconnect_replays_subscriptions() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);
        let topic = Topic::ticket(7);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = channel.subscribe(topic.clone(), forward(tx));

        channel.connect(Some(SessionIdentity::new(3, "t"))).await;
        eventually(|| broker.subscriber_count(&topic) == 1).await;

        broker.drop_all();
        eventually(|| broker.connect_log().len() == 2 && broker.subscriber_count(&topic) == 1)
            .await;

        broker.publish(&topic, &json!({"after": "reconnect"}));
        assert_eq!(rx.recv().await.unwrap(), json!({"after": "reconnect"}));

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn test_malformed_and_panicking_handlers_are_isolated() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);
        let topic = Topic::ticket(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _boom = channel.subscribe(topic.clone(), |_| panic!("handler failure"));
        let _ok = channel.subscribe(topic.clone(), forward(tx));

        channel.connect(Some(SessionIdentity::new(1, "t"))).await;
        eventually(|| broker.subscriber_count(&topic) == 1).await;

        broker.publish_raw(&topic, "{not json");
        broker.publish(&topic, &json!({"n": 2}));
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 2}));

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn test_credential_refresh_keeps_handlers() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);
        let topic = Topic::user_notifications(4);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = channel.subscribe(topic.clone(), forward(tx));

        channel.connect(Some(SessionIdentity::new(4, "old"))).await;
        eventually(|| broker.subscriber_count(&topic) == 1).await;

        channel.connect(Some(SessionIdentity::new(4, "new"))).await;
        assert_eq!(channel.handler_count(&topic), 1);
        assert!(sub.is_active());
        eventually(|| {
            broker.connected_authorizations() == vec!["Bearer new".to_string()]
                && broker.subscriber_count(&topic) == 1
        })
        .await;
        assert_eq!(broker.frames_received(Command::Disconnect), 1);

        broker.publish(&topic, &json!({"n": 1}));
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 1}));

        // handle from before the refresh still unsubscribes
        sub.unsubscribe();
        assert_eq!(channel.handler_count(&topic), 0);
        eventually(|| broker.subscriber_count(&topic) == 0).await;

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn test_bad_frame_in_batch_keeps_the_others() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);
        let topic = Topic::ticket(3);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = channel.subscribe(topic.clone(), forward(tx));
        channel.connect(Some(SessionIdentity::new(1, "t"))).await;
        eventually(|| broker.subscriber_count(&topic) == 1).await;

        let destination = topic.destination();
        broker.push_raw(&format!(
            "{}NOPE\n\n\0{}",
            Frame::message(&destination, "sub-0", "m-1", r#"{"n":1}"#).encode(),
            Frame::message(&destination, "sub-0", "m-2", r#"{"n":2}"#).encode()
        ));
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 1}));
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 2}));
        assert_eq!(broker.connect_log().len(), 1);
        assert_eq!(channel.current_state(), ChannelState::Connected);

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn test_silent_broker_triggers_reconnect() {
        let broker = MemoryBroker::new();
        broker.set_heartbeat("40,40");
        let config = ClientConfig::default()
            .with_reconnect_delay(Duration::from_millis(20))
            .with_heartbeat_interval(Duration::from_millis(40));
        let channel = EventChannel::with_connector(config, Connector::Memory(broker.clone()));
        channel.connect(Some(SessionIdentity::new(1, "t"))).await;
        channel
            .state()
            .wait_for(|s| *s == ChannelState::Connected)
            .await
            .unwrap();

        // no heart-beats from the broker: the link is considered dead
        eventually(|| broker.connect_log().len() >= 2).await;
        assert_eq!(broker.frames_received(Command::Disconnect), 0);

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn test_broker_heartbeats_keep_session_alive() {
        let broker = MemoryBroker::new();
        broker.set_heartbeat("40,40");
        let config = ClientConfig::default()
            .with_reconnect_delay(Duration::from_millis(20))
            .with_heartbeat_interval(Duration::from_millis(40));
        let channel = EventChannel::with_connector(config, Connector::Memory(broker.clone()));
        channel.connect(Some(SessionIdentity::new(1, "t"))).await;
        channel
            .state()
            .wait_for(|s| *s == ChannelState::Connected)
            .await
            .unwrap();

        for _ in 0..10 {
            broker.heartbeat();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(broker.connect_log().len(), 1);

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn test_rejected_connect_keeps_retrying() {
        let broker = MemoryBroker::new();
        broker.set_reject_connects(true);
        let channel = test_channel(&broker);
        channel.connect(Some(SessionIdentity::new(1, "bad"))).await;

        eventually(|| broker.connect_log().len() >= 2).await;
        assert_ne!(channel.current_state(), ChannelState::Connected);

        broker.set_reject_connects(false);
        channel
            .state()
            .wait_for(|s| *s == ChannelState::Connected)
            .await
            .unwrap();
        channel.disconnect().await;
        channel.disconnect().await;
        assert_eq!(channel.current_state(), ChannelState::Idle);
    }
}
