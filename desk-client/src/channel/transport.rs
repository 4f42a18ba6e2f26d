// desk-client/src/channel/transport.rs
// 推送通道传输层 - WebSocket 和内存通信

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::stomp::{Command, Frame};
use crate::error::{ClientError, ClientResult};
use crate::session::SessionIdentity;

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// How the channel reaches the broker
#[derive(Debug, Clone)]
pub enum Connector {
    /// STOMP over WebSocket
    WebSocket { url: String },
    /// In-process broker (tests, embedding hosts)
    Memory(MemoryBroker),
}

impl Connector {
    pub fn websocket(url: impl Into<String>) -> Self {
        Self::WebSocket { url: url.into() }
    }

    /// Value for the STOMP `host` header
    pub fn host(&self) -> String {
        match self {
            Self::WebSocket { url } => url
                .split("://")
                .nth(1)
                .and_then(|s| s.split('/').next())
                .and_then(|s| s.split(':').next())
                .unwrap_or("localhost")
                .to_string(),
            Self::Memory(_) => "memory".to_string(),
        }
    }

    pub async fn connect(&self, identity: &SessionIdentity) -> ClientResult<ChannelTransport> {
        match self {
            Self::WebSocket { url } => {
                let mut request = url
                    .as_str()
                    .into_client_request()
                    .map_err(|e| ClientError::Config(format!("Invalid channel URL {url}: {e}")))?;
                let bearer = HeaderValue::from_str(&identity.bearer())
                    .map_err(|e| ClientError::Config(format!("Invalid bearer token: {e}")))?;
                request.headers_mut().insert("Authorization", bearer);

                let (ws, _response) = tokio_tungstenite::connect_async(request)
                    .await
                    .map_err(|e| ClientError::Channel(format!("WebSocket connect failed: {e}")))?;
                Ok(ChannelTransport::WebSocket(Box::new(ws)))
            }
            Self::Memory(broker) => Ok(ChannelTransport::Memory(broker.open())),
        }
    }
}

/// An established transport carrying STOMP text frames
pub enum ChannelTransport {
    WebSocket(Box<WsStream>),
    Memory(MemoryTransport),
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebSocket(_) => f.write_str("ChannelTransport::WebSocket"),
            Self::Memory(t) => f.debug_tuple("ChannelTransport::Memory").field(&t.conn_id).finish(),
        }
    }
}

impl ChannelTransport {
    pub async fn send(&mut self, frame: &Frame) -> ClientResult<()> {
        self.send_raw(frame.encode()).await
    }

    /// Bare EOL heart-beat
    pub async fn send_heartbeat(&mut self) -> ClientResult<()> {
        self.send_raw("\n".to_string()).await
    }

    async fn send_raw(&mut self, raw: String) -> ClientResult<()> {
        match self {
            Self::WebSocket(ws) => ws
                .send(Message::Text(raw.into()))
                .await
                .map_err(|e| ClientError::Channel(format!("Write failed: {e}"))),
            Self::Memory(t) => t.send_raw(raw),
        }
    }

    /// Next batch of frames; `None` once the peer closed the connection.
    /// Malformed frames are dropped, the rest of the batch is kept.
    ///
    /// Cancel safe: nothing is consumed unless it is returned.
    pub async fn recv(&mut self) -> Option<ClientResult<Vec<Frame>>> {
        match self {
            Self::WebSocket(ws) => loop {
                match ws.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(Frame::decode_lossy(text.as_str()))),
                    Ok(Message::Binary(data)) => {
                        return Some(match std::str::from_utf8(&data) {
                            Ok(text) => Ok(Frame::decode_lossy(text)),
                            Err(e) => Err(ClientError::Protocol(format!("non UTF-8 frame: {e}"))),
                        });
                    }
                    Ok(Message::Close(_)) => return None,
                    // tungstenite queues the Pong itself
                    Ok(_) => continue,
                    Err(e) => return Some(Err(ClientError::Channel(format!("Read failed: {e}")))),
                }
            },
            Self::Memory(t) => {
                let raw = t.inbound.recv().await?;
                Some(Ok(Frame::decode_lossy(&raw)))
            }
        }
    }

    pub async fn close(&mut self) {
        match self {
            Self::WebSocket(ws) => {
                // inherent close(CloseFrame), not SinkExt::close
                if let Err(e) = (**ws).close(None).await {
                    tracing::debug!("WebSocket close: {e}");
                }
            }
            Self::Memory(t) => t.close(),
        }
    }
}

/// Client end of an in-process broker connection
#[derive(Debug)]
pub struct MemoryTransport {
    conn_id: u64,
    broker: MemoryBroker,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    fn send_raw(&mut self, raw: String) -> ClientResult<()> {
        self.broker.handle_client_payload(self.conn_id, &raw)
    }

    fn close(&mut self) {
        self.broker.drop_connection(self.conn_id);
        self.inbound.close();
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.broker.drop_connection(self.conn_id);
    }
}

#[derive(Debug)]
struct BrokerConnection {
    outbound: mpsc::UnboundedSender<String>,
    authorization: Option<String>,
    connected: bool,
    /// subscription id -> destination
    subscriptions: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct BrokerState {
    next_conn_id: u64,
    next_message_id: u64,
    connections: HashMap<u64, BrokerConnection>,
    reject_connects: bool,
    /// `heart-beat` header of CONNECTED (`0,0` when unset)
    heartbeat: Option<String>,
    /// Authorization header of every CONNECT seen
    connect_log: Vec<Option<String>>,
    /// Every frame received from clients
    frame_log: Vec<Frame>,
}

/// In-process STOMP broker
///
/// Speaks the same frames as the desk backend: answers CONNECT, tracks
/// SUBSCRIBE/UNSUBSCRIBE per connection and fans out `publish` calls as
/// MESSAGE frames.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let conn_id = state.next_conn_id;
        state.next_conn_id += 1;
        state.connections.insert(
            conn_id,
            BrokerConnection {
                outbound: tx,
                authorization: None,
                connected: false,
                subscriptions: HashMap::new(),
            },
        );
        MemoryTransport {
            conn_id,
            broker: self.clone(),
            inbound: rx,
        }
    }

    fn drop_connection(&self, conn_id: u64) {
        self.state.lock().connections.remove(&conn_id);
    }

    fn handle_client_payload(&self, conn_id: u64, raw: &str) -> ClientResult<()> {
        let frames = Frame::decode_all(raw)?;
        let mut state = self.state.lock();
        let reject = state.reject_connects;
        for frame in frames {
            state.frame_log.push(frame.clone());
            if frame.command == Command::Connect {
                let authorization = frame.header("Authorization").map(str::to_string);
                state.connect_log.push(authorization.clone());
                let connected =
                    Frame::connected(state.heartbeat.as_deref().unwrap_or("0,0")).encode();
                let conn = state
                    .connections
                    .get_mut(&conn_id)
                    .ok_or_else(|| ClientError::Channel("connection closed".into()))?;
                if reject {
                    let _ = conn.outbound.send(Frame::error("Access denied").encode());
                    continue;
                }
                conn.authorization = authorization;
                conn.connected = true;
                let _ = conn.outbound.send(connected);
                continue;
            }

            let conn = state
                .connections
                .get_mut(&conn_id)
                .ok_or_else(|| ClientError::Channel("connection closed".into()))?;
            match frame.command {
                Command::Subscribe => {
                    if let (Some(id), Some(dest)) = (frame.header("id"), frame.header("destination")) {
                        conn.subscriptions.insert(id.to_string(), dest.to_string());
                    }
                }
                Command::Unsubscribe => {
                    if let Some(id) = frame.header("id") {
                        conn.subscriptions.remove(id);
                    }
                }
                Command::Disconnect => {
                    if let Some(receipt) = frame.header("receipt") {
                        let _ = conn.outbound.send(Frame::receipt(receipt).encode());
                    }
                    conn.connected = false;
                    conn.subscriptions.clear();
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Publish a JSON payload on a topic; returns the number of deliveries
    pub fn publish(&self, topic: &shared::Topic, payload: &serde_json::Value) -> usize {
        self.publish_raw(topic, &payload.to_string())
    }

    /// Publish a raw body (may be malformed on purpose)
    pub fn publish_raw(&self, topic: &shared::Topic, body: &str) -> usize {
        let destination = topic.destination();
        let mut state = self.state.lock();
        state.next_message_id += 1;
        let message_id = format!("m-{}", state.next_message_id);
        let mut delivered = 0;
        for conn in state.connections.values() {
            if !conn.connected {
                continue;
            }
            for (sub_id, dest) in &conn.subscriptions {
                if *dest == destination {
                    let frame = Frame::message(&destination, sub_id, &message_id, body);
                    if conn.outbound.send(frame.encode()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    /// Send a heart-beat EOL to every connection
    pub fn heartbeat(&self) {
        for conn in self.state.lock().connections.values() {
            let _ = conn.outbound.send("\n".to_string());
        }
    }

    /// Send a raw payload (possibly several or broken frames) to every
    /// connected client
    pub fn push_raw(&self, payload: &str) {
        for conn in self.state.lock().connections.values().filter(|c| c.connected) {
            let _ = conn.outbound.send(payload.to_string());
        }
    }

    /// Heart-beat the broker announces in CONNECTED
    pub fn set_heartbeat(&self, heartbeat: &str) {
        self.state.lock().heartbeat = Some(heartbeat.to_string());
    }

    /// Server-side drop of every connection (network loss)
    pub fn drop_all(&self) {
        self.state.lock().connections.clear();
    }

    /// Answer future CONNECTs with an ERROR frame
    pub fn set_reject_connects(&self, reject: bool) {
        self.state.lock().reject_connects = reject;
    }

    /// Connections that completed CONNECT
    pub fn connected_count(&self) -> usize {
        self.state
            .lock()
            .connections
            .values()
            .filter(|c| c.connected)
            .count()
    }

    /// Active subscriptions on a topic, over all connections
    pub fn subscriber_count(&self, topic: &shared::Topic) -> usize {
        let destination = topic.destination();
        self.state
            .lock()
            .connections
            .values()
            .flat_map(|c| c.subscriptions.values())
            .filter(|d| **d == destination)
            .count()
    }

    /// Authorization headers of all CONNECT frames, in order
    pub fn connect_log(&self) -> Vec<Option<String>> {
        self.state.lock().connect_log.clone()
    }

    /// Authorization header of the live connections
    pub fn connected_authorizations(&self) -> Vec<String> {
        self.state
            .lock()
            .connections
            .values()
            .filter(|c| c.connected)
            .filter_map(|c| c.authorization.clone())
            .collect()
    }

    /// Number of client frames with the given command
    pub fn frames_received(&self, command: Command) -> usize {
        self.state
            .lock()
            .frame_log
            .iter()
            .filter(|f| f.command == command)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Topic;

    #[test]
    fn test_connector_host() {
        assert_eq!(
            Connector::websocket("wss://desk.example.com:8443/api/ws").host(),
            "desk.example.com"
        );
        assert_eq!(Connector::Memory(MemoryBroker::new()).host(), "memory");
    }

    #[tokio::test]
    async fn test_memory_broker_round_trip() {
        let broker = MemoryBroker::new();
        let identity = SessionIdentity::new(7, "tok");
        let mut transport = Connector::Memory(broker.clone())
            .connect(&identity)
            .await
            .unwrap();

        transport
            .send(&Frame::connect("memory", &identity.bearer(), "0,0"))
            .await
            .unwrap();
        let frames = transport.recv().await.unwrap().unwrap();
        assert_eq!(frames[0].command, Command::Connected);
        assert_eq!(broker.connect_log(), vec![Some("Bearer tok".to_string())]);

        let topic = Topic::ticket(42);
        transport
            .send(&Frame::subscribe("sub-0", &topic.destination()))
            .await
            .unwrap();
        assert_eq!(broker.subscriber_count(&topic), 1);

        assert_eq!(broker.publish(&topic, &serde_json::json!({"id": 1})), 1);
        let frames = transport.recv().await.unwrap().unwrap();
        assert_eq!(frames[0].command, Command::Message);
        assert_eq!(frames[0].header("subscription"), Some("sub-0"));

        transport.send(&Frame::unsubscribe("sub-0")).await.unwrap();
        assert_eq!(broker.subscriber_count(&topic), 0);
        assert_eq!(broker.publish(&topic, &serde_json::json!({"id": 2})), 0);

        broker.drop_all();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_websocket_transport_handshake_and_close() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let connect = ws.next().await.unwrap().unwrap();
            let frames = Frame::decode_all(connect.to_text().unwrap()).unwrap();
            assert_eq!(frames[0].command, Command::Connect);
            ws.send(Message::Text(Frame::connected("0,0").encode().into()))
                .await
                .unwrap();
            let mut closed = false;
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    closed = true;
                    break;
                }
            }
            (frames[0].header("Authorization").map(str::to_string), closed)
        });

        let identity = SessionIdentity::new(7, "tok");
        let connector = Connector::websocket(format!("ws://{addr}/ws"));
        assert_eq!(connector.host(), "127.0.0.1");
        let mut transport = connector.connect(&identity).await.unwrap();
        transport
            .send(&Frame::connect(&connector.host(), &identity.bearer(), "0,0"))
            .await
            .unwrap();
        let frames = transport.recv().await.unwrap().unwrap();
        assert_eq!(frames[0].command, Command::Connected);
        transport.close().await;

        let (authorization, closed) = server.await.unwrap();
        assert_eq!(authorization.as_deref(), Some("Bearer tok"));
        assert!(closed);
    }
}
