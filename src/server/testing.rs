//! In-memory transport and helpers for exercising the session core without sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::identity::{Identity, IdentityRegistry};
use crate::server::connection::{ConnectionSession, ServerEvent};
use crate::server::transport::{FrameReader, FrameWriter, TransportError};

const WAIT: Duration = Duration::from_secs(2);

pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>,
}

pub struct MemoryWriter {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

/// The client's side of an in-memory connection.
pub struct ClientEnd {
    to_server: mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>,
    from_server: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        match self.rx.recv().await {
            Some(frame) => frame,
            None => Err(TransportError::Closed { normal: false }),
        }
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write_frame(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed { normal: true });
        }
        self.tx
            .send(frame)
            .map_err(|_| TransportError::Closed { normal: false })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

pub fn duplex() -> (Box<dyn FrameReader>, Box<dyn FrameWriter>, ClientEnd) {
    let (to_server, rx) = mpsc::unbounded_channel();
    let (tx, from_server) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        Box::new(MemoryReader { rx }),
        Box::new(MemoryWriter { tx, closed: Arc::clone(&closed) }),
        ClientEnd { to_server, from_server, closed },
    )
}

/// Build a client envelope signed with `identity`.
pub fn envelope(kind: &str, identity: &Identity, content: Option<Value>) -> Value {
    let mut value = json!({
        "type": kind,
        "identity": {"id": identity.id, "secret": identity.secret},
    });
    if let Some(content) = content {
        value["content"] = content;
    }
    value
}

/// Receive from a channel, failing the test if nothing shows up in time.
pub async fn recv_within<T>(rx: &mut mpsc::Receiver<T>) -> Option<T> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for channel event")
}

impl ClientEnd {
    pub fn send_raw(&self, frame: Vec<u8>) {
        let _ = self.to_server.send(Ok(frame));
    }

    pub fn send_json(&self, value: Value) {
        self.send_raw(serde_json::to_vec(&value).expect("serializable"));
    }

    pub fn close(&self, normal: bool) {
        let _ = self.to_server.send(Err(TransportError::Closed { normal }));
    }

    pub fn is_closed_by_server(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn recv_json(&mut self) -> Value {
        let frame = tokio::time::timeout(WAIT, self.from_server.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("server side dropped");
        serde_json::from_slice(&frame).expect("server sent json")
    }

    /// Skip messages until one of type `kind` arrives.
    pub async fn expect_type(&mut self, kind: &str) -> Value {
        loop {
            let msg = self.recv_json().await;
            if msg["type"] == kind {
                return msg;
            }
        }
    }

    /// Assert that nothing is pending right now, after letting other tasks run.
    pub async fn expect_silence(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Ok(frame) = self.from_server.try_recv() {
            panic!("unexpected message: {}", String::from_utf8_lossy(&frame));
        }
    }
}

/// A registered player whose read loop is already running.
pub struct TestPlayer {
    pub session: Arc<ConnectionSession>,
    pub identity: Identity,
    pub client: ClientEnd,
    pub server_rx: mpsc::Receiver<ServerEvent>,
    pub listener: JoinHandle<()>,
}

impl TestPlayer {
    pub fn id(&self) -> String {
        self.identity.id.clone()
    }

    /// Send an envelope signed with this player's identity.
    pub fn send(&self, kind: &str, content: Option<Value>) {
        self.client.send_json(envelope(kind, &self.identity, content));
    }

    pub fn send_move(&self, row: i64, col: i64) {
        self.send("move", Some(json!({"row": row, "col": col, "mark": "?"})));
    }
}

pub fn spawn_player(registry: &Arc<IdentityRegistry>) -> TestPlayer {
    let identity = registry.register().expect("register");
    let (reader, writer, client) = duplex();
    let (session, inbound, server_rx) =
        ConnectionSession::new(identity.clone(), writer, CancellationToken::new());
    let listener = tokio::spawn(Arc::clone(&session).listen(reader, inbound, Arc::clone(registry)));
    TestPlayer { session, identity, client, server_rx, listener }
}
