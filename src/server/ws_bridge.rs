/// WebSocket bridge between actix and the session core.
///
/// Each upgraded connection gets one [`WsBridge`] actor. Inbound frames are pushed into a
/// bounded channel read by [`WsReader`]; the actor waits on every push, so a slow consumer
/// stalls the socket instead of buffering without limit. Outbound frames arrive as actor
/// messages sent by [`WsWriter`].
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use actix::prelude::*;
use actix_web::{http::StatusCode, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::config::matchmaking::CHANNEL_CAPACITY;
use crate::server::handshake;
use crate::server::state::AppState;
use crate::server::transport::{FrameReader, FrameWriter, TransportError};
use crate::server::ws_error::http_error_response;

type Inbound = Result<Vec<u8>, TransportError>;

pub struct WsBridge {
    inbound: mpsc::Sender<Inbound>,
}

impl WsBridge {
    pub fn new(inbound: mpsc::Sender<Inbound>) -> Self {
        Self { inbound }
    }

    /// Hand a frame to the reader, pausing the actor until there is room.
    fn forward(&self, frame: Vec<u8>, ctx: &mut ws::WebsocketContext<Self>) {
        let tx = self.inbound.clone();
        ctx.wait(
            async move {
                if tx.send(Ok(frame)).await.is_err() {
                    debug!("[WsBridge] Reader gone, dropping frame");
                }
            }
            .into_actor(self),
        );
    }

    /// Report the end of the stream. Dropping the actor also ends it, as an abnormal close.
    /// Returns whether the reason reached the reader.
    fn finish(&self, reason: TransportError) -> bool {
        match self.inbound.try_send(Err(reason)) {
            Ok(()) => true,
            Err(e) => {
                debug!("[WsBridge] Close reason not delivered: {}", e);
                false
            }
        }
    }
}

impl Actor for WsBridge {
    type Context = ws::WebsocketContext<Self>;
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsBridge {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.forward(text.as_bytes().to_vec(), ctx),
            Ok(ws::Message::Binary(bin)) => self.forward(bin.to_vec(), ctx),
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Pong(_)) | Ok(ws::Message::Nop) => (),
            Ok(ws::Message::Continuation(_)) => {
                warn!("[WsBridge] Fragmented frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                self.finish(TransportError::Closed { normal: true });
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("[WsBridge] Protocol error: {}", e);
                self.finish(TransportError::Protocol(e.to_string()));
                ctx.stop();
            }
        }
    }
}

/// Frame to deliver to the client.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub Vec<u8>);

impl Handler<OutboundFrame> for WsBridge {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        match String::from_utf8(msg.0) {
            Ok(text) => ctx.text(text),
            Err(e) => ctx.binary(e.into_bytes()),
        }
    }
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct CloseConnection;

impl Handler<CloseConnection> for WsBridge {
    type Result = ();

    fn handle(&mut self, _: CloseConnection, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Normal,
            description: None,
        }));
        ctx.stop();
    }
}

pub struct WsReader {
    rx: mpsc::Receiver<Inbound>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        self.rx
            .recv()
            .await
            .unwrap_or(Err(TransportError::Closed { normal: false }))
    }
}

pub struct WsWriter {
    addr: Addr<WsBridge>,
    closed: AtomicBool,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_frame(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed { normal: true });
        }
        self.addr
            .send(OutboundFrame(frame))
            .await
            .map_err(|_| TransportError::Closed { normal: false })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.addr.do_send(CloseConnection);
        }
    }
}

/// `GET /ws`: upgrade, then run the handshake in the background.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let router = Arc::clone(&state.router);
    if router.supervisor().is_shutting_down() {
        return Ok(http_error_response(
            "SHUTTING_DOWN",
            "Server is shutting down",
            StatusCode::SERVICE_UNAVAILABLE,
        ));
    }

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (addr, response) = ws::WsResponseBuilder::new(WsBridge::new(tx), &req, stream).start_with_addr()?;
    let reader = Box::new(WsReader { rx });
    let writer = Box::new(WsWriter { addr, closed: AtomicBool::new(false) });

    let supervisor = router.supervisor().clone();
    supervisor.spawn(async move {
        if let Err(e) = handshake::accept(&router, reader, writer).await {
            debug!("[WsBridge] Connection dropped during handshake: {}", e);
        }
    });
    Ok(response)
}
