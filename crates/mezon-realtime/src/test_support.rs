//! In-process gateway and helpers shared by unit tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

use crate::adapter::{AuthParams, CloseReason, Endpoint, EnvelopeSink, InboundHandler};
use crate::envelope::{
    Channel, ChannelMessageAck, ChannelMessageSend, Envelope, Payload, Pong, decode_envelope,
    encode_envelope,
};
use crate::error::RealtimeError;

/// Poll `condition` every 10ms for up to three seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A chat send carrying `size` bytes of content.
pub(crate) fn bulky_message(size: usize) -> Envelope {
    Envelope::new(Payload::ChannelMessageSend(ChannelMessageSend {
        content: "x".repeat(size),
        ..Default::default()
    }))
}

pub(crate) fn test_auth() -> AuthParams {
    AuthParams {
        token: "test-token".into(),
        create_status: true,
        lang: "en".into(),
    }
}

/// An endpoint nothing is listening on.
pub(crate) fn unused_endpoint() -> Endpoint {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port, false)
}

/// Accepts TCP connections but never answers the WebSocket upgrade.
pub(crate) async fn spawn_stalled_listener() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Endpoint::new("127.0.0.1", port, false)
}

// ---------------------------------------------------------------------------
// Scripted gateway
// ---------------------------------------------------------------------------

type Received = Arc<Mutex<Vec<(usize, &'static str)>>>;

/// A local WebSocket server. Each accepted connection is handed to the
/// behaviour closure as a [`Peer`].
pub(crate) struct TestServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    uris: Arc<Mutex<Vec<String>>>,
    received: Received,
}

impl TestServer {
    pub(crate) fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.addr.port(), false)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Request URIs seen during upgrades, in accept order.
    pub(crate) fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }

    /// Payload names received on connection `index`.
    pub(crate) fn received_on(&self, index: usize) -> Vec<&'static str> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Server side of one accepted connection.
pub(crate) struct Peer {
    pub(crate) index: usize,
    ws: WebSocketStream<TcpStream>,
    received: Received,
}

impl Peer {
    /// Next decodable envelope from the client, or `None` once it hangs up.
    pub(crate) async fn next_envelope(&mut self) -> Option<Envelope> {
        while let Some(Ok(message)) = self.ws.next().await {
            if let WsMessage::Binary(data) = message
                && let Ok(envelope) = decode_envelope(&data)
            {
                self.received
                    .lock()
                    .unwrap()
                    .push((self.index, envelope.payload_name()));
                return Some(envelope);
            }
        }
        None
    }

    pub(crate) async fn push(&mut self, envelope: &Envelope) {
        self.push_raw(encode_envelope(envelope)).await;
    }

    pub(crate) async fn push_raw(&mut self, data: Vec<u8>) {
        let _ = self.ws.send(WsMessage::Binary(data.into())).await;
    }

    pub(crate) async fn push_text(&mut self, text: &str) {
        let _ = self.ws.send(WsMessage::Text(text.into())).await;
    }

    /// Answer every request until the client hangs up.
    pub(crate) async fn respond_until_closed(mut self) {
        while let Some(request) = self.next_envelope().await {
            if let Some(reply) = reply_for(&request) {
                self.push(&reply).await;
            }
        }
    }

    /// Answer everything except liveness probes.
    pub(crate) async fn respond_except_pings(mut self) {
        while let Some(request) = self.next_envelope().await {
            if matches!(request.payload, Some(Payload::Ping(_))) {
                continue;
            }
            if let Some(reply) = reply_for(&request) {
                self.push(&reply).await;
            }
        }
    }

    /// Read and record requests without ever answering.
    pub(crate) async fn ignore_until_closed(mut self) {
        while self.next_envelope().await.is_some() {}
    }

    /// Keep the connection open but never read from it, so the client's
    /// writes eventually block on a full socket buffer.
    pub(crate) async fn stop_reading(self) {
        let _held = self;
        std::future::pending::<()>().await;
    }
}

/// The response a well-behaved gateway sends for `request`.
pub(crate) fn reply_for(request: &Envelope) -> Option<Envelope> {
    let payload = match request.payload.as_ref()? {
        Payload::Ping(_) => Payload::Pong(Pong {}),
        Payload::ChannelJoin(join) => Payload::Channel(Channel {
            id: join.channel_id.clone(),
            clan_id: join.clan_id.clone(),
            channel_type: join.channel_type,
            presences: Vec::new(),
        }),
        Payload::ChannelMessageSend(send) => Payload::ChannelMessageAck(ChannelMessageAck {
            channel_id: send.channel_id.clone(),
            clan_id: send.clan_id.clone(),
            message_id: format!("m-{}", request.cid),
            persistent: true,
            ..Default::default()
        }),
        other => other.clone(),
    };
    Some(Envelope {
        cid: request.cid.clone(),
        payload: Some(payload),
    })
}

pub(crate) async fn spawn_server<F, Fut>(behavior: F) -> TestServer
where
    F: Fn(Peer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = TestServer {
        addr: listener.local_addr().unwrap(),
        connections: Arc::new(AtomicUsize::new(0)),
        uris: Arc::new(Mutex::new(Vec::new())),
        received: Arc::new(Mutex::new(Vec::new())),
    };

    let connections = Arc::clone(&server.connections);
    let uris = Arc::clone(&server.uris);
    let received = Arc::clone(&server.received);
    let behavior = Arc::new(behavior);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = connections.fetch_add(1, Ordering::SeqCst);
            let uris = Arc::clone(&uris);
            let received = Arc::clone(&received);
            let behavior = Arc::clone(&behavior);
            tokio::spawn(async move {
                let callback = move |request: &Request,
                                     mut response: Response|
                      -> Result<Response, ErrorResponse> {
                    uris.lock().unwrap().push(request.uri().to_string());
                    if let Some(protocol) = request.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                        response
                            .headers_mut()
                            .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
                    }
                    Ok(response)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                behavior(Peer {
                    index,
                    ws,
                    received,
                })
                .await;
            });
        }
    });
    server
}

// ---------------------------------------------------------------------------
// In-memory seams
// ---------------------------------------------------------------------------

/// Records everything an adapter reports.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    envelopes: Mutex<Vec<Envelope>>,
    closes: Mutex<Vec<CloseReason>>,
}

impl RecordingHandler {
    pub(crate) fn envelope_count(&self) -> usize {
        self.envelopes.lock().unwrap().len()
    }

    pub(crate) fn closes(&self) -> Vec<CloseReason> {
        self.closes.lock().unwrap().clone()
    }
}

impl InboundHandler for RecordingHandler {
    fn on_envelope(&self, envelope: Envelope) {
        self.envelopes.lock().unwrap().push(envelope);
    }

    fn on_close(&self, reason: CloseReason) {
        self.closes.lock().unwrap().push(reason);
    }
}

/// Sink that keeps every envelope it is given, or fails every send.
#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<Envelope>>,
    fail_with: Option<RealtimeError>,
}

impl RecordingSink {
    pub(crate) fn failing(err: RealtimeError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(err),
        }
    }

    pub(crate) fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }
}

impl EnvelopeSink for RecordingSink {
    fn send_envelope(&self, envelope: Envelope) -> BoxFuture<'_, Result<(), RealtimeError>> {
        Box::pin(async move {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        })
    }
}
