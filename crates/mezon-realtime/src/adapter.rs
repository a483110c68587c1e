//! WebSocket connection adapter.
//!
//! Owns at most one socket at a time. Frames are decoded on a background
//! read task and handed to an [`InboundHandler`]; closure is reported exactly
//! once per connection through the same handler. State changes are broadcast
//! via a [`watch`] channel so heartbeat and reconnect logic can react without
//! polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::envelope::{Envelope, SUBPROTOCOL, WIRE_FORMAT, decode_envelope, encode_envelope};
use crate::error::RealtimeError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;

/// How long a closing connection may spend flushing its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; a connect may be started.
    Disconnected,
    /// WebSocket handshake in flight.
    Connecting,
    /// Socket open, frames may be sent.
    Connected,
    /// A close has been requested and the read task is winding down.
    Closing,
    /// Closed on purpose. Only an explicit connect leaves this state.
    Closed,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The local side asked for the close.
    Intentional,
    /// The socket failed, the server went away, or liveness was lost.
    Lost,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Multiple subscribers can observe state transitions without polling.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_replace(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    /// Atomically claim the right to connect.
    ///
    /// Returns `Ok(true)` when the caller now owns the `Connecting` state,
    /// `Ok(false)` when a connection is already open, and
    /// [`RealtimeError::AlreadyConnecting`] when another attempt is in flight.
    pub fn begin_connect(&self) -> Result<bool, RealtimeError> {
        let mut outcome = Ok(false);
        self.tx.send_if_modified(|state| match *state {
            ConnectionState::Connecting => {
                outcome = Err(RealtimeError::AlreadyConnecting);
                false
            }
            ConnectionState::Connected => false,
            _ => {
                *state = ConnectionState::Connecting;
                outcome = Ok(true);
                true
            }
        });
        outcome
    }

    /// Move to `to` only if the current state is one of `from`.
    pub fn replace_if(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        self.tx.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Endpoint and auth
// ---------------------------------------------------------------------------

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Gateway host name.
    pub host: String,
    /// Gateway port.
    pub port: u16,
    /// Use `wss://` instead of `ws://`.
    pub use_ssl: bool,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16, use_ssl: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_ssl,
        }
    }

    /// URL scheme for this endpoint.
    pub fn scheme(&self) -> &'static str {
        if self.use_ssl { "wss" } else { "ws" }
    }
}

/// Credentials and connect options carried on the connect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthParams {
    /// Session bearer token.
    pub token: String,
    /// Mark the user online on connect.
    pub create_status: bool,
    /// Preferred language.
    pub lang: String,
}

/// Build the gateway URL: `/ws` with language, status, token and wire format
/// as query parameters.
pub fn connect_url(endpoint: &Endpoint, auth: &AuthParams) -> Result<Url, RealtimeError> {
    let base = format!("{}://{}:{}/ws", endpoint.scheme(), endpoint.host, endpoint.port);
    let mut url = Url::parse(&base)
        .map_err(|e| RealtimeError::Transport(format!("invalid endpoint {base}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("lang", &auth.lang)
        .append_pair("status", if auth.create_status { "true" } else { "false" })
        .append_pair("token", &auth.token)
        .append_pair("format", WIRE_FORMAT);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Receives everything the adapter reads off the socket.
///
/// Installed once at construction. Implementations must not block: they run
/// on the read task.
pub trait InboundHandler: Send + Sync {
    /// A binary frame decoded into an envelope.
    fn on_envelope(&self, envelope: Envelope);

    /// The connection ended. Called exactly once per established connection,
    /// after the state has moved to `Disconnected` or `Closed`.
    fn on_close(&self, reason: CloseReason);
}

/// Something that can put an envelope on the wire.
pub trait EnvelopeSink: Send + Sync {
    /// Encode and transmit one envelope.
    fn send_envelope(&self, envelope: Envelope) -> BoxFuture<'_, Result<(), RealtimeError>>;
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// The read task and its stop signal for the current socket.
struct ActiveConnection {
    shutdown_tx: watch::Sender<Option<CloseReason>>,
    reader: JoinHandle<()>,
}

/// Everything the read task needs, detached from the adapter itself.
struct ReadContext {
    id: u64,
    generation: Arc<AtomicU64>,
    state: Arc<ConnectionStateWatch>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    writes: CancellationToken,
    handler: Arc<dyn InboundHandler>,
}

/// Wraps one WebSocket connection to the gateway.
pub struct WebSocketAdapter {
    state: Arc<ConnectionStateWatch>,
    /// Writer half of the current socket, shared with the read task so it can
    /// send the close frame.
    writer: Arc<Mutex<Option<WsWriter>>>,
    /// Bumped on every established connection. Lets a stale read task tell it
    /// has been superseded.
    generation: Arc<AtomicU64>,
    /// Cancelled when the current connection starts closing. Aborts writes
    /// stuck behind a peer that stopped reading.
    writes: StdMutex<CancellationToken>,
    active: StdMutex<Option<ActiveConnection>>,
    handler: Arc<dyn InboundHandler>,
}

impl WebSocketAdapter {
    /// Create a disconnected adapter delivering inbound traffic to `handler`.
    pub fn new(handler: Arc<dyn InboundHandler>) -> Self {
        Self {
            state: Arc::new(ConnectionStateWatch::new()),
            writer: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            writes: StdMutex::new(CancellationToken::new()),
            active: StdMutex::new(None),
            handler,
        }
    }

    /// Return the connection state watch.
    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Whether frames can currently be sent.
    pub fn is_open(&self) -> bool {
        self.state.current() == ConnectionState::Connected
    }

    /// Open the socket.
    ///
    /// A no-op when already connected. Fails with
    /// [`RealtimeError::AlreadyConnecting`] if another attempt is in flight and
    /// with [`RealtimeError::ConnectTimeout`] if the handshake does not finish
    /// within `timeout`.
    pub async fn connect(
        &self,
        endpoint: &Endpoint,
        auth: &AuthParams,
        timeout: Duration,
    ) -> Result<(), RealtimeError> {
        if !self.state.begin_connect()? {
            tracing::debug!("Connect requested while already connected");
            return Ok(());
        }

        match self.open(endpoint, auth, timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state
                    .replace_if(&[ConnectionState::Connecting], ConnectionState::Disconnected);
                tracing::warn!(host = %endpoint.host, port = endpoint.port, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    async fn open(
        &self,
        endpoint: &Endpoint,
        auth: &AuthParams,
        timeout: Duration,
    ) -> Result<(), RealtimeError> {
        let url = connect_url(endpoint, auth)?;
        if endpoint.use_ssl {
            // Fails harmlessly when a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }

        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        tracing::info!(
            host = %endpoint.host,
            port = endpoint.port,
            tls = endpoint.use_ssl,
            "Opening realtime connection"
        );
        let (stream, _response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| RealtimeError::ConnectTimeout(timeout))??;

        let (sink, source) = stream.split();
        let writes = CancellationToken::new();
        let id = {
            let mut writer = self.writer.lock().await;
            *writer = Some(sink);
            *self.writes.lock().unwrap_or_else(PoisonError::into_inner) = writes.clone();
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let ctx = ReadContext {
            id,
            generation: Arc::clone(&self.generation),
            state: Arc::clone(&self.state),
            writer: Arc::clone(&self.writer),
            writes: writes.clone(),
            handler: Arc::clone(&self.handler),
        };

        let established = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if self
                .state
                .replace_if(&[ConnectionState::Connecting], ConnectionState::Connected)
            {
                let reader = tokio::spawn(read_loop(source, ctx, shutdown_rx));
                *active = Some(ActiveConnection {
                    shutdown_tx,
                    reader,
                });
                true
            } else {
                false
            }
        };

        if !established {
            // Closed while the handshake was in flight.
            writes.cancel();
            let sink = {
                let mut writer = self.writer.lock().await;
                if self.generation.load(Ordering::SeqCst) == id {
                    writer.take()
                } else {
                    None
                }
            };
            if let Some(mut sink) = sink {
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
            }
            return Err(RealtimeError::Transport(
                "connection closed while connecting".into(),
            ));
        }

        tracing::info!(generation = id, "Realtime connection established");
        Ok(())
    }

    /// Encode and transmit one envelope.
    ///
    /// A write still pending when the connection starts closing is abandoned
    /// with [`RealtimeError::ConnectionLost`].
    pub async fn send(&self, envelope: &Envelope) -> Result<(), RealtimeError> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        let writes = self
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let frame = WsMessage::Binary(encode_envelope(envelope).into());

        let mut writer = tokio::select! {
            writer = self.writer.lock() => writer,
            _ = writes.cancelled() => return Err(RealtimeError::ConnectionLost),
        };
        let sink = writer.as_mut().ok_or(RealtimeError::NotConnected)?;
        tokio::select! {
            sent = sink.send(frame) => sent?,
            _ = writes.cancelled() => {
                tracing::debug!("Abandoning write on closing connection");
                return Err(RealtimeError::ConnectionLost);
            }
        }
        tracing::trace!(cid = %envelope.cid, payload = envelope.payload_name(), "Sent frame");
        Ok(())
    }

    /// Close the connection on purpose. Idempotent; always ends in
    /// [`ConnectionState::Closed`].
    pub async fn close(&self) {
        self.close_with(CloseReason::Intentional).await;
    }

    /// Close the connection, reporting `reason` to the inbound handler.
    ///
    /// Returns once the read task has finished.
    pub async fn close_with(&self, reason: CloseReason) {
        let active = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            self.state
                .replace_if(&[ConnectionState::Connected], ConnectionState::Closing);
            active.take()
        };

        if let Some(active) = active {
            let _ = active.shutdown_tx.send(Some(reason));
            let _ = active.reader.await;
        }

        if reason == CloseReason::Intentional {
            self.state.replace_if(
                &[
                    ConnectionState::Disconnected,
                    ConnectionState::Connecting,
                    ConnectionState::Closing,
                ],
                ConnectionState::Closed,
            );
        }
    }

    /// Signal the read task to close without waiting for it to finish.
    pub fn request_close(&self, reason: CloseReason) {
        let active = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            self.state
                .replace_if(&[ConnectionState::Connected], ConnectionState::Closing);
            active.take()
        };
        if let Some(active) = active {
            let _ = active.shutdown_tx.send(Some(reason));
        }
    }
}

impl EnvelopeSink for WebSocketAdapter {
    fn send_envelope(&self, envelope: Envelope) -> BoxFuture<'_, Result<(), RealtimeError>> {
        Box::pin(async move { self.send(&envelope).await })
    }
}

/// Read frames until the socket ends or a close is requested.
async fn read_loop(
    mut reader: WsReader,
    ctx: ReadContext,
    mut shutdown_rx: watch::Receiver<Option<CloseReason>>,
) {
    let reason = loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(WsMessage::Binary(data))) => match decode_envelope(&data) {
                    Ok(envelope) => ctx.handler.on_envelope(envelope),
                    Err(e) => {
                        tracing::warn!(error = %e, len = data.len(), "Dropping undecodable frame");
                    }
                },
                Some(Ok(WsMessage::Text(_))) => tracing::trace!("Ignoring text frame"),
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::debug!(?frame, "Server closed the connection");
                    break CloseReason::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Realtime socket failed");
                    break CloseReason::Lost;
                }
                None => break CloseReason::Lost,
            },
            changed = shutdown_rx.changed() => {
                let requested = *shutdown_rx.borrow();
                if let Some(reason) = requested {
                    break reason;
                }
                if changed.is_err() {
                    break CloseReason::Lost;
                }
            }
        }
    };
    // A close requested while the socket was failing keeps its reason.
    let requested: Option<CloseReason> = *shutdown_rx.borrow();
    let reason = requested.unwrap_or(reason);
    ctx.writes.cancel();

    let sink = {
        let mut writer = ctx.writer.lock().await;
        if ctx.generation.load(Ordering::SeqCst) == ctx.id {
            writer.take()
        } else {
            None
        }
    };
    let Some(mut sink) = sink else {
        tracing::debug!(generation = ctx.id, "Superseded connection finished");
        return;
    };
    let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
    drop(reader);

    let target = match reason {
        CloseReason::Intentional => ConnectionState::Closed,
        CloseReason::Lost => ConnectionState::Disconnected,
    };
    ctx.state.replace_if(
        &[ConnectionState::Connected, ConnectionState::Closing],
        target,
    );
    tracing::info!(generation = ctx.id, ?reason, "Realtime connection closed");
    ctx.handler.on_close(reason);
}
