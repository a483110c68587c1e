//! Realtime client: one gateway connection with request correlation,
//! liveness probing, automatic reconnect, rate-limited sends and event
//! subscriptions.
//!
//! [`RealtimeClient`] owns every component. Components that must call back
//! into the client (inbound frames, connection loss, reconnect attempts)
//! receive a weak link, so ownership only flows downward.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mezon_config::Config;

use crate::adapter::{CloseReason, ConnectionState, Endpoint, InboundHandler, WebSocketAdapter};
use crate::correlation::CorrelationTable;
use crate::dispatch::DispatchQueue;
use crate::envelope::{
    Channel, ChannelJoin, ChannelLeave, ChannelMessageAck, ChannelMessageSend, ClanJoin, Envelope,
    Payload,
};
use crate::error::RealtimeError;
use crate::heartbeat::{FailureHook, HeartbeatConfig, HeartbeatMonitor, HeartbeatState};
use crate::rate_limit::TokenBucket;
use crate::reconnection::{ReconnectConfig, ReconnectController, ReconnectState, Reconnector};
use crate::router::{EventHandler, EventKind, EventRouter, SubscriptionId};
use crate::session::Session;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime settings for a [`RealtimeClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway used when the session carries no API URL.
    pub endpoint: Endpoint,
    /// Language tag sent on the connect URL.
    pub lang: String,
    /// Ask the server to publish this user's online status.
    pub create_status: bool,
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Default deadline for correlated requests.
    pub send_timeout: Duration,
    /// Ping cadence and failure threshold.
    pub heartbeat: HeartbeatConfig,
    /// Backoff for automatic reconnects.
    pub reconnect: ReconnectConfig,
    /// Sends allowed per `rate_limit_period`.
    pub rate_limit_capacity: u32,
    /// Window over which `rate_limit_capacity` refills.
    pub rate_limit_period: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        let connection = &config.connection;
        let heartbeat = &config.heartbeat;
        let reconnect = &config.reconnect;
        Self {
            endpoint: Endpoint::new(connection.host.clone(), connection.port, connection.use_ssl),
            lang: connection.lang.clone(),
            create_status: connection.create_status,
            connect_timeout: Duration::from_millis(connection.connect_timeout_ms),
            send_timeout: Duration::from_millis(connection.send_timeout_ms),
            heartbeat: HeartbeatConfig {
                interval: Duration::from_millis(heartbeat.interval_ms),
                timeout: Duration::from_millis(heartbeat.timeout_ms),
                max_consecutive_failures: heartbeat.max_consecutive_failures,
            },
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(reconnect.initial_delay_ms),
                backoff_multiplier: reconnect.backoff_multiplier,
                max_delay: Duration::from_millis(reconnect.max_delay_ms),
                max_attempts: reconnect.max_attempts,
                jitter: reconnect.jitter,
            },
            rate_limit_capacity: config.rate_limit.capacity,
            rate_limit_period: Duration::from_millis(config.rate_limit.refill_interval_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Client internals
// ---------------------------------------------------------------------------

type DisconnectHook = Arc<dyn Fn(CloseReason) + Send + Sync>;
type TimeoutHook = Arc<dyn Fn() + Send + Sync>;

/// A join re-issued after every automatic reconnect.
#[derive(Debug, Clone, PartialEq)]
enum ScopedJoin {
    Clan(ClanJoin),
    Channel(ChannelJoin),
}

impl ScopedJoin {
    fn payload(&self) -> Payload {
        match self {
            Self::Clan(join) => Payload::ClanJoin(join.clone()),
            Self::Channel(join) => Payload::ChannelJoin(join.clone()),
        }
    }
}

struct ClientInner {
    config: ClientConfig,
    adapter: Arc<WebSocketAdapter>,
    correlation: Arc<CorrelationTable>,
    router: EventRouter,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectController,
    queue: DispatchQueue,
    session: Mutex<Option<Session>>,
    joins: Mutex<Vec<ScopedJoin>>,
    disconnect_hooks: RwLock<Vec<DisconnectHook>>,
    timeout_hooks: RwLock<Vec<TimeoutHook>>,
}

impl ClientInner {
    /// Open the socket for the stored session and start probing it.
    async fn open(self: &Arc<Self>) -> Result<(), RealtimeError> {
        let (endpoint, auth) = {
            let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let session = session.as_ref().ok_or(RealtimeError::NotConnected)?;
            let endpoint = session
                .endpoint()
                .unwrap_or_else(|| self.config.endpoint.clone());
            let auth = session.auth_params(&self.config.lang, self.config.create_status);
            (endpoint, auth)
        };

        self.adapter
            .connect(&endpoint, &auth, self.config.connect_timeout)
            .await?;
        self.start_heartbeat();
        Ok(())
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let link = Arc::downgrade(self);
        let on_failure: FailureHook = Arc::new(move || {
            let link = link.clone();
            async move {
                if let Some(inner) = link.upgrade() {
                    inner.heartbeat_timed_out().await;
                }
            }
            .boxed()
        });
        self.heartbeat
            .start(self.adapter.state().subscribe(), on_failure);
    }

    async fn heartbeat_timed_out(&self) {
        tracing::warn!("Heartbeat timed out, dropping connection");
        let hooks = self
            .timeout_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if panic::catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                tracing::error!("Heartbeat timeout hook panicked");
            }
        }
        self.adapter.close_with(CloseReason::Lost).await;
    }

    /// Tear down per-connection state after the adapter reports a close.
    fn connection_closed(&self, reason: CloseReason) {
        self.heartbeat.stop();
        let failed = self.correlation.fail_all(RealtimeError::ConnectionLost);
        if failed > 0 {
            tracing::info!(failed, "Failed outstanding requests after disconnect");
        }

        let hooks = self
            .disconnect_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(reason))).is_err() {
                tracing::error!("Disconnect hook panicked");
            }
        }

        self.reconnect.on_close(reason);
    }

    /// Send `payload` through the dispatch queue and wait for its response.
    ///
    /// The deadline starts once the request is on the wire, not while it
    /// waits for a rate-limit token.
    async fn request(&self, payload: Payload, timeout: Duration) -> Result<Payload, RealtimeError> {
        let correlation = Arc::clone(&self.correlation);
        let handle = self
            .queue
            .enqueue(move || async move { correlation.send(payload, timeout).await })?
            .wait()
            .await?;
        handle.wait().await
    }

    fn remember(&self, join: ScopedJoin) {
        let mut joins = self.joins.lock().unwrap_or_else(PoisonError::into_inner);
        if !joins.contains(&join) {
            joins.push(join);
        }
    }

    fn forget_channel(&self, clan_id: &str, channel_id: &str) {
        self.joins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|join| {
                !matches!(join, ScopedJoin::Channel(j) if j.clan_id == clan_id && j.channel_id == channel_id)
            });
    }

    async fn restore_joins(&self) {
        let joins = self
            .joins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if joins.is_empty() {
            return;
        }
        tracing::info!(count = joins.len(), "Restoring joins after reconnect");
        for join in joins {
            if let Err(e) = self.request(join.payload(), self.config.send_timeout).await {
                tracing::warn!(?join, error = %e, "Failed to restore join");
            }
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.reconnect.disable();
        self.heartbeat.stop();
        self.adapter.request_close(CloseReason::Intentional);
    }
}

/// Weak handle given to components that call back into the client.
struct ClientLink {
    inner: Weak<ClientInner>,
}

impl InboundHandler for ClientLink {
    fn on_envelope(&self, envelope: Envelope) {
        if let Some(inner) = self.inner.upgrade() {
            inner.router.route(envelope);
        }
    }

    fn on_close(&self, reason: CloseReason) {
        if let Some(inner) = self.inner.upgrade() {
            inner.connection_closed(reason);
        }
    }
}

impl Reconnector for ClientLink {
    fn reconnect(&self) -> BoxFuture<'_, Result<(), RealtimeError>> {
        Box::pin(async move {
            let inner = self.inner.upgrade().ok_or(RealtimeError::Cancelled)?;
            inner.open().await?;
            if inner.reconnect.state() == ReconnectState::Disabled {
                // Closed on purpose while the attempt was in flight.
                inner.adapter.close().await;
                return Err(RealtimeError::Cancelled);
            }
            inner.restore_joins().await;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.adapter.is_open())
    }
}

// ---------------------------------------------------------------------------
// Public client
// ---------------------------------------------------------------------------

/// Client for the Mezon realtime gateway.
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl RealtimeClient {
    /// Create a disconnected client.
    pub fn new(config: ClientConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let adapter = Arc::new(WebSocketAdapter::new(Arc::new(ClientLink {
                inner: weak.clone(),
            })));
            let correlation = Arc::new(CorrelationTable::new(adapter.clone()));
            let limiter = TokenBucket::new(config.rate_limit_capacity, config.rate_limit_period);
            ClientInner {
                router: EventRouter::new(Arc::clone(&correlation)),
                heartbeat: HeartbeatMonitor::new(config.heartbeat.clone(), Arc::clone(&correlation)),
                reconnect: ReconnectController::new(
                    config.reconnect.clone(),
                    Arc::new(ClientLink {
                        inner: weak.clone(),
                    }),
                ),
                queue: DispatchQueue::new(limiter),
                adapter,
                correlation,
                session: Mutex::new(None),
                joins: Mutex::new(Vec::new()),
                disconnect_hooks: RwLock::new(Vec::new()),
                timeout_hooks: RwLock::new(Vec::new()),
                config,
            }
        });
        Self { inner }
    }

    /// Connect with `session`. Re-enables automatic reconnect after an
    /// intentional close. A no-op if already connected.
    pub async fn connect(&self, session: Session) -> Result<(), RealtimeError> {
        *self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.inner.reconnect.arm();
        self.inner.open().await
    }

    /// Close the connection. An intentional close disables automatic
    /// reconnect until the next [`connect`](Self::connect); otherwise the
    /// close is treated as a loss and a reconnect is scheduled.
    pub async fn close(&self, intentional: bool) {
        let reason = if intentional {
            self.inner.reconnect.disable();
            CloseReason::Intentional
        } else {
            CloseReason::Lost
        };
        self.inner.heartbeat.stop();
        self.inner.adapter.close_with(reason).await;
    }

    /// Close on purpose, then finish queued sends and stop the dispatch
    /// worker.
    pub async fn shutdown(&self) {
        self.close(true).await;
        self.inner.queue.shutdown().await;
    }

    /// Whether frames can be sent right now.
    pub fn is_connected(&self) -> bool {
        self.inner.adapter.is_open()
    }

    /// Current state of the gateway socket.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.adapter.state().current()
    }

    /// Where the automatic reconnect cycle stands.
    pub fn reconnect_state(&self) -> ReconnectState {
        self.inner.reconnect.state()
    }

    /// Phase of the heartbeat cycle.
    pub fn heartbeat_state(&self) -> HeartbeatState {
        self.inner.heartbeat.state()
    }

    /// Round-trip time of the last answered liveness probe.
    pub fn last_heartbeat_rtt(&self) -> Option<Duration> {
        self.inner.heartbeat.last_rtt()
    }

    /// Requests sent and still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlation.len()
    }

    /// Sends waiting for, or holding, a rate-limit token.
    pub fn queued_sends(&self) -> usize {
        self.inner.queue.len()
    }

    /// Send a correlated request with the configured default timeout.
    pub async fn send(&self, payload: Payload) -> Result<Payload, RealtimeError> {
        self.inner.request(payload, self.inner.config.send_timeout).await
    }

    /// Send a correlated request and wait up to `timeout` for its response.
    pub async fn send_with_timeout(
        &self,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload, RealtimeError> {
        self.inner.request(payload, timeout).await
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<H: EventHandler + 'static>(&self, kind: EventKind, handler: H) -> SubscriptionId {
        self.inner.router.subscriptions().subscribe(kind, handler)
    }

    /// Register `handler` by event name, e.g. `"channel_message"`. Returns
    /// `None` for names that are not events.
    pub fn on<H: EventHandler + 'static>(&self, name: &str, handler: H) -> Option<SubscriptionId> {
        let kind = EventKind::from_name(name)?;
        Some(self.subscribe(kind, handler))
    }

    /// Remove a registration. Returns whether it existed.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.inner.router.subscriptions().unsubscribe(kind, id)
    }

    /// Call `hook` whenever the connection ends.
    pub fn on_disconnect(&self, hook: impl Fn(CloseReason) + Send + Sync + 'static) {
        self.inner
            .disconnect_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Call `hook` when liveness probing gives up on the connection.
    pub fn on_heartbeat_timeout(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner
            .timeout_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Join a clan's event stream. Re-issued after every reconnect.
    pub async fn join_clan_chat(&self, clan_id: &str) -> Result<(), RealtimeError> {
        let join = ClanJoin {
            clan_id: clan_id.to_owned(),
        };
        self.send(Payload::ClanJoin(join.clone())).await?;
        self.inner.remember(ScopedJoin::Clan(join));
        Ok(())
    }

    /// Join a channel. Re-issued after every reconnect until left.
    pub async fn join_chat(
        &self,
        clan_id: &str,
        channel_id: &str,
        channel_type: i32,
        is_public: bool,
    ) -> Result<Channel, RealtimeError> {
        let join = ChannelJoin {
            clan_id: clan_id.to_owned(),
            channel_id: channel_id.to_owned(),
            channel_type,
            is_public,
        };
        match self.send(Payload::ChannelJoin(join.clone())).await? {
            Payload::Channel(channel) => {
                self.inner.remember(ScopedJoin::Channel(join));
                Ok(channel)
            }
            other => Err(RealtimeError::UnexpectedResponse(other.name().to_owned())),
        }
    }

    /// Leave a channel and stop restoring its join.
    pub async fn leave_chat(
        &self,
        clan_id: &str,
        channel_id: &str,
        channel_type: i32,
        is_public: bool,
    ) -> Result<(), RealtimeError> {
        self.inner.forget_channel(clan_id, channel_id);
        let leave = ChannelLeave {
            clan_id: clan_id.to_owned(),
            channel_id: channel_id.to_owned(),
            channel_type,
            is_public,
        };
        self.send(Payload::ChannelLeave(leave)).await?;
        Ok(())
    }

    /// Post a chat message and return the server's acknowledgement.
    pub async fn write_chat_message(
        &self,
        message: ChannelMessageSend,
    ) -> Result<ChannelMessageAck, RealtimeError> {
        match self.send(Payload::ChannelMessageSend(message)).await? {
            Payload::ChannelMessageAck(ack) => Ok(ack),
            other => Err(RealtimeError::UnexpectedResponse(other.name().to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::envelope::{ChannelMessage, Ping};
    use crate::router::HandlerError;
    use crate::test_support::{Peer, TestServer, eventually, reply_for, spawn_server};

    fn test_config() -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(60),
                ..HeartbeatConfig::default()
            },
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(200),
                jitter: 0.0,
                ..ReconnectConfig::default()
            },
            rate_limit_capacity: 100,
            ..ClientConfig::default()
        }
    }

    fn session_for(server: &TestServer) -> Session {
        Session::new("test-token")
            .with_api_url(format!("http://127.0.0.1:{}", server.endpoint().port))
    }

    fn chat_message(content: &str) -> ChannelMessageSend {
        ChannelMessageSend {
            clan_id: "clan-1".into(),
            channel_id: "chan-1".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_config_from_runtime_config() {
        let config = ClientConfig::from(&Config::default());
        assert_eq!(config.endpoint, Endpoint::new("gw.mezon.ai", 443, true));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.send_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat.interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, None);
        assert_eq!(config.rate_limit_capacity, 5);
        assert_eq!(config.rate_limit_period, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_chat_message_round_trips() {
        let server = spawn_server(|peer| peer.respond_until_closed()).await;
        let client = RealtimeClient::new(test_config());
        client.connect(session_for(&server)).await.unwrap();

        let ack = client.write_chat_message(chat_message("hello")).await.unwrap();
        assert!(ack.message_id.starts_with("m-"), "got {}", ack.message_id);
        assert_eq!(ack.channel_id, "chan-1");
        assert_eq!(client.pending_requests(), 0);

        let uri = &server.uris()[0];
        assert!(uri.contains("token=test-token"), "uri was {uri}");
        assert!(uri.contains("format=protobuf"), "uri was {uri}");
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let client = RealtimeClient::new(test_config());
        let result = client.send(Payload::Ping(Ping {})).await;
        assert_eq!(result, Err(RealtimeError::NotConnected));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_request_times_out_against_silent_gateway() {
        let server = spawn_server(|peer| peer.ignore_until_closed()).await;
        let client = RealtimeClient::new(test_config());
        client.connect(session_for(&server)).await.unwrap();

        let result = client
            .send_with_timeout(Payload::Ping(Ping {}), Duration::from_millis(50))
            .await;
        assert!(
            matches!(result, Err(RealtimeError::RequestTimeout { .. })),
            "got {result:?}"
        );
        assert_eq!(client.pending_requests(), 0);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let server = spawn_server(|mut peer: Peer| async move {
            let event = Envelope::new(Payload::ChannelMessage(ChannelMessage {
                channel_id: "chan-1".into(),
                content: "hi".into(),
                ..Default::default()
            }));
            peer.push(&event).await;
            peer.respond_until_closed().await;
        })
        .await;

        let client = RealtimeClient::new(test_config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = client.on("channel_message", move |event: &Payload| -> Result<(), HandlerError> {
            if let Payload::ChannelMessage(message) = event {
                sink.lock().unwrap().push(message.content.clone());
            }
            Ok(())
        });
        assert!(id.is_some());
        assert!(client.on("not_an_event", |_: &Payload| -> Result<(), HandlerError> { Ok(()) }).is_none());

        client.connect(session_for(&server)).await.unwrap();
        assert!(eventually(|| seen.lock().unwrap().len() == 1).await);
        assert_eq!(seen.lock().unwrap()[0], "hi");
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_server_drop_fails_pending_requests() {
        let server = spawn_server(|mut peer: Peer| async move {
            if peer.index == 0 {
                let _ = peer.next_envelope().await;
            } else {
                peer.respond_until_closed().await;
            }
        })
        .await;

        let client = RealtimeClient::new(test_config());
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        client.on_disconnect(move |reason| sink.lock().unwrap().push(reason));
        client.connect(session_for(&server)).await.unwrap();

        let result = client
            .send_with_timeout(Payload::Ping(Ping {}), Duration::from_secs(5))
            .await;
        assert_eq!(result, Err(RealtimeError::ConnectionLost));
        assert_eq!(client.pending_requests(), 0);
        assert!(eventually(|| reasons.lock().unwrap().first() == Some(&CloseReason::Lost)).await);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_restores_joins() {
        let server = spawn_server(|mut peer: Peer| async move {
            if peer.index == 0 {
                for _ in 0..2 {
                    if let Some(request) = peer.next_envelope().await
                        && let Some(reply) = reply_for(&request)
                    {
                        peer.push(&reply).await;
                    }
                }
            } else {
                peer.respond_until_closed().await;
            }
        })
        .await;

        let client = RealtimeClient::new(test_config());
        client.connect(session_for(&server)).await.unwrap();
        client.join_clan_chat("clan-1").await.unwrap();
        let channel = client.join_chat("clan-1", "chan-1", 1, true).await.unwrap();
        assert_eq!(channel.id, "chan-1");

        assert!(eventually(|| server.connection_count() == 2).await);
        assert!(eventually(|| server.received_on(1) == vec!["clan_join", "channel_join"]).await);
        assert!(
            eventually(|| client.is_connected() && client.reconnect_state() == ReconnectState::Idle)
                .await
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_left_channel_is_not_restored() {
        let server = spawn_server(|mut peer: Peer| async move {
            if peer.index == 0 {
                for _ in 0..3 {
                    if let Some(request) = peer.next_envelope().await
                        && let Some(reply) = reply_for(&request)
                    {
                        peer.push(&reply).await;
                    }
                }
            } else {
                peer.respond_until_closed().await;
            }
        })
        .await;

        let client = RealtimeClient::new(test_config());
        client.connect(session_for(&server)).await.unwrap();
        client.join_clan_chat("clan-1").await.unwrap();
        client.join_chat("clan-1", "chan-1", 1, true).await.unwrap();
        client.leave_chat("clan-1", "chan-1", 1, true).await.unwrap();

        assert!(eventually(|| server.connection_count() == 2).await);
        assert!(eventually(|| server.received_on(1) == vec!["clan_join"]).await);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_intentional_close_prevents_reconnect() {
        let server = spawn_server(|peer| peer.respond_until_closed()).await;
        let client = RealtimeClient::new(test_config());
        client.connect(session_for(&server)).await.unwrap();

        client.close(true).await;
        assert_eq!(client.connection_state(), ConnectionState::Closed);
        assert_eq!(client.reconnect_state(), ReconnectState::Disabled);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(server.connection_count(), 1);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_explicit_connect_rearms_after_intentional_close() {
        let server = spawn_server(|peer| peer.respond_until_closed()).await;
        let client = RealtimeClient::new(test_config());
        client.connect(session_for(&server)).await.unwrap();
        client.close(true).await;

        client.connect(session_for(&server)).await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.reconnect_state(), ReconnectState::Idle);
        assert_eq!(server.connection_count(), 2);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_triggers_reconnect() {
        let server = spawn_server(|peer| peer.respond_except_pings()).await;
        let mut config = test_config();
        config.heartbeat = HeartbeatConfig {
            interval: Duration::from_millis(30),
            timeout: Duration::from_millis(30),
            max_consecutive_failures: 1,
        };
        let client = RealtimeClient::new(config);

        let timeouts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&timeouts);
        client.on_heartbeat_timeout(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        client.on_disconnect(move |reason| sink.lock().unwrap().push(reason));

        client.connect(session_for(&server)).await.unwrap();
        assert!(eventually(|| timeouts.load(Ordering::SeqCst) >= 1).await);
        assert!(eventually(|| server.connection_count() >= 2).await);
        assert_eq!(reasons.lock().unwrap()[0], CloseReason::Lost);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_blocked_writes_time_out_and_trip_heartbeat() {
        let server = spawn_server(|peer| peer.stop_reading()).await;
        let mut config = test_config();
        config.heartbeat = HeartbeatConfig {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(100),
            max_consecutive_failures: 1,
        };
        config.reconnect.initial_delay = Duration::from_secs(60);
        config.reconnect.max_delay = Duration::from_secs(60);
        let client = Arc::new(RealtimeClient::new(config));

        let timeouts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&timeouts);
        client.on_heartbeat_timeout(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        client.connect(session_for(&server)).await.unwrap();

        let mut sends = Vec::new();
        for _ in 0..8 {
            let client = Arc::clone(&client);
            sends.push(tokio::spawn(async move {
                let message = ChannelMessageSend {
                    content: "x".repeat(4 * 1024 * 1024),
                    ..chat_message("")
                };
                client
                    .send_with_timeout(
                        Payload::ChannelMessageSend(message),
                        Duration::from_millis(200),
                    )
                    .await
            }));
        }

        assert!(eventually(|| timeouts.load(Ordering::SeqCst) >= 1).await);
        assert!(eventually(|| !client.is_connected()).await);
        for send in sends {
            let result = tokio::time::timeout(Duration::from_secs(5), send)
                .await
                .expect("send must finish once its deadline passes")
                .unwrap();
            assert!(result.is_err(), "got {result:?}");
        }
        assert_eq!(client.pending_requests(), 0);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_configured_endpoint() {
        let server = spawn_server(|peer| peer.respond_until_closed()).await;
        let config = ClientConfig {
            endpoint: server.endpoint(),
            ..test_config()
        };
        let client = RealtimeClient::new(config);
        client.connect(Session::new("plain")).await.unwrap();
        assert!(client.is_connected());
        assert!(server.uris()[0].contains("token=plain"));
        client.shutdown().await;
    }
}
