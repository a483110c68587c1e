//! Mezon realtime protocol engine: gateway connection, request correlation,
//! heartbeat, reconnect, rate-limited dispatch and event routing.

pub mod adapter;
pub mod client;
pub mod correlation;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod heartbeat;
pub mod rate_limit;
pub mod reconnection;
pub mod router;
pub mod session;

#[cfg(test)]
mod test_support;

pub use adapter::{
    AuthParams, CloseReason, ConnectionState, ConnectionStateWatch, Endpoint, EnvelopeSink,
    InboundHandler, WebSocketAdapter,
};
pub use client::{ClientConfig, RealtimeClient};
pub use correlation::{CorrelationTable, PendingHandle};
pub use dispatch::{DispatchQueue, QueueTicket};
pub use envelope::{Envelope, Payload, decode_envelope, encode_envelope};
pub use error::RealtimeError;
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, HeartbeatState};
pub use rate_limit::TokenBucket;
pub use reconnection::{ReconnectConfig, ReconnectController, ReconnectState, Reconnector};
pub use router::{EventHandler, EventKind, EventRouter, HandlerError, RouteOutcome, SubscriptionId};
pub use session::Session;
