//! Inbound routing: correlated responses to waiting requests, everything else
//! to event subscribers.
//!
//! The [`EventRouter`] checks every inbound envelope against the
//! [`CorrelationTable`] first. Frames that do not complete a pending request
//! are classified by [`EventKind`] and fanned out to the handlers registered
//! in the [`SubscriptionTable`], in registration order. A failing or panicking
//! handler is logged and never stops the others.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::correlation::CorrelationTable;
use crate::envelope::{Envelope, Payload};
use crate::error::RealtimeError;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Server-pushed event categories subscribers can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A message was posted to a channel.
    ChannelMessage,
    /// A reaction was added or removed.
    MessageReaction,
    /// A user is typing.
    MessageTyping,
    /// Users joined or left a channel.
    ChannelPresence,
    /// The pinned message of a channel changed.
    LastPinMessage,
    /// A user changed their custom status.
    CustomStatus,
    /// Users were added to a channel.
    UserChannelAdded,
    /// Users were removed from a channel.
    UserChannelRemoved,
    /// Users left or were removed from a clan.
    UserClanRemoved,
    /// A user was added to a clan.
    AddClanUser,
    /// A user's global profile changed.
    UserProfileUpdated,
    /// A channel was created.
    ChannelCreated,
    /// A channel was deleted.
    ChannelDeleted,
    /// A channel was updated.
    ChannelUpdated,
    /// Clan settings changed.
    ClanUpdated,
    /// A member's clan profile changed.
    ClanProfileUpdated,
    /// A clan role changed.
    Role,
    /// Roles were assigned or removed.
    RoleAssign,
    /// Coffee was given.
    GiveCoffee,
    /// Tokens were sent.
    TokenSent,
    /// A clan event was created.
    ClanEventCreated,
    /// An embedded message button was clicked.
    MessageButtonClicked,
    /// A user joined a streaming room.
    StreamingJoined,
    /// A user left a streaming room.
    StreamingLeaved,
    /// An embedded dropdown was changed.
    DropdownBoxSelected,
    /// WebRTC signalling was forwarded.
    WebrtcSignalingFwd,
    /// A voice room started.
    VoiceStarted,
    /// A voice room ended.
    VoiceEnded,
    /// A user joined a voice room.
    VoiceJoined,
    /// A user left a voice room.
    VoiceLeaved,
    /// A batch of notifications arrived.
    Notifications,
    /// A quick-menu entry was triggered.
    QuickMenu,
    /// Followed users came online or went offline.
    StatusPresence,
    /// Users joined or left a stream.
    StreamPresence,
    /// Data was published on a stream.
    StreamData,
}

impl EventKind {
    /// Every event kind, in a stable order.
    pub const ALL: [EventKind; 35] = [
        EventKind::ChannelMessage,
        EventKind::MessageReaction,
        EventKind::MessageTyping,
        EventKind::ChannelPresence,
        EventKind::LastPinMessage,
        EventKind::CustomStatus,
        EventKind::UserChannelAdded,
        EventKind::UserChannelRemoved,
        EventKind::UserClanRemoved,
        EventKind::AddClanUser,
        EventKind::UserProfileUpdated,
        EventKind::ChannelCreated,
        EventKind::ChannelDeleted,
        EventKind::ChannelUpdated,
        EventKind::ClanUpdated,
        EventKind::ClanProfileUpdated,
        EventKind::Role,
        EventKind::RoleAssign,
        EventKind::GiveCoffee,
        EventKind::TokenSent,
        EventKind::ClanEventCreated,
        EventKind::MessageButtonClicked,
        EventKind::StreamingJoined,
        EventKind::StreamingLeaved,
        EventKind::DropdownBoxSelected,
        EventKind::WebrtcSignalingFwd,
        EventKind::VoiceStarted,
        EventKind::VoiceEnded,
        EventKind::VoiceJoined,
        EventKind::VoiceLeaved,
        EventKind::Notifications,
        EventKind::QuickMenu,
        EventKind::StatusPresence,
        EventKind::StreamPresence,
        EventKind::StreamData,
    ];

    /// Event name as used by the gateway.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ChannelMessage => "channel_message",
            EventKind::MessageReaction => "message_reaction_event",
            EventKind::MessageTyping => "message_typing_event",
            EventKind::ChannelPresence => "channel_presence_event",
            EventKind::LastPinMessage => "last_pin_message_event",
            EventKind::CustomStatus => "custom_status_event",
            EventKind::UserChannelAdded => "user_channel_added_event",
            EventKind::UserChannelRemoved => "user_channel_removed_event",
            EventKind::UserClanRemoved => "user_clan_removed_event",
            EventKind::AddClanUser => "add_clan_user_event",
            EventKind::UserProfileUpdated => "user_profile_updated_event",
            EventKind::ChannelCreated => "channel_created_event",
            EventKind::ChannelDeleted => "channel_deleted_event",
            EventKind::ChannelUpdated => "channel_updated_event",
            EventKind::ClanUpdated => "clan_updated_event",
            EventKind::ClanProfileUpdated => "clan_profile_updated_event",
            EventKind::Role => "role_event",
            EventKind::RoleAssign => "role_assign_event",
            EventKind::GiveCoffee => "give_coffee_event",
            EventKind::TokenSent => "token_sent_event",
            EventKind::ClanEventCreated => "clan_event_created",
            EventKind::MessageButtonClicked => "message_button_clicked",
            EventKind::StreamingJoined => "streaming_joined_event",
            EventKind::StreamingLeaved => "streaming_leaved_event",
            EventKind::DropdownBoxSelected => "dropdown_box_selected",
            EventKind::WebrtcSignalingFwd => "webrtc_signaling_fwd",
            EventKind::VoiceStarted => "voice_started_event",
            EventKind::VoiceEnded => "voice_ended_event",
            EventKind::VoiceJoined => "voice_joined_event",
            EventKind::VoiceLeaved => "voice_leaved_event",
            EventKind::Notifications => "notifications",
            EventKind::QuickMenu => "quick_menu_event",
            EventKind::StatusPresence => "status_presence_event",
            EventKind::StreamPresence => "stream_presence_event",
            EventKind::StreamData => "stream_data",
        }
    }

    /// Look up an event kind by its gateway name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Payload {
    /// The event kind of a server push, or `None` for request and response
    /// payloads.
    pub fn event_kind(&self) -> Option<EventKind> {
        let kind = match self {
            Payload::ChannelMessage(_) => EventKind::ChannelMessage,
            Payload::MessageReactionEvent(_) => EventKind::MessageReaction,
            Payload::MessageTypingEvent(_) => EventKind::MessageTyping,
            Payload::ChannelPresenceEvent(_) => EventKind::ChannelPresence,
            Payload::LastPinMessageEvent(_) => EventKind::LastPinMessage,
            Payload::CustomStatusEvent(_) => EventKind::CustomStatus,
            Payload::UserChannelAddedEvent(_) => EventKind::UserChannelAdded,
            Payload::UserChannelRemovedEvent(_) => EventKind::UserChannelRemoved,
            Payload::UserClanRemovedEvent(_) => EventKind::UserClanRemoved,
            Payload::AddClanUserEvent(_) => EventKind::AddClanUser,
            Payload::UserProfileUpdatedEvent(_) => EventKind::UserProfileUpdated,
            Payload::ChannelCreatedEvent(_) => EventKind::ChannelCreated,
            Payload::ChannelDeletedEvent(_) => EventKind::ChannelDeleted,
            Payload::ChannelUpdatedEvent(_) => EventKind::ChannelUpdated,
            Payload::ClanUpdatedEvent(_) => EventKind::ClanUpdated,
            Payload::ClanProfileUpdatedEvent(_) => EventKind::ClanProfileUpdated,
            Payload::RoleEvent(_) => EventKind::Role,
            Payload::RoleAssignEvent(_) => EventKind::RoleAssign,
            Payload::GiveCoffeeEvent(_) => EventKind::GiveCoffee,
            Payload::TokenSentEvent(_) => EventKind::TokenSent,
            Payload::ClanEventCreated(_) => EventKind::ClanEventCreated,
            Payload::MessageButtonClicked(_) => EventKind::MessageButtonClicked,
            Payload::StreamingJoinedEvent(_) => EventKind::StreamingJoined,
            Payload::StreamingLeavedEvent(_) => EventKind::StreamingLeaved,
            Payload::DropdownBoxSelected(_) => EventKind::DropdownBoxSelected,
            Payload::WebrtcSignalingFwd(_) => EventKind::WebrtcSignalingFwd,
            Payload::VoiceStartedEvent(_) => EventKind::VoiceStarted,
            Payload::VoiceEndedEvent(_) => EventKind::VoiceEnded,
            Payload::VoiceJoinedEvent(_) => EventKind::VoiceJoined,
            Payload::VoiceLeavedEvent(_) => EventKind::VoiceLeaved,
            Payload::Notifications(_) => EventKind::Notifications,
            Payload::QuickMenuEvent(_) => EventKind::QuickMenu,
            Payload::StatusPresenceEvent(_) => EventKind::StatusPresence,
            Payload::StreamPresenceEvent(_) => EventKind::StreamPresence,
            Payload::StreamData(_) => EventKind::StreamData,
            Payload::Channel(_)
            | Payload::ChannelJoin(_)
            | Payload::ChannelLeave(_)
            | Payload::ChannelMessageAck(_)
            | Payload::ChannelMessageSend(_)
            | Payload::ClanJoin(_)
            | Payload::Error(_)
            | Payload::Ping(_)
            | Payload::Pong(_) => return None,
        };
        Some(kind)
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Error a handler may return. Logged by the router, never propagated.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Receives events of the kinds it was subscribed to.
pub trait EventHandler: Send + Sync {
    /// Process one event.
    fn handle(&self, event: &Payload) -> Result<(), HandlerError>;
}

/// Blanket implementation for closures.
impl<F> EventHandler for F
where
    F: Fn(&Payload) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &Payload) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Identifies one registration so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ---------------------------------------------------------------------------
// SubscriptionTable
// ---------------------------------------------------------------------------

type HandlerList = Vec<(SubscriptionId, Arc<dyn EventHandler>)>;

/// Ordered handler lists per event kind.
#[derive(Default)]
pub struct SubscriptionTable {
    handlers: RwLock<HashMap<EventKind, HandlerList>>,
    next_id: AtomicU64,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `kind`.
    pub fn subscribe<H: EventHandler + 'static>(&self, kind: EventKind, handler: H) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        tracing::debug!(event = %kind, ?id, "Subscribed");
        id
    }

    /// Remove one registration. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    /// Remove every handler for `kind`. Returns how many were removed.
    pub fn unsubscribe_all(&self, kind: EventKind) -> usize {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
            .map_or(0, |list| list.len())
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    pub fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    /// Number of handlers registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// What [`EventRouter::route`] did with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Completed a pending request.
    Resolved,
    /// Delivered to this many event handlers.
    Dispatched(usize),
    /// Dropped: unknown variant, late response, or uncorrelated reply.
    Ignored,
}

/// Routes inbound envelopes to pending requests or event subscribers.
pub struct EventRouter {
    subscriptions: SubscriptionTable,
    correlation: Arc<CorrelationTable>,
}

impl EventRouter {
    /// Create a router completing requests in `correlation`.
    pub fn new(correlation: Arc<CorrelationTable>) -> Self {
        Self {
            subscriptions: SubscriptionTable::new(),
            correlation,
        }
    }

    /// The subscriber registry.
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Route one inbound envelope.
    pub fn route(&self, envelope: Envelope) -> RouteOutcome {
        let cid = envelope.correlation_id();

        if let Some(cid) = cid
            && self.correlation.contains(cid)
        {
            let completed = match envelope.payload {
                Some(Payload::Error(err)) => self.correlation.reject(
                    cid,
                    RealtimeError::Server {
                        code: err.code,
                        message: err.message,
                    },
                ),
                Some(payload) => self.correlation.resolve(cid, payload),
                None => self.correlation.reject(
                    cid,
                    RealtimeError::ProtocolDecode("response carried no known payload".into()),
                ),
            };
            return if completed {
                RouteOutcome::Resolved
            } else {
                RouteOutcome::Ignored
            };
        }

        let Some(payload) = envelope.payload else {
            tracing::debug!(cid = %envelope.cid, "Ignoring envelope with unknown payload");
            return RouteOutcome::Ignored;
        };
        let Some(kind) = payload.event_kind() else {
            tracing::debug!(
                cid = %envelope.cid,
                payload = payload.name(),
                "Ignoring response with no pending request"
            );
            return RouteOutcome::Ignored;
        };

        let handlers = self.subscriptions.handlers_for(kind);
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(&payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(event = %kind, error = %e, "Event handler failed"),
                Err(_) => tracing::error!(event = %kind, "Event handler panicked"),
            }
        }
        tracing::trace!(event = %kind, handlers = handlers.len(), "Event dispatched");
        RouteOutcome::Dispatched(handlers.len())
    }
}
