//! Realtime wire envelope and payload types.
//!
//! Every frame on the socket is one protobuf-encoded [`Envelope`]: an optional
//! correlation id (`cid`) plus exactly one populated [`Payload`] variant. The
//! schema is owned by the server; the structs below carry the fields this
//! client reads or writes and are declared with `prost` derives so no build
//! step is needed. Fields the server adds later are skipped by the decoder, and
//! unknown payload variants decode as `payload: None`.

use prost::Message;

/// Sub-protocol token negotiated during the WebSocket upgrade.
pub const SUBPROTOCOL: &str = "protobuf";

/// Value of the `format` query parameter sent with the connect URL.
pub const WIRE_FORMAT: &str = "protobuf";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One unit of wire exchange.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    /// Correlation id. Empty for unsolicited server pushes.
    #[prost(string, tag = "1")]
    pub cid: String,
    /// The populated payload variant, or `None` when the server sent a
    /// variant this client does not know.
    #[prost(
        oneof = "Payload",
        tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45"
    )]
    pub payload: Option<Payload>,
}

impl Envelope {
    /// Wrap a payload in an uncorrelated envelope.
    pub fn new(payload: Payload) -> Self {
        Self {
            cid: String::new(),
            payload: Some(payload),
        }
    }

    /// Attach a numeric correlation id.
    pub fn with_cid(mut self, cid: u64) -> Self {
        self.cid = cid.to_string();
        self
    }

    /// The numeric correlation id, if one is present and well-formed.
    pub fn correlation_id(&self) -> Option<u64> {
        if self.cid.is_empty() {
            None
        } else {
            self.cid.parse().ok()
        }
    }

    /// Name of the populated variant, for logs.
    pub fn payload_name(&self) -> &'static str {
        self.payload.as_ref().map_or("unknown", Payload::name)
    }
}

/// Closed set of payload variants. Exactly one is populated per envelope.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Payload {
    // --- Requests and responses ---
    /// Join response describing the joined channel.
    #[prost(message, tag = "2")]
    Channel(Channel),
    /// Join a channel's realtime stream.
    #[prost(message, tag = "3")]
    ChannelJoin(ChannelJoin),
    /// Leave a channel's realtime stream.
    #[prost(message, tag = "4")]
    ChannelLeave(ChannelLeave),
    /// A message was posted to a channel.
    #[prost(message, tag = "5")]
    ChannelMessage(ChannelMessage),
    /// Acknowledgement of a sent chat message.
    #[prost(message, tag = "6")]
    ChannelMessageAck(ChannelMessageAck),
    /// Post a chat message.
    #[prost(message, tag = "7")]
    ChannelMessageSend(ChannelMessageSend),
    /// Users joined or left a channel.
    #[prost(message, tag = "8")]
    ChannelPresenceEvent(ChannelPresenceEvent),
    /// Server-side failure for a correlated request.
    #[prost(message, tag = "9")]
    Error(ServerError),
    /// Batch of user notifications.
    #[prost(message, tag = "10")]
    Notifications(NotificationList),
    /// Online status changes of followed users.
    #[prost(message, tag = "11")]
    StatusPresenceEvent(StatusPresenceEvent),
    /// Raw data published on a stream.
    #[prost(message, tag = "12")]
    StreamData(StreamData),
    /// Users joined or left a stream.
    #[prost(message, tag = "13")]
    StreamPresenceEvent(StreamPresenceEvent),
    /// Liveness probe.
    #[prost(message, tag = "14")]
    Ping(Ping),
    /// Liveness probe response.
    #[prost(message, tag = "15")]
    Pong(Pong),
    /// A user is typing.
    #[prost(message, tag = "16")]
    MessageTypingEvent(MessageTypingEvent),
    /// The pinned message of a channel changed.
    #[prost(message, tag = "17")]
    LastPinMessageEvent(LastPinMessageEvent),
    /// A user changed their custom status.
    #[prost(message, tag = "18")]
    CustomStatusEvent(CustomStatusEvent),
    /// Users were added to a channel.
    #[prost(message, tag = "19")]
    UserChannelAddedEvent(UserChannelAddedEvent),
    /// Users were removed from a channel.
    #[prost(message, tag = "20")]
    UserChannelRemovedEvent(UserChannelRemovedEvent),
    /// Users left or were removed from a clan.
    #[prost(message, tag = "21")]
    UserClanRemovedEvent(UserClanRemovedEvent),
    /// Clan settings changed.
    #[prost(message, tag = "22")]
    ClanUpdatedEvent(ClanUpdatedEvent),
    /// A member's clan profile changed.
    #[prost(message, tag = "23")]
    ClanProfileUpdatedEvent(ClanProfileUpdatedEvent),
    /// Join a clan's realtime stream.
    #[prost(message, tag = "24")]
    ClanJoin(ClanJoin),
    /// A reaction was added or removed.
    #[prost(message, tag = "25")]
    MessageReactionEvent(MessageReactionEvent),
    /// A user joined a voice room.
    #[prost(message, tag = "26")]
    VoiceJoinedEvent(VoiceJoinedEvent),
    /// A user left a voice room.
    #[prost(message, tag = "27")]
    VoiceLeavedEvent(VoiceLeavedEvent),
    /// A voice room started.
    #[prost(message, tag = "28")]
    VoiceStartedEvent(VoiceStartedEvent),
    /// A voice room ended.
    #[prost(message, tag = "29")]
    VoiceEndedEvent(VoiceEndedEvent),
    /// A channel was created.
    #[prost(message, tag = "30")]
    ChannelCreatedEvent(ChannelCreatedEvent),
    /// A channel was deleted.
    #[prost(message, tag = "31")]
    ChannelDeletedEvent(ChannelDeletedEvent),
    /// A channel was updated.
    #[prost(message, tag = "32")]
    ChannelUpdatedEvent(ChannelUpdatedEvent),
    /// A user's global profile changed.
    #[prost(message, tag = "33")]
    UserProfileUpdatedEvent(UserProfileUpdatedEvent),
    /// A user was added to a clan.
    #[prost(message, tag = "34")]
    AddClanUserEvent(AddClanUserEvent),
    /// A clan role was created, updated or deleted.
    #[prost(message, tag = "35")]
    RoleEvent(RoleEvent),
    /// Roles were assigned to or removed from users.
    #[prost(message, tag = "36")]
    RoleAssignEvent(RoleAssignEvent),
    /// A user gave coffee to another user.
    #[prost(message, tag = "37")]
    GiveCoffeeEvent(GiveCoffeeEvent),
    /// Tokens were sent between users.
    #[prost(message, tag = "38")]
    TokenSentEvent(TokenSentEvent),
    /// A clan event was created or changed.
    #[prost(message, tag = "39")]
    ClanEventCreated(ClanEventCreated),
    /// A button on an embedded message was clicked.
    #[prost(message, tag = "40")]
    MessageButtonClicked(MessageButtonClicked),
    /// A user joined a streaming room.
    #[prost(message, tag = "41")]
    StreamingJoinedEvent(StreamingJoinedEvent),
    /// A user left a streaming room.
    #[prost(message, tag = "42")]
    StreamingLeavedEvent(StreamingLeavedEvent),
    /// A dropdown on an embedded message was changed.
    #[prost(message, tag = "43")]
    DropdownBoxSelected(DropdownBoxSelected),
    /// WebRTC signalling forwarded from a peer.
    #[prost(message, tag = "44")]
    WebrtcSignalingFwd(WebrtcSignalingFwd),
    /// A quick-menu entry was triggered.
    #[prost(message, tag = "45")]
    QuickMenuEvent(QuickMenuEvent),
}

impl Payload {
    /// Wire name of the variant, matching the protobuf field name.
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Channel(_) => "channel",
            Payload::ChannelJoin(_) => "channel_join",
            Payload::ChannelLeave(_) => "channel_leave",
            Payload::ChannelMessage(_) => "channel_message",
            Payload::ChannelMessageAck(_) => "channel_message_ack",
            Payload::ChannelMessageSend(_) => "channel_message_send",
            Payload::ChannelPresenceEvent(_) => "channel_presence_event",
            Payload::Error(_) => "error",
            Payload::Notifications(_) => "notifications",
            Payload::StatusPresenceEvent(_) => "status_presence_event",
            Payload::StreamData(_) => "stream_data",
            Payload::StreamPresenceEvent(_) => "stream_presence_event",
            Payload::Ping(_) => "ping",
            Payload::Pong(_) => "pong",
            Payload::MessageTypingEvent(_) => "message_typing_event",
            Payload::LastPinMessageEvent(_) => "last_pin_message_event",
            Payload::CustomStatusEvent(_) => "custom_status_event",
            Payload::UserChannelAddedEvent(_) => "user_channel_added_event",
            Payload::UserChannelRemovedEvent(_) => "user_channel_removed_event",
            Payload::UserClanRemovedEvent(_) => "user_clan_removed_event",
            Payload::ClanUpdatedEvent(_) => "clan_updated_event",
            Payload::ClanProfileUpdatedEvent(_) => "clan_profile_updated_event",
            Payload::ClanJoin(_) => "clan_join",
            Payload::MessageReactionEvent(_) => "message_reaction_event",
            Payload::VoiceJoinedEvent(_) => "voice_joined_event",
            Payload::VoiceLeavedEvent(_) => "voice_leaved_event",
            Payload::VoiceStartedEvent(_) => "voice_started_event",
            Payload::VoiceEndedEvent(_) => "voice_ended_event",
            Payload::ChannelCreatedEvent(_) => "channel_created_event",
            Payload::ChannelDeletedEvent(_) => "channel_deleted_event",
            Payload::ChannelUpdatedEvent(_) => "channel_updated_event",
            Payload::UserProfileUpdatedEvent(_) => "user_profile_updated_event",
            Payload::AddClanUserEvent(_) => "add_clan_user_event",
            Payload::RoleEvent(_) => "role_event",
            Payload::RoleAssignEvent(_) => "role_assign_event",
            Payload::GiveCoffeeEvent(_) => "give_coffee_event",
            Payload::TokenSentEvent(_) => "token_sent_event",
            Payload::ClanEventCreated(_) => "clan_event_created",
            Payload::MessageButtonClicked(_) => "message_button_clicked",
            Payload::StreamingJoinedEvent(_) => "streaming_joined_event",
            Payload::StreamingLeavedEvent(_) => "streaming_leaved_event",
            Payload::DropdownBoxSelected(_) => "dropdown_box_selected",
            Payload::WebrtcSignalingFwd(_) => "webrtc_signaling_fwd",
            Payload::QuickMenuEvent(_) => "quick_menu_event",
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response payloads
// ---------------------------------------------------------------------------

/// Join a clan's realtime stream.
#[derive(Clone, PartialEq, Message)]
pub struct ClanJoin {
    /// Clan to join.
    #[prost(string, tag = "1")]
    pub clan_id: String,
}

/// Join a channel's realtime stream.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelJoin {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Channel to join.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Channel type discriminant.
    #[prost(int32, tag = "3")]
    pub channel_type: i32,
    /// Whether the channel is public.
    #[prost(bool, tag = "4")]
    pub is_public: bool,
}

/// Leave a channel's realtime stream.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelLeave {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Channel to leave.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Channel type discriminant.
    #[prost(int32, tag = "3")]
    pub channel_type: i32,
    /// Whether the channel is public.
    #[prost(bool, tag = "4")]
    pub is_public: bool,
}

/// Channel descriptor returned for a join.
#[derive(Clone, PartialEq, Message)]
pub struct Channel {
    /// Channel id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Owning clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Channel type discriminant.
    #[prost(int32, tag = "3")]
    pub channel_type: i32,
    /// Presences already in the channel.
    #[prost(message, repeated, tag = "4")]
    pub presences: Vec<UserPresence>,
}

/// A user mention inside a chat message.
#[derive(Clone, PartialEq, Message)]
pub struct MessageMention {
    /// Mentioned user.
    #[prost(string, tag = "1")]
    pub user_id: String,
    /// Mentioned username.
    #[prost(string, tag = "2")]
    pub username: String,
    /// Mentioned role, for role mentions.
    #[prost(string, tag = "3")]
    pub role_id: String,
    /// Start offset in the content.
    #[prost(int32, tag = "4")]
    pub s: i32,
    /// End offset in the content.
    #[prost(int32, tag = "5")]
    pub e: i32,
}

/// A file attached to a chat message.
#[derive(Clone, PartialEq, Message)]
pub struct MessageAttachment {
    /// Original file name.
    #[prost(string, tag = "1")]
    pub filename: String,
    /// Download URL.
    #[prost(string, tag = "2")]
    pub url: String,
    /// MIME type.
    #[prost(string, tag = "3")]
    pub filetype: String,
    /// Size in bytes.
    #[prost(int64, tag = "4")]
    pub size: i64,
    /// Image width in pixels.
    #[prost(int32, tag = "5")]
    pub width: i32,
    /// Image height in pixels.
    #[prost(int32, tag = "6")]
    pub height: i32,
}

/// A reference (reply) to an earlier message.
#[derive(Clone, PartialEq, Message)]
pub struct MessageRef {
    /// Referenced message.
    #[prost(string, tag = "1")]
    pub message_ref_id: String,
    /// Sender of the referenced message.
    #[prost(string, tag = "2")]
    pub message_sender_id: String,
    /// Username of that sender.
    #[prost(string, tag = "3")]
    pub message_sender_username: String,
    /// Quoted content.
    #[prost(string, tag = "4")]
    pub content: String,
    /// Whether the referenced message has attachments.
    #[prost(bool, tag = "5")]
    pub has_attachment: bool,
}

/// Post a chat message to a channel.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelMessageSend {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Target channel.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Stream mode of the channel.
    #[prost(int32, tag = "3")]
    pub mode: i32,
    /// Whether the channel is public.
    #[prost(bool, tag = "4")]
    pub is_public: bool,
    /// JSON-encoded message content.
    #[prost(string, tag = "5")]
    pub content: String,
    /// Mentions in the content.
    #[prost(message, repeated, tag = "6")]
    pub mentions: Vec<MessageMention>,
    /// Attachments.
    #[prost(message, repeated, tag = "7")]
    pub attachments: Vec<MessageAttachment>,
    /// Replied-to messages.
    #[prost(message, repeated, tag = "8")]
    pub references: Vec<MessageRef>,
    /// Post without revealing the sender.
    #[prost(bool, tag = "9")]
    pub anonymous_message: bool,
    /// Notify every member of the channel.
    #[prost(bool, tag = "10")]
    pub mention_everyone: bool,
    /// Avatar override.
    #[prost(string, tag = "11")]
    pub avatar: String,
    /// Message type code.
    #[prost(int32, tag = "12")]
    pub code: i32,
    /// Topic (thread) id.
    #[prost(string, tag = "13")]
    pub topic_id: String,
}

/// Acknowledgement returned for [`ChannelMessageSend`].
#[derive(Clone, PartialEq, Message)]
pub struct ChannelMessageAck {
    /// Channel the message was posted to.
    #[prost(string, tag = "1")]
    pub channel_id: String,
    /// Server-assigned message id.
    #[prost(string, tag = "2")]
    pub message_id: String,
    /// Message type code.
    #[prost(int32, tag = "3")]
    pub code: i32,
    /// Sender username.
    #[prost(string, tag = "4")]
    pub username: String,
    /// Creation time, unix seconds.
    #[prost(int64, tag = "5")]
    pub create_time_seconds: i64,
    /// Whether the message was persisted.
    #[prost(bool, tag = "6")]
    pub persistent: bool,
    /// Owning clan.
    #[prost(string, tag = "7")]
    pub clan_id: String,
}

/// Liveness probe.
#[derive(Clone, PartialEq, Message)]
pub struct Ping {}

/// Liveness probe response.
#[derive(Clone, PartialEq, Message)]
pub struct Pong {}

/// Server-side failure for a correlated request.
#[derive(Clone, PartialEq, Message)]
pub struct ServerError {
    /// Numeric error code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Human-readable reason.
    #[prost(string, tag = "2")]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Presence entry for a connected user.
#[derive(Clone, PartialEq, Message)]
pub struct UserPresence {
    /// User id.
    #[prost(string, tag = "1")]
    pub user_id: String,
    /// Socket session id.
    #[prost(string, tag = "2")]
    pub session_id: String,
    /// Username.
    #[prost(string, tag = "3")]
    pub username: String,
    /// Free-form status.
    #[prost(string, tag = "4")]
    pub status: String,
}

/// A message posted to a channel.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelMessage {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Channel the message was posted to.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Message id.
    #[prost(string, tag = "3")]
    pub message_id: String,
    /// Sender id.
    #[prost(string, tag = "4")]
    pub sender_id: String,
    /// Sender username.
    #[prost(string, tag = "5")]
    pub username: String,
    /// JSON-encoded content.
    #[prost(string, tag = "6")]
    pub content: String,
    /// Stream mode of the channel.
    #[prost(int32, tag = "7")]
    pub mode: i32,
    /// Whether the channel is public.
    #[prost(bool, tag = "8")]
    pub is_public: bool,
    /// Creation time, unix seconds.
    #[prost(int64, tag = "9")]
    pub create_time_seconds: i64,
    /// Topic (thread) id.
    #[prost(string, tag = "10")]
    pub topic_id: String,
    /// Message type code.
    #[prost(int32, tag = "11")]
    pub code: i32,
}

/// A reaction was added to or removed from a message.
#[derive(Clone, PartialEq, Message)]
pub struct MessageReactionEvent {
    /// Reaction id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Emoji id.
    #[prost(string, tag = "2")]
    pub emoji_id: String,
    /// Emoji shortname.
    #[prost(string, tag = "3")]
    pub emoji: String,
    /// Reacting user.
    #[prost(string, tag = "4")]
    pub sender_id: String,
    /// Reacting username.
    #[prost(string, tag = "5")]
    pub sender_name: String,
    /// `true` when the reaction was removed.
    #[prost(bool, tag = "6")]
    pub action: bool,
    /// Reacted-to message.
    #[prost(string, tag = "7")]
    pub message_id: String,
    /// Channel of the message.
    #[prost(string, tag = "8")]
    pub channel_id: String,
    /// Owning clan.
    #[prost(string, tag = "9")]
    pub clan_id: String,
    /// Reaction count.
    #[prost(int32, tag = "10")]
    pub count: i32,
}

/// A user is typing in a channel.
#[derive(Clone, PartialEq, Message)]
pub struct MessageTypingEvent {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Channel.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Typing user.
    #[prost(string, tag = "3")]
    pub sender_id: String,
    /// Whether the channel is public.
    #[prost(bool, tag = "4")]
    pub is_public: bool,
    /// Stream mode.
    #[prost(int32, tag = "5")]
    pub mode: i32,
}

/// Users joined or left a channel.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelPresenceEvent {
    /// Channel.
    #[prost(string, tag = "1")]
    pub channel_id: String,
    /// Users that joined.
    #[prost(message, repeated, tag = "2")]
    pub joins: Vec<UserPresence>,
    /// Users that left.
    #[prost(message, repeated, tag = "3")]
    pub leaves: Vec<UserPresence>,
    /// Owning clan.
    #[prost(string, tag = "4")]
    pub clan_id: String,
}

/// The pinned message of a channel changed.
#[derive(Clone, PartialEq, Message)]
pub struct LastPinMessageEvent {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Channel.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Pinned message.
    #[prost(string, tag = "3")]
    pub message_id: String,
    /// User who pinned or unpinned.
    #[prost(string, tag = "4")]
    pub user_id: String,
    /// Pin (0) or unpin (1).
    #[prost(int32, tag = "5")]
    pub operation: i32,
}

/// A user changed their custom status.
#[derive(Clone, PartialEq, Message)]
pub struct CustomStatusEvent {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// User.
    #[prost(string, tag = "2")]
    pub user_id: String,
    /// Username.
    #[prost(string, tag = "3")]
    pub username: String,
    /// New status text.
    #[prost(string, tag = "4")]
    pub status: String,
}

/// Users were added to a channel.
#[derive(Clone, PartialEq, Message)]
pub struct UserChannelAddedEvent {
    /// Channel.
    #[prost(string, tag = "1")]
    pub channel_id: String,
    /// Owning clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Added users.
    #[prost(string, repeated, tag = "3")]
    pub user_ids: Vec<String>,
    /// User who performed the add.
    #[prost(string, tag = "4")]
    pub caller_id: String,
}

/// Users were removed from a channel.
#[derive(Clone, PartialEq, Message)]
pub struct UserChannelRemovedEvent {
    /// Channel.
    #[prost(string, tag = "1")]
    pub channel_id: String,
    /// Removed users.
    #[prost(string, repeated, tag = "2")]
    pub user_ids: Vec<String>,
    /// Channel type discriminant.
    #[prost(int32, tag = "3")]
    pub channel_type: i32,
    /// Owning clan.
    #[prost(string, tag = "4")]
    pub clan_id: String,
}

/// Users left or were removed from a clan.
#[derive(Clone, PartialEq, Message)]
pub struct UserClanRemovedEvent {
    /// Clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Removed users.
    #[prost(string, repeated, tag = "2")]
    pub user_ids: Vec<String>,
}

/// A user was added to a clan.
#[derive(Clone, PartialEq, Message)]
pub struct AddClanUserEvent {
    /// Clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Added user.
    #[prost(string, tag = "2")]
    pub user_id: String,
    /// Added username.
    #[prost(string, tag = "3")]
    pub username: String,
    /// Inviting user.
    #[prost(string, tag = "4")]
    pub invitor: String,
}

/// A user's global profile changed.
#[derive(Clone, PartialEq, Message)]
pub struct UserProfileUpdatedEvent {
    /// User.
    #[prost(string, tag = "1")]
    pub user_id: String,
    /// New display name.
    #[prost(string, tag = "2")]
    pub display_name: String,
    /// New avatar URL.
    #[prost(string, tag = "3")]
    pub avatar: String,
    /// New bio.
    #[prost(string, tag = "4")]
    pub about_me: String,
    /// DM channel the update relates to, if any.
    #[prost(string, tag = "5")]
    pub channel_id: String,
    /// Clan the update relates to, if any.
    #[prost(string, tag = "6")]
    pub clan_id: String,
}

/// A channel was created.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelCreatedEvent {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Category.
    #[prost(string, tag = "2")]
    pub category_id: String,
    /// Creator.
    #[prost(string, tag = "3")]
    pub creator_id: String,
    /// Parent channel for threads.
    #[prost(string, tag = "4")]
    pub parent_id: String,
    /// New channel.
    #[prost(string, tag = "5")]
    pub channel_id: String,
    /// Channel label.
    #[prost(string, tag = "6")]
    pub channel_label: String,
    /// Private flag.
    #[prost(int32, tag = "7")]
    pub channel_private: i32,
    /// Channel type discriminant.
    #[prost(int32, tag = "8")]
    pub channel_type: i32,
}

/// A channel was deleted.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelDeletedEvent {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Category.
    #[prost(string, tag = "2")]
    pub category_id: String,
    /// Parent channel for threads.
    #[prost(string, tag = "3")]
    pub parent_id: String,
    /// Deleted channel.
    #[prost(string, tag = "4")]
    pub channel_id: String,
    /// User who deleted it.
    #[prost(string, tag = "5")]
    pub deletor: String,
}

/// A channel was updated.
#[derive(Clone, PartialEq, Message)]
pub struct ChannelUpdatedEvent {
    /// Owning clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Category.
    #[prost(string, tag = "2")]
    pub category_id: String,
    /// Creator.
    #[prost(string, tag = "3")]
    pub creator_id: String,
    /// Parent channel for threads.
    #[prost(string, tag = "4")]
    pub parent_id: String,
    /// Updated channel.
    #[prost(string, tag = "5")]
    pub channel_id: String,
    /// New label.
    #[prost(string, tag = "6")]
    pub channel_label: String,
    /// Channel type discriminant.
    #[prost(int32, tag = "7")]
    pub channel_type: i32,
    /// Channel status.
    #[prost(int32, tag = "8")]
    pub status: i32,
}

/// Clan settings changed.
#[derive(Clone, PartialEq, Message)]
pub struct ClanUpdatedEvent {
    /// Clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// New name.
    #[prost(string, tag = "2")]
    pub clan_name: String,
    /// New logo URL.
    #[prost(string, tag = "3")]
    pub logo: String,
    /// New banner URL.
    #[prost(string, tag = "4")]
    pub banner: String,
}

/// A member's clan profile changed.
#[derive(Clone, PartialEq, Message)]
pub struct ClanProfileUpdatedEvent {
    /// Member.
    #[prost(string, tag = "1")]
    pub user_id: String,
    /// New clan nickname.
    #[prost(string, tag = "2")]
    pub clan_nick: String,
    /// New clan avatar.
    #[prost(string, tag = "3")]
    pub clan_avatar: String,
    /// Clan.
    #[prost(string, tag = "4")]
    pub clan_id: String,
}

/// A clan role was created, updated or deleted.
#[derive(Clone, PartialEq, Message)]
pub struct RoleEvent {
    /// Role.
    #[prost(string, tag = "1")]
    pub role_id: String,
    /// Clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Role title.
    #[prost(string, tag = "3")]
    pub title: String,
    /// Create (0), update (1) or delete (2).
    #[prost(int32, tag = "4")]
    pub status: i32,
    /// Acting user.
    #[prost(string, tag = "5")]
    pub user_id: String,
}

/// Roles were assigned to or removed from users.
#[derive(Clone, PartialEq, Message)]
pub struct RoleAssignEvent {
    /// Clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Role.
    #[prost(string, tag = "2")]
    pub role_id: String,
    /// Users that gained the role.
    #[prost(string, repeated, tag = "3")]
    pub user_ids_assigned: Vec<String>,
    /// Users that lost the role.
    #[prost(string, repeated, tag = "4")]
    pub user_ids_removed: Vec<String>,
}

/// A user gave coffee to another user.
#[derive(Clone, PartialEq, Message)]
pub struct GiveCoffeeEvent {
    /// Giver.
    #[prost(string, tag = "1")]
    pub sender_id: String,
    /// Receiver.
    #[prost(string, tag = "2")]
    pub receiver_id: String,
    /// Tokens spent.
    #[prost(int32, tag = "3")]
    pub token_count: i32,
    /// Message the coffee was given on.
    #[prost(string, tag = "4")]
    pub message_ref_id: String,
    /// Channel.
    #[prost(string, tag = "5")]
    pub channel_id: String,
    /// Clan.
    #[prost(string, tag = "6")]
    pub clan_id: String,
}

/// Tokens were sent between users.
#[derive(Clone, PartialEq, Message)]
pub struct TokenSentEvent {
    /// Sender.
    #[prost(string, tag = "1")]
    pub sender_id: String,
    /// Sender name.
    #[prost(string, tag = "2")]
    pub sender_name: String,
    /// Receiver.
    #[prost(string, tag = "3")]
    pub receiver_id: String,
    /// Amount sent.
    #[prost(int64, tag = "4")]
    pub amount: i64,
    /// Attached note.
    #[prost(string, tag = "5")]
    pub note: String,
    /// Ledger transaction id.
    #[prost(string, tag = "6")]
    pub transaction_id: String,
}

/// A clan event was created or changed.
#[derive(Clone, PartialEq, Message)]
pub struct ClanEventCreated {
    /// Event id.
    #[prost(string, tag = "1")]
    pub event_id: String,
    /// Clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Channel hosting the event.
    #[prost(string, tag = "3")]
    pub channel_id: String,
    /// Title.
    #[prost(string, tag = "4")]
    pub title: String,
    /// Start time, unix seconds.
    #[prost(int64, tag = "5")]
    pub start_time_seconds: i64,
    /// End time, unix seconds.
    #[prost(int64, tag = "6")]
    pub end_time_seconds: i64,
    /// Creator.
    #[prost(string, tag = "7")]
    pub creator_id: String,
    /// Create, update or delete.
    #[prost(int32, tag = "8")]
    pub action: i32,
}

/// A button on an embedded message was clicked.
#[derive(Clone, PartialEq, Message)]
pub struct MessageButtonClicked {
    /// Message holding the button.
    #[prost(string, tag = "1")]
    pub message_id: String,
    /// Channel.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Button id.
    #[prost(string, tag = "3")]
    pub button_id: String,
    /// Author of the message.
    #[prost(string, tag = "4")]
    pub sender_id: String,
    /// Clicking user.
    #[prost(string, tag = "5")]
    pub user_id: String,
    /// Extra form data.
    #[prost(string, tag = "6")]
    pub extra_data: String,
}

/// A user joined a streaming room.
#[derive(Clone, PartialEq, Message)]
pub struct StreamingJoinedEvent {
    /// Clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Clan name.
    #[prost(string, tag = "2")]
    pub clan_name: String,
    /// Joining user.
    #[prost(string, tag = "3")]
    pub user_id: String,
    /// Participant display name.
    #[prost(string, tag = "4")]
    pub participant: String,
    /// Streaming channel.
    #[prost(string, tag = "5")]
    pub streaming_channel_id: String,
}

/// A user left a streaming room.
#[derive(Clone, PartialEq, Message)]
pub struct StreamingLeavedEvent {
    /// Participation id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Streaming channel.
    #[prost(string, tag = "3")]
    pub streaming_channel_id: String,
    /// Leaving user.
    #[prost(string, tag = "4")]
    pub streaming_user_id: String,
}

/// A dropdown on an embedded message was changed.
#[derive(Clone, PartialEq, Message)]
pub struct DropdownBoxSelected {
    /// Message holding the dropdown.
    #[prost(string, tag = "1")]
    pub message_id: String,
    /// Channel.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Dropdown id.
    #[prost(string, tag = "3")]
    pub selectbox_id: String,
    /// Author of the message.
    #[prost(string, tag = "4")]
    pub sender_id: String,
    /// Selecting user.
    #[prost(string, tag = "5")]
    pub user_id: String,
    /// Selected values.
    #[prost(string, repeated, tag = "6")]
    pub values: Vec<String>,
}

/// WebRTC signalling forwarded from a peer.
#[derive(Clone, PartialEq, Message)]
pub struct WebrtcSignalingFwd {
    /// Receiving user.
    #[prost(string, tag = "1")]
    pub receiver_id: String,
    /// Signal kind (offer, answer, candidate, ...).
    #[prost(int32, tag = "2")]
    pub data_type: i32,
    /// JSON signalling body.
    #[prost(string, tag = "3")]
    pub json_data: String,
    /// DM channel of the call.
    #[prost(string, tag = "4")]
    pub channel_id: String,
    /// Calling user.
    #[prost(string, tag = "5")]
    pub caller_id: String,
}

/// A voice room started.
#[derive(Clone, PartialEq, Message)]
pub struct VoiceStartedEvent {
    /// Room id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Voice channel.
    #[prost(string, tag = "3")]
    pub voice_channel_id: String,
}

/// A voice room ended.
#[derive(Clone, PartialEq, Message)]
pub struct VoiceEndedEvent {
    /// Room id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Voice channel.
    #[prost(string, tag = "3")]
    pub voice_channel_id: String,
}

/// A user joined a voice room.
#[derive(Clone, PartialEq, Message)]
pub struct VoiceJoinedEvent {
    /// Clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Clan name.
    #[prost(string, tag = "2")]
    pub clan_name: String,
    /// Participation id.
    #[prost(string, tag = "3")]
    pub id: String,
    /// Participant display name.
    #[prost(string, tag = "4")]
    pub participant: String,
    /// Joining user.
    #[prost(string, tag = "5")]
    pub user_id: String,
    /// Voice channel label.
    #[prost(string, tag = "6")]
    pub voice_channel_label: String,
    /// Voice channel.
    #[prost(string, tag = "7")]
    pub voice_channel_id: String,
}

/// A user left a voice room.
#[derive(Clone, PartialEq, Message)]
pub struct VoiceLeavedEvent {
    /// Participation id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Clan.
    #[prost(string, tag = "2")]
    pub clan_id: String,
    /// Voice channel.
    #[prost(string, tag = "3")]
    pub voice_channel_id: String,
    /// Leaving user.
    #[prost(string, tag = "4")]
    pub voice_user_id: String,
}

/// A single user notification.
#[derive(Clone, PartialEq, Message)]
pub struct Notification {
    /// Notification id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Subject line.
    #[prost(string, tag = "2")]
    pub subject: String,
    /// JSON body.
    #[prost(string, tag = "3")]
    pub content: String,
    /// Category code.
    #[prost(int32, tag = "4")]
    pub code: i32,
    /// Originating user.
    #[prost(string, tag = "5")]
    pub sender_id: String,
    /// Creation time, unix seconds.
    #[prost(int64, tag = "6")]
    pub create_time_seconds: i64,
    /// Whether the notification is stored server-side.
    #[prost(bool, tag = "7")]
    pub persistent: bool,
}

/// Batch of user notifications.
#[derive(Clone, PartialEq, Message)]
pub struct NotificationList {
    /// Notifications in this batch.
    #[prost(message, repeated, tag = "1")]
    pub notifications: Vec<Notification>,
}

/// A quick-menu entry was triggered.
#[derive(Clone, PartialEq, Message)]
pub struct QuickMenuEvent {
    /// Clan.
    #[prost(string, tag = "1")]
    pub clan_id: String,
    /// Channel the menu was used in.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Menu entry name.
    #[prost(string, tag = "3")]
    pub menu_name: String,
    /// Triggering user.
    #[prost(string, tag = "4")]
    pub sender_id: String,
}

/// Online status changes of followed users.
#[derive(Clone, PartialEq, Message)]
pub struct StatusPresenceEvent {
    /// Users that came online.
    #[prost(message, repeated, tag = "1")]
    pub joins: Vec<UserPresence>,
    /// Users that went offline.
    #[prost(message, repeated, tag = "2")]
    pub leaves: Vec<UserPresence>,
}

/// Users joined or left a stream.
#[derive(Clone, PartialEq, Message)]
pub struct StreamPresenceEvent {
    /// Stream id.
    #[prost(string, tag = "1")]
    pub stream_id: String,
    /// Users that joined.
    #[prost(message, repeated, tag = "2")]
    pub joins: Vec<UserPresence>,
    /// Users that left.
    #[prost(message, repeated, tag = "3")]
    pub leaves: Vec<UserPresence>,
}

/// Raw data published on a stream.
#[derive(Clone, PartialEq, Message)]
pub struct StreamData {
    /// Stream id.
    #[prost(string, tag = "1")]
    pub stream_id: String,
    /// Publishing user, absent for server-originated data.
    #[prost(message, optional, tag = "2")]
    pub sender: Option<UserPresence>,
    /// Opaque data.
    #[prost(string, tag = "3")]
    pub data: String,
    /// Whether the data was sent reliably.
    #[prost(bool, tag = "4")]
    pub reliable: bool,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Errors produced while decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame is not a valid protobuf envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Encode an envelope into a binary frame.
pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    envelope.encode_to_vec()
}

/// Decode a binary frame into an envelope.
pub fn decode_envelope(data: &[u8]) -> Result<Envelope, EnvelopeError> {
    Ok(Envelope::decode(data)?)
}
