//! Channel protocol model: the Activity envelope and its attachments.
//!
//! Mirrors the subset of the Bot Framework / Microsoft 365 Agents
//! activity schema that the bridge reads and writes. JSON field names are
//! camelCase on the wire. Unknown fields are ignored and unknown activity
//! types deserialize into [`ActivityType::Other`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type of a hero card attachment.
pub const HERO_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.hero";

/// Content type of a Teams file-download attachment.
pub const FILE_DOWNLOAD_INFO_CONTENT_TYPE: &str =
    "application/vnd.microsoft.teams.file.download.info";

// ---------------------------------------------------------------------------
// Activity type
// ---------------------------------------------------------------------------

/// The `type` discriminator of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityType {
    /// A user or bot message.
    #[default]
    Message,
    /// A typing indicator.
    Typing,
    /// Membership or conversation metadata changed.
    ConversationUpdate,
    /// A request expecting a synchronous invoke response.
    Invoke,
    /// A channel-defined event.
    Event,
    /// Any type the bridge does not model.
    Other(String),
}

impl ActivityType {
    /// Wire name of this activity type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Typing => "typing",
            Self::ConversationUpdate => "conversationUpdate",
            Self::Invoke => "invoke",
            Self::Event => "event",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for ActivityType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "message" => Self::Message,
            "typing" => Self::Typing,
            "conversationUpdate" => Self::ConversationUpdate,
            "invoke" => Self::Invoke,
            "event" => Self::Event,
            _ => Self::Other(value),
        }
    }
}

impl From<ActivityType> for String {
    fn from(value: ActivityType) -> Self {
        match value {
            ActivityType::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A participant on the channel (user or bot).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    /// Channel-specific participant id.
    pub id: String,
    /// Display name, if the channel supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entra ID object id of the user, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
    /// `user` or `bot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The conversation an activity belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    /// Channel-specific conversation id.
    pub id: String,
    /// Conversation display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `personal`, `groupChat` or `channel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    /// Tenant the conversation lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Whether more than two participants are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

// ---------------------------------------------------------------------------
// Attachments and cards
// ---------------------------------------------------------------------------

/// A file, media reference or card carried by an activity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// MIME type or card content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// URL (or `data:` URL) of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    /// Structured content (cards, Teams file download info).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// File name shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Thumbnail URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Attachment {
    /// Download URL exposed by a structured content payload, if any.
    ///
    /// Teams file uploads arrive as `{"downloadUrl": ..., "uniqueId": ...}`.
    pub fn download_url(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(serde_json::Value::as_object)
            .and_then(|content| content.get("downloadUrl"))
            .and_then(serde_json::Value::as_str)
    }
}

/// Kind of a card button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    /// Posts `text` and `value` back to the bot as a message activity.
    MessageBack,
    /// Sends `value` as a user message.
    ImBack,
    /// Posts `value` back without showing a message.
    PostBack,
    /// Opens a URL.
    OpenUrl,
}

/// A button on a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardAction {
    /// Button behaviour.
    #[serde(rename = "type")]
    pub kind: ActionType,
    /// Button caption.
    pub title: String,
    /// Text sent back for `messageBack`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Text shown in the chat when the button is clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    /// Structured payload posted back to the bot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// A hero card: title, text and a row of buttons.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroCard {
    /// Card title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Card subtitle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Card body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Card buttons.
    #[serde(default)]
    pub buttons: Vec<CardAction>,
}

impl HeroCard {
    /// Wrap this card into an attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the card cannot be serialized to JSON.
    pub fn into_attachment(self) -> Result<Attachment, serde_json::Error> {
        Ok(Attachment {
            content_type: Some(HERO_CARD_CONTENT_TYPE.to_owned()),
            content: Some(serde_json::to_value(self)?),
            ..Attachment::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// The channel protocol's envelope for messages, typing indicators and events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Activity type.
    #[serde(rename = "type")]
    pub kind: ActivityType,
    /// Channel-assigned activity id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Time the channel received the activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Base URL of the channel service to reply to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    /// Channel identifier (`msteams`, `emulator`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    /// Recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    /// Conversation the activity belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    /// Message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Attachments. `Some(vec![])` serializes as an empty list, which
    /// clears attachments on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    /// Structured payload (e.g. card button values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Id of the activity this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Locale of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Activity {
    /// A plain text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: ActivityType::Message,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A message carrying only attachments.
    pub fn with_attachments(attachments: Vec<Attachment>) -> Self {
        Self {
            kind: ActivityType::Message,
            attachments: Some(attachments),
            ..Self::default()
        }
    }

    /// A typing indicator addressed explicitly from `from` to `recipient`.
    pub fn typing(
        from: Option<ChannelAccount>,
        recipient: Option<ChannelAccount>,
        conversation: Option<ConversationAccount>,
    ) -> Self {
        Self {
            kind: ActivityType::Typing,
            from,
            recipient,
            conversation,
            ..Self::default()
        }
    }

    /// Trimmed message text, empty when absent.
    pub fn clean_text(&self) -> String {
        self.text.as_deref().unwrap_or_default().trim().to_owned()
    }

    /// Conversation id, if the activity has a conversation.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }

    /// Address this outbound activity as a reply within `inbound`'s conversation.
    ///
    /// Only fields that are unset are filled: service URL, channel id,
    /// conversation, `from` (inbound recipient), `recipient` (inbound
    /// sender) and, for messages, `replyToId`.
    pub fn apply_reply_reference(&mut self, inbound: &Activity) {
        if self.service_url.is_none() {
            self.service_url.clone_from(&inbound.service_url);
        }
        if self.channel_id.is_none() {
            self.channel_id.clone_from(&inbound.channel_id);
        }
        if self.conversation.is_none() {
            self.conversation.clone_from(&inbound.conversation);
        }
        if self.from.is_none() {
            self.from.clone_from(&inbound.recipient);
        }
        if self.recipient.is_none() {
            self.recipient.clone_from(&inbound.from);
        }
        if self.kind == ActivityType::Message && self.reply_to_id.is_none() {
            self.reply_to_id.clone_from(&inbound.id);
        }
        if self.locale.is_none() {
            self.locale.clone_from(&inbound.locale);
        }
    }

    /// Check the fields the adapter needs before dispatching a turn.
    ///
    /// # Errors
    ///
    /// Returns the name of the first missing field.
    pub fn validate_inbound(&self) -> Result<(), &'static str> {
        if self.service_url.as_deref().map_or(true, str::is_empty) {
            return Err("serviceUrl");
        }
        if self.conversation.is_none() {
            return Err("conversation");
        }
        if self.kind == ActivityType::Message && self.from.is_none() {
            return Err("from");
        }
        Ok(())
    }
}
