//! Interfaces of the embedding chat host.
//!
//! The host owns users, threads, feedback storage and the plugin lifecycle
//! (`on_chat_start` / `on_message` / `on_chat_end`). The bridge consumes
//! those through the [`ChatHooks`] and [`DataLayer`] traits and exposes an
//! [`Emitter`] through which the host pushes outbound content.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connector::ChannelError;

pub mod context;
pub mod element;
pub mod message;
pub mod session;

pub use context::ChatContext;
pub use element::{Element, ElementDisplay, ElementKind};
pub use message::{Message, Step, StepKind};
pub use session::{HttpSession, PersistedFile};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A host user that has not been stored by a data layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier within the host.
    pub identifier: String,
    /// Free-form metadata (display name, channel id).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A host user stored by the data layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedUser {
    /// Data-layer id.
    pub id: String,
    /// Unique identifier within the host.
    pub identifier: String,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// The host user a turn runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUser {
    /// Not persisted (no data layer, or creation failed).
    Anonymous(User),
    /// Persisted by the data layer.
    Persisted(PersistedUser),
}

impl ChatUser {
    /// Host identifier.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Anonymous(user) => &user.identifier,
            Self::Persisted(user) => &user.identifier,
        }
    }

    /// Metadata map.
    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        match self {
            Self::Anonymous(user) => &user.metadata,
            Self::Persisted(user) => &user.metadata,
        }
    }

    /// Display name recorded in metadata, if any.
    pub fn display_name(&self) -> Option<&str> {
        self.metadata()
            .get("name")
            .and_then(serde_json::Value::as_str)
    }

    /// Data-layer id, for persisted users only.
    pub fn persisted_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous(_) => None,
            Self::Persisted(user) => Some(&user.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence records
// ---------------------------------------------------------------------------

/// Thumbs feedback value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackValue {
    /// Thumbs down.
    Dislike,
    /// Thumbs up.
    Like,
}

impl FeedbackValue {
    /// Stored score: 1 for like, 0 for dislike.
    pub fn score(self) -> u8 {
        match self {
            Self::Dislike => 0,
            Self::Like => 1,
        }
    }

    /// Emoji shown in place of a message once feedback was given.
    pub fn emoji(self) -> &'static str {
        match self {
            Self::Dislike => "\u{1f44e}",
            Self::Like => "\u{1f44d}",
        }
    }

    /// Parse the `text` of a feedback button click.
    pub fn from_text(text: &str) -> Option<Self> {
        match text {
            "like" => Some(Self::Like),
            "dislike" => Some(Self::Dislike),
            _ => None,
        }
    }
}

/// Feedback on a step or run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Step or run id the feedback is for.
    pub for_id: String,
    /// Thumbs value.
    pub value: FeedbackValue,
    /// Optional free-text comment.
    #[serde(default)]
    pub comment: Option<String>,
}

/// Thread name/metadata update issued at the end of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadUpdate {
    /// Deterministic thread id.
    pub thread_id: String,
    /// Human-readable thread name.
    pub name: String,
    /// Persistable session snapshot.
    pub metadata: serde_json::Value,
    /// Data-layer id of the owning user.
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by a [`DataLayer`].
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The backend rejected or failed the operation.
    #[error("persistence backend error: {0}")]
    Backend(String),
    /// The backend is not reachable.
    #[error("persistence backend unavailable")]
    Unavailable,
}

/// Errors from session file storage.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or writing a session file failed.
    #[error("session file I/O failed at {}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from an [`Emitter`].
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The channel call failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// A persisted element file could not be read.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Building a card payload failed.
    #[error("card serialization failed: {0}")]
    Card(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Persistence layer of the host.
#[async_trait]
pub trait DataLayer: Send + Sync {
    /// Create (or fetch) the stored user for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] on backend failure.
    async fn create_user(&self, user: &User) -> Result<Option<PersistedUser>, PersistenceError>;

    /// Update a thread's name and metadata.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] on backend failure.
    async fn update_thread(&self, update: &ThreadUpdate) -> Result<(), PersistenceError>;

    /// Insert or replace feedback, returning the feedback id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] on backend failure.
    async fn upsert_feedback(&self, feedback: &Feedback) -> Result<String, PersistenceError>;
}

/// Plugin lifecycle callbacks of the host.
///
/// Every hook defaults to a no-op, which is how an absent callback is
/// expressed. Hook errors abort the turn.
#[async_trait]
pub trait ChatHooks: Send + Sync {
    /// Called when a session starts.
    async fn on_chat_start(&self, _ctx: &ChatContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called with the submitted user message.
    async fn on_message(&self, _ctx: &ChatContext, _message: &Message) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the session ends.
    async fn on_chat_end(&self, _ctx: &ChatContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Outbound capability through which the host pushes content to a channel.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Deliver an element (file, image, ...).
    ///
    /// # Errors
    ///
    /// Returns [`EmitError`] when the content cannot be read or delivered.
    async fn send_element(&self, element: &Element) -> Result<(), EmitError>;

    /// Deliver a new step (message).
    ///
    /// # Errors
    ///
    /// Returns [`EmitError`] when delivery fails.
    async fn send_step(&self, step: &Step) -> Result<(), EmitError>;

    /// Deliver an updated step.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError`] when delivery fails.
    async fn update_step(&self, step: &Step) -> Result<(), EmitError>;

    /// Whether [`Emitter::update_step`] edits the original in place rather
    /// than sending the new content as another message.
    fn supports_true_update(&self) -> bool;
}
