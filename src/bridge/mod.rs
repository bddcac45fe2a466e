//! Session bridge: maps channel turns onto host chat sessions.
//!
//! A normal message turn resolves the sender's host user, derives the
//! day-scoped thread id, creates a session wired to a
//! [`MsAgentsEmitter`], downloads attachments, runs the host hooks in
//! order, updates the stored thread and deletes the session. Feedback
//! button clicks are recorded and acknowledged without a session.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::activity::{Activity, ActivityType};
use crate::adapter::{Bot, TurnError};
use crate::connector::TurnContext;
use crate::host::{
    ChatContext, ChatHooks, ChatUser, DataLayer, Feedback, FeedbackValue, HttpSession, Message,
    ThreadUpdate,
};

pub mod download;
pub mod emitter;
pub mod users;

pub use download::AttachmentDownloader;
pub use emitter::MsAgentsEmitter;
pub use users::UserRegistry;

/// Date format used in thread ids and thread names.
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Thread id for a conversation on a calendar day.
///
/// All turns of one conversation on the same day share a thread; the next
/// day starts a new one.
pub fn derive_thread_id(conversation_id: &str, date: NaiveDate) -> Uuid {
    let seed = format!("{conversation_id}{}", date.format(DAY_FORMAT));
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes())
}

/// Thread name stored for a user's conversation on a calendar day.
pub fn thread_name(display_name: &str, date: NaiveDate) -> String {
    format!("{display_name} Teams DM {}", date.format(DAY_FORMAT))
}

/// The channel bot that drives host sessions.
pub struct MsAgentsBot {
    hooks: Arc<dyn ChatHooks>,
    data_layer: Option<Arc<dyn DataLayer>>,
    users: UserRegistry,
    downloader: AttachmentDownloader,
    files_root: PathBuf,
}

impl std::fmt::Debug for MsAgentsBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsAgentsBot")
            .field("users", &self.users)
            .field("files_root", &self.files_root)
            .finish_non_exhaustive()
    }
}

impl MsAgentsBot {
    /// Create a bot running `hooks`, persisting through `data_layer` when
    /// given and storing session files under `files_root`.
    pub fn new(
        hooks: Arc<dyn ChatHooks>,
        data_layer: Option<Arc<dyn DataLayer>>,
        downloader: AttachmentDownloader,
        files_root: PathBuf,
    ) -> Self {
        Self {
            hooks,
            users: UserRegistry::new(data_layer.clone()),
            data_layer,
            downloader,
            files_root,
        }
    }

    /// The identity cache.
    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    async fn handle_feedback(
        &self,
        turn: &TurnContext,
        value: FeedbackValue,
        step_id: &str,
    ) -> Result<(), TurnError> {
        if let Some(data_layer) = &self.data_layer {
            let feedback = Feedback {
                for_id: step_id.to_owned(),
                value,
                comment: None,
            };
            match data_layer.upsert_feedback(&feedback).await {
                Ok(id) => debug!(feedback_id = %id, step_id, score = value.score(), "feedback recorded"),
                Err(e) => error!(step_id, error = %e, "failed to record feedback"),
            }
        }

        let update = Activity {
            kind: ActivityType::Message,
            id: turn.activity().reply_to_id.clone(),
            text: Some(value.emoji().to_owned()),
            attachments: Some(Vec::new()),
            ..Activity::default()
        };
        turn.update_activity(update).await?;
        Ok(())
    }

    async fn process_message(&self, turn: &TurnContext, today: NaiveDate) -> Result<(), TurnError> {
        let inbound = turn.activity();
        let sender = inbound.from.as_ref().ok_or(TurnError::MissingField("from"))?;
        let conversation_id = inbound
            .conversation_id()
            .ok_or(TurnError::MissingField("conversation"))?;

        let user = self.users.get_user(sender).await;
        let thread_id = derive_thread_id(conversation_id, today).to_string();
        let author = user
            .display_name()
            .map_or_else(|| sender.id.clone(), str::to_owned);

        let session = Arc::new(HttpSession::new(thread_id.clone(), user.clone(), &self.files_root));
        session.set("conversation_id", Value::String(conversation_id.to_owned()));
        if let Some(channel_id) = &inbound.channel_id {
            session.set("channel_id", Value::String(channel_id.clone()));
        }
        let emitter = Arc::new(MsAgentsEmitter::new(
            Arc::clone(&session),
            turn.clone(),
            self.data_layer.is_some(),
        ));
        let ctx = ChatContext::new(Arc::clone(&session), emitter, self.data_layer.clone());

        info!(
            session_id = session.id(),
            thread_id = %thread_id,
            user = user.identifier(),
            "processing message"
        );
        let outcome = self.run_session(turn, &ctx, &author).await;

        if outcome.is_ok() {
            self.persist_thread(&session, &user, &thread_name(&author, today)).await;
        }
        session.delete().await;
        outcome
    }

    async fn run_session(
        &self,
        turn: &TurnContext,
        ctx: &ChatContext,
        author: &str,
    ) -> Result<(), TurnError> {
        let attachments = turn.activity().attachments.as_deref().unwrap_or_default();
        let elements = self.downloader.download_all(ctx.session(), attachments).await?;

        self.hooks.on_chat_start(ctx).await?;
        let message = Message::user(turn.activity().clean_text(), author, elements);
        ctx.send_message(&message).await?;
        self.hooks.on_message(ctx, &message).await?;
        self.hooks.on_chat_end(ctx).await?;
        Ok(())
    }

    async fn persist_thread(&self, session: &HttpSession, user: &ChatUser, name: &str) {
        let (Some(data_layer), Some(user_id)) = (&self.data_layer, user.persisted_id()) else {
            return;
        };
        let update = ThreadUpdate {
            thread_id: session.thread_id().to_owned(),
            name: name.to_owned(),
            metadata: session.to_persistable(),
            user_id: user_id.to_owned(),
        };
        if let Err(e) = data_layer.update_thread(&update).await {
            error!(thread_id = session.thread_id(), error = %e, "failed to update thread");
        }
    }
}

/// Feedback carried by a button click: `like`/`dislike` text plus a
/// `step_id` in the value payload.
fn feedback_click(activity: &Activity) -> Option<(FeedbackValue, &str)> {
    let value = FeedbackValue::from_text(activity.text.as_deref()?)?;
    let step_id = activity.value.as_ref()?.get("step_id")?.as_str()?;
    Some((value, step_id))
}

#[async_trait]
impl Bot for MsAgentsBot {
    async fn on_turn(&self, turn: &TurnContext) -> Result<(), TurnError> {
        let activity = turn.activity();
        if activity.kind != ActivityType::Message {
            debug!(activity_type = activity.kind.as_str(), "ignoring non-message activity");
            return Ok(());
        }

        if let Some((value, step_id)) = feedback_click(activity) {
            return self.handle_feedback(turn, value, step_id).await;
        }

        let typing = Activity::typing(
            activity.recipient.clone(),
            activity.from.clone(),
            activity.conversation.clone(),
        );
        turn.send_activity(typing).await?;

        self.process_message(turn, Local::now().date_naive()).await
    }
}
