//! Host emitter that turns steps and elements into channel activities.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;
use tracing::debug;

use crate::activity::{ActionType, Activity, Attachment, CardAction, HeroCard};
use crate::connector::TurnContext;
use crate::host::{
    Element, ElementDisplay, EmitError, Emitter, FeedbackValue, HttpSession, SessionError, Step,
    StepKind,
};

/// MIME type used in data URLs of files that carry none.
const FALLBACK_MIME: &str = "application/octet-stream";

/// Name of elements that carry none.
const UNTITLED: &str = "Untitled";

/// Emitter bound to one turn.
#[derive(Debug)]
pub struct MsAgentsEmitter {
    session: Arc<HttpSession>,
    turn: TurnContext,
    feedback_enabled: bool,
}

impl MsAgentsEmitter {
    /// Create an emitter replying into `turn`. Feedback buttons are attached
    /// to assistant messages when `feedback_enabled` is set.
    pub fn new(session: Arc<HttpSession>, turn: TurnContext, feedback_enabled: bool) -> Self {
        Self {
            session,
            turn,
            feedback_enabled,
        }
    }

    fn feedback_card(&self, step: &Step) -> Result<Attachment, serde_json::Error> {
        let step_id = self.session.current_run().unwrap_or_else(|| step.id.clone());
        let button = |value: FeedbackValue, text: &str| CardAction {
            kind: ActionType::MessageBack,
            title: value.emoji().to_owned(),
            text: Some(text.to_owned()),
            display_text: None,
            value: Some(json!({ "feedback": text, "step_id": step_id })),
        };
        HeroCard {
            buttons: vec![
                button(FeedbackValue::Like, "like"),
                button(FeedbackValue::Dislike, "dislike"),
            ],
            ..HeroCard::default()
        }
        .into_attachment()
    }
}

/// Element name with an extension guessed from `mime` when it has none.
pub fn attachment_name(name: &str, mime: Option<&str>) -> String {
    let name = if name.is_empty() { UNTITLED } else { name };
    if Path::new(name).extension().is_some() {
        return name.to_owned();
    }
    match mime.and_then(canonical_extension) {
        Some(extension) => format!("{name}.{extension}"),
        None => name.to_owned(),
    }
}

/// Extensions that win over the registry order for common types.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("application/octet-stream", "bin"),
    ("audio/mpeg", "mp3"),
    ("image/jpeg", "jpg"),
    ("image/tiff", "tiff"),
    ("text/plain", "txt"),
    ("video/mpeg", "mpeg"),
];

/// Usual extension for `mime`, ignoring parameters such as `charset`.
///
/// Candidates that map back to the same type are preferred, so aliases
/// registered for a type (`jfif`, `asm`) are not picked.
fn canonical_extension(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    if let Some((_, extension)) = PREFERRED_EXTENSIONS.iter().find(|(m, _)| *m == essence) {
        return Some(*extension);
    }
    let candidates = mime_guess::get_mime_extensions_str(&essence)?;
    candidates
        .iter()
        .find(|ext| mime_guess::from_ext(ext).first_raw() == Some(essence.as_str()))
        .or_else(|| candidates.first())
        .copied()
}

#[async_trait]
impl Emitter for MsAgentsEmitter {
    async fn send_element(&self, element: &Element) -> Result<(), EmitError> {
        if element.display != ElementDisplay::Inline {
            return Ok(());
        }

        let persisted = element
            .file_key
            .as_deref()
            .and_then(|key| self.session.file(key));
        let name = attachment_name(&element.name, element.mime.as_deref());

        let attachment = if let Some(file) = persisted {
            let mime = element
                .mime
                .clone()
                .unwrap_or_else(|| FALLBACK_MIME.to_owned());
            let bytes = tokio::fs::read(&file.path)
                .await
                .map_err(|source| SessionError::Io {
                    path: file.path.clone(),
                    source,
                })?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            Attachment {
                content_url: Some(format!("data:{mime};base64,{encoded}")),
                content_type: Some(mime),
                name: Some(name),
                ..Attachment::default()
            }
        } else if let Some(url) = &element.url {
            Attachment {
                content_url: Some(url.clone()),
                content_type: element.mime.clone(),
                name: Some(name),
                ..Attachment::default()
            }
        } else {
            debug!(element_id = %element.id, "element has no content source, skipping");
            return Ok(());
        };

        self.turn
            .send_activity(Activity::with_attachments(vec![attachment]))
            .await?;
        Ok(())
    }

    async fn send_step(&self, step: &Step) -> Result<(), EmitError> {
        if step.kind != StepKind::AssistantMessage || step.output.is_empty() {
            return Ok(());
        }

        let mut reply = Activity::message(step.output.clone());
        if self.feedback_enabled {
            reply.attachments = Some(vec![self.feedback_card(step)?]);
        }
        self.turn.send_activity(reply).await?;
        Ok(())
    }

    async fn update_step(&self, step: &Step) -> Result<(), EmitError> {
        if step.kind != StepKind::AssistantMessage {
            return Ok(());
        }
        self.send_step(step).await
    }

    fn supports_true_update(&self) -> bool {
        false
    }
}
