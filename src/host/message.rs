//! Host messages and the steps they are emitted as.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::element::Element;

/// Kind of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Message authored by the user.
    UserMessage,
    /// Message authored by the assistant.
    AssistantMessage,
    /// A run wrapping one `on_message` invocation.
    Run,
    /// A tool call.
    Tool,
    /// An LLM call.
    Llm,
    /// Anything else.
    Undefined,
}

/// A unit of output the host emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step id.
    pub id: String,
    /// Step kind.
    pub kind: StepKind,
    /// Author or step name.
    pub name: String,
    /// Output text.
    #[serde(default)]
    pub output: String,
    /// Parent step id.
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message id (also the id of its step).
    pub id: String,
    /// Text content.
    pub content: String,
    /// Author display name.
    pub author: String,
    /// Attached elements.
    pub elements: Vec<Element>,
    /// `UserMessage` or `AssistantMessage`.
    pub kind: StepKind,
}

impl Message {
    /// A user-authored message.
    pub fn user(content: impl Into<String>, author: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            author: author.into(),
            elements,
            kind: StepKind::UserMessage,
        }
    }

    /// An assistant-authored message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            author: "Assistant".to_owned(),
            elements: Vec::new(),
            kind: StepKind::AssistantMessage,
        }
    }

    /// The step this message is emitted as.
    pub fn to_step(&self) -> Step {
        Step {
            id: self.id.clone(),
            kind: self.kind,
            name: self.author.clone(),
            output: self.content.clone(),
            parent_id: None,
        }
    }
}
