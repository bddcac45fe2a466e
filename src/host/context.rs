//! What host hooks see during a turn.

use std::sync::Arc;

use uuid::Uuid;

use super::{DataLayer, Element, EmitError, Emitter, HttpSession, Message, StepKind};

/// Session, emitter and data layer of the running turn.
#[derive(Clone)]
pub struct ChatContext {
    session: Arc<HttpSession>,
    emitter: Arc<dyn Emitter>,
    data_layer: Option<Arc<dyn DataLayer>>,
}

impl std::fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatContext")
            .field("session", &self.session.id())
            .field("thread_id", &self.session.thread_id())
            .field("data_layer", &self.data_layer.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatContext {
    /// Bundle the collaborators of one turn.
    pub fn new(
        session: Arc<HttpSession>,
        emitter: Arc<dyn Emitter>,
        data_layer: Option<Arc<dyn DataLayer>>,
    ) -> Self {
        Self {
            session,
            emitter,
            data_layer,
        }
    }

    /// The turn's session.
    pub fn session(&self) -> &HttpSession {
        &self.session
    }

    /// The configured data layer, if any.
    pub fn data_layer(&self) -> Option<&Arc<dyn DataLayer>> {
        self.data_layer.as_ref()
    }

    /// Submit a message to the host pipeline.
    ///
    /// The message is emitted as a step; assistant messages also emit their
    /// elements. User-message elements are already on the channel.
    ///
    /// # Errors
    ///
    /// Propagates the emitter's error.
    pub async fn send_message(&self, message: &Message) -> Result<(), EmitError> {
        let mut step = message.to_step();
        step.parent_id = self.session.current_run();
        self.emitter.send_step(&step).await?;
        if message.kind == StepKind::AssistantMessage {
            for element in &message.elements {
                self.emitter.send_element(element).await?;
            }
        }
        Ok(())
    }

    /// Re-emit an edited message.
    ///
    /// # Errors
    ///
    /// Propagates the emitter's error.
    pub async fn update_message(&self, message: &Message) -> Result<(), EmitError> {
        let mut step = message.to_step();
        step.parent_id = self.session.current_run();
        self.emitter.update_step(&step).await
    }

    /// Emit a standalone element.
    ///
    /// # Errors
    ///
    /// Propagates the emitter's error.
    pub async fn send_element(&self, element: &Element) -> Result<(), EmitError> {
        self.emitter.send_element(element).await
    }

    /// Whether [`ChatContext::update_message`] edits in place.
    pub fn supports_true_update(&self) -> bool {
        self.emitter.supports_true_update()
    }

    /// Open a run; feedback on messages emitted until [`ChatContext::end_run`]
    /// is recorded against its id.
    pub fn start_run(&self) -> String {
        let run_id = Uuid::new_v4().to_string();
        self.session.set_current_run(Some(run_id.clone()));
        run_id
    }

    /// Close the current run.
    pub fn end_run(&self) {
        self.session.set_current_run(None);
    }
}
