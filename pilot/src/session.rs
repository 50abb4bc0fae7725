//! The guided edit session: instruction in, streamed proposal, user decides.
//!
//! ```text
//! Idle → Collecting → Generating ⇄ ContinuePrompt → Previewing → Applying   → Applied
//!                                                              ↘ Cancelling → Cancelled
//! ```
//!
//! `Unchanged` and `Failed` are the other terminal phases. A session is
//! consumed by [`EditSession::run`]; nothing outlives it except the report.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::completion::{ChatMessage, CompletionClient, CompletionRequest, FinishReason};
use crate::config::{CommandKind, PilotConfig};
use crate::credentials::{API_KEY_NAME, CredentialStore};
use crate::document::{Document, DocumentError};
use crate::fallback::try_simple_remove;
use crate::preview::{EditPreview, PreviewSurface, Side};
use crate::prompt;
use crate::text::{normalize, strip_fences};

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("select some code to edit")]
    EmptySelection,
    #[error("describe the change to apply to the selection")]
    MissingInstruction,
    #[error("no API key configured")]
    MissingCredential,
    #[error("no edit returned")]
    NoEditProduced,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
}

/// What the user asked for. Immutable once built.
#[derive(Clone, Debug)]
pub struct EditRequest {
    original_text: String,
    instruction: String,
    language: String,
}

impl EditRequest {
    pub fn new(
        original_text: impl Into<String>,
        instruction: impl Into<String>,
        language: impl Into<String>,
    ) -> Result<Self, EditError> {
        let original_text = original_text.into();
        if original_text.is_empty() {
            return Err(EditError::EmptySelection);
        }
        let instruction = instruction.into().trim().to_string();
        if instruction.is_empty() {
            return Err(EditError::MissingInstruction);
        }
        let language = language.into();
        Ok(Self {
            original_text,
            instruction,
            language: if language.is_empty() {
                "plaintext".to_string()
            } else {
                language
            },
        })
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
    Generating,
    ContinuePrompt,
    Previewing,
    Applying,
    Cancelling,
    Applied,
    Cancelled,
    Unchanged,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Applied | Phase::Cancelled | Phase::Unchanged | Phase::Failed
        )
    }
}

/// Mutable state of one session. `accumulated` only grows while streaming;
/// the sole reset is the local fallback replacing an empty generation.
#[derive(Clone, Debug)]
pub struct SessionState {
    accumulated: String,
    original: String,
    phase: Phase,
    finish_reason: Option<FinishReason>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            accumulated: String::new(),
            original: String::new(),
            phase: Phase::Idle,
            finish_reason: None,
        }
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Accumulated text with the enclosing fence removed and trimmed.
    pub fn proposed(&self) -> String {
        strip_fences(&self.accumulated)
    }
}

#[derive(Debug)]
pub enum EditOutcome {
    /// The edit is in the document. `persist_error` is set when saving failed
    /// and the change is only kept in the open buffer.
    Applied { persist_error: Option<String> },
    Cancelled,
    /// The proposal matched the original after normalization.
    Unchanged,
    Failed(EditError),
}

impl EditOutcome {
    pub fn message(&self) -> String {
        match self {
            EditOutcome::Applied {
                persist_error: None,
            } => "Edit applied.".to_string(),
            EditOutcome::Applied {
                persist_error: Some(e),
            } => format!("Edit kept (unsaved): {e}"),
            EditOutcome::Cancelled => "Edit cancelled.".to_string(),
            EditOutcome::Unchanged => {
                "No meaningful changes detected for this selection.".to_string()
            }
            EditOutcome::Failed(e) => format!("Edit failed: {e}"),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }
}

/// Final outcome plus the state the session ended in.
#[derive(Debug)]
pub struct EditReport {
    pub outcome: EditOutcome,
    pub state: SessionState,
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Lines of partial output used to anchor a continuation request.
    pub continuation_tail: usize,
}

impl SessionSettings {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: CommandKind::Improve.temperature(),
            max_tokens: CommandKind::Improve.max_tokens(config.max_tokens),
            continuation_tail: prompt::CONTINUATION_TAIL_LINES,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&PilotConfig::default())
    }
}

pub struct EditSession {
    id: String,
    settings: SessionSettings,
    client: Arc<dyn CompletionClient>,
    credentials: Arc<dyn CredentialStore>,
    state: SessionState,
    preview_open: bool,
}

impl EditSession {
    pub fn new(
        settings: SessionSettings,
        client: Arc<dyn CompletionClient>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            settings,
            client,
            credentials,
            state: SessionState::new(),
            preview_open: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drive the session to a terminal phase.
    ///
    /// Every failure is converted into [`EditOutcome::Failed`]. Preview
    /// resources are released on every path once they have been opened.
    pub async fn run(
        mut self,
        document: &mut dyn Document,
        preview: &mut dyn PreviewSurface,
        instruction: &str,
        cancel: &CancellationToken,
    ) -> EditReport {
        let outcome = match self.drive(document, preview, instruction, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(session = %self.id, "edit failed: {e}");
                self.enter(Phase::Failed);
                EditOutcome::Failed(e)
            }
        };
        if self.preview_open {
            preview.release();
        }
        tracing::info!(session = %self.id, phase = ?self.state.phase, "edit session finished");
        EditReport {
            outcome,
            state: self.state,
        }
    }

    async fn drive(
        &mut self,
        document: &mut dyn Document,
        preview: &mut dyn PreviewSurface,
        instruction: &str,
        cancel: &CancellationToken,
    ) -> Result<EditOutcome, EditError> {
        let selection = document.selection_text().to_string();
        if selection.is_empty() {
            return Err(EditError::EmptySelection);
        }
        self.enter(Phase::Collecting);
        let request = EditRequest::new(selection, instruction, document.language())?;
        self.state.original = request.original_text().to_string();

        let api_key = self
            .credentials
            .get(API_KEY_NAME)
            .filter(|key| !key.trim().is_empty())
            .ok_or(EditError::MissingCredential)?;

        self.preview_open = true;
        preview.update(Side::Original, request.original_text());

        self.enter(Phase::Generating);
        let mut messages = prompt::edit_messages(&request);
        loop {
            let Some(reason) = self.generate(&api_key, messages, preview, cancel).await? else {
                return self.restore(document, &request).await;
            };
            if reason != FinishReason::LengthLimited {
                break;
            }
            self.enter(Phase::ContinuePrompt);
            if !preview.confirm_continue().await {
                tracing::debug!(session = %self.id, "continuation declined");
                break;
            }
            self.enter(Phase::Generating);
            messages = prompt::continuation_messages(
                &request,
                &self.state.accumulated,
                self.settings.continuation_tail,
            );
        }

        let mut proposed = self.state.proposed();
        preview.update(Side::Proposed, &proposed);

        if proposed.is_empty() {
            let fallback = try_simple_remove(request.original_text(), request.instruction())
                .ok_or(EditError::NoEditProduced)?;
            tracing::info!(session = %self.id, "empty generation, using local removal");
            self.state.accumulated = fallback.clone();
            preview.update(Side::Proposed, &fallback);
            proposed = fallback;
        }

        self.enter(Phase::Previewing);
        if normalize(&proposed) == normalize(request.original_text()) {
            self.enter(Phase::Unchanged);
            return Ok(EditOutcome::Unchanged);
        }

        let comparison = EditPreview::new(request.original_text(), proposed.as_str());
        if !preview.confirm_apply(&comparison).await {
            return self.restore(document, &request).await;
        }

        self.enter(Phase::Applying);
        document.replace_selection(&proposed).await?;
        let persist_error = match document.save().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(session = %self.id, "edit kept but not saved: {e}");
                Some(e.to_string())
            }
        };
        self.enter(Phase::Applied);
        Ok(EditOutcome::Applied { persist_error })
    }

    /// Stream one completion into `accumulated`.
    ///
    /// Returns `None` when the caller cancelled mid-stream. A stream that ends
    /// without a final chunk counts as complete.
    async fn generate(
        &mut self,
        api_key: &str,
        messages: Vec<ChatMessage>,
        preview: &mut dyn PreviewSurface,
        cancel: &CancellationToken,
    ) -> Result<Option<FinishReason>, EditError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            messages,
            stream: true,
        };
        let mut stream = self.client.stream(api_key, request);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(session = %self.id, "generation cancelled");
                    return Ok(None);
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            if !chunk.delta.is_empty() {
                self.state.accumulated.push_str(&chunk.delta);
                preview.update(Side::Proposed, &self.state.proposed());
            }
            if chunk.is_final {
                let reason = chunk.finish_reason.unwrap_or(FinishReason::Complete);
                self.state.finish_reason = Some(reason);
                if reason == FinishReason::Error {
                    let message = chunk.error.unwrap_or_else(|| "generation failed".into());
                    return Err(EditError::Upstream(message));
                }
                return Ok(Some(reason));
            }
        }

        self.state.finish_reason = Some(FinishReason::Complete);
        Ok(Some(FinishReason::Complete))
    }

    /// Put the original selection back verbatim.
    async fn restore(
        &mut self,
        document: &mut dyn Document,
        request: &EditRequest,
    ) -> Result<EditOutcome, EditError> {
        self.enter(Phase::Cancelling);
        document.replace_selection(request.original_text()).await?;
        self.enter(Phase::Cancelled);
        Ok(EditOutcome::Cancelled)
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(session = %self.id, from = ?self.state.phase, to = ?phase, "phase");
        self.state.phase = phase;
    }
}
