//! Per-user conversation state machine.
//!
//! Gates the strict document → name → roll number → processing order,
//! with cancel available from any point. Inbound events arrive already
//! classified by the dispatch schema; everything here is transport- and
//! converter-agnostic so tests can drive it with mocks.

use crate::bot::resilient::RetryingMessenger;
use crate::bot::transport::Transport;
use crate::cleanup::CleanupManager;
use crate::config::SUPPORTED_EXTENSION;
use crate::conversation::messages::{
    BUSY, CANCELLED, PROMPT_NAME, PROMPT_ROLL, RECEIVE_FAILURE, REPROMPT_NAME, REPROMPT_ROLL,
    UNSUPPORTED, WELCOME,
};
use crate::pipeline::convert::Converter;
use crate::pipeline::DocumentPipeline;
use crate::session::{Session, SessionState, SessionStore};
use crate::utils::sanitize_file_component;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// User-facing prompts. Always generic; diagnostics stay in logs.
pub mod messages {
    pub const WELCOME: &str = "👋 Welcome to the Document Footer Bot!\n\n\
        To use this bot:\n\
        1. Send a DOCX file\n\
        2. When prompted, send your name\n\
        3. When prompted, send your roll number\n\n\
        The bot will add this information as a footer to your document \
        and send it back as a PDF.";
    pub const UNSUPPORTED: &str = "❌ Unsupported file type. Please send a DOCX file.";
    pub const BUSY: &str =
        "⏳ Your previous document is still being processed. Please wait for it to finish.";
    pub const PROMPT_NAME: &str = "Please send your name:";
    pub const PROMPT_ROLL: &str = "Please send your roll number:";
    pub const REPROMPT_NAME: &str = "❌ Please provide a valid name:";
    pub const REPROMPT_ROLL: &str = "❌ Please provide a valid roll number:";
    pub const CANCELLED: &str = "Operation cancelled. Send a document to begin again.";
    pub const RECEIVE_FAILURE: &str =
        "❌ An error occurred while receiving your document. Please try again.";
}

/// What a text turn resolved to while the entry lock was held.
enum Turn {
    Prompt(&'static str),
    Process(Arc<Mutex<Session>>),
    Ignore,
}

/// Drives sessions through the conversation states and hands completed
/// ones to the pipeline.
pub struct ConversationMachine<T, C> {
    store: Arc<SessionStore>,
    messenger: RetryingMessenger<T>,
    pipeline: DocumentPipeline<C>,
    cleanup: Arc<CleanupManager>,
    work_dir: PathBuf,
}

impl<T: Transport, C: Converter> ConversationMachine<T, C> {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        messenger: RetryingMessenger<T>,
        pipeline: DocumentPipeline<C>,
        cleanup: Arc<CleanupManager>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            messenger,
            pipeline,
            cleanup,
            work_dir,
        }
    }

    pub async fn on_start(&self, chat_id: i64) {
        self.messenger.send_text(chat_id, WELCOME).await;
    }

    /// Inbound document: extension gate, replace-or-reject against any
    /// existing session, persist, open the conversation.
    pub async fn on_document(
        &self,
        user_id: i64,
        chat_id: i64,
        display_identifier: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        if extension.as_deref() != Some(SUPPORTED_EXTENSION) {
            debug!(user_id, file_name, "Rejected unsupported document type");
            self.messenger.send_text(chat_id, UNSUPPORTED).await;
            return;
        }

        if let Some(entry) = self.store.get(user_id).await {
            if entry.lock().await.state == SessionState::Processing {
                // A document is already mid-pipeline for this user.
                self.messenger.send_text(chat_id, BUSY).await;
                return;
            }
            info!(user_id, "New submission replaces pending session");
            self.cleanup.release(&entry).await;
        }

        let safe_ident = sanitize_file_component(display_identifier);
        let safe_name = sanitize_file_component(file_name);
        let source_path = self.work_dir.join(format!("{safe_ident}_{safe_name}"));
        if let Err(e) = tokio::fs::write(&source_path, &bytes).await {
            warn!(user_id, error = %e, "Failed to persist inbound document");
            self.messenger.send_text(chat_id, RECEIVE_FAILURE).await;
            return;
        }

        let session = Session::new(
            user_id,
            chat_id,
            source_path,
            file_name.to_string(),
            safe_ident,
        );
        self.store.replace(session).await;
        info!(user_id, file_name, "Document accepted, awaiting name");
        self.messenger.send_text(chat_id, PROMPT_NAME).await;
    }

    /// Text turn, dispatched on the current session state. Empty input
    /// re-prompts without a transition; the roll-number turn runs the
    /// pipeline synchronously and ends the session.
    pub async fn on_text(&self, user_id: i64, chat_id: i64, text: &str) {
        let Some(entry) = self.store.get(user_id).await else {
            // No open conversation; plain text is routed elsewhere.
            debug!(user_id, "Ignoring text without an active session");
            return;
        };
        let trimmed = text.trim();

        let turn = {
            let mut session = entry.lock().await;
            match session.state {
                SessionState::AwaitingName => {
                    if trimmed.is_empty() {
                        Turn::Prompt(REPROMPT_NAME)
                    } else {
                        session.name = Some(trimmed.to_string());
                        session.state = SessionState::AwaitingRollNumber;
                        Turn::Prompt(PROMPT_ROLL)
                    }
                }
                SessionState::AwaitingRollNumber => {
                    if trimmed.is_empty() {
                        Turn::Prompt(REPROMPT_ROLL)
                    } else {
                        session.roll_number = Some(trimmed.to_string());
                        session.state = SessionState::Processing;
                        Turn::Process(entry.clone())
                    }
                }
                SessionState::Processing => Turn::Ignore,
            }
            // Entry guard drops here; the pipeline must not run under it
        };

        match turn {
            Turn::Prompt(message) => {
                self.messenger.send_text(chat_id, message).await;
            }
            Turn::Process(entry) => {
                info!(user_id, "Inputs complete, starting pipeline");
                self.pipeline
                    .process(entry, &self.messenger, &self.cleanup)
                    .await;
            }
            Turn::Ignore => debug!(user_id, "Ignoring text while processing"),
        }
    }

    /// Cancel: release artifacts and terminate the session. The
    /// confirmation is sent even when no session exists.
    pub async fn on_cancel(&self, user_id: i64, chat_id: i64) {
        if let Some(entry) = self.store.get(user_id).await {
            self.cleanup.release(&entry).await;
            info!(user_id, "Session cancelled");
        }
        self.messenger.send_text(chat_id, CANCELLED).await;
    }

    /// Release conversations idle past `ttl`. Mid-pipeline sessions
    /// are left alone; the pipeline always releases its own session.
    pub async fn reap_stale(&self, ttl: Duration) {
        for entry in self.store.stale(ttl).await {
            let user_id = entry.lock().await.user_id;
            info!(user_id, "Reaping stale session");
            self.cleanup.release(&entry).await;
        }
    }
}
