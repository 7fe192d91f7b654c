//! Document transformation pipeline.
//!
//! Orchestrates footer injection, PDF conversion, and delivery, and
//! guarantees that every artifact produced along the way is released
//! before the pipeline returns, on success and on every failure path.

pub mod convert;
pub mod footer;

use crate::bot::resilient::RetryingMessenger;
use crate::bot::transport::Transport;
use crate::cleanup::CleanupManager;
use crate::config::{SUPPORTED_EXTENSION, TARGET_FORMAT};
use crate::error::PipelineError;
use crate::session::Session;
use crate::utils::sanitize_file_component;
use convert::Converter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

const SUCCESS: &str = "✅ Document processed successfully!";
const FAILURE: &str = "❌ An error occurred while processing your document. Please try again.";
const DELIVERY_FAILURE: &str =
    "⚠️ The converted document could not be delivered. Please send it again.";

/// Footer injection → conversion → delivery for one session.
pub struct DocumentPipeline<C> {
    converter: Arc<C>,
    work_dir: PathBuf,
}

impl<C: Converter> DocumentPipeline<C> {
    #[must_use]
    pub fn new(converter: Arc<C>, work_dir: PathBuf) -> Self {
        Self {
            converter,
            work_dir,
        }
    }

    /// Run the full transformation for the session held by `entry`,
    /// which must be in `Processing` state.
    ///
    /// A transformation failure aborts with a generic user message; a
    /// delivery failure is reported without re-running prior steps.
    /// Cleanup runs unconditionally at the end and releases this entry
    /// only, never a replacement that has taken over the user's slot.
    pub async fn process<T: Transport>(
        &self,
        entry: Arc<Mutex<Session>>,
        messenger: &RetryingMessenger<T>,
        cleanup: &CleanupManager,
    ) {
        let (user_id, chat_id) = {
            let session = entry.lock().await;
            (session.user_id, session.chat_id)
        };
        match self.transform(&entry).await {
            Ok(output) => {
                let display_name = output
                    .file_name()
                    .map_or_else(
                        || format!("document.{TARGET_FORMAT}"),
                        |name| name.to_string_lossy().into_owned(),
                    );
                if messenger.send_document(chat_id, &output, &display_name).await {
                    messenger.send_text(chat_id, SUCCESS).await;
                } else {
                    messenger.send_text(chat_id, DELIVERY_FAILURE).await;
                }
            }
            Err(e) => {
                error!(user_id, error = %e, "Pipeline failed");
                messenger.send_text(chat_id, FAILURE).await;
            }
        }
        cleanup.release(&entry).await;
    }

    /// Footer injection and conversion. Each stage's artifact path is
    /// recorded on the session before the stage runs, so teardown also
    /// sees partial files left behind by a mid-stage failure or a
    /// killed converter.
    async fn transform(&self, entry: &Arc<Mutex<Session>>) -> Result<PathBuf, PipelineError> {
        let (user_id, source, name, roll) = {
            let session = entry.lock().await;
            (
                session.user_id,
                session.source_path.clone(),
                session.name.clone().unwrap_or_default(),
                session.roll_number.clone().unwrap_or_default(),
            )
        };
        let base = format!(
            "{}_{}",
            sanitize_file_component(&name),
            sanitize_file_component(&roll)
        );
        let footered = self.work_dir.join(format!("{base}.{SUPPORTED_EXTENSION}"));
        entry.lock().await.footered_path = Some(footered.clone());

        // Zip rewriting is blocking file I/O; keep it off the runtime
        let target = footered.clone();
        tokio::task::spawn_blocking(move || footer::inject_footer(&source, &target, &name, &roll))
            .await??;
        info!(user_id, file = %footered.display(), "Footer injected");

        entry.lock().await.output_path =
            Some(self.work_dir.join(format!("{base}.{TARGET_FORMAT}")));
        let output = self.converter.convert(&footered, &self.work_dir).await?;
        entry.lock().await.output_path = Some(output.clone());
        info!(user_id, file = %output.display(), "Conversion finished");
        Ok(output)
    }
}
