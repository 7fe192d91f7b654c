//! Outbound transport seam and its Telegram implementation.

use crate::error::TransportError;
use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile};
use teloxide::{ApiError, RequestError};

/// Outbound surface of the chat platform. The conversation machine and
/// pipeline only ever talk through this seam.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        display_name: &str,
    ) -> Result<(), TransportError>;
}

/// Live Telegram transport.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Map Telegram API failures onto the delivery taxonomy.
fn classify(error: RequestError) -> TransportError {
    match error {
        RequestError::RetryAfter(seconds) => TransportError::RateLimited(seconds.duration()),
        RequestError::Network(e) => TransportError::Transient(e.to_string()),
        RequestError::Io(e) => TransportError::Transient(e.to_string()),
        RequestError::Api(ApiError::TerminatedByOtherGetUpdates) => {
            TransportError::InstanceConflict
        }
        other => TransportError::Fatal(other.to_string()),
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        display_name: &str,
    ) -> Result<(), TransportError> {
        let file = InputFile::file(path.to_path_buf()).file_name(display_name.to_string());
        self.bot
            .send_document(ChatId(chat_id), file)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}
