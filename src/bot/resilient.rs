//! Outbound delivery with bounded retry and rate-limit backoff.
//!
//! Transient failures consume attempts and wait a fixed delay between
//! tries; rate-limit signals wait however long the platform asked for
//! without consuming an attempt; anything else fails immediately. All
//! outcomes collapse to a boolean plus a log entry — callers never see
//! an error.

use crate::bot::transport::Transport;
use crate::config::{MAX_SEND_RETRIES, SEND_RETRY_DELAY};
use crate::error::TransportError;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

pub struct RetryingMessenger<T> {
    transport: Arc<T>,
    max_retries: usize,
    retry_delay: Duration,
}

impl<T: Transport> RetryingMessenger<T> {
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_policy(transport, MAX_SEND_RETRIES, SEND_RETRY_DELAY)
    }

    /// Policy override, used by tests to keep delays short.
    #[must_use]
    pub fn with_policy(transport: Arc<T>, max_retries: usize, retry_delay: Duration) -> Self {
        Self {
            transport,
            max_retries,
            retry_delay,
        }
    }

    pub async fn send_text(&self, chat_id: i64, text: &str) -> bool {
        self.send_with_retry(|| self.transport.send_text(chat_id, text))
            .await
    }

    pub async fn send_document(&self, chat_id: i64, path: &Path, display_name: &str) -> bool {
        self.send_with_retry(|| self.transport.send_document(chat_id, path, display_name))
            .await
    }

    async fn send_with_retry<F, Fut>(&self, mut operation: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), TransportError>>,
    {
        let mut attempts = 0usize;
        loop {
            match operation().await {
                Ok(()) => return true,
                Err(TransportError::RateLimited(wait)) => {
                    warn!(wait_secs = wait.as_secs_f64(), "Rate limited, waiting before retry");
                    tokio::time::sleep(wait).await;
                }
                Err(e @ TransportError::Transient(_)) => {
                    attempts += 1;
                    if attempts >= self.max_retries {
                        error!(attempts, error = %e, "Delivery failed after retries");
                        return false;
                    }
                    warn!(attempt = attempts, error = %e, "Delivery attempt failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(TransportError::InstanceConflict) => {
                    // Never surfaced to users; another process owns the token
                    error!("Another bot instance is consuming updates; dropping message");
                    return false;
                }
                Err(e) => {
                    error!(error = %e, "Delivery failed");
                    return false;
                }
            }
        }
    }
}
