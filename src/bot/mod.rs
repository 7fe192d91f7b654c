/// Telegram update handlers and dispatch schema
pub mod handlers;
/// Outbound delivery with bounded retry and rate-limit backoff
pub mod resilient;
/// Transport seam over the Telegram API
pub mod transport;
