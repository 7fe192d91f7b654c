//! Telegram bot that stamps a name / roll number / page number footer
//! into submitted DOCX documents and returns them converted to PDF.

/// Telegram-facing plumbing: dispatch schema, handlers, transport
pub mod bot;
/// Guaranteed artifact teardown and orphan sweeping
pub mod cleanup;
/// Settings and fixed tunables
pub mod config;
/// Per-user conversation state machine
pub mod conversation;
/// Error taxonomy for pipeline stages and delivery
pub mod error;
/// Footer injection and PDF conversion pipeline
pub mod pipeline;
/// Session data and the concurrency-safe store
pub mod session;
/// Shared helpers
pub mod utils;
