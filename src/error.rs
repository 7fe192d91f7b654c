//! Error taxonomy for the document pipeline and outbound delivery.
//!
//! Expected outcomes (validation re-prompts, conversion failures) are
//! modeled as explicit error kinds per stage; only truly unexpected
//! conditions surface as opaque errors at the handler seam.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Classified outcome of a single outbound transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network timeout or connectivity issue; worth retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// The platform asked us to wait before the next call. Not a
    /// failure; the wait duration comes from the signal itself.
    #[error("rate limited for {0:?}")]
    RateLimited(Duration),

    /// Another bot instance is consuming updates for this token.
    #[error("another bot instance is consuming updates")]
    InstanceConflict,

    /// Anything else; retrying will not help.
    #[error("delivery failed: {0}")]
    Fatal(String),
}

/// Failure while rewriting the DOCX footer parts.
#[derive(Debug, Error)]
pub enum FooterError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The archive is not a well-formed DOCX package.
    #[error("document part missing: {0}")]
    MissingPart(String),
}

/// Failure of the external converter invocation.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to run converter: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("converter timed out after {0:?}")]
    Timeout(Duration),

    /// Non-zero exit; `diagnostics` holds the captured child output.
    #[error("converter exited with {status}: {diagnostics}")]
    Failed {
        status: std::process::ExitStatus,
        diagnostics: String,
    },

    /// Exit code 0 but the expected output file never appeared.
    #[error("converter produced no output at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Any pipeline stage failure. The user always sees a generic message;
/// the full error is logged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("footer injection failed: {0}")]
    Footer(#[from] FooterError),

    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
