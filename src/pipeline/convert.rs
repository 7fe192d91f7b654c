//! External document conversion behind a bounded worker pool.
//!
//! LibreOffice is invoked headless as a child process. The call blocks
//! at the OS level for however long the conversion takes, so children
//! are bounded by a semaphore and capped with a hard timeout; a slow
//! conversion can never stall unrelated sessions.

use crate::config::{CONVERT_TIMEOUT, CONVERT_WORKERS, TARGET_FORMAT};
use crate::error::ConvertError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Seam for the converter so tests can substitute their own.
#[async_trait]
pub trait Converter: Send + Sync + 'static {
    /// Convert `input` into the target format inside `outdir`,
    /// returning the produced file path.
    async fn convert(&self, input: &Path, outdir: &Path) -> Result<PathBuf, ConvertError>;
}

/// Runs `soffice --headless --convert-to pdf --outdir <dir> <input>`.
pub struct SubprocessConverter {
    binary: String,
    permits: Arc<Semaphore>,
}

impl SubprocessConverter {
    #[must_use]
    pub fn new(binary: String) -> Self {
        Self {
            binary,
            permits: Arc::new(Semaphore::new(CONVERT_WORKERS)),
        }
    }
}

/// Expected output path for `input` converted into `outdir`: same stem,
/// target extension.
fn output_path(input: &Path, outdir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    outdir.join(format!("{stem}.{TARGET_FORMAT}"))
}

#[async_trait]
impl Converter for SubprocessConverter {
    async fn convert(&self, input: &Path, outdir: &Path) -> Result<PathBuf, ConvertError> {
        // Closed permits only happen on teardown; report as spawn failure
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ConvertError::Spawn(std::io::Error::other("converter pool closed")))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg(TARGET_FORMAT)
            .arg("--outdir")
            .arg(outdir)
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(binary = %self.binary, input = %input.display(), "Spawning converter");

        let output = match tokio::time::timeout(CONVERT_TIMEOUT, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(input = %input.display(), "Converter timed out, child killed");
                return Err(ConvertError::Timeout(CONVERT_TIMEOUT));
            }
        };

        if !output.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            if diagnostics.trim().is_empty() {
                diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            return Err(ConvertError::Failed {
                status: output.status,
                diagnostics,
            });
        }

        let produced = output_path(input, outdir);
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(ConvertError::MissingOutput(produced));
        }
        Ok(produced)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_derivation() {
        let out = output_path(Path::new("/work/Alice_42.docx"), Path::new("/work"));
        assert_eq!(out, PathBuf::from("/work/Alice_42.pdf"));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.docx");
        tokio::fs::write(&input, b"docx").await.unwrap();

        let converter = SubprocessConverter::new("soffice-binary-that-does-not-exist".to_string());
        let result = converter.convert(&input, dir.path()).await;
        assert!(matches!(result, Err(ConvertError::Spawn(_))));
    }
}
