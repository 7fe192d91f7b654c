//! Guaranteed teardown of session artifacts and orphan sweeping.

use crate::session::{Session, SessionStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Extensions the sweep treats as transient artifacts.
const TRANSIENT_EXTENSIONS: &[&str] = &["docx", "pdf"];

/// Deletes session artifacts on every exit path and sweeps the work
/// directory for files orphaned by crashes between pipeline steps.
pub struct CleanupManager {
    store: Arc<SessionStore>,
    work_dir: PathBuf,
}

impl CleanupManager {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, work_dir: PathBuf) -> Self {
        Self { store, work_dir }
    }

    /// Delete every artifact recorded on the session, then drop it
    /// from the store only if this entry still occupies the user's
    /// slot. An entry displaced by a newer submission still has its
    /// artifacts deleted without touching the replacement. Individual
    /// deletion failures are logged and ignored; missing files are
    /// tolerated.
    pub async fn release(&self, entry: &Arc<Mutex<Session>>) {
        let session = entry.lock().await.clone();
        for path in session.artifacts() {
            remove_artifact(&path).await;
        }
        if self.store.remove_if(session.user_id, entry).await {
            debug!(user_id = session.user_id, "Session released");
        }
    }

    /// Remove orphaned transient files from the work directory.
    ///
    /// Runs at process startup and after the dispatcher stops.
    pub async fn sweep(&self) {
        let mut entries = match tokio::fs::read_dir(&self.work_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.work_dir.display(), error = %e, "Sweep skipped");
                return;
            }
        };

        let mut removed = 0usize;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.work_dir.display(), error = %e, "Sweep aborted");
                    break;
                }
            };

            let path = entry.path();
            let is_transient = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| TRANSIENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());

            if is_transient && is_file {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(file = %path.display(), error = %e, "Sweep deletion failed"),
                }
            }
        }

        if removed > 0 {
            info!(dir = %self.work_dir.display(), removed, "Swept orphaned artifacts");
        }
    }
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(file = %path.display(), "Artifact removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Artifact deletion failed"),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: i64, source: &Path) -> Session {
        Session::new(
            user_id,
            user_id,
            source.to_path_buf(),
            "report.docx".to_string(),
            "u".to_string(),
        )
    }

    #[tokio::test]
    async fn test_release_deletes_artifacts_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("u_report.docx");
        let footered = dir.path().join("Alice_42.docx");
        tokio::fs::write(&source, b"src").await.unwrap();
        tokio::fs::write(&footered, b"ftr").await.unwrap();

        let store = Arc::new(SessionStore::new());
        store.replace(session(9, &source)).await;
        let entry = store.get(9).await.unwrap();
        {
            let mut s = entry.lock().await;
            s.footered_path = Some(footered.clone());
            // Output path never produced; deletion must tolerate it missing
            s.output_path = Some(dir.path().join("Alice_42.pdf"));
        }

        let cleanup = CleanupManager::new(store.clone(), dir.path().to_path_buf());
        cleanup.release(&entry).await;

        assert!(!source.exists());
        assert!(!footered.exists());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_of_displaced_entry_keeps_current_session() {
        let dir = tempfile::tempdir().unwrap();
        let old_source = dir.path().join("u_first.docx");
        let new_source = dir.path().join("u_second.docx");
        tokio::fs::write(&old_source, b"old").await.unwrap();
        tokio::fs::write(&new_source, b"new").await.unwrap();

        let store = Arc::new(SessionStore::new());
        store.replace(session(9, &old_source)).await;
        let old = store.get(9).await.unwrap();
        store.replace(session(9, &new_source)).await;

        let cleanup = CleanupManager::new(store.clone(), dir.path().to_path_buf());
        cleanup.release(&old).await;

        assert!(!old_source.exists());
        assert!(new_source.exists());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_transient_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("stale.docx"), b"x")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("stale.pdf"), b"x")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("keep.txt"), b"x")
            .await
            .unwrap();

        let store = Arc::new(SessionStore::new());
        let cleanup = CleanupManager::new(store, dir.path().to_path_buf());
        cleanup.sweep().await;

        assert!(!dir.path().join("stale.docx").exists());
        assert!(!dir.path().join("stale.pdf").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_missing_dir() {
        let store = Arc::new(SessionStore::new());
        let cleanup = CleanupManager::new(store, PathBuf::from("does/not/exist"));
        cleanup.sweep().await;
    }
}
