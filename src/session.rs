//! Session data and the concurrency-safe per-user store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Which input the conversation expects next.
///
/// `Idle` is represented by absence from the store and `Terminal` by
/// removal, so the store never accumulates dead entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Document persisted, waiting for the user's name
    AwaitingName,
    /// Name recorded, waiting for the roll number
    AwaitingRollNumber,
    /// Pipeline running; no further input accepted
    Processing,
}

/// Per-user record tracking conversation progress and owned artifacts.
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: i64,
    pub chat_id: i64,
    pub state: SessionState,
    /// Persisted inbound file, owned by the pipeline until consumed
    pub source_path: PathBuf,
    pub source_file_name: String,
    /// Username or numeric id fallback, used for artifact naming
    pub display_identifier: String,
    pub name: Option<String>,
    pub roll_number: Option<String>,
    /// Footer-injected derivative, recorded before the stage runs so a
    /// partial file is still released
    pub footered_path: Option<PathBuf>,
    /// Converted output, recorded before the converter runs
    pub output_path: Option<PathBuf>,
    pub created_at: Instant,
}

impl Session {
    #[must_use]
    pub fn new(
        user_id: i64,
        chat_id: i64,
        source_path: PathBuf,
        source_file_name: String,
        display_identifier: String,
    ) -> Self {
        Self {
            user_id,
            chat_id,
            state: SessionState::AwaitingName,
            source_path,
            source_file_name,
            display_identifier,
            name: None,
            roll_number: None,
            footered_path: None,
            output_path: None,
            created_at: Instant::now(),
        }
    }

    /// Artifact paths in deletion order: source, derivative, output.
    #[must_use]
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.source_path.clone()];
        paths.extend(self.footered_path.clone());
        paths.extend(self.output_path.clone());
        paths
    }
}

/// Ephemeral user-id → session mapping with per-entry mutual exclusion.
///
/// Handlers for the same user serialize on the entry `Mutex`; the outer
/// map lock is held only for lookup, insert, and remove. Entry guards
/// must never be held across converter or delivery awaits.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, returning any displaced entry for teardown.
    pub async fn replace(&self, session: Session) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.user_id, Arc::new(Mutex::new(session)))
    }

    pub async fn get(&self, user_id: i64) -> Option<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        sessions.get(&user_id).cloned()
    }

    /// Remove the user's entry only if it is still `entry`.
    ///
    /// A session can be displaced while teardown for it is in flight;
    /// comparing entry identity keeps a stale release from deleting
    /// the replacement.
    pub async fn remove_if(&self, user_id: i64, entry: &Arc<Mutex<Session>>) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&user_id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            sessions.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        let sessions = self.sessions.read().await;
        sessions.is_empty()
    }

    /// Entries older than `ttl` that are not mid-pipeline.
    ///
    /// Uses `try_lock` so a busy entry (handler in flight) is skipped
    /// rather than waited on.
    pub async fn stale(&self, ttl: Duration) -> Vec<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        let mut out = Vec::new();
        for entry in sessions.values() {
            if let Ok(session) = entry.try_lock() {
                if session.state != SessionState::Processing && session.created_at.elapsed() >= ttl
                {
                    out.push(entry.clone());
                }
            }
        }
        out
    }
}
