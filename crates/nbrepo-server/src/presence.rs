//! Advisory presence for shared notebooks.
//!
//! A heartbeat records "user U had notebook N open at time T". Anyone whose
//! last heartbeat is within the liveness window counts as an active editor.
//! Nothing here blocks a write; callers only use the result to warn.
//!
//! Expiry is a read-time comparison against the window. Every write prunes
//! expired entries across all keys and drops keys left with no editors, so
//! the table stays bounded by recent activity without a background task.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nbrepo_core::Username;
use serde::Serialize;
use tokio::sync::RwLock;

/// Another user currently holding a notebook open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveEditor {
    pub user: Username,
    pub last_seen: DateTime<Utc>,
}

/// Source of the "who else is editing" signal.
///
/// The shipped implementation answers polls from memory; a streaming
/// implementation can replace it without touching callers.
#[async_trait]
pub trait PresenceMonitor: Send + Sync {
    /// Refresh `user`'s liveness on `key` and return the other active editors.
    async fn heartbeat(&self, key: &str, user: &Username, now: DateTime<Utc>) -> Vec<ActiveEditor>;

    /// Active editors on `key`, without recording anything.
    async fn active_editors(&self, key: &str, now: DateTime<Utc>) -> Vec<ActiveEditor>;

    /// How long a heartbeat stays live.
    fn window(&self) -> Duration;
}

/// In-process presence table keyed by owner-qualified notebook path.
#[derive(Debug, Clone)]
pub struct InMemoryPresence {
    sessions: Arc<RwLock<HashMap<String, HashMap<Username, DateTime<Utc>>>>>,
    window: Duration,
}

impl InMemoryPresence {
    pub fn new(window: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            window,
        }
    }

    fn is_live(&self, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_seen <= self.window
    }

    /// Number of keys currently tracked, live or not.
    pub async fn tracked_keys(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn sorted(mut editors: Vec<ActiveEditor>) -> Vec<ActiveEditor> {
    editors.sort_by(|a, b| a.user.cmp(&b.user));
    editors
}

#[async_trait]
impl PresenceMonitor for InMemoryPresence {
    async fn heartbeat(&self, key: &str, user: &Username, now: DateTime<Utc>) -> Vec<ActiveEditor> {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, editors| {
            editors.retain(|_, last_seen| self.is_live(*last_seen, now));
            !editors.is_empty()
        });

        let editors = sessions.entry(key.to_string()).or_default();
        editors.insert(user.clone(), now);

        sorted(
            editors
                .iter()
                .filter(|(editor, _)| *editor != user)
                .map(|(editor, last_seen)| ActiveEditor {
                    user: editor.clone(),
                    last_seen: *last_seen,
                })
                .collect(),
        )
    }

    async fn active_editors(&self, key: &str, now: DateTime<Utc>) -> Vec<ActiveEditor> {
        let sessions = self.sessions.read().await;
        let Some(editors) = sessions.get(key) else {
            return Vec::new();
        };

        sorted(
            editors
                .iter()
                .filter(|(_, last_seen)| self.is_live(**last_seen, now))
                .map(|(editor, last_seen)| ActiveEditor {
                    user: editor.clone(),
                    last_seen: *last_seen,
                })
                .collect(),
        )
    }

    fn window(&self) -> Duration {
        self.window
    }
}

// ============================================================================
// Tests
// ============================================================================
