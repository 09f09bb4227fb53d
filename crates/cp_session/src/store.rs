use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use cp_core::{Error, Result};
use crate::session::{Session, SessionId};

pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory registry of live sessions.
///
/// Each session sits behind its own mutex so events for one session apply in
/// order while different sessions proceed independently.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> SessionId {
        let session = Session::new();
        let id = session.id();
        self.sessions.write().await.insert(id, Arc::new(Mutex::new(session)));
        tracing::debug!("🆕 Created session {}", id);
        id
    }

    pub async fn get(&self, id: &SessionId) -> Result<SharedSession> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))
    }

    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions inactive for longer than `max_idle`. Sessions currently
    /// locked by a request are kept. Returns how many were removed.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(session) => session.last_active() >= cutoff,
            Err(_) => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!("🧹 Pruned {} idle sessions", removed);
        }
        removed
    }
}
