//! ============================================================================
//! Session Store - Per-Session Conversation State
//! ============================================================================
//! Keys conversation state by session identifier so independent callers never
//! share history or pending confirmations. Turns within one session are
//! serialized through the session's own lock; different sessions proceed
//! concurrently.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::agent::MinimaAgent;
use crate::executor::CommandRunner;
use crate::provider::ChatProvider;

struct SessionEntry {
    agent: Arc<Mutex<MinimaAgent>>,
    last_active: Instant,
}

/// Registry of per-session agents, created on first use.
pub struct SessionStore {
    provider: Arc<dyn ChatProvider>,
    runner: Arc<dyn CommandRunner>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn ChatProvider>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            provider,
            runner,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Process one message within the named session, creating the session on
    /// first use. Turns within a session run strictly one at a time.
    pub async fn chat(&self, session_id: &str, message: &str) -> String {
        let agent = self.get_or_create(session_id).await;
        let mut agent = agent.lock().await;
        agent.chat(message).await
    }

    /// Clear the named session's history and pending confirmation. The
    /// session itself survives.
    pub async fn reset(&self, session_id: &str) {
        let sessions = self.sessions.read().await;
        if let Some(entry) = sessions.get(session_id) {
            entry.agent.lock().await.reset();
            info!("Session `{}` reset", session_id);
        }
    }

    /// Drop the named session entirely.
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Drop sessions idle longer than `max_idle`; returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.last_active.elapsed() <= max_idle;
            if !keep {
                debug!("Evicting idle session `{}`", id);
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<MinimaAgent>> {
        {
            let mut sessions = self.sessions.write().await;
            if let Some(entry) = sessions.get_mut(session_id) {
                entry.last_active = Instant::now();
                return Arc::clone(&entry.agent);
            }

            info!("Creating session `{}`", session_id);
            let agent = Arc::new(Mutex::new(MinimaAgent::new(
                Arc::clone(&self.provider),
                Arc::clone(&self.runner),
            )));
            sessions.insert(
                session_id.to_string(),
                SessionEntry {
                    agent: Arc::clone(&agent),
                    last_active: Instant::now(),
                },
            );
            agent
        }
    }
}
