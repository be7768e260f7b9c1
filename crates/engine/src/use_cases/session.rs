//! A running game session and the registry that tracks open ones.
//!
//! A session bundles everything a played adventure needs: the persistent
//! adventure state, the context engine over the same store, the mechanics
//! engine with the loaded party and bestiary, and the conversation log.
//! Nothing about a session is process-global; concurrent games each get
//! their own entry in the registry.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use loremaster_domain::SessionId;

use crate::infrastructure::ports::ChatMessage;
use crate::infrastructure::store::AdventureStore;
use crate::use_cases::context::ContextEngine;
use crate::use_cases::mechanics::MechanicsEngine;
use crate::use_cases::state::{AdventureState, SkipPolicy, StateError};

pub struct GameSession {
    pub state: AdventureState,
    pub context: ContextEngine,
    pub mechanics: MechanicsEngine,
    pub history: Vec<ChatMessage>,
}

impl GameSession {
    /// Open a session for an adventure: load its state and the shared party
    /// and bestiary sheets from the data directory.
    pub async fn open(
        store: Arc<AdventureStore>,
        adventure_id: &str,
        policy: SkipPolicy,
    ) -> Result<Self, StateError> {
        let state = AdventureState::load(Arc::clone(&store), adventure_id, policy).await?;
        let characters = store.load_party().await;
        let npcs = store.load_bestiary().await;
        tracing::info!(
            adventure = %adventure_id,
            party = characters.len(),
            bestiary = npcs.len(),
            "Opened game session"
        );

        let campaign = state.adventure().id.clone();
        Ok(Self {
            context: ContextEngine::new(store),
            mechanics: MechanicsEngine::new(campaign, characters, npcs),
            history: Vec::new(),
            state,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.mechanics.session_id()
    }

    pub fn adventure_id(&self) -> &str {
        self.state.adventure_id()
    }

    /// Drop the conversation. Adventure progress and combat state stay put.
    pub fn reset_conversation(&mut self) {
        self.history.clear();
    }

    /// Keep only the most recent messages so long sessions do not bloat
    /// every request with stale context.
    pub fn trim_history(&mut self, max_messages: usize) {
        if self.history.len() > max_messages {
            let excess = self.history.len() - max_messages;
            self.history.drain(..excess);
        }
    }
}

/// One row in the session listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub adventure_id: String,
    pub adventure_name: String,
}

/// Open sessions keyed by session id. Each session carries its own mutex;
/// turns on one session serialize while other sessions run freely.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Mutex<GameSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: GameSession) -> (SessionId, Arc<Mutex<GameSession>>) {
        let id = session.session_id();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(id, Arc::clone(&handle));
        (id, handle)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Mutex<GameSession>>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Ends a session. Returns `false` when the id was unknown.
    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        // Collect handles first; awaiting a session lock while holding a
        // map shard would deadlock against insert/remove.
        let handles: Vec<(SessionId, Arc<Mutex<GameSession>>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for (session_id, handle) in handles {
            let session = handle.lock().await;
            summaries.push(SessionSummary {
                session_id,
                adventure_id: session.adventure_id().to_string(),
                adventure_name: session.state.adventure().name.clone(),
            });
        }
        summaries.sort_by(|a, b| a.adventure_id.cmp(&b.adventure_id));
        summaries
    }
}
