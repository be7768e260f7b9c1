//! Application state and composition.

use std::sync::Arc;

use tokio::sync::Mutex;

use loremaster_domain::SessionId;

use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::ports::{ClockPort, ModelBackend, SpeechPort};
use crate::infrastructure::provider::Provider;
use crate::infrastructure::store::{AdventureStore, RulesStore};
use crate::use_cases::context::ContextEngine;
use crate::use_cases::session::{GameSession, SessionRegistry};
use crate::use_cases::state::{SkipPolicy, StateError};
use crate::use_cases::turn::DmAgent;

/// Settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub tts_enabled: bool,
    pub skip_policy: SkipPolicy,
}

/// Main application state.
///
/// Holds the stores, the model-facing collaborators, and the registry of
/// live sessions. Passed to HTTP/WebSocket handlers via Axum state.
pub struct App {
    pub store: Arc<AdventureStore>,
    pub rules: Arc<RulesStore>,
    pub registry: SessionRegistry,
    pub context: ContextEngine,
    pub agent: DmAgent,
    pub speech: Arc<dyn SpeechPort>,
    pub clock: Arc<dyn ClockPort>,
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub tts_enabled: bool,
    pub skip_policy: SkipPolicy,
}

impl App {
    /// Wire up the application from its leaf collaborators.
    pub fn new(
        store: Arc<AdventureStore>,
        rules: Arc<RulesStore>,
        backend: Arc<dyn ModelBackend>,
        speech: Arc<dyn SpeechPort>,
        config: AppConfig,
    ) -> Self {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        let agent = DmAgent::new(backend, Arc::clone(&speech), Arc::clone(&rules));
        let context = ContextEngine::new(Arc::clone(&store));

        Self {
            store,
            rules,
            registry: SessionRegistry::new(),
            context,
            agent,
            speech,
            clock,
            provider: config.provider,
            model: config.model,
            base_url: config.base_url,
            tts_enabled: config.tts_enabled,
            skip_policy: config.skip_policy,
        }
    }

    /// Load an adventure, register a fresh session for it, and remember the
    /// adventure as the most recently played one for auto-resume.
    pub async fn open_session(
        &self,
        adventure_id: &str,
    ) -> Result<(SessionId, Arc<Mutex<GameSession>>), StateError> {
        let session =
            GameSession::open(Arc::clone(&self.store), adventure_id, self.skip_policy).await?;
        let (session_id, handle) = self.registry.insert(session);

        // Best effort; a failed marker write should not kill the session.
        if let Err(e) = self.store.save_last_adventure(adventure_id).await {
            tracing::warn!(error = %e, "Failed to record last adventure");
        }

        Ok((session_id, handle))
    }
}
