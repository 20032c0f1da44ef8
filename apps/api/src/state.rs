use std::sync::Arc;

use crate::coach::motivation::Motivator;
use crate::store::CoachStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Mastery ledger and plan persistence. `PgStore` in production.
    pub store: Arc<dyn CoachStore>,
    /// Briefing message collaborator. LLM-backed when an API key is configured.
    pub motivator: Arc<dyn Motivator>,
}
