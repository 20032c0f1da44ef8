//! Persistence seam for the mastery ledger and plan topologies.
//!
//! `AppState` carries an `Arc<dyn CoachStore>`: `PgStore` in production,
//! `MemoryStore` in tests.
//!
//! Plans use optimistic concurrency. `commit_topology` writes the aggregate only
//! if the stored revision still equals `topology.plan.revision`, and bumps it.
//! Callers re-run their whole read-mutate-commit cycle on `StoreError::Conflict`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::mastery::{MasteryRecord, ScoredAttempt};
use crate::planning::topology::PlanTopology;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("plan {plan_id} was modified concurrently (expected revision {expected})")]
    Conflict { plan_id: Uuid, expected: i64 },

    #[error("plan {0} does not exist")]
    MissingPlan(Uuid),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Computes a skill's next record from its current one and its prior scores.
pub type MasteryUpdate = dyn Fn(&str, Option<MasteryRecord>, &[f64]) -> MasteryRecord + Send + Sync;

#[async_trait]
pub trait CoachStore: Send + Sync {
    // ── Mastery ledger ──────────────────────────────────────────────────────

    async fn get_mastery(
        &self,
        user_id: Uuid,
        skill_name: &str,
    ) -> Result<Option<MasteryRecord>, StoreError>;

    /// All records for a user, highest score first.
    async fn list_mastery(&self, user_id: Uuid) -> Result<Vec<MasteryRecord>, StoreError>;

    /// Applies `attempt` to the mastery record of every skill it names, then
    /// appends it to the attempt log. Each (user, skill) record is read,
    /// recomputed by `update` and written while the store holds that skill's
    /// lock, so concurrent attempts never lose an increment. The prior scores
    /// passed to `update` are newest first, at most `history_limit`, and never
    /// include `attempt` itself.
    async fn record_attempt(
        &self,
        attempt: &ScoredAttempt,
        history_limit: usize,
        update: &MasteryUpdate,
    ) -> Result<Vec<MasteryRecord>, StoreError>;

    async fn count_attempts_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // ── Plan topology ───────────────────────────────────────────────────────

    /// The user's most recently created plan.
    async fn latest_plan_id(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError>;

    async fn plan_id_for_task(&self, task_id: Uuid) -> Result<Option<Uuid>, StoreError>;

    async fn load_topology(&self, plan_id: Uuid) -> Result<Option<PlanTopology>, StoreError>;

    /// Persists a brand-new plan with its schedule.
    async fn insert_topology(&self, topology: &PlanTopology) -> Result<(), StoreError>;

    /// Writes back a mutated topology; returns the new revision.
    async fn commit_topology(&self, topology: &PlanTopology) -> Result<i64, StoreError>;
}
