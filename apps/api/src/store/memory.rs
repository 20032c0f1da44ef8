use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::mastery::{MasteryRecord, ScoredAttempt};
use crate::planning::topology::PlanTopology;
use crate::store::{CoachStore, MasteryUpdate, StoreError};

#[derive(Default)]
struct MemoryState {
    mastery: HashMap<(Uuid, String), MasteryRecord>,
    /// Append order is chronological order.
    attempts: Vec<ScoredAttempt>,
    plans: HashMap<Uuid, PlanTopology>,
}

/// In-process store with the same revision semantics as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a mastery record without touching the attempt log.
    pub async fn put_mastery(&self, record: MasteryRecord) {
        let mut state = self.state.write().await;
        state
            .mastery
            .insert((record.user_id, record.skill_name.clone()), record);
    }
}

/// Scores of logged attempts tagged with `skill_name`, newest first.
fn prior_scores(
    attempts: &[ScoredAttempt],
    user_id: Uuid,
    skill_name: &str,
    limit: usize,
) -> Vec<f64> {
    let mut matching: Vec<&ScoredAttempt> = attempts
        .iter()
        .filter(|a| a.user_id == user_id && a.skill_names.iter().any(|s| s == skill_name))
        .collect();
    // Stable sort keeps append order for equal timestamps; reverse makes it newest-first.
    matching.sort_by_key(|a| a.created_at);
    matching
        .into_iter()
        .rev()
        .take(limit)
        .map(|a| a.score)
        .collect()
}

#[async_trait]
impl CoachStore for MemoryStore {
    async fn get_mastery(
        &self,
        user_id: Uuid,
        skill_name: &str,
    ) -> Result<Option<MasteryRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .mastery
            .get(&(user_id, skill_name.to_string()))
            .cloned())
    }

    async fn list_mastery(&self, user_id: Uuid) -> Result<Vec<MasteryRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<MasteryRecord> = state
            .mastery
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.skill_name.cmp(&b.skill_name))
        });
        Ok(records)
    }

    async fn record_attempt(
        &self,
        attempt: &ScoredAttempt,
        history_limit: usize,
        update: &MasteryUpdate,
    ) -> Result<Vec<MasteryRecord>, StoreError> {
        // One write guard across every read, update and write.
        let mut state = self.state.write().await;
        let mut updated = Vec::with_capacity(attempt.skill_names.len());
        for skill in &attempt.skill_names {
            let key = (attempt.user_id, skill.clone());
            let prior = prior_scores(&state.attempts, attempt.user_id, skill, history_limit);
            let record = update(skill.as_str(), state.mastery.get(&key).cloned(), &prior);
            state.mastery.insert(key, record.clone());
            updated.push(record);
        }
        state.attempts.push(attempt.clone());
        Ok(updated)
    }

    async fn count_attempts_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.created_at >= since)
            .count() as u64)
    }

    async fn latest_plan_id(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .plans
            .values()
            .filter(|t| t.plan.user_id == user_id)
            .max_by_key(|t| t.plan.created_at)
            .map(|t| t.plan.id))
    }

    async fn plan_id_for_task(&self, task_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .plans
            .values()
            .find(|t| t.task(task_id).is_some())
            .map(|t| t.plan.id))
    }

    async fn load_topology(&self, plan_id: Uuid) -> Result<Option<PlanTopology>, StoreError> {
        let state = self.state.read().await;
        Ok(state.plans.get(&plan_id).cloned())
    }

    async fn insert_topology(&self, topology: &PlanTopology) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.plans.insert(topology.plan.id, topology.clone());
        Ok(())
    }

    async fn commit_topology(&self, topology: &PlanTopology) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        let plan_id = topology.plan.id;
        let stored = state
            .plans
            .get_mut(&plan_id)
            .ok_or(StoreError::MissingPlan(plan_id))?;

        if stored.plan.revision != topology.plan.revision {
            return Err(StoreError::Conflict {
                plan_id,
                expected: topology.plan.revision,
            });
        }

        let mut next = topology.clone();
        next.plan.revision += 1;
        next.plan.updated_at = Utc::now();
        let revision = next.plan.revision;
        *stored = next;
        Ok(revision)
    }
}
