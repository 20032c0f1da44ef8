//! Store-backed plan operations.
//!
//! Each mutating operation loads the plan topology, mutates it in memory, and
//! commits it under the revision it was loaded at. A concurrent commit makes
//! ours fail with `StoreError::Conflict`, and the whole cycle runs again.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::{PlanDiffEntry, Task};
use crate::planning::adaptation::{
    self, AdaptationReport, AdaptationResult, KEEP_TASKS_FOR_STRONG, REINFORCEMENT_TASK_COUNT,
};
use crate::planning::topology::{PlanDraft, PlanTopology};
use crate::store::{CoachStore, StoreError};

pub const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Returns `plan_id` if given, otherwise the user's most recent plan.
pub async fn resolve_plan_id(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Option<Uuid>,
) -> Result<Uuid, AppError> {
    match plan_id {
        Some(id) => Ok(id),
        None => store
            .latest_plan_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No study plan found for user".to_string())),
    }
}

/// Loads a plan, treating plans owned by another user as absent.
pub async fn load_owned_topology(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Uuid,
) -> Result<PlanTopology, AppError> {
    store
        .load_topology(plan_id)
        .await?
        .filter(|t| t.plan.user_id == user_id)
        .ok_or_else(|| {
            AppError::NotFound(format!("Study plan {plan_id} not found for user {user_id}"))
        })
}

/// Runs `mutate` against a freshly loaded topology and commits the result,
/// retrying on revision conflicts.
pub async fn with_plan<T, F>(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Uuid,
    mut mutate: F,
) -> Result<T, AppError>
where
    F: FnMut(&mut PlanTopology) -> Result<T, AppError>,
{
    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
        let mut topology = load_owned_topology(store, user_id, plan_id).await?;
        let value = mutate(&mut topology)?;
        topology.validate()?;

        match store.commit_topology(&topology).await {
            Ok(revision) => {
                info!("Committed plan {plan_id} at revision {revision}");
                return Ok(value);
            }
            Err(StoreError::Conflict { expected, .. }) => {
                warn!(
                    "Plan {plan_id} changed under revision {expected} (attempt {attempt}/{MAX_COMMIT_ATTEMPTS}), retrying"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Conflict(format!(
        "Study plan {plan_id} is being modified concurrently, try again"
    )))
}

pub async fn get_plan(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Uuid,
) -> Result<PlanTopology, AppError> {
    load_owned_topology(store, user_id, plan_id).await
}

pub async fn import_plan(
    store: &dyn CoachStore,
    user_id: Uuid,
    draft: PlanDraft,
    now: DateTime<Utc>,
) -> Result<PlanTopology, AppError> {
    let topology = PlanTopology::from_draft(user_id, draft, now)?;
    store.insert_topology(&topology).await?;
    info!(
        "Imported plan {} for user {user_id}: {} weeks, {} tasks",
        topology.plan_id(),
        topology.weeks.len(),
        topology.tasks.len()
    );
    Ok(topology)
}

pub async fn plan_history(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Uuid,
) -> Result<Vec<PlanDiffEntry>, AppError> {
    let topology = load_owned_topology(store, user_id, plan_id).await?;
    Ok(topology.plan.adaptation_history)
}

pub async fn analyze_plan(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<(Uuid, AdaptationReport), AppError> {
    let plan_id = resolve_plan_id(store, user_id, plan_id).await?;
    let topology = load_owned_topology(store, user_id, plan_id).await?;
    let records = store.list_mastery(user_id).await?;
    Ok((
        plan_id,
        adaptation::analyze(&topology, &records, now.date_naive()),
    ))
}

pub async fn adapt_plan(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Option<Uuid>,
    apply: bool,
    now: DateTime<Utc>,
) -> Result<(Uuid, AdaptationResult), AppError> {
    let plan_id = resolve_plan_id(store, user_id, plan_id).await?;
    let records = store.list_mastery(user_id).await?;
    let today = now.date_naive();

    let result = with_plan(store, user_id, plan_id, |topology| {
        Ok(adaptation::adapt(topology, &records, apply, today, now))
    })
    .await?;

    info!(
        "Adapted plan {plan_id}: {} reinforcement tasks added, {} marked optional",
        result.summary.reinforcement_tasks_added, result.summary.tasks_marked_optional
    );
    Ok((plan_id, result))
}

pub async fn reinforce_skill(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Option<Uuid>,
    skill_name: &str,
    count: Option<usize>,
    now: DateTime<Utc>,
) -> Result<(Uuid, Vec<Task>), AppError> {
    let plan_id = resolve_plan_id(store, user_id, plan_id).await?;
    let mastery = store.get_mastery(user_id, skill_name).await?;
    let count = count.unwrap_or(REINFORCEMENT_TASK_COUNT);

    let tasks = with_plan(store, user_id, plan_id, |topology| {
        Ok(adaptation::add_reinforcement_tasks(
            topology,
            skill_name,
            mastery.as_ref(),
            count,
            now.date_naive(),
            now,
        )?)
    })
    .await?;
    Ok((plan_id, tasks))
}

pub async fn reduce_skill(
    store: &dyn CoachStore,
    user_id: Uuid,
    plan_id: Option<Uuid>,
    skill_name: &str,
    max_tasks: Option<usize>,
    now: DateTime<Utc>,
) -> Result<(Uuid, Vec<Task>), AppError> {
    let plan_id = resolve_plan_id(store, user_id, plan_id).await?;
    let max_tasks = max_tasks.unwrap_or(KEEP_TASKS_FOR_STRONG);

    let tasks = with_plan(store, user_id, plan_id, |topology| {
        Ok(adaptation::reduce_redundant_tasks(
            topology,
            skill_name,
            max_tasks,
            now.date_naive(),
        )?)
    })
    .await?;
    Ok((plan_id, tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;

    use crate::models::mastery::{MasteryRecord, ScoredAttempt, Trend};
    use crate::models::plan::TaskStatus;
    use crate::planning::topology::fixtures::{add_task, empty_topology};
    use crate::store::{MasteryUpdate, MemoryStore};

    async fn seeded(store: &MemoryStore, user_id: Uuid) -> Uuid {
        let mut topology = empty_topology(user_id);
        add_task(
            &mut topology,
            Utc::now().date_naive() + Duration::days(1),
            &["Docker"],
            TaskStatus::Pending,
        );
        store.insert_topology(&topology).await.unwrap();
        topology.plan_id()
    }

    fn weak_docker(user_id: Uuid) -> MasteryRecord {
        let now = Utc::now();
        MasteryRecord {
            user_id,
            skill_name: "Docker".to_string(),
            score: 0.2,
            practice_count: 4,
            trend: Some(Trend::Declining),
            last_practiced_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_adapt_plan_commits_and_uses_latest_plan() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let plan_id = seeded(&store, user).await;
        store.put_mastery(weak_docker(user)).await;

        let (resolved, result) = adapt_plan(&store, user, None, true, Utc::now()).await.unwrap();
        assert_eq!(resolved, plan_id);
        assert_eq!(result.summary.reinforcement_tasks_added, 2);

        let stored = store.load_topology(plan_id).await.unwrap().unwrap();
        assert_eq!(stored.tasks.len(), 3);
        assert_eq!(stored.plan.revision, 1);
        assert_eq!(plan_history(&store, user, plan_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_users_plan_is_not_found() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let plan_id = seeded(&store, owner).await;

        let err = analyze_plan(&store, Uuid::new_v4(), Some(plan_id), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = adapt_plan(&store, Uuid::new_v4(), None, true, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reinforce_skill_rejects_empty_name() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let plan_id = seeded(&store, user).await;

        let err = reinforce_skill(&store, user, Some(plan_id), " ", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let stored = store.load_topology(plan_id).await.unwrap().unwrap();
        assert_eq!(stored.plan.revision, 0);
    }

    /// Lets the first `conflicts` commits fail as if another writer won.
    struct ContendedStore {
        inner: MemoryStore,
        conflicts: AtomicUsize,
        commits_tried: AtomicUsize,
    }

    #[async_trait]
    impl CoachStore for ContendedStore {
        async fn get_mastery(&self, u: Uuid, s: &str) -> Result<Option<MasteryRecord>, StoreError> {
            self.inner.get_mastery(u, s).await
        }
        async fn list_mastery(&self, u: Uuid) -> Result<Vec<MasteryRecord>, StoreError> {
            self.inner.list_mastery(u).await
        }
        async fn record_attempt(
            &self,
            a: &ScoredAttempt,
            limit: usize,
            update: &MasteryUpdate,
        ) -> Result<Vec<MasteryRecord>, StoreError> {
            self.inner.record_attempt(a, limit, update).await
        }
        async fn count_attempts_since(
            &self,
            u: Uuid,
            since: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.inner.count_attempts_since(u, since).await
        }
        async fn latest_plan_id(&self, u: Uuid) -> Result<Option<Uuid>, StoreError> {
            self.inner.latest_plan_id(u).await
        }
        async fn plan_id_for_task(&self, t: Uuid) -> Result<Option<Uuid>, StoreError> {
            self.inner.plan_id_for_task(t).await
        }
        async fn load_topology(&self, p: Uuid) -> Result<Option<PlanTopology>, StoreError> {
            self.inner.load_topology(p).await
        }
        async fn insert_topology(&self, t: &PlanTopology) -> Result<(), StoreError> {
            self.inner.insert_topology(t).await
        }
        async fn commit_topology(&self, t: &PlanTopology) -> Result<i64, StoreError> {
            self.commits_tried.fetch_add(1, Ordering::SeqCst);
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict {
                    plan_id: t.plan_id(),
                    expected: t.plan.revision,
                });
            }
            self.inner.commit_topology(t).await
        }
    }

    fn contended(conflicts: usize) -> Arc<ContendedStore> {
        Arc::new(ContendedStore {
            inner: MemoryStore::new(),
            conflicts: AtomicUsize::new(conflicts),
            commits_tried: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let store = contended(2);
        let user = Uuid::new_v4();
        let plan_id = seeded(&store.inner, user).await;

        let (_, tasks) = reinforce_skill(store.as_ref(), user, Some(plan_id), "Go", Some(2), Utc::now())
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(store.commits_tried.load(Ordering::SeqCst), 3);

        // Failed attempts leave no trace; only the winning cycle's tasks land.
        let stored = store.inner.load_topology(plan_id).await.unwrap().unwrap();
        assert_eq!(stored.tasks.len(), 3);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_max_attempts() {
        let store = contended(MAX_COMMIT_ATTEMPTS);
        let user = Uuid::new_v4();
        let plan_id = seeded(&store.inner, user).await;

        let err = adapt_plan(store.as_ref(), user, Some(plan_id), true, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let stored = store.inner.load_topology(plan_id).await.unwrap().unwrap();
        assert!(stored.plan.adaptation_history.is_empty());
    }
}
