//! Mastery ledger: folds scored attempts into per-skill mastery records.
//!
//! Score update: the new score is prepended to the skill's prior scores
//! (newest first, at most 10 kept). The newest five form the recent window,
//! the rest the older window:
//!
//!   score = 0.7 * avg(recent) + 0.3 * avg(older)
//!
//! falling back to whichever average exists, clamped to [0, 1].

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::mastery::trend::{classify_trend, TREND_WINDOW};
use crate::models::mastery::{MasteryRecord, ScoredAttempt, Trend};
use crate::store::CoachStore;

/// Prior scores fetched per update.
pub const HISTORY_LIMIT: usize = 20;
/// Scores (including the new one) that feed the weighted average.
pub const SCORE_WINDOW: usize = 10;
pub const RECENT_WINDOW: usize = 5;
pub const RECENT_WEIGHT: f64 = 0.7;
pub const OLDER_WEIGHT: f64 = 0.3;
/// Lookback for the "recent practice" figure in stats.
pub const RECENT_PRACTICE_DAYS: i64 = 7;

pub fn validate_score(score: f64) -> Result<(), AppError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(AppError::InvalidScore(score))
    }
}

/// Two-tier weighted average over a newest-first list. Empty input yields 0.
pub fn combined_score(scores_newest_first: &[f64]) -> f64 {
    let window = &scores_newest_first[..scores_newest_first.len().min(SCORE_WINDOW)];
    let split = window.len().min(RECENT_WINDOW);
    let (recent, older) = window.split_at(split);

    let score = match (average(recent), average(older)) {
        (Some(r), Some(o)) => RECENT_WEIGHT * r + OLDER_WEIGHT * o,
        (Some(r), None) => r,
        (None, Some(o)) => o,
        (None, None) => 0.0,
    };
    score.clamp(0.0, 1.0)
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Computes the record that results from one more scored attempt.
///
/// `prior_newest_first` must not contain the attempt being applied.
pub fn apply_attempt(
    existing: Option<MasteryRecord>,
    prior_newest_first: &[f64],
    user_id: Uuid,
    skill_name: &str,
    score: f64,
    now: DateTime<Utc>,
) -> MasteryRecord {
    let Some(mut record) = existing else {
        return MasteryRecord {
            user_id,
            skill_name: skill_name.to_string(),
            score,
            practice_count: 1,
            trend: None,
            last_practiced_at: Some(now),
            created_at: now,
            updated_at: now,
        };
    };

    let mut history = Vec::with_capacity(prior_newest_first.len() + 1);
    history.push(score);
    history.extend(prior_newest_first.iter().take(HISTORY_LIMIT).copied());

    record.score = combined_score(&history);
    record.practice_count += 1;
    record.trend = classify_trend(&history[..history.len().min(TREND_WINDOW)]);
    record.last_practiced_at = Some(now);
    record.updated_at = now;
    record
}

/// Folds one scored attempt into the mastery of every skill it names and logs
/// it. The store serializes updates per (user, skill).
pub async fn record_attempt(
    store: &dyn CoachStore,
    attempt: &ScoredAttempt,
) -> Result<Vec<MasteryRecord>, AppError> {
    validate_score(attempt.score)?;
    if attempt.skill_names.is_empty() || attempt.skill_names.iter().any(|s| s.trim().is_empty()) {
        return Err(AppError::Validation("skill_name cannot be empty".to_string()));
    }

    let (user_id, score, now) = (attempt.user_id, attempt.score, attempt.created_at);
    let update = move |skill: &str, existing: Option<MasteryRecord>, prior: &[f64]| {
        apply_attempt(existing, prior, user_id, skill, score, now)
    };
    let updated = store.record_attempt(attempt, HISTORY_LIMIT, &update).await?;

    for record in &updated {
        info!(
            "Mastery for user {user_id} skill '{}': score={:.3} count={} trend={:?}",
            record.skill_name, record.score, record.practice_count, record.trend
        );
    }
    Ok(updated)
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttemptInput {
    pub user_id: Uuid,
    pub skill_names: Vec<String>,
    pub score: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub attempt_id: Uuid,
    pub updated: Vec<MasteryRecord>,
}

/// Applies one evaluated attempt to every skill it is tagged with, then logs it.
pub async fn ingest_attempt(
    store: &dyn CoachStore,
    input: AttemptInput,
) -> Result<IngestOutcome, AppError> {
    validate_score(input.score)?;

    let mut seen = HashSet::new();
    let skills: Vec<String> = input
        .skill_names
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect();
    if skills.is_empty() {
        return Err(AppError::Validation(
            "attempt must be tagged with at least one skill".to_string(),
        ));
    }

    let attempt = ScoredAttempt {
        id: Uuid::new_v4(),
        user_id: input.user_id,
        skill_names: skills,
        score: input.score,
        created_at: input.created_at.unwrap_or_else(Utc::now),
    };
    let updated = record_attempt(store, &attempt).await?;

    Ok(IngestOutcome {
        attempt_id: attempt.id,
        updated,
    })
}

pub async fn get_skill_mastery(
    store: &dyn CoachStore,
    user_id: Uuid,
    skill_name: &str,
) -> Result<MasteryRecord, AppError> {
    store
        .get_mastery(user_id, skill_name)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Mastery record not found for skill: {skill_name}"))
        })
}

// ────────────────────────────────────────────────────────────────────────────
// Stats
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkillLevels {
    pub beginner: u32,
    pub intermediate: u32,
    pub advanced: u32,
    pub expert: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MasteryStats {
    pub total_skills: usize,
    pub average_mastery: f64,
    pub skills_by_level: SkillLevels,
    pub improving_skills: u32,
    pub stable_skills: u32,
    pub declining_skills: u32,
    pub total_practice_count: i64,
    pub recent_practice_count: u64,
}

pub fn summarize(records: &[MasteryRecord], recent_practice_count: u64) -> MasteryStats {
    if records.is_empty() {
        return MasteryStats {
            recent_practice_count,
            ..MasteryStats::default()
        };
    }

    let mut stats = MasteryStats {
        total_skills: records.len(),
        recent_practice_count,
        ..MasteryStats::default()
    };

    let mut total_score = 0.0;
    for record in records {
        total_score += record.score;
        match record.score {
            s if s < 0.3 => stats.skills_by_level.beginner += 1,
            s if s < 0.6 => stats.skills_by_level.intermediate += 1,
            s if s < 0.8 => stats.skills_by_level.advanced += 1,
            _ => stats.skills_by_level.expert += 1,
        }
        match record.trend {
            Some(Trend::Improving) => stats.improving_skills += 1,
            Some(Trend::Stable) => stats.stable_skills += 1,
            Some(Trend::Declining) => stats.declining_skills += 1,
            None => {}
        }
        stats.total_practice_count += i64::from(record.practice_count);
    }

    let average = total_score / records.len() as f64;
    stats.average_mastery = (average * 1000.0).round() / 1000.0;
    stats
}

pub async fn get_stats(store: &dyn CoachStore, user_id: Uuid) -> Result<MasteryStats, AppError> {
    let records = store.list_mastery(user_id).await?;
    let since = Utc::now() - Duration::days(RECENT_PRACTICE_DAYS);
    let recent = store.count_attempts_since(user_id, since).await?;
    Ok(summarize(&records, recent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::planning::topology::PlanTopology;
    use crate::store::{MasteryUpdate, MemoryStore, StoreError};

    fn ingest(user_id: Uuid, skills: &[&str], score: f64) -> AttemptInput {
        AttemptInput {
            user_id,
            skill_names: skills.iter().map(|s| s.to_string()).collect(),
            score,
            created_at: None,
        }
    }

    #[test]
    fn test_validate_score_bounds() {
        assert!(validate_score(0.0).is_ok());
        assert!(validate_score(1.0).is_ok());
        assert!(matches!(validate_score(-0.01), Err(AppError::InvalidScore(_))));
        assert!(matches!(validate_score(1.01), Err(AppError::InvalidScore(_))));
        assert!(matches!(validate_score(f64::NAN), Err(AppError::InvalidScore(_))));
    }

    #[test]
    fn test_combined_score_recent_only() {
        assert!((combined_score(&[0.4, 0.6]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_combined_score_two_tier() {
        // recent = five 1.0s, older = five 0.0s -> 0.7
        let scores = [1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert!((combined_score(&scores) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_combined_score_ignores_beyond_ten() {
        let mut scores = vec![0.5; 10];
        scores.extend([0.0; 10]);
        assert!((combined_score(&scores) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_first_attempt_takes_score_directly() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        for s in [0.0, 0.17, 0.5, 0.93, 1.0] {
            let record = apply_attempt(None, &[], user, "SQL", s, now);
            assert_eq!(record.score, s);
            assert_eq!(record.practice_count, 1);
            assert_eq!(record.trend, None);
            assert_eq!(record.last_practiced_at, Some(now));
        }
    }

    #[test]
    fn test_apply_attempt_sets_trend_from_five_newest() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let existing = apply_attempt(None, &[], user, "Go", 0.5, now);
        let record = apply_attempt(Some(existing), &[0.9, 0.5, 0.5, 0.5], user, "Go", 0.9, now);
        assert_eq!(record.trend, Some(Trend::Improving));
        assert_eq!(record.practice_count, 2);
    }

    #[tokio::test]
    async fn test_practice_count_tracks_attempts() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for (i, score) in [0.2, 0.9, 0.4, 0.4, 0.8, 1.0, 0.0].into_iter().enumerate() {
            let outcome = ingest_attempt(&store, ingest(user, &["Kafka"], score))
                .await
                .unwrap();
            assert_eq!(outcome.updated[0].practice_count, i as i32 + 1);
            assert!((0.0..=1.0).contains(&outcome.updated[0].score));
        }
    }

    #[tokio::test]
    async fn test_second_attempt_averages_with_history() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        ingest_attempt(&store, ingest(user, &["Rust"], 0.2)).await.unwrap();
        let outcome = ingest_attempt(&store, ingest(user, &["Rust"], 0.6)).await.unwrap();
        let record = &outcome.updated[0];
        assert!((record.score - 0.4).abs() < 1e-9);
        assert_eq!(record.trend, None);

        let third = ingest_attempt(&store, ingest(user, &["Rust"], 0.2)).await.unwrap();
        // newest-first [0.2, 0.6, 0.2]: recent [0.2] vs older [0.6, 0.2] -> declining
        assert_eq!(third.updated[0].trend, Some(Trend::Declining));
    }

    #[tokio::test]
    async fn test_multi_skill_attempt_updates_each_skill_once() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let outcome = ingest_attempt(&store, ingest(user, &["Docker", "K8s", "Docker", " "], 0.7))
            .await
            .unwrap();
        assert_eq!(outcome.updated.len(), 2);
        assert_eq!(store.list_mastery(user).await.unwrap().len(), 2);
        assert_eq!(
            store.count_attempts_since(user, Utc::now() - Duration::hours(1)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_invalid_score_mutates_nothing() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let err = ingest_attempt(&store, ingest(user, &["Rust"], 1.2)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidScore(_)));
        assert!(store.list_mastery(user).await.unwrap().is_empty());
        assert_eq!(
            store.count_attempts_since(user, Utc::now() - Duration::days(1)).await.unwrap(),
            0
        );
    }

    /// Passes through to a `MemoryStore`, yielding to the scheduler around
    /// every call the way a database round-trip would.
    struct YieldingStore(MemoryStore);

    #[async_trait]
    impl CoachStore for YieldingStore {
        async fn get_mastery(&self, u: Uuid, s: &str) -> Result<Option<MasteryRecord>, StoreError> {
            tokio::task::yield_now().await;
            self.0.get_mastery(u, s).await
        }
        async fn list_mastery(&self, u: Uuid) -> Result<Vec<MasteryRecord>, StoreError> {
            tokio::task::yield_now().await;
            self.0.list_mastery(u).await
        }
        async fn record_attempt(
            &self,
            a: &ScoredAttempt,
            limit: usize,
            update: &MasteryUpdate,
        ) -> Result<Vec<MasteryRecord>, StoreError> {
            tokio::task::yield_now().await;
            let updated = self.0.record_attempt(a, limit, update).await;
            tokio::task::yield_now().await;
            updated
        }
        async fn count_attempts_since(
            &self,
            u: Uuid,
            since: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.0.count_attempts_since(u, since).await
        }
        async fn latest_plan_id(&self, u: Uuid) -> Result<Option<Uuid>, StoreError> {
            self.0.latest_plan_id(u).await
        }
        async fn plan_id_for_task(&self, t: Uuid) -> Result<Option<Uuid>, StoreError> {
            self.0.plan_id_for_task(t).await
        }
        async fn load_topology(&self, p: Uuid) -> Result<Option<PlanTopology>, StoreError> {
            self.0.load_topology(p).await
        }
        async fn insert_topology(&self, t: &PlanTopology) -> Result<(), StoreError> {
            self.0.insert_topology(t).await
        }
        async fn commit_topology(&self, t: &PlanTopology) -> Result<i64, StoreError> {
            self.0.commit_topology(t).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_attempts_keep_every_increment() {
        let store = Arc::new(YieldingStore(MemoryStore::new()));
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    ingest_attempt(store.as_ref(), ingest(user, &["Docker"], 0.5)).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = get_skill_mastery(store.as_ref(), user, "Docker").await.unwrap();
        assert_eq!(record.practice_count, 64);
        assert!((record.score - 0.5).abs() < 1e-9);
        assert_eq!(
            store.count_attempts_since(user, Utc::now() - Duration::hours(1)).await.unwrap(),
            64
        );
    }

    #[tokio::test]
    async fn test_record_attempt_rejects_blank_skill() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let attempt = ScoredAttempt {
            id: Uuid::new_v4(),
            user_id: user,
            skill_names: vec!["Go".to_string(), "  ".to_string()],
            score: 0.4,
            created_at: Utc::now(),
        };
        let err = record_attempt(&store, &attempt).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.list_mastery(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_skill_mastery_is_not_found() {
        let store = MemoryStore::new();
        let err = get_skill_mastery(&store, Uuid::new_v4(), "Erlang").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_summarize_buckets_and_trends() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let make = |skill: &str, score: f64, trend: Option<Trend>, count: i32| MasteryRecord {
            user_id: user,
            skill_name: skill.to_string(),
            score,
            practice_count: count,
            trend,
            last_practiced_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        let records = vec![
            make("a", 0.1, Some(Trend::Declining), 4),
            make("b", 0.4, Some(Trend::Stable), 2),
            make("c", 0.7, None, 1),
            make("d", 0.8, Some(Trend::Improving), 6),
        ];
        let stats = summarize(&records, 3);
        assert_eq!(stats.total_skills, 4);
        assert_eq!(
            stats.skills_by_level,
            SkillLevels {
                beginner: 1,
                intermediate: 1,
                advanced: 1,
                expert: 1
            }
        );
        assert_eq!(stats.improving_skills, 1);
        assert_eq!(stats.stable_skills, 1);
        assert_eq!(stats.declining_skills, 1);
        assert_eq!(stats.total_practice_count, 13);
        assert_eq!(stats.recent_practice_count, 3);
        assert!((stats.average_mastery - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_empty() {
        let stats = summarize(&[], 0);
        assert_eq!(stats.total_skills, 0);
        assert_eq!(stats.average_mastery, 0.0);
    }
}
