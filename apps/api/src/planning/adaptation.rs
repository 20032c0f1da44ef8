//! Adaptation engine: turns mastery signals into plan mutations.
//!
//! Skills are classified weak / strong / neutral. Weak skills get spaced
//! reinforcement practice inserted into the schedule; strong skills have their
//! surplus upcoming tasks flagged optional. Every adaptation cycle appends one
//! `PlanDiffEntry` to the plan's history, even when it changed nothing.
//!
//! Everything here works on an in-memory `PlanTopology`; the caller commits.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::mastery::{MasteryRecord, Trend};
use crate::models::plan::{
    midnight, DiffAction, Difficulty, PlanChange, PlanDiffEntry, Task, TaskContent, TaskStatus,
    TaskType,
};
use crate::planning::topology::{shift_date, PlanTopology, TopologyError};

pub const WEAK_MASTERY_THRESHOLD: f64 = 0.5;
pub const VERY_WEAK_MASTERY_THRESHOLD: f64 = 0.3;
pub const STRONG_MASTERY_THRESHOLD: f64 = 0.8;
pub const MIN_PRACTICE_FOR_CONFIDENCE: i32 = 3;
pub const MIN_PRACTICE_FOR_STRONG: i32 = 5;

pub const REINFORCEMENT_TASK_COUNT: usize = 2;
pub const MAX_REINFORCEMENT_TASKS: usize = 14;
pub const MIN_DAYS_BETWEEN_REINFORCEMENT: i64 = 2;
/// A date with this many scheduled tasks is full for reinforcement.
pub const MAX_TASKS_PER_DAY: usize = 5;
pub const REINFORCEMENT_MINUTES: i32 = 30;
/// Upcoming tasks kept mandatory for a strong skill.
pub const KEEP_TASKS_FOR_STRONG: usize = 2;

pub const REINFORCEMENT_NOTE: &str = "Added by adaptive planner due to weak mastery";
pub const OPTIONAL_NOTE: &str = "Marked optional due to strong mastery";
const REDUCE_REASON: &str = "Strong mastery, reducing repetition";

#[derive(Debug, Error, PartialEq)]
pub enum AdaptationError {
    #[error("skill name cannot be empty")]
    EmptySkill,

    #[error("count must be between 1 and {MAX_REINFORCEMENT_TASKS}, got {0}")]
    InvalidCount(usize),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

// ────────────────────────────────────────────────────────────────────────────
// Classification
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillClass {
    Weak,
    Strong,
    Neutral,
}

/// Weak is checked first, so a declining skill is never strong.
pub fn classify(record: &MasteryRecord, in_upcoming: bool) -> SkillClass {
    let declining = record.trend == Some(Trend::Declining);
    if record.score < WEAK_MASTERY_THRESHOLD
        || declining
        || (record.practice_count < MIN_PRACTICE_FOR_CONFIDENCE && in_upcoming)
    {
        return SkillClass::Weak;
    }
    if record.score >= STRONG_MASTERY_THRESHOLD
        && record.trend == Some(Trend::Improving)
        && record.practice_count >= MIN_PRACTICE_FOR_STRONG
    {
        return SkillClass::Strong;
    }
    SkillClass::Neutral
}

pub fn weak_reason(record: &MasteryRecord) -> String {
    let mut reasons = Vec::new();
    if record.score < VERY_WEAK_MASTERY_THRESHOLD {
        reasons.push("very low mastery");
    } else if record.score < WEAK_MASTERY_THRESHOLD {
        reasons.push("low mastery");
    }
    if record.trend == Some(Trend::Declining) {
        reasons.push("declining performance");
    }
    if record.practice_count < MIN_PRACTICE_FOR_CONFIDENCE {
        reasons.push("insufficient practice");
    }
    if reasons.is_empty() {
        "needs improvement".to_string()
    } else {
        reasons.join(", ")
    }
}

pub fn difficulty_for(record: Option<&MasteryRecord>) -> Difficulty {
    match record.map(|r| r.score) {
        Some(s) if s >= 0.6 => Difficulty::Advanced,
        Some(s) if s >= 0.3 => Difficulty::Intermediate,
        _ => Difficulty::Beginner,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Analysis
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeakSkill {
    pub skill_name: String,
    pub mastery_score: f64,
    pub trend: Option<Trend>,
    pub practice_count: i32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrongSkill {
    pub skill_name: String,
    pub mastery_score: f64,
    pub trend: Option<Trend>,
    pub practice_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Reinforcement,
    ReduceRepetition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub skill: String,
    pub action: String,
    pub priority: Priority,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptationReport {
    pub weak_skills: Vec<WeakSkill>,
    pub strong_skills: Vec<StrongSkill>,
    pub recommendations: Vec<Recommendation>,
    pub total_weak: usize,
    pub total_strong: usize,
}

/// Classifies every mastered skill against the plan's upcoming work.
pub fn analyze(
    topology: &PlanTopology,
    records: &[MasteryRecord],
    today: NaiveDate,
) -> AdaptationReport {
    let upcoming = topology.upcoming(today);
    let upcoming_for = |skill: &str| upcoming.iter().filter(|t| t.targets_skill(skill)).count();

    let mut weak_skills = Vec::new();
    let mut strong_skills = Vec::new();
    let mut recommendations = Vec::new();

    for record in records {
        let in_upcoming = upcoming_for(&record.skill_name) > 0;
        match classify(record, in_upcoming) {
            SkillClass::Weak => weak_skills.push(WeakSkill {
                skill_name: record.skill_name.clone(),
                mastery_score: record.score,
                trend: record.trend,
                practice_count: record.practice_count,
                reason: weak_reason(record),
            }),
            SkillClass::Strong => strong_skills.push(StrongSkill {
                skill_name: record.skill_name.clone(),
                mastery_score: record.score,
                trend: record.trend,
                practice_count: record.practice_count,
            }),
            SkillClass::Neutral => {}
        }
    }

    for weak in &weak_skills {
        recommendations.push(Recommendation {
            kind: RecommendationType::Reinforcement,
            skill: weak.skill_name.clone(),
            action: format!("Add {REINFORCEMENT_TASK_COUNT} reinforcement practice tasks"),
            priority: if weak.mastery_score < VERY_WEAK_MASTERY_THRESHOLD {
                Priority::High
            } else {
                Priority::Medium
            },
            reason: weak.reason.clone(),
        });
    }

    for strong in &strong_skills {
        let task_count = upcoming_for(&strong.skill_name);
        if task_count > KEEP_TASKS_FOR_STRONG {
            recommendations.push(Recommendation {
                kind: RecommendationType::ReduceRepetition,
                skill: strong.skill_name.clone(),
                action: format!("Reduce {} redundant tasks", task_count - 1),
                priority: Priority::Low,
                reason: format!(
                    "High mastery ({:.0}%) with improving trend",
                    strong.mastery_score * 100.0
                ),
            });
        }
    }

    AdaptationReport {
        total_weak: weak_skills.len(),
        total_strong: strong_skills.len(),
        weak_skills,
        strong_skills,
        recommendations,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mutations
// ────────────────────────────────────────────────────────────────────────────

fn check_skill(skill_name: &str) -> Result<(), AdaptationError> {
    if skill_name.trim().is_empty() {
        return Err(AdaptationError::EmptySkill);
    }
    Ok(())
}

/// Picks `count` insertion dates: each at least two days after the previous
/// pick, preferring already-scheduled dates with spare capacity.
fn reinforcement_dates(
    topology: &PlanTopology,
    today: NaiveDate,
    count: usize,
) -> Result<Vec<NaiveDate>, TopologyError> {
    let mut load: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for task in topology.scheduled_from(today) {
        *load.entry(task.calendar_date()).or_default() += 1;
    }
    let latest = load.keys().next_back().copied();

    let mut picks: Vec<NaiveDate> = Vec::with_capacity(count);
    for i in 0..count {
        let min_date = match picks.last() {
            Some(last) => shift_date(*last, MIN_DAYS_BETWEEN_REINFORCEMENT)?,
            None => today,
        };
        let open_slot = load
            .range(min_date..)
            .find(|(_, &n)| n < MAX_TASKS_PER_DAY)
            .map(|(date, _)| *date);

        let target = match open_slot {
            Some(date) => date,
            None => {
                let candidate = match latest {
                    Some(date) => shift_date(date, 1)?,
                    None => shift_date(today, i as i64 + 1)?,
                };
                candidate.max(min_date)
            }
        };
        picks.push(target);
    }
    Ok(picks)
}

/// Inserts `count` spaced practice tasks for a weak skill. Returns the new tasks.
pub fn add_reinforcement_tasks(
    topology: &mut PlanTopology,
    skill_name: &str,
    mastery: Option<&MasteryRecord>,
    count: usize,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<Task>, AdaptationError> {
    check_skill(skill_name)?;
    if count == 0 || count > MAX_REINFORCEMENT_TASKS {
        return Err(AdaptationError::InvalidCount(count));
    }

    let difficulty = difficulty_for(mastery);
    let mut created = Vec::with_capacity(count);

    for date in reinforcement_dates(topology, today, count)? {
        let day_id = topology.find_or_create_day(date);
        let task = Task {
            id: Uuid::new_v4(),
            plan_id: topology.plan_id(),
            day_id: Some(day_id),
            task_date: midnight(date),
            task_type: TaskType::Practice,
            status: TaskStatus::Pending,
            title: format!("Reinforcement Practice: {skill_name}"),
            description: format!("Additional practice to strengthen {skill_name} skills"),
            skill_names: vec![skill_name.to_string()],
            estimated_minutes: REINFORCEMENT_MINUTES,
            actual_minutes: None,
            completed_at: None,
            dependencies: Vec::new(),
            content: TaskContent {
                study_materials: vec![
                    format!("Practice {skill_name} concepts"),
                    format!("Review {skill_name} fundamentals"),
                ],
                key_concepts: vec![skill_name.to_string()],
                practice_exercises: vec![format!(
                    "Complete {} level exercises for {skill_name}",
                    difficulty.as_str()
                )],
                adaptive_note: Some(REINFORCEMENT_NOTE.to_string()),
                difficulty: Some(difficulty),
                ..TaskContent::default()
            },
            created_at: now,
        };
        created.push(topology.insert_task(task)?.clone());
    }

    info!(
        "Added {} reinforcement tasks for '{skill_name}' to plan {}",
        created.len(),
        topology.plan_id()
    );
    Ok(created)
}

/// Flags every upcoming open task for `skill_name` beyond the first
/// `max_tasks` as optional. Nothing is removed. Returns the flagged tasks.
pub fn reduce_redundant_tasks(
    topology: &mut PlanTopology,
    skill_name: &str,
    max_tasks: usize,
    today: NaiveDate,
) -> Result<Vec<Task>, AdaptationError> {
    check_skill(skill_name)?;

    let surplus: Vec<Uuid> = topology
        .upcoming(today)
        .into_iter()
        .filter(|t| t.targets_skill(skill_name))
        .skip(max_tasks)
        .map(|t| t.id)
        .collect();

    let mut flagged = Vec::with_capacity(surplus.len());
    for task_id in surplus {
        let task = topology.task_mut(task_id)?;
        task.content.is_optional = true;
        task.content.adaptive_note = Some(OPTIONAL_NOTE.to_string());
        flagged.push(task.clone());
    }

    if !flagged.is_empty() {
        info!(
            "Marked {} tasks optional for '{skill_name}' in plan {}",
            flagged.len(),
            topology.plan_id()
        );
    }
    Ok(flagged)
}

// ────────────────────────────────────────────────────────────────────────────
// Full cycle
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdaptationChange {
    AddedReinforcement {
        skill: String,
        tasks_added: usize,
        task_ids: Vec<Uuid>,
    },
    ReducedRepetition {
        skill: String,
        tasks_marked_optional: usize,
        task_ids: Vec<Uuid>,
    },
    Error {
        skill: String,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdaptationSummary {
    pub reinforcement_tasks_added: usize,
    pub tasks_marked_optional: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptationResult {
    pub analysis: AdaptationReport,
    pub changes: Vec<AdaptationChange>,
    pub plan_diff: PlanDiffEntry,
    pub summary: AdaptationSummary,
}

/// Runs one adaptation cycle and appends its diff entry to the plan history.
///
/// A failure for one skill is recorded as an `Error` change; mutations already
/// applied for other skills stay in place. Running it twice for a skill that
/// stays weak inserts reinforcement twice.
pub fn adapt(
    topology: &mut PlanTopology,
    records: &[MasteryRecord],
    apply: bool,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> AdaptationResult {
    let analysis = analyze(topology, records, today);
    let mut changes = Vec::new();
    let mut diff_changes = Vec::new();
    let mut summary = AdaptationSummary::default();

    if apply {
        for weak in &analysis.weak_skills {
            let skill = &weak.skill_name;
            let record = records.iter().find(|r| &r.skill_name == skill);
            match add_reinforcement_tasks(
                topology,
                skill,
                record,
                REINFORCEMENT_TASK_COUNT,
                today,
                now,
            ) {
                Ok(tasks) => {
                    summary.reinforcement_tasks_added += tasks.len();
                    diff_changes.push(PlanChange {
                        action: DiffAction::Add,
                        entity_type: "task".to_string(),
                        skill: skill.clone(),
                        count: tasks.len(),
                        reason: weak.reason.clone(),
                    });
                    changes.push(AdaptationChange::AddedReinforcement {
                        skill: skill.clone(),
                        tasks_added: tasks.len(),
                        task_ids: tasks.iter().map(|t| t.id).collect(),
                    });
                }
                Err(e) => {
                    error!("Error adding reinforcement for '{skill}': {e}");
                    changes.push(AdaptationChange::Error {
                        skill: skill.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for strong in &analysis.strong_skills {
            let skill = &strong.skill_name;
            match reduce_redundant_tasks(topology, skill, KEEP_TASKS_FOR_STRONG, today) {
                Ok(tasks) if tasks.is_empty() => {}
                Ok(tasks) => {
                    summary.tasks_marked_optional += tasks.len();
                    diff_changes.push(PlanChange {
                        action: DiffAction::Modify,
                        entity_type: "task".to_string(),
                        skill: skill.clone(),
                        count: tasks.len(),
                        reason: REDUCE_REASON.to_string(),
                    });
                    changes.push(AdaptationChange::ReducedRepetition {
                        skill: skill.clone(),
                        tasks_marked_optional: tasks.len(),
                        task_ids: tasks.iter().map(|t| t.id).collect(),
                    });
                }
                Err(e) => {
                    error!("Error reducing repetition for '{skill}': {e}");
                    changes.push(AdaptationChange::Error {
                        skill: skill.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    let plan_diff = PlanDiffEntry {
        timestamp: now,
        user_id: topology.plan.user_id,
        study_plan_id: topology.plan_id(),
        changes: diff_changes,
    };
    topology.plan.adaptation_history.push(plan_diff.clone());
    topology.plan.updated_at = now;

    AdaptationResult {
        analysis,
        changes,
        plan_diff,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::planning::topology::fixtures::{add_task, empty_topology};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn record(skill: &str, score: f64, trend: Option<Trend>, practice_count: i32) -> MasteryRecord {
        let now = Utc::now();
        MasteryRecord {
            user_id: Uuid::nil(),
            skill_name: skill.to_string(),
            score,
            practice_count,
            trend,
            last_practiced_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_declining_is_never_strong() {
        for score in [0.0, 0.5, 0.8, 0.95, 1.0] {
            for count in [0, 3, 5, 50] {
                for upcoming in [false, true] {
                    let r = record("Go", score, Some(Trend::Declining), count);
                    assert_eq!(classify(&r, upcoming), SkillClass::Weak);
                }
            }
        }
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(&record("a", 0.49, None, 10), false), SkillClass::Weak);
        assert_eq!(
            classify(&record("a", 0.9, Some(Trend::Improving), 5), false),
            SkillClass::Strong
        );
        assert_eq!(
            classify(&record("a", 0.9, Some(Trend::Improving), 4), false),
            SkillClass::Neutral
        );
        assert_eq!(
            classify(&record("a", 0.9, Some(Trend::Stable), 9), false),
            SkillClass::Neutral
        );
        // Low practice only matters when the skill is on the schedule.
        assert_eq!(classify(&record("a", 0.7, None, 2), false), SkillClass::Neutral);
        assert_eq!(classify(&record("a", 0.7, None, 2), true), SkillClass::Weak);
    }

    #[test]
    fn test_weak_reason_text() {
        assert_eq!(
            weak_reason(&record("a", 0.2, Some(Trend::Declining), 1)),
            "very low mastery, declining performance, insufficient practice"
        );
        assert_eq!(weak_reason(&record("a", 0.4, None, 6)), "low mastery");
        assert_eq!(weak_reason(&record("a", 0.7, None, 6)), "needs improvement");
    }

    #[test]
    fn test_reinforcement_on_empty_schedule_is_spaced() {
        let mut topology = empty_topology(Uuid::new_v4());
        let tasks =
            add_reinforcement_tasks(&mut topology, "Rust", None, 3, today(), Utc::now()).unwrap();

        assert_eq!(tasks.len(), 3);
        let dates: Vec<NaiveDate> = tasks.iter().map(|t| t.calendar_date()).collect();
        assert!(dates[0] >= today());
        for pair in dates.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::days(MIN_DAYS_BETWEEN_REINFORCEMENT));
        }
        assert_eq!(topology.tasks.len(), 3);
        assert!(topology.validate().is_ok());

        let task = &tasks[0];
        assert_eq!(task.title, "Reinforcement Practice: Rust");
        assert_eq!(task.task_type, TaskType::Practice);
        assert_eq!(task.estimated_minutes, 30);
        assert_eq!(task.content.difficulty, Some(Difficulty::Beginner));
        assert_eq!(
            task.content.practice_exercises,
            vec!["Complete beginner level exercises for Rust"]
        );
    }

    #[test]
    fn test_reinforcement_prefers_dates_with_capacity() {
        let mut topology = empty_topology(Uuid::new_v4());
        let busy = today() + Duration::days(1);
        for _ in 0..MAX_TASKS_PER_DAY {
            add_task(&mut topology, busy, &["SQL"], TaskStatus::Pending);
        }
        let open = today() + Duration::days(2);
        add_task(&mut topology, open, &["SQL"], TaskStatus::Pending);

        let r = record("SQL", 0.45, None, 4);
        let tasks =
            add_reinforcement_tasks(&mut topology, "SQL", Some(&r), 2, today(), Utc::now()).unwrap();

        assert_eq!(tasks[0].calendar_date(), open);
        // Past the last scheduled date, spacing still holds.
        assert_eq!(tasks[1].calendar_date(), open + Duration::days(2));
        assert_eq!(tasks[0].content.difficulty, Some(Difficulty::Intermediate));
    }

    #[test]
    fn test_reinforcement_rejects_bad_input() {
        let mut topology = empty_topology(Uuid::new_v4());
        assert_eq!(
            add_reinforcement_tasks(&mut topology, "  ", None, 2, today(), Utc::now()).unwrap_err(),
            AdaptationError::EmptySkill
        );
        assert_eq!(
            add_reinforcement_tasks(&mut topology, "Go", None, 0, today(), Utc::now()).unwrap_err(),
            AdaptationError::InvalidCount(0)
        );
        assert!(topology.tasks.is_empty());
    }

    #[test]
    fn test_reinforcement_past_calendar_end_is_an_error() {
        let mut topology = empty_topology(Uuid::new_v4());
        add_task(&mut topology, NaiveDate::MAX, &["Go"], TaskStatus::Pending);

        let err = add_reinforcement_tasks(&mut topology, "Go", None, 2, today(), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            AdaptationError::Topology(TopologyError::DateOutOfRange { .. })
        ));
        assert_eq!(topology.tasks.len(), 1);
    }

    #[test]
    fn test_reduce_marks_surplus_optional_without_deleting() {
        let mut topology = empty_topology(Uuid::new_v4());
        for offset in 0..5 {
            add_task(
                &mut topology,
                today() + Duration::days(offset),
                &["Python"],
                TaskStatus::Pending,
            );
        }
        let before = topology.tasks.len();

        let flagged = reduce_redundant_tasks(&mut topology, "Python", 2, today()).unwrap();

        assert_eq!(flagged.len(), 3);
        assert_eq!(topology.tasks.len(), before);
        let optional: Vec<&Task> = topology.tasks.iter().filter(|t| t.content.is_optional).collect();
        assert_eq!(optional.len(), 3);
        // The two earliest stay mandatory.
        for task in &optional {
            assert!(task.calendar_date() >= today() + Duration::days(2));
            assert_eq!(task.content.adaptive_note.as_deref(), Some(OPTIONAL_NOTE));
        }
    }

    #[test]
    fn test_docker_end_to_end() {
        let mut topology = empty_topology(Uuid::new_v4());
        add_task(&mut topology, today() + Duration::days(1), &["Docker"], TaskStatus::Pending);
        let records = vec![record("Docker", 0.2, Some(Trend::Declining), 4)];

        let report = analyze(&topology, &records, today());
        assert_eq!(report.total_weak, 1);
        assert_eq!(report.weak_skills[0].skill_name, "Docker");
        assert_eq!(report.recommendations[0].priority, Priority::High);
        assert_eq!(report.recommendations[0].kind, RecommendationType::Reinforcement);

        let before = topology.tasks.len();
        let result = adapt(&mut topology, &records, true, today(), Utc::now());

        let inserted: Vec<&Task> = topology
            .tasks
            .iter()
            .filter(|t| t.title == "Reinforcement Practice: Docker")
            .collect();
        assert_eq!(topology.tasks.len(), before + 2);
        assert_eq!(inserted.len(), 2);
        assert!(inserted.iter().all(|t| t.task_type == TaskType::Practice));

        assert_eq!(topology.plan.adaptation_history.len(), 1);
        let entry = &topology.plan.adaptation_history[0];
        assert_eq!(entry.changes.len(), 1);
        assert_eq!(entry.changes[0].action, DiffAction::Add);
        assert_eq!(entry.changes[0].skill, "Docker");
        assert_eq!(entry.changes[0].count, 2);
        assert_eq!(result.summary.reinforcement_tasks_added, 2);
        assert_eq!(&result.plan_diff, entry);
    }

    #[test]
    fn test_repeated_adaptation_inserts_again() {
        let mut topology = empty_topology(Uuid::new_v4());
        let records = vec![record("Kafka", 0.35, None, 6)];

        adapt(&mut topology, &records, true, today(), Utc::now());
        adapt(&mut topology, &records, true, today(), Utc::now());

        assert_eq!(topology.tasks.len(), 2 * REINFORCEMENT_TASK_COUNT);
        assert_eq!(topology.plan.adaptation_history.len(), 2);
    }

    #[test]
    fn test_adapt_records_per_skill_failure_and_continues() {
        let mut topology = empty_topology(Uuid::new_v4());
        let records = vec![record("", 0.1, None, 1), record("Redis", 0.2, None, 1)];

        let result = adapt(&mut topology, &records, true, today(), Utc::now());

        assert!(matches!(&result.changes[0], AdaptationChange::Error { skill, .. } if skill.is_empty()));
        assert!(matches!(
            &result.changes[1],
            AdaptationChange::AddedReinforcement { tasks_added: 2, .. }
        ));
        assert_eq!(result.plan_diff.changes.len(), 1);
        assert_eq!(topology.tasks.len(), 2);
    }

    #[test]
    fn test_adapt_without_apply_only_logs() {
        let mut topology = empty_topology(Uuid::new_v4());
        let records = vec![record("Go", 0.1, None, 1)];

        let result = adapt(&mut topology, &records, false, today(), Utc::now());

        assert!(result.changes.is_empty());
        assert!(topology.tasks.is_empty());
        assert_eq!(result.analysis.total_weak, 1);
        assert_eq!(topology.plan.adaptation_history.len(), 1);
        assert!(topology.plan.adaptation_history[0].changes.is_empty());
    }

    #[test]
    fn test_strong_skill_reduction_in_cycle() {
        let mut topology = empty_topology(Uuid::new_v4());
        for offset in 0..4 {
            add_task(
                &mut topology,
                today() + Duration::days(offset),
                &["Linux"],
                TaskStatus::Pending,
            );
        }
        let records = vec![record("Linux", 0.9, Some(Trend::Improving), 8)];

        let report = analyze(&topology, &records, today());
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].kind, RecommendationType::ReduceRepetition);
        assert_eq!(report.recommendations[0].reason, "High mastery (90%) with improving trend");
        assert_eq!(report.recommendations[0].action, "Reduce 3 redundant tasks");

        let result = adapt(&mut topology, &records, true, today(), Utc::now());
        assert_eq!(result.summary.tasks_marked_optional, 2);
        assert_eq!(result.plan_diff.changes[0].action, DiffAction::Modify);
        assert_eq!(result.plan_diff.changes[0].reason, "Strong mastery, reducing repetition");
    }

    #[test]
    fn test_change_serializes_with_type_tag() {
        let change = AdaptationChange::Error {
            skill: "Go".to_string(),
            error: "boom".to_string(),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["skill"], "Go");
    }
}
