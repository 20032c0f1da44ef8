use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Learn,
    Practice,
    Review,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Learn => "learn",
            TaskType::Practice => "practice",
            TaskType::Review => "review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "learn" => Some(TaskType::Learn),
            "practice" => Some(TaskType::Practice),
            "review" => Some(TaskType::Review),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }

    /// Completed and skipped tasks no longer count as open work.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// Structured task payload. Serialized as the same flat JSON object the plan
/// generator produces; keys this struct does not know are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub study_materials: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_concepts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub practice_exercises: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Always >= 1.
    pub requested_week_count: i32,
    pub hours_per_week: f64,
    /// Optimistic-concurrency token, bumped on every committed mutation.
    pub revision: i64,
    /// Append-only adaptation audit trail, oldest first.
    pub adaptation_history: Vec<PlanDiffEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub week_number: i32,
    pub theme: String,
    pub estimated_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub id: Uuid,
    pub week_id: Uuid,
    pub day_number: i32,
    /// Midnight UTC of the calendar day.
    pub date: DateTime<Utc>,
    pub theme: String,
    pub estimated_hours: f64,
}

impl Day {
    pub fn calendar_date(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub day_id: Option<Uuid>,
    pub task_date: DateTime<Utc>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub title: String,
    pub description: String,
    pub skill_names: Vec<String>,
    pub estimated_minutes: i32,
    pub actual_minutes: Option<i32>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Informational only; never enforced as a blocking constraint.
    pub dependencies: Vec<Uuid>,
    pub content: TaskContent,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn calendar_date(&self) -> NaiveDate {
        self.task_date.date_naive()
    }

    pub fn targets_skill(&self, skill_name: &str) -> bool {
        self.skill_names.iter().any(|s| s == skill_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAction {
    Add,
    Modify,
}

/// One mutation recorded in a plan diff entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChange {
    pub action: DiffAction,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub skill: String,
    pub count: usize,
    pub reason: String,
}

/// Audit record of one adaptation cycle. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDiffEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: Uuid,
    pub study_plan_id: Uuid,
    pub changes: Vec<PlanChange>,
}

/// Midnight UTC for a calendar date.
pub fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
