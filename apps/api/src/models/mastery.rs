use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short-window direction of a skill's mastery score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "improving" => Some(Trend::Improving),
            "stable" => Some(Trend::Stable),
            "declining" => Some(Trend::Declining),
            _ => None,
        }
    }
}

/// One mastery record per (user, skill). Owned by the mastery ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub user_id: Uuid,
    pub skill_name: String,
    /// Always within [0.0, 1.0].
    pub score: f64,
    /// Never decreases.
    pub practice_count: i32,
    /// `None` until at least three scores exist for the skill.
    pub trend: Option<Trend>,
    pub last_practiced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An evaluated practice attempt. Immutable once logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub skill_names: Vec<String>,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}
