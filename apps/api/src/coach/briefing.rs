//! Daily briefing: the day's tasks, open overdue work, progress figures and a
//! short motivational message.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::coach::motivation::{motivational_message, MotivationContext, Motivator};
use crate::errors::AppError;
use crate::models::plan::{Task, TaskStatus};
use crate::planning::service::{load_owned_topology, resolve_plan_id};
use crate::planning::topology::{shift_date, PlanTopology, TopologyError};
use crate::store::CoachStore;

pub const UPCOMING_DAYS: i64 = 7;
pub const MAX_UPCOMING: usize = 10;
const DAYS_PER_WEEK: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct BriefingTask {
    #[serde(flatten)]
    pub task: Task,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyBriefing {
    pub date: NaiveDate,
    pub study_plan_id: Uuid,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub skipped_tasks: usize,
    pub overdue_tasks: usize,
    pub estimated_minutes: i64,
    pub actual_minutes: Option<i64>,
    pub completion_percentage: f64,
    pub tasks: Vec<BriefingTask>,
    pub motivational_message: String,
    pub focus_skills: Vec<String>,
    pub upcoming_tasks: Vec<Task>,
    pub current_week: Option<i32>,
    pub total_weeks: i32,
    pub week_progress: Option<f64>,
}

impl DailyBriefing {
    pub fn motivation_context(&self) -> MotivationContext {
        MotivationContext {
            completed_count: self.completed_tasks,
            pending_count: self.pending_tasks,
            overdue_count: self.overdue_tasks,
            completion_pct: self.completion_percentage,
            focus_skills: self.focus_skills.clone(),
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Computes everything but the motivational message, which is left empty.
pub fn build_briefing(
    topology: &PlanTopology,
    date: NaiveDate,
) -> Result<DailyBriefing, TopologyError> {
    let todays = topology.tasks_on(date);
    let overdue = topology.overdue(date);

    let mut tasks = Vec::with_capacity(todays.len() + overdue.len());
    let (mut completed, mut pending, mut skipped, mut overdue_count) = (0, 0, 0, 0);
    let mut estimated_minutes = 0i64;
    let mut actual_minutes = 0i64;

    for task in todays.iter().chain(overdue.iter()) {
        let days_overdue = (date - task.calendar_date()).num_days();
        let is_overdue = days_overdue > 0;
        if is_overdue {
            overdue_count += 1;
        } else {
            match task.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Skipped => skipped += 1,
                TaskStatus::Pending | TaskStatus::InProgress => pending += 1,
            }
        }
        estimated_minutes += i64::from(task.estimated_minutes);
        actual_minutes += i64::from(task.actual_minutes.unwrap_or(0));
        tasks.push(BriefingTask {
            task: (*task).clone(),
            is_overdue,
            days_overdue: days_overdue.max(0),
        });
    }

    let mut seen = HashSet::new();
    let focus_skills: Vec<String> = todays
        .iter()
        .flat_map(|t| t.skill_names.iter())
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect();

    let window_start = shift_date(date, 1)?;
    let window_end = shift_date(date, 1 + UPCOMING_DAYS)?;
    let upcoming_tasks: Vec<Task> = topology
        .upcoming(window_start)
        .into_iter()
        .filter(|t| t.calendar_date() < window_end && !t.status.is_closed())
        .take(MAX_UPCOMING)
        .cloned()
        .collect();

    let total_weeks = topology.plan.requested_week_count;
    let (current_week, week_progress) = match topology.earliest_task_date() {
        Some(start) => {
            let elapsed_weeks = (date - start).num_days().div_euclid(DAYS_PER_WEEK);
            let week = (elapsed_weeks + 1).clamp(1, i64::from(total_weeks.max(1))) as i32;
            let week_start = shift_date(start, i64::from(week - 1) * DAYS_PER_WEEK)?;
            let week_end = shift_date(week_start, DAYS_PER_WEEK)?;
            let in_week: Vec<&Task> = topology
                .tasks
                .iter()
                .filter(|t| (week_start..week_end).contains(&t.calendar_date()))
                .collect();
            let done = in_week
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count();
            (Some(week), Some(percentage(done, in_week.len())))
        }
        None => (None, None),
    };

    Ok(DailyBriefing {
        date,
        study_plan_id: topology.plan_id(),
        total_tasks: tasks.len(),
        completed_tasks: completed,
        pending_tasks: pending,
        skipped_tasks: skipped,
        overdue_tasks: overdue_count,
        estimated_minutes,
        actual_minutes: (actual_minutes > 0).then_some(actual_minutes),
        completion_percentage: percentage(completed, tasks.len()),
        tasks,
        motivational_message: String::new(),
        focus_skills,
        upcoming_tasks,
        current_week,
        total_weeks,
        week_progress,
    })
}

pub async fn get_daily_briefing(
    store: &dyn CoachStore,
    motivator: &dyn Motivator,
    user_id: Uuid,
    date: Option<NaiveDate>,
    plan_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<DailyBriefing, AppError> {
    let date = date.unwrap_or_else(|| now.date_naive());
    let plan_id = resolve_plan_id(store, user_id, plan_id).await?;
    let topology = load_owned_topology(store, user_id, plan_id).await?;

    let mut briefing = build_briefing(&topology, date)?;
    briefing.motivational_message =
        motivational_message(motivator, &briefing.motivation_context()).await;
    Ok(briefing)
}
