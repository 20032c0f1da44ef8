//! Daily execution tracker: task status changes and rescheduling.
//!
//! Status machine:
//!
//!   pending ──> in_progress ──> completed
//!      │             │
//!      └─────────────┴────────> skipped
//!
//! plus `any -> pending` to reopen. Re-applying the current status is allowed
//! (e.g. to correct `actual_minutes`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::{midnight, Task, TaskStatus};
use crate::planning::service::{resolve_plan_id, with_plan};
use crate::planning::topology::{shift_date, PlanTopology};
use crate::store::CoachStore;

/// Overdue tasks are spread over this many consecutive days.
pub const AUTO_RESCHEDULE_SPREAD_DAYS: usize = 3;
pub const CARRY_OVER_REASON: &str = "Carried over from previous day";
pub const AUTO_RESCHEDULE_REASON: &str = "Auto-rescheduled overdue task";

pub fn transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    from == to
        || matches!(
            (from, to),
            (_, Pending)
                | (Pending, InProgress)
                | (Pending | InProgress, Completed)
                | (Pending | InProgress, Skipped)
        )
}

/// Applies a status change in place.
pub fn apply_status(
    task: &mut Task,
    status: TaskStatus,
    actual_minutes: Option<i32>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if !transition_allowed(task.status, status) {
        return Err(AppError::Validation(format!(
            "Cannot move task {} from {} to {}",
            task.id,
            task.status.as_str(),
            status.as_str()
        )));
    }
    if let Some(minutes) = actual_minutes {
        if minutes < 0 {
            return Err(AppError::Validation(format!(
                "actual_minutes must not be negative, got {minutes}"
            )));
        }
        task.actual_minutes = Some(minutes);
    }

    if status == TaskStatus::Completed {
        if task.status != TaskStatus::Completed || task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    } else {
        task.completed_at = None;
    }
    task.status = status;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RescheduleOutcome {
    pub task_id: Uuid,
    pub old_date: NaiveDate,
    pub new_date: NaiveDate,
    pub status: TaskStatus,
    pub message: String,
}

/// Moves a task to `new_date` at midnight, keeping its status.
///
/// The task follows onto an existing day on the new date if there is one;
/// otherwise it is detached from its day.
pub fn reschedule_in(
    topology: &mut PlanTopology,
    task_id: Uuid,
    new_date: NaiveDate,
    reason: Option<&str>,
) -> Result<RescheduleOutcome, AppError> {
    let day_id = topology.existing_day_on(new_date);
    let task = topology.task_mut(task_id)?;
    let old_date = task.calendar_date();

    task.task_date = midnight(new_date);
    task.day_id = day_id;

    let mut message = format!("Task rescheduled from {old_date} to {new_date}");
    if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
        message.push_str(". Reason: ");
        message.push_str(reason);
    }

    Ok(RescheduleOutcome {
        task_id,
        old_date,
        new_date,
        status: task.status,
        message,
    })
}

async fn plan_for_task(store: &dyn CoachStore, task_id: Uuid) -> Result<Uuid, AppError> {
    store
        .plan_id_for_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {task_id} not found")))
}

pub async fn update_task_status(
    store: &dyn CoachStore,
    user_id: Uuid,
    task_id: Uuid,
    status: TaskStatus,
    actual_minutes: Option<i32>,
    now: DateTime<Utc>,
) -> Result<Task, AppError> {
    let plan_id = plan_for_task(store, task_id).await?;
    let task = with_plan(store, user_id, plan_id, |topology| {
        let task = topology.task_mut(task_id)?;
        apply_status(task, status, actual_minutes, now)?;
        Ok(task.clone())
    })
    .await?;

    info!("Updated task {task_id} to status {}", status.as_str());
    Ok(task)
}

pub async fn complete_task(
    store: &dyn CoachStore,
    user_id: Uuid,
    task_id: Uuid,
    actual_minutes: Option<i32>,
    now: DateTime<Utc>,
) -> Result<Task, AppError> {
    update_task_status(
        store,
        user_id,
        task_id,
        TaskStatus::Completed,
        actual_minutes,
        now,
    )
    .await
}

pub async fn reschedule_task(
    store: &dyn CoachStore,
    user_id: Uuid,
    task_id: Uuid,
    new_date: NaiveDate,
    reason: Option<&str>,
) -> Result<RescheduleOutcome, AppError> {
    let plan_id = plan_for_task(store, task_id).await?;
    let outcome = with_plan(store, user_id, plan_id, |topology| {
        reschedule_in(topology, task_id, new_date, reason)
    })
    .await?;

    info!(
        "Rescheduled task {task_id} from {} to {}",
        outcome.old_date, outcome.new_date
    );
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
pub struct CarryOverSummary {
    pub date: NaiveDate,
    pub study_plan_id: Uuid,
    pub carried_over_tasks: Vec<Task>,
    pub total_carried_over: usize,
    pub rescheduled_tasks: Vec<RescheduleOutcome>,
}

/// Moves every open task on `from` to `to`.
pub async fn carry_over(
    store: &dyn CoachStore,
    user_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
    plan_id: Option<Uuid>,
) -> Result<CarryOverSummary, AppError> {
    let plan_id = resolve_plan_id(store, user_id, plan_id).await?;

    let (carried, rescheduled) = with_plan(store, user_id, plan_id, |topology| {
        let open: Vec<Uuid> = topology
            .tasks_on(from)
            .into_iter()
            .filter(|t| !t.status.is_closed())
            .map(|t| t.id)
            .collect();

        let mut carried = Vec::with_capacity(open.len());
        let mut rescheduled = Vec::with_capacity(open.len());
        for task_id in open {
            rescheduled.push(reschedule_in(topology, task_id, to, Some(CARRY_OVER_REASON))?);
            if let Some(task) = topology.task(task_id) {
                carried.push(task.clone());
            }
        }
        Ok((carried, rescheduled))
    })
    .await?;

    info!(
        "Carried over {} tasks from {from} to {to} in plan {plan_id}",
        rescheduled.len()
    );
    Ok(CarryOverSummary {
        date: to,
        study_plan_id: plan_id,
        total_carried_over: carried.len(),
        carried_over_tasks: carried,
        rescheduled_tasks: rescheduled,
    })
}

/// Spreads overdue tasks round-robin over `target`, `target + 1` and `target + 2`,
/// in task-date order.
pub async fn auto_reschedule_overdue(
    store: &dyn CoachStore,
    user_id: Uuid,
    target: Option<NaiveDate>,
    plan_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Vec<RescheduleOutcome>, AppError> {
    let target = target.unwrap_or_else(|| now.date_naive());
    let plan_id = resolve_plan_id(store, user_id, plan_id).await?;

    let rescheduled = with_plan(store, user_id, plan_id, |topology| {
        let overdue: Vec<Uuid> = topology.overdue(target).iter().map(|t| t.id).collect();
        overdue
            .into_iter()
            .enumerate()
            .map(|(i, task_id)| {
                let offset = (i % AUTO_RESCHEDULE_SPREAD_DAYS) as i64;
                let new_date = shift_date(target, offset)?;
                reschedule_in(topology, task_id, new_date, Some(AUTO_RESCHEDULE_REASON))
            })
            .collect::<Result<Vec<_>, _>>()
    })
    .await?;

    info!(
        "Auto-rescheduled {} overdue tasks for user {user_id}",
        rescheduled.len()
    );
    Ok(rescheduled)
}
