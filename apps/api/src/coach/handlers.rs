//! Axum route handlers for the Coach API.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::coach::briefing::{get_daily_briefing, DailyBriefing};
use crate::coach::tracker::{
    auto_reschedule_overdue, carry_over, complete_task, reschedule_task, update_task_status,
    CarryOverSummary, RescheduleOutcome,
};
use crate::errors::AppError;
use crate::models::plan::{Task, TaskStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BriefingQuery {
    pub user_id: Uuid,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
    pub study_plan_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub user_id: Uuid,
    pub status: TaskStatus,
    pub actual_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub user_id: Uuid,
    pub actual_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub user_id: Uuid,
    pub new_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CarryOverRequest {
    pub user_id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub study_plan_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AutoRescheduleRequest {
    pub user_id: Uuid,
    pub target_date: Option<NaiveDate>,
    pub study_plan_id: Option<Uuid>,
}

/// GET /api/v1/coach/briefing
pub async fn handle_briefing(
    State(state): State<AppState>,
    Query(params): Query<BriefingQuery>,
) -> Result<Json<DailyBriefing>, AppError> {
    let briefing = get_daily_briefing(
        state.store.as_ref(),
        state.motivator.as_ref(),
        params.user_id,
        params.date,
        params.study_plan_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(briefing))
}

/// POST /api/v1/coach/tasks/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Task>, AppError> {
    let task = update_task_status(
        state.store.as_ref(),
        req.user_id,
        task_id,
        req.status,
        req.actual_minutes,
        Utc::now(),
    )
    .await?;
    Ok(Json(task))
}

/// POST /api/v1/coach/tasks/:id/complete
pub async fn handle_complete(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Task>, AppError> {
    let task = complete_task(
        state.store.as_ref(),
        req.user_id,
        task_id,
        req.actual_minutes,
        Utc::now(),
    )
    .await?;
    Ok(Json(task))
}

/// POST /api/v1/coach/tasks/:id/reschedule
pub async fn handle_reschedule(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<RescheduleOutcome>, AppError> {
    let outcome = reschedule_task(
        state.store.as_ref(),
        req.user_id,
        task_id,
        req.new_date,
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/coach/carry-over
pub async fn handle_carry_over(
    State(state): State<AppState>,
    Json(req): Json<CarryOverRequest>,
) -> Result<Json<CarryOverSummary>, AppError> {
    let summary = carry_over(
        state.store.as_ref(),
        req.user_id,
        req.from_date,
        req.to_date,
        req.study_plan_id,
    )
    .await?;
    Ok(Json(summary))
}

/// POST /api/v1/coach/auto-reschedule
pub async fn handle_auto_reschedule(
    State(state): State<AppState>,
    Json(req): Json<AutoRescheduleRequest>,
) -> Result<Json<Vec<RescheduleOutcome>>, AppError> {
    let rescheduled = auto_reschedule_overdue(
        state.store.as_ref(),
        req.user_id,
        req.target_date,
        req.study_plan_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(rescheduled))
}
