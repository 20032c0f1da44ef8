//! Axum route handlers for the Plans and Adaptive APIs.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::{PlanDiffEntry, Task};
use crate::planning::adaptation::{
    AdaptationChange, AdaptationReport, AdaptationSummary,
};
use crate::planning::calendar::render_ics;
use crate::planning::service;
use crate::planning::topology::{PlanDraft, PlanTopology};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ImportPlanRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub draft: PlanDraft,
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PlanQuery {
    pub user_id: Uuid,
    /// Defaults to the user's most recent plan.
    pub study_plan_id: Option<Uuid>,
}

fn default_apply() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AdaptQuery {
    pub user_id: Uuid,
    pub study_plan_id: Option<Uuid>,
    #[serde(default = "default_apply")]
    pub apply_recommendations: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReinforceQuery {
    pub user_id: Uuid,
    pub study_plan_id: Option<Uuid>,
    pub skill_name: String,
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReduceQuery {
    pub user_id: Uuid,
    pub study_plan_id: Option<Uuid>,
    pub skill_name: String,
    pub max_tasks: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub study_plan_id: Uuid,
    pub adaptation_history: Vec<PlanDiffEntry>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub study_plan_id: Uuid,
    pub recommendations_count: usize,
    pub analysis: AdaptationReport,
}

#[derive(Debug, Serialize)]
pub struct AdaptResponse {
    pub study_plan_id: Uuid,
    pub success: bool,
    pub summary: AdaptationSummary,
    pub changes: Vec<AdaptationChange>,
    pub analysis: AdaptationReport,
    pub plan_diff: PlanDiffEntry,
}

#[derive(Debug, Serialize)]
pub struct TaskBrief {
    pub id: Uuid,
    pub title: String,
    pub task_date: DateTime<Utc>,
    pub estimated_minutes: i32,
}

impl From<&Task> for TaskBrief {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            task_date: task.task_date,
            estimated_minutes: task.estimated_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReinforceResponse {
    pub study_plan_id: Uuid,
    pub skill_name: String,
    pub tasks_added: usize,
    pub task_ids: Vec<Uuid>,
    pub tasks: Vec<TaskBrief>,
}

#[derive(Debug, Serialize)]
pub struct ReduceResponse {
    pub study_plan_id: Uuid,
    pub skill_name: String,
    pub tasks_marked_optional: usize,
    pub task_ids: Vec<Uuid>,
}

// ────────────────────────────────────────────────────────────────────────────
// Plans
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/plans
///
/// Imports plan-generator output as a new plan.
pub async fn handle_import_plan(
    State(state): State<AppState>,
    Json(req): Json<ImportPlanRequest>,
) -> Result<(StatusCode, Json<PlanTopology>), AppError> {
    let topology =
        service::import_plan(state.store.as_ref(), req.user_id, req.draft, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(topology)))
}

/// GET /api/v1/plans/:id
pub async fn handle_get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<PlanTopology>, AppError> {
    let topology = service::get_plan(state.store.as_ref(), params.user_id, plan_id).await?;
    Ok(Json(topology))
}

/// GET /api/v1/plans/:id/history
pub async fn handle_plan_history(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let adaptation_history =
        service::plan_history(state.store.as_ref(), params.user_id, plan_id).await?;
    Ok(Json(HistoryResponse {
        study_plan_id: plan_id,
        total: adaptation_history.len(),
        adaptation_history,
    }))
}

/// GET /api/v1/plans/:id/calendar.ics
pub async fn handle_plan_calendar(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let topology = service::get_plan(state.store.as_ref(), params.user_id, plan_id).await?;
    let body = render_ics(&topology, Utc::now());
    let headers = [
        (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"study-plan-{plan_id}.ics\""),
        ),
    ];
    Ok((headers, body))
}

// ────────────────────────────────────────────────────────────────────────────
// Adaptive
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/adaptive/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Query(params): Query<PlanQuery>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let (study_plan_id, analysis) = service::analyze_plan(
        state.store.as_ref(),
        params.user_id,
        params.study_plan_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(AnalyzeResponse {
        study_plan_id,
        recommendations_count: analysis.recommendations.len(),
        analysis,
    }))
}

/// POST /api/v1/adaptive/adapt
///
/// Full cycle: analyze, reinforce weak skills, reduce strong ones, log the diff.
pub async fn handle_adapt(
    State(state): State<AppState>,
    Query(params): Query<AdaptQuery>,
) -> Result<Json<AdaptResponse>, AppError> {
    let (study_plan_id, result) = service::adapt_plan(
        state.store.as_ref(),
        params.user_id,
        params.study_plan_id,
        params.apply_recommendations,
        Utc::now(),
    )
    .await?;
    Ok(Json(AdaptResponse {
        study_plan_id,
        success: true,
        summary: result.summary,
        changes: result.changes,
        analysis: result.analysis,
        plan_diff: result.plan_diff,
    }))
}

/// POST /api/v1/adaptive/reinforce
pub async fn handle_reinforce(
    State(state): State<AppState>,
    Query(params): Query<ReinforceQuery>,
) -> Result<Json<ReinforceResponse>, AppError> {
    let (study_plan_id, tasks) = service::reinforce_skill(
        state.store.as_ref(),
        params.user_id,
        params.study_plan_id,
        &params.skill_name,
        params.count,
        Utc::now(),
    )
    .await?;
    Ok(Json(ReinforceResponse {
        study_plan_id,
        skill_name: params.skill_name,
        tasks_added: tasks.len(),
        task_ids: tasks.iter().map(|t| t.id).collect(),
        tasks: tasks.iter().map(TaskBrief::from).collect(),
    }))
}

/// POST /api/v1/adaptive/reduce
pub async fn handle_reduce(
    State(state): State<AppState>,
    Query(params): Query<ReduceQuery>,
) -> Result<Json<ReduceResponse>, AppError> {
    let (study_plan_id, tasks) = service::reduce_skill(
        state.store.as_ref(),
        params.user_id,
        params.study_plan_id,
        &params.skill_name,
        params.max_tasks,
        Utc::now(),
    )
    .await?;
    Ok(Json(ReduceResponse {
        study_plan_id,
        skill_name: params.skill_name,
        tasks_marked_optional: tasks.len(),
        task_ids: tasks.iter().map(|t| t.id).collect(),
    }))
}
