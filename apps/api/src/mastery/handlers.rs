use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::mastery::ledger::{
    get_skill_mastery, get_stats, ingest_attempt, AttemptInput, IngestOutcome, MasteryStats,
};
use crate::models::mastery::MasteryRecord;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct MasteryListResponse {
    pub skills: Vec<MasteryRecord>,
    pub total: usize,
}

/// POST /api/v1/attempts
pub async fn handle_record_attempt(
    State(state): State<AppState>,
    Json(req): Json<AttemptInput>,
) -> Result<(StatusCode, Json<IngestOutcome>), AppError> {
    let outcome = ingest_attempt(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/mastery
pub async fn handle_list_mastery(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<MasteryListResponse>, AppError> {
    let skills = state.store.list_mastery(params.user_id).await?;
    let total = skills.len();
    Ok(Json(MasteryListResponse { skills, total }))
}

/// GET /api/v1/mastery/stats
pub async fn handle_mastery_stats(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<MasteryStats>, AppError> {
    Ok(Json(get_stats(state.store.as_ref(), params.user_id).await?))
}

/// GET /api/v1/mastery/:skill
pub async fn handle_get_skill(
    State(state): State<AppState>,
    Path(skill): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<MasteryRecord>, AppError> {
    let record = get_skill_mastery(state.store.as_ref(), params.user_id, &skill).await?;
    Ok(Json(record))
}
