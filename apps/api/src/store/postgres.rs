use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::mastery::{MasteryRecord, ScoredAttempt, Trend};
use crate::models::plan::{Day, Plan, PlanDiffEntry, Task, TaskContent, TaskStatus, TaskType, Week};
use crate::planning::topology::PlanTopology;
use crate::store::{CoachStore, MasteryUpdate, StoreError};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Row types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct MasteryRow {
    user_id: Uuid,
    skill_name: String,
    score: f64,
    practice_count: i32,
    trend: Option<String>,
    last_practiced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MasteryRow> for MasteryRecord {
    type Error = StoreError;

    fn try_from(row: MasteryRow) -> Result<Self, Self::Error> {
        let trend = row
            .trend
            .as_deref()
            .map(|t| Trend::parse(t).ok_or_else(|| StoreError::Corrupt(format!("trend '{t}'"))))
            .transpose()?;
        Ok(MasteryRecord {
            user_id: row.user_id,
            skill_name: row.skill_name,
            score: row.score,
            practice_count: row.practice_count,
            trend,
            last_practiced_at: row.last_practiced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PlanRow {
    id: Uuid,
    user_id: Uuid,
    requested_week_count: i32,
    hours_per_week: f64,
    revision: i64,
    adaptation_history: Json<Vec<PlanDiffEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct WeekRow {
    id: Uuid,
    plan_id: Uuid,
    week_number: i32,
    theme: String,
    estimated_hours: f64,
}

#[derive(Debug, FromRow)]
struct DayRow {
    id: Uuid,
    week_id: Uuid,
    day_number: i32,
    date: DateTime<Utc>,
    theme: String,
    estimated_hours: f64,
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    plan_id: Uuid,
    day_id: Option<Uuid>,
    task_date: DateTime<Utc>,
    task_type: String,
    status: String,
    title: String,
    description: String,
    skill_names: Vec<String>,
    estimated_minutes: i32,
    actual_minutes: Option<i32>,
    completed_at: Option<DateTime<Utc>>,
    dependencies: Vec<Uuid>,
    content: Json<TaskContent>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let task_type = TaskType::parse(&row.task_type)
            .ok_or_else(|| StoreError::Corrupt(format!("task_type '{}'", row.task_type)))?;
        let status = TaskStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("status '{}'", row.status)))?;
        Ok(Task {
            id: row.id,
            plan_id: row.plan_id,
            day_id: row.day_id,
            task_date: row.task_date,
            task_type,
            status,
            title: row.title,
            description: row.description,
            skill_names: row.skill_names,
            estimated_minutes: row.estimated_minutes,
            actual_minutes: row.actual_minutes,
            completed_at: row.completed_at,
            dependencies: row.dependencies,
            content: row.content.0,
            created_at: row.created_at,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Upserts (mastery, and the schedule shared by insert and commit)
// ────────────────────────────────────────────────────────────────────────────

async fn upsert_mastery(
    tx: &mut Transaction<'static, Postgres>,
    record: &MasteryRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO skill_mastery
            (user_id, skill_name, score, practice_count, trend,
             last_practiced_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id, skill_name) DO UPDATE
        SET score = EXCLUDED.score,
            practice_count = EXCLUDED.practice_count,
            trend = EXCLUDED.trend,
            last_practiced_at = EXCLUDED.last_practiced_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(record.user_id)
    .bind(&record.skill_name)
    .bind(record.score)
    .bind(record.practice_count)
    .bind(record.trend.map(|t| t.as_str()))
    .bind(record.last_practiced_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}


async fn upsert_schedule(
    tx: &mut Transaction<'static, Postgres>,
    topology: &PlanTopology,
) -> Result<(), StoreError> {
    for week in &topology.weeks {
        sqlx::query(
            r#"
            INSERT INTO plan_weeks (id, plan_id, week_number, theme, estimated_hours)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET week_number = EXCLUDED.week_number,
                theme = EXCLUDED.theme,
                estimated_hours = EXCLUDED.estimated_hours
            "#,
        )
        .bind(week.id)
        .bind(week.plan_id)
        .bind(week.week_number)
        .bind(&week.theme)
        .bind(week.estimated_hours)
        .execute(&mut **tx)
        .await?;
    }

    for day in &topology.days {
        sqlx::query(
            r#"
            INSERT INTO plan_days (id, week_id, day_number, date, theme, estimated_hours)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET day_number = EXCLUDED.day_number,
                date = EXCLUDED.date,
                theme = EXCLUDED.theme,
                estimated_hours = EXCLUDED.estimated_hours
            "#,
        )
        .bind(day.id)
        .bind(day.week_id)
        .bind(day.day_number)
        .bind(day.date)
        .bind(&day.theme)
        .bind(day.estimated_hours)
        .execute(&mut **tx)
        .await?;
    }

    for task in &topology.tasks {
        sqlx::query(
            r#"
            INSERT INTO daily_tasks
                (id, plan_id, day_id, task_date, task_type, status, title, description,
                 skill_names, estimated_minutes, actual_minutes, completed_at,
                 dependencies, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE
            SET day_id = EXCLUDED.day_id,
                task_date = EXCLUDED.task_date,
                status = EXCLUDED.status,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                skill_names = EXCLUDED.skill_names,
                estimated_minutes = EXCLUDED.estimated_minutes,
                actual_minutes = EXCLUDED.actual_minutes,
                completed_at = EXCLUDED.completed_at,
                dependencies = EXCLUDED.dependencies,
                content = EXCLUDED.content
            "#,
        )
        .bind(task.id)
        .bind(task.plan_id)
        .bind(task.day_id)
        .bind(task.task_date)
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.skill_names)
        .bind(task.estimated_minutes)
        .bind(task.actual_minutes)
        .bind(task.completed_at)
        .bind(&task.dependencies)
        .bind(Json(&task.content))
        .bind(task.created_at)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl CoachStore for PgStore {
    async fn get_mastery(
        &self,
        user_id: Uuid,
        skill_name: &str,
    ) -> Result<Option<MasteryRecord>, StoreError> {
        sqlx::query_as::<_, MasteryRow>(
            "SELECT * FROM skill_mastery WHERE user_id = $1 AND skill_name = $2",
        )
        .bind(user_id)
        .bind(skill_name)
        .fetch_optional(&self.pool)
        .await?
        .map(MasteryRecord::try_from)
        .transpose()
    }

    async fn list_mastery(&self, user_id: Uuid) -> Result<Vec<MasteryRecord>, StoreError> {
        sqlx::query_as::<_, MasteryRow>(
            "SELECT * FROM skill_mastery WHERE user_id = $1 ORDER BY score DESC, skill_name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MasteryRecord::try_from)
        .collect()
    }

    async fn record_attempt(
        &self,
        attempt: &ScoredAttempt,
        history_limit: usize,
        update: &MasteryUpdate,
    ) -> Result<Vec<MasteryRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Advisory locks also cover skills with no row yet. Taken in name
        // order so two multi-skill attempts cannot deadlock.
        let mut lock_order: Vec<&String> = attempt.skill_names.iter().collect();
        lock_order.sort();
        for skill in lock_order {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text || '/' || $2::text, 0))")
                .bind(attempt.user_id.to_string())
                .bind(skill)
                .execute(&mut *tx)
                .await?;
        }

        let mut updated = Vec::with_capacity(attempt.skill_names.len());
        for skill in &attempt.skill_names {
            let existing = sqlx::query_as::<_, MasteryRow>(
                "SELECT * FROM skill_mastery WHERE user_id = $1 AND skill_name = $2 FOR UPDATE",
            )
            .bind(attempt.user_id)
            .bind(skill)
            .fetch_optional(&mut *tx)
            .await?
            .map(MasteryRecord::try_from)
            .transpose()?;

            let prior: Vec<f64> = sqlx::query_scalar(
                r#"
                SELECT score FROM scored_attempts
                WHERE user_id = $1 AND $2 = ANY(skill_names)
                ORDER BY created_at DESC
                LIMIT $3
                "#,
            )
            .bind(attempt.user_id)
            .bind(skill)
            .bind(history_limit as i64)
            .fetch_all(&mut *tx)
            .await?;

            let record = update(skill.as_str(), existing, &prior);
            upsert_mastery(&mut tx, &record).await?;
            updated.push(record);
        }

        sqlx::query(
            "INSERT INTO scored_attempts (id, user_id, skill_names, score, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(&attempt.skill_names)
        .bind(attempt.score)
        .bind(attempt.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn count_attempts_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scored_attempts WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn latest_plan_id(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM study_plans WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn plan_id_for_task(&self, task_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT plan_id FROM daily_tasks WHERE id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn load_topology(&self, plan_id: Uuid) -> Result<Option<PlanTopology>, StoreError> {
        // One snapshot for all four reads; a concurrent commit must not tear it.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(plan_row) =
            sqlx::query_as::<_, PlanRow>("SELECT * FROM study_plans WHERE id = $1")
                .bind(plan_id)
                .fetch_optional(&mut *tx)
                .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let weeks = sqlx::query_as::<_, WeekRow>(
            "SELECT * FROM plan_weeks WHERE plan_id = $1 ORDER BY week_number",
        )
        .bind(plan_id)
        .fetch_all(&mut *tx)
        .await?;

        let days = sqlx::query_as::<_, DayRow>(
            r#"
            SELECT d.* FROM plan_days d
            JOIN plan_weeks w ON w.id = d.week_id
            WHERE w.plan_id = $1
            ORDER BY w.week_number, d.date, d.day_number
            "#,
        )
        .bind(plan_id)
        .fetch_all(&mut *tx)
        .await?;

        let tasks = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM daily_tasks WHERE plan_id = $1 ORDER BY task_date, created_at",
        )
        .bind(plan_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            "Loaded plan {plan_id}: {} weeks, {} days, {} tasks",
            weeks.len(),
            days.len(),
            tasks.len()
        );

        Ok(Some(PlanTopology {
            plan: Plan {
                id: plan_row.id,
                user_id: plan_row.user_id,
                requested_week_count: plan_row.requested_week_count,
                hours_per_week: plan_row.hours_per_week,
                revision: plan_row.revision,
                adaptation_history: plan_row.adaptation_history.0,
                created_at: plan_row.created_at,
                updated_at: plan_row.updated_at,
            },
            weeks: weeks
                .into_iter()
                .map(|w| Week {
                    id: w.id,
                    plan_id: w.plan_id,
                    week_number: w.week_number,
                    theme: w.theme,
                    estimated_hours: w.estimated_hours,
                })
                .collect(),
            days: days
                .into_iter()
                .map(|d| Day {
                    id: d.id,
                    week_id: d.week_id,
                    day_number: d.day_number,
                    date: d.date,
                    theme: d.theme,
                    estimated_hours: d.estimated_hours,
                })
                .collect(),
            tasks: tasks
                .into_iter()
                .map(Task::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        }))
    }

    async fn insert_topology(&self, topology: &PlanTopology) -> Result<(), StoreError> {
        let plan = &topology.plan;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO study_plans
                (id, user_id, requested_week_count, hours_per_week, revision,
                 adaptation_history, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(plan.id)
        .bind(plan.user_id)
        .bind(plan.requested_week_count)
        .bind(plan.hours_per_week)
        .bind(plan.revision)
        .bind(Json(&plan.adaptation_history))
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&mut *tx)
        .await?;

        upsert_schedule(&mut tx, topology).await?;
        tx.commit().await?;

        info!(
            "Inserted plan {} for user {} ({} tasks)",
            plan.id,
            plan.user_id,
            topology.tasks.len()
        );
        Ok(())
    }

    async fn commit_topology(&self, topology: &PlanTopology) -> Result<i64, StoreError> {
        let plan = &topology.plan;
        let mut tx = self.pool.begin().await?;

        // Conditional bump: zero rows means another writer committed first.
        let revision: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE study_plans
            SET revision = revision + 1,
                adaptation_history = $1,
                updated_at = now()
            WHERE id = $2 AND revision = $3
            RETURNING revision
            "#,
        )
        .bind(Json(&plan.adaptation_history))
        .bind(plan.id)
        .bind(plan.revision)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(revision) = revision else {
            tx.rollback().await?;
            return Err(StoreError::Conflict {
                plan_id: plan.id,
                expected: plan.revision,
            });
        };

        upsert_schedule(&mut tx, topology).await?;
        tx.commit().await?;

        debug!("Committed plan {} at revision {revision}", plan.id);
        Ok(revision)
    }
}
