pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::coach::handlers as coach;
use crate::mastery::handlers as mastery;
use crate::planning::handlers as planning;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Mastery API
        .route("/api/v1/attempts", post(mastery::handle_record_attempt))
        .route("/api/v1/mastery", get(mastery::handle_list_mastery))
        .route("/api/v1/mastery/stats", get(mastery::handle_mastery_stats))
        .route("/api/v1/mastery/:skill", get(mastery::handle_get_skill))
        // Plans API
        .route("/api/v1/plans", post(planning::handle_import_plan))
        .route("/api/v1/plans/:id", get(planning::handle_get_plan))
        .route(
            "/api/v1/plans/:id/history",
            get(planning::handle_plan_history),
        )
        .route(
            "/api/v1/plans/:id/calendar.ics",
            get(planning::handle_plan_calendar),
        )
        // Adaptive API
        .route("/api/v1/adaptive/analyze", get(planning::handle_analyze))
        .route("/api/v1/adaptive/adapt", post(planning::handle_adapt))
        .route("/api/v1/adaptive/reinforce", post(planning::handle_reinforce))
        .route("/api/v1/adaptive/reduce", post(planning::handle_reduce))
        // Coach API
        .route("/api/v1/coach/briefing", get(coach::handle_briefing))
        .route(
            "/api/v1/coach/tasks/:id/status",
            post(coach::handle_update_status),
        )
        .route(
            "/api/v1/coach/tasks/:id/complete",
            post(coach::handle_complete),
        )
        .route(
            "/api/v1/coach/tasks/:id/reschedule",
            post(coach::handle_reschedule),
        )
        .route("/api/v1/coach/carry-over", post(coach::handle_carry_over))
        .route(
            "/api/v1/coach/auto-reschedule",
            post(coach::handle_auto_reschedule),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::coach::motivation::TemplateMotivator;
    use crate::store::MemoryStore;

    fn app() -> Router {
        build_router(AppState {
            store: Arc::new(MemoryStore::new()),
            motivator: Arc::new(TemplateMotivator),
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "coach-api");
    }

    #[tokio::test]
    async fn test_attempt_then_mastery_queries() {
        let app = app();
        let user = Uuid::new_v4();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/attempts",
            Some(json!({"user_id": user, "skill_names": ["Docker"], "score": 0.4})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["updated"][0]["practice_count"], 1);

        let (status, body) =
            send(&app, Method::GET, &format!("/api/v1/mastery/Docker?user_id={user}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score"], 0.4);

        let (status, body) =
            send(&app, Method::GET, &format!("/api/v1/mastery/stats?user_id={user}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_skills"], 1);
        assert_eq!(body["recent_practice_count"], 1);

        let (status, body) =
            send(&app, Method::GET, &format!("/api/v1/mastery/Go?user_id={user}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_score_is_bad_request() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/v1/attempts",
            Some(json!({"user_id": Uuid::new_v4(), "skill_names": ["Go"], "score": 1.5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_SCORE");
    }

    #[tokio::test]
    async fn test_import_adapt_and_brief() {
        let app = app();
        let user = Uuid::new_v4();
        let today = chrono::Utc::now().date_naive();

        let (status, plan) = send(
            &app,
            Method::POST,
            "/api/v1/plans",
            Some(json!({
                "user_id": user,
                "requested_week_count": 2,
                "hours_per_week": 6.0,
                "weeks": [{
                    "week_number": 1,
                    "theme": "Containers",
                    "days": [{
                        "day_number": 1,
                        "date": today,
                        "tasks": [{"task_type": "learn", "title": "Docker basics",
                                   "skill_names": ["Docker"], "estimated_minutes": 60}]
                    }]
                }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let plan_id = plan["plan"]["id"].as_str().unwrap().to_string();

        for score in [0.3, 0.2, 0.1] {
            send(
                &app,
                Method::POST,
                "/api/v1/attempts",
                Some(json!({"user_id": user, "skill_names": ["Docker"], "score": score})),
            )
            .await;
        }

        let (status, body) =
            send(&app, Method::POST, &format!("/api/v1/adaptive/adapt?user_id={user}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["study_plan_id"], plan_id.as_str());
        assert_eq!(body["summary"]["reinforcement_tasks_added"], 2);
        assert_eq!(body["changes"][0]["type"], "added_reinforcement");

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/v1/plans/{plan_id}/history?user_id={user}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["adaptation_history"][0]["changes"][0]["action"], "add");

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/v1/coach/briefing?user_id={user}&date={today}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["total_tasks"].as_u64().unwrap() >= 1);
        assert!(!body["motivational_message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_calendar_export_content_type() {
        let app = app();
        let user = Uuid::new_v4();
        let (_, plan) = send(
            &app,
            Method::POST,
            "/api/v1/plans",
            Some(json!({"user_id": user, "requested_week_count": 1, "hours_per_week": 3.0})),
        )
        .await;
        let plan_id = plan["plan"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/plans/{plan_id}/calendar.ics?user_id={user}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/calendar; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (status, body) = send(
            &app(),
            Method::POST,
            &format!("/api/v1/coach/tasks/{}/complete", Uuid::new_v4()),
            Some(json!({"user_id": Uuid::new_v4()})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
