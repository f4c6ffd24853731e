use std::sync::Arc;

use autopost_core::config::AutopostConfig;
use autopost_scheduler::{ScheduleProcessor, SqliteHistoryLog, SqliteScheduleStore};
use axum::{
    routing::{get, post},
    Router,
};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: AutopostConfig,
    pub processor: Arc<ScheduleProcessor>,
    pub store: Arc<SqliteScheduleStore>,
    pub history: Arc<SqliteHistoryLog>,
}

impl AppState {
    pub fn new(
        config: AutopostConfig,
        processor: Arc<ScheduleProcessor>,
        store: Arc<SqliteScheduleStore>,
        history: Arc<SqliteHistoryLog>,
    ) -> Self {
        Self {
            config,
            processor,
            store,
            history,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/tick", post(crate::http::tick::tick_handler))
        .route("/jobs", get(crate::http::jobs::list_jobs))
        .route("/jobs/upcoming", get(crate::http::jobs::upcoming))
        .route("/jobs/{id}/run", post(crate::http::tick::run_now_handler))
        .route("/history", get(crate::http::jobs::history))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopost_core::config::{TriggerAuthMode, TriggerConfig};
    use autopost_scheduler::{IntervalUnit, NewJob, ProcessorConfig, Rule, VariantPolicy};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use rusqlite::Connection;
    use serde_json::Value;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let store = Arc::new(SqliteScheduleStore::from_shared(conn.clone()).unwrap());
        let history = Arc::new(SqliteHistoryLog::from_shared(conn).unwrap());
        let config = AutopostConfig {
            trigger: TriggerConfig {
                auth_mode: TriggerAuthMode::BearerToken,
                secret: Some("tok".to_string()),
                ..TriggerConfig::default()
            },
            ..AutopostConfig::default()
        };
        let processor = Arc::new(ScheduleProcessor::new(
            ProcessorConfig::from(&config.scheduler),
            store.clone(),
            history.clone(),
            crate::generator::build_generator(&config.generator),
        ));
        Arc::new(AppState::new(config, processor, store, history))
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let resp = build_router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn tick_requires_the_token() {
        let resp = build_router(state())
            .oneshot(Request::post("/tick").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authorized_tick_returns_a_report() {
        let resp = build_router(state())
            .oneshot(
                Request::post("/tick")
                    .header("authorization", "Bearer tok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = json_body(resp).await;
        assert_eq!(report["due"], 0);
        assert_eq!(report["store_failures"], 0);
    }

    #[tokio::test]
    async fn run_now_on_unknown_job_is_404() {
        let resp = build_router(state())
            .oneshot(
                Request::post("/jobs/nope/run")
                    .header("authorization", "Bearer tok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["code"], "JOB_NOT_FOUND");
    }

    #[tokio::test]
    async fn jobs_listing_returns_stored_jobs() {
        let state = state();
        state
            .store
            .insert_job(NewJob {
                name: "digest".to_string(),
                rule: Rule::FixedInterval {
                    unit: IntervalUnit::Day,
                    count: 1,
                },
                start_at: None,
                topic_override: None,
                variant_policy: VariantPolicy::Fixed {
                    variant: "default".to_string(),
                },
                payload_ref: "template:1".to_string(),
            })
            .unwrap();

        let resp = build_router(state)
            .oneshot(
                Request::get("/jobs")
                    .header("authorization", "Bearer tok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let jobs = json_body(resp).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["name"], "digest");
    }
}
