//! Worker health check.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use homeman_redis::TaskMessage;
use tracing::debug;

use crate::error::ApiResult;
use crate::state::AppState;

/// Utility routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/utils/health-check/", get(health_check))
}

/// Hands a health-check task to the workers.
async fn health_check(State(state): State<AppState>) -> ApiResult<Json<bool>> {
    let message = TaskMessage::health_check();
    state.tasks.enqueue(&message).await?;
    debug!(id = %message.id, "health-check task enqueued");
    Ok(Json(true))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use homeman_redis::HEALTH_CHECK_TASK;

    use crate::testing::TestApp;

    #[tokio::test]
    async fn test_health_check_enqueues() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/v1/utils/health-check/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, true);
        assert_eq!(app.queued_tasks(), vec![HEALTH_CHECK_TASK]);
    }

    #[tokio::test]
    async fn test_health_check_fails_fast_when_broker_degraded() {
        let app = TestApp::degraded().await;

        for _ in 0..2 {
            let started = std::time::Instant::now();
            let (status, body) = app.get("/api/v1/utils/health-check/", None).await;

            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["detail"], "Service unavailable: redis is degraded");
            assert!(started.elapsed() < std::time::Duration::from_secs(1));
        }
        assert!(app.queued_tasks().is_empty());
    }
}
