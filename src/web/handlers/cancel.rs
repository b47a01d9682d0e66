use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::task::Task;
use crate::utils::http::StatusResponse;
use crate::AppContext;

pub const CANCELLED_MESSAGE: &str = "Cancellation signal processed.";
pub const NOT_FOUND_MESSAGE: &str = "Task not found or already finished.";

pub fn cancel_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/cancel/:task_id", post(cancel_task))
        .with_state(ctx)
}

/// Removes the task from the registry first, then stops its container. The
/// stop command is best effort; the registry removal is what the stream acts on.
async fn cancel_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Json<StatusResponse> {
    if !ctx.registry.deregister(&task_id) {
        info!(task_id = %task_id, "Cancel requested for unknown task");
        return Json(StatusResponse::new("not_found", NOT_FOUND_MESSAGE));
    }

    info!(task_id = %task_id, "Cancel requested, stopping recognition");
    let task = Task::new(&task_id, "", &ctx.settings.upload_dir);
    if let Err(e) = ctx.backend.terminate(&task, ctx.settings.stop_timeout).await {
        warn!(task_id = %task_id, "Failed to stop recognition: {}", e);
    }
    Json(StatusResponse::new("success", CANCELLED_MESSAGE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::handlers::tests::{context, send};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn cancel(id: &str) -> Request<Body> {
        Request::post(format!("/cancel/{}", id)).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let (ctx, _dir) = context("true");
        let (status, _, body) = send(ctx, cancel("nope")).await;
        assert_eq!(status, StatusCode::OK);
        let response: StatusResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response, StatusResponse::new("not_found", NOT_FOUND_MESSAGE));
    }

    #[tokio::test]
    async fn test_cancel_live_task_even_if_stop_fails() {
        let (ctx, _dir) = context("true");
        let guard = ctx.registry.register("live");

        let (status, _, body) = send(Arc::clone(&ctx), cancel("live")).await;
        assert_eq!(status, StatusCode::OK);
        let response: StatusResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response, StatusResponse::new("success", CANCELLED_MESSAGE));
        assert!(!ctx.registry.is_active("live"));
        assert!(guard.token().is_cancelled());

        // a second cancel finds nothing
        let (_, _, body) = send(ctx, cancel("live")).await;
        let response: StatusResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.status, "not_found");
    }

    #[tokio::test]
    async fn test_cancel_ends_running_stream() {
        let (ctx, _dir) = context("sleep 30");
        let streaming = tokio::spawn(send(
            Arc::clone(&ctx),
            Request::get("/stream-process/mol.png/running").body(Body::empty()).unwrap(),
        ));

        for _ in 0..100 {
            if ctx.registry.is_active("running") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let (_, _, body) = send(Arc::clone(&ctx), cancel("running")).await;
        assert!(body.contains("success"));

        let (_, _, events) = tokio::time::timeout(std::time::Duration::from_secs(5), streaming)
            .await
            .unwrap()
            .unwrap();
        assert!(events.contains("cancelled"));
        assert!(!events.contains("\"status\":\"success\""));
    }
}
