use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::info;

use crate::error::TaskError;
use crate::task::{StreamController, Task};
use crate::utils::http::sanitize_filename;
use crate::web::handlers::pages::is_valid_task_id;
use crate::AppContext;

pub fn stream_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/stream-process/:filename/:task_id", get(stream_process))
        .with_state(ctx)
}

async fn stream_process(
    State(ctx): State<Arc<AppContext>>,
    Path((filename, task_id)): Path<(String, String)>,
) -> Response {
    // the path segment is client controlled, so it is cleaned again before touching the disk
    let Some(filename) = sanitize_filename(&filename) else {
        return (StatusCode::BAD_REQUEST, TaskError::UploadRejected.to_string()).into_response();
    };
    if !is_valid_task_id(&task_id) {
        return (StatusCode::BAD_REQUEST, "Invalid task id").into_response();
    }

    info!(task_id = %task_id, filename = %filename, "Opening event stream");
    let task = Task::new(&task_id, &filename, &ctx.settings.upload_dir);
    let events = StreamController::from_context(&ctx)
        .events(task)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.data())));

    Sse::new(events).into_response()
}

#[cfg(test)]
mod tests {
    use crate::web::handlers::tests::{context, send};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};

    #[tokio::test]
    async fn test_stream_success_over_sse() {
        let (ctx, _dir) = context("echo 'C1=CC=CC=C1 garbage'");
        let (status, headers, body) = send(
            ctx.clone(),
            Request::get("/stream-process/mol.png/task-1").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
        assert!(body.starts_with("data: Process started...\n\n"));

        let last = body
            .split("\n\n")
            .filter(|chunk| !chunk.is_empty())
            .last()
            .unwrap()
            .trim_start_matches("data: ");
        let json: serde_json::Value = serde_json::from_str(last).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["smiles"], "C1=CC=CC=C1");
        assert_eq!(json["mol_formula"], "C6H6");
        assert!(!ctx.registry.is_active("task-1"));
    }

    #[tokio::test]
    async fn test_stream_error_over_sse() {
        let (ctx, _dir) = context("echo 'osra crashed' >&2; exit 3");
        let (_, _, body) = send(
            ctx,
            Request::get("/stream-process/mol.png/task-2").body(Body::empty()).unwrap(),
        )
        .await;
        assert!(body.contains(r#"data: {"message":"osra crashed","status":"error"}"#));
    }

    #[tokio::test]
    async fn test_stream_rejects_bad_path() {
        let (ctx, _dir) = context("true");
        let (status, _, _) = send(
            ctx,
            Request::get("/stream-process/mol.png/bad%20id").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
