use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::TaskError;
use crate::utils::http::{sanitize_filename, save_upload};
use crate::AppContext;

const INDEX_HTML: &str = include_str!("../../../templates/index.html");
const PROCESSING_HTML: &str = include_str!("../../../templates/processing.html");

pub const UPLOAD_LIMIT: usize = 20 * 1024 * 1024;
const UPLOAD_FIELD: &str = "image";

pub fn pages_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route(
            "/process",
            post(process_upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/processing/:filename/:task_id", get(processing_page))
        .with_state(ctx)
}

fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Task ids are generated as UUIDs; anything else in the path is refused.
pub fn is_valid_task_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn upload_rejected() -> Response {
    (StatusCode::BAD_REQUEST, TaskError::UploadRejected.to_string()).into_response()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn processing_page(Path((filename, task_id)): Path<(String, String)>) -> Response {
    let Some(filename) = sanitize_filename(&filename) else {
        return upload_rejected();
    };
    if !is_valid_task_id(&task_id) {
        return (StatusCode::BAD_REQUEST, "Invalid task id").into_response();
    }
    let page = PROCESSING_HTML
        .replace("{{filename}}", &html_escape(&filename))
        .replace("{{task_id}}", &html_escape(&task_id));
    Html(page).into_response()
}

async fn process_upload(
    State(ctx): State<Arc<AppContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            warn!("Upload is not a multipart form: {}", e);
            return upload_rejected();
        }
    };

    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read upload: {}", e);
                return (e.status(), e.body_text()).into_response();
            }
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let raw_name = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => {
                upload = Some((raw_name, bytes));
                break;
            }
            Err(e) => {
                warn!("Failed to read upload: {}", e);
                return (e.status(), e.body_text()).into_response();
            }
        }
    }

    let Some((raw_name, bytes)) = upload else {
        return upload_rejected();
    };
    let Some(filename) = sanitize_filename(&raw_name) else {
        return upload_rejected();
    };

    if let Err(e) = save_upload(&ctx.settings.upload_dir, &filename, &bytes).await {
        error!("Failed to store upload {}: {}", filename, e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload").into_response();
    }

    let task_id = Uuid::new_v4().to_string();
    info!(task_id = %task_id, filename = %filename, "Upload accepted");
    Redirect::to(&format!("/processing/{}/{}", filename, task_id)).into_response()
}
