use axum::Router;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use crate::AppContext;

pub mod cancel;
pub mod pages;
pub mod stream;

const STATIC_DIR: &str = "static";

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .merge(pages::pages_router(ctx.clone()))
        .merge(stream::stream_router(ctx.clone()))
        .merge(cancel::cancel_router(ctx))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::chem::NativeToolkit;
    use crate::task::backend::testing::ScriptBackend;
    use crate::task::TaskRegistry;
    use crate::Settings;

    /// App context over a temporary upload directory, recognizing with `script`.
    pub fn context(script: &str) -> (Arc<AppContext>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = ScriptBackend::new(script);
        // mirrors docker stop on a container that is already gone
        backend.terminate_script = Some("exit 1".to_string());
        let ctx = AppContext {
            settings: Settings {
                upload_dir: dir.path().to_path_buf(),
                recognition_timeout: Duration::from_secs(10),
                heartbeat_interval: Duration::from_millis(50),
                stop_timeout: Duration::from_secs(1),
            },
            registry: Arc::new(TaskRegistry::new()),
            backend: Arc::new(backend),
            toolkit: Arc::new(NativeToolkit::new()),
        };
        (Arc::new(ctx), dir)
    }

    pub async fn send(ctx: Arc<AppContext>, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = router(ctx).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_static_assets_are_served() {
        let (ctx, _dir) = context("true");
        let (status, _, body) = send(ctx, Request::get("/static/theme.js").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("applyTheme"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (ctx, _dir) = context("true");
        let (status, _, _) = send(ctx, Request::get("/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
