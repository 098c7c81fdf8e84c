//! HTTP surface over the capture context.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::pipeline::CaptureContext;
use crate::{query, QueryError, ServerConfig};

type AppState = State<Arc<CaptureContext>>;

const STREAM_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Frameport</title>
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <style>
    body { margin: 0; background: #000; color: #fff; font-family: sans-serif;
           display: flex; align-items: center; justify-content: center; height: 100vh; }
    #stream { max-width: 100%; max-height: 100vh; object-fit: contain; }
    #status { position: absolute; bottom: 10px; right: 10px; font-size: 12px;
              background: rgba(0, 0, 0, 0.5); padding: 5px 10px; border-radius: 4px; }
  </style>
</head>
<body>
  <img id="stream" src="/api/camera-feed" alt="Camera Stream">
  <div id="status">Connected</div>
  <script>
    const stream = document.getElementById('stream');
    const status = document.getElementById('status');
    let errors = 0;
    let loading = false;
    setInterval(() => {
      if (loading) return;
      loading = true;
      const next = new Image();
      next.onload = () => {
        stream.src = next.src;
        errors = 0;
        loading = false;
        status.textContent = 'Connected';
        status.style.color = '#4CAF50';
      };
      next.onerror = () => {
        loading = false;
        if (++errors > 5) {
          status.textContent = 'Connection error';
          status.style.color = '#F44336';
        }
      };
      next.src = '/api/camera-feed?t=' + Date.now();
    }, 200);
  </script>
</body>
</html>
"#;

/// Build the router with permissive CORS
pub fn router(ctx: Arc<CaptureContext>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/camera-feed", get(jpeg_handler))
        .route("/api/camera-jpeg", get(jpeg_handler))
        .route("/api/camera-frame", get(frame_handler))
        .route("/api/camera-status", get(status_handler))
        .route("/api/camera-stream", get(stream_page))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(
    ctx: Arc<CaptureContext>,
    config: &ServerConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!("Starting server on http://{}", addr);
    info!("JPEG endpoint: http://{}/api/camera-jpeg", addr);
    info!("Status endpoint: http://{}/api/camera-status", addr);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}

fn status_code(err: &QueryError) -> StatusCode {
    match err {
        QueryError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
        QueryError::NotReady | QueryError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Frameport camera server is running" }))
}

async fn jpeg_handler(State(ctx): AppState) -> Response {
    match query::latest_jpeg(&ctx).await {
        Ok(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Err(e) => {
            error!("Frame request failed: {}", e);
            (status_code(&e), e.to_string()).into_response()
        }
    }
}

async fn frame_handler(State(ctx): AppState) -> Response {
    match query::frame_payload(&ctx).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => {
            error!("Frame request failed: {}", e);
            (status_code(&e), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn status_handler(State(ctx): AppState) -> impl IntoResponse {
    Json(query::status(&ctx))
}

async fn stream_page() -> Html<&'static str> {
    Html(STREAM_PAGE)
}
