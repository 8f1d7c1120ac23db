//! Hive HTTP 服务
//!
//! 启动: cargo run --bin hive-server --features web
//! POST /query 开始一个回合，POST /continue/:thread_id 在断线后继续，响应均为 SSE 帧流。

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use hive::agent::create_engine;
use hive::config::load_config;
use hive::files::AttachedFile;
use hive::stream::{reconnect, stream_turn, FrameStream, StreamOptions};
use hive::workflow::{TurnEngine, TurnInput};

struct AppState {
    engine: Arc<TurnEngine>,
    options: StreamOptions,
    /// 服务关闭时取消所有进行中的回合
    shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    thread_id: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    attached_files: Vec<AttachedFile>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Config load failed, using defaults");
        Default::default()
    });
    let engine = Arc::new(create_engine(&cfg)?);
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        engine,
        options: cfg.stream.options(),
        shutdown: shutdown.clone(),
    });

    let app = Router::new()
        .route("/query", post(api_query))
        .route("/continue/:thread_id", post(api_continue))
        .route("/health", get(|| async { "OK" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await?;
    tracing::info!("Hive server: http://{}", cfg.server.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// POST /query：开始一个回合
async fn api_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query is required".to_string()));
    }
    if req.thread_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "thread_id is required".to_string()));
    }

    let mut input = TurnInput::new(req.thread_id, query).with_files(req.attached_files);
    if let Some(tenant) = req.tenant_id.filter(|s| !s.is_empty()) {
        input = input.with_tenant(tenant);
    }
    tracing::info!(thread_id = %input.thread_id, "Turn started");
    let frames = stream_turn(
        Arc::clone(&state.engine),
        input,
        state.options,
        state.shutdown.child_token(),
    );
    sse_response(frames)
}

/// POST /continue/:thread_id：断线重连，从最近的检查点继续
async fn api_continue(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    tracing::info!(thread_id = %thread_id, "Reconnect requested");
    let frames = reconnect(
        Arc::clone(&state.engine),
        thread_id,
        state.options,
        state.shutdown.child_token(),
    );
    sse_response(frames)
}

fn sse_response(frames: FrameStream) -> Result<Response, (StatusCode, String)> {
    let body = frames.map(|frame| Ok::<Bytes, Infallible>(Bytes::from(frame.to_sse())));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
