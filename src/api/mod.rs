pub mod handlers;
pub mod models;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::engine::RecordService;

use handlers::AppState;

/// 构建路由；`secret` 存在时除 /version 外的请求都要 Bearer 认证
pub fn router(service: RecordService, secret: Option<String>) -> axum::Router {
    let state = AppState { service };

    let mut app = axum::Router::new()
        .route("/version", get(handlers::get_version))
        .route("/api/dns", post(handlers::create_record))
        .route("/api/dns/bulk/import", post(handlers::bulk_import))
        .route("/api/dns/bulk/export", get(handlers::bulk_export))
        .route("/api/dns/admin/purge", post(handlers::purge_expired))
        .route("/api/dns/admin/cache/flush", post(handlers::flush_cache))
        .route(
            "/api/dns/{hostname}",
            get(handlers::resolve).delete(handlers::delete_record),
        )
        .route("/api/dns/{hostname}/records", get(handlers::list_records))
        .layer(CorsLayer::permissive());

    if let Some(secret) = secret {
        app = app.layer(middleware::from_fn(move |req, next| {
            auth_middleware(req, next, secret.clone())
        }));
    }

    app.with_state(state)
}

/// 绑定端口并启动 API 服务器，`cancel` 触发后优雅退出
pub async fn start(
    config: &ApiConfig,
    service: RecordService,
    cancel: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let app = router(service, config.secret.clone());

    let bind_addr = format!("{}:{}", config.listen, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("API server bind failed on {}", bind_addr))?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, auth = config.secret.is_some(), "API server listening");

    let handle = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "API server error");
        }
        info!("API server stopped");
    });

    Ok((local_addr, handle))
}

/// Bearer token 认证中间件
async fn auth_middleware(req: Request, next: Next, secret: String) -> Result<Response, StatusCode> {
    // /version 端点不需要认证
    if req.uri().path() == "/version" {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if token == Some(secret.as_str()) {
        return Ok(next.run(req).await);
    }

    Err(StatusCode::UNAUTHORIZED)
}
