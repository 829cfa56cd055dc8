use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use netctx_api::{HarvestLayer, http::Propagated};
use netctx_core::Registry;
use netctx_observe::{LoggerConfig, init_logger};
use relay::{
    clients::{DeadlineBody, ErrorBody, GrpcNextHop},
    config::DemoConfig,
    hop, relay as hops, shutdown_signal,
};
use serde::Deserialize;
use tonic::Code;
use tracing::info;

#[derive(Debug, Deserialize)]
struct DeadlineQuery {
    #[serde(default)]
    todo: i32,
    #[serde(default)]
    timeout: i32,
}

async fn deadline(
    State(next): State<Arc<GrpcNextHop>>,
    Propagated(ctx): Propagated,
    Query(q): Query<DeadlineQuery>,
) -> Response {
    match hops::deadline(next.as_ref(), ctx, q.todo, q.timeout).await {
        Ok(resp) => Json(DeadlineBody { hops: resp.hops }).into_response(),
        Err(status) => {
            let code = if status.code() == Code::DeadlineExceeded {
                StatusCode::REQUEST_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (code, Json(ErrorBody::from(&status))).into_response()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    init_logger(&LoggerConfig::from_env()?)?;
    let cfg = DemoConfig::from_env()?;

    // 2) Registry, configured at start-up
    let registry = Arc::new(Registry::from_config(&cfg.propagation)?);
    hop::register(&registry);

    // 3) Outgoing gRPC client
    let next = Arc::new(GrpcNextHop::new(registry.clone(), cfg.grpc_url())?);

    // 4) Router with the harvesting middleware
    let app = Router::new()
        .route("/deadline", get(deadline))
        .with_state(next)
        .layer(HarvestLayer::http(registry));

    let listener = tokio::net::TcpListener::bind(cfg.http_addr())
        .await
        .with_context(|| format!("bind {}", cfg.http_addr()))?;
    info!("http service running on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutting down");
    Ok(())
}
