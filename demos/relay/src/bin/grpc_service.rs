use std::sync::{Arc, LazyLock};

use anyhow::Context;
use netctx_api::{HarvestLayer, grpc};
use netctx_core::Registry;
use netctx_observe::{LoggerConfig, init_logger};
use relay::{
    clients::HttpNextHop,
    config::DemoConfig,
    hop,
    proto::{
        DeadlineRequest, DeadlineResponse,
        example_service_server::{ExampleService, ExampleServiceServer},
    },
    relay as hops, shutdown_signal,
};
use tonic::{Request, Response, Status, transport::Server};
use tracing::info;

/// The process-wide registry, with `hop` registered on first use.
static REGISTRY: LazyLock<Arc<Registry>> = LazyLock::new(|| {
    let registry = Registry::global();
    hop::register(&registry);
    registry
});

struct Example {
    next: HttpNextHop,
}

#[tonic::async_trait]
impl ExampleService for Example {
    async fn deadline(
        &self,
        request: Request<DeadlineRequest>,
    ) -> Result<Response<DeadlineResponse>, Status> {
        let ctx = grpc::context(&request)?;
        let req = request.into_inner();
        let resp = hops::deadline(&self.next, ctx, req.todo, req.timeout).await?;
        Ok(Response::new(resp))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    init_logger(&LoggerConfig::from_env()?)?;
    let cfg = DemoConfig::from_env()?;
    REGISTRY.apply(&cfg.propagation)?;

    // 2) Outgoing HTTP client
    let service = Example {
        next: HttpNextHop::new(REGISTRY.clone(), cfg.http_url()),
    };

    // 3) Server with the harvesting middleware
    let addr = tokio::net::lookup_host(cfg.grpc_addr())
        .await?
        .next()
        .with_context(|| format!("resolve {}", cfg.grpc_addr()))?;
    info!("grpc service running on {addr}");

    Server::builder()
        .layer(HarvestLayer::grpc(REGISTRY.clone()))
        .add_service(ExampleServiceServer::new(service))
        .serve_with_shutdown(addr, shutdown_signal())
        .await?;
    info!("shutting down");
    Ok(())
}
