//! Next-hop clients: HTTP for the gRPC service, gRPC for the HTTP service.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use netctx_api::{
    CallError,
    grpc::{self, ContextInterceptor},
    http::Client,
};
use netctx_core::{Registry, RequestContext};
use serde::{Deserialize, Serialize};
use tonic::{
    Code, Status,
    service::interceptor::InterceptedService,
    transport::{Channel, Endpoint},
};

use crate::{
    proto::{DeadlineRequest, DeadlineResponse, example_service_client::ExampleServiceClient},
    relay::NextHop,
};

/// JSON body of a successful `/deadline` answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeadlineBody {
    pub hops: i32,
}

/// JSON body of a failed `/deadline` answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

impl From<&Status> for ErrorBody {
    fn from(status: &Status) -> Self {
        Self {
            code: status.code() as i32,
            message: status.message().to_string(),
        }
    }
}

impl From<ErrorBody> for Status {
    fn from(body: ErrorBody) -> Self {
        Status::new(Code::from_i32(body.code), body.message)
    }
}

/// Calls `GET {base}/deadline?todo=N` on the HTTP service.
#[derive(Debug, Clone)]
pub struct HttpNextHop {
    client: Client,
    base: String,
}

impl HttpNextHop {
    pub fn new(registry: Arc<Registry>, base: impl Into<String>) -> Self {
        Self {
            client: Client::new(registry),
            base: base.into(),
        }
    }
}

#[async_trait]
impl NextHop for HttpNextHop {
    async fn deadline(&self, ctx: &RequestContext, todo: i32) -> Result<DeadlineResponse, Status> {
        let req = http::Request::get(format!("{}/deadline?todo={todo}", self.base))
            .body(Full::new(Bytes::new()))
            .map_err(|e| Status::internal(e.to_string()))?;

        let res = self.client.send(ctx, req).await.map_err(call_status)?;
        let ok = res.status().is_success();
        let body = grpc::call(ctx, async {
            res.into_body()
                .collect()
                .await
                .map(|c| c.to_bytes())
                .map_err(|e| Status::internal(e.to_string()))
        })
        .await?;

        decode(ok, &body)
    }
}

fn call_status<E: std::fmt::Display>(err: CallError<E>) -> Status {
    match err {
        CallError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
        CallError::Canceled => Status::cancelled(err.to_string()),
        CallError::Transport(e) => Status::internal(e.to_string()),
    }
}

fn decode(ok: bool, body: &[u8]) -> Result<DeadlineResponse, Status> {
    if ok {
        let body: DeadlineBody = serde_json::from_slice(body)
            .map_err(|e| Status::internal(format!("bad response body: {e}")))?;
        return Ok(DeadlineResponse { hops: body.hops });
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => Err(err.into()),
        Err(_) => Err(Status::internal(String::from_utf8_lossy(body).into_owned())),
    }
}

/// Calls `ExampleService.Deadline` on the gRPC service.
#[derive(Clone)]
pub struct GrpcNextHop {
    client: ExampleServiceClient<InterceptedService<Channel, ContextInterceptor>>,
}

impl GrpcNextHop {
    /// The channel connects on first use.
    pub fn new(
        registry: Arc<Registry>,
        url: impl Into<String>,
    ) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(url.into())?.connect_lazy();
        let interceptor = ContextInterceptor::new(registry);
        Ok(Self {
            client: ExampleServiceClient::with_interceptor(channel, interceptor),
        })
    }
}

#[async_trait]
impl NextHop for GrpcNextHop {
    async fn deadline(&self, ctx: &RequestContext, todo: i32) -> Result<DeadlineResponse, Status> {
        let mut client = self.client.clone();
        let req = grpc::request(DeadlineRequest { todo, timeout: 0 }, ctx);
        let res = grpc::call(ctx, client.deadline(req)).await?;
        Ok(res.into_inner())
    }
}
