//! HTTP adapters: header helpers, the axum extractor and a propagating hyper client.
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode, request::Parts};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{Client as LegacyClient, Error as LegacyError, connect::HttpConnector},
    rt::TokioExecutor,
};
use netctx_core::{Harvest, Registry, RequestContext, ScopeGuard, Transport};
use tower::{Layer, ServiceExt};

use crate::{
    error::{ApiError, CallError},
    headers::{HeaderExtractor, HeaderInjector},
    layer::{PropagateLayer, PropagateService},
};

/// Write the fields of `ctx` into `headers`. Returns how many were written.
pub fn inject(registry: &Registry, ctx: &RequestContext, headers: &mut HeaderMap) -> usize {
    registry
        .propagator(Transport::Http)
        .propagate_into(ctx, &mut HeaderInjector(headers))
}

/// Registered values found in `headers`, layered over `ctx`. The deadline is ignored.
pub fn extract(registry: &Registry, headers: &HeaderMap, ctx: &RequestContext) -> RequestContext {
    registry
        .harvester(Transport::Http)
        .extract(&HeaderExtractor(headers), ctx)
}

/// Only the propagated deadline, as a scope derived from `ctx`.
pub fn copy_deadline(
    registry: &Registry,
    headers: &HeaderMap,
    ctx: &RequestContext,
) -> (RequestContext, Option<ScopeGuard>) {
    registry
        .harvester(Transport::Http)
        .copy_deadline(&HeaderExtractor(headers), ctx)
}

/// Values and deadline.
pub fn extract_with_deadline(
    registry: &Registry,
    headers: &HeaderMap,
    ctx: &RequestContext,
) -> Harvest {
    registry
        .harvester(Transport::Http)
        .harvest(&HeaderExtractor(headers), ctx)
}

/// Request context placed in the extensions by [`HarvestLayer`](crate::HarvestLayer).
///
/// ```no_run
/// use netctx_api::http::Propagated;
///
/// async fn handler(Propagated(ctx): Propagated) -> String {
///     format!("{:?}", ctx.remaining())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Propagated(pub RequestContext);

impl<S> FromRequestParts<S> for Propagated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Propagated)
            .ok_or(ApiError::MissingContext)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingContext => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Context(e) if e.is_deadline_exceeded() => StatusCode::REQUEST_TIMEOUT,
            ApiError::Context(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

/// HTTP/1 client that propagates the request context of every call.
#[derive(Clone)]
pub struct Client {
    inner: PropagateService<LegacyClient<HttpConnector, Full<Bytes>>>,
}

impl Client {
    pub fn new(registry: Arc<Registry>) -> Self {
        let client = LegacyClient::builder(TokioExecutor::new()).build_http();
        Self {
            inner: PropagateLayer::http(registry).layer(client),
        }
    }

    /// Send `req` under `ctx`.
    pub async fn send(
        &self,
        ctx: &RequestContext,
        mut req: Request<Full<Bytes>>,
    ) -> Result<http::Response<Incoming>, CallError<LegacyError>> {
        req.extensions_mut().insert(ctx.clone());
        self.inner.clone().oneshot(req).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Client")
    }
}
