//! gRPC adapters for tonic.
//!
//! Server side, install [`HarvestLayer::grpc`](crate::HarvestLayer::grpc) on the tonic
//! `Server` and read the context with [`context`]. Client side, build requests with
//! [`request`], wrap the client with [`ContextInterceptor`] and await the call through
//! [`call`] so that the local deadline bounds it.
use std::{future::Future, sync::Arc};

use netctx_core::{
    ContextError, Extractor, Injector, Registry, RequestContext, ScopeGuard, Transport,
};
use tonic::{
    Request, Status,
    metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap},
    service::Interceptor,
};
use tracing::{trace, warn};

use crate::error::{ApiError, CallError};

/// Writes propagated fields into tonic metadata.
pub struct MetadataInjector<'a>(pub &'a mut MetadataMap);

impl Injector for MetadataInjector<'_> {
    fn inject(&mut self, name: &str, value: String) {
        let key = match AsciiMetadataKey::from_bytes(name.as_bytes()) {
            Ok(key) => key,
            Err(e) => {
                warn!(target: "netctx", field = name, error = %e, "invalid metadata key, field dropped");
                return;
            }
        };
        match AsciiMetadataValue::try_from(value) {
            Ok(value) => {
                self.0.append(key, value);
            }
            Err(e) => {
                warn!(target: "netctx", field = name, error = %e, "invalid metadata value, field dropped")
            }
        }
    }
}

/// Reads propagated fields from tonic metadata. Binary and non-ASCII values are treated as absent.
pub struct MetadataExtractor<'a>(pub &'a MetadataMap);

impl Extractor for MetadataExtractor<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Write the fields of `ctx` into `metadata`. Returns how many were written.
pub fn inject_metadata(
    registry: &Registry,
    ctx: &RequestContext,
    metadata: &mut MetadataMap,
) -> usize {
    registry
        .propagator(Transport::Metadata)
        .propagate_into(ctx, &mut MetadataInjector(metadata))
}

/// Registered values found in `metadata`, layered over `ctx`. The deadline is ignored.
pub fn extract_metadata(
    registry: &Registry,
    metadata: &MetadataMap,
    ctx: &RequestContext,
) -> RequestContext {
    registry
        .harvester(Transport::Metadata)
        .extract(&MetadataExtractor(metadata), ctx)
}

/// Only the propagated deadline, as a scope derived from `ctx`.
pub fn copy_deadline(
    registry: &Registry,
    metadata: &MetadataMap,
    ctx: &RequestContext,
) -> (RequestContext, Option<ScopeGuard>) {
    registry
        .harvester(Transport::Metadata)
        .copy_deadline(&MetadataExtractor(metadata), ctx)
}

/// Wrap `message` in a request carrying `ctx` for [`ContextInterceptor`].
pub fn request<T>(message: T, ctx: &RequestContext) -> Request<T> {
    let mut req = Request::new(message);
    req.extensions_mut().insert(ctx.clone());
    req
}

/// Request context of an incoming call, as stored by the harvest layer.
pub fn context<T>(req: &Request<T>) -> Result<RequestContext, Status> {
    req.extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(|| ApiError::MissingContext.into())
}

/// Await a client call, giving up when `ctx` is cancelled or its deadline passes.
pub async fn call<T, F>(ctx: &RequestContext, fut: F) -> Result<T, Status>
where
    F: Future<Output = Result<T, Status>>,
{
    ctx.run(fut).await.map_err(context_status)?
}

/// Status reported for a context failure.
pub fn context_status(err: ContextError) -> Status {
    match err {
        ContextError::Canceled => Status::cancelled(err.to_string()),
        ContextError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
    }
}

impl From<ApiError> for Status {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::MissingContext => Status::internal(err.to_string()),
            ApiError::Context(e) => context_status(e),
        }
    }
}

impl From<CallError<Status>> for Status {
    fn from(err: CallError<Status>) -> Self {
        match err {
            CallError::Transport(status) => status,
            other => match other.context() {
                Some(e) => context_status(e),
                None => Status::unknown(other.to_string()),
            },
        }
    }
}

/// Client interceptor writing the request context into outgoing metadata.
///
/// The context comes from the request extensions (see [`request`]). Calls made under a
/// context that is already done are refused locally.
#[derive(Debug, Clone)]
pub struct ContextInterceptor {
    registry: Arc<Registry>,
}

impl ContextInterceptor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Interceptor for ContextInterceptor {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        let Some(ctx) = req.extensions().get::<RequestContext>().cloned() else {
            return Ok(req);
        };
        if let Some(err) = ctx.err() {
            return Err(context_status(err));
        }
        let written = inject_metadata(&self.registry, &ctx, req.metadata_mut());
        trace!(written, "request context propagated");
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netctx_core::Key;
    use std::time::Duration;
    use tonic::Code;

    fn registry(hop: &Key<i32>) -> Arc<Registry> {
        let reg = Arc::new(Registry::new());
        reg.int32(hop, "hop");
        reg
    }

    #[tokio::test]
    async fn interceptor_writes_metadata() {
        let hop: Key<i32> = Key::new();
        let reg = registry(&hop);
        let (ctx, _guard) = RequestContext::background()
            .with_value(&hop, 2)
            .with_timeout(Duration::from_secs(5));

        let req = ContextInterceptor::new(reg.clone())
            .call(request((), &ctx))
            .unwrap();

        let md = req.metadata();
        assert_eq!(md.get("x-go-context-hop").unwrap(), "2");
        assert!(md.get("x-go-context-deadline").is_some());

        let back = extract_metadata(&reg, md, &RequestContext::background());
        assert_eq!(back.value(&hop), Some(&2));

        let (derived, scope) = copy_deadline(&reg, md, &RequestContext::background());
        assert!(scope.is_some());
        assert!(derived.remaining().unwrap() <= Duration::from_secs(5));
    }

    #[test]
    fn interceptor_refuses_done_context() {
        let reg = Arc::new(Registry::new());
        let (ctx, guard) = RequestContext::background().with_cancel();
        drop(guard);

        let status = ContextInterceptor::new(reg).call(request((), &ctx)).unwrap_err();
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[test]
    fn interceptor_passes_requests_without_context() {
        let reg = Arc::new(Registry::new());
        let req = ContextInterceptor::new(reg).call(Request::new(())).unwrap();
        assert!(req.metadata().is_empty());
    }

    #[test]
    fn metadata_prefix_is_used() {
        let hop: Key<i32> = Key::new();
        let reg = registry(&hop);
        reg.set_metadata_prefix("ctx-").unwrap();

        let mut md = MetadataMap::new();
        inject_metadata(&reg, &RequestContext::background().with_value(&hop, 1), &mut md);
        assert_eq!(md.get("ctx-hop").unwrap(), "1");
    }

    #[tokio::test(start_paused = true)]
    async fn call_maps_deadline_to_status() {
        let (ctx, _guard) = RequestContext::background().with_timeout(Duration::from_secs(2));
        let res: Result<(), Status> = call(&ctx, async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(())
        })
        .await;
        assert_eq!(res.unwrap_err().code(), Code::DeadlineExceeded);

        let ok = call(&ctx, async { Ok::<_, Status>(5) }).await;
        assert_eq!(ok.unwrap_err().code(), Code::DeadlineExceeded);
    }

    #[test]
    fn missing_context_is_internal() {
        let status = context(&Request::new(())).unwrap_err();
        assert_eq!(status.code(), Code::Internal);
    }
}
