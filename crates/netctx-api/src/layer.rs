use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use netctx_core::{Registry, RequestContext, Transport};
use tower::{Layer, Service};
use tracing::trace;

use crate::{
    error::CallError,
    headers::{HeaderExtractor, HeaderInjector},
};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Server middleware rebuilding the request context from incoming headers.
///
/// The harvested [`RequestContext`] is stored in the request extensions, where the axum
/// [`Propagated`](crate::http::Propagated) extractor and tonic's `Request::extensions` find it.
/// A context already present in the extensions is used as the incoming context. The deadline
/// scope is released once the inner service has produced its response.
#[derive(Debug, Clone)]
pub struct HarvestLayer {
    registry: Arc<Registry>,
    transport: Transport,
}

impl HarvestLayer {
    pub fn new(registry: Arc<Registry>, transport: Transport) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Read HTTP headers with the HTTP prefix.
    pub fn http(registry: Arc<Registry>) -> Self {
        Self::new(registry, Transport::Http)
    }

    /// Read gRPC metadata with the metadata prefix.
    pub fn grpc(registry: Arc<Registry>) -> Self {
        Self::new(registry, Transport::Metadata)
    }
}

impl<S> Layer<S> for HarvestLayer {
    type Service = HarvestService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HarvestService {
            inner,
            registry: self.registry.clone(),
            transport: self.transport,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestService<S> {
    inner: S,
    registry: Arc<Registry>,
    transport: Transport,
}

impl<S, B> Service<http::Request<B>> for HarvestService<S>
where
    S: Service<http::Request<B>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let incoming = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default();

        let (ctx, scope) = self
            .registry
            .harvester(self.transport)
            .harvest(&HeaderExtractor(req.headers()), &incoming)
            .into_parts();
        trace!(
            path = %req.uri().path(),
            values = ctx.values().len(),
            deadline = ?ctx.remaining(),
            "request context harvested"
        );

        req.extensions_mut().insert(ctx);
        let fut = self.inner.call(req);
        Box::pin(async move {
            let res = fut.await;
            drop(scope);
            res
        })
    }
}

/// Client middleware writing the request context into outgoing headers.
///
/// The context is taken from the request extensions; requests without one pass through
/// untouched. The call is raced against the context: expiry yields
/// [`CallError::DeadlineExceeded`], cancellation [`CallError::Canceled`] and failures of the
/// inner service [`CallError::Transport`].
#[derive(Debug, Clone)]
pub struct PropagateLayer {
    registry: Arc<Registry>,
    transport: Transport,
}

impl PropagateLayer {
    pub fn new(registry: Arc<Registry>, transport: Transport) -> Self {
        Self {
            registry,
            transport,
        }
    }

    pub fn http(registry: Arc<Registry>) -> Self {
        Self::new(registry, Transport::Http)
    }

    pub fn grpc(registry: Arc<Registry>) -> Self {
        Self::new(registry, Transport::Metadata)
    }
}

impl<S> Layer<S> for PropagateLayer {
    type Service = PropagateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PropagateService {
            inner,
            registry: self.registry.clone(),
            transport: self.transport,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropagateService<S> {
    inner: S,
    registry: Arc<Registry>,
    transport: Transport,
}

impl<S, B> Service<http::Request<B>> for PropagateService<S>
where
    S: Service<http::Request<B>>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = CallError<S::Error>;
    type Future = BoxFuture<Result<S::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(CallError::Transport)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let Some(ctx) = req.extensions().get::<RequestContext>().cloned() else {
            let fut = self.inner.call(req);
            return Box::pin(async move { fut.await.map_err(CallError::Transport) });
        };

        let written = self
            .registry
            .propagator(self.transport)
            .propagate_into(&ctx, &mut HeaderInjector(req.headers_mut()));
        trace!(uri = %req.uri(), written, "request context propagated");

        let fut = self.inner.call(req);
        Box::pin(async move {
            match ctx.run(fut).await {
                Ok(res) => res.map_err(CallError::Transport),
                Err(err) => Err(err.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{convert::Infallible, time::Duration};

    use netctx_core::Key;
    use tower::{ServiceBuilder, ServiceExt, service_fn};

    fn registry(hop: &Key<i32>) -> Arc<Registry> {
        let reg = Arc::new(Registry::new());
        reg.int32(hop, "hop");
        reg
    }

    #[tokio::test]
    async fn harvest_exposes_context_to_inner_service() {
        let hop: Key<i32> = Key::new();
        let svc = ServiceBuilder::new()
            .layer(HarvestLayer::http(registry(&hop)))
            .service(service_fn(move |req: http::Request<()>| async move {
                let ctx = req.extensions().get::<RequestContext>().cloned();
                Ok::<_, Infallible>(ctx.and_then(|c| c.value(&hop).copied()))
            }));

        let req = http::Request::builder()
            .header("X-Go-Context-hop", "4")
            .body(())
            .unwrap();
        assert_eq!(svc.oneshot(req).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn harvest_scope_lives_until_response() {
        let svc = ServiceBuilder::new()
            .layer(HarvestLayer::http(Arc::new(Registry::new())))
            .service(service_fn(|req: http::Request<()>| async move {
                let ctx = req.extensions().get::<RequestContext>().cloned().unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, Infallible>(ctx)
            }));

        let deadline = netctx_core::wall_from_instant(
            tokio::time::Instant::now() + Duration::from_secs(30),
        );
        let value = netctx_core::TimeFormat::Rfc3339.format(deadline).unwrap();
        let req = http::Request::builder()
            .header("X-Go-Context-Deadline", value)
            .body(())
            .unwrap();

        let ctx = svc.oneshot(req).await.unwrap();
        assert!(ctx.deadline().is_some());
        assert_eq!(ctx.err(), Some(netctx_core::ContextError::Canceled));
    }

    #[tokio::test]
    async fn propagate_writes_headers_from_extensions() {
        let hop: Key<i32> = Key::new();
        let svc = ServiceBuilder::new()
            .layer(PropagateLayer::http(registry(&hop)))
            .service(service_fn(|req: http::Request<()>| async move {
                Ok::<_, Infallible>(req.headers().clone())
            }));

        let mut req = http::Request::new(());
        req.extensions_mut()
            .insert(RequestContext::background().with_value(&hop, 7));

        let headers = svc.oneshot(req).await.unwrap();
        assert_eq!(headers.get("x-go-context-hop").unwrap(), "7");
    }

    #[tokio::test]
    async fn propagate_without_context_passes_through() {
        let svc = ServiceBuilder::new()
            .layer(PropagateLayer::http(Arc::new(Registry::new())))
            .service(service_fn(|req: http::Request<()>| async move {
                Ok::<_, Infallible>(req.headers().len())
            }));

        assert_eq!(svc.oneshot(http::Request::new(())).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn propagate_reports_deadline_exceeded() {
        let svc = ServiceBuilder::new()
            .layer(PropagateLayer::http(Arc::new(Registry::new())))
            .service(service_fn(|_req: http::Request<()>| async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok::<_, Infallible>(())
            }));

        let (ctx, _guard) = RequestContext::background().with_timeout(Duration::from_secs(2));
        let mut req = http::Request::new(());
        req.extensions_mut().insert(ctx);

        let err = svc.oneshot(req).await.unwrap_err();
        assert!(err.is_deadline_exceeded(), "{err:?}");
    }

    #[tokio::test]
    async fn propagate_reports_canceled() {
        let svc = ServiceBuilder::new()
            .layer(PropagateLayer::http(Arc::new(Registry::new())))
            .service(service_fn(|_req: http::Request<()>| async move {
                Ok::<_, Infallible>(())
            }));

        let (ctx, guard) = RequestContext::background().with_cancel();
        guard.release();
        let mut req = http::Request::new(());
        req.extensions_mut().insert(ctx);

        let err = svc.oneshot(req).await.unwrap_err();
        assert!(matches!(err, CallError::Canceled));
    }
}
