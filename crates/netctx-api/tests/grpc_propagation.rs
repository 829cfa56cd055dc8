use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use http::uri::PathAndQuery;
use netctx_api::{
    HarvestLayer,
    grpc::{self, ContextInterceptor},
};
use netctx_core::{Key, Registry, RequestContext};
use tonic::{
    Code, Status,
    codec::ProstCodec,
    codegen::{Body, BoxFuture, Service, StdError},
    server::{NamedService, UnaryService},
    service::interceptor::InterceptedService,
    transport::{Channel, Endpoint, Server, server::TcpIncoming},
};

/// Request and reply of the test service: the caller sets `sleep_ms`, the callee answers
/// with what it harvested.
#[derive(Clone, PartialEq, prost::Message)]
struct Echo {
    #[prost(int32, optional, tag = "1")]
    hop: Option<i32>,
    #[prost(uint64, optional, tag = "2")]
    remaining_ms: Option<u64>,
    #[prost(uint64, tag = "3")]
    sleep_ms: u64,
}

const PATH: &str = "/netctx.test.EchoService/Echo";

struct EchoMethod {
    hop: Key<i32>,
}

impl UnaryService<Echo> for EchoMethod {
    type Response = Echo;
    type Future = BoxFuture<tonic::Response<Echo>, Status>;

    fn call(&mut self, request: tonic::Request<Echo>) -> Self::Future {
        let hop = self.hop;
        Box::pin(async move {
            let ctx = grpc::context(&request)?;
            let sleep = request.get_ref().sleep_ms;
            if sleep > 0 {
                tokio::time::sleep(Duration::from_millis(sleep)).await;
            }
            Ok(tonic::Response::new(Echo {
                hop: ctx.value(&hop).copied(),
                remaining_ms: ctx.remaining().map(|d| d.as_millis() as u64),
                sleep_ms: 0,
            }))
        })
    }
}

#[derive(Clone)]
struct EchoService {
    hop: Key<i32>,
}

impl NamedService for EchoService {
    const NAME: &'static str = "netctx.test.EchoService";
}

impl<B> Service<http::Request<B>> for EchoService
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let method = EchoMethod { hop: self.hop };
        Box::pin(async move {
            let mut grpc = tonic::server::Grpc::new(ProstCodec::default());
            Ok(grpc.unary(method, req).await)
        })
    }
}

fn registry(hop: Key<i32>) -> Arc<Registry> {
    let reg = Arc::new(Registry::new());
    reg.int32(&hop, "hop");
    reg
}

async fn serve(reg: Arc<Registry>, hop: Key<i32>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = TcpIncoming::from_listener(listener, true, None).unwrap();

    tokio::spawn(async move {
        Server::builder()
            .layer(HarvestLayer::grpc(reg))
            .add_service(EchoService { hop })
            .serve_with_incoming(incoming)
            .await
            .unwrap();
    });
    addr
}

type Client = tonic::client::Grpc<InterceptedService<Channel, ContextInterceptor>>;

async fn client(reg: Arc<Registry>, addr: SocketAddr) -> Client {
    let channel = Endpoint::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    tonic::client::Grpc::new(InterceptedService::new(
        channel,
        ContextInterceptor::new(reg),
    ))
}

async fn echo(client: &mut Client, ctx: &RequestContext, sleep_ms: u64) -> Result<Echo, Status> {
    client.ready().await.unwrap();
    let req = grpc::request(
        Echo {
            sleep_ms,
            ..Default::default()
        },
        ctx,
    );
    let path = PathAndQuery::from_static(PATH);
    let res = grpc::call(ctx, client.unary(req, path, ProstCodec::default())).await?;
    Ok(res.into_inner())
}

#[tokio::test]
async fn values_and_deadline_cross_one_hop() {
    let hop: Key<i32> = Key::new();
    let reg = registry(hop);
    let addr = serve(reg.clone(), hop).await;
    let mut client = client(reg, addr).await;

    let (ctx, _guard) = RequestContext::background()
        .with_value(&hop, 3)
        .with_timeout(Duration::from_secs(2));

    let reply = echo(&mut client, &ctx, 0).await.unwrap();
    assert_eq!(reply.hop, Some(3));
    let remaining = reply.remaining_ms.unwrap();
    assert!(remaining > 1_000 && remaining <= 2_000, "remaining {remaining} ms");
}

#[tokio::test]
async fn call_without_values_sees_nothing() {
    let hop: Key<i32> = Key::new();
    let reg = registry(hop);
    let addr = serve(reg.clone(), hop).await;
    let mut client = client(reg, addr).await;

    let reply = echo(&mut client, &RequestContext::background(), 0)
        .await
        .unwrap();
    assert_eq!(reply.hop, None);
    assert_eq!(reply.remaining_ms, None);
}

#[tokio::test]
async fn slow_callee_yields_deadline_exceeded() {
    let hop: Key<i32> = Key::new();
    let reg = registry(hop);
    let addr = serve(reg.clone(), hop).await;
    let mut client = client(reg, addr).await;

    let (ctx, _guard) = RequestContext::background().with_timeout(Duration::from_secs(1));
    let status = echo(&mut client, &ctx, 3_000).await.unwrap_err();

    assert_eq!(status.code(), Code::DeadlineExceeded, "{status:?}");
}

#[tokio::test]
async fn done_context_is_refused_before_sending() {
    let hop: Key<i32> = Key::new();
    let reg = registry(hop);
    let addr = serve(reg.clone(), hop).await;
    let mut client = client(reg, addr).await;

    let (ctx, guard) = RequestContext::background().with_cancel();
    guard.release();

    let status = echo(&mut client, &ctx, 0).await.unwrap_err();
    assert_eq!(status.code(), Code::Cancelled, "{status:?}");
}
