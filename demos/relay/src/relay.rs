//! The hop shared by both demo services.
use std::time::Duration;

use async_trait::async_trait;
use netctx_core::RequestContext;
use tonic::Status;

use crate::{
    errors::handle_error,
    hop::HOP,
    print::{print_done, print_hop, print_response, print_start, random_delay},
    proto::DeadlineResponse,
};

/// The other service in the relay.
#[async_trait]
pub trait NextHop: Send + Sync {
    async fn deadline(&self, ctx: &RequestContext, todo: i32) -> Result<DeadlineResponse, Status>;
}

/// Count this hop, then pass the request on until `todo` runs out or the deadline fires.
///
/// The first service in the chain (no incoming deadline) starts a `timeout` second budget.
pub async fn deadline<N>(
    next: &N,
    ctx: RequestContext,
    todo: i32,
    timeout: i32,
) -> Result<DeadlineResponse, Status>
where
    N: NextHop + ?Sized,
{
    let hops = ctx.value(&HOP).copied().unwrap_or(0);
    let ctx = ctx.with_value(&HOP, hops.saturating_add(1));

    let (ctx, _scope) = if ctx.deadline().is_none() {
        print_start(todo, timeout);
        let secs = u64::try_from(timeout).unwrap_or(0);
        let (ctx, scope) = ctx.with_timeout(Duration::from_secs(secs));
        (ctx, Some(scope))
    } else {
        (ctx, None)
    };

    if todo <= 0 {
        print_done(&ctx, hops);
        return Ok(DeadlineResponse { hops });
    }

    ctx.run(tokio::time::sleep(random_delay()))
        .await
        .map_err(|e| Status::deadline_exceeded(e.to_string()))?;

    print_hop(hops);
    match next.deadline(&ctx, todo - 1).await {
        Ok(resp) => {
            print_response(hops, &resp);
            Ok(resp)
        }
        Err(status) => Err(handle_error(status, hops)),
    }
}
