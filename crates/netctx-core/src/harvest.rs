//! Inbound path: wire fields to request context.
use std::sync::Arc;

use tracing::{instrument, trace};

use crate::{
    context::{RequestContext, ScopeGuard, instant_from_wall},
    registry::{DEADLINE_NAME, Snapshot, Transport},
    wire::Extractor,
};

/// Outcome of a full harvest.
///
/// `scope` is `None` when no deadline scope was created; in that case `context` shares the
/// incoming context's cancellation. Dropping `scope` cancels the derived context.
#[derive(Debug)]
pub struct Harvest {
    pub context: RequestContext,
    pub scope: Option<ScopeGuard>,
}

impl Harvest {
    pub fn into_parts(self) -> (RequestContext, Option<ScopeGuard>) {
        (self.context, self.scope)
    }
}

/// Rebuilds request values and the deadline from incoming fields for one transport.
///
/// Missing fields are skipped silently. A field that is present but cannot be parsed is
/// reported once through the registry logger and skipped; the request itself never fails.
#[derive(Debug, Clone)]
pub struct Harvester {
    snapshot: Arc<Snapshot>,
    transport: Transport,
}

impl Harvester {
    pub fn new(snapshot: Arc<Snapshot>, transport: Transport) -> Self {
        Self {
            snapshot,
            transport,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Values and deadline.
    pub fn harvest<E>(&self, carrier: &E, ctx: &RequestContext) -> Harvest
    where
        E: Extractor + ?Sized,
    {
        let ctx = self.extract(carrier, ctx);
        let (context, scope) = self.copy_deadline(carrier, &ctx);
        Harvest { context, scope }
    }

    /// Registered values only. Parsed values override same-key values of `ctx`.
    #[instrument(level = "trace", skip_all, fields(transport = ?self.transport))]
    pub fn extract<E>(&self, carrier: &E, ctx: &RequestContext) -> RequestContext
    where
        E: Extractor + ?Sized,
    {
        let snap = &*self.snapshot;
        let mut values = ctx.values().clone();
        let mut found = 0usize;

        for entry in snap.entries() {
            let field = snap.field_name(self.transport, entry.name());
            let Some(text) = carrier.get(&field) else {
                continue;
            };
            match entry.parse_value(text, snap.wire()) {
                Ok(value) => {
                    values.insert_any(entry.key(), value);
                    found += 1;
                }
                Err(e) => snap
                    .logger()
                    .log(format_args!("netctx: field {field}: {e}")),
            }
        }

        trace!(found, "fields harvested");
        if found == 0 {
            return ctx.clone();
        }
        ctx.with_values(values)
    }

    /// Deadline only. Returns the derived context and its guard, or `ctx` unchanged and `None`.
    #[instrument(level = "trace", skip_all, fields(transport = ?self.transport))]
    pub fn copy_deadline<E>(
        &self,
        carrier: &E,
        ctx: &RequestContext,
    ) -> (RequestContext, Option<ScopeGuard>)
    where
        E: Extractor + ?Sized,
    {
        let snap = &*self.snapshot;
        if !snap.deadline_enabled() {
            return (ctx.clone(), None);
        }

        let field = snap.field_name(self.transport, DEADLINE_NAME);
        let Some(text) = carrier.get(&field) else {
            return (ctx.clone(), None);
        };

        match snap.wire().time.parse(text) {
            Ok(at) => {
                let (derived, guard) = ctx.with_deadline(instant_from_wall(at));
                trace!(deadline = %text, remaining = ?derived.remaining(), "deadline bridged");
                (derived, Some(guard))
            }
            Err(e) => {
                snap.logger().log(format_args!("netctx: field {field}: {e}"));
                (ctx.clone(), None)
            }
        }
    }
}
