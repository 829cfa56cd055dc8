//! Outbound path: request context to wire fields.
use std::sync::Arc;

use tracing::{instrument, trace, warn};

use crate::{
    context::RequestContext,
    registry::{DEADLINE_NAME, Snapshot, Transport},
    wire::{Injector, WireField},
};

/// Renders the registered values of a context into fields for one transport.
///
/// Bound to the registry snapshot taken at construction. Has no side effects besides
/// writing into the carrier it is given.
#[derive(Debug, Clone)]
pub struct Propagator {
    snapshot: Arc<Snapshot>,
    transport: Transport,
}

impl Propagator {
    pub fn new(snapshot: Arc<Snapshot>, transport: Transport) -> Self {
        Self {
            snapshot,
            transport,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Every field `ctx` should carry: registered values in registration order, then the deadline.
    pub fn propagate(&self, ctx: &RequestContext) -> Vec<WireField> {
        let mut out = Vec::new();
        self.propagate_into(ctx, &mut out);
        out
    }

    /// Append the fields of `ctx` to `carrier`. Returns how many were written.
    #[instrument(level = "trace", skip_all, fields(transport = ?self.transport))]
    pub fn propagate_into<I>(&self, ctx: &RequestContext, carrier: &mut I) -> usize
    where
        I: Injector + ?Sized,
    {
        let snap = &*self.snapshot;
        let mut written = 0;

        for entry in snap.entries() {
            let Some(value) = ctx.values().get_any(entry.key()) else {
                continue;
            };
            match entry.render_value(value, snap.wire()) {
                Ok(text) => {
                    carrier.inject(&snap.field_name(self.transport, entry.name()), text);
                    written += 1;
                }
                Err(e) => warn!(target: "netctx", error = %e, "field not propagated"),
            }
        }

        if snap.deadline_enabled()
            && let Some(at) = ctx.wall_deadline()
        {
            match snap.wire().time.format(at) {
                Ok(text) => {
                    carrier.inject(&snap.field_name(self.transport, DEADLINE_NAME), text);
                    written += 1;
                }
                Err(e) => warn!(target: "netctx", error = %e, "deadline not propagated"),
            }
        }

        trace!(written, "fields propagated");
        written
    }
}
