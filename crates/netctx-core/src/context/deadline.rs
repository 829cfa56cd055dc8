//! Bridging between wire timestamps and local monotonic deadlines.
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use time::OffsetDateTime;
use tokio::{runtime::Handle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ContextError;

/// Cap for deadlines too far away to be represented as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Convert an absolute wall-clock time into a local monotonic instant.
///
/// Times already in the past map to "now", so the derived scope expires immediately.
pub fn instant_from_wall(at: OffsetDateTime) -> Instant {
    let now = Instant::now();
    let ahead = at - OffsetDateTime::now_utc();
    if !ahead.is_positive() {
        return now;
    }
    let ahead = Duration::try_from(ahead).unwrap_or(FAR_FUTURE);
    now.checked_add(ahead)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Convert a local monotonic instant into the wall-clock time it corresponds to now.
pub fn wall_from_instant(at: Instant) -> OffsetDateTime {
    let now = Instant::now();
    let wall = OffsetDateTime::now_utc();
    if at >= now {
        let ahead = time::Duration::try_from(at - now).unwrap_or(time::Duration::MAX);
        wall.saturating_add(ahead)
    } else {
        let behind = time::Duration::try_from(now - at).unwrap_or(time::Duration::MAX);
        wall.saturating_sub(behind)
    }
}

/// First reason a scope became done, shared by every context of that scope.
///
/// Set once by whatever ends the scope and never overwritten: a released scope keeps
/// reporting [`ContextError::Canceled`] after its old deadline passes.
#[derive(Debug, Default)]
pub(crate) struct Cause {
    first: OnceLock<ContextError>,
    parent: Option<Arc<Cause>>,
}

impl Cause {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            first: OnceLock::new(),
            parent: Some(Arc::clone(self)),
        })
    }

    /// Record `err` unless a cause is already set; returns the cause that stuck.
    pub(crate) fn record(&self, err: ContextError) -> ContextError {
        *self.first.get_or_init(|| err)
    }

    /// Cause of the nearest scope, this one first, that has ended.
    pub(crate) fn recorded(&self) -> Option<ContextError> {
        let mut scope = Some(self);
        while let Some(cause) = scope {
            if let Some(err) = cause.first.get() {
                return Some(*err);
            }
            scope = cause.parent.as_deref();
        }
        None
    }
}

/// Spawn the runtime task that cancels `token` once `at` passes.
///
/// This is the one task the core spawns: a single `select!` per deadline scope that
/// exits as soon as the scope is released, so holders of
/// [`crate::RequestContext::cancellation_token`] observe expiry too. Without a tokio
/// runtime no timer is armed; expiry is still observed through
/// [`crate::RequestContext::err`] and [`crate::RequestContext::done`].
pub(crate) fn arm_timer(token: CancellationToken, cause: Arc<Cause>, at: Instant) {
    let Ok(handle) = Handle::try_current() else {
        trace!("no runtime, deadline timer not armed");
        return;
    };
    handle.spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep_until(at) => {
                cause.record(ContextError::DeadlineExceeded);
                token.cancel();
            }
        }
    });
}

/// Release handle of a derived cancellation scope.
///
/// Dropping the guard (or calling [`ScopeGuard::release`]) cancels the scope and
/// stops its timer. Holders must keep it alive until the request is finished.
#[must_use = "dropping the guard releases the scope immediately"]
pub struct ScopeGuard {
    token: CancellationToken,
    cause: Arc<Cause>,
}

impl ScopeGuard {
    pub(crate) fn new(token: CancellationToken, cause: Arc<Cause>) -> Self {
        Self { token, cause }
    }

    /// Release the scope now.
    pub fn release(self) {}
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        // A scope already ended by its parent or its timer keeps that cause.
        if !self.token.is_cancelled() {
            self.cause.record(ContextError::Canceled);
        }
        self.token.cancel();
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScopeGuard")
    }
}
