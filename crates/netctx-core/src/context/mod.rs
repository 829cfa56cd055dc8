//! Request-scoped state threaded through handlers and outgoing calls.
mod deadline;
use deadline::Cause;
pub use deadline::{ScopeGuard, instant_from_wall, wall_from_instant};

mod values;
pub use values::ValueSet;

use std::{future::Future, sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{entry::EntryValue, error::ContextError, key::Key};

/// Per-request context: propagated values plus a cancellation scope with an optional deadline.
///
/// Derived contexts never change their parent: [`RequestContext::with_value`] returns a new
/// context, and scopes made by [`RequestContext::with_deadline`] are children of the parent's
/// cancellation token, so cancelling the parent cancels them too.
///
/// Once done, a context keeps reporting the first cause it ended with.
#[derive(Clone, Debug)]
pub struct RequestContext {
    values: ValueSet,
    token: CancellationToken,
    cause: Arc<Cause>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Root context: no values, no deadline, never cancelled unless through a child guard.
    pub fn background() -> Self {
        Self {
            values: ValueSet::new(),
            token: CancellationToken::new(),
            cause: Cause::root(),
            deadline: None,
        }
    }

    /// Value stored under `key`, if any.
    pub fn value<T: 'static>(&self, key: &Key<T>) -> Option<&T> {
        self.values.get(key)
    }

    pub fn values(&self) -> &ValueSet {
        &self.values
    }

    /// Context carrying `value` under `key`; `self` is left unchanged.
    pub fn with_value<T: EntryValue>(&self, key: &Key<T>, value: T) -> Self {
        let mut values = self.values.clone();
        values.insert(key, value);
        self.with_values(values)
    }

    /// Same scope, different value set.
    pub fn with_values(&self, values: ValueSet) -> Self {
        Self {
            values,
            token: self.token.clone(),
            cause: self.cause.clone(),
            deadline: self.deadline,
        }
    }

    /// Effective deadline of this context, if any.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Deadline expressed as wall-clock time, for sending over the wire.
    pub fn wall_deadline(&self) -> Option<OffsetDateTime> {
        self.deadline.map(wall_from_instant)
    }

    /// Time left before the deadline; zero once it passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Derive a scope that expires at `at`, or at the parent's deadline if that is sooner.
    pub fn with_deadline(&self, at: Instant) -> (Self, ScopeGuard) {
        let deadline = match self.deadline {
            Some(outer) if outer <= at => outer,
            _ => at,
        };
        let token = self.token.child_token();
        let cause = self.cause.child();
        deadline::arm_timer(token.clone(), cause.clone(), deadline);

        let ctx = Self {
            values: self.values.clone(),
            token: token.clone(),
            cause: cause.clone(),
            deadline: Some(deadline),
        };
        (ctx, ScopeGuard::new(token, cause))
    }

    /// Derive a scope that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, ScopeGuard) {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30));
        self.with_deadline(at)
    }

    /// Derive a scope that is cancelled when the guard is released.
    pub fn with_cancel(&self) -> (Self, ScopeGuard) {
        let token = self.token.child_token();
        let cause = self.cause.child();
        let ctx = Self {
            values: self.values.clone(),
            token: token.clone(),
            cause: cause.clone(),
            deadline: self.deadline,
        };
        (ctx, ScopeGuard::new(token, cause))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the context is done, or `None` while it is still live.
    ///
    /// The first cause sticks: a scope released before its deadline stays
    /// [`ContextError::Canceled`] after the deadline passes, and an expired scope stays
    /// [`ContextError::DeadlineExceeded`] after its guard is dropped.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(err) = self.cause.recorded() {
            return Some(err);
        }
        if self.deadline_passed() {
            return Some(self.cause.record(ContextError::DeadlineExceeded));
        }
        if self.token.is_cancelled() {
            return Some(self.cause.record(ContextError::Canceled));
        }
        None
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(at) => tokio::select! {
                _ = self.token.cancelled() => {}
                _ = tokio::time::sleep_until(at) => {}
            },
            None => self.token.cancelled().await,
        }
        self.err().unwrap_or(ContextError::Canceled)
    }

    /// Drive `fut` until it completes or the context is done, whichever comes first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
