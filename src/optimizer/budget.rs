//! Cooperative cancellation and search budgets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag a running search polls between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// The underlying flag, for runners that poll an `AtomicBool`.
    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Wall-clock deadline plus cancellation for one search.
///
/// # Examples
///
/// ```
/// use u_dispatch::optimizer::{Budget, CancelToken};
///
/// let token = CancelToken::new();
/// let budget = Budget::unlimited().with_cancel(token.clone());
/// assert!(!budget.exhausted());
/// token.cancel();
/// assert!(budget.exhausted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Budget {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Deadline `limit` from now.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.deadline = Some(Instant::now() + limit);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` when unlimited.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.flag()
    }

    /// Cancelled or past the deadline.
    pub fn exhausted(&self) -> bool {
        self.is_cancelled() || self.timed_out()
    }

    /// A budget that shares this one's cancellation but ends no later than
    /// `limit` from now.
    pub fn narrowed(&self, limit: Duration) -> Self {
        let candidate = Instant::now() + limit;
        Self {
            deadline: Some(self.deadline.map_or(candidate, |d| d.min(candidate))),
            cancel: self.cancel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_zero_time_limit_is_exhausted() {
        let budget = Budget::unlimited().with_time_limit(Duration::ZERO);
        assert!(budget.timed_out());
        assert!(!budget.is_cancelled());
    }

    #[test]
    fn test_narrowed_keeps_earlier_deadline() {
        let outer = Budget::unlimited().with_time_limit(Duration::ZERO);
        let inner = outer.narrowed(Duration::from_secs(60));
        assert!(inner.timed_out());

        let open = Budget::unlimited().narrowed(Duration::from_secs(60));
        assert!(!open.exhausted());
    }

    #[test]
    fn test_remaining_and_shared_flag() {
        assert_eq!(Budget::unlimited().remaining(), None);
        let spent = Budget::unlimited().with_time_limit(Duration::ZERO);
        assert_eq!(spent.remaining(), Some(Duration::ZERO));
        let open = Budget::unlimited().with_time_limit(Duration::from_secs(60));
        assert!(open.remaining().is_some_and(|r| r > Duration::from_secs(59)));

        let token = CancelToken::new();
        let budget = Budget::unlimited().with_cancel(token.clone());
        let flag = budget.cancel_flag();
        token.cancel();
        assert!(flag.load(Ordering::Acquire));
    }
}
