use crate::FatalError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Cloning shares the flag; once cancelled it stays
/// cancelled.
///
/// A token made with [`CancelToken::child`] is cancelled along with its
/// parent, but cancelling the child leaves the parent alone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_deref()
                .is_some_and(CancelToken::is_cancelled)
    }
}

/// What a resolver needs to know about the run it belongs to: whether it has
/// been cancelled and how long it may still take.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl ResolveContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails when the run was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), FatalError> {
        if self.cancel.is_cancelled() {
            return Err(FatalError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(FatalError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Time budget for one operation: `cap`, shortened to what is left of the
    /// deadline.
    pub fn budget(&self, cap: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => cap.min(deadline.saturating_duration_since(Instant::now())),
            None => cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let ctx = ResolveContext::new(token.clone());
        assert!(ctx.check().is_ok());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(FatalError::Cancelled)));
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child().child();
        assert!(!other.is_cancelled());
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn past_deadline_fails_check() {
        let ctx = ResolveContext::default().with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(FatalError::DeadlineExceeded)));
    }

    #[test]
    fn budget_is_capped_by_deadline() {
        let cap = Duration::from_secs(300);
        assert_eq!(ResolveContext::default().budget(cap), cap);

        let ctx = ResolveContext::default().with_timeout(Duration::from_secs(2));
        let budget = ctx.budget(cap);
        assert!(budget <= Duration::from_secs(2));
        assert!(budget > Duration::from_secs(1));
    }
}
