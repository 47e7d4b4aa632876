//! Timing budgets and access-denial reasons.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Why a lock or arc operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessReason {
    #[default]
    None,
    /// Budget ran out while waiting.
    Timeout,
    /// Held by another thread and the budget did not allow waiting.
    Locked,
    /// Reentrancy or reader capacity exhausted.
    Semaphore,
    /// Graph is entering or leaving readonly mode.
    ReadonlyPending,
    /// Graph is readonly.
    ReadonlyGraph,
    /// Vertex no longer indexed.
    NoExist,
    /// Arcvector consistency failure.
    ArcError,
    /// A commit hook refused the transition.
    CommitFailed,
}

impl AccessReason {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Locked | Self::ReadonlyPending)
    }
}

impl std::fmt::Display for AccessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Timeout => "timeout",
            Self::Locked => "locked",
            Self::Semaphore => "semaphore limit",
            Self::ReadonlyPending => "readonly transition pending",
            Self::ReadonlyGraph => "graph is readonly",
            Self::NoExist => "vertex does not exist",
            Self::ArcError => "arcvector error",
            Self::CommitFailed => "commit failed",
        };
        f.write_str(s)
    }
}

/// Deadline carried through every blocking call.
///
/// A zero budget never blocks. The first refusal reason recorded wins
/// until [`TimingBudget::clear_reason`] is called.
#[derive(Debug, Clone)]
pub struct TimingBudget {
    start: Instant,
    deadline: Option<Instant>,
    zero: bool,
    reason: AccessReason,
}

impl TimingBudget {
    pub fn from_millis(timeout_ms: u64) -> Self {
        let start = Instant::now();
        Self {
            start,
            deadline: Some(start + Duration::from_millis(timeout_ms)),
            zero: timeout_ms == 0,
            reason: AccessReason::None,
        }
    }

    pub fn zero() -> Self {
        Self::from_millis(0)
    }

    pub fn infinite() -> Self {
        Self { start: Instant::now(), deadline: None, zero: false, reason: AccessReason::None }
    }

    /// A budget capped at `ms` that never outlives `self`.
    pub fn sub_budget(&self, ms: u64) -> Self {
        let now = Instant::now();
        let capped = now + Duration::from_millis(ms);
        let deadline = match self.deadline {
            Some(d) => d.min(capped),
            None => capped,
        };
        Self { start: now, deadline: Some(deadline), zero: self.zero, reason: AccessReason::None }
    }

    pub fn is_zero(&self) -> bool {
        self.zero
    }

    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(d) => self.zero || Instant::now() >= d,
            None => false,
        }
    }

    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn reason(&self) -> AccessReason {
        self.reason
    }

    pub fn set_reason(&mut self, reason: AccessReason) {
        if self.reason == AccessReason::None {
            self.reason = reason;
        }
    }

    pub fn clear_reason(&mut self) {
        self.reason = AccessReason::None;
    }

    /// Record the reason for giving up a wait: `Timeout` if waiting was
    /// allowed, `Locked` for a zero budget.
    pub fn set_wait_failure(&mut self) {
        self.set_reason(if self.zero { AccessReason::Locked } else { AccessReason::Timeout });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_expired() {
        let mut b = TimingBudget::zero();
        assert!(b.is_zero());
        assert!(b.is_expired());
        b.set_wait_failure();
        assert_eq!(b.reason(), AccessReason::Locked);
    }

    #[test]
    fn test_first_reason_wins() {
        let mut b = TimingBudget::from_millis(50);
        assert!(!b.is_expired());
        b.set_wait_failure();
        b.set_reason(AccessReason::NoExist);
        assert_eq!(b.reason(), AccessReason::Timeout);
        b.clear_reason();
        assert_eq!(b.reason(), AccessReason::None);
    }

    #[test]
    fn test_sub_budget_capped_by_parent() {
        let parent = TimingBudget::from_millis(5);
        let sub = parent.sub_budget(10_000);
        assert!(sub.remaining() <= Duration::from_millis(5));
        assert!(!TimingBudget::infinite().sub_budget(10).is_expired());
    }
}
