// src/dag/task.rs

//! Task definitions: identity, retry policy and the operator that runs it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::operator::Operator;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// How often and how far apart a failed task is re-attempted.
///
/// `retry_limit` counts retries, not attempts: a task with `retry_limit = 3`
/// is executed at most four times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_limit: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32, retry_delay: Duration) -> Self {
        Self {
            retry_limit,
            retry_delay,
        }
    }

    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    pub fn allows_retry_after(&self, attempts: u32) -> bool {
        attempts.saturating_sub(1) < self.retry_limit
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_LIMIT, DEFAULT_RETRY_DELAY)
    }
}

/// A unit of work in the graph.
///
/// Topology is not stored here; upstream/downstream sets come from the
/// [`Graph`](crate::dag::Graph).
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    retry: RetryPolicy,
    operator: Arc<dyn Operator>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, operator: Arc<dyn Operator>) -> Self {
        Self {
            id: id.into(),
            retry: RetryPolicy::default(),
            operator,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("retry", &self.retry)
            .field("operator", &self.operator.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_limit_counts_retries_not_attempts() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(3));
        assert!(!policy.allows_retry_after(4));

        assert!(!RetryPolicy::no_retries().allows_retry_after(1));
    }

    #[test]
    fn default_policy_matches_pipeline_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_limit, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(300));
    }
}
