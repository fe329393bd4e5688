//! Global computation budget.
//!
//! Shared by every search tree and optimizer of one run. Checked at each
//! depth boundary and each optimizer iteration; running out is not an error,
//! the best result so far is returned with a budget-limited status.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use web_time::Instant;

use crate::parameters::BudgetParameters;

#[derive(Debug)]
pub struct Budget {
    started: Instant,
    max_duration: Option<Duration>,
    max_leaf_evaluations: Option<usize>,
    leaf_evaluations: AtomicUsize,
}

impl Budget {
    pub fn new(params: &BudgetParameters) -> Self {
        Budget {
            started: Instant::now(),
            max_duration: params.max_duration_seconds.map(Duration::from_secs_f64),
            max_leaf_evaluations: params.max_leaf_evaluations,
            leaf_evaluations: AtomicUsize::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(&BudgetParameters::default())
    }

    /// Counts one leaf evaluation and returns the new total.
    pub fn record_leaf_evaluation(&self) -> usize {
        self.leaf_evaluations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn leaf_evaluations(&self) -> usize {
        self.leaf_evaluations.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, `None` without deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.max_duration.map(|max| max.saturating_sub(self.elapsed()))
    }

    /// Caps `limit` by the remaining time.
    pub fn cap(&self, limit: Duration) -> Duration {
        self.remaining().map_or(limit, |left| left.min(limit))
    }

    pub fn is_exhausted(&self) -> bool {
        let out_of_time = self.remaining().is_some_and(|left| left.is_zero());
        let out_of_leaves = self
            .max_leaf_evaluations
            .is_some_and(|max| self.leaf_evaluations() >= max);
        out_of_time || out_of_leaves
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::unlimited()
    }
}
