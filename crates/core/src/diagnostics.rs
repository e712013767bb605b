use std::{fmt, time::Duration};

use crate::CallCounts;

/// Instrumentation gathered from one optimization run.
///
/// Consumed by external reporting: test harnesses and the interactive shells
/// print these after every scale, edge, or strain optimization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Diagnostics {
    /// Calls made on the objective.
    pub objective: CallCounts,

    /// Calls made on all constraints combined.
    pub constraints: CallCounts,

    /// Backend iterations (outer iterations where the backend has several levels).
    pub iterations: usize,

    /// Wall-clock time spent inside the backend.
    pub elapsed: Duration,
}

impl Diagnostics {
    /// Returns the combined calls on the objective and every constraint.
    #[must_use]
    pub fn total_calls(&self) -> CallCounts {
        self.objective + self.constraints
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "objective calls = {}, constraint calls = {}, total calls = {}, iterations = {}, time = {}ms",
            self.objective,
            self.constraints,
            self.total_calls(),
            self.iterations,
            self.elapsed.as_millis()
        )
    }
}
