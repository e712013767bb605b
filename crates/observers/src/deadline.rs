use std::time::{Duration, Instant};

use crease_core::Observer;

use crate::traits::CanStopEarly;

/// Stops the solver once a wall-clock budget has elapsed.
///
/// The clock starts when the deadline is created. The solver keeps its
/// current iterate and reports that it was stopped.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Returns true once the budget is used up.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.budget
    }
}

impl<E, A: CanStopEarly> Observer<E, A> for Deadline {
    fn observe(&mut self, _event: &E) -> Option<A> {
        self.expired().then(A::stop_early)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crease_solvers::{Action, Event};

    fn event() -> Event<'static> {
        Event {
            iter: 1,
            x: &[],
            objective: 0.0,
            violation: 0.0,
        }
    }

    #[test]
    fn zero_budget_stops_immediately() {
        let mut deadline = Deadline::new(Duration::ZERO);
        let action: Option<Action> = deadline.observe(&event());
        assert_eq!(action, Some(Action::StopEarly));
    }

    #[test]
    fn generous_budget_lets_the_solver_run() {
        let mut deadline = Deadline::new(Duration::from_secs(3600));
        let action: Option<Action> = deadline.observe(&event());
        assert_eq!(action, None);
        assert!(!deadline.expired());
    }
}
