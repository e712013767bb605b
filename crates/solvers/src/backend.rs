use crease_core::{Observer, Problem};

use crate::Error;

/// A nonlinear constrained optimization algorithm.
///
/// Every backend accepts linear and nonlinear equality and inequality
/// constraints plus box bounds, and performs a local minimization from a
/// possibly infeasible start.
///
/// `x` is both the initial guess and, on return, the resulting point. The
/// backend first clamps `x` into the bounds, then updates it in place as it
/// iterates, so on error `x` holds the last iterate.
///
/// Backends emit one [`Event`] per outer iteration. An observer returning
/// [`Action::StopEarly`] ends the run with [`Status::StoppedByObserver`],
/// which is how callers cancel a long minimization.
pub trait Backend {
    /// Returns a short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Minimizes `problem` starting from `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Problem`] for an invalid problem,
    /// [`Error::NumericDomain`] if a function cannot be evaluated, and
    /// [`Error::Convergence`] if the iteration budget runs out before the
    /// tolerances are met.
    fn minimize(
        &mut self,
        problem: &Problem,
        x: &mut [f64],
        observer: &mut dyn for<'a> Observer<Event<'a>, Action>,
    ) -> Result<Solution, Error>;
}

/// Progress report emitted once per outer iteration.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// Outer iteration number, starting at 1.
    pub iter: usize,

    /// Current iterate.
    pub x: &'a [f64],

    /// Objective value at `x`.
    pub objective: f64,

    /// Largest constraint violation at `x`.
    pub violation: f64,
}

/// Actions an observer can take during a minimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop the backend and keep the current iterate.
    StopEarly,
}

/// Indicates how a successful minimization terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

impl Status {
    /// Returns the numeric result code reported to callers.
    ///
    /// Failures use the codes of [`Reason`](crate::Reason).
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Converged => 0,
            Self::StoppedByObserver => 1,
        }
    }
}

/// The result of a successful minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    /// How the backend terminated.
    pub status: Status,

    /// Outer iterations performed.
    pub iters: usize,

    /// Objective value at the returned point.
    pub objective: f64,

    /// Largest constraint violation at the returned point.
    pub violation: f64,
}
