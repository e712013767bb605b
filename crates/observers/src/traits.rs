//! Capability traits for solver-agnostic observers.
//!
//! Observers in this crate are written against these traits instead of a
//! concrete event type, so they work with any backend event that reports the
//! same quantities.
//!
//! # Example
//!
//! ```rust
//! use crease_core::Observer;
//! use crease_observers::traits::{CanStopEarly, HasViolation};
//!
//! struct FeasibleEnough {
//!     tolerance: f64,
//! }
//!
//! impl<E: HasViolation, A: CanStopEarly> Observer<E, A> for FeasibleEnough {
//!     fn observe(&mut self, event: &E) -> Option<A> {
//!         (event.violation() <= self.tolerance).then(A::stop_early)
//!     }
//! }
//! ```

use crease_solvers::{Action, Event};

/// An event that knows which iteration it belongs to.
pub trait HasIteration {
    fn iteration(&self) -> usize;
}

/// An event that carries an objective value.
pub trait HasObjective {
    /// Returns the objective for this event.
    fn objective(&self) -> f64;
}

/// An event that carries a constraint violation.
pub trait HasViolation {
    /// Returns the largest constraint violation, zero when feasible.
    fn violation(&self) -> f64;
}

/// An action type that can signal early termination.
pub trait CanStopEarly {
    /// Returns the action that stops the solver early.
    fn stop_early() -> Self;
}

impl HasIteration for Event<'_> {
    fn iteration(&self) -> usize {
        self.iter
    }
}

impl HasObjective for Event<'_> {
    fn objective(&self) -> f64 {
        self.objective
    }
}

impl HasViolation for Event<'_> {
    fn violation(&self) -> f64 {
        self.violation
    }
}

impl CanStopEarly for Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}
