//! Reusable observers for crease-pattern optimization.
//!
//! This crate provides [`Observer`] implementations and the capability traits
//! they are written against.
//!
//! - [`Log`] reports progress through `tracing`
//! - [`Deadline`] stops a run once a wall-clock budget elapses
//! - [`Recorder`] keeps the objective and violation history of a run
//!
//! Observers are passed by value. To inspect one after a run, forward to it
//! from a closure:
//!
//! ```
//! use crease_core::{Linear, Observer};
//! use crease_observers::Recorder;
//! use crease_solvers::{Action, BackendKind, ConstrainedOptimizer, Event};
//!
//! let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
//! optimizer.set_size(1);
//! optimizer.set_bounds(vec![0.0], vec![1.0])?;
//! optimizer.set_objective(Linear::new(0.0).term(0, 1.0))?;
//!
//! let mut recorder = Recorder::new();
//! let mut x = [0.5];
//! optimizer.minimize(&mut x, |event: &Event<'_>| -> Option<Action> {
//!     recorder.observe(event)
//! })?;
//!
//! assert!(!recorder.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`Observer`]: crease_core::Observer

pub mod traits;

mod deadline;
mod log;
mod recorder;

pub use deadline::Deadline;
pub use log::Log;
pub use recorder::{Record, Recorder};
