//! Core traits and types for crease-pattern optimization.
//!
//! This crate defines the shared abstractions that optimizer backends, drivers,
//! and observers build on:
//!
//! - [`DifferentiableFn`]: a scalar function of a real vector with its
//!   analytic gradient
//! - [`Counted`]: a function wrapper that counts evaluations and rejects
//!   non-finite results
//! - [`ConstraintSet`] and [`Bounds`]: the constraint containers of a problem
//! - [`Problem`]: the size, bounds, objective, and constraints of one
//!   optimization run
//! - [`Observer`]: receives solver events and optionally returns control actions
//!
//! Helpers for writing functions and testing them live in [`separation`] and
//! [`check`].

pub mod check;
pub mod separation;

mod bounds;
mod constraints;
mod counted;
mod diagnostics;
mod function;
mod observer;
mod problem;

pub use bounds::Bounds;
pub use constraints::{ConstraintKind, ConstraintSet};
pub use counted::{CallCounts, Counted};
pub use diagnostics::Diagnostics;
pub use function::{DifferentiableFn, DomainError, FromFns, Linear, from_fns};
pub use observer::Observer;
pub use problem::{Problem, ProblemError};
