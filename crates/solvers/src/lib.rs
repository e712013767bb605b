//! Nonlinear constrained optimizer backends.
//!
//! A [`Backend`] minimizes a [`Problem`](crease_core::Problem) from a possibly
//! infeasible start. Two backends are provided:
//!
//! - [`augmented_lagrangian`]: a PHR augmented Lagrangian with a projected
//!   L-BFGS inner solver
//! - [`sqp`]: sequential quadratic programming with a damped-BFGS Hessian and
//!   a dual active-set subproblem solver
//!
//! [`BackendKind`] selects a backend at runtime, and [`ConstrainedOptimizer`]
//! pairs a backend with the problem it owns and records diagnostics.

pub mod augmented_lagrangian;
pub mod sqp;

mod backend;
mod error;
mod evaluate;
mod kind;
mod optimizer;

pub use backend::{Action, Backend, Event, Solution, Status};
pub use error::{Error, FunctionId, Reason};
pub use kind::{BackendKind, ParseBackendKindError};
pub use optimizer::ConstrainedOptimizer;
