use std::fmt;

use thiserror::Error;

use crease_core::{DomainError, ProblemError};

/// Errors that can occur while minimizing a constrained problem.
///
/// On every error the caller's `x` holds the last iterate the backend reached,
/// which is generally not feasible.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid problem: {0}")]
    Problem(#[from] ProblemError),

    #[error("{function} is undefined at the current point: {source}")]
    NumericDomain {
        function: FunctionId,
        #[source]
        source: DomainError,
    },

    #[error("{backend} failed to converge: {reason}")]
    Convergence {
        backend: &'static str,
        reason: Reason,
    },
}

impl Error {
    pub(crate) fn convergence(backend: &'static str, reason: Reason) -> Self {
        Self::Convergence { backend, reason }
    }

    /// Returns the convergence reason, if this is a convergence failure.
    #[must_use]
    pub fn reason(&self) -> Option<Reason> {
        match self {
            Self::Convergence { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Identifies which function of a problem raised a domain error.
///
/// Constraint indices count equalities (linear first) and inequalities
/// (linear first) separately, matching [`ConstraintSet::equalities`] and
/// [`ConstraintSet::inequalities`].
///
/// [`ConstraintSet::equalities`]: crease_core::ConstraintSet::equalities
/// [`ConstraintSet::inequalities`]: crease_core::ConstraintSet::inequalities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionId {
    Objective,
    Equality(usize),
    Inequality(usize),
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Objective => write!(f, "objective"),
            Self::Equality(i) => write!(f, "equality constraint {i}"),
            Self::Inequality(i) => write!(f, "inequality constraint {i}"),
        }
    }
}

/// Why a backend stopped without meeting its tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// The outer iteration budget ran out.
    MaxIterations,

    /// No step along the search direction reduced the merit function.
    LineSearch,

    /// The quadratic subproblem could not be solved.
    Subproblem,

    /// The bound-constrained inner solver stopped making progress.
    InnerStalled,
}

impl Reason {
    /// Returns the numeric result code reported to callers.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::MaxIterations => 2,
            Self::LineSearch => 3,
            Self::Subproblem => 4,
            Self::InnerStalled => 5,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MaxIterations => "iteration limit reached",
            Self::LineSearch => "line search failed",
            Self::Subproblem => "quadratic subproblem failed",
            Self::InnerStalled => "inner solver stalled",
        };
        write!(f, "{text} (code {})", self.code())
    }
}
