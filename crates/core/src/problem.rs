use thiserror::Error;

use crate::{Bounds, CallCounts, ConstraintKind, ConstraintSet, Counted, DifferentiableFn};

/// Errors raised when a problem is configured or used incorrectly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProblemError {
    #[error("problem size has not been set")]
    SizeNotSet,

    #[error("expected {expected} values, got {found}")]
    Dimension { expected: usize, found: usize },

    #[error("invalid bound at index {index}: lower {lower}, upper {upper}")]
    InvalidBound { index: usize, lower: f64, upper: f64 },

    #[error("no objective has been set")]
    MissingObjective,
}

/// One nonlinear constrained minimization problem.
///
/// ```text
/// minimize    f(x)
/// subject to  c_eq(x)   = 0
///             c_ineq(x) ≤ 0
///             lower ≤ x ≤ upper
/// ```
///
/// [`set_size`](Self::set_size) must come first; it resets the bounds to
/// unbounded and discards any objective and constraints. All other setters
/// fail with [`ProblemError::SizeNotSet`] until a size is declared.
///
/// Functions are wrapped in [`Counted`] on insertion, so call counts are
/// available through [`objective`](Self::objective) and
/// [`constraints`](Self::constraints) after a run.
#[derive(Debug, Default)]
pub struct Problem {
    size: usize,
    bounds: Bounds,
    objective: Option<Counted>,
    constraints: ConstraintSet,
}

impl Problem {
    /// Creates a problem with no size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the number of variables.
    pub fn set_size(&mut self, n: usize) {
        self.size = n;
        self.bounds = Bounds::unbounded(n);
        self.objective = None;
        self.constraints.clear();
    }

    /// Sets component-wise bounds on the variables.
    ///
    /// # Errors
    ///
    /// Fails if no size is set, the vectors do not match the size, or the
    /// bounds are invalid.
    pub fn set_bounds(&mut self, lower: Vec<f64>, upper: Vec<f64>) -> Result<(), ProblemError> {
        self.require_size()?;
        let bounds = Bounds::new(lower, upper)?;
        if bounds.len() != self.size {
            return Err(ProblemError::Dimension {
                expected: self.size,
                found: bounds.len(),
            });
        }
        self.bounds = bounds;
        Ok(())
    }

    /// Sets the objective, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Fails if no size is set.
    pub fn set_objective<F: DifferentiableFn + 'static>(
        &mut self,
        f: F,
    ) -> Result<(), ProblemError> {
        self.require_size()?;
        self.objective = Some(Counted::new(f));
        Ok(())
    }

    /// Appends a constraint of the given kind.
    ///
    /// # Errors
    ///
    /// Fails if no size is set.
    pub fn add_constraint<F: DifferentiableFn + 'static>(
        &mut self,
        kind: ConstraintKind,
        f: F,
    ) -> Result<(), ProblemError> {
        self.require_size()?;
        self.constraints.push(kind, Counted::new(f));
        Ok(())
    }

    /// Appends a linear equality constraint `f(x) = 0`.
    ///
    /// # Errors
    ///
    /// Fails if no size is set.
    pub fn add_linear_equality<F: DifferentiableFn + 'static>(
        &mut self,
        f: F,
    ) -> Result<(), ProblemError> {
        self.add_constraint(ConstraintKind::LinearEquality, f)
    }

    /// Appends a linear inequality constraint `f(x) ≤ 0`.
    ///
    /// # Errors
    ///
    /// Fails if no size is set.
    pub fn add_linear_inequality<F: DifferentiableFn + 'static>(
        &mut self,
        f: F,
    ) -> Result<(), ProblemError> {
        self.add_constraint(ConstraintKind::LinearInequality, f)
    }

    /// Appends a nonlinear equality constraint `f(x) = 0`.
    ///
    /// # Errors
    ///
    /// Fails if no size is set.
    pub fn add_nonlinear_equality<F: DifferentiableFn + 'static>(
        &mut self,
        f: F,
    ) -> Result<(), ProblemError> {
        self.add_constraint(ConstraintKind::NonlinearEquality, f)
    }

    /// Appends a nonlinear inequality constraint `f(x) ≤ 0`.
    ///
    /// # Errors
    ///
    /// Fails if no size is set.
    pub fn add_nonlinear_inequality<F: DifferentiableFn + 'static>(
        &mut self,
        f: F,
    ) -> Result<(), ProblemError> {
        self.add_constraint(ConstraintKind::NonlinearInequality, f)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    #[must_use]
    pub fn objective(&self) -> Option<&Counted> {
        self.objective.as_ref()
    }

    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Returns the objective's call counts, or zero if none is set.
    #[must_use]
    pub fn objective_calls(&self) -> CallCounts {
        self.objective.as_ref().map(Counted::calls).unwrap_or_default()
    }

    /// Checks that the problem is ready to be minimized from `x`.
    ///
    /// # Errors
    ///
    /// Fails if no size is set, no objective is set, or `x` has the wrong length.
    pub fn validate(&self, x: &[f64]) -> Result<&Counted, ProblemError> {
        self.require_size()?;
        let objective = self.objective.as_ref().ok_or(ProblemError::MissingObjective)?;
        if x.len() != self.size {
            return Err(ProblemError::Dimension {
                expected: self.size,
                found: x.len(),
            });
        }
        Ok(objective)
    }

    fn require_size(&self) -> Result<(), ProblemError> {
        if self.size == 0 {
            Err(ProblemError::SizeNotSet)
        } else {
            Ok(())
        }
    }
}
