use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crease_core::{
    ConstraintSet, Counted, Diagnostics, DifferentiableFn, Observer, Problem, ProblemError,
};

use crate::{Action, Backend, BackendKind, Error, Event, Solution};

/// A constrained minimization problem bound to one backend.
///
/// Configure the problem with [`set_size`](Self::set_size) first, then bounds,
/// objective, and constraints, then call [`minimize`](Self::minimize). Every
/// function is counted, so [`diagnostics`](Self::diagnostics) reports call
/// counts, iterations, and elapsed time of the last run.
///
/// ```
/// use crease_core::Linear;
/// use crease_solvers::{BackendKind, ConstrainedOptimizer, Status};
///
/// // Maximize x0 + x1 on the unit box.
/// let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
/// optimizer.set_size(2);
/// optimizer.set_bounds(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
/// optimizer
///     .set_objective(Linear::new(0.0).term(0, -1.0).term(1, -1.0))
///     .unwrap();
///
/// let mut x = [0.5, 0.5];
/// let solution = optimizer.minimize_unobserved(&mut x).unwrap();
///
/// assert_eq!(solution.status, Status::Converged);
/// assert_eq!(x, [1.0, 1.0]);
/// ```
pub struct ConstrainedOptimizer {
    problem: Problem,
    backend: Box<dyn Backend>,
    iterations: usize,
    elapsed: Duration,
}

impl ConstrainedOptimizer {
    /// Creates an optimizer with no problem configured.
    #[must_use]
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            problem: Problem::new(),
            backend,
            iterations: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Creates an optimizer using the default configuration of `kind`.
    #[must_use]
    pub fn from_kind(kind: BackendKind) -> Self {
        Self::new(kind.build())
    }

    /// Returns the backend's name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Declares the number of variables, discarding any previous configuration.
    pub fn set_size(&mut self, n: usize) {
        self.problem.set_size(n);
    }

    /// Sets component-wise bounds on the variables.
    ///
    /// # Errors
    ///
    /// Fails if no size is set or the bounds are invalid.
    pub fn set_bounds(&mut self, lower: Vec<f64>, upper: Vec<f64>) -> Result<(), ProblemError> {
        self.problem.set_bounds(lower, upper)
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
        self.problem.set_objective(f)
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
        self.problem.add_linear_equality(f)
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
        self.problem.add_linear_inequality(f)
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
        self.problem.add_nonlinear_equality(f)
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
        self.problem.add_nonlinear_inequality(f)
    }

    #[must_use]
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    #[must_use]
    pub fn objective(&self) -> Option<&Counted> {
        self.problem.objective()
    }

    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        self.problem.constraints()
    }

    /// Minimizes the configured problem starting from `x`.
    ///
    /// `x` is clamped into the bounds and then updated in place; it holds the
    /// last iterate on every return path. See [`Backend::minimize`].
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the problem is invalid, a function is
    /// undefined at an iterate, or the backend fails to converge.
    pub fn minimize<O>(&mut self, x: &mut [f64], mut observer: O) -> Result<Solution, Error>
    where
        O: for<'a> Observer<Event<'a>, Action>,
    {
        let mut iterations = 0;
        let mut counting = |event: &Event<'_>| {
            iterations = event.iter;
            observer.observe(event)
        };

        let start = Instant::now();
        let result = self.backend.minimize(&self.problem, x, &mut counting);
        self.elapsed = start.elapsed();
        self.iterations = iterations;

        match &result {
            Ok(solution) => debug!(
                backend = self.backend.name(),
                status = ?solution.status,
                iters = solution.iters,
                objective = solution.objective,
                violation = solution.violation,
                "minimization finished"
            ),
            Err(err) => warn!(backend = self.backend.name(), %err, "minimization failed"),
        }

        result
    }

    /// Minimizes without observer support.
    ///
    /// # Errors
    ///
    /// See [`minimize`](Self::minimize).
    pub fn minimize_unobserved(&mut self, x: &mut [f64]) -> Result<Solution, Error> {
        self.minimize(x, ())
    }

    /// Returns call counts, iterations, and elapsed time.
    ///
    /// Call counts accumulate over every run; iterations and time describe
    /// the most recent run.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            objective: self.problem.objective_calls(),
            constraints: self.problem.constraints().call_counts(),
            iterations: self.iterations,
            elapsed: self.elapsed,
        }
    }
}

impl std::fmt::Debug for ConstrainedOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstrainedOptimizer")
            .field("backend", &self.backend.name())
            .field("problem", &self.problem)
            .field("iterations", &self.iterations)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}
