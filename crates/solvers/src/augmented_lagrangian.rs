//! Augmented-Lagrangian backend.
//!
//! # Algorithm
//!
//! Equality and inequality constraints are folded into the
//! Powell-Hestenes-Rockafellar augmented Lagrangian
//!
//! ```text
//! L(x; λ, μ, ρ) = f(x) + Σ λᵢhᵢ + ρ/2 Σ hᵢ² + 1/(2ρ) Σ (max(0, μⱼ + ρgⱼ)² − μⱼ²)
//! ```
//!
//! which is minimized over the bounds by a projected L-BFGS inner solver.
//! After each inner solve the multipliers are updated with
//! `λ ← λ + ρh` and `μ ← max(0, μ + ρg)`, and the penalty `ρ` grows whenever
//! the infeasibility fails to halve. Inner tolerances tighten by a factor of
//! ten per outer iteration down to the optimality tolerance.
//!
//! # Convergence
//!
//! The run converges once the largest violation and the complementarity
//! measure `max(|h|, |max(g, −μ/ρ)|)` are within the feasibility tolerance and
//! the projected gradient of the Lagrangian is within the optimality
//! tolerance, scaled by `max(1, ‖∇f‖∞)`.
//!
//! # Observer Events
//!
//! One [`Event`] is emitted after every multiplier update.

mod config;
mod inner;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};

use nalgebra::DVector;
use tracing::{debug, warn};

use crease_core::{Observer, Problem};

use crate::{
    Action, Backend, Error, Event, Solution, Status,
    error::Reason,
    evaluate::Evaluator,
};

use inner::Termination;

/// Inner tolerance used for the first outer iteration.
const INITIAL_INNER_TOL: f64 = 1e-2;

/// The penalty grows unless infeasibility drops below this fraction of its
/// previous value.
const REQUIRED_DECREASE: f64 = 0.5;

/// Augmented-Lagrangian backend with a projected L-BFGS inner solver.
#[derive(Debug, Clone, Default)]
pub struct AugmentedLagrangian {
    config: Config,
}

impl AugmentedLagrangian {
    /// Name reported by [`Backend::name`].
    pub const NAME: &'static str = "alm";

    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Backend for AugmentedLagrangian {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn minimize(
        &mut self,
        problem: &Problem,
        x: &mut [f64],
        observer: &mut dyn for<'a> Observer<Event<'a>, Action>,
    ) -> Result<Solution, Error> {
        let eval = Evaluator::new(problem, x)?;
        problem.bounds().clamp(x);

        let mut iterate = DVector::from_column_slice(x);
        let result = run(&self.config, &eval, problem, &mut iterate, observer);
        x.copy_from_slice(iterate.as_slice());
        result
    }
}

/// Multiplier estimates and penalty parameter.
struct Multipliers {
    eq: DVector<f64>,
    ineq: DVector<f64>,
    penalty: f64,
}

impl Multipliers {
    /// Evaluates the augmented Lagrangian and its gradient at `x`.
    ///
    /// Inequalities whose shifted value `μ + ρg` is not positive contribute a
    /// constant, so their gradients are skipped.
    fn augmented(
        &self,
        eval: &Evaluator<'_>,
        x: &DVector<f64>,
        grad: &mut DVector<f64>,
    ) -> Result<f64, Error> {
        let rho = self.penalty;
        let mut row = DVector::zeros(x.len());

        let mut value = eval.objective(x)?;
        eval.objective_gradient(x, grad)?;

        for i in 0..eval.num_eq() {
            let h = eval.equality(i, x)?;
            value += self.eq[i] * h + 0.5 * rho * h * h;
            eval.equality_gradient(i, x, &mut row)?;
            grad.axpy(self.eq[i] + rho * h, &row, 1.0);
        }

        for j in 0..eval.num_ineq() {
            let g = eval.inequality(j, x)?;
            let shifted = (self.ineq[j] + rho * g).max(0.0);
            value += (shifted * shifted - self.ineq[j] * self.ineq[j]) / (2.0 * rho);
            if shifted > 0.0 {
                eval.inequality_gradient(j, x, &mut row)?;
                grad.axpy(shifted, &row, 1.0);
            }
        }

        Ok(value)
    }
}

fn run(
    config: &Config,
    eval: &Evaluator<'_>,
    problem: &Problem,
    x: &mut DVector<f64>,
    observer: &mut dyn for<'a> Observer<Event<'a>, Action>,
) -> Result<Solution, Error> {
    let bounds = problem.bounds();
    let mut mult = Multipliers {
        eq: DVector::zeros(eval.num_eq()),
        ineq: DVector::zeros(eval.num_ineq()),
        penalty: config.initial_penalty(),
    };

    let mut grad = DVector::zeros(eval.n());
    eval.objective_gradient(x, &mut grad)?;
    let mut stationarity_tol = config.optimality_tol() * grad.amax().max(1.0);

    let mut inner_tol = INITIAL_INNER_TOL.max(stationarity_tol);
    let mut previous_infeasibility = f64::INFINITY;

    for iter in 1..=config.max_outer_iters() {
        let outcome = inner::minimize(
            |x: &DVector<f64>, grad: &mut DVector<f64>| mult.augmented(eval, x, grad),
            bounds,
            x,
            inner_tol,
            config.max_inner_iters(),
            config.memory(),
        )?;

        let objective = eval.objective(x)?;
        let constraints = eval.constraints(x)?;
        let violation = constraints.max_violation();

        let rho = mult.penalty;
        let eq_infeasibility = constraints.eq.iter().fold(0.0_f64, |m, h| m.max(h.abs()));
        let infeasibility = constraints
            .ineq
            .iter()
            .zip(mult.ineq.iter())
            .fold(eq_infeasibility, |m, (&g, &mu)| m.max(g.max(-mu / rho).abs()));

        mult.eq.axpy(rho, &constraints.eq, 1.0);
        for (mu, &g) in mult.ineq.iter_mut().zip(constraints.ineq.iter()) {
            *mu = (*mu + rho * g).max(0.0);
        }

        debug!(
            iter,
            objective,
            violation,
            penalty = rho,
            inner_iters = outcome.iters,
            projected_gradient = outcome.projected_gradient,
            "augmented Lagrangian iteration"
        );

        let event = Event {
            iter,
            x: x.as_slice(),
            objective,
            violation,
        };
        if let Some(Action::StopEarly) = observer.observe(&event) {
            return Ok(Solution {
                status: Status::StoppedByObserver,
                iters: iter,
                objective,
                violation,
            });
        }

        eval.objective_gradient(x, &mut grad)?;
        stationarity_tol = config.optimality_tol() * grad.amax().max(1.0);

        let feasible =
            violation <= config.feasibility_tol() && infeasibility <= config.feasibility_tol();
        if feasible && outcome.projected_gradient <= stationarity_tol {
            return Ok(Solution {
                status: Status::Converged,
                iters: iter,
                objective,
                violation,
            });
        }

        if outcome.termination == Termination::Stalled && rho >= config.max_penalty() {
            warn!(iter, violation, "inner solver stalled at the maximum penalty");
            return Err(Error::convergence(AugmentedLagrangian::NAME, Reason::InnerStalled));
        }

        if infeasibility > REQUIRED_DECREASE * previous_infeasibility {
            mult.penalty = (rho * config.penalty_growth()).min(config.max_penalty());
        }
        previous_infeasibility = infeasibility;
        inner_tol = (inner_tol * 0.1).max(stationarity_tol);
    }

    warn!(
        iters = config.max_outer_iters(),
        "augmented Lagrangian reached its iteration limit"
    );
    Err(Error::convergence(AugmentedLagrangian::NAME, Reason::MaxIterations))
}
