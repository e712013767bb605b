//! Sequential quadratic programming backend.
//!
//! # Algorithm
//!
//! Each major iteration linearizes the constraints at `x` and solves
//!
//! ```text
//! minimize    ½ dᵀBd + ∇fᵀd
//! subject to  h + ∇hᵀd = 0
//!             g + ∇gᵀd ≤ 0
//!             lower ≤ x + d ≤ upper
//! ```
//!
//! where `B` is a damped-BFGS approximation of the Lagrangian Hessian. The
//! quadratic program is solved by the Goldfarb-Idnani dual active-set method.
//! When the linearization is inconsistent, an elastic variable `δ ∈ [0, 1]`
//! relaxes the violated constraints and is driven toward zero by a large
//! linear cost.
//!
//! Steps are globalized with the L1 exact-penalty merit function
//! `f + σ(Σ|h| + Σ max(g, 0))`: Armijo backtracking with safeguarded
//! quadratic interpolation, plus one second-order correction when the full
//! step is rejected. If the line search fails, `B` is reset to the identity
//! once before giving up.
//!
//! # Observer Events
//!
//! One [`Event`] is emitted per major iteration, at the current iterate and
//! before the step is taken.

mod bfgs;
mod config;
mod qp;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};

use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::{debug, trace, warn};

use crease_core::{Bounds, Observer, Problem};

use crate::{
    Action, Backend, Error, Event, Solution, Status,
    error::Reason,
    evaluate::{Constraints, Evaluator, Jacobians},
};

use bfgs::Hessian;
use qp::{QpError, QpSolution};

/// Sufficient-decrease constant of the Armijo test.
const ARMIJO: f64 = 1e-4;

const MAX_BACKTRACKS: usize = 30;

/// Relative slack on the Armijo test that absorbs rounding in the merit.
const ROUNDOFF: f64 = 10.0 * f64::EPSILON;

/// Smallest linear cost on the elastic variable.
const MIN_ELASTIC_COST: f64 = 1e3;

/// Sequential quadratic programming backend.
#[derive(Debug, Clone, Default)]
pub struct Sqp {
    config: Config,
}

impl Sqp {
    /// Name reported by [`Backend::name`].
    pub const NAME: &'static str = "sqp";

    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Backend for Sqp {
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
        let result = run(&self.config, &eval, problem.bounds(), &mut iterate, observer);
        x.copy_from_slice(iterate.as_slice());
        result
    }
}

/// Function values at one point.
struct Point {
    x: DVector<f64>,
    objective: f64,
    constraints: Constraints,
}

impl Point {
    fn evaluate(eval: &Evaluator<'_>, x: DVector<f64>) -> Result<Self, Error> {
        let objective = eval.objective(&x)?;
        let constraints = eval.constraints(&x)?;
        Ok(Self {
            x,
            objective,
            constraints,
        })
    }

    fn merit(&self, sigma: f64) -> f64 {
        self.objective + sigma * self.constraints.l1_violation()
    }
}

/// Search direction and multiplier estimates from one subproblem.
struct Step {
    d: DVector<f64>,
    eq: DVector<f64>,
    ineq: DVector<f64>,
    active_ineq: Vec<bool>,
    elastic: bool,
}

fn run(
    config: &Config,
    eval: &Evaluator<'_>,
    bounds: &Bounds,
    x: &mut DVector<f64>,
    observer: &mut dyn for<'a> Observer<Event<'a>, Action>,
) -> Result<Solution, Error> {
    let n = eval.n();
    let mut point = Point::evaluate(eval, x.clone())?;
    let mut grad = DVector::zeros(n);
    eval.objective_gradient(&point.x, &mut grad)?;
    let mut jac = eval.jacobians(&point.x)?;

    let mut hessian = Hessian::new(n);
    let mut sigma = 0.0_f64;
    let mut just_reset = false;

    for iter in 1..=config.max_iters() {
        let objective = point.objective;
        let violation = point.constraints.max_violation();

        let event = Event {
            iter,
            x: point.x.as_slice(),
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

        let step = subproblem(&mut hessian, &point, &grad, &jac, bounds, sigma)?;

        let complementarity = step
            .eq
            .iter()
            .zip(point.constraints.eq.iter())
            .chain(step.ineq.iter().zip(point.constraints.ineq.iter()))
            .map(|(m, c)| (m * c).abs())
            .sum::<f64>();
        let optimality = grad.dot(&step.d).abs() + complementarity;
        let small_step = step.d.amax() <= config.step_tol() * (1.0 + point.x.amax());

        debug!(
            iter,
            objective,
            violation,
            optimality,
            step = step.d.amax(),
            elastic = step.elastic,
            "sqp iteration"
        );

        if !step.elastic
            && violation <= config.feasibility_tol()
            && (small_step || optimality <= config.optimality_tol() * objective.abs().max(1.0))
        {
            return Ok(Solution {
                status: Status::Converged,
                iters: iter,
                objective,
                violation,
            });
        }

        let largest_multiplier = step
            .eq
            .iter()
            .chain(step.ineq.iter())
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        sigma = sigma.max(1.5 * largest_multiplier + 1e-3);

        let Some(trial) = line_search(eval, bounds, &point, &grad, &jac, &step, sigma)? else {
            if just_reset {
                warn!(iter, violation, "sqp line search failed");
                return Err(Error::convergence(Sqp::NAME, Reason::LineSearch));
            }
            trace!(iter, "line search failed, resetting the Hessian");
            hessian.reset();
            just_reset = true;
            continue;
        };
        just_reset = false;

        let mut trial_grad = DVector::zeros(n);
        eval.objective_gradient(&trial.x, &mut trial_grad)?;
        let trial_jac = eval.jacobians(&trial.x)?;

        let s = &trial.x - &point.x;
        let y = lagrangian_gradient(&trial_grad, &trial_jac, &step)
            - lagrangian_gradient(&grad, &jac, &step);
        hessian.update(&s, &y);

        point = trial;
        grad = trial_grad;
        jac = trial_jac;
        x.copy_from(&point.x);
    }

    warn!(iters = config.max_iters(), "sqp reached its iteration limit");
    Err(Error::convergence(Sqp::NAME, Reason::MaxIterations))
}

/// Returns `∇f + Σλ∇h + Σμ∇g` with the step's multiplier estimates.
fn lagrangian_gradient(grad: &DVector<f64>, jac: &Jacobians, step: &Step) -> DVector<f64> {
    grad + jac.eq.tr_mul(&step.eq) + jac.ineq.tr_mul(&step.ineq)
}

/// Solves the quadratic subproblem at `point`.
///
/// An inconsistent linearization is retried in elastic mode, and a Hessian
/// that lost positive definiteness is reset once.
fn subproblem(
    hessian: &mut Hessian,
    point: &Point,
    grad: &DVector<f64>,
    jac: &Jacobians,
    bounds: &Bounds,
    sigma: f64,
) -> Result<Step, Error> {
    let mut elastic = false;
    let mut reset = false;

    loop {
        let qp = Subproblem::build(hessian.matrix(), point, grad, jac, bounds, elastic, sigma);
        match qp::solve(&qp.g, &qp.a, &qp.normals, &qp.rhs, qp.num_eq) {
            Ok(solution) => return Ok(qp.step(solution)),
            Err(QpError::Infeasible) if !elastic => {
                trace!("inconsistent linearization, switching to elastic mode");
                elastic = true;
            }
            Err(QpError::NotPositiveDefinite) if !reset => {
                hessian.reset();
                reset = true;
            }
            Err(err) => {
                warn!(%err, elastic, "quadratic subproblem failed");
                return Err(Error::convergence(Sqp::NAME, Reason::Subproblem));
            }
        }
    }
}

/// Dense quadratic program assembled from one linearization.
///
/// Rows are laid out as equalities, inequalities, finite bounds, and (in
/// elastic mode) the two bounds on `δ`, which is the last variable.
struct Subproblem {
    g: DMatrix<f64>,
    a: DVector<f64>,
    normals: DMatrix<f64>,
    rhs: DVector<f64>,
    num_eq: usize,
    num_ineq: usize,
    n: usize,
    elastic: bool,
}

impl Subproblem {
    fn build(
        b: &DMatrix<f64>,
        point: &Point,
        grad: &DVector<f64>,
        jac: &Jacobians,
        bounds: &Bounds,
        elastic: bool,
        sigma: f64,
    ) -> Self {
        let n = grad.len();
        let vars = if elastic { n + 1 } else { n };
        let (h, g_ineq) = (&point.constraints.eq, &point.constraints.ineq);
        let (num_eq, num_ineq) = (h.len(), g_ineq.len());

        let mut g = DMatrix::zeros(vars, vars);
        g.view_mut((0, 0), (n, n)).copy_from(b);
        let mut a = DVector::zeros(vars);
        a.rows_mut(0, n).copy_from(grad);
        if elastic {
            g[(n, n)] = 1.0;
            a[n] = MIN_ELASTIC_COST.max(10.0 * sigma);
        }

        let mut rows: Vec<(DVector<f64>, f64)> = Vec::new();

        for i in 0..num_eq {
            let mut normal = DVector::zeros(vars);
            normal.rows_mut(0, n).copy_from(&jac.eq.row(i).transpose());
            if elastic {
                normal[n] = -h[i];
            }
            rows.push((normal, -h[i]));
        }

        for j in 0..num_ineq {
            let mut normal = DVector::zeros(vars);
            normal.rows_mut(0, n).copy_from(&(-jac.ineq.row(j).transpose()));
            if elastic {
                normal[n] = g_ineq[j].max(0.0);
            }
            rows.push((normal, g_ineq[j]));
        }

        for i in 0..n {
            let xi = point.x[i];
            if bounds.lower()[i].is_finite() {
                let mut normal = DVector::zeros(vars);
                normal[i] = 1.0;
                rows.push((normal, bounds.lower()[i] - xi));
            }
            if bounds.upper()[i].is_finite() {
                let mut normal = DVector::zeros(vars);
                normal[i] = -1.0;
                rows.push((normal, xi - bounds.upper()[i]));
            }
        }

        if elastic {
            let mut lower = DVector::zeros(vars);
            lower[n] = 1.0;
            rows.push((lower, 0.0));
            let mut upper = DVector::zeros(vars);
            upper[n] = -1.0;
            rows.push((upper, -1.0));
        }

        let mut normals = DMatrix::zeros(rows.len(), vars);
        let mut rhs = DVector::zeros(rows.len());
        for (k, (normal, b)) in rows.into_iter().enumerate() {
            normals.set_row(k, &normal.transpose());
            rhs[k] = b;
        }

        Self {
            g,
            a,
            normals,
            rhs,
            num_eq,
            num_ineq,
            n,
            elastic,
        }
    }

    /// Converts QP multipliers into Lagrangian multiplier estimates.
    fn step(&self, solution: QpSolution) -> Step {
        let (me, mi) = (self.num_eq, self.num_ineq);
        Step {
            d: solution.d.rows(0, self.n).into_owned(),
            eq: -solution.multipliers.rows(0, me).into_owned(),
            ineq: solution.multipliers.rows(me, mi).into_owned(),
            active_ineq: solution.active[me..me + mi].to_vec(),
            elastic: self.elastic,
        }
    }
}

/// Searches along `step.d` for sufficient decrease in the L1 merit.
///
/// Returns `None` if no acceptable point is found.
fn line_search(
    eval: &Evaluator<'_>,
    bounds: &Bounds,
    point: &Point,
    grad: &DVector<f64>,
    jac: &Jacobians,
    step: &Step,
    sigma: f64,
) -> Result<Option<Point>, Error> {
    let d = &step.d;
    let merit = point.merit(sigma);

    let linearized = Constraints {
        eq: &point.constraints.eq + &jac.eq * d,
        ineq: &point.constraints.ineq + &jac.ineq * d,
    };
    let slope =
        grad.dot(d) - sigma * (point.constraints.l1_violation() - linearized.l1_violation());
    if slope >= 0.0 {
        trace!(slope, "step is not a descent direction for the merit");
        return Ok(None);
    }

    let accepts = |trial: &Point, alpha: f64| {
        trial.merit(sigma) <= merit + ARMIJO * alpha * slope + ROUNDOFF * merit.abs()
    };

    let mut alpha = 1.0;
    for k in 0..MAX_BACKTRACKS {
        let mut x = &point.x + d * alpha;
        bounds.clamp(x.as_mut_slice());
        let trial = Point::evaluate(eval, x)?;
        if accepts(&trial, alpha) {
            return Ok(Some(trial));
        }

        if k == 0 {
            let corrected = second_order_correction(eval, bounds, point, jac, step, &trial)?;
            if let Some(corrected) = corrected.filter(|c| accepts(c, 1.0)) {
                trace!("accepted second-order correction");
                return Ok(Some(corrected));
            }
        }

        let excess = trial.merit(sigma) - merit - alpha * slope;
        let interpolated = -slope * alpha * alpha / (2.0 * excess);
        alpha = interpolated.clamp(0.1 * alpha, 0.5 * alpha);
    }

    Ok(None)
}

/// Corrects a rejected full step for constraint curvature.
///
/// Projects the constraint values at `x + d` onto the gradients of the
/// constraints active in the subproblem: `d̂ = −Aᵀ(AAᵀ)⁻¹c(x + d)`.
fn second_order_correction(
    eval: &Evaluator<'_>,
    bounds: &Bounds,
    point: &Point,
    jac: &Jacobians,
    step: &Step,
    full: &Point,
) -> Result<Option<Point>, Error> {
    let active: Vec<usize> = (0..step.ineq.len()).filter(|&j| step.active_ineq[j]).collect();
    let rows = jac.eq.nrows() + active.len();
    if rows == 0 {
        return Ok(None);
    }

    let n = point.x.len();
    let mut a = DMatrix::zeros(rows, n);
    let mut c = DVector::zeros(rows);
    for i in 0..jac.eq.nrows() {
        a.set_row(i, &jac.eq.row(i));
        c[i] = full.constraints.eq[i];
    }
    for (k, &j) in active.iter().enumerate() {
        a.set_row(jac.eq.nrows() + k, &jac.ineq.row(j));
        c[jac.eq.nrows() + k] = full.constraints.ineq[j];
    }

    let Some(chol) = Cholesky::new(&a * a.transpose()) else {
        return Ok(None);
    };
    let correction = -(a.tr_mul(&chol.solve(&c)));

    let mut x = &full.x + correction;
    bounds.clamp(x.as_mut_slice());
    Point::evaluate(eval, x).map(Some)
}
