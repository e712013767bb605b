use std::collections::VecDeque;

use nalgebra::DVector;
use tracing::trace;

use crease_core::Bounds;

use crate::Error;

/// Sufficient-decrease constant of the Armijo test.
const ARMIJO: f64 = 1e-4;

const MAX_BACKTRACKS: usize = 60;

/// Correction pairs with `sᵀy ≤ CURVATURE · ‖s‖‖y‖` are discarded.
const CURVATURE: f64 = 1e-10;

/// Relative slack on the Armijo test that absorbs rounding in the value.
const ROUNDOFF: f64 = 10.0 * f64::EPSILON;

/// How an inner solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Termination {
    Converged,
    /// No descent step was found even along the projected steepest descent.
    Stalled,
    MaxIters,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Outcome {
    pub(super) termination: Termination,
    pub(super) iters: usize,
    pub(super) projected_gradient: f64,
}

/// Minimizes a smooth function over a box with projected L-BFGS.
///
/// `f` writes the gradient into its second argument and returns the value.
/// Variables sitting on a bound with the gradient pointing outward are held
/// fixed for the step; the rest follow the two-loop direction, and the trial
/// point is projected back into the box before the Armijo test.
pub(super) fn minimize<F>(
    mut f: F,
    bounds: &Bounds,
    x: &mut DVector<f64>,
    tol: f64,
    max_iters: usize,
    memory: usize,
) -> Result<Outcome, Error>
where
    F: FnMut(&DVector<f64>, &mut DVector<f64>) -> Result<f64, Error>,
{
    let n = x.len();
    let mut grad = DVector::zeros(n);
    let mut value = f(x, &mut grad)?;

    let mut history = History::new(memory);
    let mut trial = DVector::zeros(n);
    let mut trial_grad = DVector::zeros(n);

    for iter in 0..max_iters {
        let projected_gradient = projected_gradient_norm(bounds, x, &grad);
        if projected_gradient <= tol {
            return Ok(Outcome {
                termination: Termination::Converged,
                iters: iter,
                projected_gradient,
            });
        }

        let binding: Vec<bool> = (0..n).map(|i| is_binding(bounds, x, &grad, i)).collect();
        let mut free_grad = grad.clone();
        for (g, _) in free_grad.iter_mut().zip(&binding).filter(|(_, b)| **b) {
            *g = 0.0;
        }

        let mut dir = history.direction(&free_grad);
        for (d, _) in dir.iter_mut().zip(&binding).filter(|(_, b)| **b) {
            *d = 0.0;
        }
        if dir.dot(&free_grad) >= 0.0 {
            history.clear();
            dir = -&free_grad;
        }

        let mut alpha = if history.is_empty() {
            (1.0 / dir.amax()).min(1.0)
        } else {
            1.0
        };
        let mut trial_value = value;
        let mut accepted = false;
        for _ in 0..MAX_BACKTRACKS {
            trial.copy_from(x);
            trial.axpy(alpha, &dir, 1.0);
            project(bounds, &mut trial);

            let slope = grad.dot(&(&trial - &*x));
            if slope < 0.0 {
                trial_value = f(&trial, &mut trial_grad)?;
                if trial_value <= value + ARMIJO * slope + ROUNDOFF * value.abs() {
                    accepted = true;
                    break;
                }
            }
            alpha *= 0.5;
        }

        if !accepted {
            if history.is_empty() {
                trace!(iter, projected_gradient, "inner line search stalled");
                return Ok(Outcome {
                    termination: Termination::Stalled,
                    iters: iter,
                    projected_gradient,
                });
            }
            history.clear();
            continue;
        }

        history.push(&trial - &*x, &trial_grad - &grad);
        x.copy_from(&trial);
        grad.copy_from(&trial_grad);
        value = trial_value;
    }

    Ok(Outcome {
        termination: Termination::MaxIters,
        iters: max_iters,
        projected_gradient: projected_gradient_norm(bounds, x, &grad),
    })
}

/// Returns `‖x − P(x − ∇f)‖∞`, which vanishes exactly at box-constrained
/// stationary points.
pub(super) fn projected_gradient_norm(
    bounds: &Bounds,
    x: &DVector<f64>,
    grad: &DVector<f64>,
) -> f64 {
    x.iter()
        .zip(grad.iter())
        .enumerate()
        .fold(0.0, |m, (i, (&xi, &gi))| {
            m.max((bounds.project(i, xi - gi) - xi).abs())
        })
}

fn is_binding(bounds: &Bounds, x: &DVector<f64>, grad: &DVector<f64>, i: usize) -> bool {
    (x[i] <= bounds.lower()[i] && grad[i] > 0.0) || (x[i] >= bounds.upper()[i] && grad[i] < 0.0)
}

fn project(bounds: &Bounds, x: &mut DVector<f64>) {
    for (i, xi) in x.iter_mut().enumerate() {
        *xi = bounds.project(i, *xi);
    }
}

/// Limited-memory inverse Hessian approximation.
struct History {
    memory: usize,
    pairs: VecDeque<Pair>,
}

struct Pair {
    s: DVector<f64>,
    y: DVector<f64>,
    rho: f64,
}

impl History {
    fn new(memory: usize) -> Self {
        Self {
            memory,
            pairs: VecDeque::with_capacity(memory),
        }
    }

    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn clear(&mut self) {
        self.pairs.clear();
    }

    fn push(&mut self, s: DVector<f64>, y: DVector<f64>) {
        let sy = s.dot(&y);
        if sy <= CURVATURE * s.norm() * y.norm() {
            return;
        }
        if self.pairs.len() == self.memory {
            self.pairs.pop_front();
        }
        self.pairs.push_back(Pair { s, y, rho: 1.0 / sy });
    }

    /// Returns `-H g` by the two-loop recursion.
    fn direction(&self, g: &DVector<f64>) -> DVector<f64> {
        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(self.pairs.len());
        for pair in self.pairs.iter().rev() {
            let a = pair.rho * pair.s.dot(&q);
            q.axpy(-a, &pair.y, 1.0);
            alphas.push(a);
        }

        let gamma = self
            .pairs
            .back()
            .map_or(1.0, |pair| 1.0 / (pair.rho * pair.y.norm_squared()));
        let mut r = q * gamma;

        for (pair, a) in self.pairs.iter().zip(alphas.iter().rev()) {
            let b = pair.rho * pair.y.dot(&r);
            r.axpy(a - b, &pair.s, 1.0);
        }

        -r
    }
}
