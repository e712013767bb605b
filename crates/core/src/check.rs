//! Gradient verification against central differences.
//!
//! Backends trust analytic gradients completely, so every function written
//! for a problem should pass [`gradient`] at a few representative points.

use crate::{DifferentiableFn, DomainError};

/// Result of comparing an analytic gradient with a numerical one.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientCheck {
    /// Gradient reported by the function.
    pub analytic: Vec<f64>,

    /// Central-difference approximation.
    pub numeric: Vec<f64>,

    /// Largest error over all components, relative to `max(1, |analytic|, |numeric|)`.
    pub max_error: f64,

    /// Component where `max_error` occurs.
    pub worst_index: usize,
}

impl GradientCheck {
    /// Returns true if the worst relative error is within `tol`.
    #[must_use]
    pub fn passes(&self, tol: f64) -> bool {
        self.max_error <= tol
    }
}

/// Compares the analytic gradient of `f` at `x` with central differences.
///
/// Component `i` is perturbed by `step·max(1, |x[i]|)`.
///
/// # Errors
///
/// Propagates any [`DomainError`] raised while evaluating `f`.
pub fn gradient<F>(f: &F, x: &[f64], step: f64) -> Result<GradientCheck, DomainError>
where
    F: DifferentiableFn + ?Sized,
{
    let mut analytic = vec![0.0; x.len()];
    f.gradient(x, &mut analytic)?;

    let mut shifted = x.to_vec();
    let mut numeric = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        let h = step * x[i].abs().max(1.0);

        shifted[i] = x[i] + h;
        let forward = f.value(&shifted)?;
        shifted[i] = x[i] - h;
        let backward = f.value(&shifted)?;
        shifted[i] = x[i];

        numeric.push((forward - backward) / (2.0 * h));
    }

    let (worst_index, max_error) = analytic
        .iter()
        .zip(&numeric)
        .map(|(a, n)| (a - n).abs() / a.abs().max(n.abs()).max(1.0))
        .enumerate()
        .fold((0, 0.0), |best, (i, err)| if err > best.1 { (i, err) } else { best });

    Ok(GradientCheck {
        analytic,
        numeric,
        max_error,
        worst_index,
    })
}
