use thiserror::Error;

/// A scalar function of a real vector together with its analytic gradient.
///
/// Optimizer backends assume [`gradient`](Self::gradient) is the exact
/// derivative of [`value`](Self::value) and never fall back to finite
/// differences. Use [`check::gradient`](crate::check::gradient) to verify an
/// implementation.
///
/// The variable layout of `x` is fixed by whoever builds the problem and must
/// not change during one optimization run.
pub trait DifferentiableFn {
    /// Evaluates the function at `x`.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if the function is undefined at `x`.
    fn value(&self, x: &[f64]) -> Result<f64, DomainError>;

    /// Writes the gradient at `x` into `grad`.
    ///
    /// `grad` has the same length as `x` and is zero-filled by the caller, so
    /// implementations only need to write their nonzero entries.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if the gradient is undefined at `x`.
    fn gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<(), DomainError>;
}

impl<F: DifferentiableFn + ?Sized> DifferentiableFn for Box<F> {
    fn value(&self, x: &[f64]) -> Result<f64, DomainError> {
        (**self).value(x)
    }

    fn gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<(), DomainError> {
        (**self).gradient(x, grad)
    }
}

/// Errors raised when a function is evaluated outside its domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("function value is not finite ({value})")]
    NonFiniteValue { value: f64 },

    #[error("gradient component {index} is not finite ({value})")]
    NonFiniteGradient { index: usize, value: f64 },

    #[error("variable index {index} is out of range for {len} variables")]
    Index { index: usize, len: usize },

    #[error("{0}")]
    Undefined(String),
}

/// A sparse affine function `constant + Σ coeff·x[index]`.
///
/// Covers linear constraints (symmetry, pairing) and objectives that maximize
/// or minimize a single variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    terms: Vec<(usize, f64)>,
    constant: f64,
}

impl Linear {
    /// Creates a function with no terms, equal to `constant` everywhere.
    #[must_use]
    pub fn new(constant: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant,
        }
    }

    /// Adds `coeff·x[index]` to the function.
    #[must_use]
    pub fn term(mut self, index: usize, coeff: f64) -> Self {
        self.terms.push((index, coeff));
        self
    }

    /// Returns the `(index, coefficient)` terms in insertion order.
    #[must_use]
    pub fn terms(&self) -> &[(usize, f64)] {
        &self.terms
    }

    /// Returns the constant offset.
    #[must_use]
    pub fn constant(&self) -> f64 {
        self.constant
    }
}

impl DifferentiableFn for Linear {
    fn value(&self, x: &[f64]) -> Result<f64, DomainError> {
        self.terms.iter().try_fold(self.constant, |sum, &(index, coeff)| {
            let xi = x.get(index).ok_or(DomainError::Index {
                index,
                len: x.len(),
            })?;
            Ok(sum + coeff * xi)
        })
    }

    fn gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<(), DomainError> {
        for &(index, coeff) in &self.terms {
            let len = x.len();
            let slot = grad.get_mut(index).ok_or(DomainError::Index { index, len })?;
            *slot += coeff;
        }
        Ok(())
    }
}

/// A function assembled from a value closure and a gradient closure.
///
/// Construct with [`from_fns`].
pub struct FromFns<V, G> {
    value: V,
    gradient: G,
}

/// Builds a [`DifferentiableFn`] from a value closure and a gradient closure.
///
/// # Example
///
/// ```
/// use crease_core::{DifferentiableFn, from_fns};
///
/// // x0² + x1²
/// let f = from_fns(
///     |x: &[f64]| x[0] * x[0] + x[1] * x[1],
///     |x: &[f64], g: &mut [f64]| {
///         g[0] = 2.0 * x[0];
///         g[1] = 2.0 * x[1];
///     },
/// );
///
/// assert_eq!(f.value(&[1.0, 2.0]).unwrap(), 5.0);
/// ```
pub fn from_fns<V, G>(value: V, gradient: G) -> FromFns<V, G>
where
    V: Fn(&[f64]) -> f64,
    G: Fn(&[f64], &mut [f64]),
{
    FromFns { value, gradient }
}

impl<V, G> DifferentiableFn for FromFns<V, G>
where
    V: Fn(&[f64]) -> f64,
    G: Fn(&[f64], &mut [f64]),
{
    fn value(&self, x: &[f64]) -> Result<f64, DomainError> {
        Ok((self.value)(x))
    }

    fn gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<(), DomainError> {
        (self.gradient)(x, grad);
        Ok(())
    }
}
