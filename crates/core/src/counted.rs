use std::{
    cell::Cell,
    fmt,
    iter::Sum,
    ops::{Add, AddAssign},
};

use crate::{DifferentiableFn, DomainError};

/// Number of value and gradient evaluations made on a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallCounts {
    pub value: usize,
    pub gradient: usize,
}

impl CallCounts {
    /// Returns the combined number of value and gradient calls.
    #[must_use]
    pub fn total(&self) -> usize {
        self.value + self.gradient
    }
}

impl Add for CallCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            gradient: self.gradient + rhs.gradient,
        }
    }
}

impl AddAssign for CallCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for CallCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl fmt::Display for CallCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.value, self.gradient)
    }
}

/// A [`DifferentiableFn`] wrapper that counts evaluations.
///
/// Every function handed to a problem is wrapped in a `Counted`, which also
/// enforces the evaluation contract:
///
/// - the gradient buffer is zero-filled before the inner function writes it
/// - a non-finite value or gradient component becomes a [`DomainError`]
///   instead of leaking NaN into the solver
///
/// Counters use interior mutability so evaluation can stay `&self`.
pub struct Counted {
    inner: Box<dyn DifferentiableFn>,
    value_calls: Cell<usize>,
    gradient_calls: Cell<usize>,
}

impl Counted {
    /// Wraps a function with fresh counters.
    pub fn new<F: DifferentiableFn + 'static>(f: F) -> Self {
        Self::from_box(Box::new(f))
    }

    /// Wraps an already boxed function with fresh counters.
    #[must_use]
    pub fn from_box(inner: Box<dyn DifferentiableFn>) -> Self {
        Self {
            inner,
            value_calls: Cell::new(0),
            gradient_calls: Cell::new(0),
        }
    }

    /// Returns the number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            value: self.value_calls.get(),
            gradient: self.gradient_calls.get(),
        }
    }

    /// Resets both counters to zero.
    pub fn reset_calls(&self) {
        self.value_calls.set(0);
        self.gradient_calls.set(0);
    }
}

impl DifferentiableFn for Counted {
    fn value(&self, x: &[f64]) -> Result<f64, DomainError> {
        self.value_calls.set(self.value_calls.get() + 1);
        let value = self.inner.value(x)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(DomainError::NonFiniteValue { value })
        }
    }

    fn gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<(), DomainError> {
        self.gradient_calls.set(self.gradient_calls.get() + 1);
        grad.fill(0.0);
        self.inner.gradient(x, grad)?;
        match grad.iter().position(|g| !g.is_finite()) {
            Some(index) => Err(DomainError::NonFiniteGradient {
                index,
                value: grad[index],
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Counted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counted")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Linear, from_fns};

    #[test]
    fn counts_value_and_gradient_calls() {
        let f = Counted::new(Linear::new(0.0).term(0, 1.0));
        let mut grad = [0.0];

        f.value(&[1.0]).unwrap();
        f.value(&[2.0]).unwrap();
        f.gradient(&[2.0], &mut grad).unwrap();

        assert_eq!(
            f.calls(),
            CallCounts {
                value: 2,
                gradient: 1
            }
        );

        f.reset_calls();
        assert_eq!(f.calls(), CallCounts::default());
    }

    #[test]
    fn gradient_buffer_is_zeroed_first() {
        let f = Counted::new(Linear::new(0.0).term(1, 4.0));
        let mut grad = [7.0, 7.0, 7.0];

        f.gradient(&[0.0; 3], &mut grad).unwrap();

        assert_eq!(grad, [0.0, 4.0, 0.0]);
    }

    #[test]
    fn non_finite_results_are_domain_errors() {
        let f = Counted::new(from_fns(
            |x: &[f64]| x[0].sqrt(),
            |x: &[f64], g: &mut [f64]| g[0] = 0.5 / x[0].sqrt(),
        ));

        assert!(matches!(
            f.value(&[-1.0]),
            Err(DomainError::NonFiniteValue { .. })
        ));

        let mut grad = [0.0];
        assert!(matches!(
            f.gradient(&[0.0], &mut grad),
            Err(DomainError::NonFiniteGradient { index: 0, .. })
        ));

        // Failed calls are still counted.
        assert_eq!(f.calls().total(), 2);
    }

    #[test]
    fn call_counts_sum() {
        let counts = [
            CallCounts {
                value: 1,
                gradient: 2,
            },
            CallCounts {
                value: 3,
                gradient: 4,
            },
        ];

        let total: CallCounts = counts.into_iter().sum();

        assert_eq!(
            total,
            CallCounts {
                value: 4,
                gradient: 6
            }
        );
        assert_eq!(total.to_string(), "(4, 6)");
    }
}
