use crate::ProblemError;

/// Component-wise box constraints `lower[i] ≤ x[i] ≤ upper[i]`.
///
/// Infinite entries are allowed and mean the component is unbounded on that
/// side. Construction guarantees both vectors have the same length, contain no
/// NaN, and satisfy `lower[i] ≤ upper[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// Creates bounds from lower and upper vectors.
    ///
    /// # Errors
    ///
    /// Returns [`ProblemError::Dimension`] if the lengths differ, or
    /// [`ProblemError::InvalidBound`] if any entry is NaN or `lower > upper`.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, ProblemError> {
        if lower.len() != upper.len() {
            return Err(ProblemError::Dimension {
                expected: lower.len(),
                found: upper.len(),
            });
        }

        if let Some(index) = lower
            .iter()
            .zip(&upper)
            .position(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi)
        {
            return Err(ProblemError::InvalidBound {
                index,
                lower: lower[index],
                upper: upper[index],
            });
        }

        Ok(Self { lower, upper })
    }

    /// Creates bounds that leave all `n` components unconstrained.
    #[must_use]
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    /// Returns the lower bounds.
    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Returns the upper bounds.
    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Returns true if the bounds cover no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Projects component `i` of value `v` onto its interval.
    #[must_use]
    pub fn project(&self, i: usize, v: f64) -> f64 {
        v.clamp(self.lower[i], self.upper[i])
    }

    /// Projects every component of `x` onto its interval, in place.
    pub fn clamp(&self, x: &mut [f64]) {
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = self.project(i, *xi);
        }
    }

    /// Returns true if every component of `x` lies within its interval.
    #[must_use]
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.len()
            && x.iter()
                .enumerate()
                .all(|(i, &xi)| self.lower[i] <= xi && xi <= self.upper[i])
    }
}
