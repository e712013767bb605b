use thiserror::Error;

/// Configuration for the SQP backend.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    max_iters: usize,
    feasibility_tol: f64,
    optimality_tol: f64,
    step_tol: f64,
}

/// Errors that can occur when validating an SQP config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iters must be positive")]
    MaxIters,

    #[error("feasibility_tol must be finite and positive")]
    FeasibilityTol,

    #[error("optimality_tol must be finite and non-negative")]
    OptimalityTol,

    #[error("step_tol must be finite and non-negative")]
    StepTol,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(500, 1e-9, 1e-14, 1e-10).unwrap()
    }
}

impl Config {
    /// Creates a new config with validated limits and tolerances.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iters` is zero, `feasibility_tol` is not
    /// positive, or any tolerance is negative or non-finite.
    pub fn new(
        max_iters: usize,
        feasibility_tol: f64,
        optimality_tol: f64,
        step_tol: f64,
    ) -> Result<Self, ConfigError> {
        if max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        if !feasibility_tol.is_finite() || feasibility_tol <= 0.0 {
            return Err(ConfigError::FeasibilityTol);
        }
        if !optimality_tol.is_finite() || optimality_tol < 0.0 {
            return Err(ConfigError::OptimalityTol);
        }
        if !step_tol.is_finite() || step_tol < 0.0 {
            return Err(ConfigError::StepTol);
        }

        Ok(Self {
            max_iters,
            feasibility_tol,
            optimality_tol,
            step_tol,
        })
    }

    /// Returns the maximum number of major iterations.
    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    /// Returns the largest constraint violation accepted at convergence.
    #[must_use]
    pub fn feasibility_tol(&self) -> f64 {
        self.feasibility_tol
    }

    /// Returns the tolerance on `|∇fᵀd| + Σ|λc|`, relative to `max(1, |f|)`.
    #[must_use]
    pub fn optimality_tol(&self) -> f64 {
        self.optimality_tol
    }

    /// Returns the tolerance on `‖d‖∞`, relative to `1 + ‖x‖∞`.
    #[must_use]
    pub fn step_tol(&self) -> f64 {
        self.step_tol
    }
}
