use thiserror::Error;

/// Configuration for the augmented-Lagrangian backend.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    max_outer_iters: usize,
    max_inner_iters: usize,
    feasibility_tol: f64,
    optimality_tol: f64,
    initial_penalty: f64,
    penalty_growth: f64,
    max_penalty: f64,
    memory: usize,
}

/// Errors that can occur when validating an augmented-Lagrangian config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_outer_iters must be positive")]
    MaxOuterIters,

    #[error("max_inner_iters must be positive")]
    MaxInnerIters,

    #[error("feasibility_tol must be finite and positive")]
    FeasibilityTol,

    #[error("optimality_tol must be finite and positive")]
    OptimalityTol,

    #[error("initial_penalty must be finite and positive")]
    InitialPenalty,

    #[error("penalty_growth must be finite and greater than 1")]
    PenaltyGrowth,

    #[error("max_penalty must be finite and at least initial_penalty")]
    MaxPenalty,

    #[error("memory must be positive")]
    Memory,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(100, 2000, 1e-9, 1e-7)
            .and_then(|config| config.with_penalty(10.0, 10.0, 1e12))
            .unwrap()
    }
}

impl Config {
    /// Creates a config with validated iteration limits and tolerances.
    ///
    /// The penalty schedule defaults to starting at 10, growing tenfold, and
    /// capping at `1e12`. The inner solver keeps 8 correction pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if an iteration limit is zero or a tolerance is not
    /// finite and positive.
    pub fn new(
        max_outer_iters: usize,
        max_inner_iters: usize,
        feasibility_tol: f64,
        optimality_tol: f64,
    ) -> Result<Self, ConfigError> {
        if max_outer_iters == 0 {
            return Err(ConfigError::MaxOuterIters);
        }
        if max_inner_iters == 0 {
            return Err(ConfigError::MaxInnerIters);
        }
        if !feasibility_tol.is_finite() || feasibility_tol <= 0.0 {
            return Err(ConfigError::FeasibilityTol);
        }
        if !optimality_tol.is_finite() || optimality_tol <= 0.0 {
            return Err(ConfigError::OptimalityTol);
        }

        Ok(Self {
            max_outer_iters,
            max_inner_iters,
            feasibility_tol,
            optimality_tol,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e12,
            memory: 8,
        })
    }

    /// Replaces the penalty schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if `initial` is not positive, `growth` is not above 1,
    /// or `max` is below `initial`.
    pub fn with_penalty(self, initial: f64, growth: f64, max: f64) -> Result<Self, ConfigError> {
        if !initial.is_finite() || initial <= 0.0 {
            return Err(ConfigError::InitialPenalty);
        }
        if !growth.is_finite() || growth <= 1.0 {
            return Err(ConfigError::PenaltyGrowth);
        }
        if !max.is_finite() || max < initial {
            return Err(ConfigError::MaxPenalty);
        }

        Ok(Self {
            initial_penalty: initial,
            penalty_growth: growth,
            max_penalty: max,
            ..self
        })
    }

    /// Replaces the number of correction pairs kept by the inner solver.
    ///
    /// # Errors
    ///
    /// Returns an error if `memory` is zero.
    pub fn with_memory(self, memory: usize) -> Result<Self, ConfigError> {
        if memory == 0 {
            return Err(ConfigError::Memory);
        }
        Ok(Self { memory, ..self })
    }

    /// Returns the maximum number of multiplier updates.
    #[must_use]
    pub fn max_outer_iters(&self) -> usize {
        self.max_outer_iters
    }

    /// Returns the iteration limit of each inner bound-constrained solve.
    #[must_use]
    pub fn max_inner_iters(&self) -> usize {
        self.max_inner_iters
    }

    /// Returns the largest constraint violation accepted at convergence.
    #[must_use]
    pub fn feasibility_tol(&self) -> f64 {
        self.feasibility_tol
    }

    /// Returns the projected-gradient tolerance, relative to `max(1, ‖∇f‖∞)`.
    #[must_use]
    pub fn optimality_tol(&self) -> f64 {
        self.optimality_tol
    }

    #[must_use]
    pub fn initial_penalty(&self) -> f64 {
        self.initial_penalty
    }

    #[must_use]
    pub fn penalty_growth(&self) -> f64 {
        self.penalty_growth
    }

    #[must_use]
    pub fn max_penalty(&self) -> f64 {
        self.max_penalty
    }

    #[must_use]
    pub fn memory(&self) -> usize {
        self.memory
    }
}
