use thiserror::Error;

/// Configuration for the [`ScaleOptimizer`](crate::ScaleOptimizer).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleConfig {
    min_scale: f64,
}

/// Configuration for the [`EdgeOptimizer`](crate::EdgeOptimizer) and
/// [`StrainOptimizer`](crate::StrainOptimizer).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StrainConfig {
    min_strain: f64,
    max_strain: f64,
}

/// Errors that can occur when validating a driver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min_scale must be finite and positive")]
    MinScale,

    #[error("min_strain must be finite and greater than -1")]
    MinStrain,

    #[error("max_strain must be finite and greater than min_strain")]
    MaxStrain,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(1e-3).unwrap()
    }
}

impl ScaleConfig {
    /// Creates a config with the smallest scale a run may succeed with.
    ///
    /// # Errors
    ///
    /// Returns an error if `min_scale` is not finite and positive.
    pub fn new(min_scale: f64) -> Result<Self, ConfigError> {
        if !min_scale.is_finite() || min_scale <= 0.0 {
            return Err(ConfigError::MinScale);
        }
        Ok(Self { min_scale })
    }

    /// Returns the scale at or below which a run fails.
    #[must_use]
    pub fn min_scale(&self) -> f64 {
        self.min_scale
    }
}

impl Default for StrainConfig {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(-0.999, 100.0).unwrap()
    }
}

impl StrainConfig {
    /// Creates a config bounding every strain variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are not finite, `min_strain` is not
    /// above -1, or the interval is empty.
    pub fn new(min_strain: f64, max_strain: f64) -> Result<Self, ConfigError> {
        if !min_strain.is_finite() || min_strain <= -1.0 {
            return Err(ConfigError::MinStrain);
        }
        if !max_strain.is_finite() || max_strain <= min_strain {
            return Err(ConfigError::MaxStrain);
        }
        Ok(Self {
            min_strain,
            max_strain,
        })
    }

    #[must_use]
    pub fn min_strain(&self) -> f64 {
        self.min_strain
    }

    #[must_use]
    pub fn max_strain(&self) -> f64 {
        self.max_strain
    }

    pub(crate) fn clamp(&self, strain: f64) -> f64 {
        strain.clamp(self.min_strain, self.max_strain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ScaleConfig::default().min_scale(), 1e-3);
        let strain = StrainConfig::default();
        assert_eq!((strain.min_strain(), strain.max_strain()), (-0.999, 100.0));
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(ScaleConfig::new(0.0), Err(ConfigError::MinScale));
        assert_eq!(ScaleConfig::new(f64::NAN), Err(ConfigError::MinScale));
        assert_eq!(StrainConfig::new(-1.0, 1.0), Err(ConfigError::MinStrain));
        assert_eq!(StrainConfig::new(0.5, 0.5), Err(ConfigError::MaxStrain));
        assert_eq!(StrainConfig::new(0.0, f64::INFINITY), Err(ConfigError::MaxStrain));
    }

    #[test]
    fn clamp_stays_in_bounds() {
        let config = StrainConfig::new(-0.5, 0.5).unwrap();
        assert_eq!(config.clamp(2.0), 0.5);
        assert_eq!(config.clamp(-0.7), -0.5);
        assert_eq!(config.clamp(0.1), 0.1);
    }
}
