use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{Backend, augmented_lagrangian::AugmentedLagrangian, sqp::Sqp};

/// Runtime selection of an optimizer backend.
///
/// Lets callers (and test suites) pick a backend from configuration instead
/// of at compile time.
///
/// ```
/// use crease_solvers::BackendKind;
///
/// let kind: BackendKind = "sqp".parse().unwrap();
/// let backend = kind.build();
/// assert_eq!(backend.name(), "sqp");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum BackendKind {
    /// PHR augmented Lagrangian with a projected quasi-Newton inner solver.
    AugmentedLagrangian,

    /// Sequential quadratic programming with a dual active-set subproblem.
    Sqp,
}

impl BackendKind {
    /// Every available backend.
    pub const ALL: [Self; 2] = [Self::AugmentedLagrangian, Self::Sqp];

    /// Returns the backend's short name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AugmentedLagrangian => AugmentedLagrangian::NAME,
            Self::Sqp => Sqp::NAME,
        }
    }

    /// Builds the backend with its default configuration.
    #[must_use]
    pub fn build(self) -> Box<dyn Backend> {
        match self {
            Self::AugmentedLagrangian => Box::new(AugmentedLagrangian::default()),
            Self::Sqp => Box::new(Sqp::default()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown backend name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown optimizer backend `{0}` (expected `alm` or `sqp`)")]
pub struct ParseBackendKindError(String);

impl FromStr for BackendKind {
    type Err = ParseBackendKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alm" | "augmented-lagrangian" | "augmented_lagrangian" => {
                Ok(Self::AugmentedLagrangian)
            }
            "sqp" => Ok(Self::Sqp),
            _ => Err(ParseBackendKindError(s.to_string())),
        }
    }
}
