use thiserror::Error;

use crate::{EdgeId, NodeId};

/// Errors raised when building or editing a [`Tree`](crate::Tree).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("{0} does not exist")]
    UnknownNode(NodeId),

    #[error("{0} does not exist")]
    UnknownEdge(EdgeId),

    #[error("an edge cannot join {0} to itself")]
    SelfLoop(NodeId),

    #[error("an edge between {a} and {b} would close a cycle")]
    Cycle { a: NodeId, b: NodeId },

    #[error("edge length must be finite and positive, got {0}")]
    NonPositiveLength(f64),

    #[error("edge stiffness must be finite and positive, got {0}")]
    NonPositiveStiffness(f64),

    #[error("edge strain must be finite and greater than -1, got {0}")]
    InvalidStrain(f64),

    #[error("scale must be finite and positive, got {0}")]
    NonPositiveScale(f64),

    #[error("node location must be finite, got ({x}, {y})")]
    NonFiniteLocation { x: f64, y: f64 },

    #[error("paper must have finite positive dimensions, got {width} x {height}")]
    InvalidPaper { width: f64, height: f64 },

    #[error("symmetry line must be finite, got ({x}, {y}) at angle {angle}")]
    InvalidSymmetryLine { x: f64, y: f64, angle: f64 },

    #[error("{a} and {b} are not two leaves joined by a path")]
    NotALeafPath { a: NodeId, b: NodeId },
}
