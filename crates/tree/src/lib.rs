//! The tree model and the drivers that optimize it.
//!
//! A [`Tree`] describes the stick figure of an origami base: weighted edges
//! whose leaves are laid out on a sheet of [`Paper`]. Three drivers build a
//! constrained problem from a tree, hand it to a
//! [`Backend`](crease_solvers::Backend), and write the result back:
//!
//! - [`ScaleOptimizer`] finds the largest scale at which the free leaves fit
//! - [`EdgeOptimizer`] stretches chosen edges by a common strain at a fixed scale
//! - [`StrainOptimizer`] finds the least stiffness-weighted strain that makes
//!   a layout feasible at a fixed scale
//!
//! # Example
//!
//! ```
//! use crease_solvers::BackendKind;
//! use crease_tree::{ScaleOptimizer, Tree};
//!
//! let mut tree = Tree::default();
//! let hub = tree.add_node([0.5, 0.5]);
//! let a = tree.add_node([0.3, 0.4]);
//! let b = tree.add_node([0.6, 0.7]);
//! tree.add_edge(hub, a, 1.0)?;
//! tree.add_edge(hub, b, 1.0)?;
//!
//! let mut driver = ScaleOptimizer::new(&mut tree, BackendKind::Sqp.build());
//! driver.initialize()?;
//! let report = driver.optimize()?;
//! assert!(report.feasible);
//!
//! // The leaves end up in opposite corners.
//! assert!((tree.scale() - 0.5_f64.sqrt()).abs() < 1e-6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod driver;
mod edge;
mod error;
mod scale;
mod strain;
mod tree;

pub use config::{ConfigError, ScaleConfig, StrainConfig};
pub use driver::{Error, Phase, Report};
pub use edge::EdgeOptimizer;
pub use error::TreeError;
pub use scale::ScaleOptimizer;
pub use strain::StrainOptimizer;
pub use tree::{
    Condition, Edge, EdgeId, FEASIBILITY_TOL, LeafPath, Node, NodeId, Paper, Point,
    SymmetryLine, Tree,
};
