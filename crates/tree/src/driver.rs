//! Pieces shared by the scale, edge, and strain optimizers.

use std::fmt;

use crease_core::{
    Diagnostics, DifferentiableFn, DomainError, Linear, ProblemError, separation::separation,
};
use crease_solvers::{ConstrainedOptimizer, Solution, Status};
use thiserror::Error;

use crate::{Condition, EdgeId, LeafPath, NodeId, Point, Tree, TreeError};

/// Where a driver is in its lifecycle.
///
/// `Created → Initialized → Optimizing → Succeeded | Failed`. A driver is
/// initialized and optimized once; build a new one to run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Initialized,
    Optimizing,
    Succeeded,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::Initialized => "initialized",
            Phase::Optimizing => "optimizing",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors raised by the optimization drivers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot {operation} a driver that is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },

    #[error("nothing to optimize: {0}")]
    NothingToOptimize(&'static str),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Optimizer(#[from] crease_solvers::Error),

    #[error("optimization was stopped by an observer")]
    Stopped,

    #[error("scale {scale} is not above the minimum {minimum}")]
    ScaleTooSmall { scale: f64, minimum: f64 },
}

impl From<ProblemError> for Error {
    fn from(err: ProblemError) -> Self {
        Error::Optimizer(err.into())
    }
}

/// The outcome of a successful driver run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub solution: Solution,
    pub diagnostics: Diagnostics,

    /// Whether the tree was feasible after the result was written back.
    pub feasible: bool,
}

/// Tracks the driver phase and rejects out-of-order calls.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    phase: Phase,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Created,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn require(&self, expected: Phase, operation: &'static str) -> Result<(), Error> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                phase: self.phase,
            })
        }
    }

    pub(crate) fn advance(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Moves to `Succeeded` or `Failed` depending on `result`.
    pub(crate) fn finish<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        self.phase = if result.is_ok() {
            Phase::Succeeded
        } else {
            Phase::Failed
        };
        result
    }
}

/// Maps moving nodes to their coordinate variables.
///
/// Node `k` in [`moving`](Self::moving) owns variables `2k` and `2k + 1`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Layout {
    moving: Vec<NodeId>,
}

impl Layout {
    /// Keeps the unpinned leaves of `candidates`, dropping duplicates.
    pub(crate) fn new(
        tree: &Tree,
        candidates: impl IntoIterator<Item = NodeId>,
    ) -> Result<Self, Error> {
        let mut moving: Vec<NodeId> = Vec::new();
        for id in candidates {
            let node = tree.node(id).ok_or(TreeError::UnknownNode(id))?;
            if !node.is_pinned() && tree.is_leaf(id) && !moving.contains(&id) {
                moving.push(id);
            }
        }
        Ok(Self { moving })
    }

    pub(crate) fn moving(&self) -> &[NodeId] {
        &self.moving
    }

    pub(crate) fn num_coords(&self) -> usize {
        2 * self.moving.len()
    }

    pub(crate) fn index(&self, id: NodeId) -> Option<usize> {
        self.moving.iter().position(|&m| m == id).map(|k| 2 * k)
    }

    pub(crate) fn endpoint(&self, tree: &Tree, id: NodeId) -> Endpoint {
        match self.index(id) {
            Some(i) => Endpoint::Moving(i),
            None => Endpoint::Fixed(tree.node(id).map_or_else(Point::default, |n| n.location())),
        }
    }

    /// Appends the current node locations to `x`.
    pub(crate) fn start(&self, tree: &Tree, x: &mut Vec<f64>) {
        for &id in &self.moving {
            let p = tree.node(id).map_or_else(Point::default, |n| n.location());
            x.extend([p.x, p.y]);
        }
    }

    /// Appends coordinate bounds covering the paper.
    pub(crate) fn bounds(&self, tree: &Tree, lower: &mut Vec<f64>, upper: &mut Vec<f64>) {
        let paper = tree.paper();
        for _ in &self.moving {
            lower.extend([0.0, 0.0]);
            upper.extend([paper.width(), paper.height()]);
        }
    }

    /// Writes the solved coordinates back into the tree.
    pub(crate) fn write_back(&self, tree: &mut Tree, x: &[f64]) -> Result<(), TreeError> {
        for (k, &id) in self.moving.iter().enumerate() {
            tree.set_location(id, [x[2 * k], x[2 * k + 1]])?;
        }
        Ok(())
    }
}

/// One end of a leaf path: either a variable pair or a frozen location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Endpoint {
    Moving(usize),
    Fixed(Point),
}

impl Endpoint {
    fn at(self, x: &[f64]) -> [f64; 2] {
        match self {
            Endpoint::Moving(i) => [x[i], x[i + 1]],
            Endpoint::Fixed(p) => p.to_array(),
        }
    }

    fn is_moving(self) -> bool {
        matches!(self, Endpoint::Moving(_))
    }
}

/// The scale a path constraint uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Scale {
    Fixed(f64),
    Variable(usize),
}

/// `scale · (fixed_length + Σ length·(1 + x[strain])) − distance(a, b)`.
///
/// Non-positive when the leaf path is long enough. Every value is captured at
/// construction, so the function is independent of later edits to the tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathConstraint {
    a: Endpoint,
    b: Endpoint,
    scale: Scale,
    fixed_length: f64,
    strained: Vec<(usize, f64)>,
}

impl PathConstraint {
    /// Snapshots `path` from the tree.
    ///
    /// `strain_var` names the variable holding an edge's strain, or `None` if
    /// the edge keeps its current strain.
    pub(crate) fn new(
        tree: &Tree,
        layout: &Layout,
        path: &LeafPath,
        scale: Scale,
        strain_var: impl Fn(EdgeId) -> Option<usize>,
    ) -> Self {
        let mut fixed_length = 0.0;
        let mut strained = Vec::new();
        for &id in &path.edges {
            let Some(edge) = tree.edge(id) else { continue };
            match strain_var(id) {
                Some(var) => strained.push((var, edge.length())),
                None => fixed_length += edge.strained_length(),
            }
        }

        let [a, b] = path.nodes;
        Self {
            a: layout.endpoint(tree, a),
            b: layout.endpoint(tree, b),
            scale,
            fixed_length,
            strained,
        }
    }

    /// Returns true if the constraint depends on at least one variable.
    pub(crate) fn is_variable(&self) -> bool {
        self.a.is_moving()
            || self.b.is_moving()
            || matches!(self.scale, Scale::Variable(_))
            || !self.strained.is_empty()
    }

    fn length(&self, x: &[f64]) -> f64 {
        self.fixed_length
            + self
                .strained
                .iter()
                .map(|&(var, length)| length * (1.0 + x[var]))
                .sum::<f64>()
    }

    fn scale(&self, x: &[f64]) -> f64 {
        match self.scale {
            Scale::Fixed(s) => s,
            Scale::Variable(i) => x[i],
        }
    }
}

impl DifferentiableFn for PathConstraint {
    fn value(&self, x: &[f64]) -> Result<f64, DomainError> {
        let sep = separation(self.a.at(x), self.b.at(x));
        Ok(self.scale(x) * self.length(x) - sep.distance)
    }

    fn gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<(), DomainError> {
        let sep = separation(self.a.at(x), self.b.at(x));
        let [dx, dy] = sep.direction;
        if let Endpoint::Moving(i) = self.a {
            grad[i] -= dx;
            grad[i + 1] -= dy;
        }
        if let Endpoint::Moving(j) = self.b {
            grad[j] += dx;
            grad[j + 1] += dy;
        }

        let scale = self.scale(x);
        for &(var, length) in &self.strained {
            grad[var] += scale * length;
        }
        if let Scale::Variable(i) = self.scale {
            grad[i] += self.length(x);
        }
        Ok(())
    }
}

/// Adds one constraint per leaf path that depends on a variable.
///
/// Paths held by a [`Condition::PathActive`] become equalities.
pub(crate) fn add_path_constraints(
    optimizer: &mut ConstrainedOptimizer,
    tree: &Tree,
    layout: &Layout,
    scale: Scale,
    strain_var: impl Fn(EdgeId) -> Option<usize>,
) -> Result<usize, Error> {
    let mut count = 0;
    for path in tree.leaf_paths() {
        let constraint = PathConstraint::new(tree, layout, &path, scale, &strain_var);
        if !constraint.is_variable() {
            continue;
        }
        let [a, b] = path.nodes;
        if tree.is_path_active(a, b) {
            optimizer.add_nonlinear_equality(constraint)?;
        } else {
            optimizer.add_nonlinear_inequality(constraint)?;
        }
        count += 1;
    }
    Ok(count)
}

/// Adds the symmetry conditions that involve a moving node as linear equalities.
pub(crate) fn add_condition_constraints(
    optimizer: &mut ConstrainedOptimizer,
    tree: &Tree,
    layout: &Layout,
) -> Result<(), Error> {
    let line = tree.symmetry();
    let [nx, ny] = line.normal();
    let [ux, uy] = line.direction();
    let origin = line.point();
    let offset = nx * origin.x + ny * origin.y;

    for condition in tree.conditions() {
        match *condition {
            Condition::NodeOnSymmetryLine { node } => {
                if let Some(i) = layout.index(node) {
                    let on_line = Linear::new(-offset).term(i, nx).term(i + 1, ny);
                    optimizer.add_linear_equality(on_line)?;
                }
            }
            Condition::NodesPaired { a, b } => {
                let (ea, eb) = (layout.endpoint(tree, a), layout.endpoint(tree, b));
                if !(ea.is_moving() || eb.is_moving()) {
                    continue;
                }
                // The midpoint lies on the line and the offset a - b is
                // perpendicular to it. Frozen ends fold into the constants.
                let (mut mid_terms, mut across_terms) = (Vec::new(), Vec::new());
                let (mut mid_constant, mut across_constant) = (-2.0 * offset, 0.0);
                for (end, sign) in [(ea, 1.0), (eb, -1.0)] {
                    match end {
                        Endpoint::Moving(i) => {
                            mid_terms.extend([(i, nx), (i + 1, ny)]);
                            across_terms.extend([(i, sign * ux), (i + 1, sign * uy)]);
                        }
                        Endpoint::Fixed(p) => {
                            mid_constant += nx * p.x + ny * p.y;
                            across_constant += sign * (ux * p.x + uy * p.y);
                        }
                    }
                }
                let midpoint = mid_terms
                    .into_iter()
                    .fold(Linear::new(mid_constant), |f, (i, c)| f.term(i, c));
                let across = across_terms
                    .into_iter()
                    .fold(Linear::new(across_constant), |f, (i, c)| f.term(i, c));
                optimizer.add_linear_equality(midpoint)?;
                optimizer.add_linear_equality(across)?;
            }
            Condition::PathActive { .. }
            | Condition::EdgeLengthFixed { .. }
            | Condition::EdgesSameStrain { .. } => {}
        }
    }
    Ok(())
}

/// Adds the edge conditions that involve a strain variable as linear
/// equalities.
///
/// `strain_var` is the same mapping given to [`add_path_constraints`]. An edge
/// without a variable keeps its current strain. Returns the number of
/// equalities added.
pub(crate) fn add_strain_conditions(
    optimizer: &mut ConstrainedOptimizer,
    tree: &Tree,
    strain_var: impl Fn(EdgeId) -> Option<usize>,
) -> Result<usize, Error> {
    let current = |id: EdgeId| tree.edge(id).map_or(0.0, |edge| edge.strain());
    let mut count = 0;
    for condition in tree.conditions() {
        let equality = match *condition {
            Condition::EdgeLengthFixed { edge } => {
                strain_var(edge).map(|var| Linear::new(0.0).term(var, 1.0))
            }
            Condition::EdgesSameStrain { a, b } => match (strain_var(a), strain_var(b)) {
                (Some(va), Some(vb)) if va != vb => {
                    Some(Linear::new(0.0).term(va, 1.0).term(vb, -1.0))
                }
                (Some(var), None) => Some(Linear::new(-current(b)).term(var, 1.0)),
                (None, Some(var)) => Some(Linear::new(-current(a)).term(var, 1.0)),
                _ => None,
            },
            Condition::NodeOnSymmetryLine { .. }
            | Condition::NodesPaired { .. }
            | Condition::PathActive { .. } => None,
        };
        if let Some(equality) = equality {
            optimizer.add_linear_equality(equality)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Converts a finished run into a result, rejecting an observer stop.
pub(crate) fn check_status(solution: &Solution) -> Result<(), Error> {
    match solution.status {
        Status::Converged => Ok(()),
        Status::StoppedByObserver => Err(Error::Stopped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use crease_core::check;
    use crease_solvers::BackendKind;

    use crate::SymmetryLine;

    /// `a - hub - b` with `a` pinned at the origin.
    fn pinned_pair() -> (Tree, [NodeId; 3], [EdgeId; 2]) {
        let mut tree = Tree::default();
        let hub = tree.add_node([0.5, 0.5]);
        let a = tree.add_node([0.0, 0.0]);
        let b = tree.add_node([0.3, 0.4]);
        let ea = tree.add_edge(hub, a, 1.0).unwrap();
        let eb = tree.add_edge(hub, b, 2.0).unwrap();
        tree.set_pinned(a, true).unwrap();
        (tree, [hub, a, b], [ea, eb])
    }

    #[test]
    fn layout_skips_pinned_internal_and_repeated_nodes() {
        let (tree, [hub, a, b], _) = pinned_pair();
        let layout = Layout::new(&tree, [hub, a, b, b]).unwrap();

        assert_eq!(layout.moving(), &[b]);
        assert_eq!(layout.index(b), Some(0));
        assert_eq!(layout.endpoint(&tree, a), Endpoint::Fixed(Point::new(0.0, 0.0)));
        assert!(Layout::new(&tree, [NodeId(7)]).is_err());
    }

    #[test]
    fn path_constraint_value_and_gradient() {
        let (tree, [_, a, b], [_, eb]) = pinned_pair();
        let layout = Layout::new(&tree, [b]).unwrap();
        let path = LeafPath {
            nodes: [a, b],
            edges: tree.path(a, b).unwrap(),
        };

        // x = [bx, by, scale, strain of eb]
        let f = PathConstraint::new(&tree, &layout, &path, Scale::Variable(2), |id| {
            (id == eb).then_some(3)
        });
        let x = [0.3, 0.4, 0.5, 0.25];
        assert_relative_eq!(f.value(&x).unwrap(), 0.5 * (1.0 + 2.0 * 1.25) - 0.5);
        assert!(check::gradient(&f, &x, 1e-6).unwrap().passes(1e-6));
        assert!(f.is_variable());
    }

    #[test]
    fn frozen_paths_are_not_variable() {
        let (tree, [_, a, b], _) = pinned_pair();
        let layout = Layout::default();
        let path = LeafPath {
            nodes: [a, b],
            edges: tree.path(a, b).unwrap(),
        };

        let f = PathConstraint::new(&tree, &layout, &path, Scale::Fixed(0.1), |_| None);
        assert!(!f.is_variable());
        assert_relative_eq!(f.value(&[]).unwrap(), 0.1 * 3.0 - 0.5);
    }

    #[test]
    fn active_paths_become_equalities() {
        let (mut tree, [_, a, b], _) = pinned_pair();
        tree.add_condition(Condition::PathActive { a, b }).unwrap();
        let layout = Layout::new(&tree, [b]).unwrap();

        let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
        optimizer.set_size(2);
        let count =
            add_path_constraints(&mut optimizer, &tree, &layout, Scale::Fixed(0.1), |_| None)
                .unwrap();

        assert_eq!(count, 1);
        assert_eq!(optimizer.constraints().num_equalities(), 1);
        assert_eq!(optimizer.constraints().num_inequalities(), 0);
    }

    #[test]
    fn pairing_with_a_fixed_node_folds_into_constants() {
        let (mut tree, [_, a, b], _) = pinned_pair();
        tree.add_condition(Condition::NodesPaired { a, b }).unwrap();
        tree.add_condition(Condition::NodeOnSymmetryLine { node: a }).unwrap();
        let layout = Layout::new(&tree, [b]).unwrap();

        let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
        optimizer.set_size(2);
        add_condition_constraints(&mut optimizer, &tree, &layout).unwrap();

        // Only the pairing involves a moving node: x_b = 1 and y_b = 0.
        let equalities: Vec<_> = optimizer.constraints().equalities().collect();
        assert_eq!(equalities.len(), 2);
        assert_relative_eq!(equalities[0].value(&[1.0, 0.0]).unwrap(), 0.0);
        assert_relative_eq!(equalities[1].value(&[1.0, 0.0]).unwrap(), 0.0);
        assert_relative_eq!(equalities[1].value(&[1.0, 0.3]).unwrap(), -0.3);
    }

    #[test]
    fn pairing_follows_a_rotated_symmetry_line() {
        let (mut tree, [_, a, b], _) = pinned_pair();
        let line = SymmetryLine::new([0.5, 0.25], 0.0).unwrap();
        tree.set_symmetry(line);
        tree.add_condition(Condition::NodesPaired { a, b }).unwrap();
        let layout = Layout::new(&tree, [b]).unwrap();

        let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
        optimizer.set_size(2);
        add_condition_constraints(&mut optimizer, &tree, &layout).unwrap();

        // The mirror of the origin about y = 0.25 satisfies both equalities.
        let mirror = line.reflect(Point::new(0.0, 0.0));
        assert_relative_eq!(mirror.y, 0.5);
        let x = mirror.to_array();
        for f in optimizer.constraints().equalities() {
            assert_relative_eq!(f.value(&x).unwrap(), 0.0, epsilon = 1e-12);
        }
        let off: Vec<f64> = optimizer
            .constraints()
            .equalities()
            .map(|f| f.value(&[0.0, 0.4]).unwrap())
            .collect();
        assert!(off.iter().any(|v| v.abs() > 1e-3));
    }

    #[test]
    fn on_line_condition_uses_the_line_normal() {
        let (mut tree, [_, _, b], _) = pinned_pair();
        let angle = std::f64::consts::FRAC_PI_4;
        tree.set_symmetry(SymmetryLine::new([0.5, 0.5], angle).unwrap());
        tree.add_condition(Condition::NodeOnSymmetryLine { node: b }).unwrap();
        let layout = Layout::new(&tree, [b]).unwrap();

        let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
        optimizer.set_size(2);
        add_condition_constraints(&mut optimizer, &tree, &layout).unwrap();

        let on_line: Vec<_> = optimizer.constraints().equalities().collect();
        assert_eq!(on_line.len(), 1);
        assert_relative_eq!(on_line[0].value(&[0.2, 0.2]).unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            on_line[0].value(&[0.0, 1.0]).unwrap(),
            tree.symmetry().offset(Point::new(0.0, 1.0)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn strain_conditions_tie_variables_and_frozen_edges() {
        let (mut tree, [hub, a, _], [ea, eb]) = pinned_pair();
        let c = tree.add_node([0.9, 0.9]);
        let ec = tree.add_edge(hub, c, 1.0).unwrap();
        tree.set_strain(ec, 0.2).unwrap();
        tree.add_condition(Condition::EdgeLengthFixed { edge: ea }).unwrap();
        tree.add_condition(Condition::EdgesSameStrain { a: ea, b: eb }).unwrap();
        tree.add_condition(Condition::EdgesSameStrain { a: ec, b: eb }).unwrap();
        tree.add_condition(Condition::NodeOnSymmetryLine { node: a }).unwrap();

        // ea -> x[0], eb -> x[1], ec keeps its strain.
        let vars = [ea, eb];
        let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
        optimizer.set_size(2);
        let count = add_strain_conditions(&mut optimizer, &tree, |id| {
            vars.iter().position(|&v| v == id)
        })
        .unwrap();

        assert_eq!(count, 3);
        let x = [0.0, 0.2];
        let values: Vec<f64> = optimizer
            .constraints()
            .equalities()
            .map(|f| f.value(&x).unwrap())
            .collect();
        assert_relative_eq!(values[0], 0.0);
        assert_relative_eq!(values[1], -0.2);
        assert_relative_eq!(values[2], 0.0);
    }

    #[test]
    fn strain_conditions_skip_edges_without_variables() {
        let (mut tree, _, [ea, eb]) = pinned_pair();
        tree.add_condition(Condition::EdgeLengthFixed { edge: ea }).unwrap();
        tree.add_condition(Condition::EdgesSameStrain { a: ea, b: eb }).unwrap();

        // One shared variable for both edges, as in the edge optimizer.
        let mut optimizer = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
        optimizer.set_size(1);
        assert_eq!(add_strain_conditions(&mut optimizer, &tree, |_| Some(0)).unwrap(), 1);

        let mut frozen = ConstrainedOptimizer::from_kind(BackendKind::Sqp);
        frozen.set_size(1);
        assert_eq!(add_strain_conditions(&mut frozen, &tree, |_| None).unwrap(), 0);
    }

    #[test]
    fn lifecycle_rejects_out_of_order_calls() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.require(Phase::Created, "initialize").is_ok());

        let err = lifecycle.require(Phase::Initialized, "optimize").unwrap_err();
        assert_eq!(err.to_string(), "cannot optimize a driver that is created");

        lifecycle.advance(Phase::Optimizing);
        let failed: Result<(), Error> = lifecycle.finish(Err(Error::Stopped));
        assert!(failed.is_err());
        assert_eq!(lifecycle.phase(), Phase::Failed);
    }
}
