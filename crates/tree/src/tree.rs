//! The tree model the drivers read from and write back to.
//!
//! A [`Tree`] is a forest of weighted edges whose leaf nodes carry positions
//! on a rectangular sheet of [`Paper`]. Every pair of leaves joined by a path
//! must be at least `scale · Σ length·(1 + strain)` apart; that is the
//! feasibility condition the drivers optimize against.

use std::{collections::VecDeque, fmt};

use crate::TreeError;


/// Absolute tolerance, relative to the scale, used by feasibility checks.
pub const FEASIBILITY_TOL: f64 = 1e-6;

/// Identifies a node of a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub(crate) usize);

/// Identifies an edge of a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeId(pub(crate) usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl EdgeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge {}", self.0)
    }
}

/// A location on the paper.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    #[must_use]
    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// The rectangular sheet the tree is laid out on.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Paper {
    width: f64,
    height: f64,
}

impl Default for Paper {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
        }
    }
}

impl Paper {
    /// Creates a sheet of the given size.
    ///
    /// # Errors
    ///
    /// Fails unless both dimensions are finite and positive.
    pub fn new(width: f64, height: f64) -> Result<Self, TreeError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(TreeError::InvalidPaper { width, height });
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.width.hypot(self.height)
    }

    /// Returns true if `p` lies on the sheet.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        (0.0..=self.width).contains(&p.x) && (0.0..=self.height).contains(&p.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    location: Point,
    pinned: bool,
}

impl Node {
    #[must_use]
    pub fn location(&self) -> Point {
        self.location
    }

    /// Pinned nodes never move during optimization.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    nodes: [NodeId; 2],
    length: f64,
    strain: f64,
    stiffness: f64,
}

impl Edge {
    #[must_use]
    pub fn nodes(&self) -> [NodeId; 2] {
        self.nodes
    }

    /// Unstrained length in tree units.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Relative stretch; the effective length is `length · (1 + strain)`.
    #[must_use]
    pub fn strain(&self) -> f64 {
        self.strain
    }

    #[must_use]
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    #[must_use]
    pub fn strained_length(&self) -> f64 {
        self.length * (1.0 + self.strain)
    }
}

/// The line of mirror symmetry used by symmetry conditions.
///
/// Defined by a point on the line and the angle of the line from the x axis,
/// in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymmetryLine {
    point: Point,
    angle: f64,
}

impl SymmetryLine {
    /// # Errors
    ///
    /// Fails unless the point and the angle are finite.
    pub fn new(point: impl Into<Point>, angle: f64) -> Result<Self, TreeError> {
        let point = point.into();
        if !(point.x.is_finite() && point.y.is_finite() && angle.is_finite()) {
            return Err(TreeError::InvalidSymmetryLine {
                x: point.x,
                y: point.y,
                angle,
            });
        }
        Ok(Self { point, angle })
    }

    /// The vertical line through the middle of `paper`.
    #[must_use]
    pub fn centre(paper: &Paper) -> Self {
        Self {
            point: Point::new(0.5 * paper.width(), 0.5 * paper.height()),
            angle: std::f64::consts::FRAC_PI_2,
        }
    }

    #[must_use]
    pub fn point(&self) -> Point {
        self.point
    }

    #[must_use]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Unit vector along the line.
    #[must_use]
    pub fn direction(&self) -> [f64; 2] {
        let (sin, cos) = self.angle.sin_cos();
        [cos, sin]
    }

    /// Unit vector perpendicular to the line.
    #[must_use]
    pub fn normal(&self) -> [f64; 2] {
        let (sin, cos) = self.angle.sin_cos();
        [-sin, cos]
    }

    /// Signed distance of `p` from the line.
    #[must_use]
    pub fn offset(&self, p: Point) -> f64 {
        let [nx, ny] = self.normal();
        (p.x - self.point.x) * nx + (p.y - self.point.y) * ny
    }

    /// Mirror image of `p`.
    #[must_use]
    pub fn reflect(&self, p: Point) -> Point {
        let [nx, ny] = self.normal();
        let d = 2.0 * self.offset(p);
        Point::new(p.x - d * nx, p.y - d * ny)
    }
}

/// A constraint placed on the layout by the designer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Condition {
    /// The node sits on the tree's [`SymmetryLine`].
    NodeOnSymmetryLine { node: NodeId },

    /// The two nodes mirror each other about the tree's [`SymmetryLine`].
    NodesPaired { a: NodeId, b: NodeId },

    /// The path between two leaves is held at exactly its minimum length.
    PathActive { a: NodeId, b: NodeId },

    /// The edge keeps its unstrained length when its strain is optimized.
    EdgeLengthFixed { edge: EdgeId },

    /// The two edges always carry the same strain.
    EdgesSameStrain { a: EdgeId, b: EdgeId },
}

/// The path joining two leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafPath {
    pub nodes: [NodeId; 2],
    pub edges: Vec<EdgeId>,
}

impl LeafPath {
    /// Returns `Σ length·(1 + strain)` over the path's edges.
    #[must_use]
    pub fn min_length(&self, tree: &Tree) -> f64 {
        self.edges
            .iter()
            .map(|&e| tree.edges[e.0].strained_length())
            .sum()
    }

    /// Returns the distance between the two leaves on the paper.
    #[must_use]
    pub fn distance(&self, tree: &Tree) -> f64 {
        let [a, b] = self.nodes;
        tree.nodes[a.0].location.distance(tree.nodes[b.0].location)
    }

    /// Returns `distance − scale · min_length`, negative when violated.
    #[must_use]
    pub fn slack(&self, tree: &Tree) -> f64 {
        self.distance(tree) - tree.scale * self.min_length(tree)
    }
}

/// A tree of weighted edges laid out on paper.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    paper: Paper,
    scale: f64,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    conditions: Vec<Condition>,
    symmetry: SymmetryLine,
    adjacency: Vec<Vec<(NodeId, EdgeId)>>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(Paper::default())
    }
}

impl Tree {
    /// Creates an empty tree with scale 1, symmetric about the vertical
    /// centre line of the paper.
    #[must_use]
    pub fn new(paper: Paper) -> Self {
        Self {
            paper,
            scale: 1.0,
            nodes: Vec::new(),
            edges: Vec::new(),
            conditions: Vec::new(),
            symmetry: SymmetryLine::centre(&paper),
            adjacency: Vec::new(),
        }
    }

    /// Adds an unpinned node.
    pub fn add_node(&mut self, location: impl Into<Point>) -> NodeId {
        self.nodes.push(Node {
            location: location.into(),
            pinned: false,
        });
        self.adjacency.push(Vec::new());
        NodeId(self.nodes.len() - 1)
    }

    /// Joins two nodes with an unstrained edge of stiffness 1.
    ///
    /// # Errors
    ///
    /// Fails if either node is unknown, the nodes are equal or already
    /// connected, or `length` is not finite and positive.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId, length: f64) -> Result<EdgeId, TreeError> {
        self.check_node(a)?;
        self.check_node(b)?;
        if a == b {
            return Err(TreeError::SelfLoop(a));
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(TreeError::NonPositiveLength(length));
        }
        if self.path(a, b).is_some() {
            return Err(TreeError::Cycle { a, b });
        }

        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            nodes: [a, b],
            length,
            strain: 0.0,
            stiffness: 1.0,
        });
        self.adjacency[a.0].push((b, id));
        self.adjacency[b.0].push((a, id));
        Ok(id)
    }

    /// Adds a condition on the layout.
    ///
    /// # Errors
    ///
    /// Fails if a node or edge is unknown, or a [`Condition::PathActive`]
    /// does not name two leaves joined by a path.
    pub fn add_condition(&mut self, condition: Condition) -> Result<(), TreeError> {
        match condition {
            Condition::EdgeLengthFixed { edge } => self.check_edge(edge)?,
            Condition::EdgesSameStrain { a, b } => {
                self.check_edge(a)?;
                self.check_edge(b)?;
            }
            Condition::NodeOnSymmetryLine { node } => self.check_node(node)?,
            Condition::NodesPaired { a, b } => {
                self.check_node(a)?;
                self.check_node(b)?;
            }
            Condition::PathActive { a, b } => {
                self.check_node(a)?;
                self.check_node(b)?;
                if a == b || !self.is_leaf(a) || !self.is_leaf(b) || self.path(a, b).is_none() {
                    return Err(TreeError::NotALeafPath { a, b });
                }
            }
        }
        self.conditions.push(condition);
        Ok(())
    }

    /// Moves the line that symmetry conditions refer to.
    pub fn set_symmetry(&mut self, line: SymmetryLine) {
        self.symmetry = line;
    }

    /// Pins or unpins a node.
    ///
    /// # Errors
    ///
    /// Fails if the node is unknown.
    pub fn set_pinned(&mut self, id: NodeId, pinned: bool) -> Result<(), TreeError> {
        self.node_mut(id)?.pinned = pinned;
        Ok(())
    }

    /// Moves a node.
    ///
    /// # Errors
    ///
    /// Fails if the node is unknown or the location is not finite.
    pub fn set_location(
        &mut self,
        id: NodeId,
        location: impl Into<Point>,
    ) -> Result<(), TreeError> {
        let location = location.into();
        if !(location.x.is_finite() && location.y.is_finite()) {
            return Err(TreeError::NonFiniteLocation {
                x: location.x,
                y: location.y,
            });
        }
        self.node_mut(id)?.location = location;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the edge is unknown or `stiffness` is not finite and positive.
    pub fn set_stiffness(&mut self, id: EdgeId, stiffness: f64) -> Result<(), TreeError> {
        if !stiffness.is_finite() || stiffness <= 0.0 {
            return Err(TreeError::NonPositiveStiffness(stiffness));
        }
        self.edge_mut(id)?.stiffness = stiffness;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the edge is unknown or `strain` is not finite and above -1.
    pub fn set_strain(&mut self, id: EdgeId, strain: f64) -> Result<(), TreeError> {
        if !strain.is_finite() || strain <= -1.0 {
            return Err(TreeError::InvalidStrain(strain));
        }
        self.edge_mut(id)?.strain = strain;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless `scale` is finite and positive.
    pub fn set_scale(&mut self, scale: f64) -> Result<(), TreeError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(TreeError::NonPositiveScale(scale));
        }
        self.scale = scale;
        Ok(())
    }

    #[must_use]
    pub fn paper(&self) -> &Paper {
        &self.paper
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Returns every node id in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Returns every edge id in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).map(EdgeId)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }

    #[must_use]
    pub fn symmetry(&self) -> &SymmetryLine {
        &self.symmetry
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns true if the node has exactly one edge.
    #[must_use]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.adjacency.get(id.0).is_some_and(|adj| adj.len() == 1)
    }

    pub fn leaf_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().filter(move |&id| self.is_leaf(id))
    }

    /// Returns the edges joining `a` to `b`, or `None` if they are not
    /// connected. The path from a node to itself is empty.
    #[must_use]
    pub fn path(&self, a: NodeId, b: NodeId) -> Option<Vec<EdgeId>> {
        if a.0 >= self.nodes.len() || b.0 >= self.nodes.len() {
            return None;
        }

        let mut parent: Vec<Option<(NodeId, EdgeId)>> = vec![None; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([a]);
        visited[a.0] = true;

        while let Some(node) = queue.pop_front() {
            if node == b {
                let mut edges = Vec::new();
                let mut current = b;
                while let Some((prev, edge)) = parent[current.0] {
                    edges.push(edge);
                    current = prev;
                }
                edges.reverse();
                return Some(edges);
            }
            for &(next, edge) in &self.adjacency[node.0] {
                if !visited[next.0] {
                    visited[next.0] = true;
                    parent[next.0] = Some((node, edge));
                    queue.push_back(next);
                }
            }
        }

        None
    }

    /// Returns the path between every connected pair of leaves, ordered by
    /// the first leaf and then the second.
    #[must_use]
    pub fn leaf_paths(&self) -> Vec<LeafPath> {
        let leaves: Vec<NodeId> = self.leaf_nodes().collect();
        let mut paths = Vec::new();
        for (i, &a) in leaves.iter().enumerate() {
            for &b in &leaves[i + 1..] {
                if let Some(edges) = self.path(a, b) {
                    paths.push(LeafPath {
                        nodes: [a, b],
                        edges,
                    });
                }
            }
        }
        paths
    }

    /// Returns true if `a` and `b` are held by a [`Condition::PathActive`].
    #[must_use]
    pub fn is_path_active(&self, a: NodeId, b: NodeId) -> bool {
        self.conditions.iter().any(|c| match *c {
            Condition::PathActive { a: p, b: q } => (p, q) == (a, b) || (p, q) == (b, a),
            _ => false,
        })
    }

    /// Returns true if every leaf path is long enough at the current scale
    /// and every active path is exactly at its minimum length.
    #[must_use]
    pub fn is_feasible(&self) -> bool {
        let tol = FEASIBILITY_TOL * self.scale;
        self.leaf_paths().iter().all(|path| {
            let slack = path.slack(self);
            let [a, b] = path.nodes;
            slack >= -tol && (!self.is_path_active(a, b) || slack <= tol)
        })
    }

    fn check_node(&self, id: NodeId) -> Result<(), TreeError> {
        self.node(id).map(|_| ()).ok_or(TreeError::UnknownNode(id))
    }

    fn check_edge(&self, id: EdgeId) -> Result<(), TreeError> {
        self.edge(id).map(|_| ()).ok_or(TreeError::UnknownEdge(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(id.0).ok_or(TreeError::UnknownNode(id))
    }

    fn edge_mut(&mut self, id: EdgeId) -> Result<&mut Edge, TreeError> {
        self.edges.get_mut(id.0).ok_or(TreeError::UnknownEdge(id))
    }
}
