//! Stretches a set of edges by a common strain as far as the layout allows.

use crease_core::{Linear, Observer};
use crease_solvers::{Action, Backend, ConstrainedOptimizer, Event};
use tracing::{info, warn};

use crate::{
    EdgeId, Error, NodeId, Phase, Report, StrainConfig, Tree, TreeError,
    driver::{self, Layout, Lifecycle, Scale},
};

/// Maximizes one strain shared by every stretchy edge at the current scale.
///
/// The chosen moving leaves are free to move; every other node stays put.
pub struct EdgeOptimizer<'t> {
    tree: &'t mut Tree,
    optimizer: ConstrainedOptimizer,
    config: StrainConfig,
    lifecycle: Lifecycle,
    layout: Layout,
    stretchy: Vec<EdgeId>,
    start: Vec<f64>,
    report: Option<Report>,
}

impl<'t> EdgeOptimizer<'t> {
    pub fn new(tree: &'t mut Tree, backend: Box<dyn Backend>) -> Self {
        Self {
            tree,
            optimizer: ConstrainedOptimizer::new(backend),
            config: StrainConfig::default(),
            lifecycle: Lifecycle::new(),
            layout: Layout::default(),
            stretchy: Vec::new(),
            start: Vec::new(),
            report: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: StrainConfig) -> Self {
        self.config = config;
        self
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn optimizer(&self) -> &ConstrainedOptimizer {
        &self.optimizer
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    /// Builds the problem for the given moving nodes and stretchy edges.
    ///
    /// Pinned and internal nodes in `moving` stay where they are.
    ///
    /// # Errors
    ///
    /// Fails if the driver was already initialized, an id is unknown, or
    /// `stretchy` is empty.
    pub fn initialize(&mut self, moving: &[NodeId], stretchy: &[EdgeId]) -> Result<(), Error> {
        self.lifecycle.require(Phase::Created, "initialize")?;
        match self.build(moving, stretchy) {
            Ok(()) => {
                self.lifecycle.advance(Phase::Initialized);
                Ok(())
            }
            Err(err) => {
                self.lifecycle.advance(Phase::Failed);
                Err(err)
            }
        }
    }

    fn build(&mut self, moving: &[NodeId], stretchy: &[EdgeId]) -> Result<(), Error> {
        let tree = &*self.tree;
        let stretchy = known_edges(tree, stretchy)?;
        if stretchy.is_empty() {
            return Err(Error::NothingToOptimize("no stretchy edges"));
        }

        let layout = Layout::new(tree, moving.iter().copied())?;
        let strain_var = layout.num_coords();

        let (mut lower, mut upper) = (Vec::new(), Vec::new());
        layout.bounds(tree, &mut lower, &mut upper);
        lower.push(self.config.min_strain());
        upper.push(self.config.max_strain());

        // Start from the mean strain of the stretchy edges.
        let mean = stretchy
            .iter()
            .filter_map(|&id| tree.edge(id))
            .map(|edge| edge.strain())
            .sum::<f64>()
            / stretchy.len() as f64;
        let mut start = Vec::with_capacity(strain_var + 1);
        layout.start(tree, &mut start);
        start.push(self.config.clamp(mean));

        self.optimizer.set_size(strain_var + 1);
        self.optimizer.set_bounds(lower, upper)?;
        self.optimizer
            .set_objective(Linear::new(0.0).term(strain_var, -1.0))?;
        driver::add_path_constraints(
            &mut self.optimizer,
            tree,
            &layout,
            Scale::Fixed(tree.scale()),
            |id| stretchy.contains(&id).then_some(strain_var),
        )?;
        driver::add_condition_constraints(&mut self.optimizer, tree, &layout)?;
        driver::add_strain_conditions(&mut self.optimizer, tree, |id| {
            stretchy.contains(&id).then_some(strain_var)
        })?;

        self.layout = layout;
        self.stretchy = stretchy;
        self.start = start;
        Ok(())
    }

    /// Runs the optimization and writes positions and strains back on success.
    ///
    /// # Errors
    ///
    /// Fails if the driver is not initialized or the backend fails.
    pub fn optimize(&mut self) -> Result<Report, Error> {
        self.optimize_observed(())
    }

    /// # Errors
    ///
    /// See [`optimize`](Self::optimize). A stop requested by the observer is
    /// [`Error::Stopped`].
    pub fn optimize_observed<O>(&mut self, observer: O) -> Result<Report, Error>
    where
        O: for<'a> Observer<Event<'a>, Action>,
    {
        self.lifecycle.require(Phase::Initialized, "optimize")?;
        self.lifecycle.advance(Phase::Optimizing);

        let result = self.run(observer);
        match &result {
            Ok(report) => info!(
                strain = -report.solution.objective,
                moving = self.layout.moving().len(),
                feasible = report.feasible,
                diagnostics = %report.diagnostics,
                "edge optimization succeeded"
            ),
            Err(err) => warn!(%err, "edge optimization failed"),
        }
        self.lifecycle.finish(result)
    }

    fn run<O>(&mut self, observer: O) -> Result<Report, Error>
    where
        O: for<'a> Observer<Event<'a>, Action>,
    {
        let mut x = self.start.clone();
        let solution = self.optimizer.minimize(&mut x, observer)?;
        driver::check_status(&solution)?;

        self.layout.write_back(self.tree, &x)?;
        let strain = x[self.layout.num_coords()];
        for &id in &self.stretchy {
            self.tree.set_strain(id, strain)?;
        }

        let report = Report {
            solution,
            diagnostics: self.optimizer.diagnostics(),
            feasible: self.tree.is_feasible(),
        };
        self.report = Some(report);
        Ok(report)
    }
}

/// Checks every id and drops duplicates, keeping the first occurrence.
pub(crate) fn known_edges(tree: &Tree, edges: &[EdgeId]) -> Result<Vec<EdgeId>, TreeError> {
    let mut known = Vec::with_capacity(edges.len());
    for &id in edges {
        tree.edge(id).ok_or(TreeError::UnknownEdge(id))?;
        if !known.contains(&id) {
            known.push(id);
        }
    }
    Ok(known)
}
