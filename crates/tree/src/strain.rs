//! Finds the least-distorting strains that make a layout feasible.

use crease_core::{DifferentiableFn, DomainError, Observer};
use crease_solvers::{Action, Backend, ConstrainedOptimizer, Event};
use tracing::{info, warn};

use crate::{
    EdgeId, Error, NodeId, Phase, Report, StrainConfig, Tree,
    driver::{self, Layout, Lifecycle, Scale},
    edge::known_edges,
};

/// Minimizes the stiffness-weighted mean square strain at the current scale.
///
/// Each stretchy edge gets its own strain variable. Stiffer edges resist
/// strain more.
pub struct StrainOptimizer<'t> {
    tree: &'t mut Tree,
    optimizer: ConstrainedOptimizer,
    config: StrainConfig,
    lifecycle: Lifecycle,
    layout: Layout,
    stretchy: Vec<EdgeId>,
    start: Vec<f64>,
    report: Option<Report>,
}

/// `Σ stiffness · x[var]² / count`.
#[derive(Debug, Clone, PartialEq)]
struct WeightedSquares {
    terms: Vec<(usize, f64)>,
}

impl DifferentiableFn for WeightedSquares {
    fn value(&self, x: &[f64]) -> Result<f64, DomainError> {
        let sum: f64 = self.terms.iter().map(|&(i, k)| k * x[i] * x[i]).sum();
        Ok(sum / self.terms.len() as f64)
    }

    fn gradient(&self, x: &[f64], grad: &mut [f64]) -> Result<(), DomainError> {
        let count = self.terms.len() as f64;
        for &(i, k) in &self.terms {
            grad[i] += 2.0 * k * x[i] / count;
        }
        Ok(())
    }
}

impl<'t> StrainOptimizer<'t> {
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
        let first = layout.num_coords();
        let n = first + stretchy.len();

        let (mut lower, mut upper) = (Vec::new(), Vec::new());
        layout.bounds(tree, &mut lower, &mut upper);
        lower.resize(n, self.config.min_strain());
        upper.resize(n, self.config.max_strain());

        let mut start = Vec::with_capacity(n);
        layout.start(tree, &mut start);
        let mut terms = Vec::with_capacity(stretchy.len());
        for (k, &id) in stretchy.iter().enumerate() {
            let Some(edge) = tree.edge(id) else { continue };
            start.push(self.config.clamp(edge.strain()));
            terms.push((first + k, edge.stiffness()));
        }

        self.optimizer.set_size(n);
        self.optimizer.set_bounds(lower, upper)?;
        self.optimizer.set_objective(WeightedSquares { terms })?;
        driver::add_path_constraints(
            &mut self.optimizer,
            tree,
            &layout,
            Scale::Fixed(tree.scale()),
            |id| stretchy.iter().position(|&s| s == id).map(|k| first + k),
        )?;
        driver::add_condition_constraints(&mut self.optimizer, tree, &layout)?;
        driver::add_strain_conditions(&mut self.optimizer, tree, |id| {
            stretchy.iter().position(|&s| s == id).map(|k| first + k)
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
                rms_strain = report.solution.objective.sqrt(),
                moving = self.layout.moving().len(),
                feasible = report.feasible,
                diagnostics = %report.diagnostics,
                "strain optimization succeeded"
            ),
            Err(err) => warn!(%err, "strain optimization failed"),
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
        let first = self.layout.num_coords();
        for (k, &id) in self.stretchy.iter().enumerate() {
            self.tree.set_strain(id, x[first + k])?;
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
