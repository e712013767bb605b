//! Maximizes the scale of a tree by moving its free leaves.

use crease_core::{Linear, Observer};
use crease_solvers::{Action, Backend, ConstrainedOptimizer, Event};
use tracing::{info, warn};

use crate::{
    Error, Phase, Report, ScaleConfig, Tree,
    driver::{self, Layout, Lifecycle, Scale},
};

/// Relative margin above the minimum scale that a successful run must clear.
const MIN_SCALE_MARGIN: f64 = 1e-6;

/// Lower bound of the scale variable, relative to the minimum scale.
///
/// Well below the minimum so a run on a tree with no usable scale still
/// converges and can be reported as [`Error::ScaleTooSmall`].
const SCALE_FLOOR: f64 = 1e-6;

/// Finds the largest scale at which every leaf path fits on the paper.
///
/// Every unpinned leaf moves; the scale is the last variable. The tree is
/// only written back after a successful run.
pub struct ScaleOptimizer<'t> {
    tree: &'t mut Tree,
    optimizer: ConstrainedOptimizer,
    config: ScaleConfig,
    lifecycle: Lifecycle,
    layout: Layout,
    start: Vec<f64>,
    report: Option<Report>,
}

impl<'t> ScaleOptimizer<'t> {
    /// Creates a driver for `tree` that minimizes with `backend`.
    pub fn new(tree: &'t mut Tree, backend: Box<dyn Backend>) -> Self {
        Self {
            tree,
            optimizer: ConstrainedOptimizer::new(backend),
            config: ScaleConfig::default(),
            lifecycle: Lifecycle::new(),
            layout: Layout::default(),
            start: Vec::new(),
            report: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ScaleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Returns the optimizer, for call counts and the configured problem.
    pub fn optimizer(&self) -> &ConstrainedOptimizer {
        &self.optimizer
    }

    /// Returns the report of a successful run.
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    /// Builds the problem from the current state of the tree.
    ///
    /// # Errors
    ///
    /// Fails if the driver was already initialized or the tree has no two
    /// connected leaves.
    pub fn initialize(&mut self) -> Result<(), Error> {
        self.lifecycle.require(Phase::Created, "initialize")?;
        match self.build() {
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

    fn build(&mut self) -> Result<(), Error> {
        let tree = &*self.tree;
        let paths = tree.leaf_paths();
        if paths.is_empty() {
            return Err(Error::NothingToOptimize("the tree has no two connected leaves"));
        }
        let shortest = paths
            .iter()
            .map(|path| path.min_length(tree))
            .fold(f64::INFINITY, f64::min);

        let layout = Layout::new(tree, tree.leaf_nodes())?;
        let scale_var = layout.num_coords();
        let floor = self.config.min_scale() * SCALE_FLOOR;
        // No leaf path can be longer than the diagonal.
        let max_scale = (tree.paper().diagonal() / shortest).max(floor);

        let (mut lower, mut upper) = (Vec::new(), Vec::new());
        layout.bounds(tree, &mut lower, &mut upper);
        lower.push(floor);
        upper.push(max_scale);

        let mut start = Vec::with_capacity(scale_var + 1);
        layout.start(tree, &mut start);
        start.push(tree.scale().clamp(floor, max_scale));

        self.optimizer.set_size(scale_var + 1);
        self.optimizer.set_bounds(lower, upper)?;
        self.optimizer
            .set_objective(Linear::new(0.0).term(scale_var, -1.0))?;
        driver::add_path_constraints(
            &mut self.optimizer,
            tree,
            &layout,
            Scale::Variable(scale_var),
            |_| None,
        )?;
        driver::add_condition_constraints(&mut self.optimizer, tree, &layout)?;

        self.layout = layout;
        self.start = start;
        Ok(())
    }

    /// Runs the optimization and writes the result back on success.
    ///
    /// # Errors
    ///
    /// Fails if the driver is not initialized, the backend fails, or the
    /// optimal scale is not above the configured minimum.
    pub fn optimize(&mut self) -> Result<Report, Error> {
        self.optimize_observed(())
    }

    /// Like [`optimize`](Self::optimize), reporting every iteration to `observer`.
    ///
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
                scale = self.tree.scale(),
                moving = self.layout.moving().len(),
                feasible = report.feasible,
                diagnostics = %report.diagnostics,
                "scale optimization succeeded"
            ),
            Err(err) => warn!(%err, "scale optimization failed"),
        }
        self.lifecycle.finish(result)
    }

    fn run<O>(&mut self, observer: O) -> Result<Report, Error>
    where
        O: for<'a> Observer<Event<'a>, Action>,
    {
        let mut x = self.start.clone();
        let scale_var = self.layout.num_coords();
        let minimum = self.config.min_scale();

        let solution = match self.optimizer.minimize(&mut x, observer) {
            Ok(solution) => solution,
            // A backend that gives up while the scale is already below the
            // minimum has found no usable scale.
            Err(err @ crease_solvers::Error::Convergence { .. }) => {
                check_scale(x[scale_var], minimum)?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        driver::check_status(&solution)?;

        let scale = x[scale_var];
        check_scale(scale, minimum)?;

        self.layout.write_back(self.tree, &x)?;
        self.tree.set_scale(scale)?;

        let report = Report {
            solution,
            diagnostics: self.optimizer.diagnostics(),
            feasible: self.tree.is_feasible(),
        };
        self.report = Some(report);
        Ok(report)
    }
}

fn check_scale(scale: f64, minimum: f64) -> Result<(), Error> {
    if scale <= minimum * (1.0 + MIN_SCALE_MARGIN) {
        Err(Error::ScaleTooSmall { scale, minimum })
    } else {
        Ok(())
    }
}
