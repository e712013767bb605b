//! Classic constrained problems with known solutions.

use crease_core::{
    DifferentiableFn, DomainError, Linear, Problem, from_fns, separation::separation,
};

/// A problem together with its starting point.
pub struct Case {
    pub problem: Problem,
    pub start: Vec<f64>,
}

impl Case {
    /// Returns the equality residuals at `x`, linear first.
    ///
    /// # Panics
    ///
    /// Panics if a constraint is undefined at `x`.
    #[must_use]
    pub fn equality_residuals(&self, x: &[f64]) -> Vec<f64> {
        self.problem
            .constraints()
            .equalities()
            .map(|h| h.value(x).expect("equality is defined"))
            .collect()
    }

    /// Returns the inequality values at `x`, linear first.
    ///
    /// # Panics
    ///
    /// Panics if a constraint is undefined at `x`.
    #[must_use]
    pub fn inequality_values(&self, x: &[f64]) -> Vec<f64> {
        self.problem
            .constraints()
            .inequalities()
            .map(|g| g.value(x).expect("inequality is defined"))
            .collect()
    }
}

/// `x0² + x1²` subject to `x0 − x1 − 1 = 0` on `[-1, 1]²`, started outside
/// the bounds. The solution is `(0.5, −0.5)`.
#[must_use]
pub fn simple() -> Case {
    let mut problem = Problem::new();
    problem.set_size(2);
    problem
        .set_bounds(vec![-1.0, -1.0], vec![1.0, 1.0])
        .expect("valid bounds");
    problem
        .set_objective(from_fns(
            |x: &[f64]| x[0] * x[0] + x[1] * x[1],
            |x: &[f64], g: &mut [f64]| {
                g[0] = 2.0 * x[0];
                g[1] = 2.0 * x[1];
            },
        ))
        .expect("size is set");
    problem
        .add_linear_equality(Linear::new(-1.0).term(0, 1.0).term(1, -1.0))
        .expect("size is set");

    Case {
        problem,
        start: vec![2.3, 4.7],
    }
}

/// Known optimum of [`sample`].
pub const SAMPLE_OPTIMUM: f64 = 1.0;

/// Hock-Schittkowski problem 32, the sample problem shipped with CFSQP.
///
/// ```text
/// minimize    (x0 + 3x1 + x2)² + 4(x0 − x1)²
/// subject to  x0³ − 6x1 − 4x2 + 3 ≤ 0
///             1 − x0 − x1 − x2 = 0
///             0 ≤ x ≤ 1e10
/// ```
///
/// The optimum is `1` at `(0, 0, 1)`.
#[must_use]
pub fn sample() -> Case {
    let mut problem = Problem::new();
    problem.set_size(3);
    problem
        .set_bounds(vec![0.0; 3], vec![1e10; 3])
        .expect("valid bounds");
    problem
        .set_objective(from_fns(
            |x: &[f64]| (x[0] + 3.0 * x[1] + x[2]).powi(2) + 4.0 * (x[0] - x[1]).powi(2),
            |x: &[f64], g: &mut [f64]| {
                let sum = 2.0 * (x[0] + 3.0 * x[1] + x[2]);
                let diff = 8.0 * (x[0] - x[1]);
                g[0] = sum + diff;
                g[1] = 3.0 * sum - diff;
                g[2] = sum;
            },
        ))
        .expect("size is set");
    problem
        .add_nonlinear_inequality(from_fns(
            |x: &[f64]| x[0].powi(3) - 6.0 * x[1] - 4.0 * x[2] + 3.0,
            |x: &[f64], g: &mut [f64]| {
                g[0] = 3.0 * x[0] * x[0];
                g[1] = -6.0;
                g[2] = -4.0;
            },
        ))
        .expect("size is set");
    problem
        .add_linear_equality(
            Linear::new(1.0)
                .term(0, -1.0)
                .term(1, -1.0)
                .term(2, -1.0),
        )
        .expect("size is set");

    Case {
        problem,
        start: vec![0.1, 0.7, 0.2],
    }
}

/// Keeps two circles of radius `u[0]` from overlapping: `2r − |cᵢ − cⱼ| ≤ 0`.
#[derive(Debug, Clone, Copy)]
pub struct NoOverlap {
    i: usize,
    j: usize,
}

impl NoOverlap {
    #[must_use]
    pub fn new(i: usize, j: usize) -> Self {
        Self { i, j }
    }

    fn center(u: &[f64], k: usize) -> [f64; 2] {
        [u[2 * k + 1], u[2 * k + 2]]
    }
}

impl DifferentiableFn for NoOverlap {
    fn value(&self, u: &[f64]) -> Result<f64, DomainError> {
        let s = separation(Self::center(u, self.i), Self::center(u, self.j));
        Ok(2.0 * u[0] - s.distance)
    }

    fn gradient(&self, u: &[f64], grad: &mut [f64]) -> Result<(), DomainError> {
        let s = separation(Self::center(u, self.i), Self::center(u, self.j));
        grad[0] = 2.0;
        grad[2 * self.i + 1] = -s.direction[0];
        grad[2 * self.i + 2] = -s.direction[1];
        grad[2 * self.j + 1] = s.direction[0];
        grad[2 * self.j + 2] = s.direction[1];
        Ok(())
    }
}

/// Packs `count` equal circles with centers in the unit square, maximizing
/// the radius.
///
/// Variables are the radius followed by `(x, y)` of each center. With
/// `symmetric`, circles `2k` and `2k + 1` mirror each other about the
/// vertical midline. The start is a fixed scatter over `[-0.25, 1.25)`, so
/// it begins partly outside the bounds and overlapping.
#[must_use]
pub fn circle_packing(count: usize, symmetric: bool) -> Case {
    let n = 2 * count + 1;

    let mut problem = Problem::new();
    problem.set_size(n);

    let mut lower = vec![0.0; n];
    lower[0] = 0.001;
    problem
        .set_bounds(lower, vec![1.0; n])
        .expect("valid bounds");
    problem
        .set_objective(Linear::new(0.0).term(0, -1.0))
        .expect("size is set");

    for i in 0..count {
        for j in i + 1..count {
            problem
                .add_nonlinear_inequality(NoOverlap::new(i, j))
                .expect("size is set");
        }
    }

    if symmetric {
        for pair in 0..count / 2 {
            let (i, j) = (2 * pair, 2 * pair + 1);
            problem
                .add_linear_equality(
                    Linear::new(-1.0)
                        .term(2 * i + 1, 1.0)
                        .term(2 * j + 1, 1.0),
                )
                .expect("size is set");
            problem
                .add_linear_equality(Linear::new(0.0).term(2 * i + 2, 1.0).term(2 * j + 2, -1.0))
                .expect("size is set");
        }
    }

    let mut start = vec![0.0; n];
    for (i, v) in start.iter_mut().enumerate().skip(1) {
        *v = (i as f64 * 1e9_f64.sqrt()) % 1.5 - 0.25;
    }

    Case { problem, start }
}

/// Returns circle `k`'s center from a packing solution.
#[must_use]
pub fn circle_center(u: &[f64], k: usize) -> [f64; 2] {
    NoOverlap::center(u, k)
}
