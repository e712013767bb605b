use nalgebra::{DMatrix, DVector};

/// Pairs with `sᵀy ≤ CURVATURE · ‖s‖‖y‖` never rescale the initial matrix.
const CURVATURE: f64 = 1e-10;

/// Powell's damping threshold.
const DAMPING: f64 = 0.2;

/// Damped BFGS approximation of the Lagrangian Hessian.
///
/// Powell's modification keeps the matrix positive definite even where the
/// Lagrangian has negative curvature along the step. The first accepted pair
/// after a reset rescales the identity by `yᵀy / sᵀy`.
#[derive(Debug, Clone)]
pub(super) struct Hessian {
    b: DMatrix<f64>,
    scaled: bool,
}

impl Hessian {
    pub(super) fn new(n: usize) -> Self {
        Self {
            b: DMatrix::identity(n, n),
            scaled: false,
        }
    }

    pub(super) fn matrix(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub(super) fn reset(&mut self) {
        let n = self.b.nrows();
        self.b = DMatrix::identity(n, n);
        self.scaled = false;
    }

    /// Applies the update for step `s` and gradient change `y`.
    pub(super) fn update(&mut self, s: &DVector<f64>, y: &DVector<f64>) {
        let sy = s.dot(y);
        if !self.scaled && sy > CURVATURE * s.norm() * y.norm() {
            self.b *= y.norm_squared() / sy;
            self.scaled = true;
        }

        let bs = &self.b * s;
        let sbs = s.dot(&bs);
        if sbs <= f64::EPSILON * s.norm_squared() {
            return;
        }

        let (y, sy) = if sy < DAMPING * sbs {
            let theta = (1.0 - DAMPING) * sbs / (sbs - sy);
            let damped = y * theta + &bs * (1.0 - theta);
            let sy = s.dot(&damped);
            (damped, sy)
        } else {
            (y.clone(), sy)
        };

        self.b.ger(1.0 / sy, &y, &y, 1.0);
        self.b.ger(-1.0 / sbs, &bs, &bs, 1.0);
    }
}
