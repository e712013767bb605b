//! Dense convex quadratic programs by the Goldfarb-Idnani dual method.
//!
//! ```text
//! minimize    ½ dᵀGd + aᵀd
//! subject to  nᵢᵀd = bᵢ    for the first `num_eq` rows
//!             nᵢᵀd ≥ bᵢ    for the remaining rows
//! ```
//!
//! `G` must be positive definite. The method starts from the unconstrained
//! minimum and adds violated constraints one at a time, dropping active
//! inequalities whose multipliers would turn negative. The factorization
//! `Jᵀ N = [R; 0]` of the active normals `N` is kept up to date with Givens
//! rotations, where `J = L⁻ᵀ` for the Cholesky factor `G = LLᵀ`.

use nalgebra::{Cholesky, DMatrix, DVector};
use thiserror::Error;

/// Relative size below which the primal step direction is treated as zero.
const ZERO_STEP: f64 = 1e-10;

/// Relative slack below which a constraint counts as satisfied.
const SLACK: f64 = 1e-11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(super) enum QpError {
    #[error("Hessian is not positive definite")]
    NotPositiveDefinite,

    #[error("constraints are inconsistent")]
    Infeasible,

    #[error("active-set iteration limit reached")]
    IterationLimit,
}

/// A solved quadratic program.
#[derive(Debug, Clone)]
pub(super) struct QpSolution {
    pub(super) d: DVector<f64>,

    /// Multipliers `y` with `Gd + a = Σ yᵢnᵢ`; non-negative for inequalities
    /// and zero for constraints that ended inactive.
    pub(super) multipliers: DVector<f64>,

    pub(super) active: Vec<bool>,
}

/// One entry of the active set.
#[derive(Debug, Clone, Copy)]
struct Active {
    row: usize,
    /// `-1` when an equality entered with its normal flipped.
    sign: f64,
    u: f64,
}

/// Solves the quadratic program described in the module docs.
///
/// `normals` holds one constraint normal per row.
pub(super) fn solve(
    g: &DMatrix<f64>,
    a: &DVector<f64>,
    normals: &DMatrix<f64>,
    rhs: &DVector<f64>,
    num_eq: usize,
) -> Result<QpSolution, QpError> {
    let n = a.len();
    let m = rhs.len();

    let chol = Cholesky::new(g.clone()).ok_or(QpError::NotPositiveDefinite)?;
    let mut j = chol
        .l()
        .transpose()
        .solve_upper_triangular(&DMatrix::identity(n, n))
        .ok_or(QpError::NotPositiveDefinite)?;
    let mut r = DMatrix::zeros(n, n);

    let mut d = -chol.solve(a);
    let mut active: Vec<Active> = Vec::with_capacity(n);
    let mut next_eq = 0;

    let max_iters = 10 * (n + m) + 50;
    let mut iters = 0;

    loop {
        let (row, sign) = if next_eq < num_eq {
            let row = next_eq;
            next_eq += 1;
            let s = normals.row(row).transpose().dot(&d) - rhs[row];
            (row, if s > 0.0 { -1.0 } else { 1.0 })
        } else {
            match most_violated(normals, rhs, num_eq, &d, &active) {
                Some(row) => (row, 1.0),
                None => break,
            }
        };

        let np: DVector<f64> = normals.row(row).transpose() * sign;
        let bp = rhs[row] * sign;
        let mut u_new = 0.0;

        loop {
            iters += 1;
            if iters > max_iters {
                return Err(QpError::IterationLimit);
            }

            let q = active.len();
            let mut dvec = j.tr_mul(&np);
            let d2_norm_sq = dvec.rows(q, n - q).norm_squared();
            let z_is_zero = d2_norm_sq.sqrt() <= ZERO_STEP * dvec.norm();
            let r_vec = back_substitute(&r, &dvec, q);
            let s_p = np.dot(&d) - bp;

            let mut t1 = f64::INFINITY;
            let mut drop = None;
            for (k, entry) in active.iter().enumerate() {
                if entry.row >= num_eq && r_vec[k] > 0.0 {
                    let t = entry.u / r_vec[k];
                    if t < t1 {
                        t1 = t;
                        drop = Some(k);
                    }
                }
            }
            let t2 = if z_is_zero {
                f64::INFINITY
            } else {
                -s_p / d2_norm_sq
            };

            if z_is_zero && t1.is_infinite() {
                if row < num_eq && s_p.abs() <= slack_tol(bp, &np, &d) {
                    // Redundant equality, already satisfied.
                    break;
                }
                return Err(QpError::Infeasible);
            }

            let t = t1.min(t2);
            if !z_is_zero {
                let z = j.columns(q, n - q) * dvec.rows(q, n - q);
                d.axpy(t, &z, 1.0);
            }
            for (entry, rk) in active.iter_mut().zip(r_vec.iter()) {
                entry.u -= t * rk;
            }
            u_new += t;

            if t2 <= t1 {
                add_constraint(&mut j, &mut r, &mut dvec, q);
                active.push(Active {
                    row,
                    sign,
                    u: u_new,
                });
                break;
            }
            if let Some(k) = drop {
                drop_constraint(&mut j, &mut r, q, k);
                active.remove(k);
            }
        }
    }

    let mut multipliers = DVector::zeros(m);
    let mut is_active = vec![false; m];
    for entry in &active {
        multipliers[entry.row] = entry.sign * entry.u;
        is_active[entry.row] = true;
    }

    Ok(QpSolution {
        d,
        multipliers,
        active: is_active,
    })
}

fn slack_tol(b: f64, normal: &DVector<f64>, d: &DVector<f64>) -> f64 {
    SLACK * (1.0 + b.abs() + normal.amax() * d.amax())
}

/// Returns the inactive inequality with the most negative slack, if any is
/// violated beyond rounding.
fn most_violated(
    normals: &DMatrix<f64>,
    rhs: &DVector<f64>,
    num_eq: usize,
    d: &DVector<f64>,
    active: &[Active],
) -> Option<usize> {
    let mut worst = None;
    let mut worst_slack = 0.0;

    for row in num_eq..rhs.len() {
        if active.iter().any(|entry| entry.row == row) {
            continue;
        }
        let normal = normals.row(row).transpose();
        let slack = normal.dot(d) - rhs[row];
        if slack < -slack_tol(rhs[row], &normal, d) && slack < worst_slack {
            worst = Some(row);
            worst_slack = slack;
        }
    }

    worst
}

/// Solves `R r = d₁` for the leading `q × q` block of `R`.
fn back_substitute(r: &DMatrix<f64>, dvec: &DVector<f64>, q: usize) -> DVector<f64> {
    let mut out = DVector::zeros(q);
    for i in (0..q).rev() {
        let mut sum = dvec[i];
        for k in i + 1..q {
            sum -= r[(i, k)] * out[k];
        }
        out[i] = sum / r[(i, i)];
    }
    out
}

/// Appends column `q` to `R`, rotating `J` so `dvec[q+1..]` vanishes.
fn add_constraint(j: &mut DMatrix<f64>, r: &mut DMatrix<f64>, dvec: &mut DVector<f64>, q: usize) {
    let n = dvec.len();
    for k in (q + 1..n).rev() {
        let (x, y) = (dvec[k - 1], dvec[k]);
        if y == 0.0 {
            continue;
        }
        let h = x.hypot(y);
        dvec[k - 1] = h;
        dvec[k] = 0.0;
        rotate_columns(j, k - 1, k, x / h, y / h);
    }
    for i in 0..=q {
        r[(i, q)] = dvec[i];
    }
}

/// Removes column `k` from the `q × q` factor `R` and restores its
/// triangular form.
fn drop_constraint(j: &mut DMatrix<f64>, r: &mut DMatrix<f64>, q: usize, k: usize) {
    for col in k..q - 1 {
        for row in 0..q {
            r[(row, col)] = r[(row, col + 1)];
        }
    }
    for row in 0..q {
        r[(row, q - 1)] = 0.0;
    }

    for col in k..q - 1 {
        let (x, y) = (r[(col, col)], r[(col + 1, col)]);
        if y == 0.0 {
            continue;
        }
        let h = x.hypot(y);
        let (c, s) = (x / h, y / h);
        for cc in col..q - 1 {
            let (top, bottom) = (r[(col, cc)], r[(col + 1, cc)]);
            r[(col, cc)] = c * top + s * bottom;
            r[(col + 1, cc)] = -s * top + c * bottom;
        }
        r[(col + 1, col)] = 0.0;
        rotate_columns(j, col, col + 1, c, s);
    }

    for col in 0..q {
        r[(q - 1, col)] = 0.0;
    }
}

fn rotate_columns(m: &mut DMatrix<f64>, i: usize, k: usize, c: f64, s: f64) {
    for row in 0..m.nrows() {
        let (x, y) = (m[(row, i)], m[(row, k)]);
        m[(row, i)] = c * x + s * y;
        m[(row, k)] = -s * x + c * y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn unconstrained_minimum() {
        let g = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 4.0]));
        let a = DVector::from_vec(vec![-2.0, -8.0]);

        let sol = solve(&g, &a, &DMatrix::zeros(0, 2), &DVector::zeros(0), 0).unwrap();

        assert_relative_eq!(sol.d[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(sol.d[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn single_equality() {
        // min ½‖d‖² s.t. d0 - d1 = 1.
        let g = DMatrix::identity(2, 2);
        let a = DVector::zeros(2);
        let normals = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
        let rhs = DVector::from_vec(vec![1.0]);

        let sol = solve(&g, &a, &normals, &rhs, 1).unwrap();

        assert_relative_eq!(sol.d[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(sol.d[1], -0.5, epsilon = 1e-12);
        assert_relative_eq!(sol.multipliers[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn flipped_equality_keeps_its_multiplier_sign() {
        // min ½‖d‖² s.t. d0 - d1 = -1, reached from the side where the
        // slack is positive.
        let g = DMatrix::identity(2, 2);
        let a = DVector::from_vec(vec![-3.0, 3.0]);
        let normals = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
        let rhs = DVector::from_vec(vec![-1.0]);

        let sol = solve(&g, &a, &normals, &rhs, 1).unwrap();

        assert_relative_eq!(sol.d[0] - sol.d[1], -1.0, epsilon = 1e-12);
        // Gd + a = y n
        let residual = &sol.d + &a - normals.row(0).transpose() * sol.multipliers[0];
        assert!(residual.amax() < 1e-12);
        assert!(sol.multipliers[0] < 0.0);
    }

    #[test]
    fn active_and_inactive_inequalities() {
        // The classic example shipped with the quadprog package.
        let g = DMatrix::identity(3, 3);
        let a = DVector::from_vec(vec![0.0, -5.0, 0.0]);
        let normals = DMatrix::from_row_slice(
            3,
            3,
            &[
                -4.0, -3.0, 0.0, //
                2.0, 1.0, 0.0, //
                0.0, -2.0, 1.0,
            ],
        );
        let rhs = DVector::from_vec(vec![-8.0, 2.0, 0.0]);

        let sol = solve(&g, &a, &normals, &rhs, 0).unwrap();

        assert_relative_eq!(sol.d[0], 0.476_190_476_190_476_2, epsilon = 1e-10);
        assert_relative_eq!(sol.d[1], 1.047_619_047_619_047_6, epsilon = 1e-10);
        assert_relative_eq!(sol.d[2], 2.095_238_095_238_095, epsilon = 1e-10);
        assert_relative_eq!(sol.multipliers[0], 0.0);
        assert_relative_eq!(sol.multipliers[1], 0.238_095_238_095_238_1, epsilon = 1e-10);
        assert_relative_eq!(sol.multipliers[2], 2.095_238_095_238_095, epsilon = 1e-10);
        assert_eq!(sol.active, [false, true, true]);
    }

    #[test]
    fn drops_a_constraint_that_becomes_inactive() {
        // min ½‖d‖² s.t. d0 + d1 ≥ 2 and 0.5 d0 ≥ 1.5. The sum row is the most
        // violated at the start, but is slack at the optimum (3, 0).
        let g = DMatrix::identity(2, 2);
        let a = DVector::zeros(2);
        let normals = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.5, 0.0]);
        let rhs = DVector::from_vec(vec![2.0, 1.5]);

        let sol = solve(&g, &a, &normals, &rhs, 0).unwrap();

        assert_relative_eq!(sol.d[0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(sol.d[1], 0.0, epsilon = 1e-12);
        assert_eq!(sol.active, [false, true]);
        assert_relative_eq!(sol.multipliers[0], 0.0);
        assert_relative_eq!(sol.multipliers[1], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn inconsistent_constraints_are_infeasible() {
        // d0 ≥ 1 and -d0 ≥ 0.
        let g = DMatrix::identity(1, 1);
        let a = DVector::zeros(1);
        let normals = DMatrix::from_row_slice(2, 1, &[1.0, -1.0]);
        let rhs = DVector::from_vec(vec![1.0, 0.0]);

        assert_eq!(
            solve(&g, &a, &normals, &rhs, 0).unwrap_err(),
            QpError::Infeasible
        );
    }

    #[test]
    fn redundant_equality_is_skipped() {
        let g = DMatrix::identity(2, 2);
        let a = DVector::zeros(2);
        let normals = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        let rhs = DVector::from_vec(vec![1.0, 2.0]);

        let sol = solve(&g, &a, &normals, &rhs, 2).unwrap();

        assert_relative_eq!(sol.d[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(sol.d[1], 0.5, epsilon = 1e-12);
        assert_eq!(sol.active, [true, false]);
    }

    #[test]
    fn indefinite_hessian_is_rejected() {
        let g = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -1.0]));
        let a = DVector::zeros(2);

        assert_eq!(
            solve(&g, &a, &DMatrix::zeros(0, 2), &DVector::zeros(0), 0).unwrap_err(),
            QpError::NotPositiveDefinite
        );
    }
}
