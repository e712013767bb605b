use nalgebra::{DMatrix, DVector};

use crease_core::{Counted, DifferentiableFn, Problem};

use crate::{Error, error::FunctionId};

/// Borrowed view of a problem that evaluates its functions with error mapping.
///
/// Equalities and inequalities are flattened (linear constraints first) so
/// backends can index them as plain vectors.
pub(crate) struct Evaluator<'p> {
    objective: &'p Counted,
    equalities: Vec<&'p Counted>,
    inequalities: Vec<&'p Counted>,
    n: usize,
}

impl<'p> Evaluator<'p> {
    /// Validates `problem` against the start point and builds the view.
    pub(crate) fn new(problem: &'p Problem, x: &[f64]) -> Result<Self, Error> {
        let objective = problem.validate(x)?;
        let constraints = problem.constraints();

        Ok(Self {
            objective,
            equalities: constraints.equalities().collect(),
            inequalities: constraints.inequalities().collect(),
            n: problem.size(),
        })
    }

    pub(crate) fn n(&self) -> usize {
        self.n
    }

    pub(crate) fn num_eq(&self) -> usize {
        self.equalities.len()
    }

    pub(crate) fn num_ineq(&self) -> usize {
        self.inequalities.len()
    }

    pub(crate) fn objective(&self, x: &DVector<f64>) -> Result<f64, Error> {
        value(self.objective, x, FunctionId::Objective)
    }

    pub(crate) fn objective_gradient(
        &self,
        x: &DVector<f64>,
        grad: &mut DVector<f64>,
    ) -> Result<(), Error> {
        gradient(self.objective, x, grad, FunctionId::Objective)
    }

    pub(crate) fn equality(&self, i: usize, x: &DVector<f64>) -> Result<f64, Error> {
        value(self.equalities[i], x, FunctionId::Equality(i))
    }

    pub(crate) fn inequality(&self, j: usize, x: &DVector<f64>) -> Result<f64, Error> {
        value(self.inequalities[j], x, FunctionId::Inequality(j))
    }

    pub(crate) fn equality_gradient(
        &self,
        i: usize,
        x: &DVector<f64>,
        grad: &mut DVector<f64>,
    ) -> Result<(), Error> {
        gradient(self.equalities[i], x, grad, FunctionId::Equality(i))
    }

    pub(crate) fn inequality_gradient(
        &self,
        j: usize,
        x: &DVector<f64>,
        grad: &mut DVector<f64>,
    ) -> Result<(), Error> {
        gradient(self.inequalities[j], x, grad, FunctionId::Inequality(j))
    }

    /// Evaluates every constraint at `x`.
    pub(crate) fn constraints(&self, x: &DVector<f64>) -> Result<Constraints, Error> {
        let eq = (0..self.num_eq())
            .map(|i| self.equality(i, x))
            .collect::<Result<Vec<_>, _>>()?;
        let ineq = (0..self.num_ineq())
            .map(|j| self.inequality(j, x))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Constraints {
            eq: DVector::from_vec(eq),
            ineq: DVector::from_vec(ineq),
        })
    }

    /// Evaluates the constraint Jacobians at `x`, one row per constraint.
    pub(crate) fn jacobians(&self, x: &DVector<f64>) -> Result<Jacobians, Error> {
        let mut row = DVector::zeros(self.n);

        let mut eq = DMatrix::zeros(self.num_eq(), self.n);
        for i in 0..self.num_eq() {
            self.equality_gradient(i, x, &mut row)?;
            eq.set_row(i, &row.transpose());
        }

        let mut ineq = DMatrix::zeros(self.num_ineq(), self.n);
        for j in 0..self.num_ineq() {
            self.inequality_gradient(j, x, &mut row)?;
            ineq.set_row(j, &row.transpose());
        }

        Ok(Jacobians { eq, ineq })
    }
}

/// Constraint values at one point.
#[derive(Debug, Clone)]
pub(crate) struct Constraints {
    pub(crate) eq: DVector<f64>,
    pub(crate) ineq: DVector<f64>,
}

impl Constraints {
    /// Largest violation: `max(|c_eq|, c_ineq⁺)`.
    pub(crate) fn max_violation(&self) -> f64 {
        let eq = self.eq.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
        self.ineq.iter().fold(eq, |m, &c| m.max(c))
    }

    /// Summed violation: `Σ|c_eq| + Σ c_ineq⁺`.
    pub(crate) fn l1_violation(&self) -> f64 {
        let eq: f64 = self.eq.iter().map(|c| c.abs()).sum();
        let ineq: f64 = self.ineq.iter().map(|c| c.max(0.0)).sum();
        eq + ineq
    }
}

/// Constraint Jacobians at one point.
#[derive(Debug, Clone)]
pub(crate) struct Jacobians {
    pub(crate) eq: DMatrix<f64>,
    pub(crate) ineq: DMatrix<f64>,
}

fn value(f: &Counted, x: &DVector<f64>, function: FunctionId) -> Result<f64, Error> {
    f.value(x.as_slice())
        .map_err(|source| Error::NumericDomain { function, source })
}

fn gradient(
    f: &Counted,
    x: &DVector<f64>,
    grad: &mut DVector<f64>,
    function: FunctionId,
) -> Result<(), Error> {
    f.gradient(x.as_slice(), grad.as_mut_slice())
        .map_err(|source| Error::NumericDomain { function, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crease_core::Linear;

    fn problem() -> Problem {
        let mut problem = Problem::new();
        problem.set_size(2);
        problem.set_objective(Linear::new(0.0).term(0, 1.0)).unwrap();
        // Added out of order to check the linear-first flattening.
        problem
            .add_nonlinear_equality(Linear::new(-1.0).term(1, 1.0))
            .unwrap();
        problem
            .add_linear_equality(Linear::new(0.0).term(0, 2.0))
            .unwrap();
        problem
            .add_nonlinear_inequality(Linear::new(-3.0).term(0, 1.0).term(1, 1.0))
            .unwrap();
        problem
    }

    #[test]
    fn flattens_constraints_linear_first() {
        let problem = problem();
        let x = DVector::from_vec(vec![1.0, 4.0]);
        let eval = Evaluator::new(&problem, x.as_slice()).unwrap();

        let c = eval.constraints(&x).unwrap();
        assert_eq!(c.eq.as_slice(), &[2.0, 3.0]);
        assert_eq!(c.ineq.as_slice(), &[2.0]);
        assert_relative_eq!(c.max_violation(), 3.0);
        assert_relative_eq!(c.l1_violation(), 7.0);

        let jac = eval.jacobians(&x).unwrap();
        assert_eq!(jac.eq.row(0).iter().copied().collect::<Vec<_>>(), [2.0, 0.0]);
        assert_eq!(jac.eq.row(1).iter().copied().collect::<Vec<_>>(), [0.0, 1.0]);
        assert_eq!(jac.ineq.row(0).iter().copied().collect::<Vec<_>>(), [1.0, 1.0]);
    }

    #[test]
    fn satisfied_inequalities_do_not_count_as_violation() {
        let c = Constraints {
            eq: DVector::zeros(0),
            ineq: DVector::from_vec(vec![-1.0, -2.0]),
        };

        assert_eq!(c.max_violation(), 0.0);
        assert_eq!(c.l1_violation(), 0.0);
    }

    #[test]
    fn wrong_start_length_is_rejected() {
        let problem = problem();
        assert!(matches!(
            Evaluator::new(&problem, &[0.0]),
            Err(Error::Problem(_))
        ));
    }
}
