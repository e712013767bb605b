use approx::assert_relative_eq;

use crease_core::{Linear, Problem, from_fns};

use crate::{Action, Backend, Error, Event, Status, error::Reason};

use super::{Config, ConfigError, Sqp};

fn quadratic(center: f64) -> impl crease_core::DifferentiableFn {
    from_fns(
        move |x: &[f64]| (x[0] - center).powi(2),
        move |x: &[f64], g: &mut [f64]| g[0] = 2.0 * (x[0] - center),
    )
}

#[test]
fn solves_an_equality_constrained_quadratic() {
    let mut problem = Problem::new();
    problem.set_size(2);
    problem
        .set_bounds(vec![-1.0, -1.0], vec![1.0, 1.0])
        .unwrap();
    problem
        .set_objective(from_fns(
            |x: &[f64]| x[0] * x[0] + x[1] * x[1],
            |x: &[f64], g: &mut [f64]| {
                g[0] = 2.0 * x[0];
                g[1] = 2.0 * x[1];
            },
        ))
        .unwrap();
    problem
        .add_linear_equality(Linear::new(-1.0).term(0, 1.0).term(1, -1.0))
        .unwrap();

    let mut x = [2.3, 4.7];
    let solution = Sqp::default()
        .minimize(&problem, &mut x, &mut ())
        .expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(x[0], 0.5, epsilon = 1e-8);
    assert_relative_eq!(x[1], -0.5, epsilon = 1e-8);
}

#[test]
fn recovers_from_an_inconsistent_linearization() {
    // x² - 1 = 0 has a zero gradient at the start, so the first subproblem
    // runs in elastic mode.
    let mut problem = Problem::new();
    problem.set_size(1);
    problem.set_objective(quadratic(2.0)).unwrap();
    problem
        .add_nonlinear_equality(from_fns(
            |x: &[f64]| x[0] * x[0] - 1.0,
            |x: &[f64], g: &mut [f64]| g[0] = 2.0 * x[0],
        ))
        .unwrap();

    let mut x = [0.0];
    let solution = Sqp::default()
        .minimize(&problem, &mut x, &mut ())
        .expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(x[0], 1.0, epsilon = 1e-8);
    assert_relative_eq!(solution.objective, 1.0, epsilon = 1e-8);
}

#[test]
fn respects_bounds_without_constraints() {
    let mut problem = Problem::new();
    problem.set_size(1);
    problem.set_bounds(vec![-1.0], vec![0.5]).unwrap();
    problem.set_objective(quadratic(2.0)).unwrap();

    let mut x = [-1.0];
    Sqp::default().minimize(&problem, &mut x, &mut ()).unwrap();

    assert_relative_eq!(x[0], 0.5, epsilon = 1e-12);
}

#[test]
fn observer_sees_every_iteration_and_can_stop() {
    let mut problem = Problem::new();
    problem.set_size(1);
    problem.set_objective(quadratic(2.0)).unwrap();
    problem
        .add_nonlinear_inequality(from_fns(
            |x: &[f64]| x[0] * x[0] - 1.0,
            |x: &[f64], g: &mut [f64]| g[0] = 2.0 * x[0],
        ))
        .unwrap();

    let mut iters = Vec::new();
    let mut observer = |event: &Event<'_>| {
        iters.push(event.iter);
        (event.iter == 2).then_some(Action::StopEarly)
    };

    let mut x = [0.0];
    let solution = Sqp::default()
        .minimize(&problem, &mut x, &mut observer)
        .unwrap();

    assert_eq!(solution.status, Status::StoppedByObserver);
    assert_eq!(solution.iters, 2);
    assert_eq!(iters, [1, 2]);
}

#[test]
fn iteration_limit_is_a_convergence_error() {
    let mut problem = Problem::new();
    problem.set_size(1);
    problem.set_objective(quadratic(2.0)).unwrap();
    problem
        .add_nonlinear_equality(from_fns(
            |x: &[f64]| x[0] * x[0] - 1.0,
            |x: &[f64], g: &mut [f64]| g[0] = 2.0 * x[0],
        ))
        .unwrap();

    let config = Config::new(1, 1e-9, 1e-14, 1e-10).unwrap();
    let mut x = [3.0];
    let err = Sqp::new(config)
        .minimize(&problem, &mut x, &mut ())
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Convergence {
            backend: "sqp",
            reason: Reason::MaxIterations,
        }
    ));
    assert_eq!(err.reason().map(Reason::code), Some(2));
    // The last iterate is kept, and it moved toward the solution.
    assert!(x[0] < 3.0);
}

#[test]
fn rejects_invalid_config() {
    assert_eq!(Config::new(0, 1e-9, 0.0, 0.0), Err(ConfigError::MaxIters));
    assert_eq!(Config::new(10, 0.0, 0.0, 0.0), Err(ConfigError::FeasibilityTol));
    assert_eq!(Config::new(10, 1e-9, -1.0, 0.0), Err(ConfigError::OptimalityTol));
    assert_eq!(Config::new(10, 1e-9, 0.0, f64::INFINITY), Err(ConfigError::StepTol));
}
