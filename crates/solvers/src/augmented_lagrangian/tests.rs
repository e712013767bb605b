use approx::assert_relative_eq;

use crease_core::{Linear, Problem, from_fns};

use crate::{Action, Backend, Error, Event, Status, error::Reason};

use super::{AugmentedLagrangian, Config, ConfigError};

/// `x0² + x1²` subject to `x0 - x1 - 1 = 0` on `[-1, 1]²`.
fn simple() -> Problem {
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
    problem
}

#[test]
fn solves_the_simple_problem() {
    let problem = simple();
    let mut x = [2.3, 4.7];

    let solution = AugmentedLagrangian::default()
        .minimize(&problem, &mut x, &mut ())
        .expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(x[0], 0.5, epsilon = 1e-6);
    assert_relative_eq!(x[1], -0.5, epsilon = 1e-6);
    assert_relative_eq!(solution.objective, 0.5, epsilon = 1e-6);
    assert!(solution.violation <= 1e-9);
}

#[test]
fn active_inequality_holds_at_the_boundary() {
    // min (x0 - 2)² s.t. x0 - 1 ≤ 0, so the constraint is active at x0 = 1.
    let mut problem = Problem::new();
    problem.set_size(1);
    problem
        .set_objective(from_fns(
            |x: &[f64]| (x[0] - 2.0).powi(2),
            |x: &[f64], g: &mut [f64]| g[0] = 2.0 * (x[0] - 2.0),
        ))
        .unwrap();
    problem
        .add_linear_inequality(Linear::new(-1.0).term(0, 1.0))
        .unwrap();

    let mut x = [-3.0];
    let solution = AugmentedLagrangian::default()
        .minimize(&problem, &mut x, &mut ())
        .unwrap();

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(x[0], 1.0, epsilon = 1e-7);
}

#[test]
fn inactive_inequality_leaves_the_unconstrained_minimum() {
    let mut problem = Problem::new();
    problem.set_size(1);
    problem
        .set_objective(from_fns(
            |x: &[f64]| (x[0] - 2.0).powi(2),
            |x: &[f64], g: &mut [f64]| g[0] = 2.0 * (x[0] - 2.0),
        ))
        .unwrap();
    problem
        .add_linear_inequality(Linear::new(-5.0).term(0, 1.0))
        .unwrap();

    let mut x = [0.0];
    AugmentedLagrangian::default()
        .minimize(&problem, &mut x, &mut ())
        .unwrap();

    assert_relative_eq!(x[0], 2.0, epsilon = 1e-7);
}

#[test]
fn observer_can_stop_early() {
    let problem = simple();
    let mut x = [2.3, 4.7];
    let mut seen = 0;

    let mut observer = |event: &Event<'_>| {
        seen = event.iter;
        Some(Action::StopEarly)
    };
    let solution = AugmentedLagrangian::default()
        .minimize(&problem, &mut x, &mut observer)
        .unwrap();

    assert_eq!(solution.status, Status::StoppedByObserver);
    assert_eq!(solution.iters, 1);
    assert_eq!(seen, 1);
}

#[test]
fn start_is_clamped_into_the_bounds() {
    let problem = simple();
    let mut x = [2.3, 4.7];

    let config = Config::new(1, 1, 1e-9, 1e-7).unwrap();
    let result = AugmentedLagrangian::new(config).minimize(&problem, &mut x, &mut ());

    // One outer iteration cannot satisfy the equality, but x stays in the box.
    assert!(matches!(
        result,
        Err(Error::Convergence {
            backend: "alm",
            reason: Reason::MaxIterations,
        })
    ));
    assert!(x.iter().all(|v| (-1.0..=1.0).contains(v)));
}

#[test]
fn missing_objective_is_a_problem_error() {
    let mut problem = Problem::new();
    problem.set_size(2);

    let result = AugmentedLagrangian::default().minimize(&problem, &mut [0.0, 0.0], &mut ());
    assert!(matches!(result, Err(Error::Problem(_))));
}

#[test]
fn rejects_invalid_config() {
    assert_eq!(Config::new(0, 10, 1e-9, 1e-7), Err(ConfigError::MaxOuterIters));
    assert_eq!(Config::new(10, 0, 1e-9, 1e-7), Err(ConfigError::MaxInnerIters));
    assert_eq!(Config::new(10, 10, 0.0, 1e-7), Err(ConfigError::FeasibilityTol));
    assert_eq!(Config::new(10, 10, 1e-9, f64::NAN), Err(ConfigError::OptimalityTol));

    let config = Config::default();
    assert_eq!(config.with_penalty(0.0, 10.0, 1e12), Err(ConfigError::InitialPenalty));
    assert_eq!(config.with_penalty(10.0, 1.0, 1e12), Err(ConfigError::PenaltyGrowth));
    assert_eq!(config.with_penalty(10.0, 10.0, 1.0), Err(ConfigError::MaxPenalty));
    assert_eq!(config.with_memory(0), Err(ConfigError::Memory));
}

#[test]
fn default_config_values() {
    let config = Config::default();
    assert_eq!(config.max_outer_iters(), 100);
    assert_eq!(config.max_inner_iters(), 2000);
    assert_eq!(config.memory(), 8);
    assert_relative_eq!(config.initial_penalty(), 10.0);
    assert_relative_eq!(config.max_penalty(), 1e12);
}
