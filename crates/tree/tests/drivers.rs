use std::time::Duration;

use approx::assert_relative_eq;
use crease_core::Observer;
use crease_observers::{Deadline, Recorder};
use crease_solvers::{Action, BackendKind, Event, sqp};
use crease_tree::{
    Condition, EdgeId, EdgeOptimizer, Error, LeafPath, NodeId, Phase, ScaleOptimizer,
    StrainOptimizer, SymmetryLine, Tree,
};

/// A hub with one unit edge to each leaf at `leaves`.
fn star(leaves: &[[f64; 2]]) -> (Tree, Vec<NodeId>, Vec<EdgeId>) {
    let weighted: Vec<_> = leaves.iter().map(|&p| (p, 1.0)).collect();
    weighted_star(&weighted)
}

/// A hub with an edge of the given length to each leaf.
fn weighted_star(leaves: &[([f64; 2], f64)]) -> (Tree, Vec<NodeId>, Vec<EdgeId>) {
    let mut tree = Tree::default();
    let hub = tree.add_node([0.5, 0.5]);
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for &(p, length) in leaves {
        let leaf = tree.add_node(p);
        edges.push(tree.add_edge(hub, leaf, length).unwrap());
        nodes.push(leaf);
    }
    (tree, nodes, edges)
}

fn leaf_path(tree: &Tree, a: NodeId, b: NodeId) -> LeafPath {
    tree.leaf_paths()
        .into_iter()
        .find(|path| path.nodes == [a, b] || path.nodes == [b, a])
        .unwrap()
}

#[test]
fn two_leaves_move_to_opposite_corners() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, _) = star(&[[0.2, 0.3], [0.6, 0.7]]);

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        let report = driver.optimize().unwrap();
        assert_eq!(driver.phase(), Phase::Succeeded);
        assert!(report.feasible, "{kind}");

        // The diagonal over a path of length 2.
        assert_relative_eq!(tree.scale(), 2f64.sqrt() / 2.0, epsilon = 1e-6);
        let [a, b] = [leaves[0], leaves[1]];
        let (pa, pb) = (
            tree.node(a).unwrap().location(),
            tree.node(b).unwrap().location(),
        );
        assert_relative_eq!(pa.distance(pb), 2f64.sqrt(), epsilon = 1e-6);
    }
}

#[test]
fn three_leaves_spread_over_the_square() {
    for kind in BackendKind::ALL {
        let (mut tree, _, _) = star(&[[0.05, 0.05], [0.95, 0.3], [0.3, 0.95]]);

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        driver.optimize().unwrap();

        // Best spread of three points in a unit square is √6 − √2.
        let expected = (6f64.sqrt() - 2f64.sqrt()) / 2.0;
        assert_relative_eq!(tree.scale(), expected, epsilon = 1e-5);
        assert!(tree.is_feasible(), "{kind}");
    }
}

#[test]
fn optimal_scale_is_a_fixed_point() {
    let (mut tree, _, _) = star(&[[0.05, 0.05], [0.95, 0.3], [0.3, 0.95]]);

    let mut first = ScaleOptimizer::new(&mut tree, BackendKind::Sqp.build());
    first.initialize().unwrap();
    first.optimize().unwrap();
    let scale = tree.scale();

    let mut second = ScaleOptimizer::new(&mut tree, BackendKind::Sqp.build());
    second.initialize().unwrap();
    second.optimize().unwrap();
    assert_relative_eq!(tree.scale(), scale, epsilon = 1e-6);
}

#[test]
fn symmetry_line_holds_a_leaf() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, _) = star(&[[0.5, 0.3], [0.7, 0.8]]);
        tree.add_condition(Condition::NodeOnSymmetryLine { node: leaves[0] })
            .unwrap();

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        driver.optimize().unwrap();

        // From the middle of one side to a far corner.
        assert_relative_eq!(tree.scale(), 1.25f64.sqrt() / 2.0, epsilon = 1e-6);
        assert_relative_eq!(tree.node(leaves[0]).unwrap().location().x, 0.5, epsilon = 1e-6);
    }
}

#[test]
fn paired_leaves_mirror_each_other() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, _) = star(&[[0.3, 0.4], [0.6, 0.45]]);
        let [a, b] = [leaves[0], leaves[1]];
        tree.add_condition(Condition::NodesPaired { a, b }).unwrap();

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        driver.optimize().unwrap();

        // A mirrored pair is at most one paper width apart.
        assert_relative_eq!(tree.scale(), 0.5, epsilon = 1e-6);
        let (pa, pb) = (
            tree.node(a).unwrap().location(),
            tree.node(b).unwrap().location(),
        );
        assert_relative_eq!(pa.x + pb.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(pa.y, pb.y, epsilon = 1e-6);
        assert!(tree.is_feasible(), "{kind}");
    }
}

#[test]
fn pairing_about_a_diagonal_line() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, _) = star(&[[0.6, 0.2], [0.3, 0.7]]);
        let [a, b] = [leaves[0], leaves[1]];
        let diagonal = SymmetryLine::new([0.5, 0.5], std::f64::consts::FRAC_PI_4).unwrap();
        tree.set_symmetry(diagonal);
        tree.add_condition(Condition::NodesPaired { a, b }).unwrap();

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        driver.optimize().unwrap();

        // Mirrored across y = x, the pair can still reach opposite corners.
        assert_relative_eq!(tree.scale(), 2f64.sqrt() / 2.0, epsilon = 1e-6);
        let (pa, pb) = (
            tree.node(a).unwrap().location(),
            tree.node(b).unwrap().location(),
        );
        assert_relative_eq!(pa.x, pb.y, epsilon = 1e-6);
        assert_relative_eq!(pa.y, pb.x, epsilon = 1e-6);
    }
}

#[test]
fn active_path_is_held_tight_by_the_scale_optimizer() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, _) =
            weighted_star(&[([0.2, 0.3], 1.0), ([0.6, 0.7], 1.0), ([0.7, 0.1], 0.1)]);
        let [a, c] = [leaves[0], leaves[2]];
        tree.add_condition(Condition::PathActive { a, b: c }).unwrap();

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        let report = driver.optimize().unwrap();
        assert!(report.feasible, "{kind}");

        // The short leaf does not limit the scale but must sit exactly at
        // its minimum distance from `a`.
        assert_relative_eq!(tree.scale(), 2f64.sqrt() / 2.0, epsilon = 1e-5);
        assert_relative_eq!(leaf_path(&tree, a, c).slack(&tree), 0.0, epsilon = 1e-6);
        assert!(tree.is_path_active(a, c));
    }
}

#[test]
fn active_path_is_held_tight_by_the_edge_optimizer() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, edges) =
            weighted_star(&[([0.0, 0.0], 1.0), ([0.5, 0.5], 1.0), ([0.2, 0.6], 0.1)]);
        let [a, c] = [leaves[0], leaves[2]];
        tree.set_pinned(a, true).unwrap();
        tree.set_scale(0.5).unwrap();
        tree.add_condition(Condition::PathActive { a, b: c }).unwrap();

        let mut driver = EdgeOptimizer::new(&mut tree, kind.build());
        driver.initialize(&leaves, &edges[..2]).unwrap();
        let report = driver.optimize().unwrap();
        assert!(report.feasible, "{kind}");

        assert_relative_eq!(
            tree.edge(edges[0]).unwrap().strain(),
            2f64.sqrt() - 1.0,
            epsilon = 1e-5
        );
        assert_relative_eq!(leaf_path(&tree, a, c).slack(&tree), 0.0, epsilon = 1e-6);
    }
}

#[test]
fn scale_below_the_minimum_is_rejected() {
    for kind in BackendKind::ALL {
        // Two pinned leaves 5e-4 apart on a path of length 2.
        let (mut tree, leaves, _) = star(&[[0.2, 0.5], [0.2005, 0.5]]);
        for &leaf in &leaves {
            tree.set_pinned(leaf, true).unwrap();
        }
        let before = tree.clone();

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        let err = driver.optimize().unwrap_err();

        let Error::ScaleTooSmall { scale, minimum } = err else {
            panic!("{kind}: expected a scale error, got {err}");
        };
        assert_relative_eq!(minimum, 1e-3);
        assert!(scale < minimum, "{kind}: {scale}");
        assert_eq!(driver.phase(), Phase::Failed);
        assert!(driver.report().is_none());
        assert_eq!(tree, before);
    }
}

#[test]
fn overflowing_path_length_is_a_domain_error() {
    for kind in BackendKind::ALL {
        let (mut tree, _, _) = weighted_star(&[([0.2, 0.3], 1e308), ([0.6, 0.7], 1e308)]);
        let before = tree.clone();

        let mut driver = ScaleOptimizer::new(&mut tree, kind.build());
        driver.initialize().unwrap();
        let err = driver.optimize().unwrap_err();

        assert!(
            matches!(
                err,
                Error::Optimizer(crease_solvers::Error::NumericDomain { .. })
            ),
            "{kind}: {err}"
        );
        assert_eq!(tree, before);
    }
}

#[test]
fn pinned_leaves_do_not_move() {
    let (mut tree, leaves, _) = star(&[[0.0, 0.0], [0.6, 0.7]]);
    tree.set_pinned(leaves[0], true).unwrap();

    let mut driver = ScaleOptimizer::new(&mut tree, BackendKind::Sqp.build());
    driver.initialize().unwrap();
    driver.optimize().unwrap();

    assert_eq!(tree.node(leaves[0]).unwrap().location().to_array(), [0.0, 0.0]);
    assert_relative_eq!(tree.scale(), 2f64.sqrt() / 2.0, epsilon = 1e-6);
}

#[test]
fn failed_run_leaves_the_tree_alone() {
    let (mut tree, _, _) = star(&[[0.2, 0.3], [0.6, 0.7]]);
    let before = tree.clone();

    let config = sqp::Config::new(1, 1e-9, 1e-14, 1e-10).unwrap();
    let mut driver = ScaleOptimizer::new(&mut tree, Box::new(sqp::Sqp::new(config)));
    driver.initialize().unwrap();

    let err = driver.optimize().unwrap_err();
    assert!(matches!(err, Error::Optimizer(_)), "{err}");
    assert_eq!(driver.phase(), Phase::Failed);
    assert!(driver.report().is_none());
    assert!(driver.optimizer().diagnostics().total_calls().value > 0);
    assert_eq!(tree, before);
}

#[test]
fn stopped_run_leaves_the_tree_alone() {
    let (mut tree, _, _) = star(&[[0.2, 0.3], [0.6, 0.7]]);
    let before = tree.clone();

    let mut driver = ScaleOptimizer::new(&mut tree, BackendKind::AugmentedLagrangian.build());
    driver.initialize().unwrap();

    let mut deadline = Deadline::new(Duration::ZERO);
    let result = driver.optimize_observed(|event: &Event<'_>| -> Option<Action> {
        deadline.observe(event)
    });

    assert!(matches!(result, Err(Error::Stopped)));
    assert_eq!(tree, before);
}

#[test]
fn drivers_run_once() {
    let (mut tree, _, _) = star(&[[0.2, 0.3], [0.6, 0.7]]);
    let mut driver = ScaleOptimizer::new(&mut tree, BackendKind::Sqp.build());

    assert!(matches!(
        driver.optimize(),
        Err(Error::InvalidState { phase: Phase::Created, .. })
    ));

    driver.initialize().unwrap();
    assert!(matches!(
        driver.initialize(),
        Err(Error::InvalidState { phase: Phase::Initialized, .. })
    ));

    driver.optimize().unwrap();
    assert!(matches!(
        driver.optimize(),
        Err(Error::InvalidState { phase: Phase::Succeeded, .. })
    ));
}

#[test]
fn common_strain_reaches_the_far_corner() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, edges) = star(&[[0.0, 0.0], [0.5, 0.5]]);
        tree.set_pinned(leaves[0], true).unwrap();
        tree.set_scale(0.5).unwrap();

        let mut recorder = Recorder::new();
        let mut driver = EdgeOptimizer::new(&mut tree, kind.build());
        driver.initialize(&leaves, &edges).unwrap();
        let report = driver
            .optimize_observed(|event: &Event<'_>| -> Option<Action> { recorder.observe(event) })
            .unwrap();
        assert!(report.feasible, "{kind}");
        assert!(!recorder.is_empty());

        // 0.5 · 2 · (1 + σ) = √2
        for &e in &edges {
            assert_relative_eq!(tree.edge(e).unwrap().strain(), 2f64.sqrt() - 1.0, epsilon = 1e-6);
        }
        let corner = tree.node(leaves[1]).unwrap().location();
        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(corner.y, 1.0, epsilon = 1e-6);
    }
}

#[test]
fn edge_optimizer_needs_stretchy_edges() {
    let (mut tree, leaves, _) = star(&[[0.0, 0.0], [0.5, 0.5]]);
    let mut driver = EdgeOptimizer::new(&mut tree, BackendKind::Sqp.build());

    assert!(matches!(
        driver.initialize(&leaves, &[]),
        Err(Error::NothingToOptimize(_))
    ));
    assert_eq!(driver.phase(), Phase::Failed);
}

/// Two pinned leaves 0.6 apart on a path of length 2 at scale 0.5.
fn squeezed(stiffness: [f64; 2]) -> (Tree, Vec<NodeId>, Vec<EdgeId>) {
    let (mut tree, leaves, edges) = star(&[[0.0, 0.0], [0.6, 0.0]]);
    for (&leaf, (&edge, k)) in leaves.iter().zip(edges.iter().zip(stiffness)) {
        tree.set_pinned(leaf, true).unwrap();
        tree.set_stiffness(edge, k).unwrap();
    }
    tree.set_scale(0.5).unwrap();
    (tree, leaves, edges)
}

#[test]
fn stiffer_edges_strain_less() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, edges) = squeezed([1.0, 3.0]);
        assert!(!tree.is_feasible());

        let mut driver = StrainOptimizer::new(&mut tree, kind.build());
        driver.initialize(&leaves, &edges).unwrap();
        let report = driver.optimize().unwrap();
        assert!(report.feasible, "{kind}");

        assert_relative_eq!(tree.edge(edges[0]).unwrap().strain(), -0.6, epsilon = 1e-6);
        assert_relative_eq!(tree.edge(edges[1]).unwrap().strain(), -0.2, epsilon = 1e-6);
    }
}

#[test]
fn equal_stiffness_shares_the_strain() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, edges) = squeezed([1.0, 1.0]);

        let mut driver = StrainOptimizer::new(&mut tree, kind.build());
        driver.initialize(&leaves, &edges).unwrap();
        driver.optimize().unwrap();
        assert!(driver.report().is_some_and(|r| r.diagnostics.iterations > 0));

        for &e in &edges {
            assert_relative_eq!(tree.edge(e).unwrap().strain(), -0.4, epsilon = 1e-6);
        }
    }
}

#[test]
fn same_strain_group_shares_one_strain() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, edges) = squeezed([1.0, 3.0]);
        tree.add_condition(Condition::EdgesSameStrain { a: edges[0], b: edges[1] })
            .unwrap();

        let mut driver = StrainOptimizer::new(&mut tree, kind.build());
        driver.initialize(&leaves, &edges).unwrap();
        driver.optimize().unwrap();

        // Stiffness no longer matters once the strains are tied.
        for &e in &edges {
            assert_relative_eq!(tree.edge(e).unwrap().strain(), -0.4, epsilon = 1e-6);
        }
    }
}

#[test]
fn fixed_edge_length_pushes_strain_elsewhere() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, edges) = squeezed([1.0, 3.0]);
        tree.add_condition(Condition::EdgeLengthFixed { edge: edges[0] })
            .unwrap();

        let mut driver = StrainOptimizer::new(&mut tree, kind.build());
        driver.initialize(&leaves, &edges).unwrap();
        let report = driver.optimize().unwrap();
        assert!(report.feasible, "{kind}");

        // 0.5 · (1 + 1 + σ) = 0.6
        assert_relative_eq!(tree.edge(edges[0]).unwrap().strain(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(tree.edge(edges[1]).unwrap().strain(), -0.8, epsilon = 1e-6);
    }
}

#[test]
fn same_strain_follows_a_frozen_edge() {
    for kind in BackendKind::ALL {
        let (mut tree, leaves, edges) = star(&[[0.0, 0.0], [0.5, 0.5]]);
        tree.set_pinned(leaves[0], true).unwrap();
        tree.set_scale(0.5).unwrap();
        tree.set_strain(edges[0], 0.1).unwrap();
        tree.add_condition(Condition::EdgesSameStrain { a: edges[0], b: edges[1] })
            .unwrap();

        let mut driver = EdgeOptimizer::new(&mut tree, kind.build());
        driver.initialize(&leaves, &edges[1..]).unwrap();
        let report = driver.optimize().unwrap();
        assert!(report.feasible, "{kind}");

        // Unconstrained, the stretchy edge would reach 2√2 − 2.1.
        assert_relative_eq!(tree.edge(edges[1]).unwrap().strain(), 0.1, epsilon = 1e-6);
        assert_relative_eq!(tree.edge(edges[0]).unwrap().strain(), 0.1);
    }
}
