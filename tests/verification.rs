// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::{Arc, Mutex};

use ndarray::ArrayD;

use eikonal_agsi::buffer::BufferPolicy;
use eikonal_agsi::config::{ActiveBlockBound, RunConfig, RunOptions, SolverKind};
use eikonal_agsi::core::BlockGrid;
use eikonal_agsi::error::EikonalError;
use eikonal_agsi::monitor::NonConvergence;
use eikonal_agsi::precision::OutputPrecision;
use eikonal_agsi::scheduler::{ProgressInfo, SolveOutput, Solver};
use eikonal_agsi::update_kernels::IsotropicKernel;

fn at(values: &ArrayD<f64>, idx: &[usize]) -> f64 {
    values[idx]
}

fn line_5(config: RunConfig) -> Solver<1> {
    let grid = BlockGrid::<1>::new([5], [8]).unwrap();
    let mut solver = Solver::uniform(grid, 1.0, config).unwrap();
    solver.add_seed([0], 0.0).unwrap();
    solver
}

/// Alternating cost 1 / 2 on 4x4 patches, aligned with the tiles.
fn checkerboard_2d(n: usize, seed: [usize; 2], config: RunConfig) -> Solver<2> {
    let cost = ArrayD::from_shape_fn(vec![n, n], |idx| {
        if (idx[0] / 4 + idx[1] / 4) % 2 == 0 {
            1.0
        } else {
            2.0
        }
    });
    let grid = BlockGrid::<2>::new([n, n], [4, 4]).unwrap();
    let mut solver = Solver::new(grid, cost, config).unwrap();
    solver.add_seed(seed, 0.0).unwrap();
    solver
}

fn max_abs_diff(a: &SolveOutput, b: &SolveOutput) -> f64 {
    a.values
        .iter()
        .zip(b.values.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// 1-D, 5 points, seed at 0, cost 1: global iteration advances one point
/// per round and stops on the fifth round, when nothing changes.
#[test]
fn line_scenario_global_iteration() {
    let kernel = IsotropicKernel::new();
    for policy in [BufferPolicy::InPlace, BufferPolicy::Strict] {
        let config = RunConfig::default()
            .with_solver(SolverKind::GlobalIteration)
            .with_policy(policy);
        let out = line_5(config).solve(&kernel).unwrap();
        assert_eq!(out.rounds, 5, "policy {:?}", policy);
        assert!(out.converged);
        assert!(out.warning.is_none());
        assert_eq!(out.values.as_slice().unwrap(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}

/// Round cap of 1 on the same domain: fatal by default, a warning naming the
/// cap when downgraded.
#[test]
fn line_scenario_non_convergence() {
    let kernel = IsotropicKernel::new();
    for solver in [SolverKind::GlobalIteration, SolverKind::Agsi] {
        let config = RunConfig::default().with_solver(solver).with_max_rounds(1);
        let result = line_5(config.clone()).solve(&kernel);
        assert!(
            matches!(result, Err(EikonalError::NonConvergence { max_rounds: 1, .. })),
            "{:?}",
            result
        );

        let out = line_5(config.with_non_convergence(NonConvergence::Warn))
            .solve(&kernel)
            .unwrap();
        assert!(!out.converged);
        assert_eq!(out.rounds, 1);
        let warning = out.warning.unwrap();
        assert!(warning.contains(&solver.to_string()));
        assert!(warning.contains("number 1 of iterations"), "{}", warning);
        let values = out.values.as_slice().unwrap();
        assert_eq!(&values[..2], &[0.0, 1.0]);
        assert!(values[2..].iter().all(|v| v.is_infinite()));
    }
}

#[test]
fn options_drive_lenient_path() {
    let opts: RunOptions = serde_json::from_str(
        r#"{"solver": "global_iteration", "nitermax_o": 1, "raiseOnNonConvergence": false}"#,
    )
    .unwrap();
    let config = RunConfig::try_from(opts).unwrap();
    let out = line_5(config).solve(&IsotropicKernel::new()).unwrap();
    assert!(out.warning.is_some());
}

/// Without pruning and with strict buffering, AGSI visits only flagged blocks
/// but must reproduce global iteration round for round.
#[test]
fn flagged_agsi_matches_global_iteration() {
    let kernel = IsotropicKernel::new();
    let strict = RunConfig::default().with_policy(BufferPolicy::Strict);

    let global = checkerboard_2d(32, [5, 9], strict.clone().with_solver(SolverKind::GlobalIteration))
        .solve(&kernel)
        .unwrap();
    let flagged = checkerboard_2d(32, [5, 9], strict.with_pruning(false))
        .solve(&kernel)
        .unwrap();

    assert!(global.converged && flagged.converged);
    assert_eq!(global.rounds, flagged.rounds);
    assert_eq!(global.values, flagged.values);
    assert!(global.values.iter().all(|v| v.is_finite() && *v >= 0.0));
}

/// With in-place updates the visiting order differs between strategies, and so
/// may the round counts, but every schedule must settle on the same field.
#[test]
fn in_place_schedules_share_fixed_point() {
    let kernel = IsotropicKernel::new();
    let in_place = RunConfig::default().with_policy(BufferPolicy::InPlace);
    for seed in [[0, 0], [5, 9], [20, 3], [31, 31]] {
        let global = checkerboard_2d(
            32,
            seed,
            in_place.clone().with_solver(SolverKind::GlobalIteration),
        )
        .solve(&kernel)
        .unwrap();
        let flagged = checkerboard_2d(32, seed, in_place.clone().with_pruning(false))
            .solve(&kernel)
            .unwrap();
        let pruned = checkerboard_2d(32, seed, in_place.clone())
            .solve(&kernel)
            .unwrap();
        let strict = checkerboard_2d(
            32,
            seed,
            RunConfig::default()
                .with_solver(SolverKind::GlobalIteration)
                .with_policy(BufferPolicy::Strict),
        )
        .solve(&kernel)
        .unwrap();

        for (name, out) in [("flagged", &flagged), ("pruned", &pruned), ("strict", &strict)] {
            assert!(out.converged);
            let diff = max_abs_diff(&global, out);
            assert!(diff < 1e-5, "seed {:?}, {}: max diff {}", seed, name, diff);
        }
    }
}

/// Node slowness: crossing from a cost-1 patch into a cost-2 patch along a
/// row accumulates the cost of each node reached.
#[test]
fn slowness_is_taken_at_the_updated_node() {
    let mut cost = ArrayD::from_elem(vec![8], 1.0);
    for c in cost.iter_mut().skip(4) {
        *c = 2.0;
    }
    let grid = BlockGrid::<1>::new([8], [8]).unwrap();
    let mut solver = Solver::new(grid, cost, RunConfig::default()).unwrap();
    solver.add_seed([0], 0.0).unwrap();
    let out = solver.solve(&IsotropicKernel::new()).unwrap();
    assert_eq!(
        out.values.as_slice().unwrap(),
        &[0.0, 1.0, 2.0, 3.0, 5.0, 7.0, 9.0, 11.0]
    );
}

#[test]
fn pruned_agsi_reaches_same_fixed_point() {
    let kernel = IsotropicKernel::new();
    let global = checkerboard_2d(
        32,
        [20, 3],
        RunConfig::default().with_solver(SolverKind::GlobalIteration),
    )
    .solve(&kernel)
    .unwrap();
    for policy in [BufferPolicy::InPlace, BufferPolicy::Strict] {
        let pruned = checkerboard_2d(32, [20, 3], RunConfig::default().with_policy(policy))
            .solve(&kernel)
            .unwrap();
        assert!(pruned.converged);
        let diff = max_abs_diff(&global, &pruned);
        assert!(diff < 1e-3, "policy {:?}: max diff {}", policy, diff);
    }
}

/// Repeated runs give identical fields and round counts, with any thread count.
#[test]
fn agsi_is_deterministic() {
    let kernel = IsotropicKernel::new().with_inner_iterations(3);
    let config = RunConfig::default().with_policy(BufferPolicy::Strict);
    let reference = checkerboard_2d(48, [40, 11], config.clone())
        .solve(&kernel)
        .unwrap();
    for threads in [1, 2, 4] {
        let out = checkerboard_2d(48, [40, 11], config.clone())
            .with_threads(threads)
            .solve(&kernel)
            .unwrap();
        assert_eq!(out.rounds, reference.rounds, "threads {}", threads);
        assert_eq!(out.values, reference.values, "threads {}", threads);
    }
}

/// With active-block bounding the window engages, stays monotone, and the run
/// still reaches the unbounded fixed point.
#[test]
fn bounded_agsi_window_is_monotone_and_converges() {
    let kernel = IsotropicKernel::new();
    let windows = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&windows);

    let config = RunConfig::default()
        .with_active_block_bound(ActiveBlockBound::Count(2.0))
        .with_max_rounds(100_000);
    let bounded = checkerboard_2d(64, [0, 0], config)
        .with_progress(Box::new(move |info: ProgressInfo| {
            sink.lock().unwrap().push(info.window);
        }))
        .solve(&kernel)
        .unwrap();
    let unbounded = checkerboard_2d(64, [0, 0], RunConfig::default())
        .solve(&kernel)
        .unwrap();

    assert!(bounded.converged);
    let diff = max_abs_diff(&bounded, &unbounded);
    assert!(diff < 1e-3, "max diff {}", diff);

    let windows = windows.lock().unwrap();
    assert_eq!(windows.len(), bounded.rounds);
    assert!(windows.iter().any(|w| w.is_bounded()));
    let mut last_prev = f64::NEG_INFINITY;
    for (round, w) in windows.iter().enumerate() {
        assert!(w.next >= w.prev, "round {}: {:?}", round + 1, w);
        if w.prev.is_finite() {
            assert!(w.prev >= last_prev, "round {}: {:?}", round + 1, w);
            last_prev = w.prev;
        }
    }
}

#[test]
fn auto_bound_converges() {
    let config = RunConfig::default().with_active_block_bound(ActiveBlockBound::Auto);
    let out = checkerboard_2d(32, [16, 16], config)
        .solve(&IsotropicKernel::new())
        .unwrap();
    assert!(out.converged);
    assert!(out.values.iter().all(|v| v.is_finite()));
}

/// Fine spacing over a long line: f32 accumulation drifts, the split
/// representation keeps the error near the f32 resolution of one quantum.
#[test]
fn multiprecision_keeps_long_range_accuracy() {
    let n = 2048;
    let h = 0.1;
    let kernel = IsotropicKernel::new().with_inner_iterations(8);
    let run = |output: OutputPrecision| {
        let config = RunConfig::default()
            .with_grid_scale(h)
            .with_tolerance(0.0)
            .with_multiprecision(output);
        let grid = BlockGrid::<1>::new([n], [8]).unwrap();
        let mut solver = Solver::uniform(grid, 1.0, config).unwrap();
        solver.add_seed([0], 0.0).unwrap();
        solver.solve(&kernel).unwrap()
    };

    let wide = run(OutputPrecision::Wide);
    assert!(wide.converged);
    let max_err = wide
        .values
        .iter()
        .enumerate()
        .map(|(i, &u)| (u - i as f64 * h).abs())
        .fold(0.0, f64::max);
    assert!(max_err < 1e-5, "wide max error {}", max_err);

    let native = run(OutputPrecision::Native);
    let max_err = native
        .values
        .iter()
        .enumerate()
        .map(|(i, &u)| (u - i as f64 * h).abs())
        .fold(0.0, f64::max);
    assert!(max_err < 1e-3, "native max error {}", max_err);
}

#[test]
fn precision_overflow_is_surfaced() {
    let kernel = IsotropicKernel::new();
    let config = RunConfig::default().with_multiprecision(OutputPrecision::Wide);
    // step = 1/16, bound = i32::MAX / 32 ~ 6.7e7
    let grid = BlockGrid::<1>::new([5], [8]).unwrap();

    let mut solver = Solver::uniform(grid.clone(), 1.0, config.clone()).unwrap();
    solver.add_seed([0], 1e8).unwrap();
    assert!(matches!(
        solver.solve(&kernel),
        Err(EikonalError::PrecisionOverflow { .. })
    ));

    let mut solver = Solver::uniform(grid, 1.0, config).unwrap();
    solver.add_seed([0], 67_108_863.0).unwrap();
    assert!(matches!(
        solver.solve(&kernel),
        Err(EikonalError::PrecisionOverflow { .. })
    ));
}

#[test]
fn periodic_axis_wraps_propagation() {
    let kernel = IsotropicKernel::new();
    for pruning in [true, false] {
        let grid = BlockGrid::<1>::new([16], [8]).unwrap().with_periodic([true]);
        let mut solver =
            Solver::uniform(grid, 1.0, RunConfig::default().with_pruning(pruning)).unwrap();
        solver.add_seed([0], 0.0).unwrap();
        let out = solver.solve(&kernel).unwrap();
        for (i, &u) in out.values.iter().enumerate() {
            let expected = i.min(16 - i) as f64;
            assert_eq!(u, expected, "pruning={} i={}", pruning, i);
        }
    }
}

/// Point source in 3-D with padded tiles: finite everywhere, exact along the
/// axes through the source, symmetric under axis exchange.
#[test]
fn point_source_3d_with_padding() {
    let n = 15;
    let c = 7;
    let grid = BlockGrid::<3>::new([n, n, n], [2, 2, 2]).unwrap();
    let mut solver = Solver::uniform(grid, 1.0, RunConfig::default()).unwrap();
    solver.add_seed([c, c, c], 0.0).unwrap();
    let out = solver
        .solve(&IsotropicKernel::new().with_inner_iterations(2))
        .unwrap();
    assert!(out.converged);
    assert!(out.values.iter().all(|v| v.is_finite() && *v >= 0.0));

    for d in 1..=c {
        let u = at(&out.values, &[c + d, c, c]);
        assert!((u - d as f64).abs() < 1e-5, "axis distance {}: {}", d, u);
        let v = at(&out.values, &[c, c - d, c]);
        assert!((v - d as f64).abs() < 1e-5, "axis distance {}: {}", d, v);
    }
    for i in 0..n {
        for j in 0..n {
            let a = at(&out.values, &[i, j, c]);
            let b = at(&out.values, &[j, i, c]);
            assert!((a - b).abs() < 1e-4, "asymmetry at [{}, {}]: {} vs {}", i, j, a, b);
        }
    }
}

#[test]
fn setup_errors_precede_rounds() {
    let kernel = IsotropicKernel::new();
    let grid = BlockGrid::<2>::new([10, 10], [2, 3]).unwrap();
    let mut solver = Solver::uniform(grid, 1.0, RunConfig::default()).unwrap();
    solver.add_seed([0, 0], 0.0).unwrap();
    assert!(matches!(
        solver.solve(&kernel),
        Err(EikonalError::BitPackWidth { cells: 6 })
    ));

    let config = RunConfig::default()
        .with_active_block_bound(ActiveBlockBound::Count(1.0))
        .with_min_chg_delta_min(0.0);
    let grid = BlockGrid::<1>::new([256], [8]).unwrap();
    assert!(matches!(
        Solver::uniform(grid, 1.0, config),
        Err(EikonalError::InvalidDeltaMin(_))
    ));

    let opts = RunOptions {
        solver: "fast_marching".to_string(),
        ..RunOptions::default()
    };
    assert!(matches!(
        RunConfig::try_from(opts),
        Err(EikonalError::UnrecognizedSolver(_))
    ));
}
