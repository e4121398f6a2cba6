// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::time::{Duration, Instant};

use ndarray::ArrayD;
use tracing::{debug, info};

use crate::active_set::{ActiveSetController, AdmissionControl, CausalityWindow, FlagSchedule};
use crate::buffer::DoubleBuffer;
use crate::config::{RunConfig, SolverKind};
use crate::core::{BlockGrid, SeedTags, TilingScheme};
use crate::error::{EikonalError, Result};
use crate::kernel::{FieldSet, Launch, LaunchMode, UpdateKernel};
use crate::monitor::{ConvergenceMonitor, Termination};
use crate::precision::PrecisionModel;

/// Progress information passed to the optional callback after each round.
#[derive(Debug, Clone, Copy)]
pub struct ProgressInfo {
    /// Rounds dispatched so far.
    pub round: usize,
    /// Length of the update list dispatched this round.
    pub candidates: usize,
    /// Listed blocks in the active range.
    pub active: usize,
    /// Listed blocks carried over as frozen.
    pub frozen: usize,
    /// Causality window in effect for the round.
    pub window: CausalityWindow,
    /// Elapsed time since the solve started.
    pub elapsed: Duration,
}

/// Everything a strategy mutates during one run.
pub struct RunState<'a, const N: usize> {
    /// Block layout.
    pub grid: &'a BlockGrid<N>,
    /// Field buffers.
    pub fields: FieldSet,
    /// Quantization under multiprecision.
    pub precision: Option<PrecisionModel>,
    /// Grid spacing.
    pub grid_scale: f64,
    /// Change tolerance.
    pub tol: f64,
    /// Sorted blocks holding at least one seed.
    pub seed_blocks: Vec<usize>,
    /// Smallest seed value per block, `+inf` for blocks without seeds.
    pub seed_min_chg: Vec<f32>,
    start: Instant,
    progress: Option<&'a (dyn Fn(ProgressInfo) + Send + Sync)>,
}

impl<'a, const N: usize> RunState<'a, N> {
    fn launch<'b>(&'b mut self, mode: LaunchMode<'b>) -> Launch<'b, N> {
        Launch {
            grid: self.grid,
            fields: &mut self.fields,
            precision: self.precision.as_ref(),
            grid_scale: self.grid_scale,
            tol: self.tol,
            mode,
        }
    }

    fn report(&self, info: ProgressInfo) {
        debug!(
            round = info.round,
            candidates = info.candidates,
            active = info.active,
            frozen = info.frozen,
            window_prev = info.window.prev,
            window_next = info.window.next,
            "round complete"
        );
        if let Some(cb) = self.progress {
            cb(info);
        }
    }
}

/// A round-orchestration policy.
pub trait SolverStrategy<const N: usize> {
    /// Name reported in logs and non-convergence messages.
    fn name(&self) -> &'static str;

    /// Dispatch rounds until the termination condition or the monitor's cap.
    fn run(
        &mut self,
        kernel: &dyn UpdateKernel<N>,
        state: &mut RunState<'_, N>,
        monitor: &mut ConvergenceMonitor,
    ) -> Result<Termination>;
}

/// Every block, every round, until no block changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalIteration;

impl<const N: usize> SolverStrategy<N> for GlobalIteration {
    fn name(&self) -> &'static str {
        SolverKind::GlobalIteration.as_str()
    }

    fn run(
        &mut self,
        kernel: &dyn UpdateKernel<N>,
        state: &mut RunState<'_, N>,
        monitor: &mut ConvergenceMonitor,
    ) -> Result<Termination> {
        let blocks: Vec<usize> = (0..state.grid.size_o()).collect();
        loop {
            if !monitor.begin_round() {
                return Ok(Termination::Exhausted);
            }
            let mut changed = false;
            kernel.invoke(state.launch(LaunchMode::Global {
                blocks: &blocks,
                changed: &mut changed,
            }))?;
            state.fields.swap();
            state.report(ProgressInfo {
                round: monitor.rounds(),
                candidates: blocks.len(),
                active: blocks.len(),
                frozen: 0,
                window: CausalityWindow::UNBOUNDED,
                elapsed: state.start.elapsed(),
            });
            if !changed {
                return Ok(Termination::Converged);
            }
        }
    }
}

/// Adaptive Gauss-Seidel iteration: only blocks nominated by a change are revisited.
#[derive(Debug, Clone)]
pub struct Agsi {
    pruning: bool,
    admission: Option<(f64, f64)>,
}

impl Agsi {
    /// Candidate-list variant when `pruning`, per-block flags otherwise.
    pub fn new(pruning: bool) -> Self {
        Agsi {
            pruning,
            admission: None,
        }
    }

    /// Bound admitted blocks to about `target` per round (builder method).
    pub fn with_admission(mut self, target: f64, delta_min: f64) -> Self {
        self.admission = Some((target, delta_min));
        self
    }

    fn run_pruned<const N: usize>(
        &self,
        kernel: &dyn UpdateKernel<N>,
        state: &mut RunState<'_, N>,
        monitor: &mut ConvergenceMonitor,
    ) -> Result<Termination> {
        let size_i = state.grid.size_i();
        let mut controller = ActiveSetController::new(
            state.grid.size_o(),
            state.grid.slots_per_block(),
            &state.seed_blocks,
            state.seed_min_chg.clone(),
            self.admission
                .map(|(target, delta_min)| AdmissionControl::new(target, delta_min)),
        );

        loop {
            if controller.is_converged() {
                return Ok(Termination::Converged);
            }
            if !monitor.begin_round() {
                return Ok(Termination::Exhausted);
            }

            let info = ProgressInfo {
                round: monitor.rounds(),
                candidates: controller.candidates().len(),
                active: controller.active_count(),
                frozen: controller.frozen_count(),
                window: controller.window(),
                elapsed: Duration::ZERO,
            };
            let touched = controller.distinct_blocks();
            let mut slots = controller.expand();
            let buffers = controller.round_buffers()?;
            kernel.invoke(state.launch(LaunchMode::Propagate {
                slots: &mut slots,
                buffers,
            }))?;

            state.fields.swap();
            state.fields.resync(size_i, &touched);
            controller.absorb(&slots);
            state.report(ProgressInfo {
                elapsed: state.start.elapsed(),
                ..info
            });
        }
    }

    fn run_flagged<const N: usize>(
        &self,
        kernel: &dyn UpdateKernel<N>,
        state: &mut RunState<'_, N>,
        monitor: &mut ConvergenceMonitor,
    ) -> Result<Termination> {
        let size_i = state.grid.size_i();
        let mut schedule = FlagSchedule::new(state.grid, &state.seed_blocks);

        loop {
            let blocks = schedule.take_list();
            if blocks.is_empty() {
                return Ok(Termination::Converged);
            }
            if !monitor.begin_round() {
                return Ok(Termination::Exhausted);
            }

            kernel.invoke(state.launch(LaunchMode::Flagged {
                blocks: &blocks,
                flags: schedule.flags_mut(),
            }))?;

            state.fields.swap();
            state.fields.resync(size_i, &blocks);
            state.report(ProgressInfo {
                round: monitor.rounds(),
                candidates: blocks.len(),
                active: blocks.len(),
                frozen: 0,
                window: CausalityWindow::UNBOUNDED,
                elapsed: state.start.elapsed(),
            });
        }
    }
}

impl<const N: usize> SolverStrategy<N> for Agsi {
    fn name(&self) -> &'static str {
        SolverKind::Agsi.as_str()
    }

    fn run(
        &mut self,
        kernel: &dyn UpdateKernel<N>,
        state: &mut RunState<'_, N>,
        monitor: &mut ConvergenceMonitor,
    ) -> Result<Termination> {
        if self.pruning {
            self.run_pruned(kernel, state, monitor)
        } else {
            self.run_flagged(kernel, state, monitor)
        }
    }
}

/// Result of a solve.
#[derive(Debug, Clone)]
pub struct SolveOutput {
    /// Reconstructed value field, in the domain shape.
    pub values: ArrayD<f64>,
    /// Kernel dispatches performed.
    pub rounds: usize,
    /// Whether the termination condition was observed within the round cap.
    pub converged: bool,
    /// Non-convergence message on the lenient path.
    pub warning: Option<String>,
    /// Wall time of the solve.
    pub elapsed: Duration,
    /// Buffer composition handed to the kernel.
    pub layout: Vec<&'static str>,
}

/// Block-structured propagation solver.
///
/// Holds the domain, cost field, seeds and configuration; each call to
/// [`solve`](Self::solve) builds fresh buffers, so runs never share state.
pub struct Solver<const N: usize> {
    grid: BlockGrid<N>,
    cost: ArrayD<f64>,
    config: RunConfig,
    seeds: Vec<([usize; N], f64)>,
    drift: Option<Vec<ArrayD<f64>>>,
    num_threads: Option<usize>,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl<const N: usize> Solver<N> {
    /// Create a solver for `cost` laid out on `grid`.
    ///
    /// # Errors
    /// Returns an error if `cost` does not have the domain shape or the
    /// configuration is invalid.
    pub fn new(grid: BlockGrid<N>, cost: ArrayD<f64>, config: RunConfig) -> Result<Self> {
        if cost.shape() != grid.shape().as_slice() {
            return Err(EikonalError::ShapeMismatch {
                expected: grid.shape().to_vec(),
                got: cost.shape().to_vec(),
            });
        }
        config.validate()?;
        Ok(Solver {
            grid,
            cost,
            config,
            seeds: Vec::new(),
            drift: None,
            num_threads: None,
            progress_callback: None,
        })
    }

    /// Create a solver with the same cost everywhere.
    pub fn uniform(grid: BlockGrid<N>, cost: f64, config: RunConfig) -> Result<Self> {
        let cost = ArrayD::from_elem(grid.shape().as_slice(), cost);
        Self::new(grid, cost, config)
    }

    /// Fix the value at a grid point for the whole run.
    ///
    /// # Errors
    /// Returns an error if the point is outside the domain or the value is not finite.
    pub fn add_seed(&mut self, index: [usize; N], value: f64) -> Result<()> {
        if !self.grid.in_domain(index) {
            return Err(EikonalError::InvalidSeed {
                index: index.to_vec(),
                reason: format!("outside domain of shape {:?}", self.grid.shape()),
            });
        }
        if !value.is_finite() {
            return Err(EikonalError::InvalidSeed {
                index: index.to_vec(),
                reason: format!("value {} is not finite", value),
            });
        }
        self.seeds.retain(|(x, _)| *x != index);
        self.seeds.push((index, value));
        Ok(())
    }

    /// Attach a drift field, one array per axis (builder method).
    ///
    /// # Errors
    /// Returns an error if a component does not have the domain shape.
    pub fn with_drift(mut self, drift: [ArrayD<f64>; N]) -> Result<Self> {
        for component in &drift {
            if component.shape() != self.grid.shape().as_slice() {
                return Err(EikonalError::ShapeMismatch {
                    expected: self.grid.shape().to_vec(),
                    got: component.shape().to_vec(),
                });
            }
        }
        self.drift = Some(drift.into_iter().collect());
        Ok(self)
    }

    /// Set the number of Rayon worker threads (builder method).
    /// If not specified, the global pool is used.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Set a progress callback invoked after every round (builder method).
    pub fn with_progress(mut self, callback: Box<dyn Fn(ProgressInfo) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the configured strategy with `kernel` until convergence or the round cap.
    ///
    /// # Errors
    /// Shape, seed and layout errors are returned before any round runs.
    /// [`EikonalError::PrecisionOverflow`] is returned as soon as a kernel hits it;
    /// [`EikonalError::NonConvergence`] after the last permitted round, unless
    /// the configuration downgrades it to a warning.
    pub fn solve(&self, kernel: &dyn UpdateKernel<N>) -> Result<SolveOutput> {
        match self.num_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| EikonalError::Other(e.to_string()))?;
                pool.install(|| self.solve_inner(kernel))
            }
            None => self.solve_inner(kernel),
        }
    }

    fn solve_inner(&self, kernel: &dyn UpdateKernel<N>) -> Result<SolveOutput> {
        let start = Instant::now();
        let grid = &self.grid;
        let config = &self.config;

        grid.require_bitpack()?;
        if self.seeds.is_empty() {
            return Err(EikonalError::InvalidSeed {
                index: Vec::new(),
                reason: "no seeds were added".to_string(),
            });
        }

        let precision = if config.multiprecision {
            Some(PrecisionModel::quantize(config.grid_scale)?)
        } else {
            None
        };

        let padded_len = grid.padded_len();
        let size_i = grid.size_i();
        let mut values = vec![f32::INFINITY; padded_len];
        let mut corrections = precision.map(|_| vec![0i32; padded_len]);
        let mut tags = vec![false; padded_len];
        let mut seed_min_chg = vec![f32::INFINITY; grid.size_o()];
        let mut seed_blocks = Vec::with_capacity(self.seeds.len());
        for &(index, value) in &self.seeds {
            let n = grid.point_index(index);
            match (&precision, corrections.as_mut()) {
                (Some(p), Some(c)) => {
                    let (v, q) = p.split(value)?;
                    values[n] = v;
                    c[n] = q;
                }
                _ => values[n] = value as f32,
            }
            tags[n] = true;
            let b = n / size_i;
            seed_min_chg[b] = seed_min_chg[b].min(value as f32);
            seed_blocks.push(b);
        }
        seed_blocks.sort_unstable();
        seed_blocks.dedup();

        let geom = grid.expand(self.cost.mapv(|c| c as f32).view(), f32::INFINITY)?;
        let drift = match &self.drift {
            Some(components) => {
                let mut packed = Vec::with_capacity(N * padded_len);
                for component in components {
                    packed.extend(grid.expand(component.mapv(|d| d as f32).view(), f32::NAN)?);
                }
                Some(packed)
            }
            None => None,
        };

        let fields = FieldSet {
            values: DoubleBuffer::new(values, config.policy),
            corrections: corrections.map(|c| DoubleBuffer::new(c, config.policy)),
            geom,
            seed_tags: SeedTags::pack(&tags),
            drift,
        };
        kernel.check_layout(&fields)?;
        let layout = fields.arg_names();

        let (sum, count) = self
            .cost
            .iter()
            .filter(|c| c.is_finite())
            .fold((0.0, 0usize), |(s, n), &c| (s + c, n + 1));
        let mean_cost = if count > 0 { sum / count as f64 } else { 0.0 };
        let tol = config.tolerance(mean_cost);

        let mut strategy: Box<dyn SolverStrategy<N>> = match config.solver {
            SolverKind::GlobalIteration => Box::new(GlobalIteration),
            SolverKind::Agsi => {
                let mut agsi = Agsi::new(config.pruning);
                if let Some(target) = config.active_block_bound.resolve(&grid.shape_o()) {
                    agsi = agsi.with_admission(target, config.delta_min());
                }
                Box::new(agsi)
            }
        };

        debug!(
            solver = strategy.name(),
            kernel = kernel.name(),
            shape = ?grid.shape(),
            tile = ?grid.tile_shape(),
            blocks = grid.size_o(),
            seeds = self.seeds.len(),
            tol,
            layout = ?layout,
            "starting solve"
        );

        let mut state = RunState {
            grid,
            fields,
            precision,
            grid_scale: config.grid_scale,
            tol,
            seed_blocks,
            seed_min_chg,
            start,
            progress: self.progress_callback.as_deref(),
        };
        let mut monitor = ConvergenceMonitor::new(config.max_rounds, config.non_convergence);
        let termination = strategy.run(kernel, &mut state, &mut monitor)?;
        let outcome = monitor.finish(termination, strategy.name())?;

        let RunState {
            fields, precision, ..
        } = state;
        let values = fields.values.into_current();
        let flat = match (precision, fields.corrections) {
            (Some(p), Some(c)) => p.reconstruct_field(&values, &c.into_current(), config.output)?,
            _ => values.iter().map(|&v| v as f64).collect(),
        };
        let values = grid.squeeze(&flat)?;

        let elapsed = start.elapsed();
        info!(
            solver = strategy.name(),
            rounds = outcome.rounds,
            converged = outcome.converged,
            elapsed_ms = elapsed.as_millis() as u64,
            "solve finished"
        );

        Ok(SolveOutput {
            values,
            rounds: outcome.rounds,
            converged: outcome.converged,
            warning: outcome.warning,
            elapsed,
            layout,
        })
    }
}
