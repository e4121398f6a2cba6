// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Run configuration.
//!
//! [`RunOptions`] is the loosely typed, serde-facing form using the option
//! names callers already know (`nitermax_o`, `raiseOnNonConvergence`, ...).
//! [`RunConfig`] is the validated form the solver consumes; converting one
//! into the other is where configuration errors are raised.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::buffer::BufferPolicy;
use crate::error::{EikonalError, Result};
use crate::monitor::NonConvergence;
use crate::precision::OutputPrecision;

/// Default round cap.
pub const DEFAULT_MAX_ROUNDS: usize = 2000;

/// Factor applied to `f32::EPSILON * grid_scale * mean(cost)` for the default tolerance.
const DEFAULT_TOL_FACTOR: f64 = 5.0;

/// Block-count factor of the automatic active-block bound.
const AUTO_BOUND_FACTOR: f64 = 12.0;

/// Scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Every block, every round.
    GlobalIteration,
    /// Adaptive Gauss-Seidel iteration.
    #[default]
    Agsi,
}

impl SolverKind {
    /// Canonical option spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::GlobalIteration => "global_iteration",
            SolverKind::Agsi => "AGSI",
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverKind {
    type Err = EikonalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global_iteration" => Ok(SolverKind::GlobalIteration),
            "AGSI" | "adaptive_gauss_siedel_iteration" => Ok(SolverKind::Agsi),
            other => Err(EikonalError::UnrecognizedSolver(other.to_string())),
        }
    }
}

/// `bound_active_blocks` as callers write it: a flag or a target count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundActiveBlocks {
    /// `false` disables bounding, `true` picks a target from the grid.
    Flag(bool),
    /// Explicit target count.
    Count(f64),
}

impl Default for BoundActiveBlocks {
    fn default() -> Self {
        BoundActiveBlocks::Flag(false)
    }
}

/// Validated active-block bound.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ActiveBlockBound {
    /// No admission control.
    #[default]
    Disabled,
    /// `12 * prod(So) / max(So)`.
    Auto,
    /// Explicit target count.
    Count(f64),
}

impl ActiveBlockBound {
    /// Target count for a block grid of outer shape `shape_o`, if bounding.
    pub fn resolve(&self, shape_o: &[usize]) -> Option<f64> {
        match *self {
            ActiveBlockBound::Disabled => None,
            ActiveBlockBound::Count(n) => Some(n),
            ActiveBlockBound::Auto => {
                let size_o: usize = shape_o.iter().product();
                let longest = shape_o.iter().copied().max().unwrap_or(1).max(1);
                Some(AUTO_BOUND_FACTOR * size_o as f64 / longest as f64)
            }
        }
    }
}

/// Caller-facing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunOptions {
    /// `global_iteration` or `AGSI`.
    pub solver: String,
    /// Split values into `f32 + i32 * step`.
    pub multiprecision: bool,
    /// Reconstruct multiprecision output directly in f64.
    pub values_float64: bool,
    /// Round cap.
    pub nitermax_o: usize,
    /// Active-block bound.
    pub bound_active_blocks: BoundActiveBlocks,
    /// Admission-window floor step; defaults to `gridScale / 10`.
    #[serde(rename = "minChg_delta_min")]
    pub min_chg_delta_min: Option<f64>,
    /// Fail on non-convergence instead of warning.
    #[serde(rename = "raiseOnNonConvergence")]
    pub raise_on_non_convergence: bool,
    /// Strict double-buffering; forced on by `multiprecision`.
    pub strict_iter_o: bool,
    /// Candidate-list AGSI (`true`) or per-block flags (`false`).
    pub pruning: bool,
    /// Grid spacing.
    #[serde(rename = "gridScale")]
    pub grid_scale: f64,
    /// Change tolerance; defaults from the cost field.
    pub tol: Option<f64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            solver: SolverKind::default().as_str().to_string(),
            multiprecision: false,
            values_float64: false,
            nitermax_o: DEFAULT_MAX_ROUNDS,
            bound_active_blocks: BoundActiveBlocks::default(),
            min_chg_delta_min: None,
            raise_on_non_convergence: true,
            strict_iter_o: false,
            pruning: true,
            grid_scale: 1.0,
            tol: None,
        }
    }
}

/// Static description of one option.
#[derive(Debug, Clone, Copy)]
pub struct OptionDoc {
    /// Option key.
    pub key: &'static str,
    /// Default, as text.
    pub default: &'static str,
    /// One-line help.
    pub help: &'static str,
}

/// Every recognized option with its default and help text.
pub const OPTION_DOCS: &[OptionDoc] = &[
    OptionDoc {
        key: "solver",
        default: "AGSI",
        help: "Scheduling strategy: global_iteration or AGSI",
    },
    OptionDoc {
        key: "multiprecision",
        default: "false",
        help: "Store values as f32 plus an integer multiple of a fixed step",
    },
    OptionDoc {
        key: "values_float64",
        default: "false",
        help: "Reconstruct multiprecision values directly in f64",
    },
    OptionDoc {
        key: "nitermax_o",
        default: "2000",
        help: "Maximum number of rounds",
    },
    OptionDoc {
        key: "bound_active_blocks",
        default: "false",
        help: "Target admitted-block count, true for 12*prod(So)/max(So), false to disable",
    },
    OptionDoc {
        key: "minChg_delta_min",
        default: "gridScale/10",
        help: "Minimum growth of the admission window per round",
    },
    OptionDoc {
        key: "raiseOnNonConvergence",
        default: "true",
        help: "Fail when the round cap is reached, instead of warning",
    },
    OptionDoc {
        key: "strict_iter_o",
        default: "false",
        help: "Double-buffer the value field (forced by multiprecision)",
    },
    OptionDoc {
        key: "pruning",
        default: "true",
        help: "Use the candidate list instead of per-block flags (AGSI)",
    },
    OptionDoc {
        key: "gridScale",
        default: "1",
        help: "Grid spacing",
    },
    OptionDoc {
        key: "tol",
        default: "5*eps(f32)*gridScale*mean(cost)",
        help: "Smallest decrease counted as a change",
    },
];

/// Validated run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Scheduling strategy.
    pub solver: SolverKind,
    /// AGSI with a candidate list (`true`) or per-block flags.
    pub pruning: bool,
    /// Buffer policy of the value and correction fields.
    pub policy: BufferPolicy,
    /// Split-precision storage.
    pub multiprecision: bool,
    /// Output reconstruction precision.
    pub output: OutputPrecision,
    /// Round cap.
    pub max_rounds: usize,
    /// Admission control.
    pub active_block_bound: ActiveBlockBound,
    /// Explicit admission-window floor step.
    pub min_chg_delta_min: Option<f64>,
    /// Severity of non-convergence.
    pub non_convergence: NonConvergence,
    /// Grid spacing.
    pub grid_scale: f64,
    /// Explicit change tolerance.
    pub tol: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            solver: SolverKind::default(),
            pruning: true,
            policy: BufferPolicy::InPlace,
            multiprecision: false,
            output: OutputPrecision::Native,
            max_rounds: DEFAULT_MAX_ROUNDS,
            active_block_bound: ActiveBlockBound::Disabled,
            min_chg_delta_min: None,
            non_convergence: NonConvergence::Raise,
            grid_scale: 1.0,
            tol: None,
        }
    }
}

impl RunConfig {
    /// Set the strategy (builder method).
    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Choose between candidate-list and flag AGSI (builder method).
    pub fn with_pruning(mut self, pruning: bool) -> Self {
        self.pruning = pruning;
        self
    }

    /// Set the buffer policy (builder method). Multiprecision requires [`BufferPolicy::Strict`].
    pub fn with_policy(mut self, policy: BufferPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable split-precision storage (builder method). Forces strict buffering.
    pub fn with_multiprecision(mut self, output: OutputPrecision) -> Self {
        self.multiprecision = true;
        self.output = output;
        self.policy = BufferPolicy::Strict;
        self
    }

    /// Set the round cap (builder method).
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the active-block bound (builder method).
    pub fn with_active_block_bound(mut self, bound: ActiveBlockBound) -> Self {
        self.active_block_bound = bound;
        self
    }

    /// Set the admission-window floor step (builder method).
    pub fn with_min_chg_delta_min(mut self, delta: f64) -> Self {
        self.min_chg_delta_min = Some(delta);
        self
    }

    /// Set the non-convergence severity (builder method).
    pub fn with_non_convergence(mut self, policy: NonConvergence) -> Self {
        self.non_convergence = policy;
        self
    }

    /// Set the grid spacing (builder method).
    pub fn with_grid_scale(mut self, grid_scale: f64) -> Self {
        self.grid_scale = grid_scale;
        self
    }

    /// Set the change tolerance (builder method).
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    /// Check every field. Called by the solver before any round.
    pub fn validate(&self) -> Result<()> {
        if !self.grid_scale.is_finite() || self.grid_scale <= 0.0 {
            return Err(EikonalError::InvalidGridScale(self.grid_scale));
        }
        if let Some(tol) = self.tol {
            if !tol.is_finite() || tol < 0.0 {
                return Err(EikonalError::InvalidTolerance(tol));
            }
        }
        if self.max_rounds == 0 {
            return Err(EikonalError::InvalidIterationCap);
        }
        if let Some(delta) = self.min_chg_delta_min {
            if !delta.is_finite() || delta <= 0.0 {
                return Err(EikonalError::InvalidDeltaMin(delta));
            }
        }
        if let ActiveBlockBound::Count(n) = self.active_block_bound {
            if !n.is_finite() || n <= 0.0 {
                return Err(EikonalError::InvalidActiveBlockBound(n));
            }
        }
        if self.solver == SolverKind::Agsi
            && !self.pruning
            && self.active_block_bound != ActiveBlockBound::Disabled
        {
            return Err(EikonalError::BoundRequiresPruning);
        }
        if self.multiprecision && self.policy != BufferPolicy::Strict {
            return Err(EikonalError::MultiprecisionRequiresStrict);
        }
        Ok(())
    }

    /// Change tolerance for a cost field with the given finite mean.
    pub fn tolerance(&self, mean_cost: f64) -> f64 {
        self.tol.unwrap_or_else(|| {
            DEFAULT_TOL_FACTOR * f32::EPSILON as f64 * self.grid_scale * mean_cost.abs()
        })
    }

    /// Admission-window floor step.
    pub fn delta_min(&self) -> f64 {
        self.min_chg_delta_min.unwrap_or(self.grid_scale / 10.0)
    }
}

impl TryFrom<RunOptions> for RunConfig {
    type Error = EikonalError;

    fn try_from(opts: RunOptions) -> Result<Self> {
        let solver: SolverKind = opts.solver.parse()?;
        let active_block_bound = match opts.bound_active_blocks {
            BoundActiveBlocks::Flag(false) => ActiveBlockBound::Disabled,
            BoundActiveBlocks::Flag(true) => ActiveBlockBound::Auto,
            BoundActiveBlocks::Count(n) => ActiveBlockBound::Count(n),
        };
        let policy = if opts.strict_iter_o || opts.multiprecision {
            BufferPolicy::Strict
        } else {
            BufferPolicy::InPlace
        };
        let output = if opts.values_float64 {
            OutputPrecision::Wide
        } else {
            OutputPrecision::Native
        };
        let non_convergence = if opts.raise_on_non_convergence {
            NonConvergence::Raise
        } else {
            NonConvergence::Warn
        };

        let config = RunConfig {
            solver,
            pruning: opts.pruning,
            policy,
            multiprecision: opts.multiprecision,
            output,
            max_rounds: opts.nitermax_o,
            active_block_bound,
            min_chg_delta_min: opts.min_chg_delta_min,
            non_convergence,
            grid_scale: opts.grid_scale,
            tol: opts.tol,
        };
        config.validate()?;
        Ok(config)
    }
}
