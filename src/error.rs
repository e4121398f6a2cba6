// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// Errors raised while setting up or running the propagation scheduler.
///
/// Shape and configuration errors are raised at setup, before any round is
/// dispatched. Precision and convergence errors are raised after the attempt.
#[derive(Debug, Error)]
pub enum EikonalError {
    /// Domain shape has an empty axis.
    #[error("invalid domain shape: axis {axis} has size {size} (must be >= 1)")]
    InvalidDomainShape {
        /// The axis index.
        axis: usize,
        /// The size provided.
        size: usize,
    },
    /// Tile shape has an empty axis.
    #[error("invalid tile shape: axis {axis} has tile length {tile} (must be >= 1)")]
    InvalidTileShape {
        /// The axis index.
        axis: usize,
        /// The tile length provided.
        tile: usize,
    },
    /// Tile cell count is not a multiple of the seed-tag packing width.
    #[error("tile holds {cells} cells, which is not a multiple of the bit-packing width 8")]
    BitPackWidth {
        /// Number of cells per tile.
        cells: usize,
    },
    /// Array shape does not match expected shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Unknown `solver` option value.
    #[error("unrecognized solver: {0}")]
    UnrecognizedSolver(String),
    /// Grid scale is not positive and finite.
    #[error("invalid grid scale: {0} (must be positive and finite)")]
    InvalidGridScale(f64),
    /// Solver tolerance is negative or not finite.
    #[error("invalid tolerance: {0} (must be non-negative and finite)")]
    InvalidTolerance(f64),
    /// Iteration cap of zero rounds.
    #[error("invalid iteration cap: nitermax_o must be >= 1")]
    InvalidIterationCap,
    /// Active-block bound is not a positive count.
    #[error("invalid active block bound: {0} (must be positive and finite)")]
    InvalidActiveBlockBound(f64),
    /// Admission-window floor step is not positive and finite.
    #[error("invalid minChg_delta_min: {0} (must be positive and finite)")]
    InvalidDeltaMin(f64),
    /// Active-block bounding was requested without pruning.
    #[error("bound_active_blocks requires the pruning variant of AGSI")]
    BoundRequiresPruning,
    /// Multiprecision was requested with in-place updates.
    #[error("multiprecision requires strict double-buffering")]
    MultiprecisionRequiresStrict,
    /// Seed index is outside the domain or its value is unusable.
    #[error("invalid seed at {index:?}: {reason}")]
    InvalidSeed {
        /// The seed grid index.
        index: Vec<usize>,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// The kernel cannot consume a field present in the launch layout.
    #[error("kernel {kernel} does not support the {field} field")]
    UnsupportedField {
        /// Kernel name.
        kernel: String,
        /// Field name, as listed by `FieldSet::arg_names`.
        field: &'static str,
    },
    /// A corrected value left the range representable by the correction field.
    #[error("precision exhausted: corrected magnitude {magnitude} exceeds bound {bound}")]
    PrecisionOverflow {
        /// Magnitude the kernel needed to store.
        magnitude: f64,
        /// Largest representable corrected magnitude.
        bound: f64,
    },
    /// The round cap was reached before the termination condition.
    #[error(
        "solver {solver} did not reach convergence after maximum allowed number {max_rounds} of iterations"
    )]
    NonConvergence {
        /// Solver name.
        solver: String,
        /// Configured round cap.
        max_rounds: usize,
    },
    /// Other error with a descriptive message.
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results with EikonalError.
pub type Result<T> = std::result::Result<T, EikonalError>;
