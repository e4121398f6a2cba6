// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! A block-structured adaptive propagation scheduler for eikonal solvers.
//!
//! The domain is tiled into fixed-size blocks stored block-major. A pluggable
//! update kernel relaxes whole blocks; the scheduler decides, round by round,
//! which blocks to hand it. Two strategies are provided: global iteration
//! (every block, every round) and adaptive Gauss-Seidel iteration, which only
//! revisits blocks nominated by a neighbor's change and can cap the admitted
//! work per round with an adaptive causality window. Values can be stored as
//! `f32 + i32 * step` to keep precision across long propagation distances.

#![warn(missing_docs)]

/// Candidate lists, per-block flags and admission control.
pub mod active_set;
/// Ping-pong buffers.
pub mod buffer;
/// Run configuration and option metadata.
pub mod config;
/// Block grid layout and seed tags.
pub mod core;
/// Error types for the library.
pub mod error;
/// Kernel invocation contract.
pub mod kernel;
/// Round counting and non-convergence handling.
pub mod monitor;
/// Split-precision value storage.
pub mod precision;
/// Solver strategies and the solver facade.
pub mod scheduler;
/// Reference CPU update kernel.
pub mod update_kernels;

pub use crate::config::{RunConfig, RunOptions, SolverKind};
pub use crate::core::{BlockGrid, TilingScheme};
pub use crate::error::{EikonalError, Result};
pub use crate::kernel::UpdateKernel;
pub use crate::scheduler::{ProgressInfo, SolveOutput, Solver};
pub use crate::update_kernels::IsotropicKernel;
