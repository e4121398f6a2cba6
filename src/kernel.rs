// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Contract between the scheduler and a block update kernel.
//!
//! A kernel receives one [`Launch`] per round: the grid, every field buffer of
//! the run, and a [`LaunchMode`] telling it which blocks to update and how to
//! report what must run next. The scheduler never looks inside the fields.

use crate::active_set::RoundBuffers;
use crate::buffer::{BufferPolicy, DoubleBuffer};
use crate::core::{BlockGrid, SeedTags};
use crate::error::Result;
use crate::precision::{PrecisionModel, Quantum, Scalar};

/// Every buffer handed to the kernel, all in block-major layout.
#[derive(Debug, Clone)]
pub struct FieldSet {
    /// Solution values (`+inf` until reached).
    pub values: DoubleBuffer<Scalar>,
    /// Quantized corrections, present under multiprecision.
    pub corrections: Option<DoubleBuffer<Quantum>>,
    /// Per-point cost; `+inf` in the padding.
    pub geom: Vec<Scalar>,
    /// Points whose value is fixed for the whole run.
    pub seed_tags: SeedTags,
    /// Optional drift, `ndim` components stored one after another; NaN in the padding.
    pub drift: Option<Vec<Scalar>>,
}

impl FieldSet {
    /// Buffer policy shared by the value and correction fields.
    pub fn policy(&self) -> BufferPolicy {
        self.values.policy()
    }

    /// Ordered buffer composition, as a kernel would receive it positionally.
    pub fn arg_names(&self) -> Vec<&'static str> {
        let strict = self.policy() == BufferPolicy::Strict;
        let multiprecision = self.corrections.is_some();
        let mut names = vec!["values"];
        if multiprecision {
            names.push("valuesq");
        }
        if strict {
            names.push("valuesNext");
            if multiprecision {
                names.push("valuesqNext");
            }
        }
        names.push("geom");
        names.push("seedTags");
        if self.drift.is_some() {
            names.push("drift");
        }
        names
    }

    /// Swap value and correction buffers together.
    pub fn swap(&mut self) {
        self.values.swap();
        if let Some(corrections) = &mut self.corrections {
            corrections.swap();
        }
    }

    /// Copy the given blocks of the current buffers into the scratch buffers.
    pub fn resync(&mut self, size_i: usize, blocks: &[usize]) {
        self.values.resync(size_i, blocks);
        if let Some(corrections) = &mut self.corrections {
            corrections.resync(size_i, blocks);
        }
    }
}

/// What the kernel is asked to do this round.
pub enum LaunchMode<'a> {
    /// Update every listed block; set `changed` if any point changed.
    Global {
        /// Blocks to update.
        blocks: &'a [usize],
        /// Shared change flag.
        changed: &'a mut bool,
    },
    /// Update the listed blocks and flag the blocks to revisit next round.
    Flagged {
        /// Blocks to update.
        blocks: &'a [usize],
        /// One flag per block, raised by the kernel.
        flags: &'a mut [u8],
    },
    /// Rewrite each slot with a block to revisit or `NO_BLOCK`.
    ///
    /// Slots come in groups of `2 * ndim + 1` sharing one candidate id. Slot
    /// `0` nominates the candidate itself; slot `1 + 2 * axis + side` nominates
    /// its neighbor along `axis` (`side` 1 for the upper one). A frozen
    /// candidate is written back as `id + size_o`.
    Propagate {
        /// Expanded candidate list.
        slots: &'a mut [i64],
        /// Credits, change estimates and the causality window.
        buffers: RoundBuffers<'a>,
    },
}

/// One kernel dispatch.
pub struct Launch<'a, const N: usize> {
    /// Block layout of every field.
    pub grid: &'a BlockGrid<N>,
    /// Field buffers, exclusively lent for the round.
    pub fields: &'a mut FieldSet,
    /// Quantization, present under multiprecision.
    pub precision: Option<&'a PrecisionModel>,
    /// Grid spacing.
    pub grid_scale: f64,
    /// Smallest decrease that counts as a change.
    pub tol: f64,
    /// Blocks to update and how to report.
    pub mode: LaunchMode<'a>,
}

/// A per-block update rule the scheduler can dispatch.
pub trait UpdateKernel<const N: usize>: Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Reject field layouts the kernel cannot consume. Called once, before any round.
    fn check_layout(&self, _fields: &FieldSet) -> Result<()> {
        Ok(())
    }

    /// Run one round.
    fn invoke(&self, launch: Launch<'_, N>) -> Result<()>;
}
