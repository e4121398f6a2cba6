// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Active set bookkeeping for adaptive Gauss-Seidel iteration.
//!
//! The pruning variant keeps an explicit candidate list of block ids. Each
//! round the list is expanded to `2 * ndim + 1` slots per candidate (the block
//! and its neighbors), the kernel rewrites every slot with a block to revisit
//! or [`NO_BLOCK`], and the surviving slots become the next candidate list.
//! Ids in `[size_o, 2 * size_o)` are candidates the kernel froze (deferred)
//! under the active-block bound.
//!
//! The non-pruning variant only keeps one flag per block.

use crate::buffer::{BufferPolicy, DoubleBuffer};
use crate::core::{BlockGrid, TilingScheme};
use crate::error::{EikonalError, Result};

/// Slot value meaning "no block to revisit".
pub const NO_BLOCK: i64 = -1;

/// Acceptance window published to the kernel when bounding active blocks.
///
/// Both ends are `+inf` until bounding first triggers. A candidate whose
/// minimum change estimate exceeds `next` is frozen for the round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CausalityWindow {
    /// Lower end (`minChgPrev_thres`).
    pub prev: f64,
    /// Upper end (`minChgNext_thres`).
    pub next: f64,
}

impl CausalityWindow {
    /// No bound in effect.
    pub const UNBOUNDED: CausalityWindow = CausalityWindow {
        prev: f64::INFINITY,
        next: f64::INFINITY,
    };

    /// Whether the window rejects anything.
    pub fn is_bounded(&self) -> bool {
        self.next.is_finite()
    }

    /// Whether a candidate with this minimum change estimate may be processed.
    /// Candidates without a finite estimate are always admitted.
    #[inline]
    pub fn admits(&self, min_chg: f64) -> bool {
        !self.is_bounded() || !min_chg.is_finite() || min_chg <= self.next
    }
}

impl Default for CausalityWindow {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// Causality-based admission control: caps the admitted candidates per round
/// by adapting the acceptance window instead of ordering candidates.
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    target: f64,
    delta_min: f64,
    window: CausalityWindow,
}

impl AdmissionControl {
    /// Aim for `target` candidates per round; the window grows by at least `delta_min`.
    pub fn new(target: f64, delta_min: f64) -> Self {
        AdmissionControl {
            target,
            delta_min,
            window: CausalityWindow::UNBOUNDED,
        }
    }

    /// Current window.
    pub fn window(&self) -> CausalityWindow {
        self.window
    }

    /// Adapt the window to this round's candidate list and return the window
    /// to publish for the next dispatch.
    ///
    /// `min_chg` holds the per-block estimates the kernel just reported.
    /// Once finite, `prev` never decreases, and `next >= prev` always holds.
    pub fn update(&mut self, candidates: &[i64], size_o: usize, min_chg: &[f32]) -> CausalityWindow {
        let old_prev = self.window.prev;
        let old_next = self.window.next;
        if old_next.is_finite() {
            self.window.prev = old_next;
        }

        if (candidates.len() as f64) < self.target {
            self.window.next = f64::INFINITY;
            return self.window;
        }

        let mut n_active = 0usize;
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &id in candidates {
            if id < 0 || id as usize >= size_o {
                continue;
            }
            n_active += 1;
            let m = min_chg[id as usize] as f64;
            if m.is_finite() {
                lo = lo.min(m);
                hi = hi.max(m);
            }
        }

        let mut delta = old_next - old_prev;
        if !delta.is_finite() {
            if lo > hi {
                // Nothing to anchor the window on.
                self.window.next = f64::INFINITY;
                return self.window;
            }
            let lo = if self.window.prev.is_finite() {
                lo.max(self.window.prev)
            } else {
                lo
            };
            self.window.prev = lo;
            self.window.next = hi.max(lo);
            delta = self.window.next - lo;
        }

        let mult = (self.target / n_active.max(1) as f64).clamp(0.7, 2.0);
        self.window.next += (delta * mult).max(self.delta_min);
        self.window
    }
}

/// Buffers the kernel needs for one pruning round.
pub struct RoundBuffers<'a> {
    /// Credits from last round; consumed by the kernel.
    pub credits_prev: &'a mut [u8],
    /// Credits for next round; zeroed before dispatch.
    pub credits_next: &'a mut [u8],
    /// Per-block minimum change estimates from last round.
    pub min_chg_prev: &'a [f32],
    /// Per-block estimates for next round; `+inf` before dispatch.
    pub min_chg_next: &'a mut [f32],
    /// Window in effect for this round.
    pub window: CausalityWindow,
}

/// Candidate list and frozen-state buffers of the pruning AGSI variant.
#[derive(Debug, Clone)]
pub struct ActiveSetController {
    size_o: usize,
    stride: usize,
    candidates: Vec<i64>,
    credits: DoubleBuffer<u8>,
    min_chg: DoubleBuffer<f32>,
    admission: Option<AdmissionControl>,
}

impl ActiveSetController {
    /// Start from the seeded blocks.
    ///
    /// `stride` is the slot count per candidate, `2 * ndim + 1`. Each seeded
    /// block gets a full credit of `stride`, as if all of its neighbor
    /// directions had just changed. `seed_min_chg` gives the initial per-block
    /// estimates (typically the smallest seed value in the block).
    pub fn new(
        size_o: usize,
        stride: usize,
        seeded: &[usize],
        seed_min_chg: Vec<f32>,
        admission: Option<AdmissionControl>,
    ) -> Self {
        let mut blocks = seeded.to_vec();
        blocks.sort_unstable();
        blocks.dedup();

        let mut credits = vec![0u8; size_o];
        for &b in &blocks {
            credits[b] = stride as u8;
        }

        ActiveSetController {
            size_o,
            stride,
            candidates: blocks.into_iter().map(|b| b as i64).collect(),
            credits: DoubleBuffer::new(credits, BufferPolicy::Strict),
            min_chg: DoubleBuffer::new(seed_min_chg, BufferPolicy::Strict),
            admission,
        }
    }

    /// Current candidate list, duplicates and frozen ids included.
    pub fn candidates(&self) -> &[i64] {
        &self.candidates
    }

    /// True once the candidate list is empty.
    pub fn is_converged(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates in the active range `[0, size_o)`.
    pub fn active_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|&&id| (id as usize) < self.size_o)
            .count()
    }

    /// Candidates in the frozen range `[size_o, 2 * size_o)`.
    pub fn frozen_count(&self) -> usize {
        self.candidates.len() - self.active_count()
    }

    /// Window to publish for the next dispatch.
    pub fn window(&self) -> CausalityWindow {
        self.admission
            .as_ref()
            .map(AdmissionControl::window)
            .unwrap_or_default()
    }

    /// Sorted, deduplicated blocks referenced by the candidate list.
    pub fn distinct_blocks(&self) -> Vec<usize> {
        let mut blocks: Vec<usize> = self
            .candidates
            .iter()
            .map(|&id| id as usize % self.size_o)
            .collect();
        blocks.sort_unstable();
        blocks.dedup();
        blocks
    }

    /// Slot list for this round: every candidate repeated `2 * ndim + 1` times.
    pub fn expand(&self) -> Vec<i64> {
        let mut slots = Vec::with_capacity(self.candidates.len() * self.stride);
        for &id in &self.candidates {
            slots.extend(std::iter::repeat(id).take(self.stride));
        }
        slots
    }

    /// Reset the next-round halves and lend all frozen-state buffers to the kernel.
    pub fn round_buffers(&mut self) -> Result<RoundBuffers<'_>> {
        self.credits.fill_next(0);
        self.min_chg.fill_next(f32::INFINITY);
        let window = self.window();
        let (credits_prev, credits_next) = self.credits.pair_mut().ok_or_else(|| {
            EikonalError::Other("credit buffers must be double-buffered".to_string())
        })?;
        let (min_chg_prev, min_chg_next) = self.min_chg.split().ok_or_else(|| {
            EikonalError::Other("change estimate buffers must be double-buffered".to_string())
        })?;
        Ok(RoundBuffers {
            credits_prev,
            credits_next,
            min_chg_prev,
            min_chg_next,
            window,
        })
    }

    /// Take the kernel's rewritten slot list as the next candidate list.
    ///
    /// Sentinel slots are dropped; duplicates are kept. The frozen-state
    /// buffers are swapped and, when bounding, the window adapts.
    pub fn absorb(&mut self, slots: &[i64]) {
        self.candidates = slots.iter().copied().filter(|&s| s != NO_BLOCK).collect();
        self.credits.swap();
        self.min_chg.swap();
        if let Some(admission) = &mut self.admission {
            admission.update(&self.candidates, self.size_o, self.min_chg.current());
        }
    }
}

/// Per-block flags of the non-pruning AGSI variant.
#[derive(Debug, Clone)]
pub struct FlagSchedule {
    flags: Vec<u8>,
}

impl FlagSchedule {
    /// Flag the seeded blocks and their face neighbors.
    pub fn new<const N: usize>(grid: &BlockGrid<N>, seeded: &[usize]) -> Self {
        let mut flags = vec![0u8; grid.size_o()];
        for &b in seeded {
            flags[b] = 1;
            for axis in 0..N {
                for upper in [false, true] {
                    if let Some(nb) = grid.block_neighbor(b, axis, upper) {
                        flags[nb] = 1;
                    }
                }
            }
        }
        FlagSchedule { flags }
    }

    /// Collect the flagged blocks in increasing order and clear every flag.
    pub fn take_list(&mut self) -> Vec<usize> {
        let list = self
            .flags
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f != 0)
            .map(|(b, _)| b)
            .collect();
        self.flags.fill(0);
        list
    }

    /// Flags for the kernel to raise.
    pub fn flags_mut(&mut self) -> &mut [u8] {
        &mut self.flags
    }
}
