// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use rayon::prelude::*;

use crate::active_set::NO_BLOCK;
use crate::buffer::BufferPolicy;
use crate::core::{BlockGrid, SeedTags, TilingScheme};
use crate::error::{EikonalError, Result};
use crate::kernel::{FieldSet, Launch, LaunchMode, UpdateKernel};
use crate::precision::{PrecisionModel, Quantum, Scalar};

/// Solve the Godunov upwind discretization for one node in N dimensions.
///
/// `upwind[k]` holds the smaller neighbor value along axis `k`, and `f` is the
/// slowness at the node. Axes are added in increasing order of neighbor value
/// until the root no longer exceeds the next neighbor, so the result falls
/// back to the lower-dimensional update when the full one is invalid.
pub fn solve_local<const N: usize>(mut upwind: [f64; N], f: f64, h: f64) -> f64 {
    upwind.sort_by(|x, y| x.total_cmp(y));
    let a0 = upwind[0];
    if !a0.is_finite() {
        return f64::INFINITY;
    }

    let fh_sq = f * f * h * h;
    let mut u = a0 + f * h;
    let mut sum = a0;
    let mut sum_sq = a0 * a0;
    for (m, &a) in upwind.iter().enumerate().skip(1) {
        if u <= a {
            break;
        }
        let k = (m + 1) as f64;
        let s = sum + a;
        let q = sum_sq + a * a;
        let disc = s * s - k * (q - fh_sq);
        if disc < 0.0 {
            break;
        }
        u = (s + disc.sqrt()) / k;
        sum = s;
        sum_sq = q;
    }
    u
}

/// Read-only view of the value field, reconstructing under multiprecision.
#[derive(Clone, Copy)]
struct FieldView<'a> {
    values: &'a [Scalar],
    corrections: Option<&'a [Quantum]>,
    precision: Option<&'a PrecisionModel>,
}

impl FieldView<'_> {
    #[inline]
    fn get(&self, n: usize) -> f64 {
        match (self.corrections, self.precision) {
            (Some(q), Some(p)) => p.reconstruct(self.values[n], q[n]),
            _ => self.values[n] as f64,
        }
    }

    fn store(&self, x: f64) -> Result<(Scalar, Quantum, f64)> {
        match (self.corrections, self.precision) {
            (Some(_), Some(p)) => {
                let (v, q) = p.split(x)?;
                Ok((v, q, p.reconstruct(v, q)))
            }
            _ => {
                let v = x as Scalar;
                Ok((v, 0, v as f64))
            }
        }
    }
}

struct BlockUpdate<const N: usize> {
    block: usize,
    values: Vec<Scalar>,
    corrections: Option<Vec<Quantum>>,
    changed: bool,
    /// Smallest value committed in this block; `+inf` if none.
    min_changed: f64,
    /// Whether a changed point has a neighbor in another block, per axis and side.
    faces: [[bool; 2]; N],
}

/// First-order isotropic eikonal update: `|grad u| = cost`.
///
/// Points within a block are relaxed Jacobi-style from a snapshot of the
/// block, `inner_iterations` times per visit; points of neighboring blocks are
/// read from the current field. Under the strict policy blocks are updated in
/// parallel, otherwise sequentially in list order.
#[derive(Debug, Clone)]
pub struct IsotropicKernel {
    inner_iterations: usize,
}

impl Default for IsotropicKernel {
    fn default() -> Self {
        IsotropicKernel {
            inner_iterations: 1,
        }
    }
}

impl IsotropicKernel {
    /// Create a kernel doing one relaxation sweep per block visit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of relaxation sweeps per block visit (builder method).
    /// Values below 1 are treated as 1.
    pub fn with_inner_iterations(mut self, inner_iterations: usize) -> Self {
        self.inner_iterations = inner_iterations.max(1);
        self
    }

    #[allow(clippy::too_many_arguments)]
    fn update_block<const N: usize>(
        &self,
        grid: &BlockGrid<N>,
        view: FieldView<'_>,
        geom: &[Scalar],
        seed_tags: &SeedTags,
        h: f64,
        tol: f64,
        block: usize,
    ) -> Result<BlockUpdate<N>> {
        let size_i = grid.size_i();
        let base = block * size_i;
        let mut local: Vec<f64> = (base..base + size_i).map(|n| view.get(n)).collect();
        let mut values = view.values[base..base + size_i].to_vec();
        let mut corrections = view.corrections.map(|q| q[base..base + size_i].to_vec());
        let mut committed = vec![false; size_i];

        for _ in 0..self.inner_iterations {
            let snapshot = local.clone();
            let mut any = false;
            for i in 0..size_i {
                let n = base + i;
                if seed_tags.get(n) {
                    continue;
                }
                let x = grid.point_position(n);
                if !grid.in_domain(x) {
                    continue;
                }
                let f = geom[n] as f64;
                if !f.is_finite() {
                    continue;
                }

                let mut upwind = [f64::INFINITY; N];
                for (axis, slot) in upwind.iter_mut().enumerate() {
                    for upper in [false, true] {
                        let Some(y) = grid.neighbor_point(x, axis, upper) else {
                            continue;
                        };
                        let m = grid.point_index(y);
                        let u = if m / size_i == block {
                            snapshot[m - base]
                        } else {
                            view.get(m)
                        };
                        if u < *slot {
                            *slot = u;
                        }
                    }
                }

                let candidate = solve_local(upwind, f, h);
                let old = snapshot[i];
                if candidate.is_nan() || candidate >= old {
                    continue;
                }
                let (v, q, stored) = view.store(candidate)?;
                if old - stored > tol {
                    local[i] = stored;
                    values[i] = v;
                    if let Some(c) = corrections.as_mut() {
                        c[i] = q;
                    }
                    committed[i] = true;
                    any = true;
                }
            }
            if !any {
                break;
            }
        }

        let mut update = BlockUpdate {
            block,
            values,
            corrections,
            changed: false,
            min_changed: f64::INFINITY,
            faces: [[false; 2]; N],
        };
        for i in (0..size_i).filter(|&i| committed[i]) {
            update.changed = true;
            update.min_changed = update.min_changed.min(local[i]);
            let x = grid.point_position(base + i);
            for axis in 0..N {
                for (side, upper) in [false, true].into_iter().enumerate() {
                    if let Some(y) = grid.neighbor_point(x, axis, upper) {
                        if grid.point_index(y) / size_i != block {
                            update.faces[axis][side] = true;
                        }
                    }
                }
            }
        }
        Ok(update)
    }

    /// Update `blocks` and write them back according to the buffer policy.
    fn run_blocks<const N: usize>(
        &self,
        grid: &BlockGrid<N>,
        fields: &mut FieldSet,
        precision: Option<&PrecisionModel>,
        h: f64,
        tol: f64,
        blocks: &[usize],
    ) -> Result<Vec<BlockUpdate<N>>> {
        let size_i = grid.size_i();
        match fields.policy() {
            BufferPolicy::Strict => {
                let updates = {
                    let view = FieldView {
                        values: fields.values.current(),
                        corrections: fields.corrections.as_ref().map(|c| c.current()),
                        precision,
                    };
                    let geom = &fields.geom;
                    let seed_tags = &fields.seed_tags;
                    blocks
                        .par_iter()
                        .map(|&b| self.update_block(grid, view, geom, seed_tags, h, tol, b))
                        .collect::<Result<Vec<_>>>()?
                };
                for update in &updates {
                    let range = update.block * size_i..(update.block + 1) * size_i;
                    if let Some((_, next)) = fields.values.split() {
                        next[range.clone()].copy_from_slice(&update.values);
                    }
                    if let (Some(buf), Some(q)) = (fields.corrections.as_mut(), &update.corrections) {
                        if let Some((_, next)) = buf.split() {
                            next[range].copy_from_slice(q);
                        }
                    }
                }
                Ok(updates)
            }
            BufferPolicy::InPlace => {
                let mut updates = Vec::with_capacity(blocks.len());
                for &b in blocks {
                    let update = {
                        let view = FieldView {
                            values: fields.values.current(),
                            corrections: fields.corrections.as_ref().map(|c| c.current()),
                            precision,
                        };
                        self.update_block(grid, view, &fields.geom, &fields.seed_tags, h, tol, b)?
                    };
                    let range = b * size_i..(b + 1) * size_i;
                    fields.values.current_mut()[range.clone()].copy_from_slice(&update.values);
                    if let (Some(buf), Some(q)) = (fields.corrections.as_mut(), &update.corrections) {
                        buf.current_mut()[range].copy_from_slice(q);
                    }
                    updates.push(update);
                }
                Ok(updates)
            }
        }
    }
}

impl<const N: usize> UpdateKernel<N> for IsotropicKernel {
    fn name(&self) -> &str {
        "isotropic"
    }

    fn check_layout(&self, fields: &FieldSet) -> Result<()> {
        if fields.drift.is_some() {
            return Err(EikonalError::UnsupportedField {
                kernel: "isotropic".to_string(),
                field: "drift",
            });
        }
        Ok(())
    }

    fn invoke(&self, launch: Launch<'_, N>) -> Result<()> {
        let Launch {
            grid,
            fields,
            precision,
            grid_scale,
            tol,
            mode,
        } = launch;

        match mode {
            LaunchMode::Global { blocks, changed } => {
                let updates = self.run_blocks(grid, fields, precision, grid_scale, tol, blocks)?;
                *changed = updates.iter().any(|u| u.changed);
            }
            LaunchMode::Flagged { blocks, flags } => {
                let updates = self.run_blocks(grid, fields, precision, grid_scale, tol, blocks)?;
                for update in updates.iter().filter(|u| u.changed) {
                    flags[update.block] = 1;
                    for axis in 0..N {
                        for (side, upper) in [false, true].into_iter().enumerate() {
                            if !update.faces[axis][side] {
                                continue;
                            }
                            if let Some(nb) = grid.block_neighbor(update.block, axis, upper) {
                                flags[nb] = 1;
                            }
                        }
                    }
                }
            }
            LaunchMode::Propagate { slots, buffers } => {
                let stride = grid.slots_per_block();
                let size_o = grid.size_o();

                // Claim pass: the first listing holding credit processes the
                // block, later listings only produce sentinels.
                let mut work: Vec<(usize, usize, bool)> = Vec::new();
                for (g, group) in slots.chunks_mut(stride).enumerate() {
                    let b = group[0] as usize % size_o;
                    group.fill(NO_BLOCK);
                    let credit = buffers.credits_prev[b];
                    if credit == 0 {
                        continue;
                    }
                    buffers.credits_prev[b] = 0;
                    let estimate = buffers.min_chg_prev[b];
                    if !buffers.window.admits(estimate as f64) {
                        group[0] = (b + size_o) as i64;
                        buffers.credits_next[b] = buffers.credits_next[b].max(credit);
                        buffers.min_chg_next[b] = buffers.min_chg_next[b].min(estimate);
                        continue;
                    }
                    work.push((g, b, credit as usize >= stride));
                }

                let blocks: Vec<usize> = work.iter().map(|&(_, b, _)| b).collect();
                let updates = self.run_blocks(grid, fields, precision, grid_scale, tol, &blocks)?;

                let cap = (stride - 1) as u8;
                let mut nominate = |nb: usize, estimate: f64| {
                    if buffers.credits_next[nb] < cap {
                        buffers.credits_next[nb] += 1;
                    }
                    buffers.min_chg_next[nb] = buffers.min_chg_next[nb].min(estimate as Scalar);
                };
                for (&(g, b, forced), update) in work.iter().zip(&updates) {
                    let group = &mut slots[g * stride..(g + 1) * stride];
                    if update.changed {
                        group[0] = b as i64;
                        nominate(b, update.min_changed);
                    }
                    let estimate = if forced {
                        update.min_changed.min(buffers.min_chg_prev[b] as f64)
                    } else {
                        update.min_changed
                    };
                    for axis in 0..N {
                        for (side, upper) in [false, true].into_iter().enumerate() {
                            if !(forced || update.faces[axis][side]) {
                                continue;
                            }
                            match grid.block_neighbor(b, axis, upper) {
                                Some(nb) if nb != b => {
                                    group[1 + 2 * axis + side] = nb as i64;
                                    nominate(nb, estimate);
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
