// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::error::{EikonalError, Result};

/// Width, in bits, of one packed seed-tag word.
pub const BITPACK_WIDTH: usize = 8;

/// Tiling scheme for partitioning a domain into fixed-size blocks.
pub trait TilingScheme<const N: usize> {
    /// Get the size of each tile (cells per axis).
    fn tile_shape(&self) -> [usize; N];

    /// Get the number of blocks along each axis.
    fn shape_o(&self) -> [usize; N];

    /// Get the total number of blocks.
    fn size_o(&self) -> usize;

    /// Get the number of cells in one block.
    fn size_i(&self) -> usize;

    /// Convert a flat block ID to N-dimensional block indices.
    fn block_id_to_nd(&self, id: usize) -> [usize; N];

    /// Convert N-dimensional block indices to a flat block ID.
    fn nd_to_block_id(&self, idx: [usize; N]) -> usize;

    /// Get the block adjacent to `id` along `axis`, on the upper side if `upper`.
    /// Wraps around periodic axes; `None` past a non-periodic boundary.
    fn block_neighbor(&self, id: usize, axis: usize, upper: bool) -> Option<usize>;
}

/// An N-dimensional domain partitioned into blocks of shape `Bi`.
///
/// Cell data is stored block-major: the cells of block `b` occupy the
/// contiguous range `b * size_i .. (b + 1) * size_i`, in row-major order
/// within the tile. The outer shape is `So = ceil(S / Bi)`, and cells past
/// the domain boundary are padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockGrid<const N: usize> {
    shape: [usize; N],
    tile: [usize; N],
    shape_o: [usize; N],
    strides_o: [usize; N],
    strides_i: [usize; N],
    periodic: [bool; N],
}

fn row_major_strides<const N: usize>(shape: &[usize; N]) -> [usize; N] {
    let mut strides = [0usize; N];
    strides[N - 1] = 1;
    for d in (0..N - 1).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

impl<const N: usize> BlockGrid<N> {
    /// Partition a domain of shape `shape` into tiles of shape `tile`.
    ///
    /// # Errors
    /// Returns an error if any domain axis or tile axis is empty.
    pub fn new(shape: [usize; N], tile: [usize; N]) -> Result<Self> {
        assert!(N >= 1, "BlockGrid needs at least one axis");

        for (axis, &size) in shape.iter().enumerate() {
            if size == 0 {
                return Err(EikonalError::InvalidDomainShape { axis, size });
            }
        }
        for (axis, &t) in tile.iter().enumerate() {
            if t == 0 {
                return Err(EikonalError::InvalidTileShape { axis, tile: t });
            }
        }

        let mut shape_o = [0usize; N];
        for d in 0..N {
            shape_o[d] = shape[d].div_ceil(tile[d]);
        }

        Ok(BlockGrid {
            shape,
            tile,
            shape_o,
            strides_o: row_major_strides(&shape_o),
            strides_i: row_major_strides(&tile),
            periodic: [false; N],
        })
    }

    /// Set periodic boundary conditions per axis (builder method).
    pub fn with_periodic(mut self, periodic: [bool; N]) -> Self {
        self.periodic = periodic;
        self
    }

    /// Check that a tile can be bit-packed into whole seed-tag bytes.
    pub fn require_bitpack(&self) -> Result<()> {
        let cells = self.size_i();
        if cells % BITPACK_WIDTH != 0 {
            return Err(EikonalError::BitPackWidth { cells });
        }
        Ok(())
    }

    /// Domain shape `S`.
    pub fn shape(&self) -> [usize; N] {
        self.shape
    }

    /// Periodic axis mask.
    pub fn periodic(&self) -> [bool; N] {
        self.periodic
    }

    /// Number of domain points.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Length of a block-major buffer, padding included.
    pub fn padded_len(&self) -> usize {
        self.size_o() * self.size_i()
    }

    /// Slots per active block in an AGSI update list: the block plus `2 * N` neighbors.
    pub fn slots_per_block(&self) -> usize {
        2 * N + 1
    }

    /// Block-major index of a point given in (padded) domain coordinates.
    pub fn point_index(&self, x: [usize; N]) -> usize {
        let mut block = 0;
        let mut local = 0;
        for d in 0..N {
            block += (x[d] / self.tile[d]) * self.strides_o[d];
            local += (x[d] % self.tile[d]) * self.strides_i[d];
        }
        block * self.size_i() + local
    }

    /// Padded domain coordinates of a block-major index.
    pub fn point_position(&self, n: usize) -> [usize; N] {
        let size_i = self.size_i();
        let block = self.block_id_to_nd(n / size_i);
        let mut local = n % size_i;
        let mut x = [0usize; N];
        for d in 0..N {
            x[d] = block[d] * self.tile[d] + local / self.strides_i[d];
            local %= self.strides_i[d];
        }
        x
    }

    /// Whether a point lies inside the domain (not in the padding).
    pub fn in_domain(&self, x: [usize; N]) -> bool {
        x.iter().zip(self.shape.iter()).all(|(&xi, &si)| xi < si)
    }

    /// Get the point adjacent to `x` along `axis`, wrapping on periodic axes.
    pub fn neighbor_point(&self, x: [usize; N], axis: usize, upper: bool) -> Option<[usize; N]> {
        let mut y = x;
        if upper {
            if x[axis] + 1 < self.shape[axis] {
                y[axis] += 1;
            } else if self.periodic[axis] {
                y[axis] = 0;
            } else {
                return None;
            }
        } else if x[axis] > 0 {
            y[axis] -= 1;
        } else if self.periodic[axis] {
            y[axis] = self.shape[axis] - 1;
        } else {
            return None;
        }
        Some(y)
    }

    /// Reshape a domain field into block-major layout, filling padding with `fill`.
    pub fn expand<T: Copy>(&self, field: ArrayViewD<'_, T>, fill: T) -> Result<Vec<T>> {
        if field.shape() != self.shape.as_slice() {
            return Err(EikonalError::ShapeMismatch {
                expected: self.shape.to_vec(),
                got: field.shape().to_vec(),
            });
        }
        let mut out = vec![fill; self.padded_len()];
        for (idx, &v) in field.indexed_iter() {
            let mut x = [0usize; N];
            for d in 0..N {
                x[d] = idx[d];
            }
            out[self.point_index(x)] = v;
        }
        Ok(out)
    }

    /// Same as [`BlockGrid::expand`], for a row-major slice of the domain.
    pub fn expand_slice<T: Copy>(&self, field: &[T], fill: T) -> Result<Vec<T>> {
        let view = ArrayViewD::from_shape(IxDyn(&self.shape), field).map_err(|_| {
            EikonalError::ShapeMismatch {
                expected: self.shape.to_vec(),
                got: vec![field.len()],
            }
        })?;
        self.expand(view, fill)
    }

    /// Reshape a block-major buffer back to the domain shape, dropping padding.
    pub fn squeeze<T: Copy>(&self, blocks: &[T]) -> Result<ArrayD<T>> {
        if blocks.len() != self.padded_len() {
            return Err(EikonalError::ShapeMismatch {
                expected: vec![self.padded_len()],
                got: vec![blocks.len()],
            });
        }
        Ok(ArrayD::from_shape_fn(IxDyn(&self.shape), |idx| {
            let mut x = [0usize; N];
            for d in 0..N {
                x[d] = idx[d];
            }
            blocks[self.point_index(x)]
        }))
    }
}

impl<const N: usize> TilingScheme<N> for BlockGrid<N> {
    fn tile_shape(&self) -> [usize; N] {
        self.tile
    }

    fn shape_o(&self) -> [usize; N] {
        self.shape_o
    }

    fn size_o(&self) -> usize {
        self.shape_o.iter().product()
    }

    fn size_i(&self) -> usize {
        self.tile.iter().product()
    }

    fn block_id_to_nd(&self, id: usize) -> [usize; N] {
        let mut idx = [0usize; N];
        let mut remainder = id;
        for d in 0..N {
            idx[d] = remainder / self.strides_o[d];
            remainder %= self.strides_o[d];
        }
        idx
    }

    fn nd_to_block_id(&self, idx: [usize; N]) -> usize {
        idx.iter()
            .zip(self.strides_o.iter())
            .map(|(&i, &s)| i * s)
            .sum()
    }

    fn block_neighbor(&self, id: usize, axis: usize, upper: bool) -> Option<usize> {
        let mut idx = self.block_id_to_nd(id);
        if upper {
            if idx[axis] + 1 < self.shape_o[axis] {
                idx[axis] += 1;
            } else if self.periodic[axis] {
                idx[axis] = 0;
            } else {
                return None;
            }
        } else if idx[axis] > 0 {
            idx[axis] -= 1;
        } else if self.periodic[axis] {
            idx[axis] = self.shape_o[axis] - 1;
        } else {
            return None;
        }
        Some(self.nd_to_block_id(idx))
    }
}

/// One bit per block-major cell marking externally fixed (seed) values.
///
/// Bits are packed little-endian within each byte, so a tile whose cell count
/// is a multiple of 8 owns whole bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedTags {
    bits: Vec<u8>,
    len: usize,
}

impl SeedTags {
    /// Pack a block-major flag array.
    pub fn pack(flags: &[bool]) -> Self {
        let mut bits = vec![0u8; flags.len().div_ceil(BITPACK_WIDTH)];
        for (n, &flag) in flags.iter().enumerate() {
            if flag {
                bits[n / BITPACK_WIDTH] |= 1 << (n % BITPACK_WIDTH);
            }
        }
        SeedTags {
            bits,
            len: flags.len(),
        }
    }

    /// Whether cell `n` is a seed.
    #[inline]
    pub fn get(&self, n: usize) -> bool {
        (self.bits[n / BITPACK_WIDTH] >> (n % BITPACK_WIDTH)) & 1 == 1
    }

    /// Number of tagged cells the bitfield covers.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitfield covers no cells.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of seed cells.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Packed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    #[test]
    fn outer_shape_rounds_up() {
        let grid = BlockGrid::<2>::new([10, 7], [4, 4]).unwrap();
        assert_eq!(grid.shape_o(), [3, 2]);
        assert_eq!(grid.size_o(), 6);
        assert_eq!(grid.size_i(), 16);
        assert_eq!(grid.padded_len(), 96);
    }

    #[test]
    fn block_id_nd_roundtrip_3d() {
        let grid = BlockGrid::<3>::new([9, 5, 12], [2, 2, 4]).unwrap();
        for id in 0..grid.size_o() {
            let nd = grid.block_id_to_nd(id);
            assert_eq!(grid.nd_to_block_id(nd), id);
        }
    }

    #[test]
    fn point_index_roundtrip() {
        let grid = BlockGrid::<2>::new([6, 5], [4, 2]).unwrap();
        let mut seen = vec![false; grid.padded_len()];
        for n in 0..grid.padded_len() {
            let x = grid.point_position(n);
            assert_eq!(grid.point_index(x), n, "n={} x={:?}", n, x);
            seen[n] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn blocks_are_contiguous() {
        let grid = BlockGrid::<2>::new([8, 8], [4, 4]).unwrap();
        // Point [5, 2] lies in block [1, 0] = id 2, local [1, 2] = 6.
        assert_eq!(grid.point_index([5, 2]), 2 * 16 + 6);
    }

    #[test]
    fn expand_squeeze_roundtrip() {
        let grid = BlockGrid::<2>::new([5, 7], [4, 2]).unwrap();
        let field = ArrayD::from_shape_fn(IxDyn(&[5, 7]), |idx| (idx[0] * 10 + idx[1]) as f32);
        let blocks = grid.expand(field.view(), f32::INFINITY).unwrap();
        assert_eq!(blocks.len(), grid.padded_len());
        let back = grid.squeeze(&blocks).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn expand_fills_padding_with_sentinel() {
        let grid = BlockGrid::<1>::new([5], [8]).unwrap();
        let blocks = grid.expand_slice(&[0.0f32, 1.0, 2.0, 3.0, 4.0], f32::INFINITY).unwrap();
        assert_eq!(&blocks[..5], &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(blocks[5..].iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn expand_shape_mismatch() {
        let grid = BlockGrid::<2>::new([4, 4], [2, 2]).unwrap();
        let result = grid.expand_slice(&[1.0f32; 10], 0.0);
        assert!(matches!(result, Err(EikonalError::ShapeMismatch { .. })));
        let result = grid.squeeze(&[1.0f32; 10]);
        assert!(matches!(result, Err(EikonalError::ShapeMismatch { .. })));
    }

    #[test]
    fn invalid_shapes() {
        assert!(matches!(
            BlockGrid::<2>::new([0, 4], [2, 2]),
            Err(EikonalError::InvalidDomainShape { axis: 0, size: 0 })
        ));
        assert!(matches!(
            BlockGrid::<2>::new([4, 4], [2, 0]),
            Err(EikonalError::InvalidTileShape { axis: 1, tile: 0 })
        ));
    }

    #[test]
    fn bitpack_width_check() {
        let grid = BlockGrid::<2>::new([8, 8], [2, 3]).unwrap();
        assert!(matches!(
            grid.require_bitpack(),
            Err(EikonalError::BitPackWidth { cells: 6 })
        ));
        let grid = BlockGrid::<2>::new([8, 8], [2, 4]).unwrap();
        assert!(grid.require_bitpack().is_ok());
    }

    #[test]
    fn block_neighbors_clamp_and_wrap() {
        let grid = BlockGrid::<2>::new([8, 8], [4, 4]).unwrap();
        assert_eq!(grid.block_neighbor(0, 0, false), None);
        assert_eq!(grid.block_neighbor(0, 0, true), Some(2));
        assert_eq!(grid.block_neighbor(0, 1, true), Some(1));

        let grid = grid.with_periodic([true, false]);
        assert_eq!(grid.block_neighbor(0, 0, false), Some(2));
        assert_eq!(grid.block_neighbor(0, 1, false), None);
    }

    #[test]
    fn neighbor_point_wraps_on_domain_not_padding() {
        let grid = BlockGrid::<1>::new([5], [8]).unwrap().with_periodic([true]);
        assert_eq!(grid.neighbor_point([4], 0, true), Some([0]));
        assert_eq!(grid.neighbor_point([0], 0, false), Some([4]));
        let grid = grid.with_periodic([false]);
        assert_eq!(grid.neighbor_point([4], 0, true), None);
    }

    #[test]
    fn seed_tags_pack_little_endian() {
        let mut flags = vec![false; 16];
        flags[0] = true;
        flags[9] = true;
        let tags = SeedTags::pack(&flags);
        assert_eq!(tags.as_bytes(), &[0b0000_0001, 0b0000_0010]);
        assert!(tags.get(0));
        assert!(!tags.get(1));
        assert!(tags.get(9));
        assert_eq!(tags.count(), 2);
        assert_eq!(tags.len(), 16);
    }
}
