// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Split-precision storage: `value (f32) + correction (i32) * step`.
//!
//! The value field keeps at most one quantum of the solution, the correction
//! field counts whole quanta. Both are threaded through the kernel untouched by
//! the scheduler and only reconstructed at the end of a run.

use crate::error::{EikonalError, Result};

/// Low-precision value type stored per cell.
pub type Scalar = f32;

/// Integer correction type stored per cell under multiprecision.
pub type Quantum = i32;

/// Floating type used when reconstructing the output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPrecision {
    /// Reconstruct in the value type, then widen.
    #[default]
    Native,
    /// Reconstruct directly in f64.
    Wide,
}

/// Quantization parameters shared by every cell of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionModel {
    step: f64,
    bound: f64,
}

impl PrecisionModel {
    /// Pick `step` as the largest power of two not exceeding `grid_scale / 10`.
    ///
    /// # Errors
    /// Returns an error if `grid_scale` is not positive and finite.
    pub fn quantize(grid_scale: f64) -> Result<Self> {
        if !grid_scale.is_finite() || grid_scale <= 0.0 {
            return Err(EikonalError::InvalidGridScale(grid_scale));
        }
        let step = 2f64.powi((grid_scale / 10.0).log2().floor() as i32);
        Ok(Self::with_step(step))
    }

    /// Build a model from an explicit step.
    pub fn with_step(step: f64) -> Self {
        PrecisionModel {
            step,
            bound: Quantum::MAX as f64 * step / 2.0,
        }
    }

    /// Size of one quantum.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Largest representable corrected magnitude.
    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// Largest admissible `|correction|`.
    pub fn max_correction(&self) -> Quantum {
        Quantum::MAX / 2
    }

    /// `value + correction * step`, computed in f64.
    #[inline]
    pub fn reconstruct(&self, value: Scalar, correction: Quantum) -> f64 {
        value as f64 + correction as f64 * self.step
    }

    /// `value + correction * step`, computed in the value type.
    #[inline]
    pub fn reconstruct_native(&self, value: Scalar, correction: Quantum) -> Scalar {
        value + correction as Scalar * self.step as Scalar
    }

    /// Split `x` into a value holding less than one quantum and a whole number of quanta.
    ///
    /// Infinite inputs keep a zero correction.
    ///
    /// # Errors
    /// Returns [`EikonalError::PrecisionOverflow`] if `|x|` exceeds [`bound`](Self::bound).
    pub fn split(&self, x: f64) -> Result<(Scalar, Quantum)> {
        if !x.is_finite() {
            return Ok((x as Scalar, 0));
        }
        if x.abs() > self.bound {
            return Err(EikonalError::PrecisionOverflow {
                magnitude: x.abs(),
                bound: self.bound,
            });
        }
        let q = (x / self.step).floor();
        Ok(((x - q * self.step) as Scalar, q as Quantum))
    }

    /// Check that a correction lies within the admissible range.
    pub fn check(&self, correction: Quantum) -> Result<()> {
        if correction.unsigned_abs() > self.max_correction().unsigned_abs() {
            return Err(EikonalError::PrecisionOverflow {
                magnitude: (correction as f64 * self.step).abs(),
                bound: self.bound,
            });
        }
        Ok(())
    }

    /// Reconstruct a whole field.
    pub fn reconstruct_field(
        &self,
        values: &[Scalar],
        corrections: &[Quantum],
        output: OutputPrecision,
    ) -> Result<Vec<f64>> {
        values
            .iter()
            .zip(corrections)
            .map(|(&v, &q)| {
                self.check(q)?;
                Ok(match output {
                    OutputPrecision::Wide => self.reconstruct(v, q),
                    OutputPrecision::Native => self.reconstruct_native(v, q) as f64,
                })
            })
            .collect()
    }
}
