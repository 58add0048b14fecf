//! Sample and accumulator traits for the scanline pipeline.
//!
//! The pipeline is integer-only. Threshold checks and run statistics are
//! computed in a signed accumulator type wide enough to hold the sum of one
//! full scanline of samples (`i32` covers 2^24 pixels of `u8`, `i64` covers
//! any realistic `u16` line).

use std::fmt::Debug;
use std::ops::{Add, Sub};

/// Signed accumulator arithmetic used by the segmenter and parser.
pub trait Accum:
    Copy
    + Ord
    + Default
    + Debug
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + 'static
{
    /// Additive identity.
    const ZERO: Self;

    /// Widen a machine integer into the accumulator domain.
    fn from_i64(v: i64) -> Self;

    /// Narrow back out for cold-path math (averages, logging).
    fn to_i64(self) -> i64;

    /// Absolute value.
    fn abs(self) -> Self;

    /// Arithmetic shift right by one. The mid-range and taper math must
    /// stay division-free on the per-pixel path.
    fn half(self) -> Self;
}

impl Accum for i32 {
    const ZERO: Self = 0;

    #[inline]
    fn from_i64(v: i64) -> Self {
        v as i32
    }

    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }

    #[inline]
    fn abs(self) -> Self {
        i32::abs(self)
    }

    #[inline]
    fn half(self) -> Self {
        self >> 1
    }
}

impl Accum for i64 {
    const ZERO: Self = 0;

    #[inline]
    fn from_i64(v: i64) -> Self {
        v
    }

    #[inline]
    fn to_i64(self) -> i64 {
        self
    }

    #[inline]
    fn abs(self) -> Self {
        i64::abs(self)
    }

    #[inline]
    fn half(self) -> Self {
        self >> 1
    }
}

/// Scalar pixel intensity fed to the pipeline, one sample per pixel.
///
/// Implemented for `u8` (camera luma) and `u16` (raw sensor data). The
/// associated [`Accum`] type is the collector for sums and signed deltas.
pub trait Sample: Copy + Ord + Eq + Default + Debug + Send + Sync + 'static {
    /// Accumulator wide enough for one scanline of summed samples.
    type Acc: Accum;

    /// Smallest representable magnitude.
    const MIN_MAG: Self;

    /// Largest representable magnitude.
    const MAX_MAG: Self;

    /// Widen into the accumulator domain.
    fn widen(self) -> Self::Acc;

    /// Truncating narrow from the accumulator domain. Only used for values
    /// that fit by construction (averages of samples).
    fn from_acc(acc: Self::Acc) -> Self;
}

impl Sample for u8 {
    type Acc = i32;

    const MIN_MAG: Self = u8::MIN;
    const MAX_MAG: Self = u8::MAX;

    #[inline]
    fn widen(self) -> i32 {
        i32::from(self)
    }

    #[inline]
    fn from_acc(acc: i32) -> Self {
        acc as u8
    }
}

impl Sample for u16 {
    type Acc = i64;

    const MIN_MAG: Self = u16::MIN;
    const MAX_MAG: Self = u16::MAX;

    #[inline]
    fn widen(self) -> i64 {
        i64::from(self)
    }

    #[inline]
    fn from_acc(acc: i64) -> Self {
        acc as u16
    }
}
