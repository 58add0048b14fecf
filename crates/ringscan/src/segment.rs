//! 1-D homogeneity segmentation of scanlines.
//!
//! [`RunSegmenter`] consumes one intensity sample per pixel and tracks the
//! current homogeneous run: its length, magnitude sum, min/max and last
//! sample. A run is *suspected* while it is shorter than `min_len` and
//! *open* once it is long enough with a bounded min/max spread. The parser
//! layer treats the closing edge of an open run as a lexical token.
//!
//! All per-pixel work is integer compare/add; the only divisions happen in
//! the cold accessors ([`RunSegmenter::avg`]).

use serde::{Deserialize, Serialize};

use crate::sample::{Accum, Sample};
use crate::taper::LengthTaper;
use crate::ConfigError;

/// Thresholds for opening and keeping a homogeneous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSegmenterConfig {
    /// Minimum run length before a suspected run opens.
    pub min_len: i32,
    /// Maximum difference between consecutive samples to keep suspecting
    /// a run at all.
    pub step_diff_max: i32,
    /// Maximum deviation of a sample from the running average inside an
    /// open run. Only checked in precise mode.
    pub avg_diff_max: i32,
    /// Maximum deviation of a sample from the mid-range of an open run.
    pub mid_diff_max: i32,
    /// Maximum min/max spread inside a run. Must exceed `mid_diff_max`.
    pub spread_max: i32,
    /// Enable the slower running-average deviation check.
    pub precise_avg_check: bool,
    /// Length-dependent relaxation applied to the open-run thresholds.
    pub taper: LengthTaper,
}

impl Default for RunSegmenterConfig {
    fn default() -> Self {
        Self {
            min_len: 6,
            step_diff_max: 13,
            avg_diff_max: 27,
            mid_diff_max: 10,
            spread_max: 25,
            precise_avg_check: false,
            taper: LengthTaper::default(),
        }
    }
}

impl RunSegmenterConfig {
    /// Check the degenerate-configuration invariants. Detection quality
    /// degrades silently if a violating config is used anyway.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spread_max <= self.mid_diff_max {
            return Err(ConfigError::SpreadNotAboveMidDiff {
                spread_max: self.spread_max,
                mid_diff_max: self.mid_diff_max,
            });
        }
        if self.taper.start_len >= self.taper.full_len {
            return Err(ConfigError::TaperWindowEmpty {
                start_len: self.taper.start_len,
                full_len: self.taper.full_len,
            });
        }
        if self.min_len < 1 {
            return Err(ConfigError::MinLenTooSmall {
                min_len: self.min_len,
            });
        }
        Ok(())
    }
}

/// The live run statistics.
#[derive(Debug, Clone, Copy)]
struct Run<M: Sample> {
    len: i32,
    sum: M::Acc,
    min: M,
    max: M,
    last: M,
    open: bool,
}

impl<M: Sample> Default for Run<M> {
    fn default() -> Self {
        Self {
            len: 0,
            sum: M::Acc::ZERO,
            min: M::MAX_MAG,
            max: M::MIN_MAG,
            last: M::default(),
            open: false,
        }
    }
}

impl<M: Sample> Run<M> {
    /// Fold `mag` into the run and re-evaluate openness.
    #[inline]
    fn push(&mut self, mag: M, min_len: i32, spread_max: i32) -> bool {
        self.len += 1;
        self.sum = self.sum + mag.widen();
        self.last = mag;
        if self.max < mag {
            self.max = mag;
        }
        if self.min > mag {
            self.min = mag;
        }
        self.open = self.len >= min_len && self.spread_ok(spread_max);
        self.open
    }

    #[inline]
    fn spread_ok(&self, spread_max: i32) -> bool {
        // A zero-length run has inverted min/max; it must pass.
        self.len == 0 || (self.max.widen() - self.min.widen()) < acc::<M>(spread_max)
    }

    /// Midpoint between the min and max sample; 0 for an empty run.
    #[inline]
    fn mid_range(&self) -> M {
        if self.len == 0 {
            M::default()
        } else {
            let lo = self.min.widen();
            let span = self.max.widen() - lo;
            M::from_acc(lo + span.half())
        }
    }

    /// Truncated average of the samples; 0 for an empty run.
    fn avg(&self) -> M {
        if self.len == 0 {
            M::default()
        } else {
            M::from_acc(M::Acc::from_i64(self.sum.to_i64() / i64::from(self.len)))
        }
    }
}

#[inline]
fn acc<M: Sample>(v: i32) -> M::Acc {
    M::Acc::from_i64(i64::from(v))
}

/// Streaming 1-D homogeneity segmenter.
///
/// Feed one sample per pixel with [`next`](Self::next); reset between
/// scanlines. The boolean return is the post-update open state, so a
/// `true -> false` edge marks the closing of a homogeneous run.
#[derive(Debug, Clone)]
pub struct RunSegmenter<M: Sample = u8> {
    config: RunSegmenterConfig,
    run: Run<M>,
}

impl<M: Sample> Default for RunSegmenter<M> {
    fn default() -> Self {
        Self::new(RunSegmenterConfig::default())
    }
}

impl<M: Sample> RunSegmenter<M> {
    pub fn new(config: RunSegmenterConfig) -> Self {
        Self {
            config,
            run: Run::default(),
        }
    }

    /// Consume the next sample; returns whether the run is open afterwards.
    #[inline]
    pub fn next(&mut self, mag: M) -> bool {
        if !self.run.open
            && (self.run.last.widen() - mag.widen()).abs() > acc::<M>(self.config.step_diff_max)
        {
            // Too big a jump while still searching; restart behind it.
            self.reset_with(mag);
            return false;
        }

        if self.run.open {
            let len = self.run.len;
            let mid_max = self.config.taper.apply(self.config.mid_diff_max, len);
            let too_far_mid =
                (self.run.mid_range().widen() - mag.widen()).abs() > acc::<M>(mid_max);
            let too_far_avg = self.config.precise_avg_check && {
                let avg_max = i64::from(self.config.taper.apply(self.config.avg_diff_max, len));
                let drift = self.run.sum.to_i64() - mag.widen().to_i64() * i64::from(len);
                drift.abs() > avg_max * i64::from(len)
            };
            if too_far_mid || too_far_avg {
                self.reset_with(mag);
                return false;
            }
            let spread_max = self.config.taper.apply(self.config.spread_max, len);
            let still_open = self.run.push(mag, self.config.min_len, spread_max);
            if !still_open {
                self.reset_with(mag);
            }
            still_open
        } else {
            // Suspected run: accumulate until long enough, abandon on a
            // min/max spread violation. A too-short run is not an error.
            let opened = self
                .run
                .push(mag, self.config.min_len, self.config.spread_max);
            if !self.run.spread_ok(self.config.spread_max) {
                self.reset_with(mag);
            }
            opened
        }
    }

    /// Whether the last [`next`](Self::next) left the run open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.run.open
    }

    /// Average sample of the current run (0 when empty). May be stale
    /// noise while the run is not open.
    pub fn avg(&self) -> M {
        self.run.avg()
    }

    /// Sum of the samples in the current run.
    #[inline]
    pub fn sum(&self) -> M::Acc {
        self.run.sum
    }

    /// Length of the current (suspected or open) run.
    #[inline]
    pub fn run_len(&self) -> i32 {
        self.run.len
    }

    /// Drop all run state. Mandatory between scanlines.
    #[inline]
    pub fn reset(&mut self) {
        self.run = Run::default();
    }

    /// Drop all run state but seed the last-sample shadow, as when the
    /// breaking sample itself may begin the next run.
    #[inline]
    pub fn reset_with(&mut self, last: M) {
        self.run = Run::default();
        self.run.last = last;
    }

    pub fn config(&self) -> &RunSegmenterConfig {
        &self.config
    }
}
