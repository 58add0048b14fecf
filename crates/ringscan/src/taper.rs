//! Length-dependent threshold relaxation.
//!
//! Long homogeneous runs drift more than short ones (vignetting, slow
//! illumination gradients), so the segmenter widens its deviation thresholds
//! as a run grows. The relaxation is a fixed piecewise function of the run
//! length, computed with shifts and one small multiply; the per-pixel path
//! must stay division-free.

use serde::{Deserialize, Serialize};

/// How a threshold scales with run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaperMode {
    /// Thresholds are length-independent.
    Off,
    /// Double the threshold once the run passes `start_len`.
    Double,
    /// Interpolate between unchanged and fully relaxed across the
    /// `[start_len, full_len)` window in `2^steps_exp` steps.
    #[default]
    Stepped,
}

/// Configuration for [`LengthTaper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthTaper {
    pub mode: TaperMode,
    /// Run lengths below this are unaffected.
    pub start_len: i32,
    /// Run lengths at or above this get the full relaxation.
    pub full_len: i32,
    /// The interpolation window is split into `2^steps_exp` steps.
    pub steps_exp: u32,
    /// The full relaxation adds `value >> frac_exp`; 0 means doubling.
    pub frac_exp: u32,
}

impl Default for LengthTaper {
    fn default() -> Self {
        Self {
            mode: TaperMode::Stepped,
            start_len: 32,
            full_len: 256,
            steps_exp: 2,
            frac_exp: 1,
        }
    }
}

impl LengthTaper {
    /// A taper that never changes the threshold.
    pub fn off() -> Self {
        Self {
            mode: TaperMode::Off,
            ..Self::default()
        }
    }

    /// Relax `value` for a run of `len` samples.
    ///
    /// Precondition: `start_len < full_len`. Violations are not checked on
    /// this path; [`crate::ConfigError`] reports them at validation time.
    #[inline]
    pub fn apply(&self, value: i32, len: i32) -> i32 {
        match self.mode {
            TaperMode::Off => value,
            TaperMode::Double => {
                if len < self.start_len {
                    value
                } else {
                    value << 1
                }
            }
            TaperMode::Stepped => self.apply_stepped(value, len),
        }
    }

    #[inline]
    fn apply_stepped(&self, value: i32, len: i32) -> i32 {
        if len < self.start_len || self.steps_exp == 0 || len == 0 || value == 0 {
            return value;
        }
        let bump = value >> self.frac_exp;
        if len >= self.full_len {
            return value + bump;
        }

        // Locate the step by binary descent over the window; `steps_exp`
        // halvings pin down which of the 2^steps_exp slices holds `len`.
        let mut lo = self.start_len;
        let mut hi = self.full_len;
        let mut step = 0i32;
        for _ in 0..self.steps_exp {
            let mid = lo + ((hi - lo) >> 1);
            step <<= 1;
            if len >= mid {
                step |= 1;
                lo = mid;
            } else {
                hi = mid;
            }
        }
        value + ((bump * (step + 1)) >> self.steps_exp)
    }
}
