//! ringscan: single-pass detection of concentric-ring (bullseye) fiducial
//! markers in greyscale images and live video.
//!
//! The detector walks the image once, left to right and top to bottom, with
//! bounded integer work per pixel and no revisits, which makes it suitable
//! for low-latency video streams. It is layered as three coupled stream
//! stages:
//!
//! 1. **Segment** - [`RunSegmenter`] classifies each horizontal pixel run
//!    as homogeneous or not, with length-tapered adaptive thresholds.
//! 2. **Scanline** - [`ScanlineParser`] consumes the closing runs as
//!    lexical tokens and recognises bullseye cross-sections: a long bright
//!    preamble, balanced ring stripes around a double-width center stripe,
//!    and a symmetric sequence back out.
//! 3. **Assemble** - [`FrameAssembler`] stitches per-scanline center hits
//!    into vertical tracks held in a fixed-capacity arena list and emits
//!    [`Marker2D`] records as tracks fall out of scope.
//!
//! # Public API
//! [`FrameAssembler`] is the primary entry point; feed it pixels with
//! `next`, separate scanlines with `end_line` and collect a frame's markers
//! with `end_image_frame`. The lower stages are public for callers that
//! only need 1-D segmentation or per-scanline recognition, and
//! [`PoseSolver`] is the seam towards an external pose estimator.

mod arena;
mod assembler;
mod pose;
mod sample;
mod scanline;
mod segment;
pub mod synth;
mod taper;

pub use arena::{ArenaList, ArenaPos};
pub use assembler::{
    AssemblerConfig, CenterTrack, FrameAssembler, MAX_ORDER, MIN_ORDER,
};
pub use pose::{NopPoseSolver, Pose3D, PoseEstimator, PoseSolver};
pub use sample::{Accum, Sample};
pub use scanline::{ScanStep, ScanlineConfig, ScanlineDetector, ScanlineParser};
pub use segment::{RunSegmenter, RunSegmenterConfig};
pub use taper::{LengthTaper, TaperMode};

/// A detected marker in pixel coordinates.
///
/// `order == 0` flags a track that was assembled but rejected by the
/// signal-count threshold; callers may filter these out or keep them as
/// weak evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Marker2D {
    /// Center x in pixels.
    pub x: u32,
    /// Center y in pixels.
    pub y: u32,
    /// Confirmed scanline count, reduced by skipped rows between the first
    /// and last confirmation.
    pub confidence: u32,
    /// Ring order in `[MIN_ORDER, MAX_ORDER]`, or 0 for rejected tracks.
    pub order: u32,
}

impl Marker2D {
    /// Whether the marker passed the signal-count threshold.
    pub fn is_accepted(&self) -> bool {
        self.order != 0
    }
}

/// All markers collected for one image frame, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameResult {
    pub markers: Vec<Marker2D>,
}

impl FrameResult {
    /// Markers that passed the signal-count threshold.
    pub fn accepted(&self) -> impl Iterator<Item = &Marker2D> {
        self.markers.iter().filter(|m| m.is_accepted())
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Degenerate-configuration reports from the `validate` helpers.
///
/// The stream operations themselves never fail; running with an invalid
/// configuration only degrades detection quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `spread_max` must exceed `mid_diff_max`.
    SpreadNotAboveMidDiff { spread_max: i32, mid_diff_max: i32 },
    /// The taper window `[start_len, full_len)` is empty.
    TaperWindowEmpty { start_len: i32, full_len: i32 },
    /// Runs of fewer than one pixel cannot open.
    MinLenTooSmall { min_len: i32 },
    /// A non-positive start drop matches flat scanlines.
    StartDropTooSmall { start_drop_min: i32 },
    /// `min_order` exceeds the largest tracked order.
    MinOrderOutOfRange { min_order: u32 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpreadNotAboveMidDiff {
                spread_max,
                mid_diff_max,
            } => write!(
                f,
                "spread_max ({}) must be greater than mid_diff_max ({})",
                spread_max, mid_diff_max
            ),
            Self::TaperWindowEmpty {
                start_len,
                full_len,
            } => write!(
                f,
                "taper window is empty: start_len {} >= full_len {}",
                start_len, full_len
            ),
            Self::MinLenTooSmall { min_len } => {
                write!(f, "min_len must be at least 1, got {}", min_len)
            }
            Self::StartDropTooSmall { start_drop_min } => {
                write!(f, "start_drop_min must be positive, got {}", start_drop_min)
            }
            Self::MinOrderOutOfRange { min_order } => write!(
                f,
                "min_order {} exceeds the largest tracked order {}",
                min_order, MAX_ORDER
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
