//! Scanline-level bullseye cross-section recognition.
//!
//! [`ScanlineParser`] treats the closing edges of the homogeneity segmenter
//! as lexical tokens and runs a small state machine over them. A valid
//! cross-section is a long bright preamble, a sharp drop into the first
//! ring stripe, a balanced sequence of ring stripes around a double-width
//! solid center stripe, and a matching sequence back out. The number of
//! opened stripe parentheses is the marker's ring order.
//!
//! Tokens carry the run length, its truncated average and the end x; the
//! average is computed once per token so the per-pixel path stays free of
//! divisions.

use serde::{Deserialize, Serialize};

use crate::sample::{Accum, Sample};
use crate::segment::{RunSegmenter, RunSegmenterConfig};
use crate::ConfigError;

/// Thresholds for the cross-section grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanlineConfig {
    /// Minimum length of the bright preamble run before a marker start is
    /// suspected.
    pub prefix_len_min: i32,
    /// Maximum pixel gap between the preamble's end and the first stripe.
    pub start_gap_max: i32,
    /// Minimum drop in average magnitude from preamble to first stripe.
    pub start_drop_min: i32,
    /// Maximum pixel gap between neighbouring stripes while tracking.
    pub stripe_gap_max: i32,
    /// Maximum length difference between neighbouring stripes, after
    /// allowing for the doubled center stripe.
    pub stripe_len_delta_max: i32,
    /// Tokens shorter than this are discarded before parsing.
    pub token_len_min: i32,
}

impl Default for ScanlineConfig {
    fn default() -> Self {
        Self {
            prefix_len_min: 30,
            start_gap_max: 20,
            start_drop_min: 50,
            stripe_gap_max: 40,
            stripe_len_delta_max: 20,
            token_len_min: 2,
        }
    }
}

impl ScanlineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_drop_min < 1 {
            return Err(ConfigError::StartDropTooSmall {
                start_drop_min: self.start_drop_min,
            });
        }
        Ok(())
    }
}

/// Per-pixel outcome of [`ScanlineParser::next`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStep {
    /// A homogeneous run closed on this pixel.
    pub token_closed: bool,
    /// A full cross-section was recognised on this pixel.
    pub marker_found: bool,
}

/// Snapshot of a closed homogeneous run.
#[derive(Debug, Clone, Copy)]
struct Token<M> {
    len: i32,
    avg: M,
    /// One past the last pixel of the run.
    end_x: i32,
}

impl<M> Token<M> {
    #[inline]
    fn start_x(&self) -> i32 {
        self.end_x - self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PreMarker,
    PreCenter,
    PosCenterStart,
    PosCenterFinishing,
}

/// Which side of the double-width center the length rule is tested on.
#[derive(Clone, Copy)]
enum CenterSide {
    Before,
    After,
}

/// A token that passed the stripe-parenthesis gap and length tests.
struct Paren {
    rising: bool,
    d_same: i32,
    d_special: i32,
}

/// The seam between the frame assembler and its per-scanline tokenizer.
/// Implemented by [`ScanlineParser`]; an alternative 1-D detector can be
/// swapped in through this trait.
pub trait ScanlineDetector<M: Sample> {
    /// Feed one pixel of the current scanline.
    fn next(&mut self, mag: M) -> ScanStep;
    /// Reset for the next scanline.
    fn new_line(&mut self);
    /// X of the last recognised marker center (valid after a
    /// `marker_found` step).
    fn marker_x(&self) -> i32;
    /// Ring order of the last recognised marker.
    fn marker_order(&self) -> u32;
}

/// Streaming recogniser for bullseye cross-sections on one scanline.
#[derive(Debug, Clone)]
pub struct ScanlineParser<M: Sample = u8> {
    segmenter: RunSegmenter<M>,
    config: ScanlineConfig,
    x: i32,
    prev: Option<Token<M>>,
    phase: Phase,
    marker_start: i32,
    center_start: i32,
    center_end: i32,
    marker_end: i32,
    openp: u32,
    closep: u32,
    found: bool,
}

impl<M: Sample> Default for ScanlineParser<M> {
    fn default() -> Self {
        Self::new(RunSegmenterConfig::default(), ScanlineConfig::default())
    }
}

impl<M: Sample> ScanlineParser<M> {
    pub fn new(segmenter: RunSegmenterConfig, config: ScanlineConfig) -> Self {
        Self {
            segmenter: RunSegmenter::new(segmenter),
            config,
            x: 0,
            prev: None,
            phase: Phase::PreMarker,
            marker_start: -1,
            center_start: -1,
            center_end: -1,
            marker_end: -1,
            openp: 0,
            closep: 0,
            found: false,
        }
    }

    /// Feed one pixel. `marker_found` is reported on the pixel whose token
    /// balanced the stripe parentheses; the grammar state survives until
    /// the following call so the marker accessors stay readable.
    #[inline]
    pub fn next(&mut self, mag: M) -> ScanStep {
        if self.found {
            self.reset_grammar();
        }

        let was_open = self.segmenter.is_open();
        let closed_len = self.segmenter.run_len();
        let closed_sum = self.segmenter.sum();
        self.segmenter.next(mag);

        let mut step = ScanStep::default();
        if was_open && !self.segmenter.is_open() && closed_len >= self.config.token_len_min {
            let avg = M::from_acc(M::Acc::from_i64(
                closed_sum.to_i64() / i64::from(closed_len),
            ));
            let token = Token {
                len: closed_len,
                avg,
                end_x: self.x,
            };
            step.token_closed = true;
            step.marker_found = self.consume(token);
            self.found = step.marker_found;
        }

        self.x += 1;
        step
    }

    /// Reset for a new scanline, including the underlying segmenter.
    pub fn new_line(&mut self) {
        self.segmenter.reset();
        self.reset_grammar();
        self.x = 0;
        self.prev = None;
    }

    /// Midpoint of the center stripe of the last recognised marker.
    #[inline]
    pub fn marker_x(&self) -> i32 {
        (self.center_start + self.center_end) / 2
    }

    /// Ring order (stripe pairs per side) of the last recognised marker.
    #[inline]
    pub fn marker_order(&self) -> u32 {
        self.openp
    }

    /// Start x of the recognised cross-section; -1 while unset.
    pub fn marker_start(&self) -> i32 {
        self.marker_start
    }

    /// End x of the recognised cross-section; -1 while unset.
    pub fn marker_end(&self) -> i32 {
        self.marker_end
    }

    /// Bounds of the center stripe; -1 while unset.
    pub fn center_bounds(&self) -> (i32, i32) {
        (self.center_start, self.center_end)
    }

    fn reset_grammar(&mut self) {
        self.phase = Phase::PreMarker;
        self.marker_start = -1;
        self.center_start = -1;
        self.center_end = -1;
        self.marker_end = -1;
        self.openp = 0;
        self.closep = 0;
        self.found = false;
    }

    fn consume(&mut self, token: Token<M>) -> bool {
        let found = match self.prev {
            Some(prev) => self.advance(prev, token),
            None => false,
        };
        self.prev = Some(token);
        found
    }

    fn advance(&mut self, prev: Token<M>, token: Token<M>) -> bool {
        match self.phase {
            Phase::PreMarker => {
                self.try_start(prev, token);
                false
            }
            Phase::PreCenter => {
                self.step_pre_center(prev, token);
                false
            }
            Phase::PosCenterStart => {
                self.step_center_exit(prev, token);
                false
            }
            Phase::PosCenterFinishing => self.step_finishing(prev, token),
        }
    }

    /// Preamble check: long homogeneous prefix, tight transition, sharp
    /// drop into the first stripe.
    fn try_start(&mut self, prev: Token<M>, token: Token<M>) {
        let gap = token.start_x() - prev.end_x;
        let drop = prev.avg.widen() - token.avg.widen();
        if prev.len >= self.config.prefix_len_min
            && gap <= self.config.start_gap_max
            && drop > M::Acc::from_i64(i64::from(self.config.start_drop_min))
        {
            self.marker_start = token.start_x();
            self.phase = Phase::PreCenter;
        }
    }

    fn step_pre_center(&mut self, prev: Token<M>, token: Token<M>) {
        let Some(paren) = self.classify(&prev, &token, CenterSide::Before) else {
            self.reset_grammar();
            return;
        };
        if paren.rising {
            self.openp += 1;
        } else if paren.d_special < paren.d_same {
            // A falling stripe near twice the previous width is the solid
            // center disk. The first stripe of the marker was never
            // counted, so balance it here.
            self.center_start = token.start_x();
            self.openp += 1;
            self.phase = Phase::PosCenterStart;
        }
        // Falling equal-width stripes are interior rings; no counting.
    }

    /// The token right after the center must rise off the darkest stripe;
    /// it closes the first parenthesis and fixes the center's end.
    fn step_center_exit(&mut self, prev: Token<M>, token: Token<M>) {
        match self.classify(&prev, &token, CenterSide::After) {
            Some(paren) if paren.rising => {
                self.center_end = prev.end_x;
                self.closep = 1;
                self.phase = Phase::PosCenterFinishing;
            }
            _ => self.reset_grammar(),
        }
    }

    fn step_finishing(&mut self, prev: Token<M>, token: Token<M>) -> bool {
        let Some(paren) = self.classify(&prev, &token, CenterSide::Before) else {
            self.reset_grammar();
            return false;
        };
        if !paren.rising {
            self.closep += 1;
            if self.closep == self.openp {
                self.marker_end = token.end_x;
                return true;
            }
        }
        false
    }

    /// Stripe parenthesis test: bounded gap to the previous token and a
    /// length near the previous one, where "near" also accepts the doubled
    /// (before) or halved (after) relation around the center stripe.
    fn classify(&self, prev: &Token<M>, token: &Token<M>, side: CenterSide) -> Option<Paren> {
        let gap = token.start_x() - prev.end_x;
        if gap > self.config.stripe_gap_max {
            return None;
        }
        let d_same = (token.len - prev.len).abs();
        let d_special = match side {
            CenterSide::Before => (token.len - 2 * prev.len).abs(),
            CenterSide::After => (token.len - prev.len / 2).abs(),
        };
        if d_same.min(d_special) > self.config.stripe_len_delta_max {
            return None;
        }
        Some(Paren {
            rising: token.avg > prev.avg,
            d_same,
            d_special,
        })
    }
}

impl<M: Sample> ScanlineDetector<M> for ScanlineParser<M> {
    #[inline]
    fn next(&mut self, mag: M) -> ScanStep {
        ScanlineParser::next(self, mag)
    }

    fn new_line(&mut self) {
        ScanlineParser::new_line(self)
    }

    #[inline]
    fn marker_x(&self) -> i32 {
        ScanlineParser::marker_x(self)
    }

    #[inline]
    fn marker_order(&self) -> u32 {
        ScanlineParser::marker_order(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ScanlineParser<u8> {
        ScanlineParser::new(RunSegmenterConfig::default(), ScanlineConfig::default())
    }

    /// Feed `runs` of `(length, value)` pixels; collect (x, order) for
    /// every marker_found event.
    fn feed(parser: &mut ScanlineParser<u8>, runs: &[(usize, u8)]) -> Vec<(i32, u32)> {
        let mut hits = Vec::new();
        for &(len, value) in runs {
            for _ in 0..len {
                let step = parser.next(value);
                if step.marker_found {
                    hits.push((parser.marker_x(), parser.marker_order()));
                }
            }
        }
        hits
    }

    #[test]
    fn order_two_cross_section_is_recognised_once() {
        let mut p = parser();
        let hits = feed(
            &mut p,
            &[
                (120, 240),
                (10, 20),
                (10, 240),
                (20, 20), // double-width center
                (10, 240),
                (10, 20),
                (120, 240),
            ],
        );
        assert_eq!(hits.len(), 1, "exactly one marker event expected");
        let (x, order) = hits[0];
        assert_eq!(order, 2);
        assert!((x - 150).abs() <= 2, "marker x {} should be near 150", x);
    }

    #[test]
    fn center_bounds_cover_the_center_stripe() {
        // The grammar state is readable until the call after the found
        // event, so capture the bounds at the event itself.
        let mut p = parser();
        let runs: &[(usize, u8)] = &[
            (120, 240),
            (10, 20),
            (10, 240),
            (20, 20),
            (10, 240),
            (10, 20),
            (40, 240),
        ];
        let mut captured = None;
        for &(len, value) in runs {
            for _ in 0..len {
                if p.next(value).marker_found {
                    captured = Some((p.center_bounds(), p.marker_start(), p.marker_end()));
                }
            }
        }
        let ((start, end), marker_start, marker_end) =
            captured.expect("one marker event expected");
        assert!((start - 140).abs() <= 2, "center start {} near 140", start);
        assert!((end - 160).abs() <= 2, "center end {} near 160", end);
        assert!((118..=123).contains(&marker_start));
        assert!((178..=182).contains(&marker_end));
    }

    #[test]
    fn order_three_alternating_rings() {
        let mut p = parser();
        let hits = feed(
            &mut p,
            &[
                (60, 240),
                (10, 20),
                (10, 240),
                (10, 20),
                (10, 240),
                (20, 20),
                (10, 240),
                (10, 20),
                (10, 240),
                (10, 20),
                (60, 240),
            ],
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 3);
    }

    #[test]
    fn monotone_brightness_rings_are_recognised() {
        // Ring brightness climbing toward the solid dark center, the way
        // the gradient-style markers are printed.
        let mut p = parser();
        let hits = feed(
            &mut p,
            &[
                (60, 240),
                (10, 20),
                (10, 75),
                (10, 130),
                (10, 185),
                (20, 20), // center disk
                (10, 185),
                (10, 130),
                (10, 75),
                (10, 20),
                (60, 240),
            ],
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 4);
    }

    #[test]
    fn plain_scanline_yields_no_marker() {
        let mut p = parser();
        let hits = feed(&mut p, &[(400, 200)]);
        assert!(hits.is_empty());
        let hits = feed(&mut p, &[(100, 200), (100, 90), (100, 200)]);
        assert!(hits.is_empty());
    }

    #[test]
    fn short_preamble_is_rejected() {
        let mut p = parser();
        let hits = feed(
            &mut p,
            &[
                (12, 240), // well below prefix_len_min
                (10, 20),
                (10, 240),
                (20, 20),
                (10, 240),
                (10, 20),
                (120, 240),
            ],
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn uneven_stripes_reset_the_grammar() {
        let mut p = parser();
        let hits = feed(
            &mut p,
            &[
                (120, 240),
                (10, 20),
                (45, 240), // far from both 1x and 2x of the previous stripe
                (20, 20),
                (10, 240),
                (10, 20),
                (120, 240),
            ],
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn two_markers_on_one_scanline() {
        let marker: &[(usize, u8)] = &[
            (10, 20),
            (10, 240),
            (20, 20),
            (10, 240),
            (10, 20),
        ];
        let mut runs = vec![(120usize, 240u8)];
        runs.extend_from_slice(marker);
        runs.push((120, 240)); // doubles as tail and next preamble
        runs.extend_from_slice(marker);
        runs.push((120, 240));

        let mut p = parser();
        let hits = feed(&mut p, &runs);
        assert_eq!(hits.len(), 2, "both markers should be recognised");
        assert_eq!(hits[0].1, 2);
        assert_eq!(hits[1].1, 2);
        assert!(hits[1].0 > hits[0].0);
    }

    #[test]
    fn runt_tokens_are_discarded() {
        let strict = ScanlineConfig {
            token_len_min: 12,
            ..ScanlineConfig::default()
        };
        let mut p = ScanlineParser::<u8>::new(RunSegmenterConfig::default(), strict);
        // Every stripe closes with length ~9, below the token floor, so
        // the grammar never sees a single stripe token.
        let hits = feed(
            &mut p,
            &[
                (120, 240),
                (10, 20),
                (10, 240),
                (20, 20),
                (10, 240),
                (10, 20),
                (120, 240),
            ],
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn new_line_clears_marker_state() {
        let mut p = parser();
        let hits = feed(
            &mut p,
            &[
                (120, 240),
                (10, 20),
                (10, 240),
                (20, 20),
                (10, 240),
                (10, 20),
                (40, 240),
            ],
        );
        assert_eq!(hits.len(), 1);
        p.new_line();
        assert_eq!(p.center_bounds(), (-1, -1));
        assert_eq!(p.marker_order(), 0);
        assert_eq!(p.marker_start(), -1);
    }
}
