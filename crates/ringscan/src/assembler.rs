//! 2-D assembly of per-scanline center hits into markers.
//!
//! [`FrameAssembler`] owns a scanline detector and a fixed-capacity arena
//! of live [`CenterTrack`]s ordered left to right. Each scanline hit either
//! extends an existing track, starts a new one, or retires tracks that fell
//! too far behind the current row. Finished tracks become [`Marker2D`]
//! records in the frame result.
//!
//! Pixels must arrive scanline-major: x grows within a line, lines are
//! separated by [`FrameAssembler::end_line`], and y grows within a frame.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::arena::{ArenaList, ArenaPos};
use crate::sample::Sample;
use crate::scanline::{ScanStep, ScanlineDetector, ScanlineParser};
use crate::{ConfigError, FrameResult, Marker2D};

/// Smallest ring order the detector reports.
pub const MIN_ORDER: u32 = 2;
/// Largest ring order tracked by the order histogram; higher reports clamp.
pub const MAX_ORDER: u32 = 5;

const ORDER_BUCKETS: usize = MAX_ORDER as usize + 1;

/// Thresholds for stitching scanline hits into vertical tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Tracks confirmed on fewer scanlines than this are emitted with the
    /// `order == 0` rejection sentinel.
    pub min_signal_count: u32,
    /// Scanline hits with a smaller ring order are ignored outright.
    pub min_order: u32,
    /// Maximum x drift between a track's last hit and a new hit.
    pub center_drift_max: i32,
    /// Maximum total x spread a track may accumulate.
    pub width_spread_max: i32,
    /// A track closes once this many scanlines pass without a hit.
    pub close_gap_y: i32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            min_signal_count: 3,
            min_order: MIN_ORDER,
            center_drift_max: 6,
            width_spread_max: 12,
            close_gap_y: 3,
        }
    }
}

impl AssemblerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_order > MAX_ORDER {
            return Err(ConfigError::MinOrderOutOfRange {
                min_order: self.min_order,
            });
        }
        Ok(())
    }
}

/// A live vertical marker candidate: the running accumulation of center
/// hits across adjacent scanlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterTrack {
    last_x: i32,
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
    signal_count: u32,
    confidence: i32,
    confidence_temp: i32,
    orders: [u16; ORDER_BUCKETS],
}

impl CenterTrack {
    fn new(x: i32, y: i32, order: u32) -> Self {
        let mut orders = [0u16; ORDER_BUCKETS];
        orders[order.min(MAX_ORDER) as usize] = 1;
        Self {
            last_x: x,
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
            signal_count: 1,
            confidence: 1,
            confidence_temp: 1,
            orders,
        }
    }

    /// Fold a hit at `(x, y)` into the track. Rejects hits that drift too
    /// far from the last confirmed x or would stretch the track's width
    /// beyond `spread_max`; rejection counts against the running
    /// confidence.
    fn try_extend(&mut self, x: i32, y: i32, order: u32, drift_max: i32, spread_max: i32) -> bool {
        if (self.last_x - x).abs() > drift_max {
            self.note_skip();
            return false;
        }
        let min_x = self.min_x.min(x);
        let max_x = self.max_x.max(x);
        if max_x - min_x > spread_max {
            self.note_skip();
            return false;
        }
        self.min_x = min_x;
        self.max_x = max_x;
        self.last_x = x;
        self.max_y = y;
        self.orders[order.min(MAX_ORDER) as usize] += 1;
        self.signal_count += 1;
        self.confidence_temp += 1;
        // The confirmed confidence trails the running one so that skipped
        // scanlines after the last confirmation never dilute it.
        self.confidence = self.confidence_temp;
        true
    }

    #[inline]
    fn note_skip(&mut self) {
        self.confidence_temp -= 1;
    }

    /// True once `y` has moved more than `gap` scanlines past the last
    /// confirmed hit.
    #[inline]
    fn should_close(&self, y: i32, gap: i32) -> bool {
        y - self.max_y > gap
    }

    /// The greatest hit x this track could still absorb without violating
    /// either the drift or the width constraint.
    #[inline]
    fn rightmost_acceptable_x(&self, drift_max: i32, spread_max: i32) -> i32 {
        (self.last_x + drift_max).max(self.min_x + spread_max)
    }

    /// Collapse the track into an emitted marker. Tracks with fewer than
    /// `min_signal` confirmations get the `order == 0` rejection sentinel.
    fn construct_marker(&self, min_signal: u32) -> Marker2D {
        let order = if self.signal_count >= min_signal {
            self.best_order()
        } else {
            0
        };
        Marker2D {
            x: ((self.max_x + self.min_x) / 2).max(0) as u32,
            y: ((self.max_y + self.min_y) / 2).max(0) as u32,
            confidence: self.confidence.max(0) as u32,
            order,
        }
    }

    /// Most voted ring order; the lowest order wins a tie.
    fn best_order(&self) -> u32 {
        let mut best = 0usize;
        for (bucket, &votes) in self.orders.iter().enumerate() {
            if votes > self.orders[best] {
                best = bucket;
            }
        }
        best as u32
    }

    /// Number of scanlines that confirmed this track.
    pub fn signal_count(&self) -> u32 {
        self.signal_count
    }

    /// Horizontal bounds of the confirmed hits.
    pub fn x_bounds(&self) -> (i32, i32) {
        (self.min_x, self.max_x)
    }

    /// Vertical bounds of the confirmed hits.
    pub fn y_bounds(&self) -> (i32, i32) {
        (self.min_y, self.max_y)
    }
}

/// Whole-frame marker detector.
///
/// Generic over the sample type, the per-scanline tokenizer (the seam for
/// alternative 1-D detectors) and the compile-time bound on simultaneously
/// live tracks. When the arena is full, further detections on the same
/// rows are dropped silently and the frame degrades gracefully.
#[derive(Debug, Clone)]
pub struct FrameAssembler<
    M: Sample = u8,
    P: ScanlineDetector<M> = ScanlineParser<M>,
    const CAP: usize = 64,
> {
    detector: P,
    config: AssemblerConfig,
    tracks: ArenaList<CenterTrack, CAP>,
    /// Entry immediately before the current attempt position.
    last_pos: ArenaPos,
    /// Current attempt position; `next(last_pos)` between placements.
    list_pos: ArenaPos,
    fresh_line: bool,
    line_dirty: bool,
    x: u32,
    y: i32,
    markers: Vec<Marker2D>,
    dropped: u32,
    _sample: PhantomData<M>,
}

impl<M: Sample> Default for FrameAssembler<M, ScanlineParser<M>, 64> {
    fn default() -> Self {
        Self::new(ScanlineParser::default(), AssemblerConfig::default())
    }
}

impl<M, P, const CAP: usize> FrameAssembler<M, P, CAP>
where
    M: Sample,
    P: ScanlineDetector<M>,
{
    pub fn new(detector: P, config: AssemblerConfig) -> Self {
        Self {
            detector,
            config,
            tracks: ArenaList::new(),
            last_pos: ArenaPos::NIL,
            list_pos: ArenaPos::NIL,
            fresh_line: true,
            line_dirty: false,
            x: 0,
            y: 0,
            markers: Vec::new(),
            dropped: 0,
            _sample: PhantomData,
        }
    }

    /// Feed one pixel of the current scanline. The returned step mirrors
    /// the underlying detector and is mainly useful for diagnostics.
    #[inline]
    pub fn next(&mut self, mag: M) -> ScanStep {
        self.line_dirty = true;
        let step = self.detector.next(mag);
        if step.marker_found {
            let order = self.detector.marker_order();
            if order >= self.config.min_order {
                self.place(self.detector.marker_x(), self.y, order);
            }
        }
        self.x += 1;
        step
    }

    /// Close the current scanline. A second call without intervening
    /// pixels is a no-op, so accidental double line ends cannot skew the
    /// vertical geometry.
    pub fn end_line(&mut self) {
        if !self.line_dirty {
            return;
        }
        self.line_dirty = false;
        self.y += 1;
        self.x = 0;
        self.last_pos = ArenaPos::NIL;
        self.list_pos = ArenaPos::NIL;
        self.fresh_line = true;
        self.detector.new_line();
    }

    /// Close the frame: finalize every remaining track, reset all cursors
    /// and return the collected markers.
    pub fn end_image_frame(&mut self) -> FrameResult {
        self.end_line();

        let mut pos = self.tracks.head();
        while !pos.is_nil() {
            if let Some(track) = self.tracks.get(pos).copied() {
                self.finalize(track);
            }
            pos = self.tracks.next(pos);
        }
        self.tracks.reset();
        self.last_pos = ArenaPos::NIL;
        self.list_pos = ArenaPos::NIL;
        self.fresh_line = true;
        self.line_dirty = false;
        self.x = 0;
        self.y = 0;
        self.detector.new_line();

        let markers = std::mem::take(&mut self.markers);
        tracing::debug!(
            markers = markers.len(),
            dropped = self.dropped,
            "image frame closed"
        );
        self.dropped = 0;
        FrameResult { markers }
    }

    /// Scanline index of the row currently being fed.
    pub fn current_line(&self) -> i32 {
        self.y
    }

    /// Pixel cursor as `(x, y)` within the current frame.
    pub fn cursor(&self) -> (u32, i32) {
        (self.x, self.y)
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn detector(&self) -> &P {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut P {
        &mut self.detector
    }

    /// Walk the left-to-right ordered track list and place one hit. The
    /// cursors persist across hits of the same scanline, so each track is
    /// visited at most once per row.
    fn place(&mut self, cx: i32, y: i32, order: u32) {
        if self.fresh_line {
            self.last_pos = ArenaPos::NIL;
            self.list_pos = self.tracks.head();
            self.fresh_line = false;
        }
        let drift_max = self.config.center_drift_max;
        let spread_max = self.config.width_spread_max;

        loop {
            if self.list_pos.is_nil() {
                self.insert_between(cx, y, order);
                return;
            }
            let Some(track) = self.tracks.get_mut(self.list_pos) else {
                self.list_pos = ArenaPos::NIL;
                continue;
            };
            let closable = track.should_close(y, self.config.close_gap_y);
            let extended = !closable && track.try_extend(cx, y, order, drift_max, spread_max);
            let rightmost = track.rightmost_acceptable_x(drift_max, spread_max);

            if extended {
                self.step_cursors();
                return;
            }
            if rightmost > cx {
                // Everything from here on can only absorb hits further
                // right; the new center slots in just before this track.
                self.insert_between(cx, y, order);
                return;
            }
            if closable {
                let finished = *track;
                self.finalize(finished);
                self.list_pos = self.tracks.unlink_after(self.last_pos);
                continue;
            }
            self.step_cursors();
        }
    }

    /// Insert a fresh track between `last_pos` and `list_pos`, keeping
    /// `next(last_pos) == list_pos`. A full arena drops the detection.
    fn insert_between(&mut self, cx: i32, y: i32, order: u32) {
        let pos = self
            .tracks
            .insert_after(CenterTrack::new(cx, y, order), self.last_pos);
        if pos.is_nil() {
            self.dropped += 1;
            tracing::debug!(cx, y, "track arena full, detection dropped");
        } else {
            self.last_pos = pos;
        }
    }

    #[inline]
    fn step_cursors(&mut self) {
        self.last_pos = self.list_pos;
        self.list_pos = self.tracks.next(self.list_pos);
    }

    fn finalize(&mut self, track: CenterTrack) {
        let marker = track.construct_marker(self.config.min_signal_count);
        tracing::trace!(
            x = marker.x,
            y = marker.y,
            order = marker.order,
            confidence = marker.confidence,
            "track finalized"
        );
        self.markers.push(marker);
    }

    /// Feed a whole greyscale image in scanline-major order and close the
    /// frame. Streaming callers drive [`next`](Self::next) and
    /// [`end_line`](Self::end_line) directly.
    pub fn process_frame(&mut self, image: &image::GrayImage) -> FrameResult
    where
        M: From<u8>,
    {
        for row in image.rows() {
            for pixel in row {
                self.next(M::from(pixel[0]));
            }
            self.end_line();
        }
        self.end_image_frame()
    }

    #[cfg(test)]
    fn track_rightmost_keys(&self) -> Vec<i32> {
        let mut keys = Vec::new();
        let mut pos = self.tracks.head();
        while !pos.is_nil() {
            if let Some(track) = self.tracks.get(pos) {
                keys.push(track.rightmost_acceptable_x(
                    self.config.center_drift_max,
                    self.config.width_spread_max,
                ));
            }
            pos = self.tracks.next(pos);
        }
        keys
    }
}
