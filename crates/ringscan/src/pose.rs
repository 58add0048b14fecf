//! Seam towards an external perspective-n-point pose estimator.
//!
//! The detector itself stays 2-D; pose recovery is delegated through the
//! single-method [`PoseSolver`] trait. [`PoseEstimator`] only arranges to
//! call the solver once per frame with the frame's accepted marker centers
//! paired against a caller-supplied list of world anchor points.

use crate::assembler::FrameAssembler;
use crate::sample::Sample;
use crate::scanline::{ScanStep, ScanlineDetector, ScanlineParser};
use crate::{FrameResult, Marker2D};

/// A 3x4 camera transform, row-major, translation in the last column.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pose3D {
    pub transform: [[f64; 4]; 3],
}

impl Pose3D {
    /// Identity rotation with zero translation.
    pub const IDENTITY: Pose3D = Pose3D {
        transform: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    /// The camera position encoded in the last column.
    pub fn translation(&self) -> [f64; 3] {
        [
            self.transform[0][3],
            self.transform[1][3],
            self.transform[2][3],
        ]
    }
}

/// Perspective-n-point solver over `n` correspondences between normalized
/// screen coordinates and world coordinates.
pub trait PoseSolver {
    fn solve(&self, screen_xy: &[[f64; 2]], world_xyz: &[[f64; 3]]) -> Pose3D;
}

/// Placeholder solver that always reports the identity pose. Stands in for
/// a real estimator during bring-up and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPoseSolver;

impl PoseSolver for NopPoseSolver {
    fn solve(&self, _screen_xy: &[[f64; 2]], _world_xyz: &[[f64; 3]]) -> Pose3D {
        Pose3D::IDENTITY
    }
}

/// Frame-level glue between the assembler and a pose solver.
///
/// World anchors are listed in left-to-right screen order of the markers
/// they correspond to. The solver runs only on frames where the number of
/// accepted markers matches the anchor count; other frames yield `None`.
pub struct PoseEstimator<
    S: PoseSolver,
    M: Sample = u8,
    P: ScanlineDetector<M> = ScanlineParser<M>,
    const CAP: usize = 64,
> {
    assembler: FrameAssembler<M, P, CAP>,
    solver: S,
    anchors: Vec<[f64; 3]>,
    image_size: [u32; 2],
}

impl<S, M, P, const CAP: usize> PoseEstimator<S, M, P, CAP>
where
    S: PoseSolver,
    M: Sample,
    P: ScanlineDetector<M>,
{
    pub fn new(
        assembler: FrameAssembler<M, P, CAP>,
        solver: S,
        anchors: Vec<[f64; 3]>,
        image_size: [u32; 2],
    ) -> Self {
        Self {
            assembler,
            solver,
            anchors,
            image_size,
        }
    }

    /// Feed one pixel; mirrors [`FrameAssembler::next`].
    #[inline]
    pub fn next(&mut self, mag: M) -> ScanStep {
        self.assembler.next(mag)
    }

    /// Close the current scanline.
    pub fn end_line(&mut self) {
        self.assembler.end_line();
    }

    /// Close the frame and, when the accepted markers pair up with the
    /// anchors, hand them to the solver.
    pub fn end_image_frame(&mut self) -> (FrameResult, Option<Pose3D>) {
        let result = self.assembler.end_image_frame();
        let pose = self.solve_for(&result);
        (result, pose)
    }

    pub fn assembler(&self) -> &FrameAssembler<M, P, CAP> {
        &self.assembler
    }

    fn solve_for(&self, result: &FrameResult) -> Option<Pose3D> {
        let mut accepted: Vec<&Marker2D> = result.accepted().collect();
        if accepted.is_empty() || accepted.len() != self.anchors.len() {
            return None;
        }
        accepted.sort_by_key(|m| (m.x, m.y));

        let w = f64::from(self.image_size[0].max(1));
        let h = f64::from(self.image_size[1].max(1));
        let screen: Vec<[f64; 2]> = accepted
            .iter()
            .map(|m| {
                [
                    f64::from(m.x) / w * 2.0 - 1.0,
                    f64::from(m.y) / h * 2.0 - 1.0,
                ]
            })
            .collect();
        Some(self.solver.solve(&screen, &self.anchors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssemblerConfig;
    use std::cell::RefCell;

    /// Detector stub firing a marker at fixed columns on every row.
    struct FixedHits {
        x: i32,
        columns: Vec<i32>,
        found_x: i32,
    }

    impl ScanlineDetector<u8> for FixedHits {
        fn next(&mut self, _mag: u8) -> ScanStep {
            let found = self.columns.contains(&self.x);
            if found {
                self.found_x = self.x;
            }
            self.x += 1;
            ScanStep {
                token_closed: found,
                marker_found: found,
            }
        }

        fn new_line(&mut self) {
            self.x = 0;
        }

        fn marker_x(&self) -> i32 {
            self.found_x
        }

        fn marker_order(&self) -> u32 {
            2
        }
    }

    struct RecordingSolver {
        calls: RefCell<Vec<(Vec<[f64; 2]>, Vec<[f64; 3]>)>>,
    }

    impl PoseSolver for RecordingSolver {
        fn solve(&self, screen_xy: &[[f64; 2]], world_xyz: &[[f64; 3]]) -> Pose3D {
            self.calls
                .borrow_mut()
                .push((screen_xy.to_vec(), world_xyz.to_vec()));
            Pose3D::IDENTITY
        }
    }

    fn run_frame<S: PoseSolver>(
        estimator: &mut PoseEstimator<S, u8, FixedHits, 16>,
        rows: usize,
        width: i32,
    ) -> (FrameResult, Option<Pose3D>) {
        for _ in 0..rows {
            for _ in 0..width {
                estimator.next(0);
            }
            estimator.end_line();
        }
        estimator.end_image_frame()
    }

    #[test]
    fn matching_counts_invoke_the_solver_once() {
        let detector = FixedHits {
            x: 0,
            columns: vec![32, 96],
            found_x: -1,
        };
        let assembler = FrameAssembler::<u8, FixedHits, 16>::new(
            detector,
            AssemblerConfig {
                min_signal_count: 1,
                ..AssemblerConfig::default()
            },
        );
        let solver = RecordingSolver {
            calls: RefCell::new(Vec::new()),
        };
        let anchors = vec![[0.0, 0.0, 0.0], [40.0, 0.0, 0.0]];
        let mut estimator = PoseEstimator::new(assembler, solver, anchors, [128, 128]);

        let (result, pose) = run_frame(&mut estimator, 6, 128);
        assert_eq!(result.accepted().count(), 2);
        assert_eq!(pose, Some(Pose3D::IDENTITY));

        let calls = estimator.solver.calls.borrow();
        assert_eq!(calls.len(), 1);
        let (screen, world) = &calls[0];
        assert_eq!(world.len(), 2);
        // Left-to-right pairing with coordinates normalized into [-1, 1].
        assert!(screen[0][0] < screen[1][0]);
        for point in screen {
            assert!(point[0] > -1.0 && point[0] < 1.0);
            assert!(point[1] > -1.0 && point[1] < 1.0);
        }
    }

    #[test]
    fn anchor_count_mismatch_skips_the_solver() {
        let detector = FixedHits {
            x: 0,
            columns: vec![32],
            found_x: -1,
        };
        let assembler = FrameAssembler::<u8, FixedHits, 16>::new(
            detector,
            AssemblerConfig {
                min_signal_count: 1,
                ..AssemblerConfig::default()
            },
        );
        let anchors = vec![[0.0, 0.0, 0.0], [40.0, 0.0, 0.0]];
        let mut estimator = PoseEstimator::new(assembler, NopPoseSolver, anchors, [128, 128]);

        let (result, pose) = run_frame(&mut estimator, 4, 128);
        assert_eq!(result.accepted().count(), 1);
        assert!(pose.is_none());
    }

    #[test]
    fn identity_pose_has_zero_translation() {
        assert_eq!(Pose3D::IDENTITY.translation(), [0.0, 0.0, 0.0]);
    }
}
