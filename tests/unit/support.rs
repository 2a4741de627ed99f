//! Synthetic rigs and frames shared by unit tests.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::foundation::core::{Canvas, StreamId, Timestamp};
use crate::geometry::lens::{AccessoryProfile, LensGeometry, RigGeometry};
use crate::geometry::projection::ProjectionSet;
use crate::job::model::StreamLocator;
use crate::source::RawFrame;
use crate::sync::frame_set::SynchronizedFrameSet;

pub(crate) const SRC: u32 = 64;

pub(crate) fn dual_rig() -> RigGeometry {
    RigGeometry::dual_fisheye(&[StreamLocator::front("f"), StreamLocator::back("b")])
}

pub(crate) fn dual_projections(canvas: Canvas, stride: u32) -> Arc<ProjectionSet> {
    Arc::new(
        ProjectionSet::build(canvas, stride, &dual_rig(), AccessoryProfile::NONE, &[(SRC, SRC); 2])
            .unwrap(),
    )
}

/// Smooth, textured brightness as a function of world direction.
pub(crate) fn world_texture(d: [f64; 3]) -> u8 {
    let v = 128.0 + 55.0 * (6.0 * d[0] + 2.0 * d[1]).sin() + 45.0 * (5.0 * d[2] - 3.0 * d[1]).cos();
    v.clamp(0.0, 255.0) as u8
}

/// Fisheye image of the synthetic world as seen through `lens`, with the world turned by
/// `yaw_offset_deg` before imaging.
pub(crate) fn lens_frame(stream: u16, lens: &LensGeometry, yaw_offset_deg: f64) -> RawFrame {
    let lens_to_world = lens.world_to_lens().transpose();
    let (w, h) = (f64::from(SRC), f64::from(SRC));
    let radius = lens.radius * w.min(h) * 0.5;
    let half_fov = (lens.fov_deg * 0.5).to_radians();
    let (cx, cy) = (lens.center_x * w - 0.5, lens.center_y * h - 0.5);
    let (sy, cyaw) = yaw_offset_deg.to_radians().sin_cos();

    let mut data = Vec::with_capacity((SRC * SRC * 4) as usize);
    for py in 0..SRC {
        for px in 0..SRC {
            let (dx, dy) = (f64::from(px) - cx, cy - f64::from(py));
            let theta = (dx * dx + dy * dy).sqrt() / radius * half_fov;
            let alpha = dy.atan2(dx);
            let local = [theta.sin() * alpha.cos(), theta.sin() * alpha.sin(), theta.cos()];
            let [x, y, z] = lens_to_world.apply(local);
            let turned = [cyaw * x + sy * z, y, -sy * x + cyaw * z];
            let v = world_texture(turned);
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    RawFrame {
        stream: StreamId(stream),
        index: 0,
        pts: Timestamp::ZERO,
        width: SRC,
        height: SRC,
        data: Arc::new(data),
    }
}

/// Both lenses of the dual rig imaging the synthetic world; the back lens sees it turned by
/// `back_yaw_offset_deg`.
pub(crate) fn textured_set(seq: u64, back_yaw_offset_deg: f64) -> SynchronizedFrameSet {
    let rig = dual_rig();
    let frames: SmallVec<[RawFrame; 2]> = SmallVec::from_vec(vec![
        lens_frame(0, &rig.lenses[0], 0.0),
        lens_frame(1, &rig.lenses[1], back_yaw_offset_deg),
    ]);
    frame_set(seq, frames)
}

pub(crate) fn solid_set(seq: u64, rgba: [u8; 4]) -> SynchronizedFrameSet {
    let frames = (0..2)
        .map(|i| RawFrame::solid(StreamId(i), seq, Timestamp::ZERO, SRC, SRC, rgba))
        .collect();
    frame_set(seq, frames)
}

pub(crate) fn frame_set(seq: u64, frames: SmallVec<[RawFrame; 2]>) -> SynchronizedFrameSet {
    SynchronizedFrameSet {
        seq,
        pts: Timestamp(seq as i64 * 33_333),
        frames,
        skew_us: 0,
        degraded: false,
    }
}
