use crate::foundation::core::{Canvas, Point};
use crate::foundation::math::parabola_vertex;
use crate::geometry::projection::ProjectionSet;
use crate::sync::frame_set::SynchronizedFrameSet;

/// Thumbnail width used for orientation tracking.
pub const THUMB_WIDTH: usize = 128;
/// Thumbnail height used for orientation tracking.
pub const THUMB_HEIGHT: usize = 64;

/// Profile ranges below this (gray levels) carry no orientation information.
const FLAT_PROFILE: f32 = 1.0;

/// Rig rotation relative to the reference orientation, as canvas displacements.
///
/// Yaw is a uniform horizontal shift. Pitch and roll are approximated by a vertical shift that
/// varies with longitude: `dy = pitch * cos(lon) + roll * sin(lon)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RotationCorrection {
    /// Horizontal shift, canvas pixels.
    pub yaw_px: f32,
    /// Vertical shift at longitude 0, canvas pixels.
    pub pitch_px: f32,
    /// Vertical shift at longitude +90 degrees, canvas pixels.
    pub roll_px: f32,
}

impl RotationCorrection {
    /// No correction.
    pub const NONE: Self = Self {
        yaw_px: 0.0,
        pitch_px: 0.0,
        roll_px: 0.0,
    };

    /// Displacement to add at canvas position `p`.
    pub fn displacement_at(&self, canvas: Canvas, p: Point) -> (f32, f32) {
        let (s, c) = canvas.longitude(p.x).sin_cos();
        (
            self.yaw_px,
            self.pitch_px * c as f32 + self.roll_px * s as f32,
        )
    }
}

/// Zero-mean 1-D intensity profiles of a panoramic thumbnail.
#[derive(Clone, Debug)]
struct OrientationProfile {
    /// Column means over the mid-latitude band.
    columns: Vec<f32>,
    /// Row means around longitudes 0, +90, 180 and -90 degrees.
    sectors: [Vec<f32>; 4],
}

impl OrientationProfile {
    fn from_thumbnail(thumb: &[f32], tw: usize, th: usize) -> Self {
        let band = (th / 6)..(th - th / 6).max(th / 6 + 1);
        let columns = (0..tw)
            .map(|x| band.clone().map(|y| thumb[y * tw + x]).sum::<f32>() / band.len() as f32)
            .collect();

        let half = (tw / 16).max(1) as isize;
        let centers = [tw / 2, 3 * tw / 4, 0, tw / 4];
        let sectors = centers.map(|cx| {
            (0..th)
                .map(|y| {
                    let sum: f32 = (-half..=half)
                        .map(|d| {
                            let x = (cx as isize + d).rem_euclid(tw as isize) as usize;
                            thumb[y * tw + x]
                        })
                        .sum();
                    sum / (2 * half + 1) as f32
                })
                .collect::<Vec<f32>>()
        });

        Self {
            columns: zero_mean(columns),
            sectors: sectors.map(zero_mean),
        }
    }
}

fn zero_mean(mut v: Vec<f32>) -> Vec<f32> {
    let mean = v.iter().sum::<f32>() / v.len().max(1) as f32;
    for x in &mut v {
        *x -= mean;
    }
    v
}

/// Shift `s` (profile samples, sub-sample precision) with `current[i] ~ reference[i - s]`.
///
/// Candidates are visited from zero outward and only a strictly better cost replaces the best, so
/// ties keep the smallest shift.
fn best_shift(reference: &[f32], current: &[f32], max_shift: isize, circular: bool) -> f32 {
    let lo = reference.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = reference.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = hi - lo;
    if range.is_nan() || range < FLAT_PROFILE {
        return 0.0;
    }

    let n = reference.len() as isize;
    let cost = |s: isize| -> f32 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for i in 0..n {
            let j = i - s;
            let j = if circular {
                j.rem_euclid(n)
            } else if (0..n).contains(&j) {
                j
            } else {
                continue;
            };
            sum += (current[i as usize] - reference[j as usize]).abs();
            count += 1;
        }
        if count == 0 { f32::INFINITY } else { sum / count as f32 }
    };

    let mut best = 0isize;
    let mut best_cost = cost(0);
    for k in 1..=max_shift {
        for s in [k, -k] {
            let c = cost(s);
            if c < best_cost {
                best = s;
                best_cost = c;
            }
        }
    }

    if best_cost <= f32::EPSILON {
        return best as f32;
    }
    let sub = if best.abs() < max_shift {
        parabola_vertex(cost(best - 1), best_cost, cost(best + 1))
    } else {
        0.0
    };
    best as f32 + if sub.is_finite() { sub } else { 0.0 }
}

/// Keeps the panorama's horizon and heading fixed to the first frame set's orientation.
#[derive(Clone, Debug)]
pub struct DirectionLock {
    canvas: Canvas,
    tw: usize,
    th: usize,
    reference: Option<OrientationProfile>,
}

impl DirectionLock {
    /// Lock for `canvas`; the reference is captured from the first frame set seen.
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            tw: THUMB_WIDTH.min(canvas.width as usize).max(8),
            th: THUMB_HEIGHT.min(canvas.height as usize).max(6),
            reference: None,
        }
    }

    /// `true` once the reference orientation has been captured.
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Correction that maps `set` back onto the reference orientation.
    pub fn correction(
        &mut self,
        set: &SynchronizedFrameSet,
        projections: &ProjectionSet,
    ) -> RotationCorrection {
        let thumb = projections.render_gray_thumbnail(&set.frames, self.tw, self.th);
        let profile = OrientationProfile::from_thumbnail(&thumb, self.tw, self.th);
        if self.reference.is_none() {
            self.reference = Some(profile);
            return RotationCorrection::NONE;
        }
        let Some(reference) = &self.reference else {
            return RotationCorrection::NONE;
        };

        let max_cols = (self.tw / 8) as isize;
        let max_rows = (self.th / 8).max(1) as isize;
        let yaw = best_shift(&reference.columns, &profile.columns, max_cols, true);
        let [front, right, back, left] = std::array::from_fn(|k| {
            best_shift(&reference.sectors[k], &profile.sectors[k], max_rows, false)
        });

        let sx = self.canvas.width as f32 / self.tw as f32;
        let sy = self.canvas.height as f32 / self.th as f32;
        let c = RotationCorrection {
            yaw_px: yaw * sx,
            pitch_px: (front - back) * 0.5 * sy,
            roll_px: (right - left) * 0.5 * sy,
        };
        if c != RotationCorrection::NONE {
            tracing::trace!(seq = set.seq, ?c, "direction lock correction");
        }
        c
    }
}

#[cfg(test)]
#[path = "../../tests/unit/align/direction_lock.rs"]
mod tests;
