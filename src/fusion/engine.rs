use std::sync::Arc;

use rayon::prelude::*;

use crate::align::field::AlignmentField;
use crate::align::overlap::{OverlapPair, check_set, overlap_pairs};
use crate::foundation::core::Point;
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::{sample_rgba8_bilinear, smoothstep};
use crate::fusion::PanoramicFrame;
use crate::fusion::exposure::overlap_gains;
use crate::geometry::projection::{LensSample, ProjectionSet};
use crate::job::model::StitchJob;
use crate::sync::frame_set::SynchronizedFrameSet;

/// Blend behaviour, fixed when the engine is built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusionConfig {
    /// Seam blending; when off each pixel comes from the lens it is most central to.
    pub blend: bool,
    /// Width of the blend ramp inside each image circle, as a fraction of the half field of view.
    pub blend_band: f32,
    /// Match lens gains over the overlap before blending.
    pub exposure_compensation: bool,
}

impl FusionConfig {
    /// Configuration from the job's feature toggles and tuning.
    pub fn from_job(job: &StitchJob) -> Self {
        Self {
            blend: job.features.fusion,
            blend_band: job.tuning.blend_band,
            exposure_compensation: job.features.exposure_compensation,
        }
    }
}

/// Warps and blends frame sets into panoramic frames.
///
/// `fuse` is a pure function of the frame set and fields, so the engine can be shared freely.
pub struct FusionEngine {
    cfg: FusionConfig,
    projections: Arc<ProjectionSet>,
    pairs: Vec<OverlapPair>,
}

impl FusionEngine {
    /// Engine over `projections`.
    pub fn new(cfg: FusionConfig, projections: Arc<ProjectionSet>) -> Self {
        let pairs = if cfg.exposure_compensation {
            overlap_pairs(&projections)
        } else {
            Vec::new()
        };
        Self {
            cfg,
            projections,
            pairs,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> FusionConfig {
        self.cfg
    }

    /// Fuse one frame set, `fields[i]` warping stream `i`.
    #[tracing::instrument(level = "trace", skip_all, fields(seq = set.seq))]
    pub fn fuse(
        &self,
        set: &SynchronizedFrameSet,
        fields: &[AlignmentField],
    ) -> StitchResult<PanoramicFrame> {
        check_set(set, &self.projections)?;
        if fields.len() != set.len() {
            return Err(StitchError::configuration(format!(
                "frame set {} has {} frames but {} alignment fields",
                set.seq,
                set.len(),
                fields.len()
            )));
        }

        let canvas = self.projections.canvas();
        let gains = if self.cfg.exposure_compensation {
            overlap_gains(&self.projections, &self.pairs, &set.frames)
        } else {
            vec![[1.0; 3]; set.len()]
        };

        let row_bytes = canvas.width as usize * 4;
        let mut data = vec![0u8; canvas.rgba_len()];
        data.par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                let mut samples = Vec::with_capacity(set.len());
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let p = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                    samples.clear();
                    for (s, field) in fields.iter().enumerate() {
                        let (dx, dy) = field.displacement_at(p);
                        let q = canvas.wrap_clamp(Point::new(p.x + f64::from(dx), p.y + f64::from(dy)));
                        samples.push(self.projections.map(s).lookup(q));
                    }
                    let rgb = self.blend_pixel(set, &samples, &gains);
                    px[0] = to_u8(rgb[0]);
                    px[1] = to_u8(rgb[1]);
                    px[2] = to_u8(rgb[2]);
                    px[3] = 255;
                }
            });

        Ok(PanoramicFrame {
            seq: set.seq,
            pts: set.pts,
            width: canvas.width,
            height: canvas.height,
            data,
        })
    }

    fn blend_pixel(
        &self,
        set: &SynchronizedFrameSet,
        samples: &[LensSample],
        gains: &[[f32; 3]],
    ) -> [f32; 3] {
        let nearest = nearest(samples);
        if self.cfg.blend {
            let mut acc = [0.0f32; 3];
            let mut total = 0.0f32;
            for (s, sample) in samples.iter().enumerate() {
                if !self.projections.map(s).covers(*sample) {
                    continue;
                }
                let w = smoothstep((1.0 - sample.rho) / self.cfg.blend_band);
                if w <= 0.0 {
                    continue;
                }
                let c = self.sample(set, s, *sample, gains);
                for (a, v) in acc.iter_mut().zip(c) {
                    *a += w * v;
                }
                total += w;
            }
            if total > 0.0 {
                return acc.map(|v| v / total);
            }
        }
        let map = self.projections.map(nearest);
        self.sample(set, nearest, map.clamp_to_circle(samples[nearest]), gains)
    }

    fn sample(
        &self,
        set: &SynchronizedFrameSet,
        s: usize,
        at: LensSample,
        gains: &[[f32; 3]],
    ) -> [f32; 3] {
        let f = &set.frames[s];
        let [r, g, b, _] = sample_rgba8_bilinear(&f.data, f.width, f.height, at.x, at.y);
        let k = gains[s];
        [r * k[0], g * k[1], b * k[2]]
    }
}

/// Lens with the smallest normalized radius, lowest index on ties.
fn nearest(samples: &[LensSample]) -> usize {
    let mut best = 0;
    for (i, s) in samples.iter().enumerate().skip(1) {
        if s.rho < samples[best].rho {
            best = i;
        }
    }
    best
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/fusion/engine.rs"]
mod tests;
