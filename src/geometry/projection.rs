use rayon::prelude::*;

use crate::foundation::core::{Canvas, Point, StreamId};
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::{luma, sample_rgba8_bilinear};
use crate::geometry::grid::FieldGrid;
use crate::geometry::lens::{AccessoryProfile, LensGeometry, RigGeometry};
use crate::source::RawFrame;

/// Where a canvas position lands inside one lens image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LensSample {
    /// Source pixel x (pixel centres at integers).
    pub x: f32,
    /// Source pixel y.
    pub y: f32,
    /// Angle from the optical axis normalized by half the usable field of view.
    ///
    /// `rho <= 1` is inside the image circle; `rho` near 1 is the lens rim.
    pub rho: f32,
}

/// Static canvas → lens-image map for one stream, stored at [`FieldGrid`] nodes.
///
/// Positions between nodes are interpolated bilinearly; the equidistant fisheye model is smooth
/// enough that a 16 px stride is visually exact at 8K.
#[derive(Clone, Debug)]
pub struct ProjectionMap {
    /// Stream this map belongs to.
    pub stream: StreamId,
    /// Source frame width the map was built for.
    pub source_width: u32,
    /// Source frame height the map was built for.
    pub source_height: u32,
    grid: FieldGrid,
    center: (f32, f32),
    sx: Vec<f32>,
    sy: Vec<f32>,
    rho: Vec<f32>,
}

impl ProjectionMap {
    /// Precompute the map for `lens` at every node of `grid`.
    pub fn build(
        stream: StreamId,
        grid: FieldGrid,
        lens: &LensGeometry,
        accessory: AccessoryProfile,
        source_width: u32,
        source_height: u32,
    ) -> StitchResult<Self> {
        if source_width == 0 || source_height == 0 {
            return Err(StitchError::configuration(format!(
                "stream {stream}: source frames must be non-empty"
            )));
        }
        let half_fov = ((lens.fov_deg - accessory.fov_trim_deg) * 0.5).to_radians();
        if half_fov.is_nan() || half_fov <= 0.0 {
            return Err(StitchError::configuration(format!(
                "stream {stream}: usable field of view must be positive"
            )));
        }

        let rot = lens.world_to_lens();
        let w = f64::from(source_width);
        let h = f64::from(source_height);
        let radius_px = lens.radius * w.min(h) * 0.5 * accessory.radial_scale;
        let cx = lens.center_x * w - 0.5;
        let cy = lens.center_y * h - 0.5;
        let canvas = grid.canvas;

        let samples: Vec<LensSample> = (0..grid.len())
            .into_par_iter()
            .map(|idx| {
                let (col, row) = grid.col_row(idx);
                let p = grid.node_pos(col, row);
                let lon = canvas.longitude(p.x);
                let lat = canvas.latitude(p.y);
                let dir = [lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos()];
                let [lx, ly, lz] = rot.apply(dir);

                let theta = lz.clamp(-1.0, 1.0).acos();
                let rho = theta / half_fov;
                let r = rho * radius_px;
                let alpha = ly.atan2(lx);
                LensSample {
                    x: (cx + r * alpha.cos()) as f32,
                    y: (cy - r * alpha.sin()) as f32,
                    rho: rho as f32,
                }
            })
            .collect();

        Ok(Self {
            stream,
            source_width,
            source_height,
            grid,
            center: (cx as f32, cy as f32),
            sx: samples.iter().map(|s| s.x).collect(),
            sy: samples.iter().map(|s| s.y).collect(),
            rho: samples.iter().map(|s| s.rho).collect(),
        })
    }

    /// Grid the map is stored on.
    pub fn grid(&self) -> &FieldGrid {
        &self.grid
    }

    /// Interpolated sample at canvas position `p`.
    pub fn lookup(&self, p: Point) -> LensSample {
        let tap = self.grid.tap(p);
        LensSample {
            x: tap.apply(&self.sx),
            y: tap.apply(&self.sy),
            rho: tap.apply(&self.rho),
        }
    }

    /// Exact sample at node `idx`.
    pub fn node(&self, idx: usize) -> LensSample {
        LensSample {
            x: self.sx[idx],
            y: self.sy[idx],
            rho: self.rho[idx],
        }
    }

    /// `true` when `s` is inside the image circle and the frame.
    pub fn covers(&self, s: LensSample) -> bool {
        let max_x = self.source_width as f32 - 0.5;
        let max_y = self.source_height as f32 - 0.5;
        s.rho <= 1.0 && s.x >= -0.5 && s.x <= max_x && s.y >= -0.5 && s.y <= max_y
    }

    /// Pull a sample outside the image circle back onto the rim along its radius.
    pub fn clamp_to_circle(&self, s: LensSample) -> LensSample {
        if s.rho <= 1.0 || !s.rho.is_finite() {
            return s;
        }
        let (cx, cy) = self.center;
        LensSample {
            x: cx + (s.x - cx) / s.rho,
            y: cy + (s.y - cy) / s.rho,
            rho: 1.0,
        }
    }
}

/// Projection maps for every stream of a rig, on one shared grid.
#[derive(Clone, Debug)]
pub struct ProjectionSet {
    grid: FieldGrid,
    maps: Vec<ProjectionMap>,
}

impl ProjectionSet {
    /// Build maps for `rig`; `sources[i]` is the frame size of stream `i`.
    #[tracing::instrument(skip(rig, sources), fields(lenses = rig.len()))]
    pub fn build(
        canvas: Canvas,
        stride: u32,
        rig: &RigGeometry,
        accessory: AccessoryProfile,
        sources: &[(u32, u32)],
    ) -> StitchResult<Self> {
        if rig.len() != sources.len() {
            return Err(StitchError::configuration(format!(
                "rig has {} lenses but {} streams were opened",
                rig.len(),
                sources.len()
            )));
        }
        let grid = FieldGrid::new(canvas, stride)?;
        let maps = rig
            .lenses
            .iter()
            .zip(sources)
            .enumerate()
            .map(|(i, (lens, &(w, h)))| {
                let stream = StreamId(i as u16);
                ProjectionMap::build(stream, grid, lens, accessory, w, h)
            })
            .collect::<StitchResult<Vec<_>>>()?;
        Ok(Self { grid, maps })
    }

    /// Shared grid.
    pub fn grid(&self) -> &FieldGrid {
        &self.grid
    }

    /// Canvas the maps cover.
    pub fn canvas(&self) -> Canvas {
        self.grid.canvas
    }

    /// All maps, in stream order.
    pub fn maps(&self) -> &[ProjectionMap] {
        &self.maps
    }

    /// Map of stream `idx`.
    pub fn map(&self, idx: usize) -> &ProjectionMap {
        &self.maps[idx]
    }

    /// Number of lenses.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// `true` with no lenses.
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Stream whose optical axis is closest to canvas position `p` (lowest index on ties).
    pub fn nearest_lens(&self, p: Point) -> usize {
        let mut best = 0;
        let mut best_rho = f32::INFINITY;
        for (i, map) in self.maps.iter().enumerate() {
            let rho = map.lookup(p).rho;
            if rho < best_rho {
                best = i;
                best_rho = rho;
            }
        }
        best
    }

    /// Grayscale `tw x th` equirectangular thumbnail of a frame set, nearest lens per pixel.
    pub fn render_gray_thumbnail(&self, frames: &[RawFrame], tw: usize, th: usize) -> Vec<f32> {
        let canvas = self.canvas();
        let sx = f64::from(canvas.width) / tw as f64;
        let sy = f64::from(canvas.height) / th as f64;
        let mut out = vec![0.0f32; tw * th];
        for (ty, row) in out.chunks_mut(tw).enumerate() {
            for (tx, v) in row.iter_mut().enumerate() {
                let p = Point::new((tx as f64 + 0.5) * sx, (ty as f64 + 0.5) * sy);
                let lens = self.nearest_lens(p);
                let s = self.maps[lens].lookup(p);
                let f = &frames[lens];
                let [r, g, b, _] = sample_rgba8_bilinear(&f.data, f.width, f.height, s.x, s.y);
                *v = luma(r, g, b);
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/projection.rs"]
mod tests;
