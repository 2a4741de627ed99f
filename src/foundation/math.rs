/// Hermite smoothstep of `t` clamped to `[0, 1]`.
pub(crate) fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Vertex offset of the parabola through `(-1, left) (0, center) (1, right)`.
///
/// Used for sub-sample refinement of a discrete minimum. Returns 0 for degenerate (flat or
/// concave) neighbourhoods; the result is always within `[-0.5, 0.5]`.
pub(crate) fn parabola_vertex(left: f32, center: f32, right: f32) -> f32 {
    let denom = left - 2.0 * center + right;
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

/// Rec.601 luma of an RGB triple, in 0..255 units.
pub(crate) fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Bilinear weights and corner indices for sampling a `cols x rows` grid at fractional `(gx, gy)`.
///
/// Coordinates are clamped to the grid; `wrap_x` makes the x axis periodic with period `cols - 1`
/// (the last column duplicates the first, as on an equirectangular longitude seam).
#[derive(Clone, Copy, Debug)]
pub(crate) struct GridTap {
    pub(crate) i00: usize,
    pub(crate) i10: usize,
    pub(crate) i01: usize,
    pub(crate) i11: usize,
    pub(crate) fx: f32,
    pub(crate) fy: f32,
}

impl GridTap {
    pub(crate) fn new(cols: usize, rows: usize, gx: f32, gy: f32, wrap_x: bool) -> Self {
        let max_x = (cols - 1) as f32;
        let max_y = (rows - 1) as f32;
        let gx = if wrap_x && max_x > 0.0 {
            gx.rem_euclid(max_x)
        } else {
            gx.clamp(0.0, max_x)
        };
        let gy = gy.clamp(0.0, max_y);

        let x0 = (gx.floor() as usize).min(cols - 1);
        let y0 = (gy.floor() as usize).min(rows - 1);
        let x1 = (x0 + 1).min(cols - 1);
        let y1 = (y0 + 1).min(rows - 1);

        Self {
            i00: y0 * cols + x0,
            i10: y0 * cols + x1,
            i01: y1 * cols + x0,
            i11: y1 * cols + x1,
            fx: gx - x0 as f32,
            fy: gy - y0 as f32,
        }
    }

    pub(crate) fn apply(&self, values: &[f32]) -> f32 {
        let top = values[self.i00] + (values[self.i10] - values[self.i00]) * self.fx;
        let bottom = values[self.i01] + (values[self.i11] - values[self.i01]) * self.fx;
        top + (bottom - top) * self.fy
    }
}

/// Bilinear sample of one channel from a tightly packed RGBA8 image, clamped at the borders.
pub(crate) fn sample_rgba8_bilinear(
    data: &[u8],
    width: u32,
    height: u32,
    x: f32,
    y: f32,
) -> [f32; 4] {
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let stride = width as usize * 4;
    let at = |px: u32, py: u32| py as usize * stride + px as usize * 4;
    let (a, b, c, d) = (at(x0, y0), at(x1, y0), at(x0, y1), at(x1, y1));

    let mut out = [0f32; 4];
    for (ch, o) in out.iter_mut().enumerate() {
        let top = f32::from(data[a + ch]) + (f32::from(data[b + ch]) - f32::from(data[a + ch])) * fx;
        let bot = f32::from(data[c + ch]) + (f32::from(data[d + ch]) - f32::from(data[c + ch])) * fx;
        *o = top + (bot - top) * fy;
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
