use crate::foundation::core::{Canvas, Point};
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::GridTap;

/// Regular node grid laid over the canvas.
///
/// Nodes span the full canvas in continuous coordinates: column 0 sits at `x = 0` and the last
/// column at `x = width`, which is the same longitude, so the grid is periodic in x. Rows run from
/// the north pole (`y = 0`) to the south pole (`y = height`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldGrid {
    /// Canvas the grid covers.
    pub canvas: Canvas,
    /// Node columns (including the duplicated wrap column).
    pub cols: usize,
    /// Node rows.
    pub rows: usize,
}

impl FieldGrid {
    /// Grid with nodes at most `stride` canvas pixels apart.
    pub fn new(canvas: Canvas, stride: u32) -> StitchResult<Self> {
        if stride == 0 {
            return Err(StitchError::configuration("field stride must be >= 1"));
        }
        if canvas.width == 0 || canvas.height == 0 {
            return Err(StitchError::configuration("canvas must be non-empty"));
        }
        let cols = canvas.width.div_ceil(stride).max(2) as usize + 1;
        let rows = canvas.height.div_ceil(stride).max(1) as usize + 1;
        Ok(Self { canvas, cols, rows })
    }

    /// Total node count.
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    /// Always `false`; grids have at least 3x2 nodes.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Horizontal node spacing in canvas pixels.
    pub fn step_x(&self) -> f64 {
        f64::from(self.canvas.width) / (self.cols - 1) as f64
    }

    /// Vertical node spacing in canvas pixels.
    pub fn step_y(&self) -> f64 {
        f64::from(self.canvas.height) / (self.rows - 1) as f64
    }

    /// Flat index of node `(col, row)`.
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }

    /// `(col, row)` of a flat index.
    pub fn col_row(&self, idx: usize) -> (usize, usize) {
        (idx % self.cols, idx / self.cols)
    }

    /// Canvas position of node `(col, row)`.
    pub fn node_pos(&self, col: usize, row: usize) -> Point {
        Point::new(col as f64 * self.step_x(), row as f64 * self.step_y())
    }

    /// Bilinear tap for a continuous canvas position (x wraps, y clamps).
    pub(crate) fn tap(&self, p: Point) -> GridTap {
        let gx = (p.x / self.step_x()) as f32;
        let gy = (p.y / self.step_y()) as f32;
        GridTap::new(self.cols, self.rows, gx, gy, true)
    }

    /// Columns `col + delta` with longitude wraparound (the duplicate last column is skipped).
    pub fn wrap_col(&self, col: usize, delta: isize) -> usize {
        let period = (self.cols - 1) as isize;
        (col as isize + delta).rem_euclid(period) as usize
    }
}
