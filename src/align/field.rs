use smallvec::SmallVec;

use crate::foundation::core::{Point, StreamId};
use crate::geometry::grid::FieldGrid;

/// Per-stream warp correction: a canvas-space displacement at every grid node.
///
/// Fusion samples stream `s` at canvas position `p + field.displacement_at(p)` instead of `p`. The
/// static lens projection is applied on top of this, so a zero field reproduces the calibrated
/// template.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignmentField {
    /// Stream the field warps.
    pub stream: StreamId,
    /// Frame set the field was computed for.
    pub seq: u64,
    /// Node grid.
    pub grid: FieldGrid,
    /// Horizontal displacement per node, canvas pixels.
    pub dx: Vec<f32>,
    /// Vertical displacement per node, canvas pixels.
    pub dy: Vec<f32>,
    /// Correspondence confidence in `[0, 1]`.
    pub confidence: f32,
}

/// One field per stream, in stream order.
pub type FieldSet = SmallVec<[AlignmentField; 2]>;

impl AlignmentField {
    /// Identity field with full confidence.
    pub fn zero(stream: StreamId, seq: u64, grid: FieldGrid) -> Self {
        Self {
            stream,
            seq,
            grid,
            dx: vec![0.0; grid.len()],
            dy: vec![0.0; grid.len()],
            confidence: 1.0,
        }
    }

    /// Interpolated displacement at canvas position `p`.
    pub fn displacement_at(&self, p: Point) -> (f32, f32) {
        let tap = self.grid.tap(p);
        (tap.apply(&self.dx), tap.apply(&self.dy))
    }

    /// `true` if every node is exactly zero.
    pub fn is_identity(&self) -> bool {
        self.dx.iter().chain(&self.dy).all(|v| *v == 0.0)
    }

    /// Copy the wrap column from column 0 so interpolation across the longitude seam is continuous.
    pub(crate) fn sync_wrap_column(&mut self) {
        let last = self.grid.cols - 1;
        for row in 0..self.grid.rows {
            let first = self.grid.index(0, row);
            let dup = self.grid.index(last, row);
            self.dx[dup] = self.dx[first];
            self.dy[dup] = self.dy[first];
        }
    }

    /// Content fingerprint (bit-exact over nodes and confidence).
    pub fn fingerprint(&self) -> u64 {
        let mut bytes = Vec::with_capacity((self.dx.len() + self.dy.len() + 1) * 4 + 2);
        bytes.extend_from_slice(&self.stream.0.to_le_bytes());
        for v in self.dx.iter().chain(&self.dy) {
            bytes.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        bytes.extend_from_slice(&self.confidence.to_bits().to_le_bytes());
        xxhash_rust::xxh3::xxh3_64(&bytes)
    }
}

/// Lowest confidence in `fields`, with the stream that has it.
pub fn weakest(fields: &[AlignmentField]) -> Option<(StreamId, f32)> {
    fields
        .iter()
        .map(|f| (f.stream, f.confidence))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Fingerprint of a whole field set.
pub fn fingerprint_set(fields: &[AlignmentField]) -> u64 {
    let mut bytes = Vec::with_capacity(fields.len() * 8);
    for f in fields {
        bytes.extend_from_slice(&f.fingerprint().to_le_bytes());
    }
    xxhash_rust::xxh3::xxh3_64(&bytes)
}
