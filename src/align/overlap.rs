use rayon::prelude::*;

use crate::align::field::AlignmentField;
use crate::foundation::core::{Canvas, Point};
use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::{luma, parabola_vertex, sample_rgba8_bilinear};
use crate::geometry::grid::FieldGrid;
use crate::geometry::projection::{ProjectionMap, ProjectionSet};
use crate::source::RawFrame;
use crate::sync::frame_set::SynchronizedFrameSet;

/// Two lenses and the grid nodes both of them see.
#[derive(Clone, Debug)]
pub(crate) struct OverlapPair {
    pub(crate) a: usize,
    pub(crate) b: usize,
    pub(crate) nodes: Vec<usize>,
}

/// Every lens pair with a non-empty overlap, lower stream first.
pub(crate) fn overlap_pairs(projections: &ProjectionSet) -> Vec<OverlapPair> {
    let grid = projections.grid();
    let mut pairs = Vec::new();
    for a in 0..projections.len() {
        for b in a + 1..projections.len() {
            let (ma, mb) = (projections.map(a), projections.map(b));
            let nodes: Vec<usize> = (0..grid.len())
                .filter(|&i| grid.col_row(i).0 < grid.cols - 1)
                .filter(|&i| ma.covers(ma.node(i)) && mb.covers(mb.node(i)))
                .collect();
            if !nodes.is_empty() {
                pairs.push(OverlapPair { a, b, nodes });
            }
        }
    }
    pairs
}

/// Reject frame sets that do not fit the projection maps.
pub(crate) fn check_set(set: &SynchronizedFrameSet, projections: &ProjectionSet) -> StitchResult<()> {
    if set.frames.len() != projections.len() {
        return Err(StitchError::configuration(format!(
            "frame set {} has {} frames, rig has {} lenses",
            set.seq,
            set.frames.len(),
            projections.len()
        )));
    }
    for (frame, map) in set.frames.iter().zip(projections.maps()) {
        if frame.width != map.source_width || frame.height != map.source_height {
            return Err(StitchError::configuration(format!(
                "stream {} frame is {}x{}, expected {}x{}",
                frame.stream, frame.width, frame.height, map.source_width, map.source_height
            )));
        }
    }
    Ok(())
}

/// Grayscale view of one lens frame in canvas coordinates.
#[derive(Clone, Copy)]
pub(crate) struct ProjectedView<'a> {
    canvas: Canvas,
    map: &'a ProjectionMap,
    frame: &'a RawFrame,
}

impl<'a> ProjectedView<'a> {
    pub(crate) fn new(canvas: Canvas, map: &'a ProjectionMap, frame: &'a RawFrame) -> Self {
        Self { canvas, map, frame }
    }

    /// Luma at canvas position `p`.
    pub(crate) fn gray(&self, p: Point) -> f32 {
        let s = self.map.lookup(self.canvas.wrap_clamp(p));
        let [r, g, b, _] =
            sample_rgba8_bilinear(&self.frame.data, self.frame.width, self.frame.height, s.x, s.y);
        luma(r, g, b)
    }

    /// Central-difference gradient at `p` with spacing `h` canvas pixels.
    pub(crate) fn gradient(&self, p: Point, h: f64) -> (f32, f32) {
        let gx = self.gray(Point::new(p.x + h, p.y)) - self.gray(Point::new(p.x - h, p.y));
        let gy = self.gray(Point::new(p.x, p.y + h)) - self.gray(Point::new(p.x, p.y - h));
        (gx * 0.5, gy * 0.5)
    }
}

/// Outcome of matching one overlap node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct NodeMatch {
    /// `B(p + d) ~ A(p)`, canvas pixels.
    pub(crate) d: (f32, f32),
    /// The node has enough contrast to be matched at all.
    pub(crate) textured: bool,
    /// The match passed the quality checks.
    pub(crate) good: bool,
}

/// Fraction of textured nodes that matched well; `1.0` when nothing was textured enough to judge.
pub(crate) fn match_confidence(matches: &[NodeMatch], min_textured: usize) -> f32 {
    let textured = matches.iter().filter(|m| m.textured).count();
    if textured < min_textured.max(1) {
        return 1.0;
    }
    let good = matches.iter().filter(|m| m.good).count();
    good as f32 / textured as f32
}

/// Average each good node with its good vertical neighbours; bad nodes borrow from neighbours.
pub(crate) fn regularize_vertical(
    grid: &FieldGrid,
    pair: &OverlapPair,
    matches: &[NodeMatch],
) -> Vec<(f32, f32)> {
    let mut dense: Vec<Option<(f32, f32)>> = vec![None; grid.len()];
    for (&idx, m) in pair.nodes.iter().zip(matches) {
        if m.good {
            dense[idx] = Some(m.d);
        }
    }
    pair.nodes
        .iter()
        .map(|&idx| {
            let (col, row) = grid.col_row(idx);
            let mut sum = (0.0f32, 0.0f32);
            let mut n = 0.0f32;
            let rows = [row.checked_sub(1), Some(row), Some(row + 1).filter(|r| *r < grid.rows)];
            for r in rows.into_iter().flatten() {
                if let Some(d) = dense[grid.index(col, r)] {
                    sum.0 += d.0;
                    sum.1 += d.1;
                    n += 1.0;
                }
            }
            if n > 0.0 {
                (sum.0 / n, sum.1 / n)
            } else {
                (0.0, 0.0)
            }
        })
        .collect()
}

/// Split pair displacements symmetrically into both fields and taper them into each lens interior.
///
/// Lens `a` is warped by `-d/2`, lens `b` by `+d/2`. Nodes outside the overlap within
/// `taper_cols` columns of it receive the nearest overlap value scaled down linearly with
/// distance.
pub(crate) fn distribute(
    grid: &FieldGrid,
    pair: &OverlapPair,
    disp: &[(f32, f32)],
    taper_cols: usize,
    fields: &mut [AlignmentField],
) {
    let mut in_overlap = vec![false; grid.len()];
    for &idx in &pair.nodes {
        in_overlap[idx] = true;
    }

    let mut spread: Vec<(f32, (f32, f32))> = vec![(0.0, (0.0, 0.0)); grid.len()];
    for (&idx, &d) in pair.nodes.iter().zip(disp) {
        spread[idx] = (1.0, d);
        let (col, row) = grid.col_row(idx);
        for k in 1..=taper_cols {
            let w = 1.0 - k as f32 / (taper_cols + 1) as f32;
            for delta in [-(k as isize), k as isize] {
                let t = grid.index(grid.wrap_col(col, delta), row);
                if !in_overlap[t] && w > spread[t].0 {
                    spread[t] = (w, (d.0 * w, d.1 * w));
                }
            }
        }
    }

    for (idx, &(w, (dx, dy))) in spread.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        fields[pair.a].dx[idx] -= dx * 0.5;
        fields[pair.a].dy[idx] -= dy * 0.5;
        fields[pair.b].dx[idx] += dx * 0.5;
        fields[pair.b].dy[idx] += dy * 0.5;
    }
}

/// Block matching parameters shared by the correspondence-based strategies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchParams {
    /// Candidate offsets per axis on each side of zero.
    pub search_radius: i32,
    /// Canvas pixels between candidate offsets.
    pub search_step: f64,
    /// Canvas pixels between patch samples (3x3 patch).
    pub patch_step: f64,
    /// Minimum mean absolute deviation of the patch for a node to count as textured.
    pub min_contrast: f32,
    /// Maximum mean absolute difference for an accepted match.
    pub max_cost: f32,
    /// Textured nodes needed before confidence is measured.
    pub min_textured: usize,
    /// Columns over which overlap corrections fade into the lens interior.
    pub taper_cols: usize,
}

impl MatchParams {
    /// Defaults scaled to the field stride.
    pub fn for_stride(stride: u32) -> Self {
        let stride = f64::from(stride.max(1));
        Self {
            search_radius: 3,
            search_step: (stride * 0.5).max(1.0),
            patch_step: stride,
            min_contrast: 4.0,
            max_cost: 12.0,
            min_textured: 8,
            taper_cols: 8,
        }
    }
}

fn patch(view: &ProjectedView<'_>, p: Point, step: f64, off: (f64, f64)) -> [f32; 9] {
    let mut out = [0.0f32; 9];
    for (k, v) in out.iter_mut().enumerate() {
        let i = (k % 3) as f64 - 1.0;
        let j = (k / 3) as f64 - 1.0;
        *v = view.gray(Point::new(p.x + i * step + off.0, p.y + j * step + off.1));
    }
    out
}

/// Mean absolute deviation of a patch from its mean.
pub(crate) fn contrast(values: &[f32; 9]) -> f32 {
    let mean = values.iter().sum::<f32>() / 9.0;
    values.iter().map(|v| (v - mean).abs()).sum::<f32>() / 9.0
}

/// Exhaustive SAD search for the offset of `b` that best reproduces `a`'s patch around `p`.
///
/// Ties prefer the candidate closest to zero; the winner is refined to sub-step precision with a
/// parabola through its neighbours.
pub(crate) fn block_match(
    a: &ProjectedView<'_>,
    b: &ProjectedView<'_>,
    p: Point,
    params: &MatchParams,
) -> NodeMatch {
    let reference = patch(a, p, params.patch_step, (0.0, 0.0));
    if contrast(&reference) < params.min_contrast {
        return NodeMatch::default();
    }

    let r = params.search_radius;
    let side = (2 * r + 1) as usize;
    let mut costs = vec![0.0f32; side * side];
    let mut best = (0i32, 0i32);
    let mut best_cost = f32::INFINITY;
    for cy in -r..=r {
        for cx in -r..=r {
            let off = (f64::from(cx) * params.search_step, f64::from(cy) * params.search_step);
            let cand = patch(b, p, params.patch_step, off);
            let cost = reference
                .iter()
                .zip(&cand)
                .map(|(x, y)| (x - y).abs())
                .sum::<f32>()
                / 9.0;
            costs[(cy + r) as usize * side + (cx + r) as usize] = cost;
            let closer = cx.abs() + cy.abs() < best.0.abs() + best.1.abs();
            if cost < best_cost || (cost == best_cost && closer) {
                best_cost = cost;
                best = (cx, cy);
            }
        }
    }

    let at = |x: i32, y: i32| costs[(y + r) as usize * side + (x + r) as usize];
    let (bx, by) = best;
    let sub_x = if bx.abs() < r {
        parabola_vertex(at(bx - 1, by), best_cost, at(bx + 1, by))
    } else {
        0.0
    };
    let sub_y = if by.abs() < r {
        parabola_vertex(at(bx, by - 1), best_cost, at(bx, by + 1))
    } else {
        0.0
    };

    let step = params.search_step as f32;
    NodeMatch {
        d: ((bx as f32 + sub_x) * step, (by as f32 + sub_y) * step),
        textured: true,
        good: best_cost <= params.max_cost,
    }
}

/// Match every node of `pair` in parallel.
pub(crate) fn match_pair(
    grid: &FieldGrid,
    pair: &OverlapPair,
    a: &ProjectedView<'_>,
    b: &ProjectedView<'_>,
    params: &MatchParams,
) -> Vec<NodeMatch> {
    pair.nodes
        .par_iter()
        .map(|&idx| {
            let (col, row) = grid.col_row(idx);
            block_match(a, b, grid.node_pos(col, row), params)
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/align/overlap.rs"]
mod tests;
