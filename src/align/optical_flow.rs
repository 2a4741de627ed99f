use std::sync::Arc;

use crate::align::field::FieldSet;
use crate::align::overlap::{
    MatchParams, OverlapPair, ProjectedView, check_set, distribute, match_confidence, match_pair,
    overlap_pairs, regularize_vertical,
};
use crate::align::strategy::{AlignmentStrategy, identity_fields};
use crate::foundation::error::StitchResult;
use crate::geometry::projection::ProjectionSet;
use crate::sync::frame_set::SynchronizedFrameSet;

/// Classical correspondence search in the overlap band.
///
/// Every overlap node is block-matched between the two lenses, smoothed along the seam, split
/// symmetrically between them and faded into each lens interior.
pub struct OpticalFlow {
    projections: Arc<ProjectionSet>,
    pairs: Vec<OverlapPair>,
    params: MatchParams,
}

impl OpticalFlow {
    /// Strategy over `projections` with defaults scaled to `stride`.
    pub fn new(projections: Arc<ProjectionSet>, stride: u32) -> Self {
        Self::with_params(projections, MatchParams::for_stride(stride))
    }

    /// Strategy with explicit matching parameters.
    pub fn with_params(projections: Arc<ProjectionSet>, params: MatchParams) -> Self {
        let pairs = overlap_pairs(&projections);
        tracing::debug!(
            pairs = pairs.len(),
            nodes = pairs.iter().map(|p| p.nodes.len()).sum::<usize>(),
            "optical flow overlap"
        );
        Self {
            projections,
            pairs,
            params,
        }
    }
}

impl AlignmentStrategy for OpticalFlow {
    fn name(&self) -> &'static str {
        "optical_flow"
    }

    fn compute_fields(&self, set: &SynchronizedFrameSet) -> StitchResult<FieldSet> {
        check_set(set, &self.projections)?;
        let grid = self.projections.grid();
        let canvas = grid.canvas;
        let mut fields = identity_fields(&self.projections, set.seq);

        for pair in &self.pairs {
            let va = ProjectedView::new(canvas, self.projections.map(pair.a), &set.frames[pair.a]);
            let vb = ProjectedView::new(canvas, self.projections.map(pair.b), &set.frames[pair.b]);
            let matches = match_pair(grid, pair, &va, &vb, &self.params);
            let confidence = match_confidence(&matches, self.params.min_textured);
            let disp = regularize_vertical(grid, pair, &matches);
            distribute(grid, pair, &disp, self.params.taper_cols, &mut fields);
            for s in [pair.a, pair.b] {
                fields[s].confidence = fields[s].confidence.min(confidence);
            }
        }

        for f in &mut fields {
            f.sync_wrap_column();
        }
        Ok(fields)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/align/optical_flow.rs"]
mod tests;
