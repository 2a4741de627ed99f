use std::sync::Arc;

use rayon::prelude::*;

use crate::align::field::FieldSet;
use crate::align::model::{AiFlowModel, FEATURES};
use crate::align::overlap::{
    MatchParams, NodeMatch, OverlapPair, ProjectedView, check_set, contrast, distribute,
    overlap_pairs, regularize_vertical,
};
use crate::align::strategy::{AlignmentStrategy, identity_fields};
use crate::foundation::core::Point;
use crate::foundation::error::StitchResult;
use crate::geometry::projection::ProjectionSet;
use crate::job::model::StreamLocator;
use crate::sync::frame_set::SynchronizedFrameSet;

/// Per-node confidence above which a node's displacement is trusted.
const NODE_ACCEPT: f32 = 0.5;

/// Trained-model inference over the overlap band.
pub struct AiFlow {
    projections: Arc<ProjectionSet>,
    model: Arc<AiFlowModel>,
    pairs: Vec<OverlapPair>,
    params: MatchParams,
    /// Static residual per stream, in canvas pixels at each node.
    residuals: Vec<Option<(Vec<f32>, Vec<f32>)>>,
    scale: f32,
}

impl AiFlow {
    /// Strategy over `projections`; `inputs` maps streams to lens positions for residual lookup.
    pub fn new(
        projections: Arc<ProjectionSet>,
        model: Arc<AiFlowModel>,
        inputs: &[StreamLocator],
        stride: u32,
    ) -> Self {
        let grid = *projections.grid();
        let canvas = grid.canvas;
        let residuals = (0..projections.len())
            .map(|i| {
                let residual = model.residual_for(inputs.get(i)?.position)?;
                let (w, h) = (f64::from(canvas.width), f64::from(canvas.height));
                let (dx, dy) = (0..grid.len())
                    .map(|idx| {
                        let (col, row) = grid.col_row(idx);
                        let p = grid.node_pos(col, row);
                        let (u, v) = residual.sample(p.x / w, p.y / h);
                        (u * w as f32, v * h as f32)
                    })
                    .unzip();
                Some((dx, dy))
            })
            .collect();
        let scale = canvas.width as f32 / model.reference_width as f32;
        let mut params = MatchParams::for_stride(stride);
        params.min_contrast = model.min_contrast;

        Self {
            pairs: overlap_pairs(&projections),
            projections,
            model,
            params,
            residuals,
            scale,
        }
    }

    fn infer_node(&self, a: &ProjectedView<'_>, b: &ProjectedView<'_>, p: Point) -> (NodeMatch, f32) {
        let step = self.params.patch_step;
        let mut values = [0.0f32; 9];
        for (k, v) in values.iter_mut().enumerate() {
            let i = (k % 3) as f64 - 1.0;
            let j = (k / 3) as f64 - 1.0;
            *v = a.gray(Point::new(p.x + i * step, p.y + j * step));
        }
        let textured = contrast(&values) >= self.params.min_contrast;

        let h = self.params.search_step;
        let (gxa, gya) = a.gradient(p, h);
        let (gxb, gyb) = b.gradient(p, h);
        let x: [f32; FEATURES] = [
            (a.gray(p) - b.gray(p)) / 255.0,
            gxa / 255.0,
            gya / 255.0,
            gxb / 255.0,
            gyb / 255.0,
        ];
        let out = self.model.infer(&x);
        let max_d = self.model.max_displacement_px * self.scale;
        let m = NodeMatch {
            d: (out.d.0 * max_d, out.d.1 * max_d),
            textured,
            good: textured && out.confidence >= NODE_ACCEPT,
        };
        (m, out.confidence)
    }
}

impl AlignmentStrategy for AiFlow {
    fn name(&self) -> &'static str {
        "ai_flow"
    }

    fn compute_fields(&self, set: &SynchronizedFrameSet) -> StitchResult<FieldSet> {
        check_set(set, &self.projections)?;
        let grid = self.projections.grid();
        let canvas = grid.canvas;
        let mut fields = identity_fields(&self.projections, set.seq);

        for pair in &self.pairs {
            let va = ProjectedView::new(canvas, self.projections.map(pair.a), &set.frames[pair.a]);
            let vb = ProjectedView::new(canvas, self.projections.map(pair.b), &set.frames[pair.b]);
            let results: Vec<(NodeMatch, f32)> = pair
                .nodes
                .par_iter()
                .map(|&idx| {
                    let (col, row) = grid.col_row(idx);
                    self.infer_node(&va, &vb, grid.node_pos(col, row))
                })
                .collect();

            let textured: Vec<f32> = results
                .iter()
                .filter(|(m, _)| m.textured)
                .map(|(_, c)| *c)
                .collect();
            let confidence = if textured.len() < self.params.min_textured.max(1) {
                1.0
            } else {
                textured.iter().sum::<f32>() / textured.len() as f32
            };

            let matches: Vec<NodeMatch> = results.into_iter().map(|(m, _)| m).collect();
            let disp = regularize_vertical(grid, pair, &matches);
            distribute(grid, pair, &disp, self.params.taper_cols, &mut fields);
            for s in [pair.a, pair.b] {
                fields[s].confidence = fields[s].confidence.min(confidence);
            }
        }

        for (field, residual) in fields.iter_mut().zip(&self.residuals) {
            if let Some((rx, ry)) = residual {
                for (d, r) in field.dx.iter_mut().zip(rx) {
                    *d += r;
                }
                for (d, r) in field.dy.iter_mut().zip(ry) {
                    *d += r;
                }
            }
            field.sync_wrap_column();
        }
        Ok(fields)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/align/ai_flow.rs"]
mod tests;
