use std::sync::Arc;

use crate::align::ai_flow::AiFlow;
use crate::align::field::{AlignmentField, FieldSet};
use crate::align::model::AiFlowModel;
use crate::align::optical_flow::OpticalFlow;
use crate::align::overlap::check_set;
use crate::foundation::core::StreamId;
use crate::foundation::error::{StitchError, StitchResult};
use crate::geometry::projection::ProjectionSet;
use crate::job::model::{StitchJob, StitchMode};
use crate::sync::frame_set::SynchronizedFrameSet;

/// Computes per-stream alignment fields for one frame set.
///
/// Implementations are pure with respect to the frame set (no state between calls), which lets
/// the pipeline run them concurrently across sets. Temporal behaviour lives in
/// [`FieldStabilizer`](crate::align::stabilizer::FieldStabilizer).
pub trait AlignmentStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Fields for `set`, one per stream, each carrying its correspondence confidence.
    fn compute_fields(&self, set: &SynchronizedFrameSet) -> StitchResult<FieldSet>;
}

/// Zero fields for every stream of `projections`.
pub fn identity_fields(projections: &ProjectionSet, seq: u64) -> FieldSet {
    (0..projections.len())
        .map(|i| AlignmentField::zero(StreamId(i as u16), seq, *projections.grid()))
        .collect()
}

/// Fixed warp from rig geometry and the accessory profile alone.
///
/// The geometry is already baked into the projection maps, so the field is the identity.
pub struct StaticTemplate {
    projections: Arc<ProjectionSet>,
}

impl StaticTemplate {
    /// Strategy over `projections`.
    pub fn new(projections: Arc<ProjectionSet>) -> Self {
        Self { projections }
    }
}

impl AlignmentStrategy for StaticTemplate {
    fn name(&self) -> &'static str {
        "static_template"
    }

    fn compute_fields(&self, set: &SynchronizedFrameSet) -> StitchResult<FieldSet> {
        check_set(set, &self.projections)?;
        Ok(identity_fields(&self.projections, set.seq))
    }
}

/// Strategy selected by `job.stitch_mode`. AI flow requires the loaded model.
pub fn build_strategy(
    job: &StitchJob,
    projections: Arc<ProjectionSet>,
    model: Option<Arc<AiFlowModel>>,
) -> StitchResult<Box<dyn AlignmentStrategy>> {
    let stride = job.tuning.field_stride;
    Ok(match job.stitch_mode {
        StitchMode::StaticTemplate => Box::new(StaticTemplate::new(projections)),
        StitchMode::OpticalFlow => Box::new(OpticalFlow::new(projections, stride)),
        StitchMode::AiFlow => {
            let model = model.ok_or_else(|| {
                StitchError::configuration("AI_FLOW stitch mode requires a loaded model")
            })?;
            Box::new(AiFlow::new(projections, model, &job.inputs, stride))
        }
    })
}

#[cfg(test)]
#[path = "../../tests/unit/align/strategy.rs"]
mod tests;
