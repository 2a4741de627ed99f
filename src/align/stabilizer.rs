use std::sync::Arc;

use crate::align::direction_lock::{DirectionLock, RotationCorrection};
use crate::align::field::{FieldSet, weakest};
use crate::align::strategy::identity_fields;
use crate::foundation::core::StreamId;
use crate::foundation::diagnostics::Diagnostics;
use crate::foundation::error::{StitchError, StitchResult};
use crate::geometry::projection::ProjectionSet;
use crate::job::model::StitchJob;
use crate::sync::frame_set::SynchronizedFrameSet;

/// Temporal policy applied to computed fields, in frame-set order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilizerConfig {
    /// Fields below this confidence are replaced by the last good ones.
    pub confidence_threshold: f32,
    /// Consecutive replacements tolerated before the job aborts.
    pub max_consecutive_fallbacks: u32,
    /// Previous-field weight of the flow-state filter; `None` disables it.
    pub flow_state: Option<f32>,
    /// Compensate rig rotation against the first frame set.
    pub direction_lock: bool,
}

impl StabilizerConfig {
    /// Policy from the job's feature toggles and tuning.
    pub fn from_job(job: &StitchJob) -> Self {
        let strength = job.tuning.flow_state_strength;
        Self {
            confidence_threshold: job.tuning.alignment_confidence_threshold,
            max_consecutive_fallbacks: job.tuning.max_consecutive_alignment_fallbacks,
            flow_state: (job.features.flow_state && strength > 0.0).then_some(strength),
            direction_lock: job.features.direction_lock,
        }
    }
}

/// Sequential post-processing of alignment results.
///
/// Must see frame sets in sequence order: it owns the hold-last state, the flow-state history and
/// the direction-lock reference. Hold-last starts out holding the static template so a failure on
/// the very first set still has something to fall back to.
pub struct FieldStabilizer {
    cfg: StabilizerConfig,
    projections: Arc<ProjectionSet>,
    last_good: FieldSet,
    has_history: bool,
    consecutive_fallbacks: u32,
    lock: Option<DirectionLock>,
    diagnostics: Arc<Diagnostics>,
}

impl FieldStabilizer {
    /// Stabilizer over `projections`.
    pub fn new(
        cfg: StabilizerConfig,
        projections: Arc<ProjectionSet>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let lock = cfg
            .direction_lock
            .then(|| DirectionLock::new(projections.canvas()));
        Self {
            last_good: identity_fields(&projections, 0),
            cfg,
            projections,
            has_history: false,
            consecutive_fallbacks: 0,
            lock,
            diagnostics,
        }
    }

    /// Current run of consecutive fallbacks.
    pub fn consecutive_fallbacks(&self) -> u32 {
        self.consecutive_fallbacks
    }

    /// Final fields for `set` given the strategy's result for it.
    ///
    /// Low confidence and frame-level errors fall back to the last good fields; any other error
    /// is returned. Exceeding the fallback ceiling is [`StitchError::StreamAborted`] for the
    /// weakest stream.
    pub fn stabilize(
        &mut self,
        set: &SynchronizedFrameSet,
        computed: StitchResult<FieldSet>,
    ) -> StitchResult<FieldSet> {
        let accepted = match computed {
            Ok(fields) => match weakest(&fields) {
                Some((stream, confidence)) if confidence < self.cfg.confidence_threshold => {
                    Err((
                        stream,
                        StitchError::alignment(
                            set.seq,
                            confidence,
                            format!(
                                "stream {stream} below threshold {:.2}",
                                self.cfg.confidence_threshold
                            ),
                        ),
                    ))
                }
                _ => Ok(fields),
            },
            Err(e) if e.is_frame_level() => Err((StreamId(0), e)),
            Err(e) => return Err(e),
        };

        let mut fields = match accepted {
            Ok(mut fields) => {
                self.consecutive_fallbacks = 0;
                if let Some(strength) = self.cfg.flow_state
                    && self.has_history
                {
                    blend_toward(&mut fields, &self.last_good, strength);
                }
                self.last_good = fields.clone();
                self.has_history = true;
                fields
            }
            Err((stream, failure)) => {
                self.consecutive_fallbacks += 1;
                self.diagnostics.record_alignment_fallback();
                tracing::warn!(
                    seq = set.seq,
                    consecutive = self.consecutive_fallbacks,
                    error = %failure,
                    "holding last good alignment"
                );
                if self.consecutive_fallbacks > self.cfg.max_consecutive_fallbacks {
                    return Err(StitchError::stream_aborted(
                        stream,
                        format!(
                            "alignment fell back on {} consecutive frame sets (last: {failure})",
                            self.consecutive_fallbacks
                        ),
                    ));
                }
                self.last_good.clone()
            }
        };

        if let Some(lock) = &mut self.lock {
            let correction = lock.correction(set, &self.projections);
            if correction != RotationCorrection::NONE {
                apply_rotation(&mut fields, &self.projections, correction);
            }
        }
        for f in &mut fields {
            f.seq = set.seq;
        }
        Ok(fields)
    }
}

/// `field = strength * previous + (1 - strength) * field`, node by node.
pub(crate) fn blend_toward(fields: &mut FieldSet, previous: &FieldSet, strength: f32) {
    for (cur, prev) in fields.iter_mut().zip(previous) {
        for (c, p) in cur.dx.iter_mut().zip(&prev.dx) {
            *c = strength * p + (1.0 - strength) * *c;
        }
        for (c, p) in cur.dy.iter_mut().zip(&prev.dy) {
            *c = strength * p + (1.0 - strength) * *c;
        }
    }
}

fn apply_rotation(fields: &mut FieldSet, projections: &ProjectionSet, c: RotationCorrection) {
    let grid = projections.grid();
    let offsets: Vec<(f32, f32)> = (0..grid.len())
        .map(|idx| {
            let (col, row) = grid.col_row(idx);
            c.displacement_at(grid.canvas, grid.node_pos(col, row))
        })
        .collect();
    for f in fields.iter_mut() {
        for (idx, (dx, dy)) in offsets.iter().enumerate() {
            f.dx[idx] += dx;
            f.dy[idx] += dy;
        }
        f.sync_wrap_column();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/align/stabilizer.rs"]
mod tests;
