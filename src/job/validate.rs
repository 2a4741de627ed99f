use std::collections::HashSet;

use crate::foundation::error::{StitchError, StitchResult};
use crate::job::model::{StitchJob, StitchMode, Tuning};

impl StitchJob {
    /// Synchronous checks run on entry to `Validating`, before any file is touched.
    ///
    /// Every failure is [`StitchError::Configuration`]. Whether the model file actually loads is
    /// checked later (it is I/O); here AI flow only needs a model reference at all.
    #[tracing::instrument(skip(self), fields(inputs = self.inputs.len()))]
    pub fn validate(&self) -> StitchResult<()> {
        if self.inputs.len() < 2 {
            return Err(StitchError::configuration(format!(
                "at least 2 inputs are required, got {}",
                self.inputs.len()
            )));
        }
        let rig = self.effective_rig();
        if rig.len() != self.inputs.len() {
            return Err(StitchError::configuration(format!(
                "rig describes {} lenses but the job has {} inputs",
                rig.len(),
                self.inputs.len()
            )));
        }
        if self.rig.is_none() {
            let mut seen = HashSet::new();
            for input in &self.inputs {
                if !seen.insert((input.position, &input.path, input.video_track)) {
                    return Err(StitchError::configuration(format!(
                        "input '{}' is listed twice",
                        input.path.display()
                    )));
                }
            }
            let positions: HashSet<_> = self.inputs.iter().map(|i| i.position).collect();
            if positions.len() != self.inputs.len() {
                return Err(StitchError::configuration(
                    "the default dual-fisheye rig needs one front and one back input",
                ));
            }
        }

        let size = self.output_size;
        if size.width == 0 || size.height == 0 {
            return Err(StitchError::configuration(format!(
                "output size must be positive, got {size}"
            )));
        }
        if size.width % 2 != 0 || size.height % 2 != 0 {
            return Err(StitchError::configuration(format!(
                "output size must be even, got {size}"
            )));
        }
        if self.bitrate_bps == 0 {
            return Err(StitchError::configuration("bitrate must be positive"));
        }

        if self.stitch_mode == StitchMode::AiFlow
            && self.model.as_ref().is_none_or(|p| p.as_os_str().is_empty())
        {
            return Err(StitchError::configuration(
                "AI_FLOW stitch mode requires a model path",
            ));
        }

        if self.output.as_os_str().is_empty() {
            return Err(StitchError::configuration("output path is empty"));
        }
        if let Some(input) = self.inputs.iter().find(|i| i.path == self.output) {
            return Err(StitchError::configuration(format!(
                "output path '{}' is also an input",
                input.path.display()
            )));
        }

        self.tuning.validate()
    }
}

impl Tuning {
    /// Range checks for every knob.
    pub fn validate(&self) -> StitchResult<()> {
        fn bad(msg: String) -> StitchResult<()> {
            Err(StitchError::configuration(msg))
        }
        if self.field_stride == 0 {
            return bad("field_stride must be >= 1".to_string());
        }
        if self.sync_lookahead == 0 {
            return bad("sync_lookahead must be >= 1".to_string());
        }
        if let Some(t) = self.skew_tolerance_us
            && t < 0
        {
            return bad(format!("skew_tolerance_us must be >= 0, got {t}"));
        }
        let threshold = self.alignment_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return bad(format!(
                "alignment_confidence_threshold must be in [0, 1], got {threshold}"
            ));
        }
        let strength = self.flow_state_strength;
        if !(0.0..1.0).contains(&strength) {
            return bad(format!(
                "flow_state_strength must be in [0, 1), got {strength}"
            ));
        }
        let band = self.blend_band;
        if !(band > 0.0 && band <= 1.0) {
            return bad(format!("blend_band must be in (0, 1], got {band}"));
        }
        if self.alignment_concurrency == Some(0) {
            return bad("alignment_concurrency must be >= 1".to_string());
        }
        if self.channel_capacity == 0 || self.reorder_capacity == 0 {
            return bad("channel and reorder capacities must be >= 1".to_string());
        }
        if self.timeout_secs == Some(0) {
            return bad("timeout_secs must be >= 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/job/validate.rs"]
mod tests;
