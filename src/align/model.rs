use std::path::Path;
use std::sync::Arc;

use crate::foundation::error::{StitchError, StitchResult};
use crate::foundation::math::GridTap;
use crate::job::model::LensPosition;

/// `format` tag every model file must carry.
pub const MODEL_FORMAT: &str = "panostitch-flow";
/// Supported model file version.
pub const MODEL_VERSION: u32 = 1;
/// Inputs per overlap node: intensity difference and both lenses' gradients.
pub const FEATURES: usize = 5;

fn default_min_contrast() -> f32 {
    4.0
}

/// Trained seam-correspondence model.
///
/// A single hidden-layer network evaluated at each overlap node. Its input is
/// `[I_a - I_b, dI_a/dx, dI_a/dy, dI_b/dx, dI_b/dy]` (all divided by 255), its outputs are a
/// displacement in `[-1, 1]` units of [`max_displacement_px`](Self::max_displacement_px) and a
/// per-node confidence. Optional per-lens residual grids carry the static calibration learned
/// alongside the network.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AiFlowModel {
    /// Must equal [`MODEL_FORMAT`].
    pub format: String,
    /// Must equal [`MODEL_VERSION`].
    pub version: u32,
    /// Canvas width the displacement scale was trained at.
    pub reference_width: u32,
    /// Displacement for an output of 1.0 at `reference_width`.
    pub max_displacement_px: f32,
    /// Nodes below this patch contrast are not trusted.
    #[serde(default = "default_min_contrast")]
    pub min_contrast: f32,
    /// Hidden layer weights, one row per hidden unit.
    pub w1: Vec<[f32; FEATURES]>,
    /// Hidden layer biases.
    pub b1: Vec<f32>,
    /// Output weights for `dx` and `dy`.
    pub w2: [Vec<f32>; 2],
    /// Output biases.
    pub b2: [f32; 2],
    /// Confidence head weights.
    pub w_conf: Vec<f32>,
    /// Confidence head bias.
    pub b_conf: f32,
    /// Static per-lens correction grids.
    #[serde(default)]
    pub residuals: Vec<LensResidual>,
}

/// Low-resolution static correction for one lens, in canvas fractions.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LensResidual {
    /// Lens the grid applies to.
    pub position: LensPosition,
    /// Grid columns spanning longitude (last column wraps to the first).
    pub cols: usize,
    /// Grid rows spanning latitude.
    pub rows: usize,
    /// Horizontal correction as a fraction of canvas width.
    pub dx: Vec<f32>,
    /// Vertical correction as a fraction of canvas height.
    pub dy: Vec<f32>,
}

impl LensResidual {
    /// Correction at normalized canvas position `(u, v)`, in canvas fractions.
    pub fn sample(&self, u: f64, v: f64) -> (f32, f32) {
        let gx = (u * (self.cols - 1) as f64) as f32;
        let gy = (v * (self.rows - 1) as f64) as f32;
        let tap = GridTap::new(self.cols, self.rows, gx, gy, true);
        (tap.apply(&self.dx), tap.apply(&self.dy))
    }
}

/// One node's model output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Inference {
    /// Displacement in `[-1, 1]` units.
    pub d: (f32, f32),
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl AiFlowModel {
    /// Load and validate a model file. Every failure is [`StitchError::ModelLoad`].
    #[tracing::instrument]
    pub fn load(path: &Path) -> StitchResult<Arc<Self>> {
        if !path.exists() {
            return Err(StitchError::model_load(path, "file not found"));
        }
        let bytes = std::fs::read(path)
            .map_err(|e| StitchError::model_load(path, format!("read failed: {e}")))?;
        let model = Self::from_json_slice(path, &bytes)?;
        tracing::info!(
            hidden = model.hidden(),
            residuals = model.residuals.len(),
            "loaded alignment model"
        );
        Ok(Arc::new(model))
    }

    /// Parse and validate model JSON; `path` is only used in error messages.
    pub fn from_json_slice(path: &Path, bytes: &[u8]) -> StitchResult<Self> {
        let model: Self = serde_json::from_slice(bytes)
            .map_err(|e| StitchError::model_load(path, format!("malformed model: {e}")))?;
        model
            .check()
            .map_err(|reason| StitchError::model_load(path, reason))?;
        Ok(model)
    }

    /// Hidden layer width.
    pub fn hidden(&self) -> usize {
        self.w1.len()
    }

    fn check(&self) -> Result<(), String> {
        if self.format != MODEL_FORMAT {
            return Err(format!(
                "unexpected format '{}', expected '{MODEL_FORMAT}'",
                self.format
            ));
        }
        if self.version != MODEL_VERSION {
            return Err(format!(
                "unsupported version {}, expected {MODEL_VERSION}",
                self.version
            ));
        }
        let h = self.hidden();
        if h == 0 {
            return Err("hidden layer is empty".to_string());
        }
        if self.b1.len() != h
            || self.w2[0].len() != h
            || self.w2[1].len() != h
            || self.w_conf.len() != h
        {
            return Err(format!("layer shapes disagree with hidden width {h}"));
        }
        if self.reference_width == 0 {
            return Err("reference_width must be > 0".to_string());
        }
        if !(self.max_displacement_px.is_finite() && self.max_displacement_px > 0.0) {
            return Err("max_displacement_px must be positive".to_string());
        }
        let mut weights = self
            .w1
            .iter()
            .flatten()
            .chain(&self.b1)
            .chain(self.w2.iter().flatten())
            .chain(&self.b2)
            .chain(&self.w_conf)
            .chain(std::iter::once(&self.b_conf));
        if weights.any(|w| !w.is_finite()) {
            return Err("weights must be finite".to_string());
        }
        for r in &self.residuals {
            if r.cols < 2 || r.rows < 2 {
                return Err(format!("{:?} residual grid must be at least 2x2", r.position));
            }
            if r.dx.len() != r.cols * r.rows || r.dy.len() != r.cols * r.rows {
                return Err(format!("{:?} residual grid size mismatch", r.position));
            }
            if r.dx.iter().chain(&r.dy).any(|v| !v.is_finite()) {
                return Err(format!("{:?} residual values must be finite", r.position));
            }
        }
        Ok(())
    }

    /// Evaluate the network on one feature vector.
    pub fn infer(&self, x: &[f32; FEATURES]) -> Inference {
        let mut d = self.b2;
        let mut c = self.b_conf;
        for (k, (row, b)) in self.w1.iter().zip(&self.b1).enumerate() {
            let z: f32 = row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b;
            let h = z.tanh();
            d[0] += self.w2[0][k] * h;
            d[1] += self.w2[1][k] * h;
            c += self.w_conf[k] * h;
        }
        Inference {
            d: (d[0].tanh(), d[1].tanh()),
            confidence: 1.0 / (1.0 + (-c).exp()),
        }
    }

    /// Residual grid for `position`, if the model has one.
    pub fn residual_for(&self, position: LensPosition) -> Option<&LensResidual> {
        self.residuals.iter().find(|r| r.position == position)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/align/model.rs"]
mod tests;
