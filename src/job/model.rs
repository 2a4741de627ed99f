use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::foundation::core::Canvas;
use crate::foundation::error::{StitchError, StitchResult};
use crate::geometry::lens::RigGeometry;

/// 8K equirectangular output used by the CLI.
pub const DEFAULT_OUTPUT_SIZE: Canvas = Canvas {
    width: 7680,
    height: 3840,
};

/// 100 Mbps.
pub const DEFAULT_BITRATE_BPS: u64 = 100 * 1000 * 1000;

/// Well-known install location of the trained alignment model.
pub const DEFAULT_MODEL_PATH: &str = "/usr/local/share/panostitch/modelfile/ai_stitch_model.json";

/// Physical position of a lens on the rig.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LensPosition {
    /// Lens facing the nominal viewing direction.
    Front,
    /// Lens facing away from the nominal viewing direction.
    Back,
}

/// One input video plus the lens it was recorded through.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamLocator {
    /// Path to the media file.
    pub path: PathBuf,
    /// Lens position tag.
    pub position: LensPosition,
    /// Which video track of the file to decode (dual-track containers carry both lenses).
    #[serde(default)]
    pub video_track: usize,
}

impl StreamLocator {
    /// Locator for the front lens.
    pub fn front(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: LensPosition::Front,
            video_track: 0,
        }
    }

    /// Locator for the back lens.
    pub fn back(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: LensPosition::Back,
            video_track: 0,
        }
    }
}

/// Output video codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 / AVC (`libx264`).
    H264,
    /// H.265 / HEVC (`libx265`).
    H265,
}

impl Codec {
    /// ffmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
        }
    }

    /// ffmpeg Annex-B elementary stream format name.
    pub fn elementary_format(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "hevc",
        }
    }
}

/// How per-frame alignment fields are computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StitchMode {
    /// Fixed warp from rig geometry and accessory profile.
    StaticTemplate,
    /// Classical correspondence search in the overlap band.
    OpticalFlow,
    /// Trained model inference (requires [`StitchJob::model`]).
    AiFlow,
}

/// Camera accessory that changes the known optical distortion of both lenses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensGuard {
    /// Standard clip-on lens guards.
    Standard,
    /// Premium (optical glass) lens guards.
    Premium,
}

/// Feature switches consulted once, when each stage is constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeatureToggles {
    /// Temporal low-pass filtering of alignment fields.
    pub flow_state: bool,
    /// Rig-rotation compensation.
    pub direction_lock: bool,
    /// Seam-aware blending; when off the nearest lens wins each pixel.
    pub fusion: bool,
    /// Per-lens gain matching before blending.
    #[serde(default)]
    pub exposure_compensation: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            flow_state: true,
            direction_lock: true,
            fusion: true,
            exposure_compensation: false,
        }
    }
}

/// Frame-set policy when streams cannot be matched within the skew tolerance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Skip the unmatched reference frame (no ghosting, shorter output).
    #[default]
    Drop,
    /// Emit the set anyway, reusing the nearest frame of the lagging stream.
    DuplicateNearest,
}

/// Thresholds, capacities and tuning knobs. Every field has a default.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Canvas pixels between alignment field grid nodes.
    pub field_stride: u32,
    /// Frames buffered per stream by the synchronizer.
    pub sync_lookahead: usize,
    /// Maximum cross-stream skew; `None` = half a frame at the lowest framerate.
    pub skew_tolerance_us: Option<i64>,
    /// What to do with frame sets that exceed the skew tolerance.
    pub gap_policy: GapPolicy,
    /// Consecutive decode errors tolerated before a stream aborts.
    pub max_consecutive_decode_errors: u32,
    /// Minimum correspondence confidence for a computed field.
    pub alignment_confidence_threshold: f32,
    /// Consecutive hold-last fallbacks tolerated before the job aborts.
    pub max_consecutive_alignment_fallbacks: u32,
    /// Weight of the previous field in the flow-state filter (`0` disables smoothing).
    pub flow_state_strength: f32,
    /// Width of the blend ramp as a fraction of each lens's half field of view.
    pub blend_band: f32,
    /// Alignment worker threads; `None` uses the rayon default.
    pub alignment_concurrency: Option<usize>,
    /// Capacity of every inter-stage queue.
    pub channel_capacity: usize,
    /// Maximum out-of-order alignment results held before fusion.
    pub reorder_capacity: usize,
    /// Optional whole-job timeout, implemented by cancellation.
    pub timeout_secs: Option<u64>,
    /// Overwrite the output file if it exists.
    pub overwrite: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            field_stride: 16,
            sync_lookahead: 4,
            skew_tolerance_us: None,
            gap_policy: GapPolicy::Drop,
            max_consecutive_decode_errors: 8,
            alignment_confidence_threshold: 0.35,
            max_consecutive_alignment_fallbacks: 30,
            flow_state_strength: 0.6,
            blend_band: 0.1,
            alignment_concurrency: None,
            channel_capacity: 4,
            reorder_capacity: 32,
            timeout_secs: None,
            overwrite: true,
        }
    }
}

/// Everything needed to run one stitch, fixed for the job's lifetime.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StitchJob {
    /// Input videos in stream order.
    pub inputs: Vec<StreamLocator>,
    /// Output MP4 path.
    pub output: PathBuf,
    /// Panoramic canvas (and encoded frame) size.
    pub output_size: Canvas,
    /// Output codec.
    pub codec: Codec,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u64,
    /// Trained alignment model (required for [`StitchMode::AiFlow`]).
    #[serde(default)]
    pub model: Option<PathBuf>,
    /// Alignment strategy.
    pub stitch_mode: StitchMode,
    /// Feature switches.
    #[serde(default)]
    pub features: FeatureToggles,
    /// Lens guard accessory, if fitted.
    #[serde(default)]
    pub accessory: Option<LensGuard>,
    /// Rig geometry override; `None` uses the back-to-back dual-fisheye default.
    #[serde(default)]
    pub rig: Option<RigGeometry>,
    /// Thresholds and capacities.
    #[serde(default)]
    pub tuning: Tuning,
}

impl StitchJob {
    /// The fixed dual-fisheye job the CLI runs: 8K H.265 at 100 Mbps, AI flow, all features on.
    pub fn dual_fisheye_8k(
        front: impl Into<PathBuf>,
        back: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inputs: vec![StreamLocator::front(front), StreamLocator::back(back)],
            output: output.into(),
            output_size: DEFAULT_OUTPUT_SIZE,
            codec: Codec::H265,
            bitrate_bps: DEFAULT_BITRATE_BPS,
            model: Some(PathBuf::from(DEFAULT_MODEL_PATH)),
            stitch_mode: StitchMode::AiFlow,
            features: FeatureToggles::default(),
            accessory: None,
            rig: None,
            tuning: Tuning::default(),
        }
    }

    /// Rig geometry in effect (explicit override or the dual-fisheye default).
    pub fn effective_rig(&self) -> RigGeometry {
        self.rig
            .clone()
            .unwrap_or_else(|| RigGeometry::dual_fisheye(&self.inputs))
    }

    /// Parse a job from JSON.
    pub fn from_json_reader(reader: impl Read) -> StitchResult<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| StitchError::configuration(format!("invalid job JSON: {e}")))
    }

    /// Read and parse a JSON job file.
    pub fn from_json_file(path: &Path) -> StitchResult<Self> {
        let f = File::open(path).with_context(|| format!("open job file '{}'", path.display()))?;
        Self::from_json_reader(BufReader::new(f))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/job/model.rs"]
mod tests;
