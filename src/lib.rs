//! panostitch turns time-synchronized fisheye recordings from a rigid multi-lens rig into one
//! equirectangular panoramic video.
//!
//! The engine is a staged pipeline:
//!
//! - read each input into timestamped RGBA frames ([`source`])
//! - group frames across lenses into [`SynchronizedFrameSet`]s ([`sync`])
//! - compute per-lens warp fields that make the overlaps agree ([`align`])
//! - resample and blend into a [`PanoramicFrame`] ([`fusion`])
//! - encode and mux the frames in order ([`encode`])
//!
//! A [`StitchSession`] owns one [`StitchJob`] and drives all of it through the
//! `Configured → Validating → Running → Completed` lifecycle.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Alignment engine: strategies, model inference and temporal stabilization.
pub mod align;
/// Dual-track recording discovery for batch runs.
pub mod discovery;
/// Encode scheduler, encoders and muxers.
pub mod encode;
/// Warp and blend into panoramic frames.
pub mod fusion;
/// Lens, rig and projection geometry.
pub mod geometry;
/// Job configuration and validation.
pub mod job;
/// Subscriber setup for the binaries.
pub mod logging;
/// Pipeline controller.
pub mod session;
/// Frame sources.
pub mod source;
/// Frame synchronization.
pub mod sync;

pub use crate::foundation::cancel::CancelToken;
pub use crate::foundation::core::{Canvas, Fps, Point, StreamId, Timestamp, Vec2};
pub use crate::foundation::diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use crate::foundation::error::{ErrorKind, StitchError, StitchResult};

pub use crate::align::field::{AlignmentField, FieldSet};
pub use crate::align::strategy::AlignmentStrategy;
pub use crate::encode::memory::{InMemoryEncoder, InMemoryMuxer, MuxLog};
pub use crate::encode::scheduler::{EncodeScheduler, EncodeSummary};
pub use crate::encode::{ChunkMuxer, EncodeSettings, EncodedChunk, VideoEncoder};
pub use crate::fusion::PanoramicFrame;
pub use crate::job::model::{
    Codec, FeatureToggles, GapPolicy, LensGuard, LensPosition, StitchJob, StitchMode,
    StreamLocator, Tuning,
};
pub use crate::session::pipeline::{JobFailure, StitchReport, StitchSession};
pub use crate::session::state::PipelineState;
pub use crate::source::memory::InMemorySource;
pub use crate::source::{FrameSource, RawFrame, StreamInfo};
pub use crate::sync::frame_set::SynchronizedFrameSet;

#[cfg(test)]
#[path = "../tests/unit/support.rs"]
pub(crate) mod test_support;
