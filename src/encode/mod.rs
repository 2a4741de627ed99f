//! Encoding: panoramic frames in, ordered encoded access units out, muxed into MP4.
//!
//! [`VideoEncoder`] turns frames into [`EncodedChunk`]s, [`ChunkMuxer`] writes them into a
//! container, and [`EncodeScheduler`](scheduler::EncodeScheduler) drives both while enforcing
//! submission order.

use std::path::PathBuf;

use crate::foundation::core::{Canvas, Fps, Timestamp};
use crate::foundation::error::{StitchError, StitchResult};
use crate::fusion::PanoramicFrame;
use crate::job::model::{Codec, StitchJob};

/// Annex-B access unit splitting.
pub mod annexb;
/// `ffmpeg` subprocess encoder and muxer.
pub mod ffmpeg;
/// In-memory encoder and muxer for tests.
pub mod memory;
/// Ordered frame submission.
pub mod scheduler;

/// H.264 luma size limit (level 5.1).
pub const H264_MAX_SIZE: (u32, u32) = (4096, 2304);
/// H.264 bitrate limit.
pub const H264_MAX_BITRATE_BPS: u64 = 300_000_000;
/// H.265 luma size limit (level 6.2).
pub const H265_MAX_SIZE: (u32, u32) = (8192, 4320);
/// H.265 bitrate limit.
pub const H265_MAX_BITRATE_BPS: u64 = 800_000_000;

/// Everything the encoder and muxer need, fixed at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeSettings {
    /// Output codec.
    pub codec: Codec,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u64,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Output framerate.
    pub fps: Fps,
    /// MP4 path.
    pub output: PathBuf,
    /// Replace an existing output file.
    pub overwrite: bool,
}

impl EncodeSettings {
    /// Settings for `job` at the pipeline's output framerate.
    pub fn from_job(job: &StitchJob, fps: Fps) -> Self {
        Self {
            codec: job.codec,
            bitrate_bps: job.bitrate_bps,
            width: job.output_size.width,
            height: job.output_size.height,
            fps,
            output: job.output.clone(),
            overwrite: job.tuning.overwrite,
        }
    }

    /// Frame size as a canvas.
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// Check the settings against the codec's limits and the fusion canvas.
    ///
    /// A canvas mismatch is a configuration error; everything the codec cannot do is
    /// [`StitchError::EncoderInit`].
    pub fn validate(&self, canvas: Canvas) -> StitchResult<()> {
        if self.canvas() != canvas {
            return Err(StitchError::configuration(format!(
                "encoder size {} does not match canvas {canvas}",
                self.canvas()
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(StitchError::encoder_init("frame size must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(StitchError::encoder_init(format!(
                "frame size {} must be even for 4:2:0 output",
                self.canvas()
            )));
        }
        if self.bitrate_bps == 0 {
            return Err(StitchError::encoder_init("bitrate must be positive"));
        }
        let ((max_w, max_h), max_rate) = match self.codec {
            Codec::H264 => (H264_MAX_SIZE, H264_MAX_BITRATE_BPS),
            Codec::H265 => (H265_MAX_SIZE, H265_MAX_BITRATE_BPS),
        };
        if self.width > max_w || self.height > max_h {
            return Err(StitchError::encoder_init(format!(
                "{:?} supports at most {max_w}x{max_h}, got {}",
                self.codec,
                self.canvas()
            )));
        }
        if self.bitrate_bps > max_rate {
            return Err(StitchError::encoder_init(format!(
                "{:?} supports at most {max_rate} bps, got {}",
                self.codec, self.bitrate_bps
            )));
        }
        Ok(())
    }
}

/// One encoded access unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Position in the encoder's output, from 0.
    pub index: u64,
    /// Presentation time in frame ticks.
    pub pts: i64,
    /// Decode time in frame ticks.
    pub dts: i64,
    /// Presentation time of the source frame.
    pub pts_us: Timestamp,
    /// Random access point.
    pub keyframe: bool,
    /// Annex-B bytes, start codes included.
    pub data: Vec<u8>,
}

/// Frame-to-chunk encoder.
///
/// Frames arrive in order. An encoder may hold frames back (lookahead) and return their chunks
/// from later calls or from `flush`.
pub trait VideoEncoder: Send {
    /// Start encoding with `settings` (already validated).
    fn begin(&mut self, settings: &EncodeSettings) -> StitchResult<()>;
    /// Encode one frame, returning whatever chunks became ready.
    fn encode(&mut self, frame: &PanoramicFrame) -> StitchResult<Vec<EncodedChunk>>;
    /// Drain every remaining chunk; no frames follow.
    fn flush(&mut self) -> StitchResult<Vec<EncodedChunk>>;
    /// Stop immediately, discarding pending output.
    fn abort(&mut self);
}

/// Container writer for encoded chunks.
pub trait ChunkMuxer: Send {
    /// Create the output (already validated settings).
    fn begin(&mut self, settings: &EncodeSettings) -> StitchResult<()>;
    /// Append one chunk; chunks arrive in decode order.
    fn write_chunk(&mut self, chunk: &EncodedChunk) -> StitchResult<()>;
    /// Finish the container. The output is complete only after this returns `Ok`.
    fn finalize(&mut self) -> StitchResult<()>;
    /// Stop immediately; whatever was written stays on disk.
    fn abort(&mut self);
}

#[cfg(test)]
#[path = "../../tests/unit/encode/settings.rs"]
mod tests;
