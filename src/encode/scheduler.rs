use std::sync::Arc;

use crate::encode::{ChunkMuxer, EncodeSettings, EncodedChunk, VideoEncoder};
use crate::foundation::diagnostics::Diagnostics;
use crate::foundation::error::{StitchError, StitchResult};
use crate::fusion::PanoramicFrame;

/// Totals of a finished encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Frames submitted.
    pub frames: u64,
    /// Chunks muxed.
    pub chunks: u64,
}

/// Drives an encoder and a muxer in submission order.
///
/// Frames must arrive with contiguous sequence numbers starting at 0, and chunk timestamps must
/// never go backwards. Any encoder or muxer error during the run is
/// [`StitchError::EncodeFailure`].
pub struct EncodeScheduler {
    encoder: Box<dyn VideoEncoder>,
    muxer: Box<dyn ChunkMuxer>,
    diagnostics: Arc<Diagnostics>,
    next_seq: u64,
    last_pts: Option<i64>,
    summary: EncodeSummary,
    started: bool,
}

impl EncodeScheduler {
    /// Scheduler over `encoder` and `muxer`; nothing starts until [`begin`](Self::begin).
    pub fn new(
        encoder: Box<dyn VideoEncoder>,
        muxer: Box<dyn ChunkMuxer>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            encoder,
            muxer,
            diagnostics,
            next_seq: 0,
            last_pts: None,
            summary: EncodeSummary::default(),
            started: false,
        }
    }

    /// Start the encoder and create the output. Failures are [`StitchError::EncoderInit`].
    #[tracing::instrument(skip_all, fields(output = %settings.output.display()))]
    pub fn begin(&mut self, settings: &EncodeSettings) -> StitchResult<()> {
        self.encoder.begin(settings).map_err(as_init)?;
        if let Err(e) = self.muxer.begin(settings) {
            self.encoder.abort();
            return Err(as_init(e));
        }
        self.started = true;
        Ok(())
    }

    /// Submit the next frame.
    pub fn submit(&mut self, frame: &PanoramicFrame) -> StitchResult<()> {
        if !self.started {
            return Err(StitchError::encode("encode scheduler not started"));
        }
        if frame.seq != self.next_seq {
            return Err(StitchError::encode(format!(
                "frame {} submitted out of order (expected {})",
                frame.seq, self.next_seq
            )));
        }
        let chunks = self.encoder.encode(frame).map_err(as_failure)?;
        self.next_seq += 1;
        self.summary.frames += 1;
        self.diagnostics.record_frame_encoded();
        self.write(chunks)
    }

    /// Flush the encoder and finalize the container.
    #[tracing::instrument(skip_all)]
    pub fn finish(&mut self) -> StitchResult<EncodeSummary> {
        if !self.started {
            return Err(StitchError::encode("encode scheduler not started"));
        }
        let chunks = self.encoder.flush().map_err(as_failure)?;
        self.write(chunks)?;
        self.muxer.finalize().map_err(as_failure)?;
        self.started = false;
        tracing::debug!(
            frames = self.summary.frames,
            chunks = self.summary.chunks,
            "output finalized"
        );
        Ok(self.summary)
    }

    /// Stop both ends; partial output stays on disk.
    pub fn abort(&mut self) {
        if self.started {
            self.encoder.abort();
            self.muxer.abort();
            self.started = false;
        }
    }

    /// Progress so far.
    pub fn summary(&self) -> EncodeSummary {
        self.summary
    }

    fn write(&mut self, chunks: Vec<EncodedChunk>) -> StitchResult<()> {
        for chunk in chunks {
            if let Some(last) = self.last_pts
                && chunk.pts < last
            {
                return Err(StitchError::encode(format!(
                    "chunk {} pts {} precedes {last}",
                    chunk.index, chunk.pts
                )));
            }
            self.last_pts = Some(chunk.pts);
            self.muxer.write_chunk(&chunk).map_err(as_failure)?;
            self.summary.chunks += 1;
            self.diagnostics.record_chunk_muxed();
        }
        Ok(())
    }
}

fn as_init(e: StitchError) -> StitchError {
    match e {
        StitchError::EncoderInit(_) | StitchError::Cancelled => e,
        other => StitchError::encoder_init(other.to_string()),
    }
}

fn as_failure(e: StitchError) -> StitchError {
    match e {
        StitchError::EncodeFailure(_) | StitchError::Cancelled => e,
        other => StitchError::encode(other.to_string()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/scheduler.rs"]
mod tests;
