use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::encode::{ChunkMuxer, EncodeSettings, EncodedChunk, VideoEncoder};
use crate::foundation::core::Timestamp;
use crate::foundation::error::{StitchError, StitchResult};
use crate::fusion::PanoramicFrame;

/// Deterministic stand-in encoder: one chunk per frame holding the frame's fingerprint.
///
/// `latency` frames are held back before their chunks are released, like a real encoder's
/// lookahead; `flush` releases the rest.
#[derive(Debug, Default)]
pub struct InMemoryEncoder {
    latency: usize,
    keyframe_interval: u64,
    fail_at: Option<u64>,
    settings: Option<EncodeSettings>,
    held: VecDeque<(u64, Timestamp, u64)>,
    next_index: u64,
}

impl InMemoryEncoder {
    /// Encoder releasing each chunk `latency` frames late.
    pub fn new(latency: usize) -> Self {
        Self {
            latency,
            keyframe_interval: 30,
            ..Self::default()
        }
    }

    /// Fail with [`StitchError::EncodeFailure`] when asked to encode frame `seq`.
    pub fn failing_at(mut self, seq: u64) -> Self {
        self.fail_at = Some(seq);
        self
    }

    fn release(&mut self, keep: usize) -> Vec<EncodedChunk> {
        let mut out = Vec::new();
        while self.held.len() > keep {
            let Some((seq, pts, fingerprint)) = self.held.pop_front() else {
                break;
            };
            let index = self.next_index;
            self.next_index += 1;
            let mut data = seq.to_le_bytes().to_vec();
            data.extend_from_slice(&fingerprint.to_le_bytes());
            out.push(EncodedChunk {
                index,
                pts: index as i64,
                dts: index as i64,
                pts_us: pts,
                keyframe: index.is_multiple_of(self.keyframe_interval.max(1)),
                data,
            });
        }
        out
    }
}

impl VideoEncoder for InMemoryEncoder {
    fn begin(&mut self, settings: &EncodeSettings) -> StitchResult<()> {
        self.settings = Some(settings.clone());
        self.held.clear();
        self.next_index = 0;
        Ok(())
    }

    fn encode(&mut self, frame: &PanoramicFrame) -> StitchResult<Vec<EncodedChunk>> {
        let Some(settings) = &self.settings else {
            return Err(StitchError::encode("in-memory encoder not started"));
        };
        if frame.width != settings.width || frame.height != settings.height {
            return Err(StitchError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}",
                frame.width,
                frame.height,
                settings.canvas()
            )));
        }
        if self.fail_at == Some(frame.seq) {
            return Err(StitchError::encode(format!(
                "injected failure at frame {}",
                frame.seq
            )));
        }
        let fingerprint = xxhash_rust::xxh3::xxh3_64(&frame.data);
        self.held.push_back((frame.seq, frame.pts, fingerprint));
        Ok(self.release(self.latency))
    }

    fn flush(&mut self) -> StitchResult<Vec<EncodedChunk>> {
        Ok(self.release(0))
    }

    fn abort(&mut self) {
        self.held.clear();
    }
}

/// Everything an [`InMemoryMuxer`] has seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MuxLog {
    /// Settings passed to `begin`.
    pub settings: Option<EncodeSettings>,
    /// Chunks in write order.
    pub chunks: Vec<EncodedChunk>,
    /// `finalize` completed.
    pub finalized: bool,
    /// `abort` was called.
    pub aborted: bool,
}

/// Muxer that records chunks in memory.
///
/// The log is shared, so a test can keep a [`handle`](Self::handle) after handing the muxer to a
/// pipeline.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMuxer {
    log: Arc<Mutex<MuxLog>>,
}

impl InMemoryMuxer {
    /// Empty muxer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the log.
    pub fn handle(&self) -> Self {
        self.clone()
    }

    /// Current log contents.
    pub fn log(&self) -> MuxLog {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, MuxLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ChunkMuxer for InMemoryMuxer {
    fn begin(&mut self, settings: &EncodeSettings) -> StitchResult<()> {
        let mut log = self.lock();
        *log = MuxLog {
            settings: Some(settings.clone()),
            ..MuxLog::default()
        };
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &EncodedChunk) -> StitchResult<()> {
        let mut log = self.lock();
        if log.settings.is_none() || log.finalized {
            return Err(StitchError::encode("in-memory muxer is not accepting chunks"));
        }
        log.chunks.push(chunk.clone());
        Ok(())
    }

    fn finalize(&mut self) -> StitchResult<()> {
        let mut log = self.lock();
        if log.settings.is_none() {
            return Err(StitchError::encode("in-memory muxer not started"));
        }
        log.finalized = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.lock().aborted = true;
    }
}
