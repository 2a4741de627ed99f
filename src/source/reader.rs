use std::sync::Arc;

use crate::foundation::core::StreamId;
use crate::foundation::diagnostics::Diagnostics;
use crate::foundation::error::{StitchError, StitchResult};
use crate::source::{FrameSource, RawFrame};

/// Iterator over a [`FrameSource`] that skips frame-level decode errors.
///
/// Skipped errors are counted in [`Diagnostics`]. More than `max_consecutive_errors` errors in a
/// row end the stream with [`StitchError::StreamAborted`]; any other error is passed through once
/// and ends iteration.
pub struct FrameReader<S> {
    stream: StreamId,
    source: S,
    max_consecutive_errors: u32,
    consecutive_errors: u32,
    skipped: u64,
    diagnostics: Arc<Diagnostics>,
    done: bool,
}

impl<S: FrameSource> FrameReader<S> {
    /// Wrap `source`.
    pub fn new(
        stream: StreamId,
        source: S,
        max_consecutive_errors: u32,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            stream,
            source,
            max_consecutive_errors,
            consecutive_errors: 0,
            skipped: 0,
            diagnostics,
            done: false,
        }
    }

    /// Decode errors skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: FrameSource> Iterator for FrameReader<S> {
    type Item = StitchResult<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let Some(item) = self.source.next_frame() else {
                self.done = true;
                return None;
            };
            match item {
                Ok(frame) => {
                    self.consecutive_errors = 0;
                    return Some(Ok(frame));
                }
                Err(e) if e.is_frame_level() => {
                    self.consecutive_errors += 1;
                    self.skipped += 1;
                    self.diagnostics.record_decode_error();
                    tracing::warn!(stream = %self.stream, error = %e, "skipping undecodable frame");
                    if self.consecutive_errors > self.max_consecutive_errors {
                        self.done = true;
                        return Some(Err(StitchError::stream_aborted(
                            self.stream,
                            format!(
                                "{} consecutive decode errors (last: {e})",
                                self.consecutive_errors
                            ),
                        )));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/reader.rs"]
mod tests;
