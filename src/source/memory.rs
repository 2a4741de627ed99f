use std::collections::VecDeque;
use std::sync::Arc;

use crate::foundation::core::{Fps, StreamId, Timestamp};
use crate::foundation::error::{StitchError, StitchResult};
use crate::source::{FrameSource, RawFrame, StreamInfo};

#[derive(Debug)]
enum Scripted {
    Frame { pts: Timestamp, data: Arc<Vec<u8>> },
    DecodeError(String),
    Abort(String),
}

/// Source that replays a scripted sequence of frames and failures.
///
/// Used by tests and by callers that already hold decoded frames.
#[derive(Debug)]
pub struct InMemorySource {
    stream: StreamId,
    info: StreamInfo,
    script: VecDeque<Scripted>,
    next_index: u64,
}

impl InMemorySource {
    /// Empty source with the given properties.
    pub fn new(stream: StreamId, info: StreamInfo) -> Self {
        Self {
            stream,
            info,
            script: VecDeque::new(),
            next_index: 0,
        }
    }

    /// `count` frames of one colour at the nominal rate, starting at timestamp zero.
    pub fn solid_color(
        stream: StreamId,
        width: u32,
        height: u32,
        fps: Fps,
        count: u64,
        rgba: [u8; 4],
    ) -> Self {
        let info = StreamInfo {
            width,
            height,
            fps,
            start: Timestamp::ZERO,
            frame_count: Some(count),
        };
        let data = Arc::new(rgba.repeat(width as usize * height as usize));
        let mut src = Self::new(stream, info);
        for i in 0..count {
            let pts = fps.frame_timestamp(Timestamp::ZERO, i);
            src.script.push_back(Scripted::Frame {
                pts,
                data: Arc::clone(&data),
            });
        }
        src
    }

    /// `count` frames produced by `pixel(frame, x, y)` at the nominal rate.
    pub fn from_fn(
        stream: StreamId,
        info: StreamInfo,
        count: u64,
        pixel: impl Fn(u64, u32, u32) -> [u8; 4],
    ) -> Self {
        let mut src = Self::new(stream, info);
        for i in 0..count {
            let mut data = Vec::with_capacity(src.info.width as usize * src.info.height as usize * 4);
            for y in 0..src.info.height {
                for x in 0..src.info.width {
                    data.extend_from_slice(&pixel(i, x, y));
                }
            }
            let pts = src.info.fps.frame_timestamp(src.info.start, i);
            src.push_frame(pts, data);
        }
        src
    }

    /// Append a frame.
    pub fn push_frame(&mut self, pts: Timestamp, data: Vec<u8>) -> &mut Self {
        self.script.push_back(Scripted::Frame {
            pts,
            data: Arc::new(data),
        });
        self
    }

    /// Append a recoverable decode error.
    pub fn push_decode_error(&mut self, reason: impl Into<String>) -> &mut Self {
        self.script.push_back(Scripted::DecodeError(reason.into()));
        self
    }

    /// Append a terminal failure.
    pub fn push_abort(&mut self, reason: impl Into<String>) -> &mut Self {
        self.script.push_back(Scripted::Abort(reason.into()));
        self
    }

    /// Replace the scripted timestamps with `f(index, pts)`.
    pub fn map_timestamps(mut self, f: impl Fn(u64, Timestamp) -> Timestamp) -> Self {
        let mut i = 0;
        for item in &mut self.script {
            if let Scripted::Frame { pts, .. } = item {
                *pts = f(i, *pts);
                i += 1;
            }
        }
        self
    }

    /// Remaining scripted items.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl FrameSource for InMemorySource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Option<StitchResult<RawFrame>> {
        match self.script.pop_front()? {
            Scripted::Frame { pts, data } => {
                let expected = self.info.width as usize * self.info.height as usize * 4;
                if data.len() != expected {
                    return Some(Err(StitchError::decode(
                        self.stream,
                        self.next_index,
                        format!("frame has {} bytes, expected {expected}", data.len()),
                    )));
                }
                let index = self.next_index;
                self.next_index += 1;
                Some(Ok(RawFrame {
                    stream: self.stream,
                    index,
                    pts,
                    width: self.info.width,
                    height: self.info.height,
                    data,
                }))
            }
            Scripted::DecodeError(reason) => {
                Some(Err(StitchError::decode(self.stream, self.next_index, reason)))
            }
            Scripted::Abort(reason) => {
                self.script.clear();
                Some(Err(StitchError::stream_aborted(self.stream, reason)))
            }
        }
    }
}
