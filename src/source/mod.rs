//! Frame sources: decoded RGBA frames with presentation timestamps, one stream per input.
//!
//! A [`FrameSource`] yields frames in decode order. Per-frame decode problems surface as
//! [`StitchError::Decode`](crate::StitchError::Decode) items; [`FrameReader`](reader::FrameReader)
//! skips them and aborts the stream only after too many in a row.

use std::sync::Arc;

use crate::foundation::core::{Fps, StreamId, Timestamp};
use crate::foundation::error::StitchResult;

/// `ffprobe`/`ffmpeg` subprocess source.
pub mod ffmpeg;
/// Scripted in-memory source for tests.
pub mod memory;
/// Decode-error absorbing reader.
pub mod reader;

/// Static properties of an opened stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal framerate.
    pub fps: Fps,
    /// Timestamp of the first frame.
    pub start: Timestamp,
    /// Frame count reported by the container, when known.
    pub frame_count: Option<u64>,
}

/// One decoded frame of one stream.
///
/// Pixel data is tightly packed RGBA8 and shared, so duplicating a frame into several frame sets
/// does not copy it.
#[derive(Clone, Debug)]
pub struct RawFrame {
    /// Stream the frame came from.
    pub stream: StreamId,
    /// Decode-order index within the stream.
    pub index: u64,
    /// Presentation timestamp.
    pub pts: Timestamp,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA8 pixels, row-major.
    pub data: Arc<Vec<u8>>,
}

impl RawFrame {
    /// Frame filled with one colour.
    pub fn solid(
        stream: StreamId,
        index: u64,
        pts: Timestamp,
        width: u32,
        height: u32,
        rgba: [u8; 4],
    ) -> Self {
        let data = rgba.repeat(width as usize * height as usize);
        Self {
            stream,
            index,
            pts,
            width,
            height,
            data: Arc::new(data),
        }
    }

    /// Expected byte length for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// A lazily decoded stream of frames.
///
/// `None` means the stream ended. `Some(Err(_))` with a frame-level error may be followed by more
/// frames; any other error is terminal.
pub trait FrameSource: Send {
    /// Stream properties, known from the moment the source is opened.
    fn info(&self) -> &StreamInfo;

    /// Decode the next frame.
    fn next_frame(&mut self) -> Option<StitchResult<RawFrame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> &StreamInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Option<StitchResult<RawFrame>> {
        (**self).next_frame()
    }
}
