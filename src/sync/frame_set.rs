use smallvec::SmallVec;

use crate::foundation::core::Timestamp;
use crate::source::RawFrame;

/// One frame per stream, matched by timestamp. Frames are in stream order.
#[derive(Clone, Debug)]
pub struct SynchronizedFrameSet {
    /// Output sequence number (0, 1, 2, ... without gaps).
    pub seq: u64,
    /// Reference timestamp (the earliest frame of the set).
    pub pts: Timestamp,
    /// `frames[i]` belongs to stream `i`.
    pub frames: SmallVec<[RawFrame; 2]>,
    /// Largest distance between any member and the reference, in microseconds.
    pub skew_us: i64,
    /// `true` when a member was reused from an earlier set because its stream had no frame
    /// within tolerance.
    pub degraded: bool,
}

impl SynchronizedFrameSet {
    /// Number of member frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` for an empty set (never produced by the synchronizer).
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
