//! Cross-stream timestamp matching.
//!
//! Streams from different lenses are independent recordings: they start at slightly different
//! instants and may drift or drop frames. The synchronizer groups one frame per stream into
//! [`SynchronizedFrameSet`](frame_set::SynchronizedFrameSet)s whose timestamps agree within a
//! tolerance.

/// Frame set type.
pub mod frame_set;
/// The matching algorithm.
pub mod synchronizer;
