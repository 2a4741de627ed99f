use std::path::PathBuf;

use crate::foundation::core::StreamId;

/// Result alias used throughout the crate.
pub type StitchResult<T> = Result<T, StitchError>;

/// Every failure the stitching pipeline can surface.
///
/// Frame-level variants (`Decode`, `AlignmentFailure`) are normally absorbed by the stage that
/// produced them; all others end the job.
#[derive(thiserror::Error, Debug)]
pub enum StitchError {
    /// Bad job parameters, detected before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Required external tooling is missing or unusable.
    #[error("environment error: {0}")]
    Environment(String),

    /// An input locator could not be opened.
    #[error("failed to open source '{path}': {reason}")]
    SourceOpen {
        /// Locator that failed.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// A single frame could not be decoded.
    #[error("decode error in stream {stream} near frame {frame}: {reason}")]
    Decode {
        /// Affected stream.
        stream: StreamId,
        /// Index of the last successfully decoded frame + 1.
        frame: u64,
        /// Decoder message.
        reason: String,
    },

    /// A stream gave up permanently.
    #[error("stream {stream} aborted: {reason}")]
    StreamAborted {
        /// Affected stream.
        stream: StreamId,
        /// Human-readable cause.
        reason: String,
    },

    /// The synchronizer could not build a single frame set.
    #[error("synchronization produced no frame sets: {0}")]
    SyncExhausted(String),

    /// The alignment model artifact is missing or malformed.
    #[error("failed to load alignment model '{path}': {reason}")]
    ModelLoad {
        /// Model path from the job.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// Correspondence confidence fell below the threshold for one frame set.
    #[error("alignment failure at frame set {seq}: confidence {confidence:.3} ({reason})")]
    AlignmentFailure {
        /// Frame set sequence number.
        seq: u64,
        /// Measured confidence in `[0, 1]`.
        confidence: f32,
        /// Which check failed.
        reason: String,
    },

    /// The encoder rejected the codec/resolution/bitrate combination at startup.
    #[error("encoder init error: {0}")]
    EncoderInit(String),

    /// Encoding or muxing failed mid-run.
    #[error("encode failure: {0}")]
    EncodeFailure(String),

    /// Cooperative shutdown was requested (user cancel or job timeout).
    #[error("job cancelled")]
    Cancelled,

    /// Anything else, with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fieldless discriminant of [`StitchError`], handy for matching and counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`StitchError::Configuration`].
    Configuration,
    /// See [`StitchError::Environment`].
    Environment,
    /// See [`StitchError::SourceOpen`].
    SourceOpen,
    /// See [`StitchError::Decode`].
    Decode,
    /// See [`StitchError::StreamAborted`].
    StreamAborted,
    /// See [`StitchError::SyncExhausted`].
    SyncExhausted,
    /// See [`StitchError::ModelLoad`].
    ModelLoad,
    /// See [`StitchError::AlignmentFailure`].
    AlignmentFailure,
    /// See [`StitchError::EncoderInit`].
    EncoderInit,
    /// See [`StitchError::EncodeFailure`].
    EncodeFailure,
    /// See [`StitchError::Cancelled`].
    Cancelled,
    /// See [`StitchError::Other`].
    Other,
}

impl StitchError {
    /// Build a [`StitchError::Configuration`].
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`StitchError::Environment`].
    pub fn environment(msg: impl Into<String>) -> Self {
        Self::Environment(msg.into())
    }

    /// Build a [`StitchError::SourceOpen`].
    pub fn source_open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`StitchError::Decode`].
    pub fn decode(stream: StreamId, frame: u64, reason: impl Into<String>) -> Self {
        Self::Decode {
            stream,
            frame,
            reason: reason.into(),
        }
    }

    /// Build a [`StitchError::StreamAborted`].
    pub fn stream_aborted(stream: StreamId, reason: impl Into<String>) -> Self {
        Self::StreamAborted {
            stream,
            reason: reason.into(),
        }
    }

    /// Build a [`StitchError::SyncExhausted`].
    pub fn sync_exhausted(msg: impl Into<String>) -> Self {
        Self::SyncExhausted(msg.into())
    }

    /// Build a [`StitchError::ModelLoad`].
    pub fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`StitchError::AlignmentFailure`].
    pub fn alignment(seq: u64, confidence: f32, reason: impl Into<String>) -> Self {
        Self::AlignmentFailure {
            seq,
            confidence,
            reason: reason.into(),
        }
    }

    /// Build a [`StitchError::EncoderInit`].
    pub fn encoder_init(msg: impl Into<String>) -> Self {
        Self::EncoderInit(msg.into())
    }

    /// Build a [`StitchError::EncodeFailure`].
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::EncodeFailure(msg.into())
    }

    /// Discriminant for matching without destructuring.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Environment(_) => ErrorKind::Environment,
            Self::SourceOpen { .. } => ErrorKind::SourceOpen,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::StreamAborted { .. } => ErrorKind::StreamAborted,
            Self::SyncExhausted(_) => ErrorKind::SyncExhausted,
            Self::ModelLoad { .. } => ErrorKind::ModelLoad,
            Self::AlignmentFailure { .. } => ErrorKind::AlignmentFailure,
            Self::EncoderInit(_) => ErrorKind::EncoderInit,
            Self::EncodeFailure(_) => ErrorKind::EncodeFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// `true` for errors a stage absorbs with a fallback instead of ending the job.
    pub fn is_frame_level(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::AlignmentFailure { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
