use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every stage of a running job.
///
/// Stages only ever increment; readers take a [`DiagnosticsSnapshot`].
#[derive(Debug, Default)]
pub struct Diagnostics {
    decode_errors: AtomicU64,
    sets_emitted: AtomicU64,
    sets_dropped: AtomicU64,
    sets_duplicated: AtomicU64,
    alignment_fallbacks: AtomicU64,
    frames_fused: AtomicU64,
    frames_encoded: AtomicU64,
    chunks_muxed: AtomicU64,
    estimated_sets: AtomicU64,
}

macro_rules! counter {
    ($($(#[$doc:meta])* $record:ident => $field:ident),* $(,)?) => {
        impl Diagnostics {
            $(
                $(#[$doc])*
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    /// One frame-level decode error was skipped.
    record_decode_error => decode_errors,
    /// One synchronized frame set was emitted.
    record_set_emitted => sets_emitted,
    /// One reference frame was dropped for exceeding the skew tolerance.
    record_set_dropped => sets_dropped,
    /// One degraded frame set reused a nearest frame.
    record_set_duplicated => sets_duplicated,
    /// One frame set fell back to the last good alignment.
    record_alignment_fallback => alignment_fallbacks,
    /// One panoramic frame was produced.
    record_frame_fused => frames_fused,
    /// One frame was handed to the encoder.
    record_frame_encoded => frames_encoded,
    /// One encoded chunk reached the container.
    record_chunk_muxed => chunks_muxed,
}

impl Diagnostics {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the expected number of frame sets, when the sources know their length.
    pub fn set_estimated_sets(&self, n: u64) {
        self.estimated_sets.store(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            decode_errors: get(&self.decode_errors),
            sets_emitted: get(&self.sets_emitted),
            sets_dropped: get(&self.sets_dropped),
            sets_duplicated: get(&self.sets_duplicated),
            alignment_fallbacks: get(&self.alignment_fallbacks),
            frames_fused: get(&self.frames_fused),
            frames_encoded: get(&self.frames_encoded),
            chunks_muxed: get(&self.chunks_muxed),
            estimated_sets: match get(&self.estimated_sets) {
                0 => None,
                n => Some(n),
            },
        }
    }
}

/// Copy of [`Diagnostics`] at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DiagnosticsSnapshot {
    /// Frame-level decode errors skipped.
    pub decode_errors: u64,
    /// Frame sets emitted by the synchronizer.
    pub sets_emitted: u64,
    /// Reference frames dropped for skew.
    pub sets_dropped: u64,
    /// Degraded sets emitted with a reused frame.
    pub sets_duplicated: u64,
    /// Hold-last alignment fallbacks.
    pub alignment_fallbacks: u64,
    /// Panoramic frames fused.
    pub frames_fused: u64,
    /// Frames accepted by the encoder.
    pub frames_encoded: u64,
    /// Chunks written to the container.
    pub chunks_muxed: u64,
    /// Expected frame-set count, when known up front.
    pub estimated_sets: Option<u64>,
}

impl DiagnosticsSnapshot {
    /// Frame-level errors absorbed by fallbacks (decode skips, dropped sets, alignment holds).
    pub fn absorbed_errors(&self) -> u64 {
        self.decode_errors + self.sets_dropped + self.alignment_fallbacks
    }

    /// Encoded fraction of the expected output in `[0, 1]`, when the total is known.
    pub fn progress(&self) -> Option<f64> {
        self.estimated_sets
            .map(|total| (self.frames_encoded as f64 / total as f64).min(1.0))
    }
}
