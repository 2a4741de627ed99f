use std::collections::VecDeque;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::foundation::core::Timestamp;
use crate::foundation::diagnostics::Diagnostics;
use crate::foundation::error::{StitchError, StitchResult};
use crate::job::model::{GapPolicy, Tuning};
use crate::source::{RawFrame, StreamInfo};
use crate::sync::frame_set::SynchronizedFrameSet;

/// Matching parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Frames buffered per stream while searching for the closest match.
    pub lookahead: usize,
    /// Maximum allowed distance from the reference timestamp, in microseconds. Inclusive: a
    /// member exactly `tolerance_us` away on either side still matches.
    pub tolerance_us: i64,
    /// Handling of sets that exceed the tolerance.
    pub gap_policy: GapPolicy,
}

impl SyncConfig {
    /// Config for `streams`, honouring an explicit tolerance from `tuning` if set.
    pub fn for_streams(streams: &[StreamInfo], tuning: &Tuning) -> Self {
        Self {
            lookahead: tuning.sync_lookahead.max(1),
            tolerance_us: tuning
                .skew_tolerance_us
                .unwrap_or_else(|| default_tolerance_us(streams)),
            gap_policy: tuning.gap_policy,
        }
    }
}

/// Half a frame interval at the lowest framerate among `streams`, rounded down to whole
/// microseconds.
pub fn default_tolerance_us(streams: &[StreamInfo]) -> i64 {
    streams
        .iter()
        .map(|s| s.fps.frame_duration_us())
        .max()
        .unwrap_or(0)
        / 2
}

/// Running totals of what the synchronizer did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Frame sets emitted (including degraded ones).
    pub emitted: u64,
    /// Reference frames discarded under [`GapPolicy::Drop`].
    pub dropped: u64,
    /// Degraded sets emitted under [`GapPolicy::DuplicateNearest`].
    pub duplicated: u64,
}

struct Lane<I> {
    frames: I,
    buf: VecDeque<RawFrame>,
    exhausted: bool,
    /// Frames pulled from the stream so far.
    pulled: u64,
}

/// Groups frames from N streams into timestamp-matched sets.
///
/// Each round takes the earliest buffered frame across all streams as the reference and picks,
/// per stream, the buffered frame closest to it. Sets within tolerance consume their members.
/// Iteration ends as soon as any stream runs dry. A set is only emitted while every stream has
/// delivered more frames than there are sets, so reused frames under
/// [`GapPolicy::DuplicateNearest`] never stretch the output past the shortest stream.
pub struct FrameSynchronizer<I> {
    lanes: Vec<Lane<I>>,
    cfg: SyncConfig,
    next_seq: u64,
    stats: SyncStats,
    diagnostics: Option<Arc<Diagnostics>>,
    finished: bool,
}

impl<I> FrameSynchronizer<I>
where
    I: Iterator<Item = StitchResult<RawFrame>>,
{
    /// Synchronize `streams` (in stream order).
    pub fn new(streams: Vec<I>, cfg: SyncConfig) -> Self {
        let lanes = streams
            .into_iter()
            .map(|frames| Lane {
                frames,
                buf: VecDeque::with_capacity(cfg.lookahead),
                exhausted: false,
                pulled: 0,
            })
            .collect();
        Self {
            lanes,
            cfg: SyncConfig {
                lookahead: cfg.lookahead.max(1),
                ..cfg
            },
            next_seq: 0,
            stats: SyncStats::default(),
            diagnostics: None,
            finished: false,
        }
    }

    /// Mirror counters into shared job diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Totals so far.
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Next matched set, `Ok(None)` at the end.
    ///
    /// Errors from any stream are returned as-is. Ending without a single set is
    /// [`StitchError::SyncExhausted`].
    pub fn next_set(&mut self) -> StitchResult<Option<SynchronizedFrameSet>> {
        if self.finished {
            return Ok(None);
        }
        if self.lanes.is_empty() {
            self.finished = true;
            return Err(StitchError::sync_exhausted("no input streams"));
        }

        loop {
            if let Err(e) = self.fill() {
                self.finished = true;
                return Err(e);
            }
            if let Some(dry) = self.lanes.iter().position(|l| l.buf.is_empty()) {
                return self.end(dry);
            }

            let (ref_lane, ref_pts) = self.reference();
            let picks: SmallVec<[usize; 2]> = self
                .lanes
                .iter()
                .map(|l| closest(&l.buf, ref_pts))
                .collect();
            let skew = self
                .lanes
                .iter()
                .zip(&picks)
                .map(|(l, &i)| l.buf[i].pts.abs_diff(ref_pts))
                .max()
                .unwrap_or(0);

            match self.short_lane() {
                Ok(Some(short)) => return self.end(short),
                Ok(None) => {}
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }

            if skew <= self.cfg.tolerance_us {
                return Ok(Some(self.emit(&picks, ref_pts, skew, false)));
            }

            match self.cfg.gap_policy {
                GapPolicy::Drop => {
                    let dropped = self.lanes[ref_lane].buf.remove(picks[ref_lane]);
                    self.stats.dropped += 1;
                    if let Some(d) = &self.diagnostics {
                        d.record_set_dropped();
                    }
                    if let Some(f) = dropped {
                        tracing::debug!(
                            stream = %f.stream,
                            index = f.index,
                            pts_us = f.pts.0,
                            skew_us = skew,
                            "dropping unmatched reference frame"
                        );
                    }
                }
                GapPolicy::DuplicateNearest => {
                    self.stats.duplicated += 1;
                    if let Some(d) = &self.diagnostics {
                        d.record_set_duplicated();
                    }
                    return Ok(Some(self.emit(&picks, ref_pts, skew, true)));
                }
            }
        }
    }

    fn fill(&mut self) -> StitchResult<()> {
        let lookahead = self.cfg.lookahead;
        for lane in &mut self.lanes {
            while !lane.exhausted && lane.buf.len() < lookahead {
                lane.pull()?;
            }
        }
        Ok(())
    }

    /// First stream that cannot supply a frame for one more set, pulling past the look-ahead if
    /// reused frames have used up what is buffered.
    fn short_lane(&mut self) -> StitchResult<Option<usize>> {
        let need = self.stats.emitted + 1;
        for (i, lane) in self.lanes.iter_mut().enumerate() {
            while lane.pulled < need && !lane.exhausted {
                lane.pull()?;
            }
            if lane.pulled < need {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn end(&mut self, stream: usize) -> StitchResult<Option<SynchronizedFrameSet>> {
        self.finished = true;
        if self.stats.emitted == 0 {
            return Err(StitchError::sync_exhausted(format!(
                "stream #{stream} ended before any frames could be matched \
                 ({} reference frames dropped)",
                self.stats.dropped
            )));
        }
        tracing::debug!(stream, stats = ?self.stats, "synchronizer finished");
        Ok(None)
    }

    /// Lane holding the earliest buffered frame (lowest lane on ties) and that frame's timestamp.
    fn reference(&self) -> (usize, Timestamp) {
        let mut best = (0, Timestamp(i64::MAX));
        for (i, lane) in self.lanes.iter().enumerate() {
            if let Some(min) = lane.buf.iter().map(|f| f.pts).min()
                && min < best.1
            {
                best = (i, min);
            }
        }
        best
    }

    /// Build the set. In degraded mode members outside tolerance stay buffered for reuse.
    fn emit(
        &mut self,
        picks: &[usize],
        ref_pts: Timestamp,
        skew_us: i64,
        degraded: bool,
    ) -> SynchronizedFrameSet {
        let tol = self.cfg.tolerance_us;
        let mut frames = SmallVec::new();
        for (lane, &i) in self.lanes.iter_mut().zip(picks) {
            let within = lane.buf[i].pts.abs_diff(ref_pts) <= tol;
            if !degraded || within {
                if let Some(f) = lane.buf.remove(i) {
                    frames.push(f);
                }
            } else {
                frames.push(lane.buf[i].clone());
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.stats.emitted += 1;
        if let Some(d) = &self.diagnostics {
            d.record_set_emitted();
        }
        SynchronizedFrameSet {
            seq,
            pts: ref_pts,
            frames,
            skew_us,
            degraded,
        }
    }
}

impl<I> Lane<I>
where
    I: Iterator<Item = StitchResult<RawFrame>>,
{
    fn pull(&mut self) -> StitchResult<()> {
        match self.frames.next() {
            Some(Ok(frame)) => {
                self.pulled += 1;
                self.buf.push_back(frame);
            }
            Some(Err(e)) => return Err(e),
            None => self.exhausted = true,
        }
        Ok(())
    }
}

/// Index of the buffered frame closest to `target` (earliest on ties).
fn closest(buf: &VecDeque<RawFrame>, target: Timestamp) -> usize {
    let mut best = 0;
    let mut best_d = i64::MAX;
    for (i, f) in buf.iter().enumerate() {
        let d = f.pts.abs_diff(target);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

impl<I> Iterator for FrameSynchronizer<I>
where
    I: Iterator<Item = StitchResult<RawFrame>>,
{
    type Item = StitchResult<SynchronizedFrameSet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_set().transpose()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/synchronizer.rs"]
mod tests;
