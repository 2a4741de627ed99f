use super::*;
use crate::foundation::core::{Fps, StreamId};
use crate::foundation::error::ErrorKind;

const FRAME_US: i64 = 33_333;

type Stream = std::vec::IntoIter<StitchResult<RawFrame>>;

fn stream(id: u16, pts: &[i64]) -> Stream {
    pts.iter()
        .enumerate()
        .map(|(i, &t)| {
            Ok(RawFrame::solid(
                StreamId(id),
                i as u64,
                Timestamp(t),
                1,
                1,
                [0, 0, 0, 255],
            ))
        })
        .collect::<Vec<_>>()
        .into_iter()
}

fn regular(id: u16, start: i64, n: usize) -> Stream {
    let pts: Vec<i64> = (0..n as i64).map(|i| start + i * FRAME_US).collect();
    stream(id, &pts)
}

fn cfg(policy: GapPolicy) -> SyncConfig {
    SyncConfig {
        lookahead: 4,
        tolerance_us: FRAME_US / 2,
        gap_policy: policy,
    }
}

fn collect(sync: FrameSynchronizer<Stream>) -> Vec<SynchronizedFrameSet> {
    sync.collect::<StitchResult<Vec<_>>>().unwrap()
}

#[test]
fn identical_timestamps_pair_one_to_one() {
    let sync = FrameSynchronizer::new(
        vec![regular(0, 0, 10), regular(1, 0, 10)],
        cfg(GapPolicy::Drop),
    );
    let sets = collect(sync);
    assert_eq!(sets.len(), 10);
    for (i, s) in sets.iter().enumerate() {
        assert_eq!(s.seq, i as u64);
        assert_eq!(s.skew_us, 0);
        assert!(!s.degraded);
        assert_eq!(s.frames[0].index, s.frames[1].index);
        assert_eq!(s.frames[0].stream, StreamId(0));
        assert_eq!(s.frames[1].stream, StreamId(1));
    }
}

#[test]
fn start_offset_drops_leading_reference_frames() {
    let sync = FrameSynchronizer::new(
        vec![regular(0, 0, 30), regular(1, 3 * FRAME_US + 4_000, 30)],
        cfg(GapPolicy::Drop),
    );
    let sets = collect(sync);
    assert_eq!(sets.len(), 27);
    assert!(sets.iter().all(|s| s.skew_us <= FRAME_US / 2));
    assert_eq!(sets[0].frames[0].index, 3);
    assert_eq!(sets[0].frames[1].index, 0);
}

#[test]
fn output_never_exceeds_the_shortest_stream() {
    let sync = FrameSynchronizer::new(
        vec![regular(0, 0, 12), regular(1, 2_000, 7)],
        cfg(GapPolicy::Drop),
    );
    let sets = collect(sync);
    assert_eq!(sets.len(), 7);
    assert!(sets.iter().all(|s| s.skew_us == 2_000));
}

#[test]
fn missing_frame_under_drop_policy_skips_the_set() {
    let mut b: Vec<i64> = (0..10).map(|i| i * FRAME_US).collect();
    b.remove(5);
    let mut sync = FrameSynchronizer::new(
        vec![regular(0, 0, 10), stream(1, &b)],
        cfg(GapPolicy::Drop),
    );
    let sets: Vec<_> = sync.by_ref().collect::<StitchResult<_>>().unwrap();
    assert_eq!(sets.len(), 9);
    assert_eq!(sync.stats().dropped, 1);
    assert!(sets.iter().all(|s| s.skew_us <= FRAME_US / 2));
    let seqs: Vec<u64> = sets.iter().map(|s| s.seq).collect();
    assert_eq!(seqs, (0..9).collect::<Vec<_>>());
}

#[test]
fn missing_frame_under_duplicate_policy_emits_a_degraded_set() {
    let mut b: Vec<i64> = (0..10).map(|i| i * FRAME_US).collect();
    b.remove(5);
    let diag = Arc::new(Diagnostics::new());
    let sync = FrameSynchronizer::new(
        vec![regular(0, 0, 10), stream(1, &b)],
        cfg(GapPolicy::DuplicateNearest),
    )
    .with_diagnostics(Arc::clone(&diag));
    let sets = collect(sync);
    // Stream 1 has nine frames, so the reused one costs the final set.
    assert_eq!(sets.len(), 9);
    let degraded: Vec<_> = sets.iter().filter(|s| s.degraded).collect();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].frames[0].index, 5);
    // The lagging stream's next frame is reused by the following set.
    assert_eq!(sets[5].frames[1].index, sets[6].frames[1].index);
    assert_eq!(diag.snapshot().sets_duplicated, 1);
    assert_eq!(diag.snapshot().sets_emitted, 9);
}

#[test]
fn reused_frames_never_outnumber_the_sparse_stream() {
    let sparse = stream(0, &[0, 30 * FRAME_US, 60 * FRAME_US]);
    let sets = collect(FrameSynchronizer::new(
        vec![sparse, regular(1, 0, 10)],
        cfg(GapPolicy::DuplicateNearest),
    ));
    assert_eq!(sets.len(), 3);
    assert!(!sets[0].degraded);
    assert!(sets[1..].iter().all(|s| s.degraded));
    assert!(sets.iter().all(|s| s.frames.len() == 2));
    assert_eq!(
        sets.iter().map(|s| s.seq).collect::<Vec<_>>(),
        [0, 1, 2]
    );
}

#[test]
fn duplicate_policy_stops_at_the_shortest_stream() {
    for (a, b) in [(10, 4), (4, 10)] {
        let sets = collect(FrameSynchronizer::new(
            vec![regular(0, 0, a), regular(1, 5 * FRAME_US / 4, b)],
            cfg(GapPolicy::DuplicateNearest),
        ));
        assert!(sets.len() <= a.min(b), "{a} vs {b}: {}", sets.len());
    }
}

#[test]
fn tolerance_bound_is_inclusive_on_both_sides() {
    let tol = FRAME_US / 2;
    for offset in [tol, -tol] {
        let base = 10 * FRAME_US;
        let sets = collect(FrameSynchronizer::new(
            vec![regular(0, base, 3), regular(1, base + offset, 3)],
            cfg(GapPolicy::Drop),
        ));
        assert_eq!(sets.len(), 3, "offset {offset}");
        assert!(sets.iter().all(|s| s.skew_us == tol && !s.degraded));
    }

    let mut past = FrameSynchronizer::new(
        vec![stream(0, &[0]), stream(1, &[tol + 1])],
        cfg(GapPolicy::Drop),
    );
    assert_eq!(past.next_set().unwrap_err().kind(), ErrorKind::SyncExhausted);
}

#[test]
fn mixed_rate_tolerance_matches_at_exactly_half_the_slow_frame() {
    let info = |num| StreamInfo {
        width: 1,
        height: 1,
        fps: Fps::new(num, 1).unwrap(),
        start: Timestamp::ZERO,
        frame_count: None,
    };
    let tol = default_tolerance_us(&[info(30), info(24)]);
    let config = SyncConfig {
        lookahead: 4,
        tolerance_us: tol,
        gap_policy: GapPolicy::Drop,
    };
    for (a, b) in [(0, tol), (tol, 0)] {
        let sets = collect(FrameSynchronizer::new(
            vec![stream(0, &[a]), stream(1, &[b])],
            config,
        ));
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].skew_us, tol);
    }
}

#[test]
fn stream_errors_are_returned() {
    let mut bad: Vec<StitchResult<RawFrame>> = regular(1, 0, 2).collect();
    bad.push(Err(StitchError::stream_aborted(StreamId(1), "gone")));
    let mut sync = FrameSynchronizer::new(
        vec![regular(0, 0, 5), bad.into_iter()],
        cfg(GapPolicy::Drop),
    );
    let err = sync.next_set().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StreamAborted);
    assert!(sync.next_set().unwrap().is_none());
}

#[test]
fn no_matchable_frames_is_sync_exhausted() {
    let mut sync = FrameSynchronizer::new(
        vec![regular(0, 0, 5), regular(1, 10_000_000, 5)],
        cfg(GapPolicy::Drop),
    );
    assert_eq!(sync.next_set().unwrap_err().kind(), ErrorKind::SyncExhausted);

    let mut empty =
        FrameSynchronizer::new(vec![regular(0, 0, 5), stream(1, &[])], cfg(GapPolicy::Drop));
    assert_eq!(empty.next_set().unwrap_err().kind(), ErrorKind::SyncExhausted);
}

#[test]
fn lookahead_finds_the_closest_out_of_order_frame() {
    let a = regular(0, 0, 3);
    let b = stream(1, &[2 * FRAME_US, 0, FRAME_US]);
    let sets = collect(FrameSynchronizer::new(vec![a, b], cfg(GapPolicy::Drop)));
    assert_eq!(sets.len(), 3);
    assert!(sets.iter().all(|s| s.skew_us == 0));
}

#[test]
fn default_tolerance_is_half_the_slowest_frame() {
    let info = |num, den| StreamInfo {
        width: 1,
        height: 1,
        fps: Fps::new(num, den).unwrap(),
        start: Timestamp::ZERO,
        frame_count: None,
    };
    assert_eq!(default_tolerance_us(&[info(30, 1), info(24, 1)]), 20_833);

    let tuning = Tuning {
        skew_tolerance_us: Some(5_000),
        ..Tuning::default()
    };
    assert_eq!(
        SyncConfig::for_streams(&[info(30, 1)], &tuning).tolerance_us,
        5_000
    );
}
