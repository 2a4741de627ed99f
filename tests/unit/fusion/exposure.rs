use super::*;
use crate::align::overlap::overlap_pairs;
use crate::foundation::core::{Canvas, StreamId, Timestamp};
use crate::test_support::{SRC, dual_projections};

fn frames(front: u8, back: u8) -> Vec<RawFrame> {
    vec![
        RawFrame::solid(StreamId(0), 0, Timestamp::ZERO, SRC, SRC, [front, front, front, 255]),
        RawFrame::solid(StreamId(1), 0, Timestamp::ZERO, SRC, SRC, [back, back, back, 255]),
    ]
}

#[test]
fn gains_meet_at_the_common_mean() {
    let projections = dual_projections(Canvas::new(128, 64), 8);
    let pairs = overlap_pairs(&projections);
    let g = overlap_gains(&projections, &pairs, &frames(100, 50));
    assert_eq!(g[0], [0.75; 3]);
    assert_eq!(g[1], [1.5; 3]);
}

#[test]
fn gains_are_clamped_and_dark_lenses_untouched() {
    let projections = dual_projections(Canvas::new(128, 64), 8);
    let pairs = overlap_pairs(&projections);
    let g = overlap_gains(&projections, &pairs, &frames(200, 20));
    assert!((g[0][0] - 0.55).abs() < 1e-6);
    assert_eq!(g[1][0], MAX_GAIN);

    let g = overlap_gains(&projections, &pairs, &frames(120, 0));
    assert_eq!(g[1], [1.0; 3]);
    assert_eq!(g[0], [0.5; 3]);

    assert_eq!(overlap_gains(&projections, &[], &frames(10, 20)), vec![[1.0; 3]; 2]);
}
