use super::*;
use crate::foundation::core::Canvas;
use crate::foundation::error::ErrorKind;
use crate::test_support::{dual_projections, solid_set, textured_set};

#[test]
fn static_template_is_identity() {
    let projections = dual_projections(Canvas::new(128, 64), 8);
    let strategy = StaticTemplate::new(projections.clone());
    let fields = strategy.compute_fields(&textured_set(7, 0.0)).unwrap();
    assert_eq!(fields.len(), 2);
    for (i, f) in fields.iter().enumerate() {
        assert_eq!(f.stream, StreamId(i as u16));
        assert_eq!(f.seq, 7);
        assert_eq!(f.confidence, 1.0);
        assert!(f.is_identity());
    }
}

#[test]
fn static_template_rejects_mismatched_sets() {
    let projections = dual_projections(Canvas::new(128, 64), 8);
    let mut set = solid_set(0, [1, 2, 3, 255]);
    set.frames.truncate(1);
    let err = StaticTemplate::new(projections).compute_fields(&set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn factory_follows_stitch_mode() {
    let projections = dual_projections(Canvas::new(128, 64), 8);
    let mut job = StitchJob::dual_fisheye_8k("a.mp4", "b.mp4", "out.mp4");

    job.stitch_mode = StitchMode::StaticTemplate;
    let s = build_strategy(&job, projections.clone(), None).unwrap();
    assert_eq!(s.name(), "static_template");

    job.stitch_mode = StitchMode::OpticalFlow;
    let s = build_strategy(&job, projections.clone(), None).unwrap();
    assert_eq!(s.name(), "optical_flow");

    job.stitch_mode = StitchMode::AiFlow;
    let err = build_strategy(&job, projections, None).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
