use super::*;
use crate::align::strategy::identity_fields;
use crate::foundation::core::{Canvas, StreamId, Timestamp};
use crate::foundation::error::ErrorKind;
use crate::source::RawFrame;
use crate::test_support::{SRC, dual_projections, frame_set, solid_set, textured_set};
use smallvec::smallvec;

fn engine(blend: bool, exposure: bool) -> (FusionEngine, Arc<ProjectionSet>) {
    let projections = dual_projections(Canvas::new(128, 64), 8);
    let cfg = FusionConfig {
        blend,
        blend_band: 0.1,
        exposure_compensation: exposure,
    };
    (FusionEngine::new(cfg, projections.clone()), projections)
}

fn two_colours(front: [u8; 4], back: [u8; 4]) -> SynchronizedFrameSet {
    frame_set(
        0,
        smallvec![
            RawFrame::solid(StreamId(0), 0, Timestamp::ZERO, SRC, SRC, front),
            RawFrame::solid(StreamId(1), 0, Timestamp::ZERO, SRC, SRC, back),
        ],
    )
}

fn assert_uniform(frame: &PanoramicFrame, rgba: [u8; 4]) {
    for (i, px) in frame.data.chunks_exact(4).enumerate() {
        assert_eq!(px, rgba, "pixel {i}");
    }
}

#[test]
fn identical_solid_inputs_reproduce_the_colour_without_fusion() {
    let (engine, projections) = engine(false, false);
    let set = solid_set(4, [37, 141, 250, 255]);
    let frame = engine.fuse(&set, &identity_fields(&projections, 4)).unwrap();
    assert_eq!((frame.seq, frame.width, frame.height), (4, 128, 64));
    assert_eq!(frame.pts, set.pts);
    assert_uniform(&frame, [37, 141, 250, 255]);
}

#[test]
fn identical_solid_inputs_reproduce_the_colour_with_fusion() {
    let (engine, projections) = engine(true, false);
    let frame = engine
        .fuse(&solid_set(0, [90, 90, 90, 255]), &identity_fields(&projections, 0))
        .unwrap();
    assert_uniform(&frame, [90, 90, 90, 255]);
}

#[test]
fn nearest_lens_wins_without_fusion() {
    let (engine, projections) = engine(false, false);
    let set = two_colours([200, 0, 0, 255], [0, 0, 200, 255]);
    let frame = engine.fuse(&set, &identity_fields(&projections, 0)).unwrap();
    assert_eq!(frame.pixel(64, 32), [200, 0, 0, 255]);
    assert_eq!(frame.pixel(0, 32), [0, 0, 200, 255]);
    assert_eq!(frame.pixel(127, 32), [0, 0, 200, 255]);
    // no blended values anywhere
    for px in frame.data.chunks_exact(4) {
        assert!(px == [200, 0, 0, 255] || px == [0, 0, 200, 255], "{px:?}");
    }
}

#[test]
fn seam_is_blended_with_fusion() {
    let (engine, projections) = engine(true, false);
    let set = two_colours([200, 200, 200, 255], [0, 0, 0, 255]);
    let frame = engine.fuse(&set, &identity_fields(&projections, 0)).unwrap();
    assert_eq!(frame.pixel(64, 32)[0], 200);
    assert_eq!(frame.pixel(0, 32)[0], 0);
    let seam = frame.pixel(32, 32)[0];
    assert!(seam > 0 && seam < 200, "seam {seam}");
}

#[test]
fn exposure_compensation_equalizes_lenses() {
    let (engine, projections) = engine(true, true);
    let set = two_colours([100, 100, 100, 255], [50, 50, 50, 255]);
    let frame = engine.fuse(&set, &identity_fields(&projections, 0)).unwrap();
    assert_uniform(&frame, [75, 75, 75, 255]);
}

#[test]
fn fields_move_the_sampling_position() {
    let (engine, projections) = engine(true, false);
    let set = textured_set(0, 0.0);
    let identity = identity_fields(&projections, 0);
    let mut shifted = identity.clone();
    shifted[0].dx.iter_mut().for_each(|v| *v = 6.0);

    let a = engine.fuse(&set, &identity).unwrap();
    let b = engine.fuse(&set, &shifted).unwrap();
    assert_ne!(a.data, b.data);
    // the back lens interior is untouched by the front field
    assert_eq!(a.pixel(2, 32), b.pixel(2, 32));

    let again = engine.fuse(&set, &identity).unwrap();
    assert_eq!(a, again);
}

#[test]
fn field_count_must_match() {
    let (engine, projections) = engine(true, false);
    let mut fields = identity_fields(&projections, 0);
    fields.pop();
    let err = engine.fuse(&solid_set(0, [0; 4]), &fields).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
