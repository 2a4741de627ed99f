use super::*;
use crate::foundation::core::Timestamp;
use crate::job::model::{LensGuard, StreamLocator};

fn dual_set(canvas: Canvas) -> ProjectionSet {
    let rig = RigGeometry::dual_fisheye(&[StreamLocator::front("f"), StreamLocator::back("b")]);
    ProjectionSet::build(canvas, 8, &rig, AccessoryProfile::NONE, &[(64, 64), (64, 64)]).unwrap()
}

#[test]
fn canvas_centre_hits_front_optical_axis() {
    let set = dual_set(Canvas::new(128, 64));
    let s = set.map(0).lookup(Point::new(64.0, 32.0));
    assert!(s.rho.abs() < 1e-3);
    assert!((s.x - 31.5).abs() < 1e-3);
    assert!((s.y - 31.5).abs() < 1e-3);

    let back = set.map(1).lookup(Point::new(64.0, 32.0));
    assert!((back.rho - 1.8).abs() < 1e-3);
    assert!(!set.map(1).covers(back));
}

#[test]
fn side_longitudes_are_covered_by_both_lenses() {
    let set = dual_set(Canvas::new(128, 64));
    let p = Point::new(96.0, 32.0);
    for map in set.maps() {
        let s = map.lookup(p);
        assert!((s.rho - 0.9).abs() < 1e-3, "rho {}", s.rho);
        assert!(map.covers(s));
    }
    assert_eq!(set.nearest_lens(Point::new(64.0, 32.0)), 0);
    assert_eq!(set.nearest_lens(Point::new(0.0, 32.0)), 1);
}

#[test]
fn front_lens_right_side_maps_to_image_right() {
    let set = dual_set(Canvas::new(128, 64));
    let s = set.map(0).lookup(Point::new(80.0, 32.0));
    assert!(s.x > 31.5);
    let up = set.map(0).lookup(Point::new(64.0, 16.0));
    assert!(up.y < 31.5);
}

#[test]
fn guard_profile_pulls_samples_toward_the_centre() {
    let rig = RigGeometry::dual_fisheye(&[StreamLocator::front("f"), StreamLocator::back("b")]);
    let canvas = Canvas::new(128, 64);
    let bare = ProjectionSet::build(canvas, 8, &rig, AccessoryProfile::NONE, &[(64, 64); 2]).unwrap();
    let guarded = ProjectionSet::build(
        canvas,
        8,
        &rig,
        AccessoryProfile::for_guard(Some(LensGuard::Standard)),
        &[(64, 64); 2],
    )
    .unwrap();
    let p = Point::new(90.0, 32.0);
    let a = bare.map(0).lookup(p);
    let b = guarded.map(0).lookup(p);
    assert!(b.rho > a.rho);
}

#[test]
fn lens_count_must_match_streams() {
    let rig = RigGeometry::dual_fisheye(&[StreamLocator::front("f"), StreamLocator::back("b")]);
    let err = ProjectionSet::build(Canvas::new(64, 32), 8, &rig, AccessoryProfile::NONE, &[(8, 8)])
        .unwrap_err();
    assert!(matches!(err, StitchError::Configuration(_)));
}

#[test]
fn thumbnail_of_uniform_frames_is_uniform() {
    let set = dual_set(Canvas::new(128, 64));
    let gray = [100, 100, 100, 255];
    let frames: Vec<RawFrame> = (0..2)
        .map(|i| RawFrame::solid(StreamId(i), 0, Timestamp::ZERO, 64, 64, gray))
        .collect();
    let thumb = set.render_gray_thumbnail(&frames, 16, 8);
    assert_eq!(thumb.len(), 128);
    assert!(thumb.iter().all(|v| (v - 100.0).abs() < 1e-3));
}

#[test]
fn clamp_to_circle_lands_on_the_rim() {
    let set = dual_set(Canvas::new(128, 64));
    let map = set.map(1);
    let outside = map.lookup(Point::new(64.0, 32.0));
    let clamped = map.clamp_to_circle(outside);
    assert_eq!(clamped.rho, 1.0);
    let r_out = ((outside.x - 31.5).powi(2) + (outside.y - 31.5).powi(2)).sqrt();
    let r_in = ((clamped.x - 31.5).powi(2) + (clamped.y - 31.5).powi(2)).sqrt();
    assert!((r_in - r_out / outside.rho).abs() < 1e-3);

    let inside = set.map(0).lookup(Point::new(64.0, 32.0));
    assert_eq!(set.map(0).clamp_to_circle(inside), inside);
}
