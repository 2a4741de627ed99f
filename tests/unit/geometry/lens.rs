use super::*;

fn close(a: [f64; 3], b: [f64; 3]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
}

#[test]
fn dual_fisheye_places_lenses_back_to_back() {
    let rig = RigGeometry::dual_fisheye(&[
        StreamLocator::front("a_00_.insv"),
        StreamLocator::back("a_10_.insv"),
    ]);
    assert_eq!(rig.len(), 2);
    assert_eq!(rig.lenses[0].yaw_deg, 0.0);
    assert_eq!(rig.lenses[1].yaw_deg, 180.0);
    assert!(rig.lenses.iter().all(|l| l.fov_deg == DUAL_FISHEYE_FOV_DEG));
}

#[test]
fn world_to_lens_maps_the_optical_axis_to_plus_z() {
    let lens = LensGeometry::centered(90.0, 200.0);
    let local = lens.world_to_lens().apply([1.0, 0.0, 0.0]);
    assert!(close(local, [0.0, 0.0, 1.0]));

    let mut tilted = LensGeometry::centered(0.0, 200.0);
    tilted.pitch_deg = 90.0;
    let local = tilted.world_to_lens().apply([0.0, 1.0, 0.0]);
    assert!(close(local, [0.0, 0.0, 1.0]));
}

#[test]
fn back_lens_sees_world_left_on_its_right() {
    let lens = LensGeometry::centered(180.0, 200.0);
    let local = lens.world_to_lens().apply([-1.0, 0.0, 0.0]);
    assert!(close(local, [1.0, 0.0, 0.0]));
}

#[test]
fn rotation_transpose_is_inverse() {
    let m = Mat3::rot_y(0.3).mul(&Mat3::rot_x(-0.2)).mul(&Mat3::rot_z(1.1));
    let id = m.mul(&m.transpose());
    for (i, row) in id.0.iter().enumerate() {
        assert!(close(*row, Mat3::IDENTITY.0[i]));
    }
}

#[test]
fn guard_profiles_shrink_the_image_circle() {
    assert_eq!(AccessoryProfile::for_guard(None), AccessoryProfile::NONE);
    let std = AccessoryProfile::for_guard(Some(LensGuard::Standard));
    let prem = AccessoryProfile::for_guard(Some(LensGuard::Premium));
    assert!(std.radial_scale < prem.radial_scale && prem.radial_scale < 1.0);
    assert!(std.fov_trim_deg > prem.fov_trim_deg);
}

#[test]
fn lens_json_fills_centre_defaults() {
    let lens: LensGeometry = serde_json::from_str(r#"{"yaw_deg":180.0,"fov_deg":190.0}"#).unwrap();
    assert_eq!(lens.center_x, 0.5);
    assert_eq!(lens.radius, 1.0);
    assert_eq!(lens.roll_deg, 0.0);
}
