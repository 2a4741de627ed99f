use super::*;

#[test]
fn smoothstep_is_clamped_and_symmetric() {
    assert_eq!(smoothstep(-1.0), 0.0);
    assert_eq!(smoothstep(2.0), 1.0);
    assert!((smoothstep(0.5) - 0.5).abs() < 1e-6);
    assert!((smoothstep(0.25) + smoothstep(0.75) - 1.0).abs() < 1e-6);
}

#[test]
fn parabola_vertex_finds_offset_minimum() {
    // f(x) = (x - 0.25)^2 sampled at -1, 0, 1.
    let f = |x: f32| (x - 0.25) * (x - 0.25);
    let v = parabola_vertex(f(-1.0), f(0.0), f(1.0));
    assert!((v - 0.25).abs() < 1e-5);
    assert_eq!(parabola_vertex(1.0, 1.0, 1.0), 0.0);
}

#[test]
fn grid_tap_interpolates_and_wraps() {
    // 3x2 grid, last column duplicates the first (period 2).
    let values = [0.0, 10.0, 0.0, 20.0, 30.0, 20.0];
    let tap = GridTap::new(3, 2, 0.5, 0.5, false);
    assert!((tap.apply(&values) - 15.0).abs() < 1e-5);

    let wrapped = GridTap::new(3, 2, 2.5, 0.0, true);
    let direct = GridTap::new(3, 2, 0.5, 0.0, true);
    assert!((wrapped.apply(&values) - direct.apply(&values)).abs() < 1e-5);
}

#[test]
fn bilinear_sample_of_uniform_image_is_exact() {
    let data: Vec<u8> = [12u8, 200, 77, 255].repeat(9);
    let px = sample_rgba8_bilinear(&data, 3, 3, 1.37, 0.61);
    assert_eq!(px.map(|c| c.round() as u8), [12, 200, 77, 255]);
}
