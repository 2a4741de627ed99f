use super::*;
use crate::align::strategy::identity_fields;
use crate::foundation::core::Canvas;
use crate::test_support::{dual_projections, textured_set};

fn column_pair(grid: &FieldGrid, col: usize) -> OverlapPair {
    OverlapPair {
        a: 0,
        b: 1,
        nodes: (0..grid.rows).map(|r| grid.index(col, r)).collect(),
    }
}

fn good(d: (f32, f32)) -> NodeMatch {
    NodeMatch {
        d,
        textured: true,
        good: true,
    }
}

#[test]
fn contrast_is_mean_absolute_deviation() {
    assert_eq!(contrast(&[7.0; 9]), 0.0);
    let checker = [0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0];
    let mean = 40.0 / 9.0;
    let expected = (5.0 * mean + 4.0 * (10.0 - mean)) / 9.0;
    assert!((contrast(&checker) - expected).abs() < 1e-5);
}

#[test]
fn confidence_counts_good_among_textured() {
    assert_eq!(match_confidence(&[], 8), 1.0);

    let mut matches = vec![NodeMatch::default(); 4];
    matches.extend((0..6).map(|_| good((0.0, 0.0))));
    matches.extend((0..4).map(|_| NodeMatch {
        textured: true,
        ..NodeMatch::default()
    }));
    assert!((match_confidence(&matches, 8) - 0.6).abs() < 1e-6);

    // too few textured nodes to judge
    assert_eq!(match_confidence(&matches[..9], 8), 1.0);
}

#[test]
fn regularize_fills_bad_nodes_from_vertical_neighbours() {
    let grid = FieldGrid::new(Canvas::new(64, 32), 8).unwrap();
    let pair = column_pair(&grid, 4);
    let mut matches: Vec<NodeMatch> = (0..grid.rows).map(|_| good((2.0, -1.0))).collect();
    matches[2] = NodeMatch::default();

    let disp = regularize_vertical(&grid, &pair, &matches);
    assert_eq!(disp.len(), grid.rows);
    for d in disp {
        assert!((d.0 - 2.0).abs() < 1e-6 && (d.1 + 1.0).abs() < 1e-6, "{d:?}");
    }

    let none = vec![NodeMatch::default(); grid.rows];
    assert!(
        regularize_vertical(&grid, &pair, &none)
            .iter()
            .all(|d| *d == (0.0, 0.0))
    );
}

#[test]
fn distribute_splits_and_tapers() {
    let grid = FieldGrid::new(Canvas::new(64, 32), 8).unwrap();
    let pair = column_pair(&grid, 4);
    let disp = vec![(4.0, 0.0); grid.rows];
    let projections = dual_projections(Canvas::new(64, 32), 8);
    let mut fields = identity_fields(&projections, 0);

    distribute(&grid, &pair, &disp, 2, &mut fields);

    let at = |s: usize, col: usize| fields[s].dx[grid.index(col, 1)];
    assert!((at(0, 4) + 2.0).abs() < 1e-6);
    assert!((at(1, 4) - 2.0).abs() < 1e-6);
    for col in [3, 5] {
        assert!((at(0, col) + 4.0 / 3.0).abs() < 1e-5);
        assert!((at(1, col) - 4.0 / 3.0).abs() < 1e-5);
    }
    for col in [2, 6] {
        assert!((at(1, col) - 2.0 / 3.0).abs() < 1e-5);
    }
    for col in [0, 1, 7] {
        assert_eq!(at(0, col), 0.0);
        assert_eq!(at(1, col), 0.0);
    }
    assert!(fields.iter().all(|f| f.dy.iter().all(|v| *v == 0.0)));
}

#[test]
fn distribute_taper_wraps_across_longitude_seam() {
    let grid = FieldGrid::new(Canvas::new(64, 32), 8).unwrap();
    let pair = column_pair(&grid, 0);
    let disp = vec![(2.0, 0.0); grid.rows];
    let projections = dual_projections(Canvas::new(64, 32), 8);
    let mut fields = identity_fields(&projections, 0);

    distribute(&grid, &pair, &disp, 1, &mut fields);
    let left = grid.wrap_col(0, -1);
    assert!((fields[1].dx[grid.index(left, 0)] - 0.5).abs() < 1e-6);
    assert!((fields[1].dx[grid.index(1, 0)] - 0.5).abs() < 1e-6);
}

#[test]
fn overlap_excludes_wrap_column_and_lens_interiors() {
    let projections = dual_projections(Canvas::new(256, 128), 8);
    let pairs = overlap_pairs(&projections);
    assert_eq!(pairs.len(), 1);
    let grid = projections.grid();
    let pair = &pairs[0];
    assert!(!pair.nodes.is_empty());
    assert!(pair.nodes.iter().all(|&i| grid.col_row(i).0 < grid.cols - 1));

    // canvas centre (front axis) and the left edge (back axis) are single-lens
    let mid = grid.index((grid.cols - 1) / 2, (grid.rows - 1) / 2);
    let back = grid.index(0, (grid.rows - 1) / 2);
    assert!(!pair.nodes.contains(&mid));
    assert!(!pair.nodes.contains(&back));
}

#[test]
fn check_set_rejects_wrong_shape() {
    let projections = dual_projections(Canvas::new(64, 32), 8);
    let mut set = textured_set(0, 0.0);
    assert!(check_set(&set, &projections).is_ok());

    set.frames.pop();
    let err = check_set(&set, &projections).unwrap_err();
    assert_eq!(err.kind(), crate::foundation::error::ErrorKind::Configuration);
}

#[test]
fn block_match_finds_near_zero_offset_on_aligned_views() {
    let projections = dual_projections(Canvas::new(1024, 512), 8);
    let set = textured_set(0, 0.0);
    let pair = &overlap_pairs(&projections)[0];
    let grid = projections.grid();
    let va = ProjectedView::new(grid.canvas, projections.map(0), &set.frames[0]);
    let vb = ProjectedView::new(grid.canvas, projections.map(1), &set.frames[1]);

    let matches = match_pair(grid, pair, &va, &vb, &MatchParams::for_stride(8));
    let accepted: Vec<&NodeMatch> = matches.iter().filter(|m| m.good).collect();
    assert!(!accepted.is_empty());
    let mean_abs =
        accepted.iter().map(|m| m.d.0.abs() + m.d.1.abs()).sum::<f32>() / accepted.len() as f32;
    assert!(mean_abs < 1.5, "mean |d| {mean_abs}");
}
