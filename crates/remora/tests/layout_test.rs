use remora::{Dim, Layout, LayoutOptions, LayoutState, Rectangle};
use remora_vpsc::count_overlaps;

fn distance(layout: &Layout, a: usize, b: usize) -> f64 {
    let (p, q) = (
        layout.node_position(a).unwrap(),
        layout.node_position(b).unwrap(),
    );
    (p.x - q.x).hypot(p.y - q.y)
}

/// A 6-cycle with one chord, started from a deliberately poor, non-degenerate placement.
fn cycle_with_chord() -> Layout {
    let mut layout = Layout::new(6).unwrap();
    let start = [
        (0.0, 0.0),
        (13.0, 170.0),
        (220.0, 40.0),
        (35.0, 90.0),
        (160.0, 160.0),
        (80.0, 10.0),
    ];
    for (i, &(x, y)) in start.iter().enumerate() {
        layout.set_position(i, x, y).unwrap();
    }
    layout
        .add_edges(&[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0), (0, 3)])
        .unwrap();
    layout
}

#[test]
fn stress_never_increases_between_ticks() {
    let mut layout = cycle_with_chord();
    let mut previous = layout.compute_stress().unwrap();
    for _ in 0..30 {
        let converged = layout.tick().unwrap();
        let stress = layout.last_stress().unwrap();
        assert!(
            stress <= previous * (1.0 + 1e-9) + 1e-9,
            "stress went up: {previous} -> {stress}"
        );
        previous = stress;
        if converged {
            break;
        }
    }
}

#[test]
fn run_converges_and_reports_final_stress() {
    let mut layout = cycle_with_chord();
    let initial = layout.compute_stress().unwrap();
    let final_stress = layout.run().unwrap();
    assert_eq!(layout.state(), LayoutState::Converged);
    assert!(layout.iteration() >= 1);
    assert!(layout.iteration() <= layout.options().max_iterations);
    assert!(final_stress < initial);
    assert!((layout.compute_stress().unwrap() - final_stress).abs() < 1e-9);
}

#[test]
fn path_is_stretched_to_the_ideal_edge_length() {
    let mut layout = Layout::new(3).unwrap();
    layout.set_position(1, 50.0, 10.0).unwrap();
    layout.set_position(2, 60.0, 80.0).unwrap();
    layout.add_edges(&[(0, 1), (1, 2)]).unwrap();
    layout.run().unwrap();

    assert!((distance(&layout, 0, 1) - 100.0).abs() < 5.0);
    assert!((distance(&layout, 1, 2) - 100.0).abs() < 5.0);
    assert!((distance(&layout, 0, 2) - 200.0).abs() < 5.0);
}

#[test]
fn neighbour_stress_path_settles_at_the_ideal_edge_length() {
    let n = 6;
    let options = LayoutOptions {
        neighbour_stress: true,
        ..LayoutOptions::default()
    };
    let mut layout = Layout::with_options(n, options).unwrap();
    for i in 0..n {
        let (x, y) = ((i * 37) as f64, ((i * 53) % 90) as f64);
        layout.set_position(i, x, y).unwrap();
    }
    let edges: Vec<(usize, usize)> = (1..n).map(|i| (i - 1, i)).collect();
    layout.add_edges(&edges).unwrap();

    let mut previous = layout.compute_stress().unwrap();
    let mut ticks = 0;
    while !layout.tick().unwrap() {
        let stress = layout.last_stress().unwrap();
        assert!(
            stress <= previous * (1.0 + 1e-9) + 1e-9,
            "stress went up: {previous} -> {stress}"
        );
        previous = stress;
        ticks += 1;
        assert!(ticks <= layout.options().max_iterations);
    }
    assert_eq!(layout.state(), LayoutState::Converged);
    for &(a, b) in &edges {
        let d = distance(&layout, a, b);
        assert!((d - 100.0).abs() < 5.0, "edge {a}-{b} has length {d}");
    }
}

#[test]
fn per_edge_length_scales_the_ideal_distance() {
    let mut layout = Layout::new(2).unwrap();
    layout.set_position(1, 10.0, 0.0).unwrap();
    layout.add_edge_with_length(0, 1, 2.5).unwrap();
    layout.run().unwrap();
    assert!((distance(&layout, 0, 1) - 250.0).abs() < 1.0);
}

#[test]
fn locked_nodes_do_not_move() {
    let mut layout = cycle_with_chord();
    layout.lock_node_at(0, 10.0, 20.0).unwrap();
    layout.lock_node(4).unwrap();
    layout
        .add_separation_constraint(Dim::X, 0, 1, 50.0, false)
        .unwrap();
    layout.run().unwrap();

    let p0 = layout.node_position(0).unwrap();
    let p4 = layout.node_position(4).unwrap();
    assert_eq!((p0.x, p0.y), (10.0, 20.0));
    assert_eq!((p4.x, p4.y), (160.0, 160.0));
    let p1 = layout.node_position(1).unwrap();
    assert!(p1.x - p0.x >= 50.0 - 1e-3);
}

#[test]
fn unlocking_releases_the_node() {
    let mut layout = Layout::new(2).unwrap();
    layout.set_position(1, 10.0, 0.0).unwrap();
    layout.add_edge(0, 1).unwrap();
    layout.lock_node(0).unwrap();
    layout.lock_node(1).unwrap();
    layout.run().unwrap();
    assert_eq!(layout.node_position(1).unwrap().x, 10.0);

    layout.clear_locks();
    layout.run().unwrap();
    assert!((distance(&layout, 0, 1) - 100.0).abs() < 1.0);
}

#[test]
fn desired_position_attracts_a_free_node() {
    let mut layout = Layout::new(1).unwrap();
    layout.set_desired_position(0, 50.0, -20.0, 1.0).unwrap();
    layout.run().unwrap();
    let p = layout.node_position(0).unwrap();
    assert!((p.x - 50.0).abs() < 1e-6 && (p.y + 20.0).abs() < 1e-6);

    layout.clear_desired_positions();
    layout.set_position(0, 0.0, 0.0).unwrap();
    layout.run().unwrap();
    let p = layout.node_position(0).unwrap();
    assert_eq!((p.x, p.y), (0.0, 0.0));
}

#[test]
fn coincident_nodes_are_separated() {
    let mut layout = Layout::new(3).unwrap();
    layout.add_edges(&[(0, 1), (1, 2), (2, 0)]).unwrap();
    let stress = layout.run().unwrap();
    assert!(stress.is_finite());
    for (a, b) in [(0, 1), (1, 2), (0, 2)] {
        assert!(distance(&layout, a, b) > 1.0);
    }
}

#[test]
fn empty_layout_converges_immediately() {
    let mut layout = Layout::new(0).unwrap();
    assert_eq!(layout.run().unwrap(), 0.0);
    assert!(layout.positions().is_empty());
}

#[test]
fn overlap_avoidance_leaves_no_overlaps() {
    let mut layout = Layout::new(6).unwrap();
    let rects: Vec<Rectangle> = (0..6)
        .map(|i| Rectangle::new(i as f64 * 7.0, (i % 2) as f64 * 9.0, 40.0, 30.0))
        .collect();
    layout.set_nodes(&rects).unwrap();
    layout
        .add_edges(&[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)])
        .unwrap();
    layout.set_avoid_overlaps(true);
    layout.set_convergence(1e-3, 30).unwrap();
    layout.run().unwrap();

    let placed: Vec<Rectangle> = layout
        .graph()
        .nodes()
        .iter()
        .map(|n| n.rect())
        .collect();
    assert_eq!(count_overlaps(&placed), 0);
    // Sizes are never touched.
    assert!(placed.iter().all(|r| r.width == 40.0 && r.height == 30.0));
}

#[test]
fn make_feasible_leaves_a_feasible_layout_alone() {
    let mut layout = Layout::new(3).unwrap();
    layout
        .set_nodes(&[
            Rectangle::new(0.0, 0.0, 10.0, 10.0),
            Rectangle::new(100.0, 0.0, 10.0, 10.0),
            Rectangle::new(200.0, 50.0, 10.0, 10.0),
        ])
        .unwrap();
    layout
        .add_separation_constraint(Dim::X, 0, 1, 50.0, false)
        .unwrap();
    layout.set_avoid_overlaps(true);
    let before = layout.positions();
    layout.make_feasible().unwrap();
    assert_eq!(layout.positions(), before);
    assert_eq!(layout.unsatisfied_constraints(), 0);
}

#[test]
fn make_feasible_enforces_constraints_without_edges() {
    let mut layout = Layout::new(2).unwrap();
    layout.set_position(1, 10.0, 0.0).unwrap();
    layout
        .add_separation_constraint(Dim::X, 0, 1, 50.0, false)
        .unwrap();
    layout.make_feasible().unwrap();
    let (p0, p1) = (
        layout.node_position(0).unwrap(),
        layout.node_position(1).unwrap(),
    );
    assert!((p0.x + 20.0).abs() < 1e-6 && (p1.x - 30.0).abs() < 1e-6);
}

#[test]
fn free_layout_function_runs_to_completion() {
    let nodes = [
        Rectangle::new(0.0, 0.0, 10.0, 10.0),
        Rectangle::new(10.0, 5.0, 10.0, 10.0),
    ];
    let options = LayoutOptions {
        ideal_edge_length: 40.0,
        ..LayoutOptions::default()
    };
    let positions = remora::layout(&nodes, &[(0, 1)], options).unwrap();
    let d = (positions[0].x - positions[1].x).hypot(positions[0].y - positions[1].y);
    assert!((d - 40.0).abs() < 1.0);
}

#[test]
fn write_positions_checks_the_buffer() {
    let mut layout = Layout::new(2).unwrap();
    layout.set_position(1, 3.0, 4.0).unwrap();
    let mut short = [0.0; 3];
    assert!(layout.write_positions(&mut short).is_err());
    let mut out = [9.0; 5];
    layout.write_positions(&mut out).unwrap();
    assert_eq!(out, [0.0, 0.0, 3.0, 4.0, 9.0]);
}
