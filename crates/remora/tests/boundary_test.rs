use remora::boundary::{
    ERR_ALIGNMENT, ERR_BUFFER, ERR_CLUSTER, ERR_DESTROYED, ERR_INPUT, ERR_INVALID, ERR_NODE,
    ERR_UNKNOWN_HANDLE, LayoutTable, OK, STRESS_ERROR, remove_overlaps,
};

fn triangle(table: &mut LayoutTable) -> i32 {
    let h = table.create_layout(3, 50.0);
    assert!(h > 0);
    let nodes = [
        0.0, 0.0, 10.0, 10.0, //
        20.0, 3.0, 10.0, 10.0, //
        7.0, 30.0, 10.0, 10.0,
    ];
    assert_eq!(table.set_nodes(h, &nodes, 3), OK);
    assert_eq!(table.add_edges(h, &[0, 1, 1, 2, 2, 0], 3), 3);
    h
}

#[test]
fn create_run_read_destroy() {
    let mut table = LayoutTable::new();
    let h = triangle(&mut table);
    assert_eq!(table.run(h), OK);

    let mut out = [0.0; 6];
    assert_eq!(table.get_all_positions(h, &mut out), OK);
    let (mut x, mut y) = (f64::NAN, f64::NAN);
    assert_eq!(table.get_node_position(h, 2, &mut x, &mut y), OK);
    assert_eq!((x, y), (out[4], out[5]));
    let d = (out[0] - out[2]).hypot(out[1] - out[3]);
    assert!((d - 50.0).abs() < 2.0, "edge length {d}");
    assert!(table.compute_stress(h) >= 0.0);

    assert_eq!(table.destroy(h), OK);
    assert!(table.is_empty());
}

#[test]
fn destroyed_and_unknown_handles_are_told_apart() {
    let mut table = LayoutTable::new();
    let h = triangle(&mut table);
    assert_eq!(table.destroy(h), OK);
    assert_eq!(table.destroy(h), ERR_DESTROYED);
    assert_eq!(table.run(h), ERR_DESTROYED);
    assert_eq!(table.add_edge(h, 0, 1), ERR_DESTROYED);
    assert_eq!(table.compute_stress(h), STRESS_ERROR);
    let (mut x, mut y) = (0.0, 0.0);
    assert_eq!(table.get_node_position(h, 0, &mut x, &mut y), ERR_DESTROYED);

    assert_eq!(table.run(999), ERR_UNKNOWN_HANDLE);
    assert_eq!(table.destroy(999), ERR_UNKNOWN_HANDLE);
    assert_eq!(table.compute_stress(-4), STRESS_ERROR);
}

#[test]
fn handles_are_never_reused() {
    let mut table = LayoutTable::new();
    let a = table.create_layout(1, 10.0);
    assert_eq!(table.destroy(a), OK);
    let b = table.create_layout(1, 10.0);
    assert!(b > a);
    assert_eq!(table.len(), 1);
}

#[test]
fn invalid_creation_parameters() {
    let mut table = LayoutTable::new();
    assert_eq!(table.create_layout(-1, 10.0), ERR_INVALID);
    assert_eq!(table.create_layout(3, 0.0), ERR_INVALID);
    assert_eq!(table.create_layout(3, f64::NAN), ERR_INVALID);
    assert!(table.is_empty());
}

#[test]
fn buffers_and_indices_are_checked() {
    let mut table = LayoutTable::new();
    let h = table.create_layout(2, 10.0);
    assert_eq!(table.set_nodes(h, &[0.0; 7], 2), ERR_BUFFER);
    assert_eq!(table.add_edges(h, &[0, 1], 2), ERR_BUFFER);
    assert_eq!(table.add_edges(h, &[0, 1], -1), ERR_INPUT);
    let mut short = [0.0; 3];
    assert_eq!(table.get_all_positions(h, &mut short), ERR_BUFFER);
    assert_eq!(table.get_cluster_bounds(h, 1, &mut [0.0; 4]), ERR_CLUSTER);

    assert_eq!(table.add_edge(h, -1, 0), ERR_NODE);
    assert_eq!(table.add_edge(h, 0, 2), ERR_NODE);
    assert_eq!(table.add_edge(h, 1, 1), ERR_NODE);
    assert_eq!(table.set_node(h, 5, 0.0, 0.0, 1.0, 1.0), ERR_NODE);
    assert_eq!(table.set_node(h, 0, 0.0, 0.0, -1.0, 1.0), ERR_INPUT);
    let (mut x, mut y) = (0.0, 0.0);
    assert_eq!(table.get_node_position(h, 2, &mut x, &mut y), ERR_NODE);

    // Nothing above changed the layout.
    assert!(table.get(h).unwrap().graph().edges().is_empty());
    assert_eq!(table.add_edge(h, 0, 1), 0);
}

#[test]
fn constraint_errors_map_to_their_codes() {
    let mut table = LayoutTable::new();
    let h = triangle(&mut table);
    assert_eq!(table.add_separation_constraint(h, 2, 0, 1, 5.0, false), ERR_INPUT);
    assert_eq!(table.add_separation_constraint(h, 0, 0, 1, 5.0, false), 0);
    assert_eq!(table.add_alignment_constraint(h, 1, &[0, 9], 2), ERR_NODE);
    let a = table.add_alignment_constraint(h, 1, &[0, 1], 2);
    assert_eq!(a, 0);
    assert_eq!(table.add_distribution_constraint(h, 1, &[a, 7], 2, 10.0), ERR_ALIGNMENT);
    assert_eq!(table.add_boundary_constraint(h, 0, &[0, 1], &[1.0], 2), ERR_BUFFER);
    assert_eq!(table.add_boundary_constraint(h, 0, &[0, 1], &[-1.0, 1.0], 2), 0);
    assert_eq!(table.add_fixed_relative_constraint(h, &[2], 1, true), ERR_INPUT);
    assert_eq!(table.add_orthogonal_edge_constraint(h, 0, 1, 2), 0);

    let c = table.create_cluster(h, &[0, 1], 2, 4.0, 2.0);
    assert_eq!(c, 1);
    assert_eq!(table.create_cluster(h, &[1], 1, 4.0, 2.0), ERR_CLUSTER);
    assert_eq!(table.add_child_cluster(h, c, 0), ERR_CLUSTER);
    assert_eq!(table.set_cluster_bounds(h, 3, 0.0, 1.0, 0.0, 1.0), ERR_CLUSTER);
    assert_eq!(table.make_feasible(h), OK);

    let mut bounds = [0.0; 4];
    assert_eq!(table.get_cluster_bounds(h, c, &mut bounds), OK);
    assert!(bounds[0] < bounds[1] && bounds[2] < bounds[3]);
}

#[test]
fn stepping_reaches_convergence() {
    let mut table = LayoutTable::new();
    let h = triangle(&mut table);
    assert_eq!(table.set_convergence(h, 1e-4, 25), OK);
    assert_eq!(table.set_convergence(h, 1e-4, -3), ERR_INPUT);
    let mut steps = 0;
    while table.run_iteration(h) == 0 {
        steps += 1;
        assert!(steps < 25);
    }
    // Further steps on a converged layout report convergence straight away.
    assert_eq!(table.run_iteration(h), 1);
    assert_eq!(table.get(h).unwrap().state(), remora::LayoutState::Converged);
}

#[test]
fn locks_and_desired_positions() {
    let mut table = LayoutTable::new();
    let h = triangle(&mut table);
    assert_eq!(table.lock_node(h, 0, 100.0, 100.0), OK);
    assert_eq!(table.set_desired_position(h, 1, 0.0, 0.0, 0.0), ERR_INPUT);
    assert_eq!(table.set_desired_position(h, 1, 200.0, 100.0, 0.5), OK);
    assert_eq!(table.run(h), OK);
    let (mut x, mut y) = (0.0, 0.0);
    table.get_node_position(h, 0, &mut x, &mut y);
    assert_eq!((x, y), (100.0, 100.0));

    assert_eq!(table.unlock_node(h, 0), OK);
    assert_eq!(table.unlock_node(h, 4), ERR_NODE);
    assert_eq!(table.clear_locks(h), OK);
    assert_eq!(table.clear_desired_positions(h), OK);
    assert_eq!(table.set_page_boundary(h, 10.0, 0.0, 0.0, 10.0, 1.0), ERR_INPUT);
}

#[test]
fn options_json_through_the_table() {
    let mut table = LayoutTable::new();
    let h = triangle(&mut table);
    assert_eq!(
        table.set_options_json(h, r#"{"idealEdgeLength": 80, "avoidOverlaps": true}"#),
        OK
    );
    let options = table.get(h).unwrap().options().clone();
    assert_eq!(options.ideal_edge_length, 80.0);
    assert!(options.avoid_overlaps);
    assert_eq!(table.set_options_json(h, "{not json"), ERR_INPUT);
    assert_eq!(table.set_options_json(h, r#"{"tolerance": -1}"#), ERR_INPUT);
    assert_eq!(table.set_avoid_overlaps(h, false), OK);
    assert_eq!(table.set_neighbour_stress(h, true), OK);
    assert!(table.get(h).unwrap().options().neighbour_stress);
}

#[test]
fn standalone_overlap_removal() {
    let mut rects = [
        0.0, 0.0, 10.0, 10.0, //
        2.0, 1.0, 10.0, 10.0, //
        4.0, -1.0, 10.0, 10.0,
    ];
    let passes = remove_overlaps(&mut rects, 3);
    assert!(passes >= 1);
    let placed: Vec<remora::Rectangle> = rects
        .chunks_exact(4)
        .map(|c| remora::Rectangle::new(c[0], c[1], c[2], c[3]))
        .collect();
    assert_eq!(remora_vpsc::count_overlaps(&placed), 0);

    assert_eq!(remove_overlaps(&mut rects, 4), ERR_BUFFER);
    assert_eq!(remove_overlaps(&mut rects, -2), ERR_INPUT);
}
