//! Non-overlap constraints that respect the cluster hierarchy.
//!
//! Each hierarchy level is handled on its own: its direct nodes and the boxes of its child
//! clusters (grown by their margin) are the units kept apart. Members of different levels never
//! get a direct constraint; containment in the cluster boxes separates them.

use remora_vpsc::{
    Constraint, Dim, Rectangle, generate_adjacent_constraints, generate_neighbour_constraints,
};

use crate::constraints::decompose::AxisProblem;
use crate::graph::{ClusterId, ClusterTree, Graph};

#[derive(Debug, Clone, Copy)]
enum Unit {
    Node(usize),
    Cluster { lo: usize, hi: usize, margin: f64 },
}

impl Unit {
    /// Variable and offset of the low edge.
    fn low_side(self, graph: &Graph, dim: Dim) -> (usize, f64) {
        match self {
            Unit::Node(n) => (n, graph.nodes()[n].size(dim) / 2.0),
            Unit::Cluster { lo, margin, .. } => (lo, margin),
        }
    }

    fn high_side(self, graph: &Graph, dim: Dim) -> (usize, f64) {
        match self {
            Unit::Node(n) => (n, graph.nodes()[n].size(dim) / 2.0),
            Unit::Cluster { hi, margin, .. } => (hi, margin),
        }
    }
}

/// Adds constraints keeping the units of every hierarchy level apart along `problem.dim`.
///
/// Along x only the pairs cheaper to separate horizontally are constrained; along y every pair
/// still overlapping horizontally is ordered, so running x then y leaves nothing overlapping.
/// Returns the number of constraints added.
pub(crate) fn add_non_overlap_constraints(
    problem: &mut AxisProblem,
    graph: &Graph,
    clusters: &ClusterTree,
) -> usize {
    let dim = problem.dim;
    let bounds = clusters.compute_bounds(graph);
    let before = problem.cons.len();

    let levels = std::iter::once(ClusterId::ROOT).chain(clusters.ids());
    for level in levels {
        let (nodes, children) = clusters.level(level);
        let mut units = Vec::with_capacity(nodes.len() + children.len());
        let mut rects: Vec<Rectangle> = Vec::with_capacity(units.capacity());
        for n in nodes {
            units.push(Unit::Node(n));
            rects.push(graph.nodes()[n].rect());
        }
        for child in children {
            let (Some((lo, hi)), Some(b)) = (problem.cluster_sides(child), bounds[child.0]) else {
                continue;
            };
            let margin = clusters.entry(child).margin;
            units.push(Unit::Cluster { lo, hi, margin });
            rects.push(b.inflate(margin));
        }
        if units.len() < 2 {
            continue;
        }

        let generated = match dim {
            Dim::X => generate_neighbour_constraints(&rects, dim),
            Dim::Y => generate_adjacent_constraints(&rects, dim),
        };
        for c in generated {
            let (left, left_off) = units[c.left].high_side(graph, dim);
            let (right, right_off) = units[c.right].low_side(graph, dim);
            problem.cons.push(Constraint::new(left, right, left_off + right_off));
        }
    }

    let added = problem.cons.len() - before;
    tracing::trace!(?dim, added, "generated non-overlap constraints");
    added
}
