#![forbid(unsafe_code)]

//! Headless constraint-based graph layout.
//!
//! A [`Layout`] owns rectangular nodes, edges, a cluster hierarchy and a set of geometric
//! constraints (separation, alignment, distribution, boundaries, fixed-relative groups, orthogonal
//! edges, a page boundary). Stress majorization places the nodes so that geometric distances
//! follow graph distances; every iteration is projected onto the constraints with the solver in
//! `remora-vpsc`, optionally keeping nodes and clusters from overlapping.
//!
//! [`boundary`] exposes the same engine through integer handles and flat buffers.

pub mod boundary;
pub mod constraints;
pub mod error;
pub mod graph;
pub mod layout;
pub mod options;

pub use constraints::decompose::LOCK_WEIGHT;
pub use constraints::{AlignmentId, BoundaryId, ConstraintRegistry, PageBoundary};
pub use error::{Error, Result};
pub use graph::{Cluster, ClusterId, ClusterTree, DesiredPosition, Edge, Graph, Node};
pub use layout::{Layout, LayoutState};
pub use options::LayoutOptions;
pub use remora_vpsc::{Dim, Point, Rectangle};

/// Runs a layout with `options` from scratch and returns the final positions.
///
/// `nodes` are center-anchored rectangles; `edges` are index pairs into `nodes`.
pub fn layout(
    nodes: &[Rectangle],
    edges: &[(usize, usize)],
    options: LayoutOptions,
) -> Result<Vec<Point>> {
    let mut layout = Layout::with_options(nodes.len(), options)?;
    layout.set_nodes(nodes)?;
    layout.add_edges(edges)?;
    layout.run()?;
    Ok(layout.positions())
}
