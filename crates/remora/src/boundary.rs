//! Flat, handle-based surface over [`Layout`] for hosts that can only pass integers, floats and
//! buffers.
//!
//! Every call returns a plain value: `>= 0` on success (often an id), a negative `ERR_*` code on
//! failure. Nothing here panics on bad input. Buffers come with an explicit `count` that is
//! checked against the slice length before anything is read or written.

use remora_vpsc::{Dim, Rectangle, remove_overlaps_flat};
use rustc_hash::FxHashMap;

use crate::constraints::AlignmentId;
use crate::error::{Error, Result};
use crate::graph::ClusterId;
use crate::layout::Layout;
use crate::options::LayoutOptions;

pub type Handle = i32;

pub const OK: i32 = 0;
pub const ERR_INVALID: i32 = -1;
pub const ERR_NODE: i32 = -2;
pub const ERR_ALIGNMENT: i32 = -3;
pub const ERR_BOUNDARY: i32 = -4;
pub const ERR_CLUSTER: i32 = -5;
pub const ERR_INPUT: i32 = -6;
pub const ERR_BUFFER: i32 = -7;
pub const ERR_ALLOCATION: i32 = -8;
pub const ERR_SOLVER: i32 = -9;
pub const ERR_DESTROYED: i32 = -10;
pub const ERR_UNKNOWN_HANDLE: i32 = -11;

/// Returned by [`LayoutTable::compute_stress`] on failure.
pub const STRESS_ERROR: f64 = -1.0;

#[derive(Debug)]
enum Slot {
    Live(Box<Layout>),
    Destroyed,
}

/// Owns every layout created through the flat surface. Handles count up from 1 and are never
/// reused, so a stale handle is always reported as destroyed.
#[derive(Debug, Default)]
pub struct LayoutTable {
    slots: FxHashMap<Handle, Slot>,
    last: Handle,
}

fn index(value: i32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Converts an id or count for return through the flat surface.
fn returned(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        tracing::warn!(value, "value does not fit a return code");
        Error::InvalidValue {
            name: "returned value",
            value: value as f64,
        }
    })
}

fn axis(value: i32) -> Result<Dim> {
    Dim::from_index(value).ok_or_else(|| {
        tracing::warn!(axis = value, "invalid axis");
        Error::InvalidAxis(value)
    })
}

/// The first `count` entries of `buf`.
fn prefix<T>(buf: &[T], count: i32, per_item: usize) -> Result<&[T]> {
    let Ok(count) = usize::try_from(count) else {
        tracing::warn!(count, "negative count");
        return Err(Error::InvalidValue {
            name: "count",
            value: f64::from(count),
        });
    };
    let needed = count.saturating_mul(per_item);
    buf.get(..needed).ok_or_else(|| {
        tracing::warn!(len = buf.len(), needed, "buffer shorter than its count");
        Error::BufferTooSmall {
            len: buf.len(),
            needed,
        }
    })
}

fn indices(buf: &[i32], count: i32) -> Result<Vec<usize>> {
    Ok(prefix(buf, count, 1)?.iter().map(|&v| index(v)).collect())
}

fn report(what: &'static str, handle: Handle, result: Result<i32>) -> i32 {
    match result {
        Ok(v) => v,
        Err(err) if err.is_fatal() => {
            tracing::error!(%err, handle, "{what} aborted");
            err.code()
        }
        Err(err) => {
            tracing::debug!(%err, handle, "{what} failed");
            err.code()
        }
    }
}

impl LayoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live layouts.
    pub fn len(&self) -> usize {
        self.slots
            .values()
            .filter(|s| matches!(s, Slot::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a layout of `node_count` nodes. Returns its handle, or [`ERR_INVALID`] for a
    /// negative count or invalid ideal edge length.
    pub fn create_layout(&mut self, node_count: i32, ideal_edge_length: f64) -> Handle {
        let options = LayoutOptions {
            ideal_edge_length,
            ..LayoutOptions::default()
        };
        let Ok(count) = usize::try_from(node_count) else {
            tracing::warn!(node_count, "layout with negative node count rejected");
            return ERR_INVALID;
        };
        let Some(handle) = self.last.checked_add(1) else {
            tracing::warn!(last = self.last, "no handles left");
            return ERR_INVALID;
        };
        match Layout::with_options(count, options) {
            Ok(layout) => {
                self.last = handle;
                self.slots.insert(handle, Slot::Live(Box::new(layout)));
                handle
            }
            Err(err) => {
                tracing::warn!(%err, node_count, ideal_edge_length, "layout creation rejected");
                ERR_INVALID
            }
        }
    }

    pub fn get(&self, handle: Handle) -> Result<&Layout> {
        match self.slots.get(&handle) {
            Some(Slot::Live(layout)) => Ok(layout),
            Some(Slot::Destroyed) => Err(Error::DestroyedHandle(handle)),
            None => Err(Error::UnknownHandle(handle)),
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Layout> {
        match self.slots.get_mut(&handle) {
            Some(Slot::Live(layout)) => Ok(layout),
            Some(Slot::Destroyed) => Err(Error::DestroyedHandle(handle)),
            None => Err(Error::UnknownHandle(handle)),
        }
    }

    fn with(
        &mut self,
        handle: Handle,
        what: &'static str,
        f: impl FnOnce(&mut Layout) -> Result<i32>,
    ) -> i32 {
        let result = match self.get_mut(handle) {
            Ok(layout) => f(layout),
            Err(err) => {
                tracing::warn!(%err, "{what} called on an unusable handle");
                Err(err)
            }
        };
        report(what, handle, result)
    }

    pub fn destroy(&mut self, handle: Handle) -> i32 {
        match self.slots.get_mut(&handle) {
            Some(Slot::Destroyed) => {
                tracing::warn!(handle, "layout destroyed twice");
                ERR_DESTROYED
            }
            Some(slot) => {
                *slot = Slot::Destroyed;
                OK
            }
            None => {
                tracing::warn!(handle, "destroy on unknown handle");
                ERR_UNKNOWN_HANDLE
            }
        }
    }

    pub fn set_options_json(&mut self, handle: Handle, json: &str) -> i32 {
        self.with(handle, "set_options_json", |l| {
            l.set_options(LayoutOptions::from_json(json)?)?;
            Ok(OK)
        })
    }

    pub fn set_convergence(&mut self, handle: Handle, tolerance: f64, max_iterations: i32) -> i32 {
        self.with(handle, "set_convergence", |l| {
            let max = usize::try_from(max_iterations).map_err(|_| Error::InvalidValue {
                name: "max iterations",
                value: f64::from(max_iterations),
            })?;
            l.set_convergence(tolerance, max)?;
            Ok(OK)
        })
    }

    pub fn set_avoid_overlaps(&mut self, handle: Handle, avoid: bool) -> i32 {
        self.with(handle, "set_avoid_overlaps", |l| {
            l.set_avoid_overlaps(avoid);
            Ok(OK)
        })
    }

    pub fn set_neighbour_stress(&mut self, handle: Handle, enabled: bool) -> i32 {
        self.with(handle, "set_neighbour_stress", |l| {
            l.set_neighbour_stress(enabled);
            Ok(OK)
        })
    }

    pub fn set_node(
        &mut self,
        handle: Handle,
        id: i32,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> i32 {
        self.with(handle, "set_node", |l| {
            l.set_node(index(id), x, y, width, height)?;
            Ok(OK)
        })
    }

    /// `buffer` holds `count` nodes as `x, y, width, height`, for nodes `0..count`.
    pub fn set_nodes(&mut self, handle: Handle, buffer: &[f64], count: i32) -> i32 {
        self.with(handle, "set_nodes", |l| {
            let rects: Vec<Rectangle> = prefix(buffer, count, 4)?
                .chunks_exact(4)
                .map(|c| Rectangle::new(c[0], c[1], c[2], c[3]))
                .collect();
            l.set_nodes(&rects)?;
            Ok(OK)
        })
    }

    pub fn add_edge(&mut self, handle: Handle, source: i32, target: i32) -> i32 {
        self.with(handle, "add_edge", |l| {
            let id = l.add_edge(index(source), index(target))?;
            returned(id)
        })
    }

    /// `pairs` holds `count` edges as `source, target`.
    pub fn add_edges(&mut self, handle: Handle, pairs: &[i32], count: i32) -> i32 {
        self.with(handle, "add_edges", |l| {
            let edges: Vec<(usize, usize)> = prefix(pairs, count, 2)?
                .chunks_exact(2)
                .map(|p| (index(p[0]), index(p[1])))
                .collect();
            returned(l.add_edges(&edges)?)
        })
    }

    pub fn add_separation_constraint(
        &mut self,
        handle: Handle,
        dim: i32,
        left: i32,
        right: i32,
        gap: f64,
        equality: bool,
    ) -> i32 {
        self.with(handle, "add_separation_constraint", |l| {
            let id =
                l.add_separation_constraint(axis(dim)?, index(left), index(right), gap, equality)?;
            returned(id)
        })
    }

    pub fn add_alignment_constraint(
        &mut self,
        handle: Handle,
        dim: i32,
        nodes: &[i32],
        count: i32,
    ) -> i32 {
        self.with(handle, "add_alignment_constraint", |l| {
            let id = l.add_alignment_constraint(axis(dim)?, &indices(nodes, count)?)?;
            returned(id.0)
        })
    }

    pub fn add_distribution_constraint(
        &mut self,
        handle: Handle,
        dim: i32,
        alignments: &[i32],
        count: i32,
        separation: f64,
    ) -> i32 {
        self.with(handle, "add_distribution_constraint", |l| {
            let ids: Vec<AlignmentId> = indices(alignments, count)?
                .into_iter()
                .map(AlignmentId)
                .collect();
            let id = l.add_distribution_constraint(axis(dim)?, &ids, separation)?;
            returned(id)
        })
    }

    pub fn add_boundary_constraint(
        &mut self,
        handle: Handle,
        dim: i32,
        nodes: &[i32],
        offsets: &[f64],
        count: i32,
    ) -> i32 {
        self.with(handle, "add_boundary_constraint", |l| {
            let nodes = indices(nodes, count)?;
            let offsets = prefix(offsets, count, 1)?;
            let id = l.add_boundary_constraint(axis(dim)?, &nodes, offsets)?;
            returned(id.0)
        })
    }

    pub fn add_fixed_relative_constraint(
        &mut self,
        handle: Handle,
        nodes: &[i32],
        count: i32,
        fixed_position: bool,
    ) -> i32 {
        self.with(handle, "add_fixed_relative_constraint", |l| {
            let id = l.add_fixed_relative_constraint(&indices(nodes, count)?, fixed_position)?;
            returned(id)
        })
    }

    pub fn add_orthogonal_edge_constraint(
        &mut self,
        handle: Handle,
        dim: i32,
        a: i32,
        b: i32,
    ) -> i32 {
        self.with(handle, "add_orthogonal_edge_constraint", |l| {
            let id = l.add_orthogonal_edge_constraint(axis(dim)?, index(a), index(b))?;
            returned(id)
        })
    }

    pub fn set_page_boundary(
        &mut self,
        handle: Handle,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        weight: f64,
    ) -> i32 {
        self.with(handle, "set_page_boundary", |l| {
            l.set_page_boundary(x_min, x_max, y_min, y_max, weight)?;
            Ok(OK)
        })
    }

    pub fn lock_node(&mut self, handle: Handle, id: i32, x: f64, y: f64) -> i32 {
        self.with(handle, "lock_node", |l| {
            l.lock_node_at(index(id), x, y)?;
            Ok(OK)
        })
    }

    pub fn unlock_node(&mut self, handle: Handle, id: i32) -> i32 {
        self.with(handle, "unlock_node", |l| {
            l.unlock_node(index(id))?;
            Ok(OK)
        })
    }

    pub fn clear_locks(&mut self, handle: Handle) -> i32 {
        self.with(handle, "clear_locks", |l| {
            l.clear_locks();
            Ok(OK)
        })
    }

    pub fn set_desired_position(
        &mut self,
        handle: Handle,
        id: i32,
        x: f64,
        y: f64,
        weight: f64,
    ) -> i32 {
        self.with(handle, "set_desired_position", |l| {
            l.set_desired_position(index(id), x, y, weight)?;
            Ok(OK)
        })
    }

    pub fn clear_desired_positions(&mut self, handle: Handle) -> i32 {
        self.with(handle, "clear_desired_positions", |l| {
            l.clear_desired_positions();
            Ok(OK)
        })
    }

    pub fn create_cluster(
        &mut self,
        handle: Handle,
        nodes: &[i32],
        count: i32,
        padding: f64,
        margin: f64,
    ) -> i32 {
        self.with(handle, "create_cluster", |l| {
            let id = l.create_cluster(&indices(nodes, count)?, padding, margin)?;
            returned(id.0)
        })
    }

    pub fn add_child_cluster(&mut self, handle: Handle, parent: i32, child: i32) -> i32 {
        self.with(handle, "add_child_cluster", |l| {
            l.add_child_cluster(ClusterId(index(parent)), ClusterId(index(child)))?;
            Ok(OK)
        })
    }

    pub fn set_cluster_bounds(
        &mut self,
        handle: Handle,
        cluster: i32,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    ) -> i32 {
        self.with(handle, "set_cluster_bounds", |l| {
            let bounds = Rectangle::from_bounds(x_min, x_max, y_min, y_max);
            l.set_cluster_bounds(ClusterId(index(cluster)), bounds)?;
            Ok(OK)
        })
    }

    /// Writes `x_min, x_max, y_min, y_max` of the cluster box into `out[..4]`.
    pub fn get_cluster_bounds(&mut self, handle: Handle, cluster: i32, out: &mut [f64]) -> i32 {
        self.with(handle, "get_cluster_bounds", |l| {
            let b = l.cluster_bounds(ClusterId(index(cluster)))?;
            let len = out.len();
            let slots = out
                .get_mut(..4)
                .ok_or(Error::BufferTooSmall { len, needed: 4 })?;
            slots.copy_from_slice(&[b.min(Dim::X), b.max(Dim::X), b.min(Dim::Y), b.max(Dim::Y)]);
            Ok(OK)
        })
    }

    /// Runs to convergence.
    pub fn run(&mut self, handle: Handle) -> i32 {
        self.with(handle, "run", |l| {
            l.run()?;
            Ok(OK)
        })
    }

    /// One iteration: `1` once converged, `0` otherwise.
    pub fn run_iteration(&mut self, handle: Handle) -> i32 {
        self.with(handle, "run_iteration", |l| Ok(i32::from(l.tick()?)))
    }

    pub fn make_feasible(&mut self, handle: Handle) -> i32 {
        self.with(handle, "make_feasible", |l| {
            l.make_feasible()?;
            Ok(OK)
        })
    }

    /// Current stress, or [`STRESS_ERROR`].
    pub fn compute_stress(&mut self, handle: Handle) -> f64 {
        let result = self.get_mut(handle).and_then(Layout::compute_stress);
        match result {
            Ok(stress) => stress,
            Err(err) => {
                tracing::warn!(%err, handle, "compute_stress failed");
                STRESS_ERROR
            }
        }
    }

    pub fn get_node_position(&self, handle: Handle, id: i32, x: &mut f64, y: &mut f64) -> i32 {
        let result = self.get(handle).and_then(|l| l.node_position(index(id)));
        match result {
            Ok(p) => {
                *x = p.x;
                *y = p.y;
                OK
            }
            Err(err) => {
                tracing::warn!(%err, handle, id, "get_node_position failed");
                err.code()
            }
        }
    }

    /// Fills `out` with `x, y` per node; it must hold at least `2 * node_count` values.
    pub fn get_all_positions(&self, handle: Handle, out: &mut [f64]) -> i32 {
        let result = self.get(handle).and_then(|l| l.write_positions(out));
        match result {
            Ok(()) => OK,
            Err(err) => {
                tracing::warn!(%err, handle, "get_all_positions failed");
                err.code()
            }
        }
    }
}

/// Standalone overlap removal on `count` rectangles stored as `x, y, width, height`. Returns the
/// number of passes used, or a negative code.
pub fn remove_overlaps(buffer: &mut [f64], count: i32) -> i32 {
    let result = usize::try_from(count)
        .map_err(|_| Error::InvalidValue {
            name: "count",
            value: f64::from(count),
        })
        .and_then(|count| Ok(remove_overlaps_flat(buffer, count)?))
        .and_then(returned);
    match result {
        Ok(passes) => passes,
        Err(err) => {
            tracing::warn!(%err, count, "remove_overlaps failed");
            err.code()
        }
    }
}
