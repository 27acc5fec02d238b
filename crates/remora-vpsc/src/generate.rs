//! Scan-line generation of non-overlap separation constraints.
//!
//! To separate rectangles along `dim`, a sweep runs along the other axis. Rectangles currently
//! crossed by the sweep line sit in a scan line ordered by their `dim` center; only pairs that
//! meet in that scan line can overlap, so constraints are created between scan-line neighbours
//! instead of between all pairs.

use indexmap::IndexSet;

use crate::rectangle::{Dim, Rectangle};
use crate::solver::Constraint;

#[derive(Debug, Clone, Copy)]
struct Event {
    open: bool,
    rect: usize,
    pos: f64,
}

fn sweep_events(rects: &[Rectangle], sweep: Dim) -> Vec<Event> {
    let mut events = Vec::with_capacity(rects.len() * 2);
    for (idx, r) in rects.iter().enumerate() {
        events.push(Event {
            open: true,
            rect: idx,
            pos: r.min(sweep),
        });
        events.push(Event {
            open: false,
            rect: idx,
            pos: r.max(sweep),
        });
    }
    // At equal positions a rectangle opens before it closes, and other rectangles close before
    // new ones open so that merely touching rectangles never meet in the scan line.
    events.sort_by(|a, b| {
        a.pos.total_cmp(&b.pos).then_with(|| {
            if a.rect == b.rect {
                b.open.cmp(&a.open)
            } else {
                a.open.cmp(&b.open).then(a.rect.cmp(&b.rect))
            }
        })
    });
    events
}

#[derive(Debug, Default)]
struct ScanLine {
    order: Vec<usize>,
}

impl ScanLine {
    fn insert(&mut self, rects: &[Rectangle], dim: Dim, v: usize) -> usize {
        let key = rects[v].center(dim);
        let at = self.order.partition_point(|&u| {
            let c = rects[u].center(dim);
            c < key || (c == key && u < v)
        });
        self.order.insert(at, v);
        at
    }

    fn remove(&mut self, v: usize) {
        if let Some(at) = self.order.iter().position(|&u| u == v) {
            self.order.remove(at);
        }
    }
}

fn separation(rects: &[Rectangle], dim: Dim, left: usize, right: usize) -> Constraint {
    let gap = (rects[left].size(dim) + rects[right].size(dim)) / 2.0;
    Constraint::new(left, right, gap)
}

/// Constraints between each rectangle and its nearest scan-line neighbours on either side.
///
/// Every pair overlapping on the sweep axis ends up ordered along `dim`, so solving these
/// constraints alone removes all overlaps (at the cost of moving only along `dim`).
pub fn generate_adjacent_constraints(rects: &[Rectangle], dim: Dim) -> Vec<Constraint> {
    let n = rects.len();
    let mut before: Vec<Option<usize>> = vec![None; n];
    let mut after: Vec<Option<usize>> = vec![None; n];
    let mut scan = ScanLine::default();
    let mut out = Vec::new();

    for e in sweep_events(rects, dim.other()) {
        let v = e.rect;
        if e.open {
            let at = scan.insert(rects, dim, v);
            if at > 0 {
                let u = scan.order[at - 1];
                before[v] = Some(u);
                after[u] = Some(v);
            }
            if let Some(&u) = scan.order.get(at + 1) {
                after[v] = Some(u);
                before[u] = Some(v);
            }
        } else {
            if let Some(u) = before[v] {
                out.push(separation(rects, dim, u, v));
                after[u] = after[v];
            }
            if let Some(u) = after[v] {
                out.push(separation(rects, dim, v, u));
                before[u] = before[v];
            }
            scan.remove(v);
        }
    }
    out
}

/// Constraints along `dim` only for pairs where moving along `dim` is the cheaper way to
/// resolve the overlap; the remaining overlaps are left for the other axis.
pub fn generate_neighbour_constraints(rects: &[Rectangle], dim: Dim) -> Vec<Constraint> {
    let n = rects.len();
    let mut lower: Vec<IndexSet<usize>> = vec![IndexSet::new(); n];
    let mut upper: Vec<IndexSet<usize>> = vec![IndexSet::new(); n];
    let mut scan = ScanLine::default();
    let mut out = Vec::new();

    for e in sweep_events(rects, dim.other()) {
        let v = e.rect;
        if e.open {
            let at = scan.insert(rects, dim, v);
            let below = neighbours(rects, dim, v, scan.order[..at].iter().rev());
            for &u in &below {
                upper[u].insert(v);
            }
            let above = neighbours(rects, dim, v, scan.order[at + 1..].iter());
            for &u in &above {
                lower[u].insert(v);
            }
            lower[v] = below;
            upper[v] = above;
        } else {
            for u in std::mem::take(&mut lower[v]) {
                out.push(separation(rects, dim, u, v));
                upper[u].shift_remove(&v);
            }
            for u in std::mem::take(&mut upper[v]) {
                out.push(separation(rects, dim, v, u));
                lower[u].shift_remove(&v);
            }
            scan.remove(v);
        }
    }
    out
}

/// Walks away from `v` through the scan line. Stops at the first rectangle not overlapping `v`
/// along `dim` (still recorded, to keep the ordering); overlapping ones are recorded when their
/// `dim` overlap is no larger than their overlap on the other axis.
fn neighbours<'a>(
    rects: &[Rectangle],
    dim: Dim,
    v: usize,
    walk: impl Iterator<Item = &'a usize>,
) -> IndexSet<usize> {
    let mut found = IndexSet::new();
    for &u in walk {
        let along = rects[u].overlap(&rects[v], dim);
        if along <= 0.0 {
            found.insert(u);
            break;
        }
        if along <= rects[u].overlap(&rects[v], dim.other()) {
            found.insert(u);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::{generate_adjacent_constraints, generate_neighbour_constraints, sweep_events};
    use crate::rectangle::{Dim, Rectangle};

    #[test]
    fn touching_rectangles_never_share_the_scan_line() {
        let rects = [
            Rectangle::new(0.0, 0.0, 10.0, 10.0),
            Rectangle::new(0.0, 10.0, 10.0, 10.0),
        ];
        let events = sweep_events(&rects, Dim::Y);
        let order: Vec<(usize, bool)> = events.iter().map(|e| (e.rect, e.open)).collect();
        assert_eq!(order, vec![(0, true), (0, false), (1, true), (1, false)]);
        assert!(generate_adjacent_constraints(&rects, Dim::X).is_empty());
    }

    #[test]
    fn wide_overlap_is_left_for_the_other_axis() {
        // Overlap is 9 along x but only 1 along y: no x constraint should be produced.
        let rects = [
            Rectangle::new(0.0, 0.0, 10.0, 10.0),
            Rectangle::new(1.0, 9.0, 10.0, 10.0),
        ];
        assert!(generate_neighbour_constraints(&rects, Dim::X).is_empty());
        let ys = generate_adjacent_constraints(&rects, Dim::Y);
        assert_eq!(ys.len(), 1);
        assert_eq!((ys[0].left, ys[0].right, ys[0].gap), (0, 1, 10.0));
    }
}
