//! User-declared layout constraints.
//!
//! Declarations are validated against the graph when they are added and rejected as a whole on
//! any bad reference. [`decompose`] turns the registry into one-dimensional solver problems.

use remora_vpsc::{Dim, Point};

use crate::error::{Error, Result};
use crate::graph::Graph;

pub mod decompose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlignmentId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(pub usize);

/// `pos[right] - pos[left] >= gap` along `dim` (`==` when `equality`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    pub dim: Dim,
    pub left: usize,
    pub right: usize,
    pub gap: f64,
    pub equality: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub dim: Dim,
    pub nodes: Vec<usize>,
    /// Guide coordinate after the last solve.
    pub position: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub dim: Dim,
    pub alignments: Vec<AlignmentId>,
    /// Spacing between consecutive guides; `0` measures the current mean spacing at each solve.
    pub separation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub dim: Dim,
    pub nodes: Vec<usize>,
    /// Non-positive: node stays `-offset` below the line. Positive: `offset` above it.
    pub offsets: Vec<f64>,
    pub position: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixedRelative {
    pub nodes: Vec<usize>,
    /// Offsets of every member from the first one, once captured.
    pub offsets: Option<Vec<Point>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthogonalEdge {
    /// `Dim::X` shares the x coordinate (vertical edge), `Dim::Y` the y coordinate.
    pub dim: Dim,
    pub a: usize,
    pub b: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBoundary {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub weight: f64,
}

impl PageBoundary {
    pub fn range(&self, dim: Dim) -> (f64, f64) {
        match dim {
            Dim::X => (self.x_min, self.x_max),
            Dim::Y => (self.y_min, self.y_max),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    separations: Vec<Separation>,
    alignments: Vec<Alignment>,
    distributions: Vec<Distribution>,
    boundaries: Vec<Boundary>,
    fixed_relative: Vec<FixedRelative>,
    orthogonal: Vec<OrthogonalEdge>,
    page: Option<PageBoundary>,
}

fn check_nodes(graph: &Graph, nodes: &[usize]) -> Result<()> {
    nodes.iter().try_for_each(|&n| graph.check_node(n))
}

fn check_min(what: &'static str, min: usize, got: usize) -> Result<()> {
    if got < min {
        return Err(Error::TooFewMembers { what, min, got });
    }
    Ok(())
}

impl ConstraintRegistry {
    pub fn is_empty(&self) -> bool {
        self.separations.is_empty()
            && self.alignments.is_empty()
            && self.distributions.is_empty()
            && self.boundaries.is_empty()
            && self.fixed_relative.is_empty()
            && self.orthogonal.is_empty()
            && self.page.is_none()
    }

    pub fn separations(&self) -> &[Separation] {
        &self.separations
    }

    pub fn alignments(&self) -> &[Alignment] {
        &self.alignments
    }

    pub fn distributions(&self) -> &[Distribution] {
        &self.distributions
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn fixed_relative(&self) -> &[FixedRelative] {
        &self.fixed_relative
    }

    pub fn orthogonal_edges(&self) -> &[OrthogonalEdge] {
        &self.orthogonal
    }

    pub fn page_boundary(&self) -> Option<&PageBoundary> {
        self.page.as_ref()
    }

    pub fn alignment(&self, id: AlignmentId) -> Result<&Alignment> {
        self.alignments
            .get(id.0)
            .ok_or(Error::UnknownAlignment(id.0))
    }

    pub fn boundary(&self, id: BoundaryId) -> Result<&Boundary> {
        self.boundaries
            .get(id.0)
            .ok_or(Error::UnknownBoundary(id.0))
    }

    pub fn add_separation(
        &mut self,
        graph: &Graph,
        dim: Dim,
        left: usize,
        right: usize,
        gap: f64,
        equality: bool,
    ) -> Result<usize> {
        check_nodes(graph, &[left, right])?;
        if !gap.is_finite() {
            return Err(Error::InvalidValue {
                name: "separation gap",
                value: gap,
            });
        }
        self.separations.try_reserve(1)?;
        self.separations.push(Separation {
            dim,
            left,
            right,
            gap,
            equality,
        });
        Ok(self.separations.len() - 1)
    }

    pub fn add_alignment(
        &mut self,
        graph: &Graph,
        dim: Dim,
        nodes: &[usize],
    ) -> Result<AlignmentId> {
        check_min("alignment", 1, nodes.len())?;
        check_nodes(graph, nodes)?;
        self.alignments.try_reserve(1)?;
        self.alignments.push(Alignment {
            dim,
            nodes: nodes.to_vec(),
            position: None,
        });
        Ok(AlignmentId(self.alignments.len() - 1))
    }

    pub fn add_distribution(
        &mut self,
        dim: Dim,
        alignments: &[AlignmentId],
        separation: f64,
    ) -> Result<usize> {
        check_min("distribution", 2, alignments.len())?;
        for &id in alignments {
            if self.alignment(id)?.dim != dim {
                return Err(Error::AlignmentAxisMismatch { alignment: id.0 });
            }
        }
        if !(separation.is_finite() && separation >= 0.0) {
            return Err(Error::InvalidValue {
                name: "distribution separation",
                value: separation,
            });
        }
        self.distributions.try_reserve(1)?;
        self.distributions.push(Distribution {
            dim,
            alignments: alignments.to_vec(),
            separation,
        });
        Ok(self.distributions.len() - 1)
    }

    pub fn add_boundary(
        &mut self,
        graph: &Graph,
        dim: Dim,
        nodes: &[usize],
        offsets: &[f64],
    ) -> Result<BoundaryId> {
        check_min("boundary", 1, nodes.len())?;
        if nodes.len() != offsets.len() {
            return Err(Error::OffsetCountMismatch {
                nodes: nodes.len(),
                offsets: offsets.len(),
            });
        }
        check_nodes(graph, nodes)?;
        if let Some(&bad) = offsets.iter().find(|o| !o.is_finite()) {
            return Err(Error::InvalidValue {
                name: "boundary offset",
                value: bad,
            });
        }
        self.boundaries.try_reserve(1)?;
        self.boundaries.push(Boundary {
            dim,
            nodes: nodes.to_vec(),
            offsets: offsets.to_vec(),
            position: None,
        });
        Ok(BoundaryId(self.boundaries.len() - 1))
    }

    /// With `fixed_position` the offsets are taken from the current positions right away;
    /// otherwise they are captured when the layout first solves.
    pub fn add_fixed_relative(
        &mut self,
        graph: &Graph,
        nodes: &[usize],
        fixed_position: bool,
    ) -> Result<usize> {
        check_min("fixed-relative group", 2, nodes.len())?;
        check_nodes(graph, nodes)?;
        self.fixed_relative.try_reserve(1)?;
        let offsets = fixed_position.then(|| offsets_from(graph, nodes));
        self.fixed_relative.push(FixedRelative {
            nodes: nodes.to_vec(),
            offsets,
        });
        Ok(self.fixed_relative.len() - 1)
    }

    pub fn add_orthogonal_edge(
        &mut self,
        graph: &Graph,
        dim: Dim,
        a: usize,
        b: usize,
    ) -> Result<usize> {
        check_nodes(graph, &[a, b])?;
        self.orthogonal.try_reserve(1)?;
        self.orthogonal.push(OrthogonalEdge { dim, a, b });
        Ok(self.orthogonal.len() - 1)
    }

    pub fn set_page_boundary(&mut self, page: PageBoundary) -> Result<()> {
        let values = [page.x_min, page.x_max, page.y_min, page.y_max];
        if let Some(&bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::InvalidValue {
                name: "page boundary",
                value: bad,
            });
        }
        if page.x_min > page.x_max || page.y_min > page.y_max {
            return Err(Error::InvalidValue {
                name: "page boundary extent",
                value: (page.x_max - page.x_min).min(page.y_max - page.y_min),
            });
        }
        if !(page.weight.is_finite() && page.weight > 0.0) {
            return Err(Error::InvalidValue {
                name: "page boundary weight",
                value: page.weight,
            });
        }
        self.page = Some(page);
        Ok(())
    }

    pub fn clear_page_boundary(&mut self) {
        self.page = None;
    }

    /// Fills in the offsets of fixed-relative groups declared without a fixed position.
    pub(crate) fn capture_pending_offsets(&mut self, graph: &Graph) {
        for group in &mut self.fixed_relative {
            if group.offsets.is_none() {
                group.offsets = Some(offsets_from(graph, &group.nodes));
            }
        }
    }

    pub(crate) fn record_alignment(&mut self, index: usize, position: f64) {
        if let Some(a) = self.alignments.get_mut(index) {
            a.position = Some(position);
        }
    }

    pub(crate) fn record_boundary(&mut self, index: usize, position: f64) {
        if let Some(b) = self.boundaries.get_mut(index) {
            b.position = Some(position);
        }
    }
}

fn offsets_from(graph: &Graph, nodes: &[usize]) -> Vec<Point> {
    let all = graph.nodes();
    let origin = all[nodes[0]].position();
    nodes
        .iter()
        .map(|&n| Point::new(all[n].x - origin.x, all[n].y - origin.y))
        .collect()
}

#[cfg(test)]
mod tests {
    use remora_vpsc::Dim;

    use super::{AlignmentId, ConstraintRegistry};
    use crate::error::Error;
    use crate::graph::Graph;

    #[test]
    fn ids_are_sequential_and_distribution_checks_axis() {
        let g = Graph::new(4).unwrap();
        let mut r = ConstraintRegistry::default();
        let a = r.add_alignment(&g, Dim::X, &[0, 1]).unwrap();
        let b = r.add_alignment(&g, Dim::X, &[2]).unwrap();
        let c = r.add_alignment(&g, Dim::Y, &[3]).unwrap();
        assert_eq!((a, b, c), (AlignmentId(0), AlignmentId(1), AlignmentId(2)));

        assert!(matches!(
            r.add_distribution(Dim::X, &[a, c], 10.0),
            Err(Error::AlignmentAxisMismatch { alignment: 2 })
        ));
        assert!(matches!(
            r.add_distribution(Dim::X, &[a, AlignmentId(9)], 10.0),
            Err(Error::UnknownAlignment(9))
        ));
        assert_eq!(r.add_distribution(Dim::X, &[a, b], 10.0).unwrap(), 0);
    }

    #[test]
    fn deferred_offsets_are_captured_once() {
        let mut g = Graph::new(2).unwrap();
        g.set_position(1, 3.0, 4.0).unwrap();
        let mut r = ConstraintRegistry::default();
        r.add_fixed_relative(&g, &[0, 1], false).unwrap();
        assert!(r.fixed_relative()[0].offsets.is_none());

        r.capture_pending_offsets(&g);
        g.set_position(1, 100.0, 100.0).unwrap();
        r.capture_pending_offsets(&g);
        let offsets = r.fixed_relative()[0].offsets.clone().unwrap();
        assert_eq!((offsets[1].x, offsets[1].y), (3.0, 4.0));
    }
}
