use remora_vpsc::{Dim, Point, Rectangle};

use crate::error::{Error, Result};

pub mod cluster;

pub use cluster::{Cluster, ClusterId, ClusterTree};

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Center position.
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Locked nodes are never moved by the solver.
    pub locked: bool,
    pub desired: Option<DesiredPosition>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            locked: false,
            desired: None,
        }
    }
}

impl Node {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn coord(&self, dim: Dim) -> f64 {
        match dim {
            Dim::X => self.x,
            Dim::Y => self.y,
        }
    }

    pub fn set_coord(&mut self, dim: Dim, value: f64) {
        match dim {
            Dim::X => self.x = value,
            Dim::Y => self.y = value,
        }
    }

    pub fn size(&self, dim: Dim) -> f64 {
        match dim {
            Dim::X => self.width,
            Dim::Y => self.height,
        }
    }

    pub fn rect(&self) -> Rectangle {
        Rectangle::new(self.x, self.y, self.width, self.height)
    }
}

/// Attractor pulling a node towards a target with the given weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesiredPosition {
    pub x: f64,
    pub y: f64,
    pub weight: f64,
}

impl DesiredPosition {
    pub fn coord(&self, dim: Dim) -> f64 {
        match dim {
            Dim::X => self.x,
            Dim::Y => self.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    /// Multiplier applied to the ideal edge length for this edge.
    pub length: f64,
}

/// Fixed-size node set plus an append-only edge list.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

fn check_finite(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidValue { name, value })
    }
}

fn check_size(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidValue { name, value })
    }
}

impl Graph {
    pub fn new(node_count: usize) -> Result<Self> {
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(node_count)?;
        nodes.resize(node_count, Node::default());
        Ok(Self {
            nodes,
            edges: Vec::new(),
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: usize) -> Result<&Node> {
        let count = self.nodes.len();
        self.nodes
            .get(id)
            .ok_or(Error::NodeOutOfRange { node: id, count })
    }

    pub(crate) fn node_mut(&mut self, id: usize) -> Result<&mut Node> {
        let count = self.nodes.len();
        self.nodes
            .get_mut(id)
            .ok_or(Error::NodeOutOfRange { node: id, count })
    }

    pub fn check_node(&self, id: usize) -> Result<()> {
        self.node(id).map(|_| ())
    }

    pub fn set_node(&mut self, id: usize, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        let (x, y) = (check_finite("x", x)?, check_finite("y", y)?);
        let (width, height) = (check_size("width", width)?, check_size("height", height)?);
        let node = self.node_mut(id)?;
        node.x = x;
        node.y = y;
        node.width = width;
        node.height = height;
        Ok(())
    }

    pub fn set_position(&mut self, id: usize, x: f64, y: f64) -> Result<()> {
        let (x, y) = (check_finite("x", x)?, check_finite("y", y)?);
        let node = self.node_mut(id)?;
        node.x = x;
        node.y = y;
        Ok(())
    }

    pub fn set_size(&mut self, id: usize, width: f64, height: f64) -> Result<()> {
        let (width, height) = (check_size("width", width)?, check_size("height", height)?);
        let node = self.node_mut(id)?;
        node.width = width;
        node.height = height;
        Ok(())
    }

    pub fn lock(&mut self, id: usize) -> Result<()> {
        self.node_mut(id)?.locked = true;
        Ok(())
    }

    pub fn lock_at(&mut self, id: usize, x: f64, y: f64) -> Result<()> {
        self.set_position(id, x, y)?;
        self.lock(id)
    }

    pub fn unlock(&mut self, id: usize) -> Result<()> {
        self.node_mut(id)?.locked = false;
        Ok(())
    }

    pub fn clear_locks(&mut self) {
        for n in &mut self.nodes {
            n.locked = false;
        }
    }

    pub fn set_desired_position(&mut self, id: usize, x: f64, y: f64, weight: f64) -> Result<()> {
        let (x, y) = (check_finite("x", x)?, check_finite("y", y)?);
        if !(weight.is_finite() && weight > 0.0) {
            return Err(Error::InvalidValue {
                name: "desired position weight",
                value: weight,
            });
        }
        self.node_mut(id)?.desired = Some(DesiredPosition { x, y, weight });
        Ok(())
    }

    pub fn clear_desired_positions(&mut self) {
        for n in &mut self.nodes {
            n.desired = None;
        }
    }

    pub fn add_edge(&mut self, source: usize, target: usize, length: f64) -> Result<usize> {
        self.check_node(source)?;
        self.check_node(target)?;
        if source == target {
            return Err(Error::SelfLoop { node: source });
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(Error::InvalidValue {
                name: "edge length",
                value: length,
            });
        }
        self.edges.push(Edge {
            source,
            target,
            length,
        });
        Ok(self.edges.len() - 1)
    }

    pub(crate) fn coords(&self, dim: Dim) -> Vec<f64> {
        self.nodes.iter().map(|n| n.coord(dim)).collect()
    }

    pub(crate) fn rects(&self) -> Vec<Rectangle> {
        self.nodes.iter().map(Node::rect).collect()
    }

    /// Writes new coordinates along `dim`, skipping locked nodes.
    pub(crate) fn apply_coords(&mut self, dim: Dim, coords: &[f64]) {
        for (n, &c) in self.nodes.iter_mut().zip(coords) {
            if !n.locked && c.is_finite() {
                n.set_coord(dim, c);
            }
        }
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::Graph;
    use crate::error::Error;

    #[test]
    fn apply_coords_skips_locked_nodes() {
        let mut g = Graph::new(2).unwrap();
        g.lock_at(0, 5.0, 5.0).unwrap();
        g.apply_coords(remora_vpsc::Dim::X, &[1.0, 2.0]);
        assert_eq!(g.nodes()[0].x, 5.0);
        assert_eq!(g.nodes()[1].x, 2.0);
    }

    #[test]
    fn edges_reject_self_loops_and_bad_endpoints() {
        let mut g = Graph::new(2).unwrap();
        assert!(matches!(g.add_edge(1, 1, 1.0), Err(Error::SelfLoop { node: 1 })));
        assert!(matches!(
            g.add_edge(0, 2, 1.0),
            Err(Error::NodeOutOfRange { node: 2, count: 2 })
        ));
        assert_eq!(g.add_edge(0, 1, 1.0).unwrap(), 0);
        assert!(g.edges().len() == 1);
    }
}
