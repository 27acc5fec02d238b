//! Cluster hierarchy stored as an arena.
//!
//! Index 0 is the implicit root; it owns every node not placed in a cluster and every cluster
//! without an explicit parent. User clusters get ids `1..`.

use remora_vpsc::Rectangle;

use crate::error::{Error, Result};
use crate::graph::Graph;

/// 1-based cluster id. [`ClusterId::ROOT`] is the implicit top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub usize);

impl ClusterId {
    pub const ROOT: ClusterId = ClusterId(0);

    pub fn index(self) -> usize {
        self.0
    }

    pub fn is_root(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cluster {
    pub parent: Option<ClusterId>,
    pub children: Vec<ClusterId>,
    /// Direct member nodes, in declaration order.
    pub nodes: Vec<usize>,
    /// Space between the members and the cluster box.
    pub padding: f64,
    /// Space kept clear around the cluster box when avoiding overlaps.
    pub margin: f64,
    pub desired_bounds: Option<Rectangle>,
}

#[derive(Debug, Clone)]
pub struct ClusterTree {
    clusters: Vec<Cluster>,
    node_owner: Vec<Option<ClusterId>>,
}

impl ClusterTree {
    pub fn new(node_count: usize) -> Self {
        Self {
            clusters: vec![Cluster::default()],
            node_owner: vec![None; node_count],
        }
    }

    /// Number of user clusters (the root is not counted).
    pub fn len(&self) -> usize {
        self.clusters.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.len() == 1
    }

    pub fn get(&self, id: ClusterId) -> Result<&Cluster> {
        if id.is_root() {
            return Err(Error::RootCluster { role: "a user cluster" });
        }
        self.clusters
            .get(id.0)
            .ok_or(Error::UnknownCluster(id.0))
    }

    /// Unchecked access for ids handed out by this tree.
    pub(crate) fn entry(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id.0]
    }

    pub fn owner(&self, node: usize) -> Option<ClusterId> {
        self.node_owner.get(node).copied().flatten()
    }

    /// User cluster ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        (1..self.clusters.len()).map(ClusterId)
    }

    fn check_user(&self, id: ClusterId, role: &'static str) -> Result<()> {
        if id.is_root() {
            return Err(Error::RootCluster { role });
        }
        if id.0 >= self.clusters.len() {
            return Err(Error::UnknownCluster(id.0));
        }
        Ok(())
    }

    /// Creates a cluster under the root. The whole call is rejected if any node is out of range,
    /// listed twice, or already owned by another cluster.
    pub fn create(
        &mut self,
        graph: &Graph,
        nodes: &[usize],
        padding: f64,
        margin: f64,
    ) -> Result<ClusterId> {
        for (name, value) in [("cluster padding", padding), ("cluster margin", margin)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidValue { name, value });
            }
        }
        let id = ClusterId(self.clusters.len());
        for (i, &n) in nodes.iter().enumerate() {
            graph.check_node(n)?;
            if let Some(owner) = self.owner(n) {
                return Err(Error::NodeAlreadyClustered {
                    node: n,
                    cluster: owner.0,
                });
            }
            if nodes[..i].contains(&n) {
                return Err(Error::NodeAlreadyClustered {
                    node: n,
                    cluster: id.0,
                });
            }
        }
        self.clusters.try_reserve(1)?;
        for &n in nodes {
            self.node_owner[n] = Some(id);
        }
        self.clusters.push(Cluster {
            parent: None,
            children: Vec::new(),
            nodes: nodes.to_vec(),
            padding,
            margin,
            desired_bounds: None,
        });
        Ok(id)
    }

    pub fn add_child(&mut self, parent: ClusterId, child: ClusterId) -> Result<()> {
        self.check_user(parent, "a parent")?;
        self.check_user(child, "a child")?;
        if let Some(p) = self.clusters[child.0].parent {
            return Err(Error::ClusterAlreadyParented {
                child: child.0,
                parent: p.0,
            });
        }
        // Walk up from the parent; meeting the child means it is already an ancestor.
        let mut cur = Some(parent);
        while let Some(c) = cur {
            if c == child {
                return Err(Error::ClusterCycle {
                    parent: parent.0,
                    child: child.0,
                });
            }
            cur = self.clusters[c.0].parent;
        }
        self.clusters[parent.0].children.push(child);
        self.clusters[child.0].parent = Some(parent);
        Ok(())
    }

    pub fn set_desired_bounds(&mut self, id: ClusterId, bounds: Rectangle) -> Result<()> {
        self.check_user(id, "a bounded cluster")?;
        let finite = [bounds.x, bounds.y, bounds.width, bounds.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || bounds.width < 0.0 || bounds.height < 0.0 {
            return Err(Error::InvalidValue {
                name: "cluster bounds",
                value: bounds.width.min(bounds.height),
            });
        }
        self.clusters[id.0].desired_bounds = Some(bounds);
        Ok(())
    }

    /// Direct nodes and child clusters of a hierarchy level; `ROOT` yields the unclustered nodes
    /// and the top-level clusters.
    pub fn level(&self, id: ClusterId) -> (Vec<usize>, Vec<ClusterId>) {
        if id.is_root() {
            let nodes = (0..self.node_owner.len())
                .filter(|&n| self.node_owner[n].is_none())
                .collect();
            let children = self
                .ids()
                .filter(|c| self.clusters[c.0].parent.is_none())
                .collect();
            (nodes, children)
        } else {
            let c = &self.clusters[id.0];
            (c.nodes.clone(), c.children.clone())
        }
    }

    /// User clusters ordered so that every child comes before its parent.
    pub fn post_order(&self) -> Vec<ClusterId> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<(ClusterId, bool)> = self
            .ids()
            .filter(|c| self.clusters[c.0].parent.is_none())
            .map(|c| (c, false))
            .collect();
        stack.reverse();
        while let Some((c, expanded)) = stack.pop() {
            if expanded {
                out.push(c);
                continue;
            }
            stack.push((c, true));
            for &child in self.clusters[c.0].children.iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    /// Current box of every cluster, indexed by id (slot 0 is unused). Each box is the union of
    /// the member rectangles and child boxes, inflated by the padding. Clusters with no member
    /// nodes anywhere below them have no box.
    pub fn compute_bounds(&self, graph: &Graph) -> Vec<Option<Rectangle>> {
        let mut bounds: Vec<Option<Rectangle>> = vec![None; self.clusters.len()];
        for c in self.post_order() {
            let cluster = &self.clusters[c.0];
            let members = cluster.nodes.iter().map(|&n| graph.nodes()[n].rect());
            let children = cluster.children.iter().filter_map(|ch| bounds[ch.0]);
            bounds[c.0] = members
                .chain(children)
                .reduce(|a, b| a.union(&b))
                .map(|tight| tight.inflate(cluster.padding));
        }
        bounds
    }

    pub fn bounds(&self, graph: &Graph, id: ClusterId) -> Result<Rectangle> {
        self.check_user(id, "a bounded cluster")?;
        self.compute_bounds(graph)[id.0].ok_or(Error::EmptyCluster(id.0))
    }
}
