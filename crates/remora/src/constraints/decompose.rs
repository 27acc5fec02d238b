//! Per-axis lowering of the registry (and cluster hierarchy) into solver variables and
//! separation constraints.
//!
//! Variables `0..node_count` are the nodes; everything after them is a dummy: alignment guides,
//! boundary lines, page sides and cluster sides. Dummies carry a tiny weight so that they follow
//! the nodes instead of pulling them.

use remora_vpsc::{Constraint, Dim, Solver, Variable};

use crate::constraints::ConstraintRegistry;
use crate::error::Result;
use crate::graph::{ClusterId, ClusterTree, Graph};

/// Weight that keeps locked nodes where they are.
pub const LOCK_WEIGHT: f64 = 1e8;
pub(crate) const DUMMY_WEIGHT: f64 = 1e-4;
/// Weight of cluster sides pulled towards user-set bounds.
const DESIRED_BOUNDS_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone)]
pub(crate) struct AxisProblem {
    pub dim: Dim,
    pub vars: Vec<Variable>,
    pub cons: Vec<Constraint>,
    locked: Vec<bool>,
    guides: Vec<usize>,
    lines: Vec<(usize, usize)>,
    cluster_sides: Vec<Option<(usize, usize)>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Projection {
    /// Positions of every variable, nodes first.
    pub positions: Vec<f64>,
    pub unsatisfiable: usize,
}

impl AxisProblem {
    /// `targets` are the node positions the projection should stay closest to. Cluster sides are
    /// only created with `with_clusters`.
    pub fn build(
        dim: Dim,
        graph: &Graph,
        registry: &ConstraintRegistry,
        clusters: &ClusterTree,
        targets: &[f64],
        with_clusters: bool,
    ) -> Result<Self> {
        let n = graph.node_count();
        let mut vars = Vec::new();
        vars.try_reserve_exact(n)?;
        let locked: Vec<bool> = graph.nodes().iter().map(|node| node.locked).collect();
        for (i, node) in graph.nodes().iter().enumerate() {
            vars.push(if node.locked {
                Variable::new(node.coord(dim), LOCK_WEIGHT)
            } else {
                Variable::new(targets[i], 1.0)
            });
        }
        let mut p = Self {
            dim,
            vars,
            cons: Vec::new(),
            locked,
            guides: Vec::new(),
            lines: Vec::new(),
            cluster_sides: Vec::new(),
        };
        p.lower_registry(graph, registry, targets);
        if with_clusters && !clusters.is_empty() {
            p.lower_clusters(graph, clusters);
        }
        Ok(p)
    }

    fn lower_registry(&mut self, graph: &Graph, registry: &ConstraintRegistry, targets: &[f64]) {
        let dim = self.dim;
        let nodes = graph.nodes();
        let mean = |members: &[usize], at: &dyn Fn(usize) -> f64| {
            members.iter().map(|&m| at(m)).sum::<f64>() / members.len() as f64
        };

        for s in registry.separations().iter().filter(|s| s.dim == dim) {
            self.cons.push(if s.equality {
                Constraint::equality(s.left, s.right, s.gap)
            } else {
                Constraint::new(s.left, s.right, s.gap)
            });
        }

        let mut guide_of: Vec<Option<usize>> = vec![None; registry.alignments().len()];
        for (idx, a) in registry.alignments().iter().enumerate() {
            if a.dim != dim {
                continue;
            }
            let guide = self.add_var(mean(&a.nodes, &|m| targets[m]), DUMMY_WEIGHT);
            for &m in &a.nodes {
                self.cons.push(Constraint::equality(guide, m, 0.0));
            }
            guide_of[idx] = Some(guide);
            self.guides.push(idx);
        }

        for d in registry.distributions().iter().filter(|d| d.dim == dim) {
            let k = d.alignments.len();
            let spacing = if d.separation > 0.0 {
                d.separation
            } else {
                let current = |id: usize| {
                    let members = &registry.alignments()[id].nodes;
                    mean(members, &|m| nodes[m].coord(dim))
                };
                let first = current(d.alignments[0].0);
                let last = current(d.alignments[k - 1].0);
                (last - first) / (k - 1) as f64
            };
            for pair in d.alignments.windows(2) {
                if let (Some(a), Some(b)) = (guide_of[pair[0].0], guide_of[pair[1].0]) {
                    self.cons.push(Constraint::equality(a, b, spacing));
                }
            }
        }

        for (idx, b) in registry.boundaries().iter().enumerate() {
            if b.dim != dim {
                continue;
            }
            let desired = b
                .nodes
                .iter()
                .zip(&b.offsets)
                .map(|(&m, &o)| targets[m] - o)
                .sum::<f64>()
                / b.nodes.len() as f64;
            let line = self.add_var(desired, DUMMY_WEIGHT);
            for (&m, &o) in b.nodes.iter().zip(&b.offsets) {
                self.cons.push(if o <= 0.0 {
                    Constraint::new(m, line, -o)
                } else {
                    Constraint::new(line, m, o)
                });
            }
            self.lines.push((idx, line));
        }

        for group in registry.fixed_relative() {
            let head = group.nodes[0];
            for (i, &m) in group.nodes.iter().enumerate().skip(1) {
                let offset = match &group.offsets {
                    Some(offsets) => offsets[i].get(dim),
                    None => nodes[m].coord(dim) - nodes[head].coord(dim),
                };
                self.cons.push(Constraint::equality(head, m, offset));
            }
        }

        for e in registry.orthogonal_edges().iter().filter(|e| e.dim == dim) {
            self.cons.push(Constraint::equality(e.a, e.b, 0.0));
        }

        if let Some(page) = registry.page_boundary() {
            let (lo, hi) = page.range(dim);
            let low = self.add_var(lo, page.weight);
            let high = self.add_var(hi, page.weight);
            for (i, node) in nodes.iter().enumerate() {
                let half = node.size(dim) / 2.0;
                self.cons.push(Constraint::new(low, i, half));
                self.cons.push(Constraint::new(i, high, half));
            }
        }
    }

    fn lower_clusters(&mut self, graph: &Graph, clusters: &ClusterTree) {
        let dim = self.dim;
        let bounds = clusters.compute_bounds(graph);
        self.cluster_sides = vec![None; bounds.len()];
        for id in clusters.ids() {
            let cluster = clusters.entry(id);
            // Empty clusters have no box to keep and nothing to contain.
            let (lo, hi) = match (cluster.desired_bounds, bounds[id.0]) {
                (_, None) => continue,
                (Some(want), Some(_)) => (
                    self.add_var(want.min(dim), DESIRED_BOUNDS_WEIGHT),
                    self.add_var(want.max(dim), DESIRED_BOUNDS_WEIGHT),
                ),
                (None, Some(now)) => (
                    self.add_var(now.min(dim), DUMMY_WEIGHT),
                    self.add_var(now.max(dim), DUMMY_WEIGHT),
                ),
            };
            self.cluster_sides[id.0] = Some((lo, hi));
            self.cons.push(Constraint::new(lo, hi, 0.0));
        }
        // Children are lowered in their own iteration, so containment is added once all sides
        // exist.
        for id in clusters.ids() {
            let Some((lo, hi)) = self.cluster_sides[id.0] else {
                continue;
            };
            let cluster = clusters.entry(id);
            for &m in &cluster.nodes {
                let gap = cluster.padding + graph.nodes()[m].size(dim) / 2.0;
                self.cons.push(Constraint::new(lo, m, gap));
                self.cons.push(Constraint::new(m, hi, gap));
            }
            for &child in &cluster.children {
                if let Some((clo, chi)) = self.cluster_sides[child.0] {
                    self.cons.push(Constraint::new(lo, clo, cluster.padding));
                    self.cons.push(Constraint::new(chi, hi, cluster.padding));
                }
            }
        }
    }

    pub fn add_var(&mut self, desired: f64, weight: f64) -> usize {
        self.vars.push(Variable::new(desired, weight));
        self.vars.len() - 1
    }

    pub fn node_count(&self) -> usize {
        self.locked.len()
    }

    pub fn is_locked(&self, node: usize) -> bool {
        self.locked[node]
    }

    /// Low and high side variables of a cluster, when clusters were lowered.
    pub fn cluster_sides(&self, id: ClusterId) -> Option<(usize, usize)> {
        self.cluster_sides.get(id.0).copied().flatten()
    }

    /// Moves the desired positions of unlocked nodes; dummies keep theirs.
    pub fn set_targets(&mut self, targets: &[f64]) {
        for (i, &t) in targets.iter().enumerate().take(self.locked.len()) {
            if !self.locked[i] {
                self.vars[i].desired = t;
            }
        }
    }

    /// Closest feasible positions to the current targets.
    pub fn project(&self) -> Result<Projection> {
        self.run(true)
    }

    /// Feasible positions without the optimality refinement; enough to repair a start state.
    pub fn satisfy(&self) -> Result<Projection> {
        self.run(false)
    }

    fn run(&self, optimal: bool) -> Result<Projection> {
        let mut solver = Solver::new(&self.vars, &self.cons)?;
        let positions = if optimal {
            solver.solve()
        } else {
            solver.satisfy()
        };
        let unsatisfiable = solver.unsatisfiable().len();
        if unsatisfiable > 0 {
            tracing::trace!(
                dim = ?self.dim,
                unsatisfiable,
                cost = solver.cost(),
                "projection left constraints unsatisfied"
            );
        }
        Ok(Projection {
            positions,
            unsatisfiable,
        })
    }

    /// Stores guide and boundary-line positions in the registry. Guides sit at the mean of their
    /// members; lines are kept inside the range their members allow.
    pub fn record(&self, registry: &mut ConstraintRegistry, positions: &[f64]) {
        for &idx in &self.guides {
            let members = &registry.alignments()[idx].nodes;
            let at = members.iter().map(|&m| positions[m]).sum::<f64>() / members.len() as f64;
            registry.record_alignment(idx, at);
        }
        for &(idx, var) in &self.lines {
            let b = &registry.boundaries()[idx];
            let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
            for (&m, &o) in b.nodes.iter().zip(&b.offsets) {
                let bound = positions[m] - o;
                if o <= 0.0 {
                    lo = lo.max(bound);
                } else {
                    hi = hi.min(bound);
                }
            }
            let line = if lo <= hi {
                positions[var].clamp(lo, hi)
            } else {
                positions[var]
            };
            registry.record_boundary(idx, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use remora_vpsc::{Dim, Rectangle};

    use super::{AxisProblem, DUMMY_WEIGHT};
    use crate::constraints::ConstraintRegistry;
    use crate::graph::{ClusterTree, Graph};

    #[test]
    fn boundary_offsets_pick_the_side() {
        let g = Graph::new(2).unwrap();
        let mut r = ConstraintRegistry::default();
        r.add_boundary(&g, Dim::X, &[0, 1], &[-5.0, 5.0]).unwrap();
        let p = AxisProblem::build(Dim::X, &g, &r, &ClusterTree::new(2), &[0.0, 0.0], false)
            .unwrap();
        assert_eq!(p.vars.len(), 3);
        assert_eq!(p.vars[2].weight, DUMMY_WEIGHT);
        let sides: Vec<(usize, usize, f64)> =
            p.cons.iter().map(|c| (c.left, c.right, c.gap)).collect();
        assert_eq!(sides, vec![(0, 2, 5.0), (2, 1, 5.0)]);

        let solved = p.project().unwrap().positions;
        assert!(solved[2] - solved[0] >= 5.0 - 1e-9);
        assert!(solved[1] - solved[2] >= 5.0 - 1e-9);
    }

    #[test]
    fn satisfy_reaches_a_feasible_point() {
        let g = Graph::new(3).unwrap();
        let mut r = ConstraintRegistry::default();
        r.add_separation(&g, Dim::X, 0, 1, 20.0, false).unwrap();
        r.add_separation(&g, Dim::X, 1, 2, 20.0, false).unwrap();
        let p = AxisProblem::build(Dim::X, &g, &r, &ClusterTree::new(3), &[0.0; 3], false)
            .unwrap();
        let fast = p.satisfy().unwrap();
        assert_eq!(fast.unsatisfiable, 0);
        assert!(fast.positions[1] - fast.positions[0] >= 20.0 - 1e-9);
        assert!(fast.positions[2] - fast.positions[1] >= 20.0 - 1e-9);
        let best = p.project().unwrap().positions;
        assert_eq!((best[0], best[2]), (-20.0, 20.0));
    }

    #[test]
    fn empty_clusters_are_not_lowered() {
        let g = Graph::new(2).unwrap();
        let mut t = ClusterTree::new(2);
        let empty = t.create(&g, &[], 10.0, 0.0).unwrap();
        t.set_desired_bounds(empty, Rectangle::new(0.0, 0.0, 50.0, 50.0))
            .unwrap();
        let full = t.create(&g, &[1], 0.0, 0.0).unwrap();
        let r = ConstraintRegistry::default();
        let p = AxisProblem::build(Dim::X, &g, &r, &t, &[0.0, 0.0], true).unwrap();
        assert_eq!(p.cluster_sides(empty), None);
        assert!(p.cluster_sides(full).is_some());
        assert_eq!(p.vars.len(), 4);
    }

    #[test]
    fn other_axis_declarations_are_ignored() {
        let g = Graph::new(2).unwrap();
        let mut r = ConstraintRegistry::default();
        r.add_separation(&g, Dim::Y, 0, 1, 10.0, false).unwrap();
        r.add_orthogonal_edge(&g, Dim::Y, 0, 1).unwrap();
        let p = AxisProblem::build(Dim::X, &g, &r, &ClusterTree::new(2), &[0.0, 0.0], true)
            .unwrap();
        assert!(p.cons.is_empty());
        assert_eq!(p.vars.len(), 2);
    }
}
