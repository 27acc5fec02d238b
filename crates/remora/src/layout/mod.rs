//! The layout engine: owns the graph, constraints and clusters and runs constrained stress
//! majorization over them.

use remora_vpsc::{Dim, Point, Rectangle, count_overlaps, remove_overlaps_with_fixed};

use crate::constraints::decompose::AxisProblem;
use crate::constraints::{AlignmentId, BoundaryId, ConstraintRegistry, PageBoundary};
use crate::error::{Error, Result};
use crate::graph::{ClusterId, ClusterTree, Graph, Node};
use crate::options::LayoutOptions;

mod distances;
mod majorization;
mod overlap;

use distances::StressModel;
use majorization::{XorShift64Star, descend, separate_coincident};
use overlap::add_non_overlap_constraints;

/// Where the engine stands. Any mutation sends it back to `Configured`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    Configured,
    Running,
    Converged,
}

fn logged<T>(what: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        tracing::warn!(%err, "{what} rejected");
    }
    result
}

#[derive(Debug, Clone)]
pub struct Layout {
    graph: Graph,
    clusters: ClusterTree,
    constraints: ConstraintRegistry,
    options: LayoutOptions,
    state: LayoutState,
    model: Option<StressModel>,
    iteration: usize,
    last_stress: Option<f64>,
    unsatisfied: usize,
    rng: XorShift64Star,
}

impl Layout {
    /// Layout over `node_count` nodes, all at the origin with zero size.
    pub fn new(node_count: usize) -> Result<Self> {
        Self::with_options(node_count, LayoutOptions::default())
    }

    pub fn with_options(node_count: usize, options: LayoutOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            graph: Graph::new(node_count)?,
            clusters: ClusterTree::new(node_count),
            constraints: ConstraintRegistry::default(),
            rng: XorShift64Star::new(options.random_seed),
            options,
            state: LayoutState::Configured,
            model: None,
            iteration: 0,
            last_stress: None,
            unsatisfied: 0,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn constraints(&self) -> &ConstraintRegistry {
        &self.constraints
    }

    pub fn clusters(&self) -> &ClusterTree {
        &self.clusters
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    /// Iterations performed since the last mutation or `run`.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Stress after the most recent iteration, if any.
    pub fn last_stress(&self) -> Option<f64> {
        self.last_stress
    }

    /// Constraints the most recent solve could not honor.
    pub fn unsatisfied_constraints(&self) -> usize {
        self.unsatisfied
    }

    fn touch(&mut self) {
        self.state = LayoutState::Configured;
        self.iteration = 0;
        self.last_stress = None;
    }

    fn invalidate_model(&mut self) {
        self.model = None;
        self.touch();
    }

    // Options

    pub fn set_options(&mut self, options: LayoutOptions) -> Result<()> {
        logged("options", options.validate())?;
        if options.random_seed != self.options.random_seed {
            self.rng = XorShift64Star::new(options.random_seed);
        }
        self.options = options;
        self.invalidate_model();
        Ok(())
    }

    pub fn set_convergence(&mut self, tolerance: f64, max_iterations: usize) -> Result<()> {
        let options = LayoutOptions {
            tolerance,
            max_iterations,
            ..self.options.clone()
        };
        self.set_options(options)
    }

    pub fn set_avoid_overlaps(&mut self, avoid: bool) {
        self.options.avoid_overlaps = avoid;
        self.touch();
    }

    pub fn set_neighbour_stress(&mut self, enabled: bool) {
        self.options.neighbour_stress = enabled;
        self.invalidate_model();
    }

    // Nodes

    pub fn set_node(&mut self, id: usize, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        logged("node", self.graph.set_node(id, x, y, width, height))?;
        self.touch();
        Ok(())
    }

    /// Sets nodes `0..rects.len()` from center-anchored rectangles. Nothing changes unless every
    /// rectangle is valid.
    pub fn set_nodes(&mut self, rects: &[Rectangle]) -> Result<()> {
        let mut next = self.graph.clone();
        for (i, r) in rects.iter().enumerate() {
            logged("node", next.set_node(i, r.x, r.y, r.width, r.height))?;
        }
        self.graph = next;
        self.touch();
        Ok(())
    }

    pub fn set_position(&mut self, id: usize, x: f64, y: f64) -> Result<()> {
        logged("position", self.graph.set_position(id, x, y))?;
        self.touch();
        Ok(())
    }

    pub fn set_size(&mut self, id: usize, width: f64, height: f64) -> Result<()> {
        logged("size", self.graph.set_size(id, width, height))?;
        self.touch();
        Ok(())
    }

    /// Pins a node at its current position.
    pub fn lock_node(&mut self, id: usize) -> Result<()> {
        logged("lock", self.graph.lock(id))?;
        self.touch();
        Ok(())
    }

    pub fn lock_node_at(&mut self, id: usize, x: f64, y: f64) -> Result<()> {
        logged("lock", self.graph.lock_at(id, x, y))?;
        self.touch();
        Ok(())
    }

    pub fn unlock_node(&mut self, id: usize) -> Result<()> {
        logged("unlock", self.graph.unlock(id))?;
        self.touch();
        Ok(())
    }

    pub fn clear_locks(&mut self) {
        self.graph.clear_locks();
        self.touch();
    }

    pub fn set_desired_position(&mut self, id: usize, x: f64, y: f64, weight: f64) -> Result<()> {
        logged(
            "desired position",
            self.graph.set_desired_position(id, x, y, weight),
        )?;
        self.invalidate_model();
        Ok(())
    }

    pub fn clear_desired_positions(&mut self) {
        self.graph.clear_desired_positions();
        self.invalidate_model();
    }

    pub fn node(&self, id: usize) -> Result<&Node> {
        self.graph.node(id)
    }

    pub fn node_position(&self, id: usize) -> Result<Point> {
        self.graph.node(id).map(Node::position)
    }

    pub fn positions(&self) -> Vec<Point> {
        self.graph.nodes().iter().map(Node::position).collect()
    }

    /// Writes `x, y` pairs for every node into `out`, which must hold `2 * node_count` values.
    pub fn write_positions(&self, out: &mut [f64]) -> Result<()> {
        let needed = self.node_count() * 2;
        if out.len() < needed {
            return Err(Error::BufferTooSmall {
                len: out.len(),
                needed,
            });
        }
        for (pair, node) in out.chunks_exact_mut(2).zip(self.graph.nodes()) {
            pair[0] = node.x;
            pair[1] = node.y;
        }
        Ok(())
    }

    // Edges

    pub fn add_edge(&mut self, source: usize, target: usize) -> Result<usize> {
        self.add_edge_with_length(source, target, 1.0)
    }

    /// Edge whose ideal length is `length` times the configured ideal edge length.
    pub fn add_edge_with_length(
        &mut self,
        source: usize,
        target: usize,
        length: f64,
    ) -> Result<usize> {
        let id = logged("edge", self.graph.add_edge(source, target, length))?;
        self.invalidate_model();
        Ok(id)
    }

    /// Adds all edges or none. Returns the number added.
    pub fn add_edges(&mut self, edges: &[(usize, usize)]) -> Result<usize> {
        let mut next = self.graph.clone();
        for &(s, t) in edges {
            logged("edge", next.add_edge(s, t, 1.0))?;
        }
        self.graph = next;
        self.invalidate_model();
        Ok(edges.len())
    }

    // Constraints

    pub fn add_separation_constraint(
        &mut self,
        dim: Dim,
        left: usize,
        right: usize,
        gap: f64,
        equality: bool,
    ) -> Result<usize> {
        let id = logged(
            "separation constraint",
            self.constraints
                .add_separation(&self.graph, dim, left, right, gap, equality),
        )?;
        self.touch();
        Ok(id)
    }

    pub fn add_alignment_constraint(&mut self, dim: Dim, nodes: &[usize]) -> Result<AlignmentId> {
        let id = logged(
            "alignment constraint",
            self.constraints.add_alignment(&self.graph, dim, nodes),
        )?;
        self.touch();
        Ok(id)
    }

    /// Equal spacing between alignment guides, in the given order. A `separation` of zero keeps
    /// the mean spacing the guides have when each solve starts.
    pub fn add_distribution_constraint(
        &mut self,
        dim: Dim,
        alignments: &[AlignmentId],
        separation: f64,
    ) -> Result<usize> {
        let id = logged(
            "distribution constraint",
            self.constraints.add_distribution(dim, alignments, separation),
        )?;
        self.touch();
        Ok(id)
    }

    pub fn add_boundary_constraint(
        &mut self,
        dim: Dim,
        nodes: &[usize],
        offsets: &[f64],
    ) -> Result<BoundaryId> {
        let id = logged(
            "boundary constraint",
            self.constraints.add_boundary(&self.graph, dim, nodes, offsets),
        )?;
        self.touch();
        Ok(id)
    }

    pub fn add_fixed_relative_constraint(
        &mut self,
        nodes: &[usize],
        fixed_position: bool,
    ) -> Result<usize> {
        let id = logged(
            "fixed-relative constraint",
            self.constraints
                .add_fixed_relative(&self.graph, nodes, fixed_position),
        )?;
        self.touch();
        Ok(id)
    }

    pub fn add_orthogonal_edge_constraint(
        &mut self,
        dim: Dim,
        a: usize,
        b: usize,
    ) -> Result<usize> {
        let id = logged(
            "orthogonal edge constraint",
            self.constraints.add_orthogonal_edge(&self.graph, dim, a, b),
        )?;
        self.touch();
        Ok(id)
    }

    pub fn set_page_boundary(
        &mut self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        weight: f64,
    ) -> Result<()> {
        let page = PageBoundary {
            x_min,
            x_max,
            y_min,
            y_max,
            weight,
        };
        logged("page boundary", self.constraints.set_page_boundary(page))?;
        self.touch();
        Ok(())
    }

    pub fn clear_page_boundary(&mut self) {
        self.constraints.clear_page_boundary();
        self.touch();
    }

    /// Guide coordinate of an alignment after the last solve.
    pub fn alignment_position(&self, id: AlignmentId) -> Result<Option<f64>> {
        Ok(self.constraints.alignment(id)?.position)
    }

    /// Line coordinate of a boundary after the last solve.
    pub fn boundary_position(&self, id: BoundaryId) -> Result<Option<f64>> {
        Ok(self.constraints.boundary(id)?.position)
    }

    // Clusters

    pub fn create_cluster(
        &mut self,
        nodes: &[usize],
        padding: f64,
        margin: f64,
    ) -> Result<ClusterId> {
        let id = logged(
            "cluster",
            self.clusters.create(&self.graph, nodes, padding, margin),
        )?;
        self.touch();
        Ok(id)
    }

    pub fn add_child_cluster(&mut self, parent: ClusterId, child: ClusterId) -> Result<()> {
        logged("child cluster", self.clusters.add_child(parent, child))?;
        self.touch();
        Ok(())
    }

    /// Pulls a cluster's box towards `bounds` during layout.
    pub fn set_cluster_bounds(&mut self, id: ClusterId, bounds: Rectangle) -> Result<()> {
        logged("cluster bounds", self.clusters.set_desired_bounds(id, bounds))?;
        self.touch();
        Ok(())
    }

    /// Tight box around every node in the cluster and its descendants, grown by the padding.
    pub fn cluster_bounds(&self, id: ClusterId) -> Result<Rectangle> {
        self.clusters.bounds(&self.graph, id)
    }

    // Solving

    fn with_clusters(&self) -> bool {
        self.options.avoid_overlaps
            || self
                .clusters
                .ids()
                .any(|c| self.clusters.entry(c).desired_bounds.is_some())
    }

    /// Cached model, rebuilt after edge, attractor or option changes. Callers put it back.
    fn take_model(&mut self) -> Result<StressModel> {
        match self.model.take() {
            Some(model) => Ok(model),
            None => StressModel::build(&self.graph, &self.options),
        }
    }

    fn stress_with(&self, model: &StressModel) -> f64 {
        model.stress(&self.graph.coords(Dim::X), &self.graph.coords(Dim::Y))
    }

    /// Current stress of the layout.
    pub fn compute_stress(&mut self) -> Result<f64> {
        let model = self.take_model()?;
        let stress = self.stress_with(&model);
        self.model = Some(model);
        Ok(stress)
    }

    /// Projects the current positions onto every constraint (x first, then y) without
    /// minimizing stress. With overlap avoidance the projection also separates nodes.
    pub fn make_feasible(&mut self) -> Result<()> {
        self.constraints.capture_pending_offsets(&self.graph);
        let with_clusters = self.with_clusters();
        let mut unsatisfied = 0;
        for dim in Dim::BOTH {
            let targets = self.graph.coords(dim);
            let mut problem = AxisProblem::build(
                dim,
                &self.graph,
                &self.constraints,
                &self.clusters,
                &targets,
                with_clusters,
            )?;
            if self.options.avoid_overlaps {
                add_non_overlap_constraints(&mut problem, &self.graph, &self.clusters);
            }
            let projection = problem.satisfy()?;
            unsatisfied += projection.unsatisfiable;
            let n = self.graph.node_count();
            self.graph.apply_coords(dim, &projection.positions[..n]);
            problem.record(&mut self.constraints, &projection.positions);
        }
        self.finish_overlaps()?;
        self.report_unsatisfied(unsatisfied);
        self.touch();
        Ok(())
    }

    fn report_unsatisfied(&mut self, unsatisfied: usize) {
        if unsatisfied > 0 && unsatisfied != self.unsatisfied {
            tracing::warn!(unsatisfied, "constraints could not all be satisfied");
        }
        self.unsatisfied = unsatisfied;
    }

    /// Removes overlaps the projections could not. Skipped with clusters, whose boxes the plain
    /// rectangle pass does not know about.
    fn finish_overlaps(&mut self) -> Result<()> {
        if !self.options.avoid_overlaps || !self.clusters.is_empty() {
            return Ok(());
        }
        let mut rects = self.graph.rects();
        if count_overlaps(&rects) == 0 {
            return Ok(());
        }
        let fixed: Vec<bool> = self.graph.nodes().iter().map(|n| n.locked).collect();
        let passes = remove_overlaps_with_fixed(&mut rects, &fixed)?;
        tracing::debug!(passes, "removed leftover overlaps");
        let xs: Vec<f64> = rects.iter().map(|r| r.x).collect();
        let ys: Vec<f64> = rects.iter().map(|r| r.y).collect();
        self.graph.apply_coords(Dim::X, &xs);
        self.graph.apply_coords(Dim::Y, &ys);
        Ok(())
    }

    /// Runs one majorization iteration. Returns `true` once the layout has converged.
    pub fn tick(&mut self) -> Result<bool> {
        if self.state == LayoutState::Converged {
            return Ok(true);
        }
        self.state = LayoutState::Running;
        let n = self.graph.node_count();
        if n == 0 {
            self.last_stress = Some(0.0);
            self.state = LayoutState::Converged;
            return Ok(true);
        }

        let start = std::time::Instant::now();
        self.constraints.capture_pending_offsets(&self.graph);
        let jitter = self.options.ideal_edge_length * 1e-3;
        let moved = separate_coincident(&mut self.graph, &mut self.rng, jitter);
        if moved > 0 {
            tracing::debug!(moved, "separated coincident nodes");
            self.last_stress = None;
        }

        let model = self.take_model()?;
        let old = self.last_stress.unwrap_or_else(|| self.stress_with(&model));
        let outcome = self.majorize(&model);
        let new = self.stress_with(&model);
        self.model = Some(model);
        outcome?;

        self.iteration += 1;
        self.last_stress = Some(new);
        let change = (old - new).abs() / (new.abs() + 1e-10);
        let converged =
            change < self.options.tolerance || self.iteration >= self.options.max_iterations;
        tracing::debug!(
            iteration = self.iteration,
            stress = new,
            change,
            elapsed = ?start.elapsed(),
            "layout iteration"
        );
        if converged {
            self.state = LayoutState::Converged;
            tracing::debug!(iterations = self.iteration, stress = new, "layout converged");
        }
        Ok(converged)
    }

    /// One pass over both axes, each lowering the majorizer built around the positions at the
    /// start of the pass.
    fn majorize(&mut self, model: &StressModel) -> Result<()> {
        let n = self.graph.node_count();
        let with_clusters = self.with_clusters();
        let xs = self.graph.coords(Dim::X);
        let ys = self.graph.coords(Dim::Y);
        let rhs = [
            model.majorizing_rhs(&xs, &ys, Dim::X),
            model.majorizing_rhs(&xs, &ys, Dim::Y),
        ];

        let mut unsatisfied = 0;
        for dim in Dim::BOTH {
            let targets = self.graph.coords(dim);
            let mut problem = AxisProblem::build(
                dim,
                &self.graph,
                &self.constraints,
                &self.clusters,
                &targets,
                with_clusters,
            )?;
            if self.options.avoid_overlaps {
                add_non_overlap_constraints(&mut problem, &self.graph, &self.clusters);
            }
            let descent = descend(
                &mut problem,
                model.hessian(),
                &rhs[dim.index()],
                self.options.inner_iterations,
            )?;
            tracing::trace!(?dim, steps = descent.steps, "axis descent");
            unsatisfied += descent.projection.unsatisfiable;
            self.graph.apply_coords(dim, &descent.projection.positions[..n]);
            problem.record(&mut self.constraints, &descent.projection.positions);
        }
        self.finish_overlaps()?;
        self.report_unsatisfied(unsatisfied);
        Ok(())
    }

    /// Iterates from scratch until convergence and returns the final stress.
    pub fn run(&mut self) -> Result<f64> {
        self.iteration = 0;
        self.state = LayoutState::Configured;
        while !self.tick()? {}
        Ok(self.last_stress.unwrap_or(0.0))
    }
}
