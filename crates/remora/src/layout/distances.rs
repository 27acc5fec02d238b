use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{DMatrix, DVector};
use remora_vpsc::Dim;

use crate::error::Result;
use crate::graph::{DesiredPosition, Graph};
use crate::options::LayoutOptions;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Visit {
    dist: f64,
    node: usize,
}

impl Eq for Visit {}

impl Ord for Visit {
    // Reversed so that `BinaryHeap` pops the closest node first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn alloc_square(n: usize, fill: f64) -> Result<DMatrix<f64>> {
    let len = n.saturating_mul(n);
    let mut data = Vec::new();
    data.try_reserve_exact(len)?;
    data.resize(len, fill);
    Ok(DMatrix::from_vec(n, n, data))
}

fn adjacency(graph: &Graph, ideal_edge_length: f64) -> Vec<Vec<(usize, f64)>> {
    let mut adj = vec![Vec::new(); graph.node_count()];
    for e in graph.edges() {
        let len = e.length * ideal_edge_length;
        adj[e.source].push((e.target, len));
        adj[e.target].push((e.source, len));
    }
    adj
}

/// All-pairs shortest path lengths over the undirected edge set, edges weighted by their length
/// factor times `ideal_edge_length`. Unreachable pairs get the longest finite distance plus one
/// ideal edge length.
pub(crate) fn shortest_paths(graph: &Graph, ideal_edge_length: f64) -> Result<DMatrix<f64>> {
    let n = graph.node_count();
    let adj = adjacency(graph, ideal_edge_length);
    let mut dist = alloc_square(n, f64::INFINITY)?;
    let mut heap = BinaryHeap::new();

    for source in 0..n {
        let mut col = dist.column_mut(source);
        col[source] = 0.0;
        heap.push(Visit {
            dist: 0.0,
            node: source,
        });
        while let Some(Visit { dist: d, node }) = heap.pop() {
            if d > col[node] {
                continue;
            }
            for &(next, len) in &adj[node] {
                let nd = d + len;
                if nd < col[next] {
                    col[next] = nd;
                    heap.push(Visit { dist: nd, node: next });
                }
            }
        }
    }

    let longest = dist
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .fold(0.0_f64, f64::max);
    let unreachable = longest + ideal_edge_length;
    for d in dist.iter_mut() {
        if !d.is_finite() {
            *d = unreachable;
        }
    }
    Ok(dist)
}

/// Shortest-path lengths between node pairs that lie within one ideal edge length of each other
/// or share an edge, as `(i, j, d)` with `i < j`. Each search stops at the longer of one ideal
/// length and the source's longest incident edge, so only local neighbourhoods are visited.
pub(crate) fn neighbour_paths(graph: &Graph, ideal_edge_length: f64) -> Vec<(usize, usize, f64)> {
    let n = graph.node_count();
    let adj = adjacency(graph, ideal_edge_length);
    let near = ideal_edge_length * (1.0 + 1e-9);
    let mut dist = vec![f64::INFINITY; n];
    let mut touched = Vec::new();
    let mut heap = BinaryHeap::new();
    let mut pairs = Vec::new();

    for source in 0..n {
        let limit = adj[source].iter().map(|&(_, len)| len).fold(near, f64::max);
        dist[source] = 0.0;
        touched.push(source);
        heap.push(Visit {
            dist: 0.0,
            node: source,
        });
        while let Some(Visit { dist: d, node }) = heap.pop() {
            if d > dist[node] {
                continue;
            }
            if node > source && (d <= near || adj[source].iter().any(|&(k, _)| k == node)) {
                pairs.push((source, node, d));
            }
            for &(next, len) in &adj[node] {
                let nd = d + len;
                if nd <= limit && nd < dist[next] {
                    dist[next] = nd;
                    touched.push(next);
                    heap.push(Visit { dist: nd, node: next });
                }
            }
        }
        for t in touched.drain(..) {
            dist[t] = f64::INFINITY;
        }
    }
    pairs
}

/// One `w (|X_i - X_j| - d)^2` term of the stress.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Term {
    i: usize,
    j: usize,
    ideal: f64,
    weight: f64,
}

impl Term {
    fn new(i: usize, j: usize, ideal: f64) -> Self {
        Self {
            i,
            j,
            ideal,
            weight: 1.0 / (ideal * ideal),
        }
    }
}

/// Weighted Laplacian of the stress terms with the attractor weights added on the diagonal.
/// Dense when every pair contributes, a diagonal plus pair list otherwise.
#[derive(Debug, Clone)]
pub(crate) enum Hessian {
    Dense(DMatrix<f64>),
    Sparse {
        diagonal: DVector<f64>,
        pairs: Vec<(usize, usize, f64)>,
    },
}

impl Hessian {
    pub fn mul(&self, v: &DVector<f64>) -> DVector<f64> {
        match self {
            Hessian::Dense(m) => m * v,
            Hessian::Sparse { diagonal, pairs } => {
                let mut out = diagonal.component_mul(v);
                for &(i, j, w) in pairs {
                    out[i] -= w * v[j];
                    out[j] -= w * v[i];
                }
                out
            }
        }
    }

    /// `v^T H v`.
    pub fn quad(&self, v: &DVector<f64>) -> f64 {
        v.dot(&self.mul(v))
    }
}

/// Quadratic model of the stress function for one graph and option set.
///
/// `stress(X) = Σ w_ij (|X_i - X_j| - d_ij)^2 + Σ_i a_i |X_i - t_i|^2` with `w_ij = d_ij^-2`
/// and optional attractors `(t_i, a_i)`. The first sum runs over every pair, or only over
/// neighbouring pairs with `neighbour_stress`.
#[derive(Debug, Clone)]
pub(crate) struct StressModel {
    terms: Vec<Term>,
    hessian: Hessian,
    attractors: Vec<Option<DesiredPosition>>,
}

impl StressModel {
    pub fn build(graph: &Graph, options: &LayoutOptions) -> Result<Self> {
        let n = graph.node_count();
        let attractors: Vec<Option<DesiredPosition>> =
            graph.nodes().iter().map(|node| node.desired).collect();
        let mut diagonal = DVector::from_iterator(
            n,
            attractors.iter().map(|a| a.map_or(0.0, |a| a.weight)),
        );

        if options.neighbour_stress {
            let terms: Vec<Term> = neighbour_paths(graph, options.ideal_edge_length)
                .into_iter()
                .map(|(i, j, d)| Term::new(i, j, d))
                .collect();
            let mut pairs = Vec::new();
            pairs.try_reserve_exact(terms.len())?;
            for t in &terms {
                diagonal[t.i] += t.weight;
                diagonal[t.j] += t.weight;
                pairs.push((t.i, t.j, t.weight));
            }
            return Ok(Self {
                terms,
                hessian: Hessian::Sparse { diagonal, pairs },
                attractors,
            });
        }

        let ideal = shortest_paths(graph, options.ideal_edge_length)?;
        let mut terms = Vec::new();
        terms.try_reserve_exact(n * n.saturating_sub(1) / 2)?;
        let mut hessian = alloc_square(n, 0.0)?;
        for j in 0..n {
            for i in 0..j {
                let t = Term::new(i, j, ideal[(i, j)]);
                hessian[(i, j)] = -t.weight;
                hessian[(j, i)] = -t.weight;
                diagonal[i] += t.weight;
                diagonal[j] += t.weight;
                terms.push(t);
            }
        }
        hessian.set_diagonal(&diagonal);

        Ok(Self {
            terms,
            hessian: Hessian::Dense(hessian),
            attractors,
        })
    }

    pub fn node_count(&self) -> usize {
        self.attractors.len()
    }

    pub fn hessian(&self) -> &Hessian {
        &self.hessian
    }

    pub fn stress(&self, xs: &[f64], ys: &[f64]) -> f64 {
        let mut total: f64 = self
            .terms
            .iter()
            .map(|t| {
                let diff = (xs[t.i] - xs[t.j]).hypot(ys[t.i] - ys[t.j]) - t.ideal;
                t.weight * diff * diff
            })
            .sum();
        for (i, a) in self.attractors.iter().enumerate() {
            if let Some(a) = a {
                let (dx, dy) = (xs[i] - a.x, ys[i] - a.y);
                total += a.weight * (dx * dx + dy * dy);
            }
        }
        total
    }

    /// Right-hand side of the majorizing quadratic around the configuration `(xs, ys)` for one
    /// axis: `L_Z z_dim` plus the attractor pulls. Coincident pairs contribute nothing.
    pub fn majorizing_rhs(&self, xs: &[f64], ys: &[f64], dim: Dim) -> DVector<f64> {
        let own = match dim {
            Dim::X => xs,
            Dim::Y => ys,
        };
        let mut b = DVector::zeros(self.node_count());
        for t in &self.terms {
            let dist = (xs[t.i] - xs[t.j]).hypot(ys[t.i] - ys[t.j]);
            if dist > 1e-12 {
                let pull = t.weight * t.ideal * (own[t.i] - own[t.j]) / dist;
                b[t.i] += pull;
                b[t.j] -= pull;
            }
        }
        for (i, a) in self.attractors.iter().enumerate() {
            if let Some(a) = a {
                b[i] += a.weight * a.coord(dim);
            }
        }
        b
    }
}
