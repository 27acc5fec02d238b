//! One axis of constrained stress majorization, solved by gradient projection.

use nalgebra::DVector;
use rustc_hash::FxHashMap;

use crate::constraints::decompose::{AxisProblem, Projection};
use crate::error::Result;
use crate::graph::Graph;
use crate::layout::distances::Hessian;

const SMALL: f64 = 1e-12;

/// Outcome of [`descend`].
#[derive(Debug, Clone)]
pub(crate) struct Descent {
    /// Final projection; node positions come first.
    pub projection: Projection,
    pub steps: usize,
}

/// Lowers `x^T H x - 2 x^T b` over the constraints of `problem`.
///
/// The current targets of `problem` are projected first so that every later step starts from a
/// feasible point. Each step moves along the negative gradient by the exact line-search length,
/// projects, then takes the best point on the segment towards the projection. Locked nodes keep
/// a zero gradient and are restored exactly at the end.
pub(crate) fn descend(
    problem: &mut AxisProblem,
    hessian: &Hessian,
    rhs: &DVector<f64>,
    inner_iterations: usize,
) -> Result<Descent> {
    let n = problem.node_count();
    let start = problem.project()?;
    let mut x = DVector::from_column_slice(&start.positions[..n]);
    let mut unsatisfiable = start.unsatisfiable;
    let mut steps = 0;

    for _ in 0..inner_iterations {
        let mut g = rhs - hessian.mul(&x);
        zero_locked(problem, &mut g);
        let gg = g.dot(&g);
        if gg <= SMALL {
            break;
        }
        let g_h_g = hessian.quad(&g);
        if g_h_g <= SMALL {
            break;
        }
        let alpha = gg / g_h_g;

        problem.set_targets((&x + &g * alpha).as_slice());
        let projected = problem.project()?;
        unsatisfiable = unsatisfiable.max(projected.unsatisfiable);

        let mut d = DVector::from_column_slice(&projected.positions[..n]) - &x;
        zero_locked(problem, &mut d);
        let d_h_d = hessian.quad(&d);
        if d_h_d <= SMALL {
            break;
        }
        let beta = (g.dot(&d) / d_h_d).clamp(0.0, 1.0);
        if beta <= 0.0 {
            break;
        }
        x += &d * beta;
        steps += 1;
    }

    // `x` is already feasible; projecting it again only places the dummies.
    problem.set_targets(x.as_slice());
    let mut projection = problem.project()?;
    projection.positions[..n].copy_from_slice(x.as_slice());
    projection.unsatisfiable = projection.unsatisfiable.max(unsatisfiable);
    Ok(Descent { projection, steps })
}

fn zero_locked(problem: &AxisProblem, v: &mut DVector<f64>) {
    for (i, c) in v.iter_mut().enumerate() {
        if problem.is_locked(i) {
            *c = 0.0;
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D_u64)
    }

    /// Uniform in `[-1, 1)`.
    pub fn next_f64_signed(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        let v = (u as f64) / ((1u64 << 53) as f64);
        (v * 2.0) - 1.0
    }
}

/// Nudges unlocked nodes that share their exact position with an earlier node. Stress has no
/// gradient between coincident nodes, so they would otherwise never separate.
///
/// Returns the number of nodes moved.
pub(crate) fn separate_coincident(
    graph: &mut Graph,
    rng: &mut XorShift64Star,
    scale: f64,
) -> usize {
    let mut seen: FxHashMap<(u64, u64), usize> = FxHashMap::default();
    let mut moved = 0;
    for node in graph.nodes_mut() {
        let key = (node.x.to_bits(), node.y.to_bits());
        let count = seen.entry(key).or_insert(0);
        *count += 1;
        if *count == 1 || node.locked {
            continue;
        }
        node.x += rng.next_f64_signed() * scale;
        node.y += rng.next_f64_signed() * scale;
        moved += 1;
    }
    moved
}
