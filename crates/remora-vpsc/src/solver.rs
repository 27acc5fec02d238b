//! Block-merge projection for one-dimensional separation constraints.
//!
//! Given variables with desired positions and weights, and constraints of the form
//! `x[right] - x[left] >= gap` (or `== gap`), [`Solver::solve`] finds the positions minimizing
//! `sum(weight * (x - desired)^2)` subject to every satisfiable constraint.
//!
//! Variables are grouped into blocks joined by active (tight) constraints. A block moves rigidly:
//! each member keeps a fixed offset from the block position, and the block position is the
//! weighted average that is optimal for its members. Violated constraints merge blocks; active
//! constraints with a negative Lagrange multiplier split them again.

use crate::error::{Error, Result};

/// Violations smaller than this are treated as satisfied.
const ZERO_UPPERBOUND: f64 = -1e-10;
/// Active constraints whose multiplier falls below `-LAGRANGIAN_TOLERANCE` are split.
const LAGRANGIAN_TOLERANCE: f64 = 1e-6;
/// Equality constraints closer than this are considered met.
const EQUALITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variable {
    pub desired: f64,
    pub weight: f64,
}

impl Variable {
    pub fn new(desired: f64, weight: f64) -> Self {
        Self { desired, weight }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub left: usize,
    pub right: usize,
    pub gap: f64,
    pub equality: bool,
}

impl Constraint {
    pub fn new(left: usize, right: usize, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            equality: false,
        }
    }

    pub fn equality(left: usize, right: usize, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            equality: true,
        }
    }

    /// How far the constraint is from being violated at the given positions.
    pub fn slack(&self, positions: &[f64]) -> f64 {
        positions[self.right] - positions[self.left] - self.gap
    }

    pub fn is_satisfied(&self, positions: &[f64], eps: f64) -> bool {
        let slack = self.slack(positions);
        if self.equality {
            slack.abs() <= eps
        } else {
            slack >= -eps
        }
    }
}

#[derive(Debug, Clone)]
struct VarState {
    desired: f64,
    weight: f64,
    offset: f64,
    block: usize,
}

#[derive(Debug, Clone)]
struct ConState {
    def: Constraint,
    lm: f64,
    active: bool,
    unsatisfiable: bool,
}

#[derive(Debug, Clone, Default)]
struct Block {
    vars: Vec<usize>,
    posn: f64,
}

#[derive(Debug, Clone)]
pub struct Solver {
    vars: Vec<VarState>,
    cons: Vec<ConState>,
    out_cons: Vec<Vec<usize>>,
    in_cons: Vec<Vec<usize>>,
    blocks: Vec<Block>,
    inactive: Vec<usize>,
    // Equalities already implied by their block; revisited after every split.
    redundant: Vec<usize>,
}

impl Solver {
    pub fn new(variables: &[Variable], constraints: &[Constraint]) -> Result<Self> {
        let n = variables.len();
        for (idx, c) in constraints.iter().enumerate() {
            for variable in [c.left, c.right] {
                if variable >= n {
                    return Err(Error::VariableOutOfRange {
                        constraint: idx,
                        variable,
                        count: n,
                    });
                }
            }
            if !c.gap.is_finite() {
                return Err(Error::NonFiniteGap { constraint: idx });
            }
        }

        let mut vars: Vec<VarState> = Vec::new();
        vars.try_reserve_exact(n)?;
        let mut blocks: Vec<Block> = Vec::new();
        blocks.try_reserve_exact(n)?;
        for (idx, v) in variables.iter().enumerate() {
            let weight = if v.weight.is_finite() && v.weight > 0.0 {
                v.weight
            } else {
                1.0
            };
            let desired = if v.desired.is_finite() { v.desired } else { 0.0 };
            vars.push(VarState {
                desired,
                weight,
                offset: 0.0,
                block: idx,
            });
            blocks.push(Block {
                vars: vec![idx],
                posn: desired,
            });
        }

        let mut out_cons: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_cons: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut cons: Vec<ConState> = Vec::new();
        cons.try_reserve_exact(constraints.len())?;
        for (idx, c) in constraints.iter().enumerate() {
            out_cons[c.left].push(idx);
            in_cons[c.right].push(idx);
            let unsatisfiable = c.left == c.right && (c.gap > 0.0 || (c.equality && c.gap != 0.0));
            cons.push(ConState {
                def: *c,
                lm: 0.0,
                active: false,
                unsatisfiable,
            });
        }

        Ok(Self {
            vars,
            cons,
            out_cons,
            in_cons,
            blocks,
            inactive: (0..constraints.len())
                .filter(|&i| constraints[i].left != constraints[i].right)
                .collect(),
            redundant: Vec::new(),
        })
    }

    pub fn position(&self, var: usize) -> f64 {
        let v = &self.vars[var];
        self.blocks[v.block].posn + v.offset
    }

    pub fn positions(&self) -> Vec<f64> {
        (0..self.vars.len()).map(|v| self.position(v)).collect()
    }

    /// Weighted squared distance of the current positions from the desired ones.
    pub fn cost(&self) -> f64 {
        self.vars
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                let d = self.position(idx) - v.desired;
                v.weight * d * d
            })
            .sum()
    }

    /// Indices of constraints the last solve could not honor (cycles or conflicting equalities).
    pub fn unsatisfiable(&self) -> Vec<usize> {
        self.cons
            .iter()
            .enumerate()
            .filter(|(_, c)| c.unsatisfiable)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Lagrange multiplier of an active constraint after the last solve (zero when inactive).
    #[cfg(test)]
    fn multiplier(&self, constraint: usize) -> f64 {
        let c = &self.cons[constraint];
        if c.active { c.lm } else { 0.0 }
    }

    /// Moves variables the least amount needed to satisfy all constraints, without the
    /// refinement that makes the result optimal.
    pub fn satisfy(&mut self) -> Vec<f64> {
        self.satisfy_violations();
        self.mark_leftover_violations();
        self.positions()
    }

    /// Optimal projection of the desired positions onto the constraints.
    pub fn solve(&mut self) -> Vec<f64> {
        self.satisfy_violations();
        let max_rounds = 4 * (self.cons.len() + self.vars.len()) + 16;
        let mut rounds = 0;
        while rounds < max_rounds && self.split_blocks() {
            self.satisfy_violations();
            rounds += 1;
        }
        if rounds == max_rounds {
            tracing::debug!(rounds, "vpsc refinement hit its round cap");
        }
        self.mark_leftover_violations();
        self.positions()
    }

    fn slack(&self, c: usize) -> f64 {
        let def = &self.cons[c].def;
        self.position(def.right) - self.position(def.left) - def.gap
    }

    fn satisfy_violations(&mut self) {
        let max_steps = 10 * (self.cons.len() + self.vars.len()) + 100;
        for _ in 0..max_steps {
            let Some(ci) = self.take_most_violated() else {
                return;
            };
            let def = self.cons[ci].def;
            let lb = self.vars[def.left].block;
            let rb = self.vars[def.right].block;
            if lb != rb {
                self.merge_blocks(ci);
                continue;
            }

            if def.equality && self.slack(ci).abs() <= EQUALITY_TOLERANCE {
                self.redundant.push(ci);
                continue;
            }
            if self.active_directed_path(def.right, def.left) {
                tracing::trace!(constraint = ci, "vpsc constraint closes a cycle");
                self.cons[ci].unsatisfiable = true;
                continue;
            }
            if self.split_between(def.left, def.right) {
                self.merge_blocks(ci);
            } else {
                self.cons[ci].unsatisfiable = true;
            }
        }
        tracing::debug!(
            remaining = self.inactive.len(),
            "vpsc satisfy hit its step cap"
        );
    }

    /// Removes and returns the inactive constraint to process next: any equality first,
    /// otherwise the one with the smallest negative slack. Ties go to the earlier declaration.
    fn take_most_violated(&mut self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        let mut best_equality: Option<usize> = None;
        for (pos, &ci) in self.inactive.iter().enumerate() {
            let c = &self.cons[ci];
            if c.unsatisfiable {
                continue;
            }
            if c.def.equality {
                let earlier = best_equality.is_none_or(|p| ci < self.inactive[p]);
                if earlier {
                    best_equality = Some(pos);
                }
                continue;
            }
            let slack = self.slack(ci);
            if slack >= ZERO_UPPERBOUND {
                continue;
            }
            let better = match best {
                None => true,
                Some((p, s)) => slack < s || (slack == s && ci < self.inactive[p]),
            };
            if better {
                best = Some((pos, slack));
            }
        }
        let pos = best_equality.or(best.map(|(p, _)| p))?;
        Some(self.inactive.remove(pos))
    }

    fn merge_blocks(&mut self, ci: usize) {
        let def = self.cons[ci].def;
        let lb = self.vars[def.left].block;
        let rb = self.vars[def.right].block;
        // Offset that puts `right` exactly `gap` after `left`.
        let dist = self.vars[def.left].offset + def.gap - self.vars[def.right].offset;

        let (keep, absorb, shift) = if self.blocks[lb].vars.len() >= self.blocks[rb].vars.len() {
            (lb, rb, dist)
        } else {
            (rb, lb, -dist)
        };
        let moved = std::mem::take(&mut self.blocks[absorb].vars);
        for &v in &moved {
            self.vars[v].offset += shift;
            self.vars[v].block = keep;
        }
        self.blocks[keep].vars.extend(moved);
        self.cons[ci].active = true;
        self.update_block_position(keep);
        tracing::trace!(constraint = ci, keep, absorb, "vpsc merge");
    }

    fn update_block_position(&mut self, b: usize) {
        let mut weight = 0.0;
        let mut wposn = 0.0;
        for &v in &self.blocks[b].vars {
            let var = &self.vars[v];
            weight += var.weight;
            wposn += var.weight * (var.desired - var.offset);
        }
        if weight > 0.0 {
            self.blocks[b].posn = wposn / weight;
        }
    }

    fn active_neighbours(&self, v: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let outs = self.out_cons[v]
            .iter()
            .filter(|&&c| self.cons[c].active)
            .map(|&c| (c, self.cons[c].def.right));
        let ins = self.in_cons[v]
            .iter()
            .filter(|&&c| self.cons[c].active)
            .map(|&c| (c, self.cons[c].def.left));
        outs.chain(ins)
    }

    fn active_directed_path(&self, from: usize, to: usize) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.vars.len()];
        while let Some(v) = stack.pop() {
            if v == to {
                return true;
            }
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            for &c in &self.out_cons[v] {
                if self.cons[c].active {
                    stack.push(self.cons[c].def.right);
                }
            }
        }
        false
    }

    /// Depth-first order of the active spanning tree of `b`, with the constraint leading to
    /// each variable from its parent.
    fn block_tree(&self, b: usize) -> Vec<(usize, Option<(usize, usize)>)> {
        let Some(&root) = self.blocks[b].vars.first() else {
            return Vec::new();
        };
        let mut order = Vec::with_capacity(self.blocks[b].vars.len());
        let mut seen = vec![false; self.vars.len()];
        let mut stack: Vec<(usize, Option<(usize, usize)>)> = vec![(root, None)];
        while let Some((v, via)) = stack.pop() {
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            order.push((v, via));
            for (c, other) in self.active_neighbours(v) {
                if !seen[other] {
                    stack.push((other, Some((c, v))));
                }
            }
        }
        order
    }

    /// Recomputes the Lagrange multipliers of every active constraint in block `b`.
    fn compute_multipliers(&mut self, b: usize) -> Vec<(usize, Option<(usize, usize)>)> {
        let order = self.block_tree(b);
        let mut subtotal: Vec<f64> = vec![0.0; self.vars.len()];
        for &(v, _) in &order {
            let var = &self.vars[v];
            subtotal[v] = 2.0 * var.weight * (self.position(v) - var.desired);
        }
        for &(v, via) in order.iter().rev() {
            let Some((c, parent)) = via else {
                continue;
            };
            let def = self.cons[c].def;
            self.cons[c].lm = if def.left == parent {
                subtotal[v]
            } else {
                -subtotal[v]
            };
            subtotal[parent] += subtotal[v];
        }
        order
    }

    /// Splits every block once on its most negative multiplier. Returns whether anything split.
    fn split_blocks(&mut self) -> bool {
        let mut split_any = false;
        for b in 0..self.blocks.len() {
            if self.blocks[b].vars.len() < 2 {
                continue;
            }
            let order = self.compute_multipliers(b);
            let mut min: Option<usize> = None;
            for (_, via) in order {
                let Some((c, _)) = via else {
                    continue;
                };
                let con = &self.cons[c];
                if con.def.equality {
                    continue;
                }
                if min.is_none_or(|m| con.lm < self.cons[m].lm) {
                    min = Some(c);
                }
            }
            if let Some(c) = min.filter(|&c| self.cons[c].lm < -LAGRANGIAN_TOLERANCE) {
                self.split_block(c);
                split_any = true;
            }
        }
        if split_any {
            self.inactive.append(&mut self.redundant);
            self.inactive.sort_unstable();
        }
        split_any
    }

    /// Deactivates `c` and separates its block into the two resulting components.
    fn split_block(&mut self, c: usize) {
        let def = self.cons[c].def;
        let b = self.vars[def.left].block;
        self.cons[c].active = false;
        self.cons[c].lm = 0.0;
        self.inactive.push(c);

        let mut in_left = vec![false; self.vars.len()];
        let mut stack = vec![def.left];
        while let Some(v) = stack.pop() {
            if std::mem::replace(&mut in_left[v], true) {
                continue;
            }
            let next: Vec<usize> = self.active_neighbours(v).map(|(_, o)| o).collect();
            stack.extend(next.into_iter().filter(|&o| !in_left[o]));
        }

        let members = std::mem::take(&mut self.blocks[b].vars);
        let (left, right): (Vec<usize>, Vec<usize>) =
            members.into_iter().partition(|&v| in_left[v]);
        let nb = self.blocks.len();
        for &v in &right {
            self.vars[v].block = nb;
        }
        self.blocks[b].vars = left;
        self.blocks.push(Block {
            vars: right,
            posn: 0.0,
        });
        self.update_block_position(b);
        self.update_block_position(nb);
        tracing::trace!(constraint = c, block = b, new_block = nb, "vpsc split");
    }

    /// Splits the shared block of `vl` and `vr` at the weakest inequality on the active path
    /// between them. Returns `false` when that path consists of equalities only.
    fn split_between(&mut self, vl: usize, vr: usize) -> bool {
        let b = self.vars[vl].block;
        let order = self.compute_multipliers(b);
        let mut parent: Vec<Option<(usize, usize)>> = vec![None; self.vars.len()];
        for (v, via) in order {
            parent[v] = via;
        }

        // Path from each end up to the tree root, then trimmed at the lowest common ancestor.
        let up = |mut v: usize| {
            let mut path = vec![(v, None)];
            while let Some((c, p)) = parent[v] {
                path.push((p, Some(c)));
                v = p;
            }
            path
        };
        let from_l = up(vl);
        let from_r = up(vr);
        let mut on_r = vec![false; self.vars.len()];
        for (v, _) in &from_r {
            on_r[*v] = true;
        }
        let lca = from_l
            .iter()
            .map(|(v, _)| *v)
            .find(|&v| on_r[v])
            .unwrap_or(vl);

        // Each entry: (constraint, oriented from the vl side towards the vr side).
        let mut path: Vec<(usize, bool)> = Vec::new();
        for pair in from_l.windows(2) {
            if pair[0].0 == lca {
                break;
            }
            if let (child, Some(c)) = (pair[0].0, pair[1].1) {
                path.push((c, self.cons[c].def.left == child));
            }
        }
        for pair in from_r.windows(2) {
            if pair[0].0 == lca {
                break;
            }
            if let (child, Some(c)) = (pair[0].0, pair[1].1) {
                path.push((c, self.cons[c].def.right == child));
            }
        }

        let pick = |forward: bool| {
            path.iter()
                .filter(|(c, f)| *f == forward && !self.cons[*c].def.equality)
                .map(|(c, _)| *c)
                .min_by(|a, b| {
                    self.cons[*a]
                        .lm
                        .total_cmp(&self.cons[*b].lm)
                        .then(a.cmp(b))
                })
        };
        match pick(true).or_else(|| pick(false)) {
            Some(c) => {
                self.split_block(c);
                true
            }
            None => false,
        }
    }

    fn mark_leftover_violations(&mut self) {
        let positions = self.positions();
        for c in &mut self.cons {
            if !c.def.is_satisfied(&positions, 1e-6) {
                c.unsatisfiable = true;
            }
        }
    }
}

/// Convenience wrapper: optimal positions for `variables` under `constraints`.
pub fn project(variables: &[Variable], constraints: &[Constraint]) -> Result<Vec<f64>> {
    Ok(Solver::new(variables, constraints)?.solve())
}

#[cfg(test)]
mod tests {
    use super::{Constraint, Solver, Variable};

    #[test]
    fn multipliers_are_positive_for_pushing_constraints() {
        let vars = [Variable::new(0.0, 1.0), Variable::new(0.5, 1.0)];
        let cons = [Constraint::new(0, 1, 2.0)];
        let mut solver = Solver::new(&vars, &cons).unwrap();
        solver.solve();
        assert!((solver.multiplier(0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn slack_constraint_stays_inactive() {
        // Chain a -> b -> c where only b -> c is tight at the optimum.
        let vars = [
            Variable::new(0.0, 1.0),
            Variable::new(10.0, 1.0),
            Variable::new(10.5, 1.0),
        ];
        let cons = [Constraint::new(0, 1, 1.0), Constraint::new(1, 2, 1.0)];
        let mut solver = Solver::new(&vars, &cons).unwrap();
        let x = solver.solve();
        assert!((x[0] - 0.0).abs() < 1e-9);
        assert!((x[1] - 9.75).abs() < 1e-9);
        assert!((x[2] - 10.75).abs() < 1e-9);
        assert_eq!(solver.multiplier(0), 0.0);
    }

    #[test]
    fn self_constraint_with_positive_gap_is_unsatisfiable() {
        let vars = [Variable::new(0.0, 1.0)];
        let cons = [Constraint::new(0, 0, 1.0)];
        let mut solver = Solver::new(&vars, &cons).unwrap();
        solver.solve();
        assert_eq!(solver.unsatisfiable(), vec![0]);
    }
}
