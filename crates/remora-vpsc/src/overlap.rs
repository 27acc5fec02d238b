use crate::error::{Error, Result};
use crate::generate::{generate_adjacent_constraints, generate_neighbour_constraints};
use crate::rectangle::{Dim, Rectangle};
use crate::solver::{Constraint, Solver, Variable};

/// Extra border used by the first two passes so that resolved rectangles end up strictly apart.
const EXTRA_GAP: f64 = 1e-4;
/// Interiors intersecting by less than this do not count as overlapping.
pub const OVERLAP_EPSILON: f64 = 1e-6;
/// Weight standing in for "does not move" on fixed rectangles.
pub const FIXED_WEIGHT: f64 = 1e7;
const MAX_PASSES: usize = 10;

/// Number of rectangle pairs whose interiors intersect.
pub fn count_overlaps(rects: &[Rectangle]) -> usize {
    let mut order: Vec<usize> = (0..rects.len()).collect();
    order.sort_by(|&a, &b| rects[a].min(Dim::X).total_cmp(&rects[b].min(Dim::X)));
    let mut count = 0;
    for (i, &a) in order.iter().enumerate() {
        for &b in &order[i + 1..] {
            if rects[b].min(Dim::X) >= rects[a].max(Dim::X) {
                break;
            }
            if rects[a].overlaps(&rects[b], OVERLAP_EPSILON) {
                count += 1;
            }
        }
    }
    count
}

/// Moves rectangles apart until none overlap. Sizes never change.
///
/// Returns the number of passes performed (zero when the input was already overlap-free).
pub fn remove_overlaps(rects: &mut [Rectangle]) -> Result<usize> {
    remove_overlaps_with_fixed(rects, &[])
}

/// Like [`remove_overlaps`], but rectangles flagged in `fixed` act as immovable obstacles.
/// Missing entries in `fixed` count as movable.
pub fn remove_overlaps_with_fixed(rects: &mut [Rectangle], fixed: &[bool]) -> Result<usize> {
    let weights: Vec<f64> = (0..rects.len())
        .map(|i| {
            if fixed.get(i).copied().unwrap_or(false) {
                FIXED_WEIGHT
            } else {
                1.0
            }
        })
        .collect();

    let mut passes = 0;
    while passes < MAX_PASSES && count_overlaps(rects) > 0 {
        overlap_pass(rects, &weights)?;
        passes += 1;
    }
    let remaining = count_overlaps(rects);
    if remaining > 0 {
        tracing::warn!(remaining, passes, "overlap removal stopped with overlaps left");
    }
    Ok(passes)
}

/// Flat form: `buffer` holds `count` rectangles as `x, y, width, height` (centers). Positions are
/// updated in place; widths and heights are left untouched.
pub fn remove_overlaps_flat(buffer: &mut [f64], count: usize) -> Result<usize> {
    let expected = count.checked_mul(4).ok_or(Error::BufferLength {
        len: buffer.len(),
        expected: usize::MAX,
        count,
    })?;
    if buffer.len() < expected {
        return Err(Error::BufferLength {
            len: buffer.len(),
            expected,
            count,
        });
    }
    let buffer = &mut buffer[..expected];
    let mut rects: Vec<Rectangle> = buffer
        .chunks_exact(4)
        .map(|c| Rectangle::new(c[0], c[1], c[2], c[3]))
        .collect();
    let passes = remove_overlaps(&mut rects)?;
    for (chunk, r) in buffer.chunks_exact_mut(4).zip(&rects) {
        chunk[0] = r.x;
        chunk[1] = r.y;
    }
    Ok(passes)
}

fn overlap_pass(rects: &mut [Rectangle], weights: &[f64]) -> Result<()> {
    let original_x: Vec<f64> = rects.iter().map(|r| r.x).collect();

    let bordered: Vec<Rectangle> = rects
        .iter()
        .map(|r| expand(r, EXTRA_GAP, EXTRA_GAP))
        .collect();
    let cs = generate_neighbour_constraints(&bordered, Dim::X);
    let xs = project(rects, weights, Dim::X, &cs, None)?;
    apply(rects, Dim::X, &xs);

    let bordered: Vec<Rectangle> = rects.iter().map(|r| expand(r, 0.0, EXTRA_GAP)).collect();
    let cs = generate_adjacent_constraints(&bordered, Dim::Y);
    let ys = project(rects, weights, Dim::Y, &cs, None)?;
    apply(rects, Dim::Y, &ys);

    // Vertical separation may have made some horizontal moves unnecessary: pull x back towards
    // where it started, keeping only the horizontal order of pairs that still share a row.
    let cs = generate_adjacent_constraints(rects, Dim::X);
    let xs = project(rects, weights, Dim::X, &cs, Some(&original_x))?;
    apply(rects, Dim::X, &xs);
    Ok(())
}

fn expand(r: &Rectangle, dx: f64, dy: f64) -> Rectangle {
    Rectangle::new(r.x, r.y, r.width + 2.0 * dx, r.height + 2.0 * dy)
}

fn project(
    rects: &[Rectangle],
    weights: &[f64],
    dim: Dim,
    constraints: &[Constraint],
    desired: Option<&[f64]>,
) -> Result<Vec<f64>> {
    let vars: Vec<Variable> = rects
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let target = desired.map_or_else(|| r.center(dim), |d| d[i]);
            Variable::new(target, weights[i])
        })
        .collect();
    let mut solver = Solver::new(&vars, constraints)?;
    Ok(solver.solve())
}

fn apply(rects: &mut [Rectangle], dim: Dim, positions: &[f64]) {
    for (r, &p) in rects.iter_mut().zip(positions) {
        r.set_center(dim, p);
    }
}
