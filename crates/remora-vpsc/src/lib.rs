#![forbid(unsafe_code)]

//! Variable placement with separation constraints (VPSC).
//!
//! - [`Solver`]: least-squares projection of one-dimensional positions onto separation
//!   constraints `x[right] - x[left] >= gap` (or `== gap`), by block merging.
//! - [`generate`]: scan-line construction of non-overlap constraints for rectangles.
//! - [`remove_overlaps`]: alternating-axis overlap removal built on the two above.

pub mod error;
pub mod generate;
pub mod overlap;
pub mod rectangle;
pub mod solver;

pub use error::{Error, Result};
pub use generate::{generate_adjacent_constraints, generate_neighbour_constraints};
pub use overlap::{
    FIXED_WEIGHT, OVERLAP_EPSILON, count_overlaps, remove_overlaps, remove_overlaps_flat,
    remove_overlaps_with_fixed,
};
pub use rectangle::{Dim, Point, Rectangle};
pub use solver::{Constraint, Solver, Variable, project};
