use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_IDEAL_EDGE_LENGTH: f64 = 100.0;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutOptions {
    /// Geometric length of one unit of graph distance.
    pub ideal_edge_length: f64,
    /// Relative stress change below which an iteration counts as converged.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub avoid_overlaps: bool,
    /// Keep only stress terms between edge-adjacent nodes.
    pub neighbour_stress: bool,
    /// Gradient-projection steps per axis and iteration.
    pub inner_iterations: usize,
    /// Seed used to pull apart nodes that start at the exact same position.
    pub random_seed: u64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            ideal_edge_length: DEFAULT_IDEAL_EDGE_LENGTH,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            avoid_overlaps: false,
            neighbour_stress: false,
            inner_iterations: 5,
            random_seed: 1,
        }
    }
}

impl LayoutOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(text)?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ideal_edge_length.is_finite() && self.ideal_edge_length > 0.0) {
            return Err(Error::InvalidValue {
                name: "ideal edge length",
                value: self.ideal_edge_length,
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(Error::InvalidValue {
                name: "tolerance",
                value: self.tolerance,
            });
        }
        if self.inner_iterations == 0 {
            return Err(Error::InvalidValue {
                name: "inner iterations",
                value: 0.0,
            });
        }
        Ok(())
    }
}
