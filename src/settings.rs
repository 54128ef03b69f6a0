//! Engine settings

use crate::error::{CalcError, Result};
use crate::models::RoundingPolicy;

pub const DEFAULT_TOLERANCE: f64 = 1e-9;
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Whether counts are one-shot quantities or per-second rates.
///
/// Both share the same batch arithmetic; only the presentation differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowMode {
    #[default]
    Quantity,
    Rate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub rounding: RoundingPolicy,
    /// Largest batch change (relative to the batch count, floored at 1) still
    /// considered converged
    pub tolerance: f64,
    pub max_iterations: usize,
    pub mode: FlowMode,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            rounding: RoundingPolicy::Continuous,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            mode: FlowMode::Quantity,
        }
    }
}

impl Settings {
    pub fn with_rounding(mut self, rounding: RoundingPolicy) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(CalcError::ConfigError(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(CalcError::ConfigError(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
