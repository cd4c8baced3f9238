// src/error.rs
// Error taxonomy for the derivation -> integration -> playback pipeline.
// Every variant is fatal: nothing here is retried, and all of them surface before the first frame.

use thiserror::Error;

/// Failures while turning a Lagrangian into a closed-form angular acceleration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DerivationError {
    /// The equation of motion does not contain the second derivative at all.
    #[error("equation of motion has no solution for the angular acceleration")]
    NoSolution,

    /// The equation of motion is polynomial of higher degree in the second derivative.
    #[error("equation of motion is degree {degree} in the angular acceleration; expected exactly one solution")]
    MultipleSolutions {
        /// Degree of the second derivative in the equation.
        degree: i32,
    },

    /// The solved expression still depends on something other than (g, l, theta[, theta']).
    #[error("solved acceleration still depends on `{symbol}`")]
    UnboundSymbol {
        /// Printable name of the leftover symbol.
        symbol: String,
    },
}

/// Errors raised while configuring or running a simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// Model construction failed.
    #[error("derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    /// Integration produced NaN or infinity.
    #[error("integration produced a non-finite angle {angle} at sample {index} (t = {time})")]
    NonFiniteSample {
        /// Index into the time grid.
        index: usize,
        /// Time of the offending sample.
        time: f64,
        /// The value that was produced.
        angle: f64,
    },

    /// A raw trajectory handed in for playback holds NaN or infinity.
    #[error("trajectory sample {index} is not finite: {angle}")]
    NonFiniteTrajectory {
        /// Index of the offending sample.
        index: usize,
        /// The value found there.
        angle: f64,
    },

    /// A request asks for more than the server is configured to integrate.
    #[error("{field} = {value} exceeds the configured limit of {limit}")]
    LimitExceeded {
        /// Name of the request field.
        field: &'static str,
        /// Requested value.
        value: f64,
        /// Configured maximum.
        limit: f64,
    },

    /// Time grid has no entries.
    #[error("time grid is empty")]
    EmptyTimeGrid,

    /// Time grid does not begin at zero.
    #[error("time grid must start at 0, got {start}")]
    TimeGridNotAtZero {
        /// First grid entry.
        start: f64,
    },

    /// Time grid is not strictly increasing.
    #[error("time grid is not strictly increasing at index {index}: {previous} -> {current}")]
    NonMonotonicTimeGrid {
        /// Index of the offending entry.
        index: usize,
        /// Entry before it.
        previous: f64,
        /// The offending entry.
        current: f64,
    },

    /// Time grid contains NaN or infinity.
    #[error("time grid entry {index} is not finite")]
    NonFiniteTimeGrid {
        /// Index of the offending entry.
        index: usize,
    },

    /// Damping coefficient below zero.
    #[error("damping coefficient must be >= 0, got {damping}")]
    NegativeDamping {
        /// Offending coefficient.
        damping: f64,
    },

    /// A trajectory was built from no samples.
    #[error("trajectory must contain at least one sample")]
    EmptyTrajectory,

    /// Playback tick rate that cannot produce a positive frame increment.
    #[error("frame rate must be positive and finite, got {fps}")]
    InvalidFrameRate {
        /// Offending frames per second.
        fps: f64,
    },
}

pub type Result<T, E = SimulationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_error_wraps_into_simulation_error() {
        let err: SimulationError = DerivationError::NoSolution.into();
        assert!(err.to_string().starts_with("derivation failed"));
    }

    #[test]
    fn non_finite_sample_names_the_index() {
        let err = SimulationError::NonFiniteSample {
            index: 3,
            time: 0.5,
            angle: f64::NAN,
        };
        let message = err.to_string();
        assert!(message.contains("sample 3"));
        assert!(message.contains("NaN"));
    }
}
