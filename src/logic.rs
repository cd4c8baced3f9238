// src/logic.rs
// Numerical integration of the derived equation of motion over a caller-supplied time grid.
// State y = [θ, θ']; dy/dt = [θ', θ''(g, l, θ) - c·θ'] where c is the linear damping coefficient.
// Each grid interval is crossed with fixed RK4 substeps no longer than `max_step`, so coarse grids
// (the default is 200 samples over 30 time units) still integrate accurately.
// Angles are never wrapped; a non-finite sample anywhere aborts the solve.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SimulationError};
use crate::math::EquationOfMotion;

/// Centimetre-scale gravity, paired with pixel lengths.
pub const DEFAULT_GRAVITY: f64 = 980.0;

/// Default upper bound on a single RK4 step.
pub const DEFAULT_MAX_STEP: f64 = 0.01;

/// Physical constants of one pendulum. Damping 0 disables the friction term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendulumParameters {
    pub length: f64,
    pub gravity: f64,
    pub damping: f64,
}

impl PendulumParameters {
    pub fn new(length: f64, gravity: f64, damping: f64) -> Result<Self> {
        if damping.is_nan() || damping < 0.0 {
            return Err(SimulationError::NegativeDamping { damping });
        }
        Ok(Self {
            length,
            gravity,
            damping,
        })
    }

    pub fn undamped(length: f64, gravity: f64) -> Self {
        Self {
            length,
            gravity,
            damping: 0.0,
        }
    }

    pub fn is_damped(&self) -> bool {
        self.damping > 0.0
    }
}

/// Integration constants (θ0, θ'0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InitialState {
    pub angle: f64,
    pub angular_velocity: f64,
}

impl InitialState {
    pub fn new(angle: f64, angular_velocity: f64) -> Self {
        Self {
            angle,
            angular_velocity,
        }
    }
}

/// Strictly increasing sample times starting at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    times: Vec<f64>,
}

impl TimeGrid {
    pub fn new(times: Vec<f64>) -> Result<Self> {
        let first = *times.first().ok_or(SimulationError::EmptyTimeGrid)?;
        if let Some(index) = times.iter().position(|t| !t.is_finite()) {
            return Err(SimulationError::NonFiniteTimeGrid { index });
        }
        if first != 0.0 {
            return Err(SimulationError::TimeGridNotAtZero { start: first });
        }
        for (index, pair) in times.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SimulationError::NonMonotonicTimeGrid {
                    index: index + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        Ok(Self { times })
    }

    /// `count` evenly spaced samples over [0, end], both ends included.
    pub fn linspace(end: f64, count: usize) -> Result<Self> {
        let times = match count {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => {
                let step = end / (count - 1) as f64;
                (0..count).map(|i| i as f64 * step).collect()
            }
        };
        Self::new(times)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn end(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

/// Angle samples, one per grid entry, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    angles: Vec<f64>,
}

impl Trajectory {
    /// Rejects empty input and non-finite samples.
    pub fn new(angles: Vec<f64>) -> Result<Self> {
        if angles.is_empty() {
            return Err(SimulationError::EmptyTrajectory); // Playback needs at least one frame
        }
        if let Some((index, &angle)) = angles.iter().enumerate().find(|(_, a)| !a.is_finite()) {
            return Err(SimulationError::NonFiniteTrajectory { index, angle }); // No time axis here, only the index
        }
        Ok(Self { angles })
    }

    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    /// Never true for a constructed trajectory.
    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.angles.get(index).copied()
    }
}

/// Full integration output. Playback only consumes the angles; velocities are kept for plots and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub times: Vec<f64>,
    pub angles: Vec<f64>,
    pub angular_velocities: Vec<f64>,
}

impl Solution {
    pub fn into_trajectory(self) -> Result<Trajectory> {
        Trajectory::new(self.angles)
    }
}

/// Integrator bound to one parameter set and one derived equation of motion.
#[derive(Debug, Clone)]
pub struct PendulumSolver {
    parameters: PendulumParameters,
    equation: EquationOfMotion,
    max_step: f64,
}

impl PendulumSolver {
    pub fn new(parameters: PendulumParameters, equation: EquationOfMotion) -> Self {
        Self {
            parameters,
            equation,
            max_step: DEFAULT_MAX_STEP,
        }
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        if max_step.is_finite() && max_step > 0.0 {
            self.max_step = max_step;
        }
        self
    }

    pub fn parameters(&self) -> &PendulumParameters {
        &self.parameters
    }

    /// dy/dt for y = [θ, θ'].
    pub fn deriv(&self, y: [f64; 2]) -> [f64; 2] {
        let [angle, angular_velocity] = y; // Unpack state.
        let p = &self.parameters;
        let damping_force = -p.damping * angular_velocity; // Linear friction, zero when undamped.
        [
            self.equation.angular_velocity_of(angular_velocity), // dθ/dt = θ'.
            self.equation.angular_acceleration_at(p.gravity, p.length, angle, angular_velocity) + damping_force, // dθ'/dt = θ'' - c·θ'.
        ]
    }

    fn rk4_step(&self, y: [f64; 2], dt: f64) -> [f64; 2] {
        let shift = |base: [f64; 2], k: [f64; 2], h: f64| [base[0] + h * k[0], base[1] + h * k[1]];
        let k1 = self.deriv(y); // f(y).
        let k2 = self.deriv(shift(y, k1, 0.5 * dt)); // f(y + (dt/2) k1).
        let k3 = self.deriv(shift(y, k2, 0.5 * dt)); // f(y + (dt/2) k2).
        let k4 = self.deriv(shift(y, k3, dt)); // f(y + dt k3).
        let mut y_new = [0.0; 2];
        for i in 0..2 {
            // Weighted sum.
            y_new[i] = y[i] + (dt / 6.0) * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
        y_new
    }

    /// Integrates from the initial state across every grid point.
    pub fn solve(&self, grid: &TimeGrid, initial: InitialState) -> Result<Solution> {
        let times = grid.times().to_vec();
        let mut angles = Vec::with_capacity(times.len());
        let mut angular_velocities = Vec::with_capacity(times.len());

        let mut y = [initial.angle, initial.angular_velocity]; // y(0) from the integration constants.
        let mut substeps_total = 0usize;
        for (index, &t) in times.iter().enumerate() {
            if index > 0 {
                // Cross [t_prev, t] in equal substeps no longer than max_step.
                let interval = t - times[index - 1];
                let substeps = (interval / self.max_step).ceil().max(1.0) as usize;
                let dt = interval / substeps as f64;
                for _ in 0..substeps {
                    y = self.rk4_step(y, dt);
                }
                substeps_total += substeps;
            }
            if !y[0].is_finite() || !y[1].is_finite() {
                return Err(SimulationError::NonFiniteSample {
                    index,
                    time: t,
                    angle: y[0],
                });
            }
            angles.push(y[0]); // Kept for playback.
            angular_velocities.push(y[1]); // Kept for plots, unused by playback.
        }

        debug!(substeps = substeps_total, "integration finished");
        info!(
            samples = angles.len(),
            end = grid.end(),
            damping = self.parameters.damping,
            "solved pendulum trajectory"
        );
        Ok(Solution {
            times,
            angles,
            angular_velocities,
        })
    }
}

/// Derive-then-integrate in one call, returning only the angle samples.
pub fn solve(parameters: PendulumParameters, grid: &TimeGrid, initial: InitialState) -> Result<Trajectory> {
    let equation = EquationOfMotion::derive(&crate::math::SimplePendulum)?;
    PendulumSolver::new(parameters, equation)
        .solve(grid, initial)?
        .into_trajectory()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SimplePendulum;
    use std::f64::consts::PI;

    fn solver(parameters: PendulumParameters) -> PendulumSolver {
        PendulumSolver::new(parameters, EquationOfMotion::derive(&SimplePendulum).unwrap())
    }

    fn zero_crossings(times: &[f64], angles: &[f64]) -> Vec<f64> {
        angles
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] > 0.0 && w[1] <= 0.0 || w[0] < 0.0 && w[1] >= 0.0)
            .map(|(i, w)| {
                // linear interpolation between the bracketing samples
                let frac = w[0] / (w[0] - w[1]);
                times[i] + frac * (times[i + 1] - times[i])
            })
            .collect()
    }

    #[test]
    fn small_swing_has_harmonic_period() {
        let params = PendulumParameters::undamped(200.0, DEFAULT_GRAVITY);
        let grid = TimeGrid::linspace(10.0, 2001).unwrap();
        let sol = solver(params).solve(&grid, InitialState::new(0.01, 0.0)).unwrap();

        let crossings = zero_crossings(&sol.times, &sol.angles);
        assert!(crossings.len() >= 4);
        let expected_period = 2.0 * PI * (200.0f64 / DEFAULT_GRAVITY).sqrt();
        for pair in crossings.windows(3) {
            let period = pair[2] - pair[0];
            assert!((period - expected_period).abs() < 1e-3, "period {period} vs {expected_period}");
        }
    }

    #[test]
    fn denser_grid_tracks_cosine_more_closely() {
        let params = PendulumParameters::undamped(200.0, DEFAULT_GRAVITY);
        let omega = (DEFAULT_GRAVITY / 200.0f64).sqrt();
        let theta0 = 0.001;
        let max_error = |count: usize| {
            let grid = TimeGrid::linspace(5.0, count).unwrap();
            let sol = solver(params)
                .with_max_step(1.0)
                .solve(&grid, InitialState::new(theta0, 0.0))
                .unwrap();
            sol.times
                .iter()
                .zip(&sol.angles)
                .map(|(t, a)| (a - theta0 * (omega * t).cos()).abs())
                .fold(0.0, f64::max)
        };
        assert!(max_error(400) < max_error(40));
    }

    #[test]
    fn damped_amplitude_decays() {
        let params = PendulumParameters::new(200.0, DEFAULT_GRAVITY, 0.1).unwrap();
        let grid = TimeGrid::linspace(30.0, 200).unwrap();
        let traj = solve(params, &grid, InitialState::new(PI / 4.0, 0.0)).unwrap();

        let chunk = traj.len() / 5;
        let envelopes: Vec<f64> = traj
            .angles()
            .chunks(chunk)
            .map(|c| c.iter().fold(0.0f64, |m, a| m.max(a.abs())))
            .collect();
        for pair in envelopes.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "{envelopes:?}");
        }
        assert!(envelopes[envelopes.len() - 1] < PI / 4.0 * 0.5);
    }

    #[test]
    fn output_length_matches_grid() {
        let grid = TimeGrid::linspace(10.0, 100).unwrap();
        let sol = solver(PendulumParameters::undamped(200.0, DEFAULT_GRAVITY))
            .solve(&grid, InitialState::new(PI / 4.0, 0.0))
            .unwrap();
        assert_eq!(sol.angles.len(), 100);
        assert_eq!(sol.angular_velocities.len(), 100);
        assert_eq!(sol.angles[0], PI / 4.0);
    }

    #[test]
    fn zero_length_is_a_fatal_integration_error() {
        let grid = TimeGrid::linspace(1.0, 10).unwrap();
        let err = solve(PendulumParameters::undamped(0.0, DEFAULT_GRAVITY), &grid, InitialState::new(PI / 4.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, SimulationError::NonFiniteSample { index: 1, .. }), "{err:?}");
    }

    #[test]
    fn rest_state_stays_at_rest() {
        let grid = TimeGrid::linspace(5.0, 50).unwrap();
        let traj = solve(PendulumParameters::new(200.0, DEFAULT_GRAVITY, 0.5).unwrap(), &grid, InitialState::default())
            .unwrap();
        assert!(traj.angles().iter().all(|a| *a == 0.0));
    }

    #[test]
    fn time_grid_validation() {
        assert_eq!(TimeGrid::new(vec![]), Err(SimulationError::EmptyTimeGrid));
        assert_eq!(TimeGrid::linspace(5.0, 0), Err(SimulationError::EmptyTimeGrid));
        assert_eq!(
            TimeGrid::new(vec![0.5, 1.0]),
            Err(SimulationError::TimeGridNotAtZero { start: 0.5 })
        );
        assert_eq!(
            TimeGrid::new(vec![0.0, 1.0, 1.0]),
            Err(SimulationError::NonMonotonicTimeGrid {
                index: 2,
                previous: 1.0,
                current: 1.0
            })
        );
        assert_eq!(
            TimeGrid::new(vec![0.0, f64::INFINITY]),
            Err(SimulationError::NonFiniteTimeGrid { index: 1 })
        );
        assert!(TimeGrid::linspace(-1.0, 3).is_err());
        assert_eq!(TimeGrid::linspace(30.0, 1).unwrap().len(), 1);
    }

    #[test]
    fn negative_damping_is_rejected() {
        assert_eq!(
            PendulumParameters::new(200.0, DEFAULT_GRAVITY, -0.1),
            Err(SimulationError::NegativeDamping { damping: -0.1 })
        );
    }

    #[test]
    fn trajectory_rejects_empty_and_nan() {
        assert_eq!(Trajectory::new(vec![]), Err(SimulationError::EmptyTrajectory));
        let err = Trajectory::new(vec![0.0, 0.1, f64::INFINITY]).unwrap_err();
        assert_eq!(
            err,
            SimulationError::NonFiniteTrajectory {
                index: 2,
                angle: f64::INFINITY
            }
        );
        assert!(!err.to_string().contains("t ="));
    }
}
