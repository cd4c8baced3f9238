//! Damped and undamped simple pendulum: the equation of motion is derived from the Lagrangian,
//! integrated over a time grid, and replayed as a looping animation with an optional settle rule.

pub mod config;
pub mod error;
pub mod logic;
pub mod math;
pub mod playback;
pub mod settle;
pub mod simulation;
pub mod ui;

pub use error::{DerivationError, SimulationError};
pub use logic::{InitialState, PendulumParameters, PendulumSolver, Solution, TimeGrid, Trajectory};
pub use math::{EquationOfMotion, Lagrangian, SimplePendulum};
pub use playback::PlaybackBuffer;
pub use settle::{DwellPolicy, SettleMonitor, SettleSignal};
pub use simulation::{BobPosition, Frame, ModelVariant, Scenario, Simulation};
