// src/simulation.rs
// Ties the pipeline together for one run: a Scenario is solved once, the trajectory moves into a
// PlaybackBuffer, and every frame tick reads the angle, hands it to the renderer, advances, and lets
// the settle monitor look at the sample that will be drawn next.
// The undamped variant carries no monitor and loops until the caller stops it.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SimulationError};
use crate::logic::{InitialState, PendulumParameters, PendulumSolver, Solution, TimeGrid, Trajectory};
use crate::math::{EquationOfMotion, SimplePendulum};
use crate::playback::PlaybackBuffer;
use crate::settle::{DwellPolicy, SettleMonitor, SettleSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Linear friction and the settle rule.
    #[default]
    Damped,
    /// Frictionless, loops forever.
    Undamped,
}

/// Screen-space bob centre for a given angle, y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BobPosition {
    pub x: f64,
    pub y: f64,
}

impl BobPosition {
    pub fn from_angle(origin: (f64, f64), length: f64, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            x: origin.0 + length * sin,
            y: origin.1 + length * cos,
        }
    }
}

/// Pivot at the screen centre, halved the integer way.
pub fn screen_origin(width: u32, height: u32) -> (f64, f64) {
    ((width / 2) as f64, (height / 2) as f64)
}

/// Everything one tick produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// 1-based frame counter.
    pub number: u64,
    /// Angle drawn this frame.
    pub angle: f64,
    pub bob: BobPosition,
    pub signal: SettleSignal,
}

/// Fully resolved inputs of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub variant: ModelVariant,
    pub width: u32,
    pub height: u32,
    /// Doubles as the physical length and the drawn rod length in pixels.
    pub length: f64,
    pub gravity: f64,
    pub damping: f64,
    pub t_end: f64,
    pub samples: usize,
    pub initial_angle: f64,
    pub initial_velocity: f64,
    pub max_step: f64,
    pub fps: f64,
    pub auto_stop: bool,
    pub settle_angle_degrees: f64,
    pub settle_dwell: f64,
    pub dwell_policy: DwellPolicy,
}

impl Scenario {
    pub fn parameters(&self) -> Result<PendulumParameters> {
        PendulumParameters::new(self.length, self.gravity, self.damping)
    }

    pub fn grid(&self) -> Result<TimeGrid> {
        TimeGrid::linspace(self.t_end, self.samples)
    }

    /// Derives the equation of motion and integrates it over the scenario's grid.
    pub fn solve(&self) -> Result<Solution> {
        let parameters = self.parameters()?;
        let grid = self.grid()?;
        let equation = EquationOfMotion::derive(&SimplePendulum)?;
        debug!(acceleration = equation.expression(), "equation of motion ready");
        PendulumSolver::new(parameters, equation)
            .with_max_step(self.max_step)
            .solve(&grid, InitialState::new(self.initial_angle, self.initial_velocity))
    }

    pub fn monitor(&self) -> Result<Option<SettleMonitor>> {
        if !self.auto_stop {
            return Ok(None);
        }
        let monitor = SettleMonitor::new(
            self.settle_angle_degrees.to_radians(),
            frame_increment(self.fps)?,
            self.settle_dwell,
            self.dwell_policy,
        )?;
        Ok(Some(monitor))
    }

    /// Wraps an already solved trajectory for playback.
    /// The frame rate paces every variant, so it is checked even when no monitor is built.
    pub fn start(&self, trajectory: Trajectory) -> Result<Simulation> {
        frame_increment(self.fps)?;
        Ok(Simulation::new(
            trajectory,
            self.monitor()?,
            screen_origin(self.width, self.height),
            self.length,
        ))
    }

    pub fn build(&self) -> Result<Simulation> {
        let trajectory = self.solve()?.into_trajectory()?;
        self.start(trajectory)
    }
}

fn frame_increment(fps: f64) -> Result<f64> {
    if fps.is_finite() && fps > 0.0 {
        Ok(1.0 / fps)
    } else {
        Err(SimulationError::InvalidFrameRate { fps })
    }
}

/// One animation run: playback cursor, optional settle monitor, renderer geometry.
#[derive(Debug, Clone)]
pub struct Simulation {
    playback: PlaybackBuffer,
    monitor: Option<SettleMonitor>,
    origin: (f64, f64),
    length: f64,
    frames: u64,
}

impl Simulation {
    pub fn new(trajectory: Trajectory, monitor: Option<SettleMonitor>, origin: (f64, f64), length: f64) -> Self {
        Self {
            playback: PlaybackBuffer::new(trajectory),
            monitor,
            origin,
            length,
            frames: 0,
        }
    }

    pub fn current_angle(&self) -> f64 {
        self.playback.current()
    }

    pub fn advance(&mut self) {
        self.playback.advance();
    }

    pub fn bob(&self) -> BobPosition {
        BobPosition::from_angle(self.origin, self.length, self.current_angle())
    }

    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    pub fn playback(&self) -> &PlaybackBuffer {
        &self.playback
    }

    pub fn monitor(&self) -> Option<&SettleMonitor> {
        self.monitor.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// One frame: read, advance, then check the settle rule against the new cursor.
    pub fn tick(&mut self) -> Frame {
        self.frames += 1;
        let angle = self.current_angle();
        let bob = self.bob();
        self.advance();
        let next = self.current_angle();
        let signal = match self.monitor.as_mut() {
            Some(monitor) => monitor.observe(next),
            None => SettleSignal::Continue,
        };
        Frame {
            number: self.frames,
            angle,
            bob,
            signal,
        }
    }

    /// Plays frames until the settle rule fires, giving up after `max_frames`.
    /// Returns the frames drawn up to and including the stopping one.
    pub fn run_until_settled(&mut self, max_frames: u64) -> Option<Vec<Frame>> {
        if self.monitor.is_none() {
            return None;
        }
        let mut frames = Vec::new();
        for _ in 0..max_frames {
            let frame = self.tick();
            frames.push(frame);
            if frame.signal == SettleSignal::Stop {
                return Some(frames);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::f64::consts::FRAC_PI_4;

    fn resting(samples: usize) -> Simulation {
        let monitor = SettleMonitor::for_frame_rate(30.0, DwellPolicy::Cumulative).unwrap();
        Simulation::new(
            Trajectory::new(vec![0.0; samples]).unwrap(),
            Some(monitor),
            screen_origin(800, 600),
            200.0,
        )
    }

    #[test]
    fn bob_hangs_below_the_pivot_at_rest() {
        let bob = BobPosition::from_angle(screen_origin(800, 600), 200.0, 0.0);
        assert_eq!(bob, BobPosition { x: 400.0, y: 500.0 });
    }

    #[test]
    fn odd_screen_sizes_halve_down() {
        assert_eq!(screen_origin(801, 601), (400.0, 300.0));
    }

    #[test]
    fn resting_run_stops_on_frame_sixty() {
        let mut sim = resting(45);
        let frames = sim.run_until_settled(1_000).unwrap();
        assert_eq!(frames.len(), 60);
        assert_eq!(frames.last().unwrap().number, 60);
        assert!(frames[..59].iter().all(|f| f.signal == SettleSignal::Continue));
    }

    #[test]
    fn tick_draws_current_then_checks_next() {
        let monitor = SettleMonitor::new(0.1, 1.0, 1.0, DwellPolicy::Cumulative).unwrap();
        let mut sim = Simulation::new(
            Trajectory::new(vec![1.0, 0.0]).unwrap(),
            Some(monitor),
            (0.0, 0.0),
            1.0,
        );
        let frame = sim.tick();
        assert_eq!(frame.angle, 1.0);
        assert_eq!(frame.signal, SettleSignal::Stop);
        assert_eq!(sim.current_angle(), 0.0);
    }

    #[test]
    fn undamped_default_never_stops() {
        let scenario = Config::default().scenario(ModelVariant::Undamped);
        let mut sim = scenario.build().unwrap();
        assert!(sim.monitor().is_none());
        assert!(sim.run_until_settled(10_000).is_none());
        for _ in 0..1_000 {
            assert_eq!(sim.tick().signal, SettleSignal::Continue);
        }
    }

    #[test]
    fn damped_default_settles() {
        let scenario = Config::default().scenario(ModelVariant::Damped);
        assert_eq!(scenario.initial_angle, FRAC_PI_4);
        let mut sim = scenario.build().unwrap();
        assert_eq!(sim.playback().len(), 200);
        let frames = sim.run_until_settled(5_000).expect("damped pendulum should settle");
        assert!(frames.len() >= 60);
    }

    #[test]
    fn undamped_scenario_rejects_unusable_frame_rates() {
        let mut scenario = Config::default().scenario(ModelVariant::Undamped);
        for fps in [0.0, -30.0, f64::INFINITY] {
            scenario.fps = fps;
            assert!(
                matches!(scenario.build(), Err(SimulationError::InvalidFrameRate { .. })),
                "fps {fps}"
            );
        }
        scenario.fps = f64::NAN;
        assert!(matches!(scenario.build(), Err(SimulationError::InvalidFrameRate { .. })));
    }

    #[test]
    fn zero_length_scenario_fails_before_playback() {
        let mut scenario = Config::default().scenario(ModelVariant::Damped);
        scenario.length = 0.0;
        assert!(scenario.build().is_err());
    }
}
