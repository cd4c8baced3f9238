// src/config.rs
// TOML configuration. Every field has a default, so an empty file (or no file) gives the stock
// 800x600 window, 200 px pendulum released from 45 degrees, and 30 fps playback.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;
use std::path::{Path, PathBuf};

use crate::logic::{DEFAULT_GRAVITY, DEFAULT_MAX_STEP};
use crate::settle::{DwellPolicy, DEFAULT_SETTLE_ANGLE_DEGREES, DEFAULT_SETTLE_DWELL};
use crate::simulation::{ModelVariant, Scenario};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub simulation: SimulationConfig,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub static_dir: PathBuf,
    /// Longest simulated horizon a request may ask for.
    pub max_t_end: f64,
    /// Most grid samples a request may ask for.
    pub max_samples: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: PathBuf::from("static"),
            max_t_end: 600.0,
            max_samples: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub width: u32,
    pub height: u32,
    pub length: f64,
    pub gravity: f64,
    /// Radians.
    pub initial_angle: f64,
    pub initial_velocity: f64,
    pub max_step: f64,
    pub damped: VariantConfig,
    pub undamped: VariantConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            length: 200.0,
            gravity: DEFAULT_GRAVITY,
            initial_angle: FRAC_PI_4,
            initial_velocity: 0.0,
            max_step: DEFAULT_MAX_STEP,
            damped: VariantConfig::damped(),
            undamped: VariantConfig::undamped(),
        }
    }
}

/// Per-variant time grid, friction and stopping rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub damping: f64,
    pub t_end: f64,
    pub samples: usize,
    pub auto_stop: bool,
}

impl VariantConfig {
    pub fn damped() -> Self {
        Self {
            damping: 0.10,
            t_end: 30.0,
            samples: 200,
            auto_stop: true,
        }
    }

    pub fn undamped() -> Self {
        Self {
            damping: 0.0,
            t_end: 10.0,
            samples: 100,
            auto_stop: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub fps: f64,
    pub settle_angle_degrees: f64,
    pub settle_dwell: f64,
    pub dwell_policy: DwellPolicy,
    /// Cap on frames replayed when searching for the settle frame.
    pub max_replay_frames: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            settle_angle_degrees: DEFAULT_SETTLE_ANGLE_DEGREES,
            settle_dwell: DEFAULT_SETTLE_DWELL,
            dwell_policy: DwellPolicy::Cumulative,
            max_replay_frames: 10_000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn variant(&self, variant: ModelVariant) -> &VariantConfig {
        match variant {
            ModelVariant::Damped => &self.simulation.damped,
            ModelVariant::Undamped => &self.simulation.undamped,
        }
    }

    /// Flattens the config into the inputs of one run of `variant`.
    pub fn scenario(&self, variant: ModelVariant) -> Scenario {
        let sim = &self.simulation;
        let model = self.variant(variant);
        Scenario {
            variant,
            width: sim.width,
            height: sim.height,
            length: sim.length,
            gravity: sim.gravity,
            damping: model.damping,
            t_end: model.t_end,
            samples: model.samples,
            initial_angle: sim.initial_angle,
            initial_velocity: sim.initial_velocity,
            max_step: sim.max_step,
            fps: self.playback.fps,
            auto_stop: model.auto_stop,
            settle_angle_degrees: self.playback.settle_angle_degrees,
            settle_dwell: self.playback.settle_dwell,
            dwell_policy: self.playback.dwell_policy,
        }
    }
}
