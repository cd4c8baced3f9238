// src/settle.rs
// Decides when a damped pendulum has visibly come to rest.
// Each observed frame whose |angle| is inside the window adds one frame increment of dwell time;
// once the dwell reaches the limit the monitor latches and reports Stop from then on, whatever the policy.
// Dwell is tracked as a frame count so 60 frames at 1/30 land exactly on 2 time units.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SimulationError};

pub const DEFAULT_SETTLE_ANGLE_DEGREES: f64 = 5.0;
pub const DEFAULT_SETTLE_DWELL: f64 = 2.0;

// Slack when converting the dwell limit into a whole number of frames.
const FRAME_ROUNDING_SLACK: f64 = 1e-9;

/// How time spent inside the window accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DwellPolicy {
    /// Total time inside the window over the whole run; leaving it does not reset anything.
    #[default]
    Cumulative,
    /// Only the current uninterrupted stretch inside the window counts.
    Consecutive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleSignal {
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
pub struct SettleMonitor {
    angle_threshold: f64,
    frame_increment: f64,
    required_frames: u64,
    dwell_frames: u64,
    frames_observed: u64,
    policy: DwellPolicy,
    settled: bool,
}

impl SettleMonitor {
    /// `angle_threshold` in radians, `frame_increment` and `dwell_limit` in time units.
    pub fn new(angle_threshold: f64, frame_increment: f64, dwell_limit: f64, policy: DwellPolicy) -> Result<Self> {
        if !(frame_increment.is_finite() && frame_increment > 0.0) {
            return Err(SimulationError::InvalidFrameRate { fps: 1.0 / frame_increment });
        }
        let required_frames = ((dwell_limit / frame_increment) - FRAME_ROUNDING_SLACK).ceil().max(0.0) as u64;
        Ok(Self {
            angle_threshold,
            frame_increment,
            required_frames,
            dwell_frames: 0,
            frames_observed: 0,
            policy,
            settled: false,
        })
    }

    /// 5 degree window, 2 time units of dwell, increments of 1/fps.
    pub fn for_frame_rate(fps: f64, policy: DwellPolicy) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(SimulationError::InvalidFrameRate { fps });
        }
        Self::new(DEFAULT_SETTLE_ANGLE_DEGREES.to_radians(), 1.0 / fps, DEFAULT_SETTLE_DWELL, policy)
    }

    /// Feeds the angle shown this frame. Once Stop is returned it is returned for every later frame.
    pub fn observe(&mut self, angle: f64) -> SettleSignal {
        self.frames_observed += 1;
        if self.settled {
            return SettleSignal::Stop; // Latched; later swings do not matter.
        }
        if angle.abs() < self.angle_threshold {
            self.dwell_frames += 1; // One more frame increment near equilibrium.
        } else if self.policy == DwellPolicy::Consecutive {
            self.dwell_frames = 0; // Stretch broken.
        }

        if self.dwell_frames >= self.required_frames {
            self.settled = true;
            info!(
                frame = self.frames_observed,
                dwell = self.dwell(),
                policy = ?self.policy,
                "pendulum settled"
            );
            SettleSignal::Stop
        } else {
            SettleSignal::Continue
        }
    }

    /// Accumulated time inside the window.
    pub fn dwell(&self) -> f64 {
        self.dwell_frames as f64 * self.frame_increment
    }

    pub fn dwell_frames(&self) -> u64 {
        self.dwell_frames
    }

    pub fn required_frames(&self) -> u64 {
        self.required_frames
    }

    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(policy: DwellPolicy) -> SettleMonitor {
        SettleMonitor::for_frame_rate(30.0, policy).unwrap()
    }

    #[test]
    fn resting_pendulum_stops_after_exactly_two_seconds() {
        let mut m = monitor(DwellPolicy::Cumulative);
        assert_eq!(m.required_frames(), 60);
        for frame in 1..60 {
            assert_eq!(m.observe(0.0), SettleSignal::Continue, "frame {frame}");
        }
        assert_eq!(m.observe(0.0), SettleSignal::Stop);
        assert!((m.dwell() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cumulative_dwell_survives_leaving_the_window() {
        let mut m = monitor(DwellPolicy::Cumulative);
        let wide = 0.5;
        for _ in 0..20 {
            m.observe(0.01);
        }
        for _ in 0..15 {
            m.observe(wide);
        }
        for _ in 0..10 {
            m.observe(-0.02);
        }
        assert_eq!(m.dwell_frames(), 30);
        assert!((m.dwell() - 30.0 / 30.0).abs() < 1e-12);
        assert!(!m.is_settled());
    }

    #[test]
    fn consecutive_policy_resets_on_exit() {
        let mut m = monitor(DwellPolicy::Consecutive);
        for _ in 0..50 {
            m.observe(0.0);
        }
        m.observe(1.0);
        assert_eq!(m.dwell_frames(), 0);
        for _ in 0..59 {
            assert_eq!(m.observe(0.0), SettleSignal::Continue);
        }
        assert_eq!(m.observe(0.0), SettleSignal::Stop);
    }

    #[test]
    fn threshold_is_strict() {
        let mut m = monitor(DwellPolicy::Cumulative);
        m.observe(5f64.to_radians());
        m.observe(-5f64.to_radians());
        assert_eq!(m.dwell_frames(), 0);
        assert_eq!(m.frames_observed(), 2);
    }

    #[test]
    fn stop_is_sticky() {
        let mut m = SettleMonitor::new(0.1, 0.5, 1.0, DwellPolicy::Cumulative).unwrap();
        m.observe(0.0);
        assert_eq!(m.observe(0.0), SettleSignal::Stop);
        assert_eq!(m.observe(3.0), SettleSignal::Stop);
    }

    #[test]
    fn consecutive_stop_stays_latched() {
        let mut m = SettleMonitor::new(0.1, 0.5, 1.0, DwellPolicy::Consecutive).unwrap();
        m.observe(0.0);
        assert_eq!(m.observe(0.0), SettleSignal::Stop);
        assert_eq!(m.observe(3.0), SettleSignal::Stop);
        assert_eq!(m.observe(0.0), SettleSignal::Stop);
        assert!(m.is_settled());
    }

    #[test]
    fn rejects_bad_frame_rate() {
        assert!(SettleMonitor::for_frame_rate(0.0, DwellPolicy::Cumulative).is_err());
        assert!(SettleMonitor::for_frame_rate(f64::NAN, DwellPolicy::Cumulative).is_err());
    }
}
