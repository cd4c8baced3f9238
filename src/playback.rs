// src/playback.rs
// Cyclic cursor over a solved trajectory: one sample per frame, index 0 follows the last sample.

use crate::logic::Trajectory;

#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    trajectory: Trajectory,
    cursor: usize,
}

impl PlaybackBuffer {
    pub fn new(trajectory: Trajectory) -> Self {
        Self {
            trajectory,
            cursor: 0,
        }
    }

    /// Angle under the cursor.
    pub fn current(&self) -> f64 {
        // cursor < len is maintained by advance(), and a Trajectory is never empty
        self.trajectory.angles()[self.cursor]
    }

    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.trajectory.len();
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    /// Back to the first sample.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }
}

/// Endless stream of angles; yields the current sample, then advances.
impl Iterator for PlaybackBuffer {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let angle = self.current();
        self.advance();
        Some(angle)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
