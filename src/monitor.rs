// Pose-certainty monitor: watches accelerometer jerk for impacts that
// invalidate any downstream pose estimate.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Samples retained for inspection; the jerk itself only needs the two
/// most recent.
pub const MOTION_WINDOW: usize = 32;

/// One accelerometer sample: monotonic timestamp in seconds, body-frame
/// acceleration in g.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp: f64,
    pub accel: [f64; 3],
}

impl MotionSample {
    pub fn new(timestamp: f64, accel: [f64; 3]) -> Self {
        Self { timestamp, accel }
    }

    pub fn magnitude(&self) -> f64 {
        let [x, y, z] = self.accel;
        (x * x + y * y + z * z).sqrt()
    }
}

/// Whether the robot's pose estimate can currently be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Certain,
    Uncertain,
}

/// Rolling jerk detector over a bounded sample window.
///
/// Each accepted sample updates the confidence from the jerk between the two
/// most recent samples alone; a calm sample immediately restores `Certain`
/// after a spike. Samples with a non-positive time step are rejected and the
/// previous confidence is kept.
pub struct PoseCertaintyMonitor {
    samples: VecDeque<MotionSample>,
    capacity: usize,
    max_jerk: f64,
    confidence: Confidence,
    last_jerk: Option<f64>,
}

impl PoseCertaintyMonitor {
    pub fn new(max_jerk: f64) -> Self {
        Self::with_capacity(max_jerk, MOTION_WINDOW)
    }

    pub fn with_capacity(max_jerk: f64, capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(2)),
            capacity: capacity.max(2),
            max_jerk: max_jerk.abs(),
            confidence: Confidence::Certain,
            last_jerk: None,
        }
    }

    /// Feed one accelerometer sample and update the confidence.
    pub fn record(&mut self, sample: MotionSample) {
        if !sample.timestamp.is_finite() || sample.accel.iter().any(|a| !a.is_finite()) {
            debug!("rejecting non-finite motion sample");
            return;
        }

        if let Some(last) = self.samples.back() {
            let dt = sample.timestamp - last.timestamp;
            if !(dt > 0.0) {
                debug!("rejecting motion sample with non-positive dt {dt}");
                return;
            }

            let jerk = (sample.magnitude() - last.magnitude()) / dt;
            self.last_jerk = Some(jerk);
            self.confidence = if jerk.abs() > self.max_jerk {
                Confidence::Uncertain
            } else {
                Confidence::Certain
            };
        }

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Jerk between the two most recently accepted samples, g/s.
    pub fn last_jerk(&self) -> Option<f64> {
        self.last_jerk
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
