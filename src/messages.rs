// Message types carried over zenoh between operators, the runtime, and
// monitoring consumers.

use serde::{Deserialize, Serialize};

use crate::config::ModuleLocation;
use crate::monitor::Confidence;
use crate::swerve::kinematics::{ChassisVelocity, ModuleState, MODULE_COUNT};

// Direct chassis-rate command from scripts/autonomy -> runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChassisCommand {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl From<&ChassisCommand> for ChassisVelocity {
    fn from(cmd: &ChassisCommand) -> Self {
        ChassisVelocity::new(cmd.vx, cmd.vy, cmd.omega)
    }
}

// Raw operator device sample -> runtime; the runtime owns all shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// Flight-stick style input: deflections in [-1, 1], throttle in [0, 1].
    Stick { x: f64, y: f64, spin: f64, throttle: f64 },
    /// Tablet touch input: direction components and contact pressure in [0, 1].
    Tablet { x: f64, y: f64, pressure: f64 },
}

/// Watchdog state for the command stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

/// Health snapshot published once per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub runtime: RuntimeHealth,
    pub pose_confidence: Confidence,
    /// Modules running on backup wiring instead of their deploy entry.
    pub fallback_modules: Vec<ModuleLocation>,
}

/// Measured state snapshot published once per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub modules: [ModuleState; MODULE_COUNT],
    pub chassis: ChassisVelocity,
}
