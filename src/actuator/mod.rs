// Actuator port for swerve modules.
//
// Provides:
// - The capability trait the control core drives modules through
// - Serial module-bus backend (one shared bus, two motor channels per module)
// - Deterministic simulated actuator for tests and --sim runs

pub mod serial;
pub mod sim;

pub use serial::{BusActuator, BusError, SwerveBus};
pub use sim::SimActuator;

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("actuator state lock poisoned")]
    Poisoned,
}

/// Capability surface of one module's motor pair, in motor-shaft units.
/// The control core converts to mechanism units via the module config.
pub trait ModuleActuator: Send {
    /// Command the drive motor, volts.
    fn set_drive_output(&mut self, volts: f64) -> Result<(), ActuatorError>;

    /// Command the steering motor, volts.
    fn set_turn_output(&mut self, volts: f64) -> Result<(), ActuatorError>;

    /// Drive motor shaft velocity, rad/s.
    fn drive_velocity(&mut self) -> Result<f64, ActuatorError>;

    /// Steering motor shaft angle, rad, continuous (not wrapped).
    fn turn_angle(&mut self) -> Result<f64, ActuatorError>;
}
