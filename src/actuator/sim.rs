// Deterministic simulated actuator: first-order motor model per channel.
//
// Cloning shares the underlying state, so tests (and the sim runtime) keep a
// handle to step the model and inspect the last commanded outputs while the
// module owns the boxed port.

use std::sync::{Arc, Mutex};

use super::{ActuatorError, ModuleActuator};

/// Steady-state motor velocity per volt, rad/s.
pub const DEFAULT_KV: f64 = 40.0;
/// First-order response time constant, seconds.
pub const DEFAULT_TIME_CONSTANT: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default)]
struct SimMotor {
    volts: f64,
    velocity: f64, // rad/s
    position: f64, // rad
}

#[derive(Debug)]
struct SimState {
    drive: SimMotor,
    turn: SimMotor,
    kv: f64,
    time_constant: f64,
}

#[derive(Clone)]
pub struct SimActuator {
    state: Arc<Mutex<SimState>>,
}

impl SimActuator {
    pub fn new() -> Self {
        Self::with_model(DEFAULT_KV, DEFAULT_TIME_CONSTANT)
    }

    pub fn with_model(kv: f64, time_constant: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                drive: SimMotor::default(),
                turn: SimMotor::default(),
                kv,
                time_constant,
            })),
        }
    }

    /// Advance both motor models by `dt` seconds.
    pub fn step(&self, dt: f64) {
        if let Ok(mut state) = self.state.lock() {
            let kv = state.kv;
            let tau = state.time_constant;
            step_motor(&mut state.drive, kv, tau, dt);
            step_motor(&mut state.turn, kv, tau, dt);
        }
    }

    pub fn last_drive_volts(&self) -> f64 {
        self.state.lock().map(|s| s.drive.volts).unwrap_or(0.0)
    }

    pub fn last_turn_volts(&self) -> f64 {
        self.state.lock().map(|s| s.turn.volts).unwrap_or(0.0)
    }

    /// Preset the steering shaft angle, rad (e.g. absolute-encoder seed).
    pub fn set_turn_position(&self, rad: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.turn.position = rad;
        }
    }

    /// Current steering shaft angle, rad, continuous.
    pub fn turn_position(&self) -> f64 {
        self.state.lock().map(|s| s.turn.position).unwrap_or(0.0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimState>, ActuatorError> {
        self.state.lock().map_err(|_| ActuatorError::Poisoned)
    }
}

impl Default for SimActuator {
    fn default() -> Self {
        Self::new()
    }
}

fn step_motor(motor: &mut SimMotor, kv: f64, time_constant: f64, dt: f64) {
    if !(dt > 0.0) {
        return;
    }
    let target = motor.volts * kv;
    let alpha = (dt / time_constant).min(1.0);
    motor.velocity += (target - motor.velocity) * alpha;
    motor.position += motor.velocity * dt;
}

impl ModuleActuator for SimActuator {
    fn set_drive_output(&mut self, volts: f64) -> Result<(), ActuatorError> {
        self.lock()?.drive.volts = volts;
        Ok(())
    }

    fn set_turn_output(&mut self, volts: f64) -> Result<(), ActuatorError> {
        self.lock()?.turn.volts = volts;
        Ok(())
    }

    fn drive_velocity(&mut self) -> Result<f64, ActuatorError> {
        Ok(self.lock()?.drive.velocity)
    }

    fn turn_angle(&mut self) -> Result<f64, ActuatorError> {
        Ok(self.lock()?.turn.position)
    }
}
