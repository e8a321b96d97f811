// Closed-loop control of one swerve module: steering angle and wheel speed.
//
// Each cycle samples the actuator once, optimizes the target so the azimuth
// never swings further than a quarter turn, then closes a profiled PID on
// the steering angle and a slewed PID+feedforward on the wheel speed.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::warn;

use crate::actuator::ModuleActuator;
use crate::config::{ChassisConfig, ModuleConfig};
use crate::control::pid::{Pid, ProfileState, TrapezoidProfile};
use crate::swerve::angle::{shortest_angular_error, wrap_angle};
use crate::swerve::kinematics::ModuleState;

pub struct SwerveModule {
    config: ModuleConfig,
    actuator: Box<dyn ModuleActuator>,
    turn_pid: Pid,
    drive_pid: Pid,
    turn_profile: TrapezoidProfile,
    drive_profile: TrapezoidProfile,
    turn_setpoint: Option<ProfileState>,
    drive_setpoint: f64,
    target: ModuleState,
    measured: ModuleState,
    max_speed: f64,
    max_output_voltage: f64,
}

impl SwerveModule {
    pub fn new(
        config: ModuleConfig,
        chassis: &ChassisConfig,
        actuator: Box<dyn ModuleActuator>,
    ) -> Self {
        let turn_pid = Pid::new(config.turn_gains);
        let drive_pid = Pid::new(config.drive_gains);
        let turn_profile = TrapezoidProfile::new(
            chassis.turn_max_angular_velocity,
            chassis.turn_max_angular_acceleration,
        );
        let drive_profile =
            TrapezoidProfile::new(chassis.drive_max_velocity, chassis.drive_max_acceleration);

        Self {
            config,
            actuator,
            turn_pid,
            drive_pid,
            turn_profile,
            drive_profile,
            turn_setpoint: None,
            drive_setpoint: 0.0,
            target: ModuleState::default(),
            measured: ModuleState::default(),
            max_speed: chassis.max_speed,
            max_output_voltage: chassis.max_output_voltage,
        }
    }

    /// Store the target for the next cycle. Never blocks and never fails:
    /// out-of-range speeds clamp to the robot maximum, the angle wraps into
    /// (-pi, pi], and non-finite values fall back to the previous target.
    pub fn set_target(&mut self, target: ModuleState) {
        let speed = if target.speed.is_finite() {
            target.speed.clamp(-self.max_speed, self.max_speed)
        } else {
            self.target.speed
        };
        let angle = if target.angle.is_finite() {
            wrap_angle(target.angle)
        } else {
            self.target.angle
        };
        self.target = ModuleState::new(speed, angle);
    }

    pub fn target_state(&self) -> ModuleState {
        self.target
    }

    /// Last sampled state. Read-only, no side effects.
    pub fn measured_state(&self) -> ModuleState {
        self.measured
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// One control cycle: sample sensors, optimize the target, close both
    /// loops, write outputs. Always runs to completion; failed reads hold
    /// the last-known measurement and failed writes are logged.
    pub fn run_cycle(&mut self, dt: f64) {
        self.sample();

        let (speed_target, angle_error) = self.optimize_target();
        let turn_volts = self.turn_output(angle_error, dt);
        let drive_volts = self.drive_output(speed_target, dt);

        let direction = if self.config.invert_drive { -1.0 } else { 1.0 };
        if let Err(e) = self.actuator.set_turn_output(turn_volts) {
            warn!("{}: turn output failed: {}", self.config.location.key(), e);
        }
        if let Err(e) = self.actuator.set_drive_output(direction * drive_volts) {
            warn!("{}: drive output failed: {}", self.config.location.key(), e);
        }
    }

    /// Snapshot both sensors once. A failed read degrades to the last-known
    /// value rather than aborting the cycle.
    fn sample(&mut self) {
        match self.actuator.turn_angle() {
            Ok(motor_rad) => {
                self.measured.angle = wrap_angle(motor_rad / self.config.turn_gear_ratio);
            }
            Err(e) => warn!(
                "{}: turn angle read failed, holding last: {}",
                self.config.location.key(),
                e
            ),
        }

        let direction = if self.config.invert_drive { -1.0 } else { 1.0 };
        match self.actuator.drive_velocity() {
            Ok(motor_rad_s) => {
                self.measured.speed =
                    direction * self.config.motor_rad_s_to_wheel_speed(motor_rad_s);
            }
            Err(e) => warn!(
                "{}: drive velocity read failed, holding last: {}",
                self.config.location.key(),
                e
            ),
        }
    }

    /// Steer the short way round: if the angular error exceeds a quarter
    /// turn, reverse the wheel instead and steer to the complementary angle.
    fn optimize_target(&self) -> (f64, f64) {
        let mut speed = self.target.speed;
        let mut error = shortest_angular_error(self.target.angle, self.measured.angle);
        if error.abs() > FRAC_PI_2 {
            speed = -speed;
            error = wrap_angle(error - PI);
        }
        (speed, error)
    }

    fn turn_output(&mut self, angle_error: f64, dt: f64) -> f64 {
        // The first cycle seeds the profiled setpoint from the measurement,
        // so powering on with the wheel at an arbitrary azimuth starts the
        // profile at rest there instead of kicking toward zero.
        let mut setpoint = self
            .turn_setpoint
            .unwrap_or_else(|| ProfileState::new(self.measured.angle, 0.0));

        // Keep the setpoint in the wrap neighborhood of the measurement so
        // the profile never chases a full-turn offset.
        setpoint.position =
            self.measured.angle + wrap_angle(setpoint.position - self.measured.angle);

        let goal = self.measured.angle + angle_error;
        let setpoint = self.turn_profile.step(setpoint, goal, dt);
        self.turn_setpoint = Some(setpoint);

        let error = setpoint.position - self.measured.angle;
        let volts = self.turn_pid.update(error, dt);
        volts.clamp(-self.max_output_voltage, self.max_output_voltage)
    }

    fn drive_output(&mut self, speed_target: f64, dt: f64) -> f64 {
        self.drive_setpoint = self.drive_profile.slew(self.drive_setpoint, speed_target, dt);

        let error = self.drive_setpoint - self.measured.speed;
        let volts = self.drive_pid.update(error, dt)
            + self.config.drive_feedforward.output(self.drive_setpoint);
        volts.clamp(-self.max_output_voltage, self.max_output_voltage)
    }
}
