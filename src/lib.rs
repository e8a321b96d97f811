// Control runtime for a four-module swerve drivetrain.
//
// Operator input (or direct chassis-rate commands) is shaped into a chassis
// velocity, split into per-module steering/drive targets, and closed-loop
// controlled against the module actuators. An IMU-fed monitor tracks how
// much the pose estimate should be trusted.

pub mod actuator;
pub mod config;
pub mod control;
pub mod messages;
pub mod monitor;
pub mod runtime;
pub mod swerve;
