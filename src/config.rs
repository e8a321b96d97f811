// Runtime constants, robot calibration, and the per-module deploy document.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::control::pid::{Feedforward, PidGains};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_CHASSIS: &str = "swerve/cmd/chassis"; // direct chassis-rate commands
pub const TOPIC_CMD_OPERATOR: &str = "swerve/cmd/operator"; // raw operator device samples
pub const TOPIC_IMU_ACCEL: &str = "swerve/imu/accel"; // accelerometer samples
pub const TOPIC_STATE_HEALTH: &str = "swerve/state/health"; // health status
pub const TOPIC_STATE_TELEMETRY: &str = "swerve/state/telemetry"; // measured module states

// Serial port for the module bus
pub const MODULE_BUS_PORT: &str = "/dev/ttyUSB0";

// Default location of the per-module deploy document
pub const DEPLOY_PATH: &str = "deploy/modules.json";

// Relative encoder resolution, counts per motor revolution (both families)
pub const ENCODER_COUNTS_PER_REV: f64 = 2048.0;

// 6 in wheels
pub const WHEEL_DIAMETER: f64 = 6.0 * 0.0254; // meters

// Motor family assumed for deploy entries that do not name one
pub const DEFAULT_MOTOR: MotorType = MotorType::Kraken;

// Backup module wiring used whenever the deploy document cannot be resolved
pub const BACKUP_DRIVE_ID: u8 = 2;
pub const BACKUP_TURN_ID: u8 = 1;
pub const BACKUP_INVERTED: bool = false;
pub const BACKUP_MOTOR: MotorType = MotorType::Kraken;

/// Motor family fitted to a module; selects gearing and loop gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorType {
    Falcon,
    Kraken,
}

impl MotorType {
    pub fn turn_gear_ratio(self) -> f64 {
        match self {
            MotorType::Falcon => 15.43,
            MotorType::Kraken => 13.3714,
        }
    }

    pub fn drive_gear_ratio(self) -> f64 {
        match self {
            MotorType::Falcon => 7.36,
            MotorType::Kraken => 9.13,
        }
    }

    /// Steering gains, volts per radian of azimuth error.
    pub fn turn_gains(self) -> PidGains {
        match self {
            MotorType::Falcon => PidGains::new(1.0, 0.0, 0.0),
            MotorType::Kraken => PidGains::new(2.3, 0.0, 0.0),
        }
    }

    /// Drive gains, volts per m/s of wheel-speed error.
    pub fn drive_gains(self) -> PidGains {
        match self {
            MotorType::Falcon => PidGains::new(0.2681, 0.0, 0.0),
            MotorType::Kraken => PidGains::new(0.8681, 0.0, 0.0),
        }
    }

    /// Drive feedforward, shared by both families (same wheel and battery).
    pub fn drive_feedforward(self) -> Feedforward {
        Feedforward::new(0.1586, 2.4408)
    }
}

/// Corner a module is mounted at. +x is forward, +y is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleLocation {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl ModuleLocation {
    pub const ALL: [ModuleLocation; 4] = [
        ModuleLocation::FrontLeft,
        ModuleLocation::FrontRight,
        ModuleLocation::BackLeft,
        ModuleLocation::BackRight,
    ];

    /// Key used for this location in the deploy document.
    pub fn key(self) -> &'static str {
        match self {
            ModuleLocation::FrontLeft => "front_left",
            ModuleLocation::FrontRight => "front_right",
            ModuleLocation::BackLeft => "back_left",
            ModuleLocation::BackRight => "back_right",
        }
    }
}

/// Wheelbase geometry, meters.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub width: f64,
    pub length: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 0.56515,
            length: 0.56515,
        }
    }
}

impl FrameConfig {
    /// Distance from the robot center to each module.
    pub fn offset_radius(&self) -> f64 {
        (self.width / 2.0).hypot(self.length / 2.0)
    }

    /// Position of a module in the robot frame.
    pub fn module_offset(&self, location: ModuleLocation) -> Vector2<f64> {
        let x = self.length / 2.0;
        let y = self.width / 2.0;
        match location {
            ModuleLocation::FrontLeft => Vector2::new(x, y),
            ModuleLocation::FrontRight => Vector2::new(x, -y),
            ModuleLocation::BackLeft => Vector2::new(-x, y),
            ModuleLocation::BackRight => Vector2::new(-x, -y),
        }
    }
}

/// Operator input shaping constants. Meters are the velocity scales the
/// shaped [-1, 1] axes are multiplied by, interpolated by the throttle.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub directional_meter_low: f64,
    pub directional_meter_high: f64,
    pub spin_meter_low: f64,
    pub spin_meter_high: f64,
    pub directional_sensitivity: f64,
    pub spin_sensitivity: f64,
    pub x_threshold: f64,
    pub y_threshold: f64,
    pub spin_threshold: f64,
    pub pressure_threshold: f64,
    pub pressure_min_speed: f64,
    pub pressure_steepness: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            directional_meter_low: 0.25,
            directional_meter_high: 4.0,
            spin_meter_low: 0.5,
            spin_meter_high: 2.4,
            directional_sensitivity: 1.0,
            spin_sensitivity: 2.0,
            x_threshold: 0.15,
            y_threshold: 0.15,
            spin_threshold: 0.3,
            pressure_threshold: 0.2,
            pressure_min_speed: 0.2,
            pressure_steepness: 2.6,
        }
    }
}

/// Chassis-wide limits.
#[derive(Debug, Clone)]
pub struct ChassisConfig {
    /// Ceiling on commanded wheel speed, m/s.
    pub max_speed: f64,
    /// Azimuth profile limits, rad/s and rad/s^2.
    pub turn_max_angular_velocity: f64,
    pub turn_max_angular_acceleration: f64,
    /// Wheel-speed setpoint limits, m/s and m/s^2.
    pub drive_max_velocity: f64,
    pub drive_max_acceleration: f64,
    /// Clamp on both motor outputs, volts.
    pub max_output_voltage: f64,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            max_speed: 7.0,
            turn_max_angular_velocity: 25.0,
            turn_max_angular_acceleration: 34.0,
            drive_max_velocity: 15.0,
            drive_max_acceleration: 30.0,
            max_output_voltage: 12.0,
        }
    }
}

/// Pose-certainty monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Jerk above this magnitude marks the pose uncertain, g/s.
    pub max_jerk: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { max_jerk: 80.0 }
    }
}

/// Complete robot calibration, fixed for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct RobotConfig {
    pub frame: FrameConfig,
    pub control: ControlConfig,
    pub chassis: ChassisConfig,
    pub monitor: MonitorConfig,
}

/// Immutable per-module calibration resolved at startup.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    pub location: ModuleLocation,
    pub drive_id: u8,
    pub turn_id: u8,
    pub invert_drive: bool,
    pub drive_gear_ratio: f64,
    pub turn_gear_ratio: f64,
    pub encoder_counts_per_rev: f64,
    pub wheel_diameter: f64,
    pub turn_gains: PidGains,
    pub drive_gains: PidGains,
    pub drive_feedforward: Feedforward,
    pub location_offset: Vector2<f64>,
}

impl ModuleConfig {
    pub fn new(
        location: ModuleLocation,
        motor: MotorType,
        drive_id: u8,
        turn_id: u8,
        invert_drive: bool,
        frame: &FrameConfig,
    ) -> Self {
        Self {
            location,
            drive_id,
            turn_id,
            invert_drive,
            drive_gear_ratio: motor.drive_gear_ratio(),
            turn_gear_ratio: motor.turn_gear_ratio(),
            encoder_counts_per_rev: ENCODER_COUNTS_PER_REV,
            wheel_diameter: WHEEL_DIAMETER,
            turn_gains: motor.turn_gains(),
            drive_gains: motor.drive_gains(),
            drive_feedforward: motor.drive_feedforward(),
            location_offset: frame.module_offset(location),
        }
    }

    /// Resolve a module's calibration from the deploy document.
    ///
    /// Never fails the caller: a missing or invalid entry yields the backup
    /// wiring, tagged so health reporting can surface it.
    pub fn from_deploy(
        location: ModuleLocation,
        default_motor: MotorType,
        deploy: &DeployConfig,
        frame: &FrameConfig,
    ) -> ModuleConfigSource {
        let entry = match deploy.modules.get(location.key()) {
            Some(value) => match DeployEntry::deserialize(value) {
                Ok(entry) => entry,
                Err(e) => {
                    return Self::backup(
                        location,
                        frame,
                        format!("malformed deploy entry for '{}': {}", location.key(), e),
                    );
                }
            },
            None => {
                return Self::backup(
                    location,
                    frame,
                    format!("no deploy entry for '{}'", location.key()),
                );
            }
        };

        // ID 0 is the bus broadcast address; a shared ID would alias channels
        if entry.drive_id == 0 || entry.turn_id == 0 || entry.drive_id == entry.turn_id {
            return Self::backup(
                location,
                frame,
                format!("invalid actuator ids {}/{}", entry.drive_id, entry.turn_id),
            );
        }

        ModuleConfigSource::Loaded(Self::new(
            location,
            entry.motor.unwrap_or(default_motor),
            entry.drive_id,
            entry.turn_id,
            entry.inverted,
            frame,
        ))
    }

    fn backup(location: ModuleLocation, frame: &FrameConfig, reason: String) -> ModuleConfigSource {
        warn!("module {}: {}; using backup config", location.key(), reason);
        let config = Self::new(
            location,
            BACKUP_MOTOR,
            BACKUP_DRIVE_ID,
            BACKUP_TURN_ID,
            BACKUP_INVERTED,
            frame,
        );
        ModuleConfigSource::Fallback(config, reason)
    }

    pub fn wheel_radius(&self) -> f64 {
        self.wheel_diameter / 2.0
    }

    /// Wheel linear speed (m/s) to motor-shaft angular rate (rad/s).
    pub fn wheel_speed_to_motor_rad_s(&self, speed: f64) -> f64 {
        speed / self.wheel_radius() * self.drive_gear_ratio
    }

    /// Motor-shaft angular rate (rad/s) to wheel linear speed (m/s).
    pub fn motor_rad_s_to_wheel_speed(&self, rad_s: f64) -> f64 {
        rad_s / self.drive_gear_ratio * self.wheel_radius()
    }
}

/// Where a module's calibration came from.
#[derive(Debug, Clone)]
pub enum ModuleConfigSource {
    /// Resolved from the deploy document.
    Loaded(ModuleConfig),
    /// Backup wiring, with the reason the deploy entry was unusable.
    Fallback(ModuleConfig, String),
}

impl ModuleConfigSource {
    pub fn config(&self) -> &ModuleConfig {
        match self {
            ModuleConfigSource::Loaded(config) | ModuleConfigSource::Fallback(config, _) => config,
        }
    }

    pub fn into_config(self) -> ModuleConfig {
        match self {
            ModuleConfigSource::Loaded(config) | ModuleConfigSource::Fallback(config, _) => config,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ModuleConfigSource::Fallback(..))
    }
}

/// One module's entry in the deploy document.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployEntry {
    pub drive_id: u8,
    pub turn_id: u8,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub motor: Option<MotorType>,
}

/// Per-module deploy document, keyed by location.
///
/// Entries stay raw JSON until a module resolves its own, so one malformed
/// entry demotes only that module and the rest still load.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployConfig {
    #[serde(flatten)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to read deploy document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse deploy document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl DeployConfig {
    /// Read and parse the deploy document at `path`.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
