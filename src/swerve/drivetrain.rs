// Four-module swerve drivetrain: owns the modules and the kinematic map,
// and turns one chassis velocity per cycle into per-module control cycles.

use tracing::info;

use crate::actuator::ModuleActuator;
use crate::config::{ModuleConfig, ModuleConfigSource, ModuleLocation, RobotConfig};
use crate::swerve::kinematics::{ChassisVelocity, ModuleState, SwerveKinematics, MODULE_COUNT};
use crate::swerve::module::SwerveModule;

pub struct Drivetrain {
    modules: [SwerveModule; MODULE_COUNT],
    kinematics: SwerveKinematics,
    max_speed: f64,
    fallback_locations: Vec<ModuleLocation>,
}

impl Drivetrain {
    /// Assemble the drivetrain from resolved module configs, one actuator
    /// per module. Config order follows `ModuleLocation::ALL`.
    pub fn new(
        robot: &RobotConfig,
        sources: [ModuleConfigSource; MODULE_COUNT],
        mut actuator_for: impl FnMut(&ModuleConfig) -> Box<dyn ModuleActuator>,
    ) -> Self {
        let fallback_locations: Vec<ModuleLocation> = sources
            .iter()
            .filter(|s| s.is_fallback())
            .map(|s| s.config().location)
            .collect();

        let modules = sources.map(|source| {
            let config = source.into_config();
            let actuator = actuator_for(&config);
            SwerveModule::new(config, &robot.chassis, actuator)
        });

        let kinematics =
            SwerveKinematics::new(modules.each_ref().map(|m| m.config().location_offset));

        info!(
            "drivetrain ready: {} modules, max speed {:.1} m/s",
            MODULE_COUNT, robot.chassis.max_speed
        );

        Self {
            modules,
            kinematics,
            max_speed: robot.chassis.max_speed,
            fallback_locations,
        }
    }

    /// One control cycle for the whole base. The single entry point per
    /// cycle: splits the chassis velocity across the modules, rescales any
    /// over-limit solution, then runs every module's loops.
    pub fn drive(&mut self, velocity: ChassisVelocity, dt: f64) {
        let mut states = self.kinematics.to_module_states(velocity);
        SwerveKinematics::desaturate(&mut states, self.max_speed);

        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_target(state);
            module.run_cycle(dt);
        }
    }

    /// Active stop: zero velocity through the normal control path, so the
    /// wheels hold their heading while braking.
    pub fn stop(&mut self, dt: f64) {
        self.drive(ChassisVelocity::zero(), dt);
    }

    pub fn target_states(&self) -> [ModuleState; MODULE_COUNT] {
        self.modules.each_ref().map(|m| m.target_state())
    }

    pub fn measured_states(&self) -> [ModuleState; MODULE_COUNT] {
        self.modules.each_ref().map(|m| m.measured_state())
    }

    /// Least-squares chassis velocity from the measured module states.
    pub fn measured_chassis_velocity(&self) -> ChassisVelocity {
        self.kinematics.to_chassis_velocity(&self.measured_states())
    }

    /// Locations running on backup wiring because their deploy entry was
    /// missing or unusable.
    pub fn fallback_locations(&self) -> &[ModuleLocation] {
        &self.fallback_locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimActuator;
    use crate::config::{DeployConfig, MotorType};
    use approx::assert_relative_eq;

    const DT: f64 = 0.02;

    const SAMPLE_DEPLOY: &str = r#"{
        "front_left":  { "drive_id": 2, "turn_id": 1 },
        "front_right": { "drive_id": 4, "turn_id": 3, "inverted": true },
        "back_left":   { "drive_id": 6, "turn_id": 5 },
        "back_right":  { "drive_id": 8, "turn_id": 7, "inverted": true }
    }"#;

    fn test_drivetrain(deploy: &DeployConfig) -> (Drivetrain, Vec<SimActuator>) {
        let robot = RobotConfig::default();
        let sources = ModuleLocation::ALL.map(|location| {
            ModuleConfig::from_deploy(location, MotorType::Kraken, deploy, &robot.frame)
        });

        let mut sims = Vec::new();
        let drivetrain = Drivetrain::new(&robot, sources, |_| {
            let sim = SimActuator::new();
            sims.push(sim.clone());
            Box::new(sim)
        });
        (drivetrain, sims)
    }

    fn sample_deploy() -> DeployConfig {
        serde_json::from_str(SAMPLE_DEPLOY).unwrap()
    }

    #[test]
    fn test_straight_line_command_targets_all_modules_forward() {
        let (mut drivetrain, sims) = test_drivetrain(&sample_deploy());
        drivetrain.drive(ChassisVelocity::new(1.0, 0.0, 0.0), DT);

        for target in drivetrain.target_states() {
            assert_relative_eq!(target.speed, 1.0);
            assert_relative_eq!(target.angle, 0.0);
        }
        // One actuator handed out per module
        assert_eq!(sims.len(), MODULE_COUNT);
    }

    #[test]
    fn test_over_limit_command_is_desaturated() {
        let (mut drivetrain, _sims) = test_drivetrain(&sample_deploy());
        drivetrain.drive(ChassisVelocity::new(10.0, 0.0, 0.0), DT);

        for target in drivetrain.target_states() {
            assert_relative_eq!(target.speed, 7.0);
            assert_relative_eq!(target.angle, 0.0);
        }
    }

    #[test]
    fn test_mixed_command_keeps_module_ratios() {
        let (mut drivetrain, _sims) = test_drivetrain(&sample_deploy());
        drivetrain.drive(ChassisVelocity::new(9.0, -3.0, 4.0), DT);

        let targets = drivetrain.target_states();
        let top = targets.iter().map(|s| s.speed.abs()).fold(0.0, f64::max);
        let low = targets
            .iter()
            .map(|s| s.speed.abs())
            .fold(f64::INFINITY, f64::min);
        // Scaled to the limit rather than clamped: the slowest module stays
        // below it, so the speed ratios survived
        assert_relative_eq!(top, 7.0, epsilon = 1e-9);
        assert!(low < 7.0 - 1e-6);
    }

    #[test]
    fn test_stop_holds_heading() {
        let (mut drivetrain, _sims) = test_drivetrain(&sample_deploy());
        drivetrain.drive(ChassisVelocity::new(0.0, 1.0, 0.0), DT);
        let moving = drivetrain.target_states();

        drivetrain.stop(DT);
        for (target, was) in drivetrain.target_states().iter().zip(moving) {
            assert_relative_eq!(target.speed, 0.0);
            assert_relative_eq!(target.angle, was.angle);
        }
    }

    #[test]
    fn test_empty_deploy_surfaces_fallbacks() {
        let (drivetrain, _sims) = test_drivetrain(&DeployConfig::default());
        assert_eq!(drivetrain.fallback_locations(), &ModuleLocation::ALL[..]);
    }

    #[test]
    fn test_resolved_deploy_has_no_fallbacks() {
        let (drivetrain, _sims) = test_drivetrain(&sample_deploy());
        assert!(drivetrain.fallback_locations().is_empty());
    }

    #[test]
    fn test_measured_chassis_velocity_tracks_command() {
        let (mut drivetrain, sims) = test_drivetrain(&sample_deploy());
        let command = ChassisVelocity::new(1.0, 0.5, 0.0);
        for _ in 0..300 {
            drivetrain.drive(command, DT);
            for sim in &sims {
                sim.step(DT);
            }
        }

        // The proportional drive loop settles with a small residual error,
        // so the recovered velocity sits slightly under the command
        let measured = drivetrain.measured_chassis_velocity();
        assert_relative_eq!(measured.vx, command.vx, epsilon = 0.15);
        assert_relative_eq!(measured.vy, command.vy, epsilon = 0.15);
        assert_relative_eq!(measured.omega, command.omega, epsilon = 0.05);
    }
}
