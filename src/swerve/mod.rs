// Swerve control core: angle math, kinematics, per-module loops, and the
// four-module drivetrain that ties them together.

pub mod angle;
pub mod drivetrain;
pub mod kinematics;
pub mod module;

pub use drivetrain::Drivetrain;
pub use kinematics::{ChassisVelocity, ModuleState, SwerveKinematics, MODULE_COUNT};
pub use module::SwerveModule;
