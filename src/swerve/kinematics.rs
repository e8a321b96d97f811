// Chassis <-> module kinematics for a four-module swerve base.
//
// Inverse: body velocity (vx, vy, omega) to per-module speed/angle pairs.
// Forward: least-squares chassis estimate from measured module states,
// used for diagnostics and tests.

use nalgebra::{SMatrix, SVector, Vector2};
use serde::{Deserialize, Serialize};

use crate::swerve::angle::wrap_angle;

pub const MODULE_COUNT: usize = 4;

/// Body-frame velocity: +vx forward, +vy left (m/s), +omega counter-clockwise (rad/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl ChassisVelocity {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// One module's command or measurement: signed wheel speed (m/s) and
/// azimuth angle in (-pi, pi].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self { speed, angle }
    }
}

/// Kinematic map between the chassis and the four modules.
///
/// A pure transform apart from one piece of state: the last nonzero heading
/// per module, reused when the commanded module vector is exactly zero so
/// wheels hold their line instead of snapping to zero radians.
pub struct SwerveKinematics {
    offsets: [Vector2<f64>; MODULE_COUNT],
    forward_map: SMatrix<f64, 3, 8>,
    last_angles: [f64; MODULE_COUNT],
}

impl SwerveKinematics {
    pub fn new(offsets: [Vector2<f64>; MODULE_COUNT]) -> Self {
        // Stacked inverse map: module i contributes rows
        //   [1, 0, -y_i]  (x component)
        //   [0, 1,  x_i]  (y component)
        let mut inverse = SMatrix::<f64, 8, 3>::zeros();
        for (i, offset) in offsets.iter().enumerate() {
            inverse[(2 * i, 0)] = 1.0;
            inverse[(2 * i, 2)] = -offset.y;
            inverse[(2 * i + 1, 1)] = 1.0;
            inverse[(2 * i + 1, 2)] = offset.x;
        }

        // Degenerate only when all four offsets coincide; the zero map keeps
        // the forward estimate at rest in that case.
        let forward_map = inverse
            .pseudo_inverse(1e-9)
            .unwrap_or_else(|_| SMatrix::zeros());

        Self {
            offsets,
            forward_map,
            last_angles: [0.0; MODULE_COUNT],
        }
    }

    /// Inverse kinematics: split a chassis velocity into module states.
    pub fn to_module_states(&mut self, v: ChassisVelocity) -> [ModuleState; MODULE_COUNT] {
        let mut states = [ModuleState::default(); MODULE_COUNT];
        for (i, offset) in self.offsets.iter().enumerate() {
            let vx = v.vx - v.omega * offset.y;
            let vy = v.vy + v.omega * offset.x;
            if vx == 0.0 && vy == 0.0 {
                states[i] = ModuleState::new(0.0, self.last_angles[i]);
            } else {
                let angle = wrap_angle(vy.atan2(vx));
                self.last_angles[i] = angle;
                states[i] = ModuleState::new(vx.hypot(vy), angle);
            }
        }
        states
    }

    /// Scale every speed by a common factor so none exceeds `max_speed`.
    /// Ratios between modules and all angles are preserved.
    pub fn desaturate(states: &mut [ModuleState; MODULE_COUNT], max_speed: f64) {
        let max_speed = max_speed.max(0.0);
        let top = states.iter().map(|s| s.speed.abs()).fold(0.0_f64, f64::max);
        if top > max_speed && top > 0.0 {
            let scale = max_speed / top;
            for state in states.iter_mut() {
                state.speed *= scale;
            }
        }
    }

    /// Forward kinematics: least-squares chassis velocity from module states.
    pub fn to_chassis_velocity(&self, states: &[ModuleState; MODULE_COUNT]) -> ChassisVelocity {
        let mut wheel = SVector::<f64, 8>::zeros();
        for (i, state) in states.iter().enumerate() {
            wheel[2 * i] = state.speed * state.angle.cos();
            wheel[2 * i + 1] = state.speed * state.angle.sin();
        }
        let v = self.forward_map * wheel;
        ChassisVelocity::new(v[0], v[1], v[2])
    }

    pub fn offsets(&self) -> &[Vector2<f64>; MODULE_COUNT] {
        &self.offsets
    }
}
