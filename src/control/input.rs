// Operator input shaping: raw device axes -> chassis velocity.
//
// All shaping functions are total: NaN and out-of-range inputs map to safe
// values (usually zero) instead of propagating.

use crate::config::ControlConfig;
use crate::swerve::kinematics::ChassisVelocity;

/// Deadband + rescale + sensitivity curve for one [-1, 1] axis.
#[derive(Debug, Clone, Copy)]
pub struct AxisShaping {
    pub threshold: f64,
    pub sensitivity: f64,
}

impl AxisShaping {
    pub fn new(threshold: f64, sensitivity: f64) -> Self {
        Self {
            threshold,
            sensitivity,
        }
    }

    /// Shape a raw axis value. Inside the deadband the output is zero; the
    /// remaining range rescales to [0, 1] so motion starts from rest, then
    /// the sensitivity exponent bends the curve. Sign is preserved.
    pub fn shape(&self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return 0.0;
        }
        let clamped = raw.clamp(-1.0, 1.0);
        let magnitude = clamped.abs();
        if magnitude < self.threshold {
            return 0.0;
        }

        let span = 1.0 - self.threshold;
        let rescaled = if span > 0.0 {
            (magnitude - self.threshold) / span
        } else {
            1.0
        };
        clamped.signum() * rescaled.powf(self.sensitivity)
    }
}

/// Linear interpolation between a low and high velocity scale, driven by an
/// auxiliary [0, 1] input (throttle paddle or slider).
#[derive(Debug, Clone, Copy)]
pub struct SpeedMeter {
    pub low: f64,
    pub high: f64,
}

impl SpeedMeter {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn scale(&self, aux: f64) -> f64 {
        let t = if aux.is_finite() {
            aux.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.low + (self.high - self.low) * t
    }
}

/// Stylus pressure -> speed fraction in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct PressureCurve {
    pub threshold: f64,
    pub min_speed: f64,
    pub steepness: f64,
}

impl PressureCurve {
    pub fn new(threshold: f64, min_speed: f64, steepness: f64) -> Self {
        Self {
            threshold,
            min_speed,
            steepness,
        }
    }

    /// Below the threshold the output is zero; at the threshold it starts at
    /// `min_speed` and rises to 1.0 at full pressure. Pressure outside
    /// [0, 1] (or NaN) reads as no contact.
    pub fn shape(&self, pressure: f64) -> f64 {
        if !pressure.is_finite() || !(0.0..=1.0).contains(&pressure) {
            return 0.0;
        }
        if pressure < self.threshold {
            return 0.0;
        }

        let span = 1.0 - self.threshold;
        let normalized = if span > 0.0 {
            (pressure - self.threshold) / span
        } else {
            1.0
        };
        let shaped = self.min_speed + (1.0 - self.min_speed) * normalized.powf(self.steepness);
        shaped.clamp(0.0, 1.0)
    }
}

/// Complete shaping pipeline for the supported operator devices.
#[derive(Debug, Clone)]
pub struct InputShaper {
    x: AxisShaping,
    y: AxisShaping,
    spin: AxisShaping,
    directional_meter: SpeedMeter,
    spin_meter: SpeedMeter,
    pressure: PressureCurve,
}

impl InputShaper {
    pub fn from_config(control: &ControlConfig) -> Self {
        Self {
            x: AxisShaping::new(control.x_threshold, control.directional_sensitivity),
            y: AxisShaping::new(control.y_threshold, control.directional_sensitivity),
            spin: AxisShaping::new(control.spin_threshold, control.spin_sensitivity),
            directional_meter: SpeedMeter::new(
                control.directional_meter_low,
                control.directional_meter_high,
            ),
            spin_meter: SpeedMeter::new(control.spin_meter_low, control.spin_meter_high),
            pressure: PressureCurve::new(
                control.pressure_threshold,
                control.pressure_min_speed,
                control.pressure_steepness,
            ),
        }
    }

    /// Stick device: x/y/spin axes in [-1, 1], throttle in [0, 1].
    /// x is forward, y is left, spin is counter-clockwise.
    pub fn shape_stick(&self, x: f64, y: f64, spin: f64, throttle: f64) -> ChassisVelocity {
        let directional_scale = self.directional_meter.scale(throttle);
        ChassisVelocity::new(
            self.x.shape(x) * directional_scale,
            self.y.shape(y) * directional_scale,
            self.spin.shape(spin) * self.spin_meter.scale(throttle),
        )
    }

    /// Tablet device: x/y give the direction, stylus pressure gives the
    /// speed through the pressure curve (scaled by the directional meter's
    /// high end). The tablet does not command spin.
    pub fn shape_tablet(&self, x: f64, y: f64, pressure: f64) -> ChassisVelocity {
        let speed = self.pressure.shape(pressure) * self.directional_meter.high;
        let dx = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
        let dy = if y.is_finite() { y.clamp(-1.0, 1.0) } else { 0.0 };
        let norm = dx.hypot(dy);
        if speed == 0.0 || norm == 0.0 {
            return ChassisVelocity::zero();
        }
        ChassisVelocity::new(dx / norm * speed, dy / norm * speed, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn shaper() -> InputShaper {
        InputShaper::from_config(&ControlConfig::default())
    }

    #[test]
    fn test_axis_deadband_zeroes_small_input() {
        let axis = AxisShaping::new(0.15, 1.0);
        assert_eq!(axis.shape(0.0), 0.0);
        assert_eq!(axis.shape(0.1), 0.0);
        assert_eq!(axis.shape(-0.149), 0.0);
    }

    #[test]
    fn test_axis_rescales_from_zero() {
        let axis = AxisShaping::new(0.15, 1.0);
        // Just past the deadband the output starts near zero
        assert!(axis.shape(0.1501) < 0.001);
        assert_relative_eq!(axis.shape(1.0), 1.0);
        assert_relative_eq!(axis.shape(-1.0), -1.0);
        // Halfway through the live range
        assert_relative_eq!(axis.shape(0.575), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_axis_sensitivity_bends_curve() {
        let linear = AxisShaping::new(0.0, 1.0);
        let squared = AxisShaping::new(0.0, 2.0);
        assert_relative_eq!(squared.shape(0.5), 0.25);
        assert!(squared.shape(0.5) < linear.shape(0.5));
        assert_relative_eq!(squared.shape(-0.5), -0.25);
        assert_relative_eq!(squared.shape(1.0), 1.0);
    }

    #[test]
    fn test_axis_total_on_garbage() {
        let axis = AxisShaping::new(0.15, 1.0);
        assert_eq!(axis.shape(f64::NAN), 0.0);
        assert_eq!(axis.shape(f64::INFINITY), 0.0);
        // Overdeflection clamps to full output
        assert_relative_eq!(axis.shape(3.0), 1.0);
        assert_relative_eq!(axis.shape(-3.0), -1.0);
    }

    #[test]
    fn test_speed_meter_interpolates_and_clamps() {
        let meter = SpeedMeter::new(0.25, 4.0);
        assert_relative_eq!(meter.scale(0.0), 0.25);
        assert_relative_eq!(meter.scale(1.0), 4.0);
        assert_relative_eq!(meter.scale(0.5), 2.125);
        assert_relative_eq!(meter.scale(-2.0), 0.25);
        assert_relative_eq!(meter.scale(7.0), 4.0);
        assert_relative_eq!(meter.scale(f64::NAN), 0.25);
    }

    #[test]
    fn test_pressure_zero_below_threshold() {
        let curve = PressureCurve::new(0.2, 0.2, 2.6);
        assert_eq!(curve.shape(0.0), 0.0);
        assert_eq!(curve.shape(0.1999), 0.0);
    }

    #[test]
    fn test_pressure_endpoints() {
        let curve = PressureCurve::new(0.2, 0.2, 2.6);
        // Exactly at the threshold the curve starts at min_speed
        assert_relative_eq!(curve.shape(0.2), 0.2);
        assert_relative_eq!(curve.shape(1.0), 1.0);
    }

    #[test]
    fn test_pressure_monotonic_above_threshold() {
        let curve = PressureCurve::new(0.2, 0.2, 2.6);
        let mut prev = 0.0;
        let mut p = 0.2;
        while p <= 1.0 {
            let out = curve.shape(p);
            assert!(out >= prev, "curve must not decrease at p={}", p);
            assert!((0.0..=1.0).contains(&out));
            prev = out;
            p += 0.01;
        }
    }

    #[test]
    fn test_pressure_rejects_invalid() {
        let curve = PressureCurve::new(0.2, 0.2, 2.6);
        assert_eq!(curve.shape(f64::NAN), 0.0);
        assert_eq!(curve.shape(-0.1), 0.0);
        assert_eq!(curve.shape(1.5), 0.0);
    }

    #[test]
    fn test_stick_full_forward_at_full_throttle() {
        let v = shaper().shape_stick(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(v.vx, 4.0);
        assert_relative_eq!(v.vy, 0.0);
        assert_relative_eq!(v.omega, 0.0);
    }

    #[test]
    fn test_stick_spin_uses_spin_meter() {
        let v = shaper().shape_stick(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(v.omega, 0.5);
        let v = shaper().shape_stick(0.0, 0.0, 1.0, 1.0);
        assert_relative_eq!(v.omega, 2.4);
    }

    #[test]
    fn test_stick_inside_deadband_is_still() {
        let v = shaper().shape_stick(0.1, -0.1, 0.2, 1.0);
        assert_eq!(v, ChassisVelocity::zero());
    }

    #[test]
    fn test_tablet_direction_is_normalized() {
        let v = shaper().shape_tablet(1.0, 1.0, 1.0);
        let speed = v.vx.hypot(v.vy);
        assert_relative_eq!(speed, 4.0, epsilon = 1e-12);
        assert_relative_eq!(v.vx, v.vy);
        assert_relative_eq!(v.omega, 0.0);
    }

    #[test]
    fn test_tablet_light_touch_is_still() {
        let v = shaper().shape_tablet(1.0, 0.0, 0.1);
        assert_eq!(v, ChassisVelocity::zero());
        let v = shaper().shape_tablet(0.0, 0.0, 1.0);
        assert_eq!(v, ChassisVelocity::zero());
    }
}
