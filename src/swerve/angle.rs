// Angle helpers shared by the kinematics and the steering loop.
// Every wrap in the crate goes through these two functions.

use std::f64::consts::{PI, TAU};

/// Wrap an angle into (-pi, pi].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Shortest signed rotation from `current` to `target`, in (-pi, pi].
pub fn shortest_angular_error(target: f64, current: f64) -> f64 {
    wrap_angle(target - current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_wrap_stays_in_range() {
        let mut angle = -25.0;
        while angle < 25.0 {
            let wrapped = wrap_angle(angle);
            assert!(wrapped > -PI && wrapped <= PI, "{} -> {}", angle, wrapped);
            angle += 0.137;
        }
    }

    #[test]
    fn test_wrap_identity_inside_range() {
        assert_relative_eq!(wrap_angle(0.0), 0.0);
        assert_relative_eq!(wrap_angle(1.0), 1.0);
        assert_relative_eq!(wrap_angle(-3.0), -3.0);
    }

    #[test]
    fn test_wrap_boundaries() {
        // pi maps to itself, -pi maps to the equivalent +pi
        assert_relative_eq!(wrap_angle(PI), PI);
        assert_relative_eq!(wrap_angle(-PI), PI);
        assert_relative_eq!(wrap_angle(3.0 * PI), PI);
    }

    #[test]
    fn test_wrap_full_turn_equivalence() {
        for angle in [-2.9, -1.0, 0.0, 0.4, 2.2] {
            assert_relative_eq!(wrap_angle(angle + TAU), angle, epsilon = 1e-12);
            assert_relative_eq!(wrap_angle(angle - TAU), angle, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shortest_error_crosses_seam() {
        // 3 rad and -3 rad are only ~0.283 rad apart going through pi
        let error = shortest_angular_error(3.0, -3.0);
        assert_relative_eq!(error, 6.0 - TAU, epsilon = 1e-12);
        assert!(error < 0.0);

        let error = shortest_angular_error(-3.0, 3.0);
        assert_relative_eq!(error, TAU - 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shortest_error_plain() {
        assert_relative_eq!(
            shortest_angular_error(FRAC_PI_2, 0.0),
            FRAC_PI_2,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            shortest_angular_error(0.0, FRAC_PI_2),
            -FRAC_PI_2,
            epsilon = 1e-12
        );
    }
}
