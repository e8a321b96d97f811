// Closed-loop building blocks shared by the steering and drive controllers:
// a plain PID, a trapezoidal motion profile, and a static+velocity feedforward.

/// PID gains, volts per unit of error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// PID controller with retained integral and last-error state.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integral: f64,
    integral_limit: Option<f64>,
    last_error: Option<f64>,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            integral_limit: None,
            last_error: None,
        }
    }

    /// Cap the magnitude of the accumulated integral term.
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = Some(limit.abs());
        self
    }

    /// Advance the controller by one step of `dt` seconds.
    ///
    /// A non-positive `dt` degrades to the proportional term alone so a
    /// bad timestamp cannot blow up the integral or derivative.
    pub fn update(&mut self, error: f64, dt: f64) -> f64 {
        if !(dt > 0.0) {
            return self.gains.kp * error;
        }

        self.integral += error * dt;
        if let Some(limit) = self.integral_limit {
            self.integral = self.integral.clamp(-limit, limit);
        }

        let derivative = match self.last_error {
            Some(prev) => (error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    /// Clear accumulated state (integral and derivative history).
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}

/// State of a profiled setpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileState {
    pub position: f64,
    pub velocity: f64,
}

impl ProfileState {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }
}

/// Trapezoidal motion constraints: the profiled setpoint never moves faster
/// than `max_velocity` or changes speed faster than `max_acceleration`.
#[derive(Debug, Clone, Copy)]
pub struct TrapezoidProfile {
    pub max_velocity: f64,
    pub max_acceleration: f64,
}

impl TrapezoidProfile {
    pub fn new(max_velocity: f64, max_acceleration: f64) -> Self {
        Self {
            max_velocity: max_velocity.abs(),
            max_acceleration: max_acceleration.abs(),
        }
    }

    /// Advance a profiled setpoint one step toward `goal`.
    ///
    /// The cruise velocity is capped both by the velocity limit and by the
    /// speed from which the goal can still be reached without overshooting
    /// at the acceleration limit. A step that lands on or past the goal at
    /// near-stop speed settles exactly at `(goal, 0.0)` and stays there.
    pub fn step(&self, state: ProfileState, goal: f64, dt: f64) -> ProfileState {
        if !(dt > 0.0) {
            return state;
        }

        let distance = goal - state.position;
        let stoppable = (2.0 * self.max_acceleration * distance.abs()).sqrt();
        let desired = distance.signum() * stoppable.min(self.max_velocity);

        let velocity = self.slew(state.velocity, desired, dt);
        let position = state.position + velocity * dt;

        // Discrete steps land past the goal rather than on it; once one
        // crosses at near-stop speed, settle instead of dithering.
        let crossed = (goal - position) * distance.signum() <= 0.0;
        if crossed && velocity.abs() <= self.max_acceleration * dt {
            return ProfileState::new(goal, 0.0);
        }

        ProfileState::new(position, velocity)
    }

    /// Move `current` toward `target` without exceeding the acceleration
    /// limit; the target itself is clamped to the velocity limit.
    pub fn slew(&self, current: f64, target: f64, dt: f64) -> f64 {
        let target = target.clamp(-self.max_velocity, self.max_velocity);
        let max_delta = self.max_acceleration * dt.max(0.0);
        current + (target - current).clamp(-max_delta, max_delta)
    }
}

/// Static friction + velocity feedforward: `ks * sign(target) + kv * target`.
/// A zero target produces exactly zero output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedforward {
    pub ks: f64,
    pub kv: f64,
}

impl Feedforward {
    pub const fn new(ks: f64, kv: f64) -> Self {
        Self { ks, kv }
    }

    pub fn output(&self, target: f64) -> f64 {
        if target == 0.0 {
            return 0.0;
        }
        self.ks * target.signum() + self.kv * target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 0.02;

    #[test]
    fn test_proportional_only() {
        let mut pid = Pid::new(PidGains::new(0.5, 0.0, 0.0));
        assert_relative_eq!(pid.update(2.0, DT), 1.0);
        assert_relative_eq!(pid.update(-4.0, DT), -2.0);
    }

    #[test]
    fn test_integral_accumulates() {
        let mut pid = Pid::new(PidGains::new(0.0, 1.0, 0.0));
        let mut out = 0.0;
        for _ in 0..50 {
            out = pid.update(1.0, DT);
        }
        // 50 steps of 1.0 error at 20 ms each
        assert_relative_eq!(out, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_integral_limit_caps_windup() {
        let mut pid = Pid::new(PidGains::new(0.0, 1.0, 0.0)).with_integral_limit(0.1);
        let mut out = 0.0;
        for _ in 0..500 {
            out = pid.update(1.0, DT);
        }
        assert_relative_eq!(out, 0.1);
    }

    #[test]
    fn test_derivative_sees_error_change() {
        let mut pid = Pid::new(PidGains::new(0.0, 0.0, 0.1));
        // First update has no history, derivative is zero
        assert_relative_eq!(pid.update(1.0, DT), 0.0);
        // Error jumped by 1.0 over 20 ms
        assert_relative_eq!(pid.update(2.0, DT), 0.1 * 1.0 / DT);
    }

    #[test]
    fn test_bad_dt_degrades_to_proportional() {
        let mut pid = Pid::new(PidGains::new(2.0, 100.0, 100.0));
        assert_relative_eq!(pid.update(1.0, 0.0), 2.0);
        assert_relative_eq!(pid.update(1.0, -1.0), 2.0);
        assert_relative_eq!(pid.update(1.0, f64::NAN), 2.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = Pid::new(PidGains::new(0.0, 1.0, 1.0));
        pid.update(5.0, DT);
        pid.update(5.0, DT);
        pid.reset();
        assert_relative_eq!(pid.update(0.0, DT), 0.0);
    }

    #[test]
    fn test_profile_respects_limits() {
        let profile = TrapezoidProfile::new(2.0, 10.0);
        let mut state = ProfileState::default();
        let mut prev_velocity = 0.0;
        for _ in 0..200 {
            state = profile.step(state, 5.0, DT);
            assert!(state.velocity.abs() <= 2.0 + 1e-9);
            assert!((state.velocity - prev_velocity).abs() <= 10.0 * DT + 1e-9);
            prev_velocity = state.velocity;
        }
    }

    #[test]
    fn test_profile_reaches_goal() {
        let profile = TrapezoidProfile::new(2.0, 10.0);
        let mut state = ProfileState::default();
        for _ in 0..300 {
            state = profile.step(state, 1.5, DT);
        }
        assert_relative_eq!(state.position, 1.5, epsilon = 0.02);
        assert_relative_eq!(state.velocity, 0.0, epsilon = 0.05);
    }

    #[test]
    fn test_profile_goal_behind() {
        let profile = TrapezoidProfile::new(2.0, 10.0);
        let mut state = ProfileState::default();
        for _ in 0..300 {
            state = profile.step(state, -1.5, DT);
        }
        assert_relative_eq!(state.position, -1.5, epsilon = 0.02);
    }

    #[test]
    fn test_profile_settles_exactly_at_goal() {
        let profile = TrapezoidProfile::new(2.0, 10.0);
        let mut state = ProfileState::default();
        for _ in 0..300 {
            state = profile.step(state, 1.5, DT);
        }
        assert_eq!(state, ProfileState::new(1.5, 0.0));
        // Settled state is a fixed point, not a limit cycle around the goal
        for _ in 0..10 {
            state = profile.step(state, 1.5, DT);
            assert_eq!(state, ProfileState::new(1.5, 0.0));
        }
    }

    #[test]
    fn test_slew_clamps_rate_and_magnitude() {
        let profile = TrapezoidProfile::new(3.0, 10.0);
        // One step can move at most 10 * 0.02 = 0.2
        assert_relative_eq!(profile.slew(0.0, 5.0, DT), 0.2);
        assert_relative_eq!(profile.slew(0.0, -5.0, DT), -0.2);
        // Target beyond the velocity limit saturates at the limit
        let mut v = 0.0;
        for _ in 0..100 {
            v = profile.slew(v, 100.0, DT);
        }
        assert_relative_eq!(v, 3.0);
    }

    #[test]
    fn test_feedforward_sign_handling() {
        let ff = Feedforward::new(0.2, 1.5);
        assert_relative_eq!(ff.output(0.0), 0.0);
        assert_relative_eq!(ff.output(2.0), 0.2 + 3.0);
        assert_relative_eq!(ff.output(-2.0), -0.2 - 3.0);
    }
}
