// 50 Hz control loop with a command watchdog: if the command stream dries up
// the drivetrain is actively stopped rather than left running the last order.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::actuator::{BusActuator, SimActuator, SwerveBus};
use crate::config::{
    CMD_TIMEOUT, DEFAULT_MOTOR, LOOP_HZ, MODULE_BUS_PORT, TOPIC_CMD_CHASSIS, TOPIC_CMD_OPERATOR,
    TOPIC_IMU_ACCEL, TOPIC_STATE_HEALTH, TOPIC_STATE_TELEMETRY,
};
use crate::config::{DeployConfig, ModuleConfig, ModuleLocation, RobotConfig};
use crate::control::InputShaper;
use crate::messages::{ChassisCommand, HealthStatus, OperatorCommand, RuntimeHealth, Telemetry};
use crate::monitor::{MotionSample, PoseCertaintyMonitor};
use crate::swerve::{ChassisVelocity, Drivetrain};

pub struct RuntimeOptions {
    pub deploy_path: PathBuf,
    pub port: Option<String>,
    pub sim: bool,
}

pub struct Runtime {
    shaper: InputShaper,
    latest_cmd: Option<ChassisVelocity>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(shaper: InputShaper) -> Self {
        Self {
            shaper,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process an incoming chassis-rate command.
    fn on_chassis_command(&mut self, cmd: ChassisCommand) {
        info!("Received chassis command: {:?}", &cmd);
        self.accept(ChassisVelocity::from(&cmd));
    }

    /// Shape a raw operator sample into a chassis velocity and accept it.
    /// Operator devices stream at full rate, so per-sample logs stay at debug.
    fn on_operator_command(&mut self, cmd: &OperatorCommand) {
        debug!("Received operator command: {:?}", cmd);
        let velocity = match *cmd {
            OperatorCommand::Stick {
                x,
                y,
                spin,
                throttle,
            } => self.shaper.shape_stick(x, y, spin, throttle),
            OperatorCommand::Tablet { x, y, pressure } => self.shaper.shape_tablet(x, y, pressure),
        };
        self.accept(velocity);
    }

    fn accept(&mut self, velocity: ChassisVelocity) {
        self.latest_cmd = Some(velocity);
        self.cmd_received_at = Instant::now();
    }

    /// Compute the commanded velocity based on watchdog state.
    fn compute_actuation(&mut self) -> ChassisVelocity {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            ChassisVelocity::zero()
        } else if let Some(cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            cmd
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            ChassisVelocity::zero()
        }
    }
}

pub async fn run(opts: RuntimeOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let robot = RobotConfig::default();

    let deploy = match DeployConfig::load(&opts.deploy_path) {
        Ok(deploy) => deploy,
        Err(e) => {
            warn!(
                "{}: {e}; every module will use backup wiring",
                opts.deploy_path.display()
            );
            DeployConfig::default()
        }
    };

    let sources = ModuleLocation::ALL
        .map(|location| ModuleConfig::from_deploy(location, DEFAULT_MOTOR, &deploy, &robot.frame));

    // Actuator ids in module order, for bus bring-up
    let ids: Vec<u8> = sources
        .iter()
        .flat_map(|s| [s.config().drive_id, s.config().turn_id])
        .collect();

    let mut sim_handles: Vec<SimActuator> = Vec::new();
    let mut drivetrain = if opts.sim {
        info!("Running with simulated actuators, no module bus");
        Drivetrain::new(&robot, sources, |_| {
            let sim = SimActuator::new();
            sim_handles.push(sim.clone());
            Box::new(sim)
        })
    } else {
        let port = opts.port.as_deref().unwrap_or(MODULE_BUS_PORT);
        let mut bus = SwerveBus::open(port)?;
        bus.initialize(&ids)?;
        let bus = Arc::new(Mutex::new(bus));
        Drivetrain::new(&robot, sources, |config| {
            Box::new(BusActuator::new(
                bus.clone(),
                config.drive_id,
                config.turn_id,
                config.encoder_counts_per_rev,
            ))
        })
    };

    let mut monitor = PoseCertaintyMonitor::new(robot.monitor.max_jerk);
    let mut runtime = Runtime::new(InputShaper::from_config(&robot.control));

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_chassis = session.declare_subscriber(TOPIC_CMD_CHASSIS).await?;
    let sub_operator = session.declare_subscriber(TOPIC_CMD_OPERATOR).await?;
    let sub_imu = session.declare_subscriber(TOPIC_IMU_ACCEL).await?;
    let pub_health = session.declare_publisher(TOPIC_STATE_HEALTH).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_STATE_TELEMETRY).await?;

    let period = Duration::from_millis(1000 / LOOP_HZ);
    let dt = period.as_secs_f64();
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}",
        TOPIC_CMD_CHASSIS, TOPIC_CMD_OPERATOR, TOPIC_IMU_ACCEL
    );
    info!(
        "Publishing to: {}, {}",
        TOPIC_STATE_HEALTH, TOPIC_STATE_TELEMETRY
    );

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_chassis.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ChassisCommand>(&payload) {
                Ok(cmd) => runtime.on_chassis_command(cmd),
                Err(e) => warn!("Failed to parse chassis command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_operator.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<OperatorCommand>(&payload) {
                Ok(cmd) => runtime.on_operator_command(&cmd),
                Err(e) => warn!("Failed to parse operator command: {}", e),
            }
        }

        // 2. Feed accelerometer samples to the pose-certainty monitor
        while let Ok(Some(sample)) = sub_imu.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotionSample>(&payload) {
                Ok(motion) => monitor.record(motion),
                Err(e) => warn!("Failed to parse motion sample: {}", e),
            }
        }

        // 3. Compute the commanded velocity (includes watchdog logic)
        let velocity = runtime.compute_actuation();

        // 4. One control cycle across all four modules
        drivetrain.drive(velocity, dt);

        // 5. Advance simulated motors, if any
        for sim in &sim_handles {
            sim.step(dt);
        }

        // 6. Publish health and telemetry
        let health = HealthStatus {
            runtime: runtime.health,
            pose_confidence: monitor.confidence(),
            fallback_modules: drivetrain.fallback_locations().to_vec(),
        };
        pub_health.put(serde_json::to_string(&health)?).await?;

        let telemetry = Telemetry {
            modules: drivetrain.measured_states(),
            chassis: drivetrain.measured_chassis_velocity(),
        };
        pub_telemetry.put(serde_json::to_string(&telemetry)?).await?;
    }
}
