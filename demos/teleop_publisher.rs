// Keyboard teleop: WASD move, Z/X spin, R/F throttle, Q quit
//
// Publishes raw stick samples; the runtime owns deadband and shaping.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use swerve_zenoh_runtime::config::TOPIC_CMD_OPERATOR;
use swerve_zenoh_runtime::messages::OperatorCommand;
use tracing::info;

const THROTTLE_STEP: f64 = 0.25;
const INPUT_TIMEOUT_MS: u64 = 100; // Recenter the stick after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_OPERATOR).await?;

    info!("Controls: WASD=move, Z/X=spin, R/F=throttle, Q=quit");
    info!("Throttle: 0.25");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Persistent stick state
    let mut x = 0.0;
    let mut y = 0.0;
    let mut spin = 0.0;
    let mut throttle: f64 = 0.25;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - full deflection, refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        x = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        x = -1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        y = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        y = -1.0;
                        last_movement_input = Instant::now();
                    }

                    // Spin
                    KeyCode::Char('z') if pressed => {
                        spin = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        spin = -1.0;
                        last_movement_input = Instant::now();
                    }

                    // Throttle control
                    KeyCode::Char('r') if pressed => {
                        throttle = (throttle + THROTTLE_STEP).min(1.0);
                        info!("Throttle: {:.2}", throttle);
                    }
                    KeyCode::Char('f') if pressed => {
                        throttle = (throttle - THROTTLE_STEP).max(0.0);
                        info!("Throttle: {:.2}", throttle);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Recenter the stick if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x = 0.0;
            y = 0.0;
            spin = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = OperatorCommand::Stick {
            x,
            y,
            spin,
            throttle,
        };
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}
