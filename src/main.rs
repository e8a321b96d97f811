use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::DEPLOY_PATH;
use swerve_zenoh_runtime::runtime::{self, RuntimeOptions};

#[derive(Parser, Debug)]
#[command(about = "Swerve drivetrain control runtime")]
struct Args {
    /// Per-module deploy document
    #[arg(long, default_value = DEPLOY_PATH)]
    deploy: PathBuf,

    /// Serial port for the module bus
    #[arg(long)]
    port: Option<String>,

    /// Run against simulated actuators instead of the module bus
    #[arg(long)]
    sim: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let opts = RuntimeOptions {
        deploy_path: args.deploy,
        port: args.port,
        sim: args.sim,
    };

    if let Err(e) = runtime::run(opts).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
