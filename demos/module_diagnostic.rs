// Module bus diagnostic: READ-ONLY check of every motor controller
//
// This tool does NOT write anything to the controllers - it's completely safe.
// Run it before handing the bus to the runtime.
//
// Usage: cargo run --example module_diagnostic -- [port]
// Example: cargo run --example module_diagnostic -- /dev/ttyUSB0

use std::io::{self, Write};

use swerve_zenoh_runtime::actuator::serial::{Register, SwerveBus};
use swerve_zenoh_runtime::config::{ENCODER_COUNTS_PER_REV, MODULE_BUS_PORT};

// (location, drive id, turn id) per the standard wiring
const MODULES: [(&str, u8, u8); 4] = [
    ("front_left", 2, 1),
    ("front_right", 4, 3),
    ("back_left", 6, 5),
    ("back_right", 8, 7),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| MODULE_BUS_PORT.to_string());

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          Swerve Module Bus Diagnostic (READ-ONLY)            ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  This tool only READS from controllers - no writes, no       ║");
    println!("║  movement                                                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Serial port: {}", port);
    println!();

    // Try to open serial port
    println!("Step 1: Opening serial port...");
    let mut bus = match SwerveBus::open(&port) {
        Ok(bus) => {
            println!("  ✓ Serial port opened successfully");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            println!("  - Check permissions on the device node (dialout group)");
            return Err(e.into());
        }
    };
    println!();

    // Ping every controller
    println!("Step 2: Pinging controllers...");
    let mut all_found = true;
    for (name, drive_id, turn_id) in MODULES {
        for (channel, id) in [("drive", drive_id), ("turn", turn_id)] {
            print!("  {} {} (ID {}): ", name, channel, id);
            io::stdout().flush()?;

            match bus.ping(id) {
                Ok(true) => println!("✓ RESPONDING"),
                Ok(false) => {
                    println!("✗ NO RESPONSE");
                    all_found = false;
                }
                Err(e) => {
                    println!("✗ ERROR: {}", e);
                    all_found = false;
                }
            }
        }
    }
    println!();

    if !all_found {
        println!("⚠ WARNING: Not all controllers responded!");
        println!("  - Check the bus power supply");
        println!("  - Verify the deploy document matches the physical wiring");
        println!("  - Check daisy-chain connections");
        println!();
        print!("Continue reading available controllers? [y/N]: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
        println!();
    }

    // Read registers from each controller
    println!("Step 3: Reading controller registers...");
    println!();

    for (name, drive_id, turn_id) in MODULES {
        println!("  === Module {} ===", name);
        for (channel, id) in [("drive", drive_id), ("turn", turn_id)] {
            println!("    --- {} (ID {}) ---", channel, id);

            match bus.read_u8(id, Register::FirmwareVersion) {
                Ok(version) => println!("      Firmware:       {}", version),
                Err(e) => println!("      Firmware:       ERROR - {}", e),
            }

            match bus.read_u8(id, Register::ControlMode) {
                Ok(mode) => {
                    let mode_str = match mode {
                        0 => "Idle",
                        1 => "Voltage",
                        _ => "Unknown",
                    };
                    println!("      Control Mode:   {} ({})", mode, mode_str);
                }
                Err(e) => println!("      Control Mode:   ERROR - {}", e),
            }

            match bus.position(id) {
                Ok(counts) => {
                    let degrees = (counts as f64) * 360.0 / ENCODER_COUNTS_PER_REV;
                    println!("      Position:       {} counts ({:.1}°)", counts, degrees);
                }
                Err(e) => println!("      Position:       ERROR - {}", e),
            }

            match bus.velocity(id) {
                Ok(vel) => println!("      Velocity:       {} counts/s", vel),
                Err(e) => println!("      Velocity:       ERROR - {}", e),
            }

            match bus.read_u8(id, Register::FaultFlags) {
                Ok(0) => println!("      Faults:         none"),
                Ok(flags) => println!("      Faults:         0x{:02X}", flags),
                Err(e) => println!("      Faults:         ERROR - {}", e),
            }
        }
        println!();
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    Diagnostic Complete                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("If all controllers responded and show reasonable values:");
    println!("  1. Control Mode = 0 (Idle) is normal before the runtime starts");
    println!("  2. Velocity should be 0 or near 0 when the wheels are stationary");
    println!("  3. Any nonzero fault flags need investigating before driving");
    println!();
    println!("Next step: run the runtime with wheels OFF THE GROUND");

    Ok(())
}
