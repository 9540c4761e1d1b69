//! Live oximeter monitor example
//!
//! Run with: cargo run --example oximeter_monitor [record-file]

use chrono::{DateTime, Local};
use pulse_oximeter_ble::{
    BtleplugCentral, ClientConfig, Controller, DeviceScanner, FixedDestination, Reading, Result,
    Severity, UserFeedback,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Prints readings and messages to the terminal.
struct ConsoleFeedback;

impl UserFeedback for ConsoleFeedback {
    fn notify_user(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Status => println!("{}", message),
            Severity::Error => eprintln!("Error: {}", message),
        }
    }

    fn display_reading(&self, reading: &Reading, at: DateTime<Local>) {
        println!(
            "{}  SpO2 {:>3}%  Heart rate {:>3} bpm",
            at.format("%I:%M:%S"),
            reading.spo2,
            reading.heart_rate
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let record_to = std::env::args().nth(1).map(PathBuf::from);
    let config = ClientConfig::default();

    println!("Oximeter Monitor");
    println!("================\n");
    println!("Looking for oximeters...\n");

    let central = BtleplugCentral::new().await?;
    let scanner = DeviceScanner::new(central.adapter().clone(), config.clone());

    let Some(device) = scanner.select_device().await? else {
        println!("No supported oximeter found.");
        return Ok(());
    };

    println!("Found {} ({})", device.name, device.id);

    let controller = Controller::with_config(Arc::new(central), Arc::new(ConsoleFeedback), config);
    controller.connect(&device.id).await?;

    if let Some(path) = record_to {
        controller
            .recorder()
            .start(&FixedDestination(path.clone()))
            .await?;
        println!("Recording to {}", path.display());
    }

    println!("Press Ctrl+C to exit.\n");

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to wait for Ctrl+C: {}", e);
    }

    println!("\nExiting...");
    controller.shutdown().await?;

    Ok(())
}
