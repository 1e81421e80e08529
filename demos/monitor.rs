// SPDX-License-Identifier: MPL-2.0

//! Monitor program: connect with an account file and print device snapshots.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=ecoflow_mqtt=debug cargo run --example monitor -- <account.json> [minutes]
//! ```
//!
//! The account file format is described in `ecoflow_mqtt::config`.

use std::env;
use std::time::Duration;

use ecoflow_mqtt::{AccountConfig, Session};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <account.json> [minutes]", args[0]);
        std::process::exit(1);
    }
    let minutes: u64 = args.get(2).map_or(Ok(5), |m| m.parse())?;

    let account = AccountConfig::from_file(&args[1])?;
    let session = Session::new(account.session_config()?);
    for registration in account.registrations() {
        let device = session.register(registration)?;
        let mut updates = device.store().subscribe();
        let serial_number = device.serial_number().to_string();
        tokio::spawn(async move {
            while let Ok(snapshot) = updates.recv().await {
                println!("[{serial_number}] {} fields", snapshot.len());
                for (key, value) in snapshot.iter() {
                    println!("  {key} = {value}");
                }
            }
        });
    }

    println!("Connecting to {}...", session.config().host());
    session.connect().await?;
    let watchdog = session.supervise(Duration::from_secs(30));

    for device in session.devices() {
        session.request_latest_quotas(device.serial_number());
    }

    println!("Monitoring for {minutes} minute(s)...");
    tokio::time::sleep(Duration::from_secs(minutes * 60)).await;

    session.stop().await;
    watchdog.abort();
    println!("Done!");
    Ok(())
}
