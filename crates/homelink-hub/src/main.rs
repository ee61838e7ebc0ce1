//! Homelink hub binary.
//!
//! Loads the TOML configuration, registers the generic driver for the
//! common appliance types, and runs the bridge until interrupted.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::Utc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use homelink_hub::{DriverRegistry, GenericDriver, Hub, HubConfig};
use homelink_oauth::Credentials;

const DEFAULT_DRIVER_TYPES: &[&str] = &[
    "Washer",
    "Dryer",
    "WasherDryer",
    "Dishwasher",
    "Oven",
    "CoffeeMaker",
    "FridgeFreezer",
    "Refrigerator",
    "Freezer",
    "Hood",
    "Hob",
    "CleaningRobot",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let path = std::env::var_os("HOMELINK_CONFIG")
        .map_or_else(|| PathBuf::from("homelink.toml"), PathBuf::from);
    let config = HubConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    let mut drivers = DriverRegistry::new();
    for appliance_type in DEFAULT_DRIVER_TYPES {
        drivers.register(*appliance_type, GenericDriver::factory());
    }

    let hub = Hub::new(config, drivers)?;

    // Headless installs seed a refresh token from the environment; the
    // first platform call exchanges it for a fresh access token.
    if let Ok(refresh_token) = std::env::var("HOMELINK_REFRESH_TOKEN") {
        hub.token_store()
            .install(Credentials {
                access_token: String::new(),
                refresh_token: Some(refresh_token),
                expires_at: Utc::now(),
                last_error: None,
            })
            .await;
    }

    if !hub.token_store().is_authorized().await {
        let url = hub.authorization_url()?;
        eprintln!("Not authorized. Complete the flow at:");
        eprintln!("  {url}");
        eprintln!("then restart with HOMELINK_REFRESH_TOKEN set.");
        std::process::exit(1);
    }

    let report = hub.apply_selection().await?;
    info!(
        created = report.created.len(),
        unsupported = report.unsupported.len(),
        "Devices reconciled"
    );

    let runtime = hub.connect();
    info!("Bridge running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    hub.reconciler().cancel_pending_init();
    runtime.shutdown().await;
    Ok(())
}
