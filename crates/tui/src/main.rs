mod app;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    sync::Mutex,
    time::Duration,
};

use railsim_core::{
    config::{self, AppConfig},
    Simulation,
};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

const MIN_REFRESH_MS: u64 = 100;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    let sim = Simulation::from_config(&config)?;

    if std::env::args().skip(1).any(|arg| arg == "--json") {
        let snapshot = sim.advance_and_snapshot()?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let refresh = Duration::from_millis(config.refresh_interval_ms.max(MIN_REFRESH_MS));
    info!(
        fleet_size = config.fleet_size,
        refresh_ms = refresh.as_millis() as u64,
        "Starting dashboard"
    );
    let mut app = app::RailsimApp::new(sim, refresh);
    app.run().await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("railsim.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The dashboard owns stdout, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
