use std::env;

use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};
use wallet_desk::Desk;

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();

    let desk = match Desk::from_config_path(&config_path) {
        Ok(desk) => desk,
        Err(e) => {
            eprintln!("Failed to create desk: {}", e);
            return;
        }
    };

    init_tracing(desk.config().app.log_level.as_deref());
    info!(config = %config_path, "Desk initialized");

    tokio::select! {
        result = desk.start() => {
            if let Err(e) = result {
                error!(error = %e, "Desk error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
        }
    }

    if let Err(e) = desk.stop().await {
        error!(error = %e, "Failed to stop desk");
    }
}
