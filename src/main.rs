//! # Havvarsel Tracker Application Entry Point
//!
//! This binary drives the library's refresh cycle on a fixed interval, standing in
//! for the scheduler a sensor platform would normally provide. It loads the TOML
//! configuration, keeps at most one refresh in flight, and prints a short summary
//! after every successful refresh.
//!
//! Usage:
//! - `havvarsel-tracker [config.toml]`: poll forever, Ctrl+C to stop
//! - `havvarsel-tracker --once [config.toml]`: one refresh, JSON on stdout

// Test modules
#[cfg(test)]
mod tests;

use anyhow::Context;
use havvarsel_lib::compat::project_legacy;
use havvarsel_lib::config::{Config, DEFAULT_CONFIG_PATH};
use havvarsel_lib::poller::Poller;
use havvarsel_lib::transport::{Endpoints, HttpTransport};
use havvarsel_lib::ProjectionResult;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Format one line per variable: name, current value with unit, sample count.
fn summary_lines(result: &ProjectionResult) -> Vec<String> {
    result
        .variables
        .iter()
        .map(|series| {
            let value = match series.current {
                Some(value) => format!("{value:.2} {}", series.units().unwrap_or("")),
                None => "--".to_string(),
            };
            format!(
                "{:<24} {:>14}  ({} samples)",
                series.description(),
                value.trim_end(),
                series.series.len()
            )
        })
        .collect()
}

fn print_summary(result: &ProjectionResult) {
    println!(
        "Grid point {:.4}, {:.4}",
        result.nearest_grid.lat, result.nearest_grid.lon
    );
    for line in summary_lines(result) {
        println!("  {line}");
    }
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let once = env::args().any(|arg| arg == "--once");
    let config_path = env::args()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_from_path(&config_path);

    let transport = HttpTransport::with_options(config.timeout(), &config.api.user_agent)
        .context("failed to build HTTP client")?;
    let poller = Poller::new(
        Arc::new(transport),
        Endpoints::new(config.api.base_url.as_str()),
        config.location(),
    );

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    if once {
        return rt.block_on(async {
            let result = poller
                .refresh(&config.polling.variables)
                .await
                .context("refresh failed")?;
            let output = json!({
                "projection": &*result,
                "legacy": project_legacy(&result),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok::<_, anyhow::Error>(())
        });
    }

    rt.block_on(async {
        let grid = poller.resolve_grid_point().await;
        info!(
            location = %config.location.name,
            grid_lon = grid.resolved.lon,
            grid_lat = grid.resolved.lat,
            adjusted = grid.adjusted(),
            "tracking location"
        );

        let catalog = poller.catalog().available_variables().await;
        let names: Vec<&str> = catalog.iter().map(|(name, _)| name.as_str()).collect();
        info!(variables = ?names, "service catalog");

        let mut ticker = interval(config.interval());
        // A slow refresh delays the next one instead of stacking them
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }

            // Ctrl+C also interrupts an in-flight refresh; nothing partial is published
            let refreshed = tokio::select! {
                refreshed = poller.refresh(&config.polling.variables) => refreshed,
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            };

            match refreshed {
                Ok(result) => print_summary(&result),
                Err(err) => {
                    let kept = poller.latest().is_some();
                    warn!(error = %err, previous_snapshot = kept, "refresh failed");
                }
            }
        }
        Ok::<_, anyhow::Error>(())
    })
}
