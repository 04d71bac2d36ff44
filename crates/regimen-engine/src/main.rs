//! Console engine binary for the Regimen simulation.
//!
//! Loads configuration and the script, restores the previous session (or
//! starts a fresh one) and drives the simulation from a real-time tick
//! loop. Commands typed on stdin are executed between ticks.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `regimen-config.yaml` (or the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Load the script
//! 4. Restore the session, advancing the clock by the real time elapsed
//! 5. Run the open hooks
//! 6. Run the tick loop until `quit`, Ctrl-C or end of input
//! 7. Run the close hook and save the session

mod commands;
mod console;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{Local, NaiveDateTime, Utc};
use regimen_core::config::PathsConfig;
use regimen_core::{EngineConfig, SessionRecord, Simulation, TickSummary};
use regimen_types::Script;
use tokio::task::block_in_place;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::Flow;
use crate::console::ConsolePresentation;
use crate::error::EngineError;

/// Config file read when no path is given on the command line.
const DEFAULT_CONFIG: &str = "regimen-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration or the script cannot be loaded, or
/// the final session save fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let (config, from_file) = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("regimen-engine starting");
    if !from_file {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        script = %config.paths.script.display(),
        session = %config.paths.session.display(),
        tick_interval_ms = config.engine.tick_interval_ms,
        autosave_every_ticks = config.engine.autosave_every_ticks,
        "Configuration loaded"
    );

    // 3. Load the script.
    let script = Script::from_file(&config.paths.script)
        .map_err(EngineError::from)
        .with_context(|| format!("loading script {}", config.paths.script.display()))?;
    let script = Arc::new(script);
    info!(
        statuses = script.statuses.len(),
        jobs = script.jobs.len(),
        punishments = script.punishments.len(),
        permissions = script.permissions.len(),
        "Script loaded"
    );

    // 4. Restore or start the session.
    let mut sim = match SessionRecord::load(&config.paths.session) {
        Some(record) => {
            if record.script_path != config.paths.script {
                warn!(
                    saved = %record.script_path.display(),
                    current = %config.paths.script.display(),
                    "Session was saved with a different script"
                );
            }
            Simulation::from_session(Arc::clone(&script), config.engine.clone(), record, Utc::now())
        }
        None => Simulation::new(script, config.engine.clone(), Local::now().naive_local()),
    };

    // 5. Open.
    let mut console = ConsolePresentation::spawn();
    block_in_place(|| sim.open(&mut console));
    println!("Type 'help' for commands.");

    // 6. Tick loop.
    run(&mut sim, &mut console, &config).await?;

    // 7. Close and save.
    block_in_place(|| sim.close(&mut console));
    save(&sim, &config.paths)?;
    info!(now = %sim.now(), merits = sim.state.merits, "regimen-engine stopped");
    Ok(())
}

/// Tick the simulation in real time and execute typed commands between
/// ticks. Each tick advances the simulated clock by the real time that
/// passed since the previous one, including time spent in prompts.
async fn run(
    sim: &mut Simulation,
    console: &mut ConsolePresentation,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let mut interval = tokio::time::interval(Duration::from_millis(config.engine.tick_interval_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last = Instant::now();
    let mut pending = Duration::ZERO;
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                pending = pending.saturating_add(now.saturating_duration_since(last));
                last = now;
                let whole = pending.as_secs();
                pending = pending.saturating_sub(Duration::from_secs(whole));
                let seconds = i64::try_from(whole).unwrap_or(i64::MAX);

                let summary = block_in_place(|| sim.tick(console, seconds))?;
                log_tick(sim.now(), &summary);

                while let Some(line) = console.poll_command() {
                    debug!(command = %line, "Command");
                    match block_in_place(|| commands::execute(sim, console, &line)) {
                        Flow::Continue => {}
                        Flow::Save => save(sim, &config.paths)?,
                        Flow::Quit => return Ok(()),
                    }
                }
                if console.is_closed() {
                    info!("Input closed");
                    return Ok(());
                }

                ticks = ticks.saturating_add(1);
                let every = config.engine.autosave_every_ticks;
                if every > 0 && ticks.checked_rem(every) == Some(0) {
                    if let Err(err) = save(sim, &config.paths) {
                        warn!(%err, "Autosave failed");
                    }
                }
            }
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!(%err, "Ctrl-C handler failed");
                }
                info!("Ctrl-C received, shutting down");
                return Ok(());
            }
        }
    }
}

/// Log a tick that changed something worth noticing. Returns whether it
/// was logged.
fn log_tick(now: NaiveDateTime, summary: &TickSummary) -> bool {
    let notable = summary.new_day
        || !summary.jobs_assigned.is_empty()
        || !summary.late.is_empty()
        || !summary.expired.is_empty();
    if notable {
        info!(
            %now,
            new_day = summary.new_day,
            assigned = summary.jobs_assigned.len(),
            late = summary.late.len(),
            expired = summary.expired.len(),
            "Tick"
        );
    }
    notable
}

/// Save the current session.
fn save(sim: &Simulation, paths: &PathsConfig) -> Result<(), EngineError> {
    sim.to_session(&paths.script, Utc::now()).save(&paths.session)?;
    Ok(())
}

/// Load configuration from `path`, or defaults when the file does not
/// exist. The flag reports whether the file was read.
fn load_config(path: &Path) -> Result<(EngineConfig, bool), EngineError> {
    if path.exists() {
        Ok((EngineConfig::from_file(path)?, true))
    } else {
        let mut config = EngineConfig::default();
        config.paths.apply_env_overrides();
        Ok((config, false))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn only_notable_ticks_are_logged() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(20, 1, 0)
            .unwrap();
        assert!(!log_tick(now, &TickSummary::default()));
        let late = TickSummary {
            now: Some(now),
            late: vec!["dishes".to_owned()],
            ..TickSummary::default()
        };
        assert!(log_tick(now, &late));
        let rollover = TickSummary {
            new_day: true,
            ..TickSummary::default()
        };
        assert!(log_tick(now, &rollover));
    }
}
