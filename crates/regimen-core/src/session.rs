//! Session persistence.
//!
//! A session is one JSON document holding the simulation state, the
//! simulated clock and the real time it was saved at. On restore the
//! simulated clock moves forward by the real time that passed while the
//! program was closed, so deadlines keep running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regimen_types::Script;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::SimClock;
use crate::config::EngineSettings;
use crate::simulation::Simulation;
use crate::state::SimulationState;

/// Current session format version.
pub const SESSION_VERSION: u32 = 1;

/// Errors that can occur while saving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The file could not be written or renamed.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The state could not be encoded.
    #[error("session encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything needed to resume a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Format version.
    pub version: u32,
    /// Script the session was running.
    pub script_path: PathBuf,
    /// Simulated clock at save time.
    pub clock: SimClock,
    /// Real time at save.
    pub saved_at: DateTime<Utc>,
    /// Simulation state.
    pub state: SimulationState,
}

impl SessionRecord {
    /// Write the record to `path` through a temporary file and a rename, so
    /// a crash mid-write leaves the previous session intact.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), saved_at = %self.saved_at, "Session saved");
        Ok(())
    }

    /// Read a record from `path`. An absent, unreadable or corrupt file
    /// yields `None`: the caller starts a fresh session.
    pub fn load(path: &Path) -> Option<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No session file, first run");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "Session unreadable, starting fresh");
                return None;
            }
        };
        match serde_json::from_str::<Self>(&contents) {
            Ok(record) if record.version == SESSION_VERSION => Some(record),
            Ok(record) => {
                warn!(version = record.version, "Unsupported session version, starting fresh");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "Session corrupt, starting fresh");
                None
            }
        }
    }
}

impl Simulation {
    /// Snapshot this simulation for saving.
    pub fn to_session(&self, script_path: &Path, saved_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            version: SESSION_VERSION,
            script_path: script_path.to_path_buf(),
            clock: self.clock,
            saved_at,
            state: self.state.clone(),
        }
    }

    /// Resume a saved session at real time `real_now`. The simulated clock
    /// advances by the real time elapsed since the save, never backwards.
    pub fn from_session(
        script: Arc<Script>,
        settings: EngineSettings,
        record: SessionRecord,
        real_now: DateTime<Utc>,
    ) -> Self {
        let mut clock = record.clock;
        let elapsed = real_now
            .signed_duration_since(record.saved_at)
            .num_seconds()
            .max(0);
        if let Err(err) = clock.advance(elapsed) {
            warn!(elapsed, %err, "Could not apply elapsed time");
        }
        info!(
            saved_at = %record.saved_at,
            elapsed,
            now = %clock.now(),
            status = %record.state.status,
            assignments = record.state.assignments.len(),
            "Session restored"
        );
        Self::from_parts(script, settings, record.state, clock)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};

    use super::*;
    use crate::presentation::ScriptedPresentation;

    const SCRIPT: &str = r"
statuses:
  Home: {}
jobs:
  Dishes:
    end_time: '20:00:00'
";

    fn simulation() -> Simulation {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Simulation::new(
            Arc::new(Script::from_yaml(SCRIPT).unwrap()),
            EngineSettings::default(),
            start,
        )
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("regimen-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.assign_job(&mut ui, "dishes", false).unwrap();
        sim.set_flag("grounded", Some(600), Some("no TV".to_owned()));
        sim.state.variables.set_counter("laps", 4).unwrap();

        let path = scratch("round-trip");
        let record = sim.to_session(Path::new("script.yaml"), Utc::now());
        record.save(&path).unwrap();
        let loaded = SessionRecord::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn restore_applies_elapsed_real_time() {
        let sim = simulation();
        let saved_at = Utc::now();
        let record = sim.to_session(Path::new("script.yaml"), saved_at);
        let script = Arc::clone(&sim.script);

        let later = saved_at + TimeDelta::try_hours(2).unwrap();
        let restored =
            Simulation::from_session(Arc::clone(&script), EngineSettings::default(), record.clone(), later);
        assert_eq!(restored.now(), sim.now() + TimeDelta::try_hours(2).unwrap());

        let earlier = saved_at - TimeDelta::try_hours(2).unwrap();
        let restored = Simulation::from_session(script, EngineSettings::default(), record, earlier);
        assert_eq!(restored.now(), sim.now());
    }

    #[test]
    fn missing_or_corrupt_file_means_fresh_start() {
        assert!(SessionRecord::load(&scratch("missing")).is_none());
        let path = scratch("corrupt");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SessionRecord::load(&path).is_none());
        std::fs::remove_file(&path).unwrap();
    }
}
