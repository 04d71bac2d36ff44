//! The simulation aggregate.
//!
//! [`Simulation`] owns everything one running session needs: the shared
//! read-only script, the mutable state, the simulated clock, engine
//! settings and the random source. Behavior is spread across modules as
//! `impl Simulation` blocks (conditions, templates, the interpreter,
//! assignments, punishments, permissions, the scheduler), so each concern
//! reads on its own while sharing one `&mut self`.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rand::SeedableRng;
use rand::rngs::StdRng;
use regimen_types::{EventHandler, Script};
use tracing::info;

use crate::clock::SimClock;
use crate::config::EngineSettings;
use crate::presentation::Presentation;
use crate::state::SimulationState;

/// One running session.
#[derive(Debug)]
pub struct Simulation {
    pub(crate) script: Arc<Script>,
    /// Mutable simulation state.
    pub state: SimulationState,
    /// Simulated clock.
    pub clock: SimClock,
    pub(crate) settings: EngineSettings,
    pub(crate) rng: StdRng,
}

impl Simulation {
    /// Start a fresh session at `start`.
    ///
    /// The initial status comes from the script's init section (falling
    /// back to the default status), merits start at `start_merits`, and
    /// autostart timers are registered.
    pub fn new(script: Arc<Script>, settings: EngineSettings, start: NaiveDateTime) -> Self {
        let general = &script.general;
        let merits = general
            .start_merits
            .max(general.min_merits)
            .min(general.max_merits);
        let mut state = SimulationState::new(script.initial_status(), merits, start.date());
        state.active_timers = script
            .timers
            .iter()
            .filter(|(_, timer)| timer.autostart)
            .map(|(name, _)| name.clone())
            .collect();

        info!(
            status = %state.status,
            merits,
            timers = state.active_timers.len(),
            "New session"
        );

        Self::from_parts(script, settings, state, SimClock::new(start))
    }

    /// Assemble a simulation from restored parts.
    pub fn from_parts(
        script: Arc<Script>,
        settings: EngineSettings,
        state: SimulationState,
        clock: SimClock,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            script,
            state,
            clock,
            settings,
            rng,
        }
    }

    /// Run FirstRun (once per session) and OpenProgram.
    pub fn open(&mut self, ui: &mut dyn Presentation) {
        if self.state.first_run {
            self.state.first_run = false;
            info!("First run");
            self.run_hook(ui, EventHandler::FirstRun);
        }
        self.run_hook(ui, EventHandler::OpenProgram);
    }

    /// Run CloseProgram.
    pub fn close(&mut self, ui: &mut dyn Presentation) {
        self.run_hook(ui, EventHandler::CloseProgram);
    }

    /// The loaded script.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Engine settings in effect.
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Current simulated instant.
    pub const fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Replace the random source with a seeded one.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::presentation::ScriptedPresentation;

    const SCRIPT: &str = r##"
general:
  start_merits: 5000
  max_merits: 300
init_status: Home
statuses:
  Home: {}
timers:
  Morning:
    start: "07:00:00"
    end: "08:00:00"
    autostart: true
  Evening:
    start: "19:00:00"
    end: "20:00:00"
procedures:
  Welcome:
    actions:
      - kind: SetCounter
        value: "#opened,1"
  Again:
    actions:
      - kind: AddCounter
        value: "#opens,1"
event_handlers:
  FirstRun: Welcome
  OpenProgram: Again
"##;

    fn simulation() -> Simulation {
        let script = Arc::new(Script::from_yaml(SCRIPT).unwrap());
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let settings = EngineSettings {
            seed: Some(1),
            ..EngineSettings::default()
        };
        Simulation::new(script, settings, start)
    }

    #[test]
    fn new_session_initial_state() {
        let sim = simulation();
        assert_eq!(sim.state.status, "home");
        assert_eq!(sim.state.merits, 300);
        assert!(sim.state.active_timers.contains("morning"));
        assert!(!sim.state.active_timers.contains("evening"));
        assert!(sim.state.first_run);
    }

    #[test]
    fn first_run_hook_runs_once() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.open(&mut ui);
        sim.open(&mut ui);
        assert_eq!(sim.state.variables.counter("opened"), Some(1));
        assert_eq!(sim.state.variables.counter("opens"), Some(2));
        assert!(!sim.state.first_run);
    }
}
