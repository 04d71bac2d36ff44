//! Runtime automation core for the Regimen simulation.
//!
//! This crate owns the [`Simulation`]: a tick-driven rule engine that
//! interprets a compiled [`Script`], keeps state across sessions,
//! schedules and expires assignments, resolves text templates and
//! executes the action instruction set.
//!
//! # Modules
//!
//! - [`clock`] -- Simulated clock with fast-forward.
//! - [`config`] -- Engine configuration from `regimen-config.yaml`.
//! - [`error`] -- [`EngineError`], the runtime error taxonomy.
//! - [`simulation`] -- The [`Simulation`] aggregate.
//! - [`state`] -- Mutable state: status, merits, flags, assignments, statistics.
//! - [`variables`] -- Counters, strings and times, plus `zz` predefined values.
//! - [`condition`] -- `If`/`NotIf` expressions and eligibility checks.
//! - [`template`] -- `{...}` token expansion.
//! - [`interpreter`] -- Procedure calls and action execution.
//! - [`status`] -- The status state machine and its history stack.
//! - [`assignment`] -- Job and punishment instance lifecycle.
//! - [`punishment`] -- Weighted selection, decomposition and decline escalation.
//! - [`permission`] -- Permissions, confessions, reports and outfit reports.
//! - [`scheduler`] -- Day rollover, timers, reminders, expiry and flag sweeps.
//! - [`presentation`] -- The [`Presentation`] trait and [`ScriptedPresentation`].
//! - [`session`] -- Session save and restore.
//!
//! [`Script`]: regimen_types::Script
//! [`EngineError`]: error::EngineError
//! [`Simulation`]: simulation::Simulation
//! [`Presentation`]: presentation::Presentation
//! [`ScriptedPresentation`]: presentation::ScriptedPresentation

pub mod assignment;
pub mod clock;
pub mod condition;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod permission;
pub mod presentation;
pub mod punishment;
pub mod scheduler;
pub mod session;
pub mod simulation;
pub mod state;
pub mod status;
pub mod template;
pub mod variables;

pub use clock::{ClockError, SimClock};
pub use config::{ConfigError, EngineConfig, EngineSettings};
pub use error::EngineError;
pub use interpreter::{CallContext, Subject};
pub use permission::{Denial, PermissionAnswer};
pub use presentation::{Answer, Presentation, ScriptedPresentation};
pub use punishment::PunishmentOutcome;
pub use scheduler::{TickError, TickSummary};
pub use session::{SessionError, SessionRecord};
pub use simulation::Simulation;
pub use state::{Assignment, AssignmentKind, SimulationState};
pub use status::StatusMenu;
