//! Shared type definitions for the Regimen simulation.
//!
//! This crate is the single source of truth for the compiled script the
//! engine runs and the value types its state is built from.
//!
//! # Modules
//!
//! - [`actions`] -- The closed [`ActionKind`] instruction set and [`ScriptAction`]
//! - [`definitions`] -- Immutable definitions (statuses, jobs, punishments, ...)
//! - [`script`] -- The [`Script`] definition store and its YAML loader
//! - [`values`] -- Runtime values ([`FlagData`], [`TimeValue`]) and time literals

pub mod actions;
pub mod definitions;
pub mod script;
pub mod values;

// Re-export all public types at crate root for convenience.
pub use actions::{ActionKind, ScriptAction};
pub use definitions::{
    Eligibility, EntryDefinition, EventHandler, ExpirePolicy, FlagDefinition, GeneralSettings,
    InstructionDefinition, JobDefinition, JobRecurrence, PermissionDefinition,
    ProcedureDefinition, PunishmentDefinition, QuestionAnswer, QuestionDefinition,
    RemindInterval, RemindPolicy, SelectMode, SeverityRange, StatusDefinition, TimeWindow,
    TimerDefinition, ValueUnit,
};
pub use script::{Script, ScriptError};
pub use values::{
    FlagData, SECS_PER_DAY, SECS_PER_HOUR, SECS_PER_MINUTE, TimeValue, format_interval,
    parse_date, parse_date_time, parse_interval, parse_time_of_day,
};
