//! The definition store: a compiled script as the engine consumes it.
//!
//! The script compiler is an external collaborator; it emits YAML that
//! deserializes into [`Script`]. Loading lowercases every map key so that
//! lookups by name are case-insensitive, and fills empty titles with the
//! original key.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::definitions::{
    EntryDefinition, EventHandler, FlagDefinition, GeneralSettings, InstructionDefinition,
    JobDefinition, PermissionDefinition, ProcedureDefinition, PunishmentDefinition,
    QuestionDefinition, StatusDefinition, TimerDefinition,
};

/// Errors that can occur when loading a compiled script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Failed to read the script file from disk.
    #[error("failed to read script file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse script YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// The script declares no statuses, so no state machine can run.
    #[error("script declares no statuses")]
    NoStatuses,
}

/// A compiled script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Script-wide settings.
    pub general: GeneralSettings,
    /// Status entered on first run. Falls back to the default status, then
    /// to the first status declared.
    pub init_status: Option<String>,
    /// Statuses by name.
    pub statuses: BTreeMap<String, StatusDefinition>,
    /// Jobs by name.
    pub jobs: BTreeMap<String, JobDefinition>,
    /// Punishments by name.
    pub punishments: BTreeMap<String, PunishmentDefinition>,
    /// Permissions by name.
    pub permissions: BTreeMap<String, PermissionDefinition>,
    /// Confessions by name.
    pub confessions: BTreeMap<String, EntryDefinition>,
    /// Reports by name.
    pub reports: BTreeMap<String, EntryDefinition>,
    /// Procedures by name.
    pub procedures: BTreeMap<String, ProcedureDefinition>,
    /// Timers by name.
    pub timers: BTreeMap<String, TimerDefinition>,
    /// Flag defaults by name.
    pub flags: BTreeMap<String, FlagDefinition>,
    /// Instruction sets by name.
    pub instructions: BTreeMap<String, InstructionDefinition>,
    /// Questions by name.
    pub questions: BTreeMap<String, QuestionDefinition>,
    /// Hook procedures.
    pub event_handlers: BTreeMap<EventHandler, String>,
}

impl Script {
    /// Load a script from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Io`] if the file cannot be read, or any error
    /// from [`Script::from_yaml`].
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a script from YAML and normalize its names.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Yaml`] on malformed YAML and
    /// [`ScriptError::NoStatuses`] if no status is declared.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScriptError> {
        let mut script: Self = serde_yml::from_str(yaml)?;
        if script.statuses.is_empty() {
            return Err(ScriptError::NoStatuses);
        }
        if script.init_status.is_none() && script.general.default_status.is_empty() {
            script.init_status = first_declared_status(yaml)?;
        }
        Ok(script.normalized())
    }

    /// Lowercase every key and cross-reference, and fill empty titles.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.statuses = lowercase_keys(self.statuses);
        for (name, status) in &mut self.statuses {
            fill_title(&mut status.title, name);
        }
        self.jobs = lowercase_keys(self.jobs);
        for (name, job) in &mut self.jobs {
            fill_title(&mut job.title, name);
        }
        self.punishments = lowercase_keys(self.punishments);
        for (name, punishment) in &mut self.punishments {
            fill_title(&mut punishment.title, name);
        }
        self.permissions = lowercase_keys(self.permissions);
        for (name, permission) in &mut self.permissions {
            fill_title(&mut permission.title, name);
        }
        self.confessions = lowercase_keys(self.confessions);
        for (name, confession) in &mut self.confessions {
            fill_title(&mut confession.title, name);
        }
        self.reports = lowercase_keys(self.reports);
        for (name, report) in &mut self.reports {
            fill_title(&mut report.title, name);
        }
        self.instructions = lowercase_keys(self.instructions);
        for (name, instruction) in &mut self.instructions {
            fill_title(&mut instruction.title, name);
        }
        self.procedures = lowercase_keys(self.procedures);
        self.timers = lowercase_keys(self.timers);
        self.flags = lowercase_keys(self.flags);
        self.questions = lowercase_keys(self.questions);
        for procedure in self.event_handlers.values_mut() {
            *procedure = procedure.to_lowercase();
        }
        self.general.default_status = self.general.default_status.to_lowercase();
        self.init_status = self.init_status.map(|s| s.to_lowercase());

        debug!(
            statuses = self.statuses.len(),
            jobs = self.jobs.len(),
            punishments = self.punishments.len(),
            procedures = self.procedures.len(),
            "Script normalized"
        );
        self
    }

    /// The status entered on a fresh start.
    pub fn initial_status(&self) -> String {
        self.init_status
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.general.default_status.clone()).filter(|s| !s.is_empty()))
            .or_else(|| self.statuses.keys().next().cloned())
            .unwrap_or_default()
    }

    /// Look up a status.
    pub fn status(&self, name: &str) -> Option<&StatusDefinition> {
        self.statuses.get(&name.to_lowercase())
    }

    /// Look up a job.
    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.get(&name.to_lowercase())
    }

    /// Look up a punishment.
    pub fn punishment(&self, name: &str) -> Option<&PunishmentDefinition> {
        self.punishments.get(&name.to_lowercase())
    }

    /// Look up a permission.
    pub fn permission(&self, name: &str) -> Option<&PermissionDefinition> {
        self.permissions.get(&name.to_lowercase())
    }

    /// Look up a confession.
    pub fn confession(&self, name: &str) -> Option<&EntryDefinition> {
        self.confessions.get(&name.to_lowercase())
    }

    /// Look up a report.
    pub fn report(&self, name: &str) -> Option<&EntryDefinition> {
        self.reports.get(&name.to_lowercase())
    }

    /// Look up a procedure.
    pub fn procedure(&self, name: &str) -> Option<&ProcedureDefinition> {
        self.procedures.get(&name.to_lowercase())
    }

    /// Look up a timer.
    pub fn timer(&self, name: &str) -> Option<&TimerDefinition> {
        self.timers.get(&name.to_lowercase())
    }

    /// Look up a flag definition.
    pub fn flag(&self, name: &str) -> Option<&FlagDefinition> {
        self.flags.get(&name.to_lowercase())
    }

    /// Look up an instruction set.
    pub fn instruction(&self, name: &str) -> Option<&InstructionDefinition> {
        self.instructions.get(&name.to_lowercase())
    }

    /// Look up a question.
    pub fn question(&self, name: &str) -> Option<&QuestionDefinition> {
        self.questions.get(&name.to_lowercase())
    }

    /// The procedure attached to a hook, if any.
    pub fn handler(&self, event: EventHandler) -> Option<&str> {
        self.event_handlers
            .get(&event)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

/// The first key under `statuses`, in document order. The status maps are
/// sorted, so the declaration order has to come from the raw document.
fn first_declared_status(yaml: &str) -> Result<Option<String>, ScriptError> {
    let raw: serde_yml::Value = serde_yml::from_str(yaml)?;
    Ok(raw
        .get("statuses")
        .and_then(serde_yml::Value::as_mapping)
        .and_then(|statuses| statuses.keys().next())
        .and_then(serde_yml::Value::as_str)
        .map(str::to_owned))
}

fn lowercase_keys<V>(map: BTreeMap<String, V>) -> BTreeMap<String, V> {
    map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

fn fill_title(title: &mut String, name: &str) {
    if title.is_empty() {
        name.clone_into(title);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::actions::ActionKind;
    use crate::definitions::{JobRecurrence, RemindInterval};

    const SCRIPT: &str = r#"
general:
  default_status: Normal
  max_merits: 200
init_status: Normal
statuses:
  Normal:
    title: At home
  Kneeling:
    sub_status: true
jobs:
  Dishes:
    run: Daily
    end_time: "20:00:00"
    merits: 5
procedures:
  Praise:
    actions:
      - kind: AddMerit
        value: "3"
event_handlers:
  NewDay: Praise
"#;

    #[test]
    fn parses_and_normalizes_names() {
        let script = Script::from_yaml(SCRIPT).unwrap();
        assert!(script.status("NORMAL").is_some());
        assert_eq!(script.status("normal").unwrap().title, "At home");
        assert_eq!(script.status("kneeling").unwrap().title, "kneeling");
        assert_eq!(script.job("dishes").unwrap().run, JobRecurrence::Daily);
        assert_eq!(script.general.max_merits, 200);
        assert_eq!(script.general.default_status, "normal");
        assert_eq!(script.handler(EventHandler::NewDay), Some("praise"));
        assert_eq!(
            script.procedure("praise").unwrap().actions[0].kind,
            ActionKind::AddMerit
        );
    }

    #[test]
    fn initial_status_prefers_init_section() {
        let script = Script::from_yaml(SCRIPT).unwrap();
        assert_eq!(script.initial_status(), "normal");
    }

    #[test]
    fn initial_status_falls_back_to_first_declared() {
        let script =
            Script::from_yaml("statuses:\n  Home: {}\n  Away: {}\n  Break: {}\n").unwrap();
        assert_eq!(script.initial_status(), "home");

        let script = Script::from_yaml(
            "general:\n  default_status: Break\nstatuses:\n  Home: {}\n  Break: {}\n",
        )
        .unwrap();
        assert_eq!(script.initial_status(), "break");
    }

    #[test]
    fn household_demo_loads() {
        let script = Script::from_yaml(include_str!("../../../demos/household.yaml")).unwrap();
        assert_eq!(script.initial_status(), "home");
        assert_eq!(
            script.general.remind_interval,
            RemindInterval::Every(3_600)
        );
        assert_eq!(
            script.job("plants").unwrap().run,
            JobRecurrence::Interval {
                every_days: 3,
                first_days: None
            }
        );
        assert_eq!(
            script.job("laundry").unwrap().run,
            JobRecurrence::Weekdays(vec![Weekday::Sat])
        );
        assert_eq!(script.job("dishes").unwrap().run, JobRecurrence::Daily);
        assert_eq!(script.handler(EventHandler::FirstRun), Some("welcome"));
    }

    #[test]
    fn rejects_script_without_statuses() {
        let result = Script::from_yaml("general:\n  max_merits: 10\n");
        assert!(matches!(result, Err(ScriptError::NoStatuses)));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let result = Script::from_yaml("statuses: [unclosed");
        assert!(matches!(result, Err(ScriptError::Yaml { .. })));
    }
}
