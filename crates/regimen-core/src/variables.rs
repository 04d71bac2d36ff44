//! The variable store and the predefined `zz` values.
//!
//! Scripts address three namespaces by sigil: `#counter` (integers),
//! `$string` and `!time`. Names are case-insensitive and stored bare (sigil
//! stripped, lowercased). Names starting with `zz` are predefined: they are
//! computed from live state on every read, never stored, and writes to them
//! are rejected.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveTime, Timelike};
use regimen_types::TimeValue;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::interpreter::Subject;
use crate::simulation::Simulation;

/// Prefix reserved for predefined variables.
pub const PREDEFINED_PREFIX: &str = "zz";

/// Normalize a variable name: strip one leading sigil, trim, lowercase.
pub fn variable_key(name: &str) -> String {
    let name = name.trim();
    name.strip_prefix(['#', '$', '!'])
        .unwrap_or(name)
        .trim()
        .to_lowercase()
}

/// Whether `name` refers to a predefined variable.
pub fn is_predefined(name: &str) -> bool {
    variable_key(name).starts_with(PREDEFINED_PREFIX)
}

/// User-defined variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableStore {
    counters: BTreeMap<String, i64>,
    strings: BTreeMap<String, String>,
    times: BTreeMap<String, TimeValue>,
}

impl VariableStore {
    /// Read a stored counter.
    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.get(&variable_key(name)).copied()
    }

    /// Read a stored string.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings.get(&variable_key(name)).map(String::as_str)
    }

    /// Read a stored time value.
    pub fn time(&self, name: &str) -> Option<TimeValue> {
        self.times.get(&variable_key(name)).copied()
    }

    /// Write a counter.
    pub fn set_counter(&mut self, name: &str, value: i64) -> Result<(), EngineError> {
        let key = writable_key(name)?;
        self.counters.insert(key, value);
        Ok(())
    }

    /// Write a string.
    pub fn set_string(&mut self, name: &str, value: String) -> Result<(), EngineError> {
        let key = writable_key(name)?;
        self.strings.insert(key, value);
        Ok(())
    }

    /// Write a time value.
    pub fn set_time(&mut self, name: &str, value: TimeValue) -> Result<(), EngineError> {
        let key = writable_key(name)?;
        self.times.insert(key, value);
        Ok(())
    }

    /// Delete a counter. Returns whether it existed.
    pub fn drop_counter(&mut self, name: &str) -> bool {
        self.counters.remove(&variable_key(name)).is_some()
    }

    /// Delete a string. Returns whether it existed.
    pub fn drop_string(&mut self, name: &str) -> bool {
        self.strings.remove(&variable_key(name)).is_some()
    }

    /// Delete a time value. Returns whether it existed.
    pub fn drop_time(&mut self, name: &str) -> bool {
        self.times.remove(&variable_key(name)).is_some()
    }
}

fn writable_key(name: &str) -> Result<String, EngineError> {
    let key = variable_key(name);
    if key.is_empty() || key.starts_with(PREDEFINED_PREFIX) {
        return Err(EngineError::ReadOnlyVariable {
            name: name.trim().to_owned(),
        });
    }
    Ok(key)
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Simulation {
    /// Read a counter, predefined or stored.
    pub fn counter_value(&self, name: &str, subject: Option<&Subject>) -> Option<i64> {
        let key = variable_key(name);
        if key.starts_with(PREDEFINED_PREFIX) {
            return self.predefined_counter(&key, subject);
        }
        self.state.variables.counter(&key)
    }

    /// Read a string, predefined or stored.
    pub fn string_value(&self, name: &str, subject: Option<&Subject>) -> Option<String> {
        let key = variable_key(name);
        if key.starts_with(PREDEFINED_PREFIX) {
            return self.predefined_string(&key, subject);
        }
        self.state.variables.string(&key).map(str::to_owned)
    }

    /// Read a time value, predefined or stored.
    pub fn time_value(&self, name: &str) -> Option<TimeValue> {
        let key = variable_key(name);
        if key.starts_with(PREDEFINED_PREFIX) {
            return self.predefined_time(&key);
        }
        self.state.variables.time(&key)
    }

    fn predefined_counter(&self, key: &str, subject: Option<&Subject>) -> Option<i64> {
        let now = self.now();
        let value = match key {
            "zzmerits" => self.state.merits,
            "zzactive" => count(self.state.assignments.len()),
            "zzoverdue" => count(self.state.overdue_count(now)),
            "zzhour" => i64::from(now.hour()),
            "zzminute" => i64::from(now.minute()),
            "zzsecond" => i64::from(now.second()),
            "zzday" => i64::from(now.day()),
            "zzmonth" => i64::from(now.month()),
            "zzyear" => i64::from(now.year()),
            "zzweekday" => i64::from(now.weekday().number_from_monday()),
            "zzlateminutes" => self.state.last_late_minutes,
            "zzearlyminutes" => self.state.last_early_minutes,
            "zzseverity" => subject.map_or(0, |s| i64::from(s.severity)),
            "zzpermissionstoday" => {
                let today = now.date();
                self.state
                    .permissions
                    .values()
                    .map(|record| i64::from(record.grants_on(today)))
                    .sum()
            }
            _ => return None,
        };
        Some(value)
    }

    fn predefined_string(&self, key: &str, subject: Option<&Subject>) -> Option<String> {
        let now = self.now();
        let general = &self.script.general;
        let value = match key {
            "zzname" => general.sub_name.clone(),
            "zzmaster" => general.master_name.clone(),
            "zzdate" => now.format("%Y-%m-%d").to_string(),
            "zztime" => now.format("%H:%M").to_string(),
            "zzday" => now.format("%A").to_string(),
            "zzstatus" => self
                .script
                .status(&self.state.status)
                .map_or_else(|| self.state.status.clone(), |s| s.title.clone()),
            "zzlastreport" => self.state.last_report.clone(),
            "zzlastpermission" => self.state.last_permission.clone(),
            "zzlastanswer" => self.state.last_answer.clone(),
            "zzsubject" => subject.map(|s| s.name.clone()).unwrap_or_default(),
            "zztitle" => subject.map(|s| s.title.clone()).unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }

    fn predefined_time(&self, key: &str) -> Option<TimeValue> {
        let now = self.now();
        match key {
            "zznow" => Some(TimeValue::DateTime(now)),
            "zztoday" => Some(TimeValue::DateTime(now.date().and_time(NaiveTime::MIN))),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use regimen_types::Script;

    use super::*;
    use crate::config::EngineSettings;

    fn simulation() -> Simulation {
        let script = Script::from_yaml(
            "general:\n  sub_name: Alex\nstatuses:\n  Home:\n    title: At home\n",
        )
        .unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 6)
            .unwrap()
            .and_hms_opt(14, 30, 15)
            .unwrap();
        Simulation::new(Arc::new(script), EngineSettings::default(), start)
    }

    #[test]
    fn keys_strip_sigil_and_case() {
        assert_eq!(variable_key("#Laps"), "laps");
        assert_eq!(variable_key(" $Name "), "name");
        assert_eq!(variable_key("!Due"), "due");
        assert!(is_predefined("#zzMerits"));
        assert!(!is_predefined("#laps"));
    }

    #[test]
    fn predefined_names_are_read_only() {
        let mut store = VariableStore::default();
        assert!(matches!(
            store.set_counter("#zzMerits", 5),
            Err(EngineError::ReadOnlyVariable { .. })
        ));
        assert!(store.set_string("$", String::new()).is_err());
        store.set_counter("#Laps", 3).unwrap();
        assert_eq!(store.counter("laps"), Some(3));
        assert!(store.drop_counter("#LAPS"));
        assert_eq!(store.counter("laps"), None);
    }

    #[test]
    fn predefined_values_follow_live_state() {
        let mut sim = simulation();
        assert_eq!(sim.counter_value("zzMerits", None), Some(500));
        sim.state.merits = 42;
        assert_eq!(sim.counter_value("#zzmerits", None), Some(42));
        assert_eq!(sim.counter_value("zzHour", None), Some(14));
        assert_eq!(sim.counter_value("zzWeekday", None), Some(3));
        assert_eq!(sim.string_value("zzName", None).as_deref(), Some("Alex"));
        assert_eq!(sim.string_value("zzStatus", None).as_deref(), Some("At home"));
        assert_eq!(sim.string_value("zzDay", None).as_deref(), Some("Wednesday"));
        assert_eq!(sim.counter_value("zzDay", None), Some(6));
        assert_eq!(
            sim.time_value("!zzToday"),
            TimeValue::parse("2024-03-06")
        );
    }

    #[test]
    fn subject_values_come_from_context() {
        let sim = simulation();
        let subject = Subject {
            name: "lines_2".to_owned(),
            title: "Write lines".to_owned(),
            severity: 30,
        };
        assert_eq!(sim.counter_value("zzSeverity", Some(&subject)), Some(30));
        assert_eq!(sim.counter_value("zzSeverity", None), Some(0));
        assert_eq!(
            sim.string_value("zzTitle", Some(&subject)).as_deref(),
            Some("Write lines")
        );
    }

    #[test]
    fn unknown_predefined_is_none() {
        let sim = simulation();
        assert_eq!(sim.counter_value("zzBogus", None), None);
    }
}
