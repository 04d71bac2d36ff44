//! The mutable simulation state.
//!
//! Everything that changes while the simulation runs lives in
//! [`SimulationState`]: the current status and its history stack, merits,
//! flags, variables, active assignments, per-definition bookkeeping and
//! daily statistics. The whole struct round-trips through the session
//! file.
//!
//! The methods here are pure state transitions that need no script
//! lookups and no user interaction. Transitions that run hooks or actions
//! live on [`Simulation`](crate::simulation::Simulation).
//!
//! # Invariants
//!
//! - `min_merits <= merits <= max_merits` after every merit operation.
//! - One [`Assignment`] record per instance: inserting or removing an
//!   instance touches exactly one map entry (plus its `_started` flag).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use regimen_types::{FlagData, GeneralSettings, RemindInterval};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::variables::VariableStore;

/// Days of statistics kept in [`SimulationState::history`].
pub const STATS_HISTORY_DAYS: usize = 31;

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

/// Which definition map an assignment instance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentKind {
    /// A job.
    Job,
    /// A punishment.
    Punishment,
}

impl AssignmentKind {
    /// Lowercase name used in logs and errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Punishment => "punishment",
        }
    }
}

/// One active job or punishment instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Job or punishment.
    pub kind: AssignmentKind,
    /// Lowercase definition name.
    pub definition: String,
    /// Display title copied from the definition.
    pub title: String,
    /// When the instance was created.
    pub assigned_at: NaiveDateTime,
    /// When it becomes late.
    pub deadline: NaiveDateTime,
    /// When it is removed with the expiry penalty.
    pub expiry: Option<NaiveDateTime>,
    /// Reminder cadence once late.
    pub remind_interval: RemindInterval,
    /// Next reminder due, set when the deadline is first crossed.
    pub next_reminder: Option<NaiveDateTime>,
    /// Whether the deadline has been crossed.
    pub late: bool,
    /// Merits to give back when done late.
    pub late_refund: Option<i64>,
    /// Accumulated units (punishments) or 1 (jobs).
    pub amount: u32,
    /// Accumulated severity (punishments) or 0 (jobs).
    pub severity: u32,
    /// When the instance was started, for long-running work.
    pub started_at: Option<NaiveDateTime>,
}

impl Assignment {
    /// Whether `now` is past the deadline.
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        now > self.deadline
    }

    /// Whether the instance has been started.
    pub const fn is_started(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Name of the flag set while `instance` is started.
pub fn started_flag(instance: &str) -> String {
    format!("{instance}_started")
}

// ---------------------------------------------------------------------------
// Bookkeeping records
// ---------------------------------------------------------------------------

/// Per-job recurrence bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHistory {
    /// Date the job was last assigned.
    pub last_assigned: Option<NaiveDate>,
    /// Date the job was last completed.
    pub last_done: Option<NaiveDate>,
}

/// Per-permission bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// When the permission was last granted.
    pub last_granted: Option<NaiveDateTime>,
    /// Asking is refused until this instant.
    pub locked_until: Option<NaiveDateTime>,
    /// Date `grants_today` refers to.
    pub grants_date: Option<NaiveDate>,
    /// Grants on `grants_date`.
    pub grants_today: u32,
    /// Total grants.
    pub grants: u32,
    /// Total denials.
    pub denials: u32,
}

impl PermissionRecord {
    /// Grants counted for `today`.
    pub fn grants_on(&self, today: NaiveDate) -> u32 {
        if self.grants_date == Some(today) {
            self.grants_today
        } else {
            0
        }
    }

    /// Record a grant at `now`.
    pub fn record_grant(&mut self, now: NaiveDateTime) {
        let today = now.date();
        self.grants_today = self.grants_on(today).saturating_add(1);
        self.grants_date = Some(today);
        self.grants = self.grants.saturating_add(1);
        self.last_granted = Some(now);
    }
}

/// A message delivered once the simulated clock reaches `due`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    /// Delivery instant.
    pub due: NaiveDateTime,
    /// Text shown.
    pub message: String,
}

/// How often each definition has been used, by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageCounters {
    /// Permission asks.
    pub permissions: BTreeMap<String, u32>,
    /// Confessions made.
    pub confessions: BTreeMap<String, u32>,
    /// Reports made.
    pub reports: BTreeMap<String, u32>,
    /// Jobs completed.
    pub jobs: BTreeMap<String, u32>,
    /// Punishments completed.
    pub punishments: BTreeMap<String, u32>,
}

impl UsageCounters {
    /// Increment the counter for `name` in `map`.
    pub fn bump(map: &mut BTreeMap<String, u32>, name: &str) {
        let count = map.entry(name.to_owned()).or_insert(0);
        *count = count.saturating_add(1);
    }
}

/// Activity recorded for one simulated day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyStats {
    /// The day these stats cover.
    pub date: Option<NaiveDate>,
    /// Jobs completed.
    pub jobs_done: Vec<String>,
    /// Jobs that became late.
    pub jobs_late: Vec<String>,
    /// Punishments given.
    pub punishments_given: Vec<String>,
    /// Punishments completed.
    pub punishments_done: Vec<String>,
    /// Permissions granted.
    pub permissions_granted: Vec<String>,
    /// Permissions denied.
    pub permissions_denied: Vec<String>,
    /// Confessions made.
    pub confessions: Vec<String>,
    /// Reports made.
    pub reports: Vec<String>,
    /// Outfits reported.
    pub outfits: Vec<String>,
    /// Merits gained.
    pub merits_gained: i64,
    /// Merits lost.
    pub merits_lost: i64,
}

// ---------------------------------------------------------------------------
// SimulationState
// ---------------------------------------------------------------------------

/// All mutable simulation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Current status (lowercase).
    pub status: String,
    /// Statuses to return to, most recent last.
    pub status_history: Vec<String>,
    /// Current merits.
    pub merits: i64,
    /// Set flags by lowercase name.
    pub flags: BTreeMap<String, FlagData>,
    /// User variables.
    #[serde(default)]
    pub variables: VariableStore,
    /// Active assignments by instance name.
    #[serde(default)]
    pub assignments: BTreeMap<String, Assignment>,
    /// Date the scheduler last saw.
    #[serde(default)]
    pub last_date: Option<NaiveDate>,
    /// Date daily merits were last granted.
    #[serde(default)]
    pub last_merit_grant: Option<NaiveDate>,
    /// Last assignment deadline check.
    #[serde(default)]
    pub last_assignment_check: Option<NaiveDateTime>,
    /// Last flag expiry sweep.
    #[serde(default)]
    pub last_flag_check: Option<NaiveDateTime>,
    /// Registered timers.
    #[serde(default)]
    pub active_timers: BTreeSet<String>,
    /// Timers that fired today.
    #[serde(default)]
    pub timers_triggered: BTreeSet<String>,
    /// Recurrence bookkeeping per job.
    #[serde(default)]
    pub job_history: BTreeMap<String, JobHistory>,
    /// Bookkeeping per permission.
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionRecord>,
    /// Messages waiting for their due time.
    #[serde(default)]
    pub pending_notifications: Vec<PendingNotification>,
    /// Usage counters.
    #[serde(default)]
    pub usage: UsageCounters,
    /// Today's statistics.
    #[serde(default)]
    pub daily: DailyStats,
    /// Statistics for previous days, oldest first.
    #[serde(default)]
    pub history: Vec<DailyStats>,
    /// Title of the last report made.
    #[serde(default)]
    pub last_report: String,
    /// Title of the last permission asked.
    #[serde(default)]
    pub last_permission: String,
    /// Text of the last question answer.
    #[serde(default)]
    pub last_answer: String,
    /// Answers stored by key (`Input` and `Question`).
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// Names of chosen question answers.
    #[serde(default)]
    pub chosen: BTreeSet<String>,
    /// Last reported outfit.
    #[serde(default)]
    pub outfit: Option<String>,
    /// Clothing the user must wear.
    #[serde(default)]
    pub required_clothing: Option<String>,
    /// Minutes the last completed job was late.
    #[serde(default)]
    pub last_late_minutes: i64,
    /// Minutes the last completed job was early.
    #[serde(default)]
    pub last_early_minutes: i64,
    /// Date the simulation started.
    pub started_on: NaiveDate,
    /// Whether the FirstRun hook is still pending.
    #[serde(default)]
    pub first_run: bool,
}

impl SimulationState {
    /// Fresh state for a new session.
    pub fn new(status: String, merits: i64, started_on: NaiveDate) -> Self {
        Self {
            status,
            status_history: Vec::new(),
            merits,
            flags: BTreeMap::new(),
            variables: VariableStore::default(),
            assignments: BTreeMap::new(),
            last_date: None,
            last_merit_grant: None,
            last_assignment_check: None,
            last_flag_check: None,
            active_timers: BTreeSet::new(),
            timers_triggered: BTreeSet::new(),
            job_history: BTreeMap::new(),
            permissions: BTreeMap::new(),
            pending_notifications: Vec::new(),
            usage: UsageCounters::default(),
            daily: DailyStats {
                date: Some(started_on),
                ..DailyStats::default()
            },
            history: Vec::new(),
            last_report: String::new(),
            last_permission: String::new(),
            last_answer: String::new(),
            answers: BTreeMap::new(),
            chosen: BTreeSet::new(),
            outfit: None,
            required_clothing: None,
            last_late_minutes: 0,
            last_early_minutes: 0,
            started_on,
            first_run: true,
        }
    }

    // --- Merits ---

    /// Add `delta` merits (negative subtracts), clamped to the script's
    /// bounds. Returns the change actually applied.
    pub fn add_merits(&mut self, delta: i64, general: &GeneralSettings) -> i64 {
        let target = self.merits.saturating_add(delta);
        self.set_merits(target, general)
    }

    /// Set merits to `value`, clamped to the script's bounds. Returns the
    /// change actually applied.
    pub fn set_merits(&mut self, value: i64, general: &GeneralSettings) -> i64 {
        let clamped = value.max(general.min_merits).min(general.max_merits);
        let applied = clamped.saturating_sub(self.merits);
        self.merits = clamped;
        if applied > 0 {
            self.daily.merits_gained = self.daily.merits_gained.saturating_add(applied);
        } else {
            self.daily.merits_lost = self.daily.merits_lost.saturating_sub(applied);
        }
        debug!(merits = self.merits, applied, "Merits changed");
        applied
    }

    // --- Flags ---

    /// Set (or replace) a flag. A `duration` of `None` never expires.
    pub fn set_flag(
        &mut self,
        name: &str,
        now: NaiveDateTime,
        duration: Option<i64>,
        text: String,
        groups: Vec<String>,
    ) {
        let key = name.trim().to_lowercase();
        let expiry_time = duration
            .and_then(TimeDelta::try_seconds)
            .and_then(|d| now.checked_add_signed(d));
        debug!(flag = %key, ?expiry_time, "Flag set");
        self.flags.insert(
            key.clone(),
            FlagData {
                name: key,
                set_time: now,
                expiry_time,
                text,
                groups,
            },
        );
    }

    /// Remove a flag. Returns the removed data, if it was stored.
    pub fn remove_flag(&mut self, name: &str) -> Option<FlagData> {
        let removed = self.flags.remove(&name.trim().to_lowercase());
        if removed.is_some() {
            debug!(flag = %name, "Flag removed");
        }
        removed
    }

    /// Whether a stored flag counts as set at `now`. Flags past their
    /// expiry count as unset even before the sweep removes them.
    pub fn is_flag_set(&self, name: &str, now: NaiveDateTime) -> bool {
        self.flags
            .get(&name.trim().to_lowercase())
            .is_some_and(|flag| flag.is_active(now))
    }

    /// Names of stored flags whose expiry has passed.
    pub fn expired_flags(&self, now: NaiveDateTime) -> Vec<String> {
        self.flags
            .values()
            .filter(|flag| !flag.is_active(now))
            .map(|flag| flag.name.clone())
            .collect()
    }

    // --- Assignments ---

    /// Insert an assignment instance.
    pub fn insert_assignment(&mut self, instance: String, assignment: Assignment) {
        self.assignments.insert(instance, assignment);
    }

    /// Remove an instance together with its `_started` flag.
    pub fn remove_assignment(&mut self, instance: &str) -> Option<Assignment> {
        let removed = self.assignments.remove(instance)?;
        self.flags.remove(&started_flag(instance));
        Some(removed)
    }

    /// The first free instance name: `base`, then `base_2`, `base_3`, ...
    pub fn next_instance_name(&self, base: &str) -> String {
        if !self.assignments.contains_key(base) {
            return base.to_owned();
        }
        let mut n: u32 = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if !self.assignments.contains_key(&candidate) {
                return candidate;
            }
            n = n.saturating_add(1);
        }
    }

    /// Instances created from `definition`, in name order.
    pub fn instances_of(&self, kind: AssignmentKind, definition: &str) -> Vec<String> {
        self.assignments
            .iter()
            .filter(|(_, a)| a.kind == kind && a.definition == definition)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of instances past their deadline at `now`.
    pub fn overdue_count(&self, now: NaiveDateTime) -> usize {
        self.assignments
            .values()
            .filter(|a| a.is_overdue(now))
            .count()
    }

    // --- Statistics ---

    /// Archive today's statistics and start a fresh record for `today`.
    pub fn roll_daily_stats(&mut self, today: NaiveDate) {
        if self.daily.date == Some(today) {
            return;
        }
        let finished = std::mem::replace(
            &mut self.daily,
            DailyStats {
                date: Some(today),
                ..DailyStats::default()
            },
        );
        if finished.date.is_some() {
            self.history.push(finished);
        }
        if self.history.len() > STATS_HISTORY_DAYS {
            let excess = self.history.len().saturating_sub(STATS_HISTORY_DAYS);
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        day(d).and_hms_opt(h, 0, 0).unwrap()
    }

    fn state() -> SimulationState {
        SimulationState::new("normal".to_owned(), 50, day(1))
    }

    fn assignment() -> Assignment {
        Assignment {
            kind: AssignmentKind::Job,
            definition: "dishes".to_owned(),
            title: "Dishes".to_owned(),
            assigned_at: at(1, 0),
            deadline: at(1, 20),
            expiry: None,
            remind_interval: RemindInterval::Never,
            next_reminder: None,
            late: false,
            late_refund: None,
            amount: 1,
            severity: 0,
            started_at: None,
        }
    }

    #[test]
    fn merits_are_clamped() {
        let general = GeneralSettings {
            min_merits: 0,
            max_merits: 100,
            ..GeneralSettings::default()
        };
        let mut s = state();
        assert_eq!(s.add_merits(80, &general), 50);
        assert_eq!(s.merits, 100);
        assert_eq!(s.add_merits(-500, &general), -100);
        assert_eq!(s.merits, 0);
        s.set_merits(i64::MAX, &general);
        assert_eq!(s.merits, 100);
        assert_eq!(s.daily.merits_gained, 150);
        assert_eq!(s.daily.merits_lost, 100);
    }

    #[test]
    fn flag_expiry_is_monotone() {
        let mut s = state();
        s.set_flag("Grounded", at(1, 8), Some(3_600), String::new(), Vec::new());
        assert!(s.is_flag_set("grounded", at(1, 8)));
        assert!(!s.is_flag_set("GROUNDED", at(1, 9)));
        assert!(!s.is_flag_set("grounded", at(2, 9)));
        assert_eq!(s.expired_flags(at(1, 10)), vec!["grounded"]);
        assert!(s.flags.contains_key("grounded"));
    }

    #[test]
    fn flag_without_duration_persists() {
        let mut s = state();
        s.set_flag("collar", at(1, 8), None, String::new(), Vec::new());
        assert!(s.is_flag_set("collar", at(28, 23)));
        assert!(s.remove_flag("Collar").is_some());
        assert!(!s.is_flag_set("collar", at(1, 8)));
    }

    #[test]
    fn removing_instance_drops_started_flag() {
        let mut s = state();
        s.insert_assignment("dishes".to_owned(), assignment());
        s.set_flag(&started_flag("dishes"), at(1, 9), None, String::new(), Vec::new());
        assert!(s.remove_assignment("dishes").is_some());
        assert!(s.assignments.is_empty());
        assert!(!s.flags.contains_key("dishes_started"));
        assert!(s.remove_assignment("dishes").is_none());
    }

    #[test]
    fn instance_names_are_suffixed() {
        let mut s = state();
        assert_eq!(s.next_instance_name("lines"), "lines");
        s.insert_assignment("lines".to_owned(), assignment());
        assert_eq!(s.next_instance_name("lines"), "lines_2");
        s.insert_assignment("lines_2".to_owned(), assignment());
        assert_eq!(s.next_instance_name("lines"), "lines_3");
    }

    #[test]
    fn overdue_counts_past_deadline() {
        let mut s = state();
        s.insert_assignment("dishes".to_owned(), assignment());
        assert_eq!(s.overdue_count(at(1, 20)), 0);
        assert_eq!(s.overdue_count(at(1, 21)), 1);
    }

    #[test]
    fn permission_grants_reset_daily() {
        let mut record = PermissionRecord::default();
        record.record_grant(at(1, 9));
        record.record_grant(at(1, 10));
        assert_eq!(record.grants_on(day(1)), 2);
        assert_eq!(record.grants_on(day(2)), 0);
        record.record_grant(at(2, 9));
        assert_eq!(record.grants_on(day(2)), 1);
        assert_eq!(record.grants, 3);
    }

    #[test]
    fn daily_stats_roll_into_history() {
        let mut s = state();
        s.daily.jobs_done.push("dishes".to_owned());
        s.roll_daily_stats(day(1));
        assert!(s.history.is_empty());
        s.roll_daily_stats(day(2));
        assert_eq!(s.history.len(), 1);
        assert_eq!(s.history[0].jobs_done, vec!["dishes"]);
        assert_eq!(s.daily.date, Some(day(2)));
    }
}
