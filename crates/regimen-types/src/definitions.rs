//! Immutable script definitions.
//!
//! A compiled script is a set of name-keyed definition maps plus the
//! general settings and event-handler hooks. The runtime never mutates a
//! definition; it is the engine's read-only program.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::actions::ScriptAction;
use crate::values::{SECS_PER_DAY, SECS_PER_HOUR, SECS_PER_MINUTE, parse_interval};

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// A time-of-day window. Windows whose `end` is before `start` wrap past
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: NaiveTime,
    /// Inclusive end.
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Create a window.
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `time` falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Declarative eligibility shared by most definition kinds.
///
/// Flag and choice lists are OR-of-AND groups: the outer list is an OR
/// across groups, each inner list an AND of names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Eligibility {
    /// Statuses the definition may be used from. Empty means any.
    pub pre_status: Vec<String>,
    /// At least one group must be fully set. Empty means no requirement.
    pub if_flags: Vec<Vec<String>>,
    /// No group may be fully set.
    pub not_if_flags: Vec<Vec<String>>,
    /// At least one group of chosen answers must be fully chosen.
    pub if_chosen: Vec<Vec<String>>,
    /// The time must fall inside one of these windows. Empty means any.
    pub allowed_windows: Vec<TimeWindow>,
    /// The time must fall outside all of these windows.
    pub forbidden_windows: Vec<TimeWindow>,
}

impl Eligibility {
    /// Whether the time-of-day constraints hold at `time`.
    pub fn time_allows(&self, time: NaiveTime) -> bool {
        let allowed =
            self.allowed_windows.is_empty() || self.allowed_windows.iter().any(|w| w.contains(time));
        allowed && !self.forbidden_windows.iter().any(|w| w.contains(time))
    }

    /// Whether `status` satisfies the pre-status list.
    pub fn status_allows(&self, status: &str) -> bool {
        self.pre_status.is_empty()
            || self
                .pre_status
                .iter()
                .any(|s| s.eq_ignore_ascii_case(status))
    }
}

// ---------------------------------------------------------------------------
// Shared policy types
// ---------------------------------------------------------------------------

/// Per-unit scale of a punishment's `value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueUnit {
    /// A count of occurrences, with no duration.
    #[default]
    Once,
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Days.
    Day,
}

impl ValueUnit {
    /// Length of one unit in seconds; `None` for [`ValueUnit::Once`].
    pub const fn seconds(self) -> Option<i64> {
        match self {
            Self::Once => None,
            Self::Minute => Some(SECS_PER_MINUTE),
            Self::Hour => Some(SECS_PER_HOUR),
            Self::Day => Some(SECS_PER_DAY),
        }
    }
}

/// How a procedure treats its direct `ProcedureCall` children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectMode {
    /// Run every call.
    #[default]
    All,
    /// Run calls until one succeeds.
    First,
    /// Run one uniformly chosen call.
    Random,
}

/// Reminder cadence for an overdue assignment.
///
/// Reads as `Never`, `{ Every: 3600 }`, a bare number of seconds or an
/// interval literal such as `'01:30'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RemindIntervalRepr")]
pub enum RemindInterval {
    /// Remind once when first overdue, then never again.
    Never,
    /// Remind every given number of seconds.
    Every(i64),
}

/// Accepted spellings of a [`RemindInterval`].
#[derive(Deserialize)]
#[serde(untagged)]
enum RemindIntervalRepr {
    Seconds(i64),
    Word(String),
    Every {
        #[serde(rename = "Every")]
        every: i64,
    },
}

impl TryFrom<RemindIntervalRepr> for RemindInterval {
    type Error = String;

    fn try_from(repr: RemindIntervalRepr) -> Result<Self, Self::Error> {
        match repr {
            RemindIntervalRepr::Seconds(secs) | RemindIntervalRepr::Every { every: secs } => {
                Ok(Self::Every(secs))
            }
            RemindIntervalRepr::Word(word) if word.trim().eq_ignore_ascii_case("never") => {
                Ok(Self::Never)
            }
            RemindIntervalRepr::Word(word) => parse_interval(&word)
                .map(Self::Every)
                .ok_or_else(|| format!("{word:?} is not a remind interval")),
        }
    }
}

/// An inclusive severity range. `0..=0` means "no penalty".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRange {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: u32,
}

impl SeverityRange {
    /// Create a range.
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Whether the range can never produce a penalty.
    pub const fn is_none(self) -> bool {
        self.max == 0
    }
}

/// Reminder settings. Unset fields fall back to the general settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindPolicy {
    /// Reminder cadence.
    pub interval: Option<RemindInterval>,
    /// Punishment severity applied at each reminder.
    pub penalty: Option<SeverityRange>,
    /// Procedure run at each reminder.
    pub procedure: Option<String>,
}

/// Hard-expiry settings. Unset fields fall back to the general settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirePolicy {
    /// Seconds after the deadline at which the instance expires.
    pub after: Option<i64>,
    /// Punishment severity applied on expiry.
    pub penalty: Option<SeverityRange>,
    /// Procedure run on expiry.
    pub procedure: Option<String>,
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A status the user can be in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusDefinition {
    /// Display title.
    pub title: String,
    /// Whether entering this status pushes the previous one for return.
    pub sub_status: bool,
    /// Permissions available while active. Empty means all.
    pub permissions: Vec<String>,
    /// Confessions available while active. Empty means all.
    pub confessions: Vec<String>,
    /// Reports available while active. Empty means all.
    pub reports: Vec<String>,
    /// Whether the rules menu is available.
    pub rules_enabled: bool,
    /// Whether the assignments menu is available.
    pub assignments_enabled: bool,
    /// Entry constraints.
    pub eligibility: Eligibility,
    /// Actions run on entry.
    pub actions: Vec<ScriptAction>,
}

/// When a job recurs.
///
/// Reads as `Manual`, `Daily`, `{ Weekdays: [Sat] }` or
/// `{ Interval: { every_days: 3 } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobRecurrenceRepr")]
pub enum JobRecurrence {
    /// Only assigned explicitly.
    #[default]
    Manual,
    /// Every day.
    Daily,
    /// On the listed weekdays.
    Weekdays(Vec<Weekday>),
    /// Every `every_days` since last completion; the first time after
    /// `first_days` since the simulation started (immediately if unset).
    Interval {
        /// Days between completions.
        every_days: u32,
        /// Days before the first assignment.
        #[serde(default)]
        first_days: Option<u32>,
    },
}

/// Accepted spellings of a [`JobRecurrence`].
#[derive(Deserialize)]
#[serde(untagged)]
enum JobRecurrenceRepr {
    Word(String),
    Weekdays {
        #[serde(rename = "Weekdays")]
        days: Vec<Weekday>,
    },
    Interval {
        #[serde(rename = "Interval")]
        rule: IntervalRule,
    },
}

#[derive(Deserialize)]
struct IntervalRule {
    every_days: u32,
    #[serde(default)]
    first_days: Option<u32>,
}

impl TryFrom<JobRecurrenceRepr> for JobRecurrence {
    type Error = String;

    fn try_from(repr: JobRecurrenceRepr) -> Result<Self, Self::Error> {
        match repr {
            JobRecurrenceRepr::Word(word) => match word.trim().to_lowercase().as_str() {
                "manual" => Ok(Self::Manual),
                "daily" => Ok(Self::Daily),
                _ => Err(format!("{word:?} is not a job recurrence")),
            },
            JobRecurrenceRepr::Weekdays { days } => Ok(Self::Weekdays(days)),
            JobRecurrenceRepr::Interval { rule } => Ok(Self::Interval {
                every_days: rule.every_days,
                first_days: rule.first_days,
            }),
        }
    }
}

/// A job: a recurring or one-off duty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDefinition {
    /// Display title.
    pub title: String,
    /// Recurrence rule for auto-assignment.
    pub run: JobRecurrence,
    /// Deadline time of day.
    pub end_time: Option<NaiveTime>,
    /// Deadline offset in seconds from assignment, when no `end_time`.
    pub respite: Option<i64>,
    /// Reminder settings.
    pub remind: RemindPolicy,
    /// Expiry settings.
    pub expire: ExpirePolicy,
    /// Merits granted when done.
    pub merits: i64,
    /// Merits subtracted when first overdue.
    pub late_merits: i64,
    /// Whether late merits are refunded when done late.
    pub refund_late_merits: bool,
    /// Whether a started instance may be interrupted by menu actions.
    pub interruptable: bool,
    /// Whether the job must be started before being done.
    pub long_running: bool,
    /// Procedure run when done.
    pub done_procedure: Option<String>,
    /// Procedure run when aborted.
    pub abort_procedure: Option<String>,
    /// Procedure run when started.
    pub start_procedure: Option<String>,
    /// Assignment constraints.
    pub eligibility: Eligibility,
    /// Actions run when assigned.
    pub actions: Vec<ScriptAction>,
}

/// A punishment: a severity-sized assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PunishmentDefinition {
    /// Display title.
    pub title: String,
    /// Severity covered by one unit. `None` with [`ValueUnit::Once`]
    /// means exactly `min` occurrences.
    pub value: Option<u32>,
    /// Scale of one unit.
    pub value_unit: ValueUnit,
    /// Minimum units per application.
    pub min: u32,
    /// Maximum units per instance. `None` means unbounded.
    pub max: Option<u32>,
    /// Lowest severity this definition covers.
    pub severity_min: u32,
    /// Highest severity this definition covers.
    pub severity_max: u32,
    /// Lower bound of the random selection weight.
    pub weight_min: u32,
    /// Upper bound of the random selection weight.
    pub weight_max: u32,
    /// Whether new applications merge into an existing instance.
    pub accumulative: bool,
    /// Whether only group-filtered selection may pick this.
    pub group_only: bool,
    /// Groups this definition belongs to.
    pub groups: Vec<String>,
    /// Whether a started instance may be interrupted by menu actions.
    pub interruptable: bool,
    /// Whether the punishment must be started before being done.
    pub long_running: bool,
    /// Line to write once per unit when started.
    pub lines: Option<String>,
    /// Deadline offset in seconds, overriding the unit-derived deadline.
    pub respite: Option<i64>,
    /// Reminder settings.
    pub remind: RemindPolicy,
    /// Expiry settings.
    pub expire: ExpirePolicy,
    /// Merits granted when done.
    pub merits: i64,
    /// Procedure run when done.
    pub done_procedure: Option<String>,
    /// Procedure run when aborted.
    pub abort_procedure: Option<String>,
    /// Procedure run when started.
    pub start_procedure: Option<String>,
    /// Selection constraints.
    pub eligibility: Eligibility,
    /// Actions run when given.
    pub actions: Vec<ScriptAction>,
}

impl Default for PunishmentDefinition {
    fn default() -> Self {
        Self {
            title: String::new(),
            value: None,
            value_unit: ValueUnit::Once,
            min: 1,
            max: None,
            severity_min: 0,
            severity_max: u32::MAX,
            weight_min: 1,
            weight_max: 1,
            accumulative: false,
            group_only: false,
            groups: Vec::new(),
            interruptable: true,
            long_running: false,
            lines: None,
            respite: None,
            remind: RemindPolicy::default(),
            expire: ExpirePolicy::default(),
            merits: 0,
            done_procedure: None,
            abort_procedure: None,
            start_procedure: None,
            eligibility: Eligibility::default(),
            actions: Vec::new(),
        }
    }
}

impl PunishmentDefinition {
    /// Whether the definition covers `severity`.
    pub const fn covers(&self, severity: u32) -> bool {
        self.severity_min <= severity && severity <= self.severity_max
    }

    /// Whether the definition belongs to `group` (case-insensitive).
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
    }
}

/// A permission the user may ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionDefinition {
    /// Display title.
    pub title: String,
    /// Percent chance of being granted (0--100).
    pub chance: u32,
    /// Maximum grants per day. `None` means unlimited.
    pub max_per_day: Option<u32>,
    /// Seconds after a grant during which asking is locked out.
    pub delay: Option<i64>,
    /// Minimum merits required to be granted.
    pub min_merits: Option<i64>,
    /// Whether to notify when a lockout ends.
    pub notify: bool,
    /// Actions run when granted.
    pub granted: Vec<ScriptAction>,
    /// Actions run when denied.
    pub denied: Vec<ScriptAction>,
    /// Asking constraints.
    pub eligibility: Eligibility,
}

impl Default for PermissionDefinition {
    fn default() -> Self {
        Self {
            title: String::new(),
            chance: 100,
            max_per_day: None,
            delay: None,
            min_merits: None,
            notify: false,
            granted: Vec::new(),
            denied: Vec::new(),
            eligibility: Eligibility::default(),
        }
    }
}

/// A confession or report: a user-initiated action list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryDefinition {
    /// Display title.
    pub title: String,
    /// Usage constraints.
    pub eligibility: Eligibility,
    /// Actions run when used.
    pub actions: Vec<ScriptAction>,
}

/// A reusable action list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcedureDefinition {
    /// How direct `ProcedureCall` children are selected.
    pub select: SelectMode,
    /// Call constraints.
    pub eligibility: Eligibility,
    /// The action list.
    pub actions: Vec<ScriptAction>,
}

/// A timer firing at most once per day inside a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDefinition {
    /// Window start.
    pub start: NaiveTime,
    /// Window end.
    pub end: NaiveTime,
    /// Whether the timer is registered at simulation start.
    #[serde(default)]
    pub autostart: bool,
    /// Firing constraints.
    #[serde(default)]
    pub eligibility: Eligibility,
    /// Actions run when fired.
    #[serde(default)]
    pub actions: Vec<ScriptAction>,
}

impl TimerDefinition {
    /// The trigger window.
    pub const fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

/// Defaults applied when a flag is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagDefinition {
    /// Display text.
    pub text: String,
    /// Groups the flag belongs to.
    pub groups: Vec<String>,
    /// Default lifetime in seconds.
    pub duration: Option<i64>,
    /// Template text when set.
    pub on_text: Option<String>,
    /// Template text when unset.
    pub off_text: Option<String>,
    /// Procedure run when the flag expires.
    pub expire_procedure: Option<String>,
}

/// A named set of instruction lines, possibly including other sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionDefinition {
    /// Display title.
    pub title: String,
    /// Lines shown, in order.
    pub lines: Vec<String>,
    /// Other instruction sets expanded after these lines.
    pub includes: Vec<String>,
}

/// One selectable answer to a question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionAnswer {
    /// Name recorded in the chosen set.
    pub name: String,
    /// Text shown and stored as the answer.
    pub text: String,
    /// Actions run when chosen.
    pub actions: Vec<ScriptAction>,
}

/// A multiple-choice question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionDefinition {
    /// Prompt text.
    pub text: String,
    /// Answers, in display order.
    pub answers: Vec<QuestionAnswer>,
    /// Procedure run when the prompt is cancelled.
    pub no_input_procedure: Option<String>,
    /// Asking constraints.
    pub eligibility: Eligibility,
}

// ---------------------------------------------------------------------------
// General settings and hooks
// ---------------------------------------------------------------------------

/// Script-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Merit floor.
    pub min_merits: i64,
    /// Merit ceiling.
    pub max_merits: i64,
    /// Merits on first run.
    pub start_merits: i64,
    /// Below this, `zzLowMerits` counts as set.
    pub low_merits: Option<i64>,
    /// Above this, `zzHighMerits` counts as set.
    pub high_merits: Option<i64>,
    /// Lowest punishment severity.
    pub punishment_min: u32,
    /// Highest punishment severity.
    pub punishment_max: u32,
    /// Lower bound when the user asks for a punishment.
    pub punishment_ask_min: u32,
    /// Upper bound when the user asks for a punishment.
    pub punishment_ask_max: u32,
    /// Declines allowed before acceptance is forced.
    pub max_decline: u32,
    /// Status used when the history stack is empty.
    pub default_status: String,
    /// Statuses in which started non-interruptable work is left running.
    pub interrupt_statuses: Vec<String>,
    /// Merits granted once per day.
    pub daily_merits: i64,
    /// Default reminder cadence.
    pub remind_interval: RemindInterval,
    /// Default reminder penalty.
    pub remind_penalty: SeverityRange,
    /// Default expiry offset after the deadline.
    pub expire_after: Option<i64>,
    /// Default expiry penalty.
    pub expire_penalty: SeverityRange,
    /// Deadline offset for punishments without a duration.
    pub default_respite: i64,
    /// The user's name.
    pub sub_name: String,
    /// The supervisor's name.
    pub master_name: String,
    /// Text for `{Flag}` when set.
    pub flag_on_text: String,
    /// Text for `{Flag}` when unset.
    pub flag_off_text: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            min_merits: 0,
            max_merits: 1_000,
            start_merits: 500,
            low_merits: None,
            high_merits: None,
            punishment_min: 1,
            punishment_max: 1_000,
            punishment_ask_min: 25,
            punishment_ask_max: 75,
            max_decline: 0,
            default_status: String::new(),
            interrupt_statuses: Vec::new(),
            daily_merits: 0,
            remind_interval: RemindInterval::Every(SECS_PER_HOUR),
            remind_penalty: SeverityRange::default(),
            expire_after: None,
            expire_penalty: SeverityRange::default(),
            default_respite: SECS_PER_DAY,
            sub_name: String::new(),
            master_name: String::new(),
            flag_on_text: "on".to_owned(),
            flag_off_text: "off".to_owned(),
        }
    }
}

/// Named hooks a script may attach a procedure to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventHandler {
    /// The program started.
    OpenProgram,
    /// The program is closing.
    CloseProgram,
    /// The simulated date changed.
    NewDay,
    /// First start of a new session.
    FirstRun,
    /// Before any status change.
    BeforeStatusChange,
    /// After any status change.
    AfterStatusChange,
    /// A permission was granted.
    PermissionGiven,
    /// A permission was denied.
    PermissionDenied,
    /// A job was assigned.
    JobAnnounced,
    /// A job was done.
    JobDone,
    /// A punishment was given.
    PunishmentGiven,
    /// A punishment was done.
    PunishmentDone,
    /// The user reported their outfit.
    AfterClothReport,
    /// The user signed in.
    SignIn,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_contains_inclusive_bounds() {
        let w = TimeWindow::new(t(8, 0), t(10, 0));
        assert!(w.contains(t(8, 0)));
        assert!(w.contains(t(10, 0)));
        assert!(!w.contains(t(10, 1)));
    }

    #[test]
    fn window_wraps_midnight() {
        let w = TimeWindow::new(t(22, 0), t(2, 0));
        assert!(w.contains(t(23, 30)));
        assert!(w.contains(t(1, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn forbidden_window_overrides_allowed() {
        let e = Eligibility {
            allowed_windows: vec![TimeWindow::new(t(6, 0), t(22, 0))],
            forbidden_windows: vec![TimeWindow::new(t(12, 0), t(13, 0))],
            ..Eligibility::default()
        };
        assert!(e.time_allows(t(9, 0)));
        assert!(!e.time_allows(t(12, 30)));
        assert!(!e.time_allows(t(23, 0)));
    }

    #[test]
    fn pre_status_is_case_insensitive() {
        let e = Eligibility {
            pre_status: vec!["Normal".to_owned()],
            ..Eligibility::default()
        };
        assert!(e.status_allows("normal"));
        assert!(!e.status_allows("grounded"));
        assert!(Eligibility::default().status_allows("anything"));
    }

    #[test]
    fn value_unit_seconds() {
        assert_eq!(ValueUnit::Once.seconds(), None);
        assert_eq!(ValueUnit::Minute.seconds(), Some(60));
        assert_eq!(ValueUnit::Day.seconds(), Some(86_400));
    }

    #[test]
    fn remind_interval_spellings() {
        let read = |yaml: &str| serde_yml::from_str::<RemindInterval>(yaml).unwrap();
        assert_eq!(read("Never"), RemindInterval::Never);
        assert_eq!(read("Every: 1800"), RemindInterval::Every(1_800));
        assert_eq!(read("900"), RemindInterval::Every(900));
        assert_eq!(read("'01:30'"), RemindInterval::Every(5_400));
        assert!(serde_yml::from_str::<RemindInterval>("Sometimes").is_err());
    }

    #[test]
    fn job_recurrence_spellings() {
        let read = |yaml: &str| serde_yml::from_str::<JobRecurrence>(yaml).unwrap();
        assert_eq!(read("Daily"), JobRecurrence::Daily);
        assert_eq!(read("manual"), JobRecurrence::Manual);
        assert_eq!(
            read("Weekdays: [Mon, Sat]"),
            JobRecurrence::Weekdays(vec![Weekday::Mon, Weekday::Sat])
        );
        assert_eq!(
            read("Interval:\n  every_days: 3\n  first_days: 1\n"),
            JobRecurrence::Interval {
                every_days: 3,
                first_days: Some(1)
            }
        );
        assert!(serde_yml::from_str::<JobRecurrence>("Hourly").is_err());
    }

    #[test]
    fn tagged_enums_survive_json() {
        let every = serde_json::to_string(&RemindInterval::Every(60)).unwrap();
        assert_eq!(serde_json::from_str::<RemindInterval>(&every).unwrap(), RemindInterval::Every(60));
        let rule = JobRecurrence::Interval {
            every_days: 2,
            first_days: None,
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(serde_json::from_str::<JobRecurrence>(&json).unwrap(), rule);
    }

    #[test]
    fn punishment_covers_and_groups() {
        let p = PunishmentDefinition {
            severity_min: 5,
            severity_max: 10,
            groups: vec!["Chores".to_owned()],
            ..PunishmentDefinition::default()
        };
        assert!(p.covers(5));
        assert!(!p.covers(11));
        assert!(p.in_group("chores"));
    }
}
