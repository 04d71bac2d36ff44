//! Scheduler: the time-driven side of the simulation.
//!
//! Each tick advances the simulated clock and runs these phases:
//!
//! 1. **Day rollover** -- when the date changed: reset triggered timers,
//!    roll daily statistics, grant daily merits, run NewDay, auto-assign
//!    due recurring jobs.
//!
//! 2. **Timers** -- fire registered timers whose window contains the
//!    current time, at most once per day.
//!
//! 3. **Notifications** -- show pending notifications that are due.
//!
//! 4. **Assignments** -- every `assignment_check_secs`: expire instances
//!    past their expiry, mark instances late on first deadline crossing,
//!    and send due reminders.
//!
//! 5. **Flags** -- every `flag_check_secs`: run expire procedures and
//!    remove expired flags.
//!
//! A jump that skips several days runs the rollover once.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rand::Rng;
use regimen_types::{JobDefinition, JobRecurrence, RemindInterval, SelectMode, SeverityRange};
use tracing::{debug, info, warn};

use crate::assignment::offset;
use crate::clock::ClockError;
use crate::interpreter::CallContext;
use crate::presentation::Presentation;
use crate::simulation::Simulation;
use crate::state::{Assignment, AssignmentKind};

/// Errors that can occur while ticking.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The clock could not be advanced.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Simulated time after the tick.
    pub now: Option<NaiveDateTime>,
    /// Whether the date changed.
    pub new_day: bool,
    /// Jobs auto-assigned on rollover.
    pub jobs_assigned: Vec<String>,
    /// Timers fired.
    pub timers_fired: Vec<String>,
    /// Notifications delivered.
    pub notifications: usize,
    /// Instances that became late.
    pub late: Vec<String>,
    /// Instances reminded.
    pub reminded: Vec<String>,
    /// Instances expired and removed.
    pub expired: Vec<String>,
    /// Flags removed by the sweep.
    pub flags_expired: Vec<String>,
}

/// Policies that govern an instance's lateness, resolved against the
/// script defaults.
struct Policies {
    late_merits: i64,
    refund_late_merits: bool,
    remind_penalty: SeverityRange,
    remind_procedure: Option<String>,
    expire_penalty: SeverityRange,
    expire_procedure: Option<String>,
}

/// Whether `interval` seconds have passed since `last`.
fn due(last: Option<NaiveDateTime>, now: NaiveDateTime, interval: i64) -> bool {
    last.is_none_or(|last| now.signed_duration_since(last).num_seconds() >= interval)
}

/// Whether the recurrence rule puts `job` on `today`.
fn recurs_on(
    job: &JobDefinition,
    today: NaiveDate,
    started_on: NaiveDate,
    last_done: Option<NaiveDate>,
) -> bool {
    match &job.run {
        JobRecurrence::Manual => false,
        JobRecurrence::Daily => true,
        JobRecurrence::Weekdays(days) => days.contains(&today.weekday()),
        JobRecurrence::Interval {
            every_days,
            first_days,
        } => match last_done {
            Some(done) => today.signed_duration_since(done).num_days() >= i64::from(*every_days),
            None => {
                today.signed_duration_since(started_on).num_days()
                    >= i64::from(first_days.unwrap_or(0))
            }
        },
    }
}

impl Simulation {
    /// Advance the clock by `seconds` and run the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Clock`] for a negative or overflowing offset.
    pub fn tick(
        &mut self,
        ui: &mut dyn Presentation,
        seconds: i64,
    ) -> Result<TickSummary, TickError> {
        self.clock.advance(seconds)?;
        Ok(self.run_scheduler(ui))
    }

    /// Jump ahead by a composite offset and run the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Clock`] for a negative or overflowing offset.
    pub fn fast_forward(
        &mut self,
        ui: &mut dyn Presentation,
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
    ) -> Result<TickSummary, TickError> {
        let total = self.clock.fast_forward(days, hours, minutes, seconds)?;
        info!(seconds = total, now = %self.now(), "Fast forward");
        Ok(self.run_scheduler(ui))
    }

    /// Run every scheduler phase at the current time.
    pub fn run_scheduler(&mut self, ui: &mut dyn Presentation) -> TickSummary {
        let now = self.now();
        let mut summary = TickSummary {
            now: Some(now),
            ..TickSummary::default()
        };

        let today = now.date();
        if self.state.last_date != Some(today) {
            self.start_day(ui, today, &mut summary);
        }
        self.fire_timers(ui, &mut summary);
        self.deliver_notifications(ui, &mut summary);

        if due(
            self.state.last_assignment_check,
            now,
            self.settings.assignment_check_secs,
        ) {
            self.state.last_assignment_check = Some(now);
            self.check_assignments(ui, &mut summary);
        }
        if due(self.state.last_flag_check, now, self.settings.flag_check_secs) {
            self.state.last_flag_check = Some(now);
            self.sweep_flags(ui, &mut summary);
        }
        summary
    }

    // --- Phase 1: day rollover ---

    fn start_day(
        &mut self,
        ui: &mut dyn Presentation,
        today: NaiveDate,
        summary: &mut TickSummary,
    ) {
        info!(date = %today, previous = ?self.state.last_date, "New day");
        summary.new_day = true;
        self.state.timers_triggered.clear();
        self.state.roll_daily_stats(today);

        let script = Arc::clone(&self.script);
        let daily = script.general.daily_merits;
        if daily != 0 && self.state.last_merit_grant != Some(today) {
            self.state.add_merits(daily, &script.general);
            self.state.last_merit_grant = Some(today);
            debug!(merits = daily, "Daily merits granted");
        }

        self.state.last_date = Some(today);
        self.run_hook(ui, regimen_types::EventHandler::NewDay);

        let candidates: Vec<String> = script
            .jobs
            .iter()
            .filter(|(name, job)| self.job_due(name, job, today))
            .map(|(name, _)| name.clone())
            .collect();
        for name in candidates {
            match self.assign_job(ui, &name, true) {
                Ok(instance) => summary.jobs_assigned.push(instance),
                Err(err) => debug!(job = %name, %err, "Recurring job skipped"),
            }
        }
    }

    fn job_due(&self, name: &str, job: &JobDefinition, today: NaiveDate) -> bool {
        if self.state.assignments.contains_key(name) {
            return false;
        }
        let history = self.state.job_history.get(name);
        if history.and_then(|h| h.last_assigned) == Some(today) {
            return false;
        }
        recurs_on(
            job,
            today,
            self.state.started_on,
            history.and_then(|h| h.last_done),
        )
    }

    // --- Phase 2: timers ---

    fn fire_timers(&mut self, ui: &mut dyn Presentation, summary: &mut TickSummary) {
        let script = Arc::clone(&self.script);
        let time = self.clock.time();
        let waiting: Vec<String> = self
            .state
            .active_timers
            .difference(&self.state.timers_triggered)
            .cloned()
            .collect();
        for name in waiting {
            let Some(timer) = script.timer(&name) else {
                warn!(timer = %name, "Registered timer has no definition");
                continue;
            };
            if !timer.window().contains(time) || self.check_eligibility(&timer.eligibility).is_err() {
                continue;
            }
            self.state.timers_triggered.insert(name.clone());
            info!(timer = %name, %time, "Timer fired");
            self.run_actions(ui, &timer.actions, SelectMode::All, &mut CallContext::new());
            summary.timers_fired.push(name);
        }
    }

    // --- Phase 3: notifications ---

    fn deliver_notifications(&mut self, ui: &mut dyn Presentation, summary: &mut TickSummary) {
        let now = self.now();
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state.pending_notifications)
            .into_iter()
            .partition(|n| n.due <= now);
        self.state.pending_notifications = waiting;
        for notification in ready {
            debug!(due = %notification.due, "Notification delivered");
            ui.show_message(&notification.message);
            summary.notifications = summary.notifications.saturating_add(1);
        }
    }

    // --- Phase 4: assignments ---

    fn policies(&self, assignment: &Assignment) -> Policies {
        let general = &self.script.general;
        let (late_merits, refund, remind, expire) = match assignment.kind {
            AssignmentKind::Job => match self.script.job(&assignment.definition) {
                Some(job) => (
                    job.late_merits,
                    job.refund_late_merits,
                    Some(&job.remind),
                    Some(&job.expire),
                ),
                None => (0, false, None, None),
            },
            AssignmentKind::Punishment => match self.script.punishment(&assignment.definition) {
                Some(p) => (0, false, Some(&p.remind), Some(&p.expire)),
                None => (0, false, None, None),
            },
        };
        Policies {
            late_merits,
            refund_late_merits: refund,
            remind_penalty: remind
                .and_then(|r| r.penalty)
                .unwrap_or(general.remind_penalty),
            remind_procedure: remind.and_then(|r| r.procedure.clone()),
            expire_penalty: expire
                .and_then(|e| e.penalty)
                .unwrap_or(general.expire_penalty),
            expire_procedure: expire.and_then(|e| e.procedure.clone()),
        }
    }

    fn check_assignments(&mut self, ui: &mut dyn Presentation, summary: &mut TickSummary) {
        let now = self.now();
        let instances: Vec<String> = self.state.assignments.keys().cloned().collect();
        for instance in instances {
            // Earlier procedures in this pass may have removed it.
            let Some(assignment) = self.state.assignments.get(&instance).cloned() else {
                continue;
            };
            let policies = self.policies(&assignment);

            if assignment.expiry.is_some_and(|expiry| now >= expiry) {
                self.expire(ui, &instance, &assignment, &policies);
                summary.expired.push(instance);
                continue;
            }

            if !assignment.late && now > assignment.deadline {
                self.mark_late(&instance, &assignment, &policies, now);
                summary.late.push(instance.clone());
            }

            let reminder_due = self
                .state
                .assignments
                .get(&instance)
                .is_some_and(|a| a.late && a.next_reminder.is_some_and(|at| now >= at));
            if reminder_due {
                self.remind(ui, &instance, &assignment, &policies);
                summary.reminded.push(instance);
            }
        }
    }

    fn mark_late(
        &mut self,
        instance: &str,
        assignment: &Assignment,
        policies: &Policies,
        now: NaiveDateTime,
    ) {
        let script = Arc::clone(&self.script);
        if policies.late_merits != 0 {
            self.state
                .add_merits(policies.late_merits.saturating_neg(), &script.general);
        }
        let assignment_check = self.settings.assignment_check_secs.max(1);
        if let Some(entry) = self.state.assignments.get_mut(instance) {
            entry.late = true;
            // `Never` still gets the one reminder, at the next deadline check.
            entry.next_reminder = match entry.remind_interval {
                RemindInterval::Never => offset(now, Some(assignment_check)),
                RemindInterval::Every(secs) => offset(now, Some(secs.max(1))),
            };
            if policies.refund_late_merits && policies.late_merits != 0 {
                entry.late_refund = Some(policies.late_merits);
            }
        }
        if assignment.kind == AssignmentKind::Job {
            self.state.daily.jobs_late.push(assignment.definition.clone());
        }
        info!(
            instance = %instance,
            deadline = %assignment.deadline,
            late_merits = policies.late_merits,
            "Assignment late"
        );
    }

    fn remind(
        &mut self,
        ui: &mut dyn Presentation,
        instance: &str,
        assignment: &Assignment,
        policies: &Policies,
    ) {
        let now = self.now();
        info!(instance = %instance, "Reminder");
        ui.show_message(&format!("{} is overdue.", assignment.title));

        let mut ctx = CallContext::with_subject(assignment.subject(instance));
        self.run_optional_procedure(ui, policies.remind_procedure.as_deref(), &mut ctx);
        if let Some(severity) = self.roll_penalty(policies.remind_penalty) {
            if let Err(err) = self.apply_punishment(ui, severity, None, None) {
                warn!(instance = %instance, %err, "Reminder penalty not applied");
            }
        }

        if let Some(entry) = self.state.assignments.get_mut(instance) {
            entry.next_reminder = match entry.remind_interval {
                RemindInterval::Never => None,
                RemindInterval::Every(secs) => offset(now, Some(secs.max(1))),
            };
        }
    }

    fn expire(
        &mut self,
        ui: &mut dyn Presentation,
        instance: &str,
        assignment: &Assignment,
        policies: &Policies,
    ) {
        info!(instance = %instance, expiry = ?assignment.expiry, "Assignment expired");
        ui.show_message(&format!("{} has expired.", assignment.title));
        if let Some(severity) = self.roll_penalty(policies.expire_penalty) {
            if let Err(err) = self.apply_punishment(ui, severity, None, None) {
                warn!(instance = %instance, %err, "Expiry penalty not applied");
            }
        }
        let mut ctx = CallContext::with_subject(assignment.subject(instance));
        self.run_optional_procedure(ui, policies.expire_procedure.as_deref(), &mut ctx);
        self.state.remove_assignment(instance);
    }

    /// Roll a severity in `range`; zero means no penalty.
    fn roll_penalty(&mut self, range: SeverityRange) -> Option<u32> {
        if range.is_none() {
            return None;
        }
        let severity = self
            .rng
            .random_range(range.min.min(range.max)..=range.max);
        (severity > 0).then_some(severity)
    }

    // --- Phase 5: flags ---

    fn sweep_flags(&mut self, ui: &mut dyn Presentation, summary: &mut TickSummary) {
        let now = self.now();
        let script = Arc::clone(&self.script);
        for name in self.state.expired_flags(now) {
            let procedure = script
                .flag(&name)
                .and_then(|f| f.expire_procedure.as_deref());
            self.run_optional_procedure(ui, procedure, &mut CallContext::new());
            // The expire procedure may have renewed it.
            if self.state.is_flag_set(&name, now) {
                continue;
            }
            self.state.remove_flag(&name);
            info!(flag = %name, "Flag expired");
            summary.flags_expired.push(name);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Weekday};
    use regimen_types::Script;

    use super::*;
    use crate::config::EngineSettings;
    use crate::presentation::ScriptedPresentation;

    const SCRIPT: &str = r"
general:
  daily_merits: 10
statuses:
  Home: {}
jobs:
  Dishes:
    run: Daily
    end_time: '20:00:00'
    late_merits: 20
    refund_late_merits: true
    remind:
      interval:
        Every: 1800
  Plants:
    run:
      Interval:
        every_days: 3
  Bins:
    run:
      Weekdays: [Mon]
timers:
  Bedtime:
    start: '22:00:00'
    end: '23:00:00'
    autostart: true
    actions:
      - kind: AddCounter
        value: '#bedtimes,1'
flags:
  Grounded:
    duration: 3600
    expire_procedure: Released
procedures:
  Released:
    actions:
      - kind: SetFlag
        value: released
event_handlers:
  NewDay: Morning
";

    fn start() -> NaiveDateTime {
        // A Friday.
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn simulation() -> Simulation {
        let settings = EngineSettings {
            seed: Some(3),
            ..EngineSettings::default()
        };
        Simulation::new(Arc::new(Script::from_yaml(SCRIPT).unwrap()), settings, start())
    }

    #[test]
    fn recurrence_rules() {
        let script = Script::from_yaml(SCRIPT).unwrap();
        let friday = start().date();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(monday.weekday(), Weekday::Mon);
        let plants = script.job("plants").unwrap();
        assert!(recurs_on(plants, friday, friday, None));
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert!(!recurs_on(plants, monday, friday, Some(saturday)));
        assert!(recurs_on(plants, monday, friday, Some(friday)));
        let bins = script.job("bins").unwrap();
        assert!(!recurs_on(bins, friday, friday, None));
        assert!(recurs_on(bins, monday, friday, None));
    }

    #[test]
    fn rollover_assigns_jobs_and_grants_merits_once() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        let summary = sim.tick(&mut ui, 1).unwrap();
        assert!(summary.new_day);
        assert_eq!(summary.jobs_assigned, ["dishes", "plants"]);
        assert_eq!(sim.state.merits, 510);

        let summary = sim.tick(&mut ui, 60).unwrap();
        assert!(!summary.new_day);
        assert!(summary.jobs_assigned.is_empty());
        assert_eq!(sim.state.merits, 510);
    }

    #[test]
    fn late_job_loses_merits_and_gets_reminded() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.tick(&mut ui, 1).unwrap();
        sim.fast_forward(&mut ui, 0, 19, 59, 0).unwrap();
        let summary = sim.tick(&mut ui, 60).unwrap();
        assert_eq!(summary.late, ["dishes"]);
        assert!(summary.reminded.is_empty());
        assert_eq!(sim.state.merits, 490);
        assert!(!ui.saw("dishes is overdue."));

        let summary = sim.tick(&mut ui, 60).unwrap();
        assert!(summary.reminded.is_empty());
        let summary = sim.tick(&mut ui, 1800).unwrap();
        assert_eq!(summary.reminded, ["dishes"]);
        assert!(ui.saw("dishes is overdue."));

        sim.mark_done(&mut ui, "dishes").unwrap();
        assert_eq!(sim.state.merits, 510);
        assert!(sim.state.last_late_minutes > 0);
    }

    #[test]
    fn timers_fire_once_per_day() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.fast_forward(&mut ui, 0, 22, 0, 0).unwrap();
        sim.tick(&mut ui, 60).unwrap();
        sim.tick(&mut ui, 60).unwrap();
        assert_eq!(sim.state.variables.counter("bedtimes"), Some(1));
        sim.fast_forward(&mut ui, 1, 0, 0, 0).unwrap();
        assert_eq!(sim.state.variables.counter("bedtimes"), Some(2));
    }

    #[test]
    fn expired_flags_are_swept_after_their_procedure() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.set_flag("grounded", None, None);
        sim.tick(&mut ui, 1).unwrap();
        assert!(sim.is_flag_active("grounded"));
        let summary = sim.tick(&mut ui, 3_600).unwrap();
        assert_eq!(summary.flags_expired, ["grounded"]);
        assert!(!sim.state.flags.contains_key("grounded"));
        assert!(sim.is_flag_active("released"));
    }

    #[test]
    fn negative_tick_is_rejected() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        assert!(matches!(sim.tick(&mut ui, -5), Err(TickError::Clock { .. })));
    }
}
