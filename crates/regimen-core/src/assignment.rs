//! Assignment lifecycle: assign, start, done, abort, delete.
//!
//! Jobs and punishments share one instance map. Each instance carries its
//! own deadline, expiry and reminder schedule; the scheduler drives the
//! time-based transitions, this module the user-driven ones.

use std::sync::Arc;

use chrono::{Days, NaiveDateTime, TimeDelta};
use regimen_types::{EventHandler, JobDefinition, SelectMode};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::interpreter::{CallContext, Subject};
use crate::presentation::Presentation;
use crate::simulation::Simulation;
use crate::state::{Assignment, AssignmentKind, UsageCounters, started_flag};

/// Deadline for a job assigned at `now`: today's end time (tomorrow's if it
/// has passed), else `now + respite`, else the end of today.
pub fn job_deadline(job: &JobDefinition, now: NaiveDateTime) -> NaiveDateTime {
    if let Some(end) = job.end_time {
        let today = now.date().and_time(end);
        if today > now {
            return today;
        }
        return today.checked_add_days(Days::new(1)).unwrap_or(today);
    }
    if let Some(deadline) = job
        .respite
        .and_then(TimeDelta::try_seconds)
        .and_then(|respite| now.checked_add_signed(respite))
    {
        return deadline;
    }
    end_of_day(now)
}

/// The last second of `now`'s date.
pub fn end_of_day(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_hms_opt(23, 59, 59).unwrap_or(now)
}

/// `deadline + after`, if `after` is set and representable.
pub(crate) fn offset(deadline: NaiveDateTime, after: Option<i64>) -> Option<NaiveDateTime> {
    after
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| deadline.checked_add_signed(delta))
}

impl Assignment {
    /// Interpreter context for procedures run on behalf of `instance`.
    pub fn subject(&self, instance: &str) -> Subject {
        Subject {
            name: instance.to_owned(),
            title: self.title.clone(),
            severity: self.severity,
        }
    }
}

impl Simulation {
    /// Assign job `name`. Returns the instance name.
    pub fn assign_job(
        &mut self,
        ui: &mut dyn Presentation,
        name: &str,
        announce: bool,
    ) -> Result<String, EngineError> {
        let key = name.trim().to_lowercase();
        let script = Arc::clone(&self.script);
        let job = script
            .job(&key)
            .ok_or_else(|| EngineError::not_found("job", &key))?;
        if self.state.assignments.contains_key(&key) {
            return Err(EngineError::ineligible("job", &key, "already assigned"));
        }
        self.check_eligibility(&job.eligibility)
            .map_err(|reason| EngineError::ineligible("job", &key, reason))?;

        let now = self.now();
        let deadline = job_deadline(job, now);
        let assignment = Assignment {
            kind: AssignmentKind::Job,
            definition: key.clone(),
            title: job.title.clone(),
            assigned_at: now,
            deadline,
            expiry: offset(deadline, job.expire.after.or(script.general.expire_after)),
            remind_interval: job
                .remind
                .interval
                .unwrap_or(script.general.remind_interval),
            next_reminder: None,
            late: false,
            late_refund: None,
            amount: 1,
            severity: 0,
            started_at: None,
        };
        let mut ctx = CallContext::with_subject(assignment.subject(&key));
        self.state.insert_assignment(key.clone(), assignment);
        self.state.job_history.entry(key.clone()).or_default().last_assigned = Some(now.date());
        info!(job = %key, %deadline, "Job assigned");

        if announce {
            ui.show_message(&format!("New job: {}", job.title));
        }
        self.run_actions(ui, &job.actions, SelectMode::All, &mut ctx);
        self.run_hook(ui, EventHandler::JobAnnounced);
        Ok(key)
    }

    /// Complete an instance.
    pub fn mark_done(&mut self, ui: &mut dyn Presentation, instance: &str) -> Result<(), EngineError> {
        let key = instance.trim().to_lowercase();
        let assignment = self
            .state
            .assignments
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::NoSuchAssignment {
                instance: key.clone(),
            })?;
        let script = Arc::clone(&self.script);
        let now = self.now();
        let mut ctx = CallContext::with_subject(assignment.subject(&key));

        match assignment.kind {
            AssignmentKind::Job => {
                let job = script.job(&assignment.definition);
                if job.is_some_and(|j| j.long_running) && !assignment.is_started() {
                    return Err(EngineError::ineligible("job", &key, "not started"));
                }
                self.state.remove_assignment(&key);

                let late_minutes = now.signed_duration_since(assignment.deadline).num_minutes();
                self.state.last_late_minutes = late_minutes.max(0);
                self.state.last_early_minutes = late_minutes.saturating_neg().max(0);

                let earned = job
                    .map_or(0, |j| j.merits)
                    .saturating_add(assignment.late_refund.unwrap_or(0));
                self.state.add_merits(earned, &script.general);

                self.state
                    .job_history
                    .entry(assignment.definition.clone())
                    .or_default()
                    .last_done = Some(now.date());
                UsageCounters::bump(&mut self.state.usage.jobs, &assignment.definition);
                self.state.daily.jobs_done.push(assignment.definition.clone());
                info!(
                    job = %key,
                    earned,
                    late_minutes = self.state.last_late_minutes,
                    "Job done"
                );

                self.run_hook(ui, EventHandler::JobDone);
                self.run_optional_procedure(
                    ui,
                    job.and_then(|j| j.done_procedure.as_deref()),
                    &mut ctx,
                );
            }
            AssignmentKind::Punishment => {
                let punishment = script.punishment(&assignment.definition);
                if punishment.is_some_and(|p| p.long_running) && !assignment.is_started() {
                    return Err(EngineError::ineligible("punishment", &key, "not started"));
                }
                self.state.remove_assignment(&key);

                let earned = punishment.map_or(0, |p| p.merits);
                self.state.add_merits(earned, &script.general);
                UsageCounters::bump(&mut self.state.usage.punishments, &assignment.definition);
                self.state
                    .daily
                    .punishments_done
                    .push(assignment.definition.clone());
                info!(punishment = %key, earned, "Punishment done");

                self.run_hook(ui, EventHandler::PunishmentDone);
                self.run_optional_procedure(
                    ui,
                    punishment.and_then(|p| p.done_procedure.as_deref()),
                    &mut ctx,
                );
            }
        }
        Ok(())
    }

    /// Abort an instance: run its abort procedure, then remove it.
    pub fn abort_assignment(
        &mut self,
        ui: &mut dyn Presentation,
        instance: &str,
    ) -> Result<(), EngineError> {
        let key = instance.trim().to_lowercase();
        let assignment = self.delete_assignment(&key)?;
        let script = Arc::clone(&self.script);
        let procedure = match assignment.kind {
            AssignmentKind::Job => script
                .job(&assignment.definition)
                .and_then(|j| j.abort_procedure.as_deref()),
            AssignmentKind::Punishment => script
                .punishment(&assignment.definition)
                .and_then(|p| p.abort_procedure.as_deref()),
        };
        info!(instance = %key, kind = assignment.kind.as_str(), "Assignment aborted");
        let mut ctx = CallContext::with_subject(assignment.subject(&key));
        self.run_optional_procedure(ui, procedure, &mut ctx);
        Ok(())
    }

    /// Remove an instance without running anything.
    pub fn delete_assignment(&mut self, instance: &str) -> Result<Assignment, EngineError> {
        let key = instance.trim().to_lowercase();
        let removed = self
            .state
            .remove_assignment(&key)
            .ok_or_else(|| EngineError::NoSuchAssignment {
                instance: key.clone(),
            })?;
        info!(instance = %key, "Assignment removed");
        Ok(removed)
    }

    /// Start long-running work on an instance.
    ///
    /// Sets `<instance>_started`, runs the start procedure, and for
    /// punishments with `lines` asks for each line to be typed out. When
    /// every line is typed correctly the punishment is done.
    pub fn start_assignment(
        &mut self,
        ui: &mut dyn Presentation,
        instance: &str,
    ) -> Result<(), EngineError> {
        let key = instance.trim().to_lowercase();
        let now = self.now();
        let assignment = self
            .state
            .assignments
            .get_mut(&key)
            .ok_or_else(|| EngineError::NoSuchAssignment {
                instance: key.clone(),
            })?;
        if assignment.is_started() {
            return Err(EngineError::ineligible(
                assignment.kind.as_str(),
                &key,
                "already started",
            ));
        }
        assignment.started_at = Some(now);
        let assignment = assignment.clone();
        self.state
            .set_flag(&started_flag(&key), now, None, String::new(), Vec::new());
        info!(instance = %key, "Assignment started");

        let script = Arc::clone(&self.script);
        let mut ctx = CallContext::with_subject(assignment.subject(&key));
        match assignment.kind {
            AssignmentKind::Job => {
                let procedure = script
                    .job(&assignment.definition)
                    .and_then(|j| j.start_procedure.as_deref());
                self.run_optional_procedure(ui, procedure, &mut ctx);
            }
            AssignmentKind::Punishment => {
                let punishment = script.punishment(&assignment.definition);
                self.run_optional_procedure(
                    ui,
                    punishment.and_then(|p| p.start_procedure.as_deref()),
                    &mut ctx,
                );
                if let Some(line) = punishment.and_then(|p| p.lines.as_deref()) {
                    let line = self.expand(line, ctx.subject.as_ref());
                    if write_lines(ui, &line, assignment.amount) {
                        self.mark_done(ui, &key)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Force-abort started work that may not be interrupted. Returns the
    /// aborted instances. Nothing is aborted while the current status is
    /// one of the script's interrupt statuses.
    pub fn enforce_interruptions(&mut self, ui: &mut dyn Presentation) -> Vec<String> {
        let script = Arc::clone(&self.script);
        if script
            .general
            .interrupt_statuses
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&self.state.status))
        {
            return Vec::new();
        }
        let doomed: Vec<String> = self
            .state
            .assignments
            .iter()
            .filter(|(_, a)| a.is_started())
            .filter(|(_, a)| {
                let interruptable = match a.kind {
                    AssignmentKind::Job => script.job(&a.definition).is_some_and(|j| j.interruptable),
                    AssignmentKind::Punishment => script
                        .punishment(&a.definition)
                        .is_some_and(|p| p.interruptable),
                };
                !interruptable
            })
            .map(|(name, _)| name.clone())
            .collect();
        let mut aborted = Vec::with_capacity(doomed.len());
        for instance in doomed {
            ui.show_message(&format!("{instance} was interrupted and is aborted."));
            match self.abort_assignment(ui, &instance) {
                Ok(()) => aborted.push(instance),
                Err(err) => warn!(instance = %instance, %err, "Interrupted assignment not aborted"),
            }
        }
        aborted
    }
}

/// Ask for `line` to be typed `count` times. Returns whether every line
/// was typed exactly; stops early on cancel.
fn write_lines(ui: &mut dyn Presentation, line: &str, count: u32) -> bool {
    let mut wrong: u32 = 0;
    for n in 1..=count {
        let Some(typed) = ui.prompt_text(&format!("Line {n} of {count}: {line}"), None) else {
            ui.show_message("Line writing interrupted.");
            return false;
        };
        if typed.trim() != line.trim() {
            wrong = wrong.saturating_add(1);
        }
    }
    if wrong > 0 {
        ui.show_message(&format!("{wrong} of {count} lines were wrong."));
    }
    wrong == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use regimen_types::Script;

    use super::*;
    use crate::config::EngineSettings;
    use crate::presentation::{Answer, ScriptedPresentation};

    const SCRIPT: &str = r"
general:
  max_merits: 1000
  start_merits: 100
  expire_after: 7200
  interrupt_statuses: [Break]
statuses:
  Home: {}
  Break: {}
jobs:
  Dishes:
    title: Dishes
    run: Daily
    end_time: '20:00:00'
    merits: 5
    done_procedure: Thanks
  Laundry:
    respite: 3600
    long_running: true
    interruptable: false
    merits: 10
    abort_procedure: Scold
  Vacuum:
    merits: 2
punishments:
  Lines:
    title: Lines
    value: 5
    lines: I will not be late.
    merits: 1
procedures:
  Thanks:
    actions:
      - kind: SetString
        value: $thanked,{zzSubject}
  Scold:
    actions:
      - kind: SetFlag
        value: scolded
";

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn simulation(now: NaiveDateTime) -> Simulation {
        Simulation::new(
            Arc::new(Script::from_yaml(SCRIPT).unwrap()),
            EngineSettings::default(),
            now,
        )
    }

    fn punishment(sim: &mut Simulation, amount: u32) {
        let now = sim.now();
        sim.state.insert_assignment(
            "lines".to_owned(),
            Assignment {
                kind: AssignmentKind::Punishment,
                definition: "lines".to_owned(),
                title: "Lines".to_owned(),
                assigned_at: now,
                deadline: now,
                expiry: None,
                remind_interval: regimen_types::RemindInterval::Never,
                next_reminder: None,
                late: false,
                late_refund: None,
                amount,
                severity: 10,
                started_at: None,
            },
        );
    }

    #[test]
    fn deadline_rules() {
        let script = Script::from_yaml(SCRIPT).unwrap();
        let dishes = script.job("dishes").unwrap();
        assert_eq!(job_deadline(dishes, at(8, 0)), at(20, 0));
        assert_eq!(
            job_deadline(dishes, at(21, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 2)
                .unwrap()
                .and_time(NaiveTime::from_hms_opt(20, 0, 0).unwrap())
        );
        assert_eq!(job_deadline(script.job("laundry").unwrap(), at(8, 0)), at(9, 0));
        assert_eq!(
            job_deadline(script.job("vacuum").unwrap(), at(8, 0)),
            at(23, 59) + TimeDelta::try_seconds(59).unwrap()
        );
    }

    #[test]
    fn assign_then_done_grants_merits() {
        let mut sim = simulation(at(8, 0));
        let mut ui = ScriptedPresentation::new();
        let instance = sim.assign_job(&mut ui, "Dishes", true).unwrap();
        assert!(ui.saw("New job: Dishes"));
        let a = sim.state.assignments.get(&instance).unwrap();
        assert_eq!(a.deadline, at(20, 0));
        assert_eq!(a.expiry, Some(at(22, 0)));
        assert!(sim.assign_job(&mut ui, "dishes", false).is_err());

        sim.mark_done(&mut ui, "dishes").unwrap();
        assert_eq!(sim.state.merits, 105);
        assert!(sim.state.assignments.is_empty());
        assert_eq!(sim.state.last_early_minutes, 720);
        assert_eq!(sim.state.variables.string("thanked"), Some("dishes"));
        assert_eq!(sim.state.daily.jobs_done, vec!["dishes"]);
        assert_eq!(
            sim.state.job_history.get("dishes").unwrap().last_done,
            Some(at(8, 0).date())
        );
    }

    #[test]
    fn long_running_job_must_start_first() {
        let mut sim = simulation(at(8, 0));
        let mut ui = ScriptedPresentation::new();
        sim.assign_job(&mut ui, "laundry", false).unwrap();
        assert!(sim.mark_done(&mut ui, "laundry").is_err());
        sim.start_assignment(&mut ui, "laundry").unwrap();
        assert!(sim.is_flag_active("laundry_started"));
        sim.mark_done(&mut ui, "laundry").unwrap();
        assert!(!sim.is_flag_active("laundry_started"));
        assert_eq!(sim.state.merits, 110);
    }

    #[test]
    fn abort_runs_procedure_and_delete_is_silent() {
        let mut sim = simulation(at(8, 0));
        let mut ui = ScriptedPresentation::new();
        sim.assign_job(&mut ui, "laundry", false).unwrap();
        sim.abort_assignment(&mut ui, "laundry").unwrap();
        assert!(sim.is_flag_active("scolded"));

        sim.assign_job(&mut ui, "vacuum", false).unwrap();
        sim.delete_assignment("vacuum").unwrap();
        assert!(sim.state.assignments.is_empty());
        assert!(matches!(
            sim.delete_assignment("vacuum"),
            Err(EngineError::NoSuchAssignment { .. })
        ));
    }

    #[test]
    fn started_uninterruptable_work_is_aborted() {
        let mut sim = simulation(at(8, 0));
        let mut ui = ScriptedPresentation::new();
        sim.assign_job(&mut ui, "laundry", false).unwrap();
        sim.assign_job(&mut ui, "vacuum", false).unwrap();
        sim.start_assignment(&mut ui, "laundry").unwrap();
        assert_eq!(sim.enforce_interruptions(&mut ui), vec!["laundry"]);
        assert!(sim.state.assignments.contains_key("vacuum"));
        assert!(!sim.state.assignments.contains_key("laundry"));
        assert!(sim.is_flag_active("scolded"));
        assert!(ui.saw("laundry was interrupted and is aborted."));
    }

    #[test]
    fn interrupt_status_protects_started_work() {
        let mut sim = simulation(at(8, 0));
        let mut ui = ScriptedPresentation::new();
        sim.assign_job(&mut ui, "laundry", false).unwrap();
        sim.start_assignment(&mut ui, "laundry").unwrap();
        sim.change_status(&mut ui, "Break", false).unwrap();
        assert!(sim.enforce_interruptions(&mut ui).is_empty());
        assert!(sim.state.assignments.contains_key("laundry"));
    }

    #[test]
    fn correct_lines_complete_punishment() {
        let mut sim = simulation(at(8, 0));
        punishment(&mut sim, 2);
        let line = "I will not be late.".to_owned();
        let mut ui = ScriptedPresentation::with_answers([
            Answer::Text(line.clone()),
            Answer::Text(line),
        ]);
        sim.start_assignment(&mut ui, "lines").unwrap();
        assert!(sim.state.assignments.is_empty());
        assert_eq!(sim.state.merits, 101);
        assert_eq!(sim.state.daily.punishments_done, vec!["lines"]);
    }

    #[test]
    fn wrong_lines_leave_punishment_started() {
        let mut sim = simulation(at(8, 0));
        punishment(&mut sim, 2);
        let mut ui = ScriptedPresentation::with_answers([
            Answer::Text("I will not be late.".to_owned()),
            Answer::Text("whatever".to_owned()),
        ]);
        sim.start_assignment(&mut ui, "lines").unwrap();
        assert!(sim.state.assignments.get("lines").unwrap().is_started());
        assert!(ui.saw("1 of 2 lines were wrong."));
        assert!(sim.start_assignment(&mut ui, "lines").is_err());
    }
}
