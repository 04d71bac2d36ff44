//! The action interpreter.
//!
//! Executes [`ScriptAction`] lists against a [`Simulation`]:
//!
//! - `If` / `NotIf` gate the rest of the list. A failing gate stops the
//!   list and reports `false` to the caller.
//! - `ProcedureCall` runs a named procedure. The call's own result never
//!   aborts the caller; it only feeds [`SelectMode::First`] selection.
//! - Every other kind dispatches to exactly one handler. Handler errors
//!   are logged and the action is skipped.
//!
//! Side effects are applied to the live state immediately, so later
//! actions in the same list observe them.
//!
//! # Modules
//!
//! - [`handlers`] -- flags, merits and the three variable namespaces.
//! - [`interaction`] -- messages, questions, instructions and media.

pub mod handlers;
pub mod interaction;

use std::sync::Arc;

use rand::Rng;
use regimen_types::{ActionKind, EventHandler, ScriptAction, SelectMode};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::presentation::Presentation;
use crate::simulation::Simulation;

/// The assignment an action list is running on behalf of, used to
/// resolve `zzSubject`, `zzTitle` and `zzSeverity`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    /// Instance name.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Severity, for punishments.
    pub severity: u32,
}

/// Per-invocation interpreter context.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Assignment context for templates.
    pub subject: Option<Subject>,
    stack: Vec<String>,
}

impl CallContext {
    /// A context with no subject.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context running on behalf of `subject`.
    pub fn with_subject(subject: Subject) -> Self {
        Self {
            subject: Some(subject),
            stack: Vec::new(),
        }
    }

    /// Procedures currently executing, outermost first.
    pub fn call_stack(&self) -> &[String] {
        &self.stack
    }

    fn enter(&mut self, name: &str) -> Result<(), EngineError> {
        if self.stack.iter().any(|entry| entry == name) {
            return Err(EngineError::RecursiveCall {
                name: name.to_owned(),
            });
        }
        self.stack.push(name.to_owned());
        Ok(())
    }

    fn leave(&mut self) {
        self.stack.pop();
    }
}

/// Build a [`EngineError::MalformedPayload`] for `action`.
pub(crate) fn malformed(action: &ScriptAction, reason: impl Into<String>) -> EngineError {
    EngineError::MalformedPayload {
        kind: format!("{:?}", action.kind),
        value: action.value.clone(),
        reason: reason.into(),
    }
}

impl Simulation {
    /// Run an action list. Returns `false` if a gate stopped it.
    pub fn run_actions(
        &mut self,
        ui: &mut dyn Presentation,
        actions: &[ScriptAction],
        select: SelectMode,
        ctx: &mut CallContext,
    ) -> bool {
        let calls = actions
            .iter()
            .filter(|a| a.kind == ActionKind::ProcedureCall)
            .count();
        let picked = match select {
            SelectMode::Random if calls > 0 => Some(self.rng.random_range(0..calls)),
            _ => None,
        };
        let mut call_index: usize = 0;
        let mut first_succeeded = false;

        for action in actions {
            match action.kind {
                ActionKind::If => {
                    if !self.evaluate(&action.value, ctx.subject.as_ref()) {
                        debug!(condition = %action.value, "If failed, stopping");
                        return false;
                    }
                }
                ActionKind::NotIf => {
                    if self.evaluate(&action.value, ctx.subject.as_ref()) {
                        debug!(condition = %action.value, "NotIf held, stopping");
                        return false;
                    }
                }
                ActionKind::ProcedureCall => {
                    let index = call_index;
                    call_index = call_index.saturating_add(1);
                    match select {
                        SelectMode::All => {
                            self.call_procedure(ui, &action.value, ctx);
                        }
                        SelectMode::First => {
                            if !first_succeeded {
                                first_succeeded = self.call_procedure(ui, &action.value, ctx);
                            }
                        }
                        SelectMode::Random => {
                            if picked == Some(index) {
                                self.call_procedure(ui, &action.value, ctx);
                            }
                        }
                    }
                }
                _ => {
                    if let Err(err) = self.execute(ui, action, ctx) {
                        warn!(kind = ?action.kind, value = %action.value, error = %err, "Action skipped");
                    }
                }
            }
        }
        true
    }

    /// Run a named procedure. Returns `false` if it is missing, ineligible,
    /// already on the call stack, or stopped by a gate.
    pub fn call_procedure(
        &mut self,
        ui: &mut dyn Presentation,
        name: &str,
        ctx: &mut CallContext,
    ) -> bool {
        match self.try_call_procedure(ui, name, ctx) {
            Ok(completed) => completed,
            Err(err) => {
                warn!(procedure = %name, error = %err, "Procedure not run");
                false
            }
        }
    }

    fn try_call_procedure(
        &mut self,
        ui: &mut dyn Presentation,
        name: &str,
        ctx: &mut CallContext,
    ) -> Result<bool, EngineError> {
        let key = name.trim().to_lowercase();
        let script = Arc::clone(&self.script);
        let procedure = script
            .procedure(&key)
            .ok_or_else(|| EngineError::not_found("procedure", &key))?;
        self.check_eligibility(&procedure.eligibility)
            .map_err(|reason| EngineError::ineligible("procedure", &key, reason))?;
        ctx.enter(&key)?;
        debug!(procedure = %key, depth = ctx.stack.len(), "Procedure start");
        let completed = self.run_actions(ui, &procedure.actions, procedure.select, ctx);
        ctx.leave();
        Ok(completed)
    }

    /// Run an optional procedure reference, as found on definitions.
    pub fn run_optional_procedure(
        &mut self,
        ui: &mut dyn Presentation,
        name: Option<&str>,
        ctx: &mut CallContext,
    ) {
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            self.call_procedure(ui, name, ctx);
        }
    }

    /// Run the procedure attached to a hook, if any.
    pub fn run_hook(&mut self, ui: &mut dyn Presentation, event: EventHandler) -> bool {
        let Some(name) = self.script.handler(event).map(str::to_owned) else {
            return false;
        };
        debug!(?event, procedure = %name, "Hook");
        self.call_procedure(ui, &name, &mut CallContext::new())
    }

    /// Execute one non-control action.
    fn execute(
        &mut self,
        ui: &mut dyn Presentation,
        action: &ScriptAction,
        ctx: &mut CallContext,
    ) -> Result<(), EngineError> {
        let value = action.value.trim();
        match action.kind {
            ActionKind::If | ActionKind::NotIf | ActionKind::ProcedureCall => Ok(()),

            ActionKind::SetFlag => self.exec_set_flag(action, ctx),
            ActionKind::RemoveFlag => self.exec_remove_flag(action),

            ActionKind::AddMerit | ActionKind::SubtractMerit | ActionKind::SetMerit => {
                self.exec_merit(action, ctx)
            }

            ActionKind::SetCounter
            | ActionKind::AddCounter
            | ActionKind::SubtractCounter
            | ActionKind::MultiplyCounter
            | ActionKind::DivideCounter => self.exec_counter_arithmetic(action, ctx),
            ActionKind::InputCounter | ActionKind::ChangeCounter => {
                self.exec_input_counter(ui, action, ctx)
            }
            ActionKind::RandomCounter => self.exec_random_counter(action, ctx),
            ActionKind::DropCounter => {
                self.state.variables.drop_counter(value);
                Ok(())
            }

            ActionKind::SetString => self.exec_set_string(action, ctx),
            ActionKind::InputString
            | ActionKind::InputLongString
            | ActionKind::ChangeString
            | ActionKind::ChangeLongString => self.exec_input_string(ui, action, ctx),
            ActionKind::DropString => {
                self.state.variables.drop_string(value);
                Ok(())
            }

            ActionKind::SetTime => self.exec_set_time(action),
            ActionKind::InputDate
            | ActionKind::InputTime
            | ActionKind::InputInterval
            | ActionKind::ChangeDate
            | ActionKind::ChangeTime
            | ActionKind::ChangeInterval => self.exec_input_time(ui, action, ctx),
            ActionKind::AddTime
            | ActionKind::SubtractTime
            | ActionKind::AddDays
            | ActionKind::SubtractDays => self.exec_shift_time(action, ctx),
            ActionKind::RoundTime => self.exec_round_time(action),
            ActionKind::RandomTime => self.exec_random_time(action),
            ActionKind::ExtractDays | ActionKind::ExtractHours | ActionKind::ExtractMinutes => {
                self.exec_extract_time(action)
            }
            ActionKind::ConvertDays | ActionKind::ConvertHours | ActionKind::ConvertMinutes => {
                self.exec_convert_time(action, ctx)
            }
            ActionKind::DropTime => {
                self.state.variables.drop_time(value);
                Ok(())
            }

            ActionKind::NewStatus => self.change_status(ui, value, false),
            ActionKind::NewSubStatus => self.change_status(ui, value, true),
            ActionKind::ReturnStatus => self.return_to_last_status(ui),

            ActionKind::MarkDone => self.mark_done(ui, value),
            ActionKind::Abort => self.abort_assignment(ui, value),
            ActionKind::Delete => self.delete_assignment(value).map(|_| ()),
            ActionKind::AnnounceJob => self.assign_job(ui, value, true).map(|_| ()),

            ActionKind::Message => {
                let text = self.expand(&action.value, ctx.subject.as_ref());
                ui.show_message(&text);
                Ok(())
            }
            ActionKind::Question => self.ask_question(ui, value, ctx),
            ActionKind::Input => self.exec_input_answer(ui, action, ctx),
            ActionKind::Punish => self.exec_punish(ui, action, ctx),
            ActionKind::ClothReport => {
                self.cloth_report(ui);
                Ok(())
            }
            ActionKind::ClearCloth => {
                self.state.outfit = None;
                Ok(())
            }
            ActionKind::Clothing => self.exec_clothing(ui, action, ctx),
            ActionKind::Instructions => self.show_instructions(ui, value),
            ActionKind::PointCamera => {
                let prompt = self.expand(&action.value, ctx.subject.as_ref());
                ui.capture_photo(&prompt);
                Ok(())
            }
            ActionKind::PoseCamera => {
                let prompt = self.expand(&action.value, ctx.subject.as_ref());
                ui.show_message(&prompt);
                ui.capture_photo(&prompt);
                Ok(())
            }
            ActionKind::Sound => {
                ui.play_sound(value);
                Ok(())
            }

            ActionKind::Timer => self.activate_timer(value),
        }
    }
}
