//! Handlers that talk to the user: questions, free-text input, clothing,
//! instructions, punishments and timers.

use std::sync::Arc;

use regimen_types::{ScriptAction, SelectMode};
use tracing::{debug, info, warn};

use super::{CallContext, malformed};
use crate::error::EngineError;
use crate::presentation::Presentation;
use crate::simulation::Simulation;

impl Simulation {
    /// Ask a defined question and run the chosen answer's actions.
    ///
    /// The answer text is stored under the question name and as the last
    /// answer; the answer name joins the chosen set. Cancelling runs the
    /// question's no-input procedure.
    pub fn ask_question(
        &mut self,
        ui: &mut dyn Presentation,
        name: &str,
        ctx: &mut CallContext,
    ) -> Result<(), EngineError> {
        let key = name.trim().to_lowercase();
        let script = Arc::clone(&self.script);
        let question = script
            .question(&key)
            .ok_or_else(|| EngineError::not_found("question", &key))?;
        self.check_eligibility(&question.eligibility)
            .map_err(|reason| EngineError::ineligible("question", &key, reason))?;

        let prompt = self.expand(&question.text, ctx.subject.as_ref());
        let options: Vec<String> = question
            .answers
            .iter()
            .map(|a| self.expand(&a.text, ctx.subject.as_ref()))
            .collect();

        let chosen = ui
            .present_choice(&prompt, &options)
            .and_then(|index| Some((question.answers.get(index)?, options.get(index)?)));
        let Some((answer, text)) = chosen else {
            debug!(question = %key, "Question cancelled");
            self.run_optional_procedure(ui, question.no_input_procedure.as_deref(), ctx);
            return Ok(());
        };

        self.state.chosen.insert(answer.name.to_lowercase());
        self.state.answers.insert(key.clone(), text.clone());
        self.state.last_answer.clone_from(text);
        debug!(question = %key, answer = %answer.name, "Question answered");
        self.run_actions(ui, &answer.actions, SelectMode::All, ctx);
        Ok(())
    }

    pub(super) fn exec_input_answer(
        &mut self,
        ui: &mut dyn Presentation,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let key = fields
            .first()
            .copied()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| malformed(action, "missing answer key"))?
            .trim_start_matches('$')
            .to_lowercase();
        let prompt = self.expand(fields.get(1).copied().unwrap_or(key.as_str()), ctx.subject.as_ref());
        let current = self.state.answers.get(&key).cloned();
        if let Some(text) = ui.prompt_text(&prompt, current.as_deref()) {
            self.state.last_answer.clone_from(&text);
            self.state.answers.insert(key, text);
        }
        Ok(())
    }

    pub(super) fn exec_clothing(
        &mut self,
        ui: &mut dyn Presentation,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let text = self.expand(&action.value, ctx.subject.as_ref());
        if text.trim().is_empty() {
            self.state.required_clothing = None;
            return Ok(());
        }
        ui.show_message(&text);
        self.state.required_clothing = Some(text);
        Ok(())
    }

    pub(super) fn exec_punish(
        &mut self,
        ui: &mut dyn Presentation,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(3);
        let severity = self.int_operand(action, fields.first().copied(), ctx.subject.as_ref())?;
        let severity = u32::try_from(severity.max(0)).unwrap_or(u32::MAX);
        let group = fields.get(1).copied().filter(|g| !g.is_empty());
        let message = fields
            .get(2)
            .copied()
            .filter(|m| !m.is_empty())
            .map(|m| self.expand(m, ctx.subject.as_ref()));
        self.apply_punishment(ui, severity, group, message.as_deref())
            .map(|_| ())
    }

    /// Show a named instruction set, expanding includes depth-first. An
    /// include already being expanded is skipped.
    pub fn show_instructions(
        &mut self,
        ui: &mut dyn Presentation,
        name: &str,
    ) -> Result<(), EngineError> {
        let mut lines = Vec::new();
        self.collect_instruction_lines(name, &mut Vec::new(), &mut lines)?;
        let title = self
            .script
            .instruction(name)
            .map(|i| i.title.clone())
            .unwrap_or_default();
        let body: Vec<String> = lines.iter().map(|line| self.expand(line, None)).collect();
        ui.show_message(&format!("{title}\n{}", body.join("\n")));
        Ok(())
    }

    fn collect_instruction_lines(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        out: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        let key = name.trim().to_lowercase();
        if stack.contains(&key) {
            warn!(instructions = %key, "Recursive include skipped");
            return Ok(());
        }
        let instruction = self
            .script
            .instruction(&key)
            .ok_or_else(|| EngineError::not_found("instructions", &key))?;
        out.extend(instruction.lines.iter().cloned());
        stack.push(key);
        for include in &instruction.includes {
            self.collect_instruction_lines(include, stack, out)?;
        }
        stack.pop();
        Ok(())
    }

    /// Register a timer so the scheduler considers it.
    pub fn activate_timer(&mut self, name: &str) -> Result<(), EngineError> {
        let key = name.trim().to_lowercase();
        if self.script.timer(&key).is_none() {
            return Err(EngineError::not_found("timer", &key));
        }
        if self.state.active_timers.insert(key.clone()) {
            info!(timer = %key, "Timer activated");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use regimen_types::{ActionKind, Script};

    use super::*;
    use crate::config::EngineSettings;
    use crate::presentation::{Answer, ScriptedPresentation};

    const SCRIPT: &str = r"
statuses:
  Home: {}
questions:
  Mood:
    text: How are you, {zzName}?
    answers:
      - name: Good
        text: Feeling good
        actions:
          - kind: AddMerit
            value: '5'
      - name: Bad
        text: Not great
    no_input_procedure: Sulk
procedures:
  Sulk:
    actions:
      - kind: SetFlag
        value: sulking
instructions:
  Morning:
    title: Morning routine
    lines: [Make the bed]
    includes: [Teeth]
  Teeth:
    lines: [Brush teeth]
    includes: [Morning]
timers:
  Bedtime:
    start: '22:00:00'
    end: '23:00:00'
";

    fn simulation() -> Simulation {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Simulation::new(
            Arc::new(Script::from_yaml(SCRIPT).unwrap()),
            EngineSettings::default(),
            start,
        )
    }

    #[test]
    fn question_records_choice_and_runs_actions() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::with_answers([Answer::Choice(0)]);
        sim.ask_question(&mut ui, "Mood", &mut CallContext::new())
            .unwrap();
        assert!(sim.state.chosen.contains("good"));
        assert_eq!(sim.state.last_answer, "Feeling good");
        assert_eq!(sim.expand("{$mood}", None), "Feeling good");
        assert_eq!(sim.state.merits, 505);
    }

    #[test]
    fn cancelled_question_runs_no_input_procedure() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.ask_question(&mut ui, "Mood", &mut CallContext::new())
            .unwrap();
        assert!(sim.is_flag_active("sulking"));
        assert!(sim.state.chosen.is_empty());
    }

    #[test]
    fn input_stores_answer() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::with_answers([Answer::Text("tea".to_owned())]);
        let actions = [ScriptAction::new(ActionKind::Input, "Drink,What did you drink?")];
        sim.run_actions(&mut ui, &actions, SelectMode::All, &mut CallContext::new());
        assert_eq!(sim.state.answers.get("drink").map(String::as_str), Some("tea"));
        assert_eq!(sim.expand("{$Drink}", None), "tea");
    }

    #[test]
    fn instructions_expand_includes_once() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.show_instructions(&mut ui, "Morning").unwrap();
        assert_eq!(ui.messages, vec!["Morning routine\nMake the bed\nBrush teeth"]);
        assert!(sim.show_instructions(&mut ui, "Evening").is_err());
    }

    #[test]
    fn timers_must_exist() {
        let mut sim = simulation();
        assert!(sim.activate_timer("bedtime").is_ok());
        assert!(sim.state.active_timers.contains("bedtime"));
        assert!(sim.activate_timer("nap").is_err());
    }

    #[test]
    fn clothing_sets_requirement() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        let actions = [
            ScriptAction::new(ActionKind::Clothing, "Wear the grey dress"),
            ScriptAction::new(ActionKind::ClearCloth, ""),
        ];
        sim.state.outfit = Some("jeans".to_owned());
        sim.run_actions(&mut ui, &actions, SelectMode::All, &mut CallContext::new());
        assert_eq!(sim.state.required_clothing.as_deref(), Some("Wear the grey dress"));
        assert_eq!(sim.state.outfit, None);
        assert!(ui.saw("grey dress"));
    }
}
