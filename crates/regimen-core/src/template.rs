//! `{…}` placeholder expansion in user-facing text.
//!
//! Text is scanned once, left to right. Each `{token}` is replaced by the
//! first rule that resolves it:
//!
//! 1. `{zzName}` and the other predefined string values (subject aware)
//! 2. `{#counter}`, predefined counters included
//! 3. `{!time,fmt}` with `fmt` one of `d`, `t`, `i`, `dt`
//! 4. `{$Key}` stored question / input answers
//! 5. `{$string}` and `{!time}` variables
//! 6. `{Flag}` the flag's on/off text
//!
//! Anything unresolved becomes the empty string. An unterminated `{` is
//! copied literally.

use crate::interpreter::Subject;
use crate::simulation::Simulation;
use crate::variables::{PREDEFINED_PREFIX, variable_key};

impl Simulation {
    /// Expand every `{…}` token in `text`.
    pub fn expand(&self, text: &str, subject: Option<&Subject>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            let (before, from_open) = rest.split_at(open);
            out.push_str(before);
            let inner = from_open.strip_prefix('{').unwrap_or(from_open);
            let Some(close) = inner.find('}') else {
                out.push_str(from_open);
                rest = "";
                break;
            };
            let (token, tail) = inner.split_at(close);
            out.push_str(&self.resolve_token(token, subject));
            rest = tail.strip_prefix('}').unwrap_or(tail);
        }
        out.push_str(rest);
        out
    }

    fn resolve_token(&self, token: &str, subject: Option<&Subject>) -> String {
        let token = token.trim();
        let key = variable_key(token);

        if !token.starts_with(['#', '$', '!']) && key.starts_with(PREDEFINED_PREFIX) {
            return self
                .string_value(&key, subject)
                .or_else(|| self.counter_value(&key, subject).map(|n| n.to_string()))
                .unwrap_or_default();
        }

        if token.starts_with('#') {
            return self
                .counter_value(token, subject)
                .map(|n| n.to_string())
                .unwrap_or_default();
        }

        if let Some(body) = token.strip_prefix('!') {
            let (name, format) = match body.split_once(',') {
                Some((name, format)) => (name, Some(format)),
                None => (body, None),
            };
            return self
                .time_value(name)
                .map(|value| match format {
                    Some(format) => value.format_with(format),
                    None => value.to_string(),
                })
                .unwrap_or_default();
        }

        if token.starts_with('$') {
            if let Some(answer) = self.state.answers.get(&key) {
                return answer.clone();
            }
            return self.string_value(token, subject).unwrap_or_default();
        }

        self.flag_text(token)
    }

    /// On/off text for a flag, preferring the flag definition's own text.
    pub fn flag_text(&self, name: &str) -> String {
        let definition = self.script.flag(name);
        let general = &self.script.general;
        if self.is_flag_active(name) {
            definition
                .and_then(|d| d.on_text.clone())
                .unwrap_or_else(|| general.flag_on_text.clone())
        } else {
            definition
                .and_then(|d| d.off_text.clone())
                .unwrap_or_else(|| general.flag_off_text.clone())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use regimen_types::{Script, TimeValue};

    use super::*;
    use crate::config::EngineSettings;

    const SCRIPT: &str = r"
general:
  sub_name: Alex
  master_name: Sam
statuses:
  Home: {}
flags:
  Collar:
    on_text: wearing the collar
    off_text: bare
";

    fn simulation() -> Simulation {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        Simulation::new(
            Arc::new(Script::from_yaml(SCRIPT).unwrap()),
            EngineSettings::default(),
            start,
        )
    }

    #[test]
    fn predefined_and_counters() {
        let mut sim = simulation();
        sim.state.variables.set_counter("laps", 12).unwrap();
        assert_eq!(
            sim.expand("{zzName}, run {#laps} laps for {zzMaster}.", None),
            "Alex, run 12 laps for Sam."
        );
        assert_eq!(sim.expand("Merits: {zzMerits}", None), "Merits: 500");
    }

    #[test]
    fn time_formats() {
        let mut sim = simulation();
        sim.state
            .variables
            .set_time("due", TimeValue::parse("2024-03-01 20:30").unwrap())
            .unwrap();
        sim.state
            .variables
            .set_time("wait", TimeValue::Interval(5_400))
            .unwrap();
        assert_eq!(sim.expand("{!due,d} at {!due,t}", None), "2024-03-01 at 20:30");
        assert_eq!(sim.expand("{!wait,i}", None), "01:30:00");
        assert_eq!(sim.expand("{!wait}", None), "01:30:00");
    }

    #[test]
    fn answers_shadow_string_variables() {
        let mut sim = simulation();
        sim.state
            .variables
            .set_string("color", "red".to_owned())
            .unwrap();
        assert_eq!(sim.expand("{$Color}", None), "red");
        sim.state
            .answers
            .insert("color".to_owned(), "blue".to_owned());
        assert_eq!(sim.expand("{$Color}", None), "blue");
    }

    #[test]
    fn flag_text_uses_definition_then_general() {
        let mut sim = simulation();
        assert_eq!(sim.expand("{Collar}/{Gag}", None), "bare/off");
        let now = sim.now();
        sim.state
            .set_flag("collar", now, None, String::new(), Vec::new());
        sim.state.set_flag("gag", now, None, String::new(), Vec::new());
        assert_eq!(sim.expand("{Collar}/{Gag}", None), "wearing the collar/on");
    }

    #[test]
    fn subject_tokens() {
        let sim = simulation();
        let subject = Subject {
            name: "lines".to_owned(),
            title: "Lines".to_owned(),
            severity: 20,
        };
        assert_eq!(
            sim.expand("{zzTitle} ({#zzSeverity})", Some(&subject)),
            "Lines (20)"
        );
    }

    #[test]
    fn unresolved_and_unterminated() {
        let sim = simulation();
        assert_eq!(sim.expand("a{#nothing}b{$none}c", None), "abc");
        assert_eq!(sim.expand("left {open", None), "left {open");
        assert_eq!(sim.expand("no tokens", None), "no tokens");
    }
}
