//! Handlers for flags, merits and variables.
//!
//! Payloads are comma-delimited. Integer operands are literals or
//! `#counter` references (unset counters read as 0); interval operands are
//! interval literals or `!time` references.

use chrono::{DateTime, NaiveTime, TimeDelta};
use rand::Rng;
use regimen_types::{
    ActionKind, SECS_PER_DAY, SECS_PER_HOUR, SECS_PER_MINUTE, ScriptAction, TimeValue,
    parse_interval,
};

use super::{CallContext, Subject, malformed};
use crate::error::EngineError;
use crate::presentation::Presentation;
use crate::simulation::Simulation;

/// Field `index` of a split payload, if present and non-empty.
fn field<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields.get(index).copied().filter(|f| !f.is_empty())
}

/// Rebuild a value of the same variant as `like` from raw seconds.
fn with_seconds(like: TimeValue, secs: i64) -> Option<TimeValue> {
    match like {
        TimeValue::Interval(_) => Some(TimeValue::Interval(secs)),
        TimeValue::TimeOfDay(_) => {
            let secs = u32::try_from(secs.rem_euclid(SECS_PER_DAY)).ok()?;
            NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).map(TimeValue::TimeOfDay)
        }
        TimeValue::DateTime(_) => {
            DateTime::from_timestamp(secs, 0).map(|dt| TimeValue::DateTime(dt.naive_utc()))
        }
    }
}

/// Shift a time value by `secs`. Times of day wrap around midnight.
fn shift(value: TimeValue, secs: i64) -> Option<TimeValue> {
    match value {
        TimeValue::Interval(current) => current.checked_add(secs).map(TimeValue::Interval),
        TimeValue::TimeOfDay(time) => {
            let delta = TimeDelta::try_seconds(secs)?;
            Some(TimeValue::TimeOfDay(time.overflowing_add_signed(delta).0))
        }
        TimeValue::DateTime(dt) => {
            let delta = TimeDelta::try_seconds(secs)?;
            dt.checked_add_signed(delta).map(TimeValue::DateTime)
        }
    }
}

impl Simulation {
    /// Resolve an integer operand: a literal or a `#counter`.
    pub(crate) fn int_operand(
        &self,
        action: &ScriptAction,
        operand: Option<&str>,
        subject: Option<&Subject>,
    ) -> Result<i64, EngineError> {
        let operand = operand.ok_or_else(|| malformed(action, "missing operand"))?;
        if operand.starts_with('#') {
            return Ok(self.counter_value(operand, subject).unwrap_or(0));
        }
        operand
            .parse::<i64>()
            .map_err(|_err| malformed(action, format!("{operand:?} is not an integer")))
    }

    /// Resolve an interval operand: a literal or a `!time` reference.
    fn interval_operand(
        &self,
        action: &ScriptAction,
        operand: Option<&str>,
    ) -> Result<i64, EngineError> {
        let operand = operand.ok_or_else(|| malformed(action, "missing interval"))?;
        if operand.starts_with('!') {
            return match self.time_value(operand) {
                Some(TimeValue::Interval(secs)) => Ok(secs),
                Some(value @ TimeValue::TimeOfDay(_)) => Ok(value.as_seconds()),
                Some(TimeValue::DateTime(_)) => {
                    Err(malformed(action, format!("{operand} is not an interval")))
                }
                None => Err(malformed(action, format!("{operand} is not set"))),
            };
        }
        parse_interval(operand)
            .ok_or_else(|| malformed(action, format!("{operand:?} is not an interval")))
    }

    /// Resolve a time operand: `now`, `today`, a `!time` or a literal.
    fn time_operand(&self, action: &ScriptAction, operand: Option<&str>) -> Result<TimeValue, EngineError> {
        let operand = operand.ok_or_else(|| malformed(action, "missing time"))?;
        let now = self.now();
        if operand.eq_ignore_ascii_case("now") {
            return Ok(TimeValue::DateTime(now));
        }
        if operand.eq_ignore_ascii_case("today") {
            return Ok(TimeValue::DateTime(now.date().and_time(NaiveTime::MIN)));
        }
        if operand.starts_with('!') {
            return self
                .time_value(operand)
                .ok_or_else(|| malformed(action, format!("{operand} is not set")));
        }
        TimeValue::parse(operand)
            .ok_or_else(|| malformed(action, format!("{operand:?} is not a time literal")))
    }

    fn stored_time(&self, action: &ScriptAction, name: &str) -> Result<TimeValue, EngineError> {
        self.time_value(name)
            .ok_or_else(|| malformed(action, format!("{name} is not set")))
    }

    // --- Flags ---

    /// Set a flag, filling duration, text and groups from its definition.
    pub fn set_flag(&mut self, name: &str, duration: Option<i64>, text: Option<String>) {
        let definition = self.script.flag(name);
        let duration = duration.or_else(|| definition.and_then(|d| d.duration));
        let text = text.unwrap_or_else(|| definition.map(|d| d.text.clone()).unwrap_or_default());
        let groups = definition.map(|d| d.groups.clone()).unwrap_or_default();
        let now = self.now();
        self.state.set_flag(name, now, duration, text, groups);
    }

    pub(super) fn exec_set_flag(
        &mut self,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing flag name"))?;
        let (duration, text) = match field(&fields, 1) {
            None => (None, None),
            Some(rest) => {
                let (head, tail) = match rest.split_once(',') {
                    Some((head, tail)) => (head.trim(), Some(tail.trim())),
                    None => (rest, None),
                };
                match parse_interval(head) {
                    Some(secs) => (Some(secs), tail.filter(|t| !t.is_empty())),
                    None => (None, Some(rest)),
                }
            }
        };
        let text = text.map(|t| self.expand(t, ctx.subject.as_ref()));
        self.set_flag(name, duration, text);
        Ok(())
    }

    pub(super) fn exec_remove_flag(&mut self, action: &ScriptAction) -> Result<(), EngineError> {
        let name = action.value.trim();
        if name.is_empty() {
            return Err(malformed(action, "missing flag name"));
        }
        self.state.remove_flag(name);
        Ok(())
    }

    // --- Merits ---

    pub(super) fn exec_merit(
        &mut self,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let amount = self.int_operand(action, Some(action.value.trim()), ctx.subject.as_ref())?;
        let general = &self.script.general;
        match action.kind {
            ActionKind::AddMerit => self.state.add_merits(amount, general),
            ActionKind::SubtractMerit => self.state.add_merits(amount.saturating_neg(), general),
            _ => self.state.set_merits(amount, general),
        };
        Ok(())
    }

    // --- Counters ---

    pub(super) fn exec_counter_arithmetic(
        &mut self,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing counter"))?;
        let operand = self.int_operand(action, field(&fields, 1), ctx.subject.as_ref())?;
        let current = self.counter_value(name, ctx.subject.as_ref()).unwrap_or(0);
        let result = match action.kind {
            ActionKind::SetCounter => operand,
            ActionKind::AddCounter => current.saturating_add(operand),
            ActionKind::SubtractCounter => current.saturating_sub(operand),
            ActionKind::MultiplyCounter => current.saturating_mul(operand),
            _ => current
                .checked_div(operand)
                .ok_or_else(|| malformed(action, "division by zero"))?,
        };
        self.state.variables.set_counter(name, result)
    }

    pub(super) fn exec_input_counter(
        &mut self,
        ui: &mut dyn Presentation,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing counter"))?;
        let prompt = self.expand(field(&fields, 1).unwrap_or(name), ctx.subject.as_ref());
        let default = match action.kind {
            ActionKind::ChangeCounter => self.counter_value(name, ctx.subject.as_ref()),
            _ => None,
        };
        if let Some(value) = ui.prompt_int(&prompt, default) {
            self.state.variables.set_counter(name, value)?;
        }
        Ok(())
    }

    pub(super) fn exec_random_counter(
        &mut self,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(3);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing counter"))?;
        let low = self.int_operand(action, field(&fields, 1), ctx.subject.as_ref())?;
        let high = self.int_operand(action, field(&fields, 2), ctx.subject.as_ref())?;
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let value = self.rng.random_range(low..=high);
        self.state.variables.set_counter(name, value)
    }

    // --- Strings ---

    pub(super) fn exec_set_string(
        &mut self,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing string"))?;
        let text = self.expand(fields.get(1).copied().unwrap_or_default(), ctx.subject.as_ref());
        self.state.variables.set_string(name, text)
    }

    pub(super) fn exec_input_string(
        &mut self,
        ui: &mut dyn Presentation,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing string"))?;
        let prompt = self.expand(field(&fields, 1).unwrap_or(name), ctx.subject.as_ref());
        let current = match action.kind {
            ActionKind::ChangeString | ActionKind::ChangeLongString => {
                self.string_value(name, ctx.subject.as_ref())
            }
            _ => None,
        };
        let answer = match action.kind {
            ActionKind::InputLongString | ActionKind::ChangeLongString => {
                ui.prompt_long_text(&prompt, current.as_deref())
            }
            _ => ui.prompt_text(&prompt, current.as_deref()),
        };
        if let Some(text) = answer {
            self.state.variables.set_string(name, text)?;
        }
        Ok(())
    }

    // --- Time values ---

    pub(super) fn exec_set_time(&mut self, action: &ScriptAction) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing time"))?;
        let value = self.time_operand(action, field(&fields, 1))?;
        self.state.variables.set_time(name, value)
    }

    pub(super) fn exec_input_time(
        &mut self,
        ui: &mut dyn Presentation,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing time"))?;
        let prompt = self.expand(field(&fields, 1).unwrap_or(name), ctx.subject.as_ref());
        let current = match action.kind {
            ActionKind::ChangeDate | ActionKind::ChangeTime | ActionKind::ChangeInterval => {
                self.time_value(name)
            }
            _ => None,
        };
        let answer = match action.kind {
            ActionKind::InputDate | ActionKind::ChangeDate => {
                let default = match current {
                    Some(TimeValue::DateTime(dt)) => Some(dt.date()),
                    _ => None,
                };
                ui.prompt_date(&prompt, default)
                    .map(|date| TimeValue::DateTime(date.and_time(NaiveTime::MIN)))
            }
            ActionKind::InputTime | ActionKind::ChangeTime => {
                let default = match current {
                    Some(TimeValue::TimeOfDay(t)) => Some(t),
                    Some(TimeValue::DateTime(dt)) => Some(dt.time()),
                    _ => None,
                };
                ui.prompt_time(&prompt, default).map(TimeValue::TimeOfDay)
            }
            _ => {
                let default = match current {
                    Some(TimeValue::Interval(secs)) => Some(secs),
                    _ => None,
                };
                ui.prompt_interval(&prompt, default).map(TimeValue::Interval)
            }
        };
        if let Some(value) = answer {
            self.state.variables.set_time(name, value)?;
        }
        Ok(())
    }

    pub(super) fn exec_shift_time(
        &mut self,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing time"))?;
        let current = self.stored_time(action, name)?;
        let secs = match action.kind {
            ActionKind::AddDays | ActionKind::SubtractDays => self
                .int_operand(action, field(&fields, 1), ctx.subject.as_ref())?
                .saturating_mul(SECS_PER_DAY),
            _ => self.interval_operand(action, field(&fields, 1))?,
        };
        let secs = match action.kind {
            ActionKind::SubtractTime | ActionKind::SubtractDays => secs.saturating_neg(),
            _ => secs,
        };
        let shifted = shift(current, secs).ok_or_else(|| malformed(action, "out of range"))?;
        self.state.variables.set_time(name, shifted)
    }

    pub(super) fn exec_round_time(&mut self, action: &ScriptAction) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing time"))?;
        let step = self.interval_operand(action, field(&fields, 1))?;
        if step <= 0 {
            return Err(malformed(action, "rounding interval must be positive"));
        }
        let current = self.stored_time(action, name)?;
        let secs = current.as_seconds();
        let half = step.checked_div(2).unwrap_or(0);
        let rounded = secs
            .checked_add(half)
            .and_then(|s| s.checked_div_euclid(step))
            .and_then(|q| q.checked_mul(step))
            .and_then(|s| with_seconds(current, s))
            .ok_or_else(|| malformed(action, "out of range"))?;
        self.state.variables.set_time(name, rounded)
    }

    pub(super) fn exec_random_time(&mut self, action: &ScriptAction) -> Result<(), EngineError> {
        let fields = action.fields(3);
        let name = field(&fields, 0).ok_or_else(|| malformed(action, "missing time"))?;
        let low = self.time_operand(action, field(&fields, 1))?;
        let high = self.time_operand(action, field(&fields, 2))?;
        if std::mem::discriminant(&low) != std::mem::discriminant(&high) {
            return Err(malformed(action, "bounds are different kinds of time"));
        }
        let (a, b) = (low.as_seconds(), high.as_seconds());
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        let secs = self.rng.random_range(a..=b);
        let value = with_seconds(low, secs).ok_or_else(|| malformed(action, "out of range"))?;
        self.state.variables.set_time(name, value)
    }

    pub(super) fn exec_extract_time(&mut self, action: &ScriptAction) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let counter = field(&fields, 0).ok_or_else(|| malformed(action, "missing counter"))?;
        let time = field(&fields, 1).ok_or_else(|| malformed(action, "missing time"))?;
        let secs = self.stored_time(action, time)?.as_seconds();
        let unit = match action.kind {
            ActionKind::ExtractDays => SECS_PER_DAY,
            ActionKind::ExtractHours => SECS_PER_HOUR,
            _ => SECS_PER_MINUTE,
        };
        let whole = secs.checked_div(unit).unwrap_or(0);
        self.state.variables.set_counter(counter, whole)
    }

    pub(super) fn exec_convert_time(
        &mut self,
        action: &ScriptAction,
        ctx: &CallContext,
    ) -> Result<(), EngineError> {
        let fields = action.fields(2);
        let time = field(&fields, 0).ok_or_else(|| malformed(action, "missing time"))?;
        let count = self.int_operand(action, field(&fields, 1), ctx.subject.as_ref())?;
        let unit = match action.kind {
            ActionKind::ConvertDays => SECS_PER_DAY,
            ActionKind::ConvertHours => SECS_PER_HOUR,
            _ => SECS_PER_MINUTE,
        };
        self.state
            .variables
            .set_time(time, TimeValue::Interval(count.saturating_mul(unit)))
    }
}
