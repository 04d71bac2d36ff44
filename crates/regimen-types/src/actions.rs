//! The closed action instruction set executed by the interpreter.
//!
//! Every procedure, permission, confession, report, timer and status entry
//! carries an ordered list of [`ScriptAction`]s. The action kind is a
//! fieldless enum so the interpreter can dispatch with an exhaustive
//! `match`; the `value` payload stays a raw string whose comma-delimited
//! sub-fields are parsed by the handler for that kind.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// The kind of a script action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    // --- Flow control ---
    /// Continue only if the condition holds.
    If,
    /// Continue only if the condition does not hold.
    NotIf,
    /// Run a named procedure.
    ProcedureCall,

    // --- Flags ---
    /// Set a flag, optionally with a duration and text.
    SetFlag,
    /// Remove a flag.
    RemoveFlag,

    // --- Merits ---
    /// Add merits.
    AddMerit,
    /// Subtract merits.
    SubtractMerit,
    /// Set merits to an absolute value.
    SetMerit,

    // --- Counters (`#name`) ---
    /// `#c,operand`
    SetCounter,
    /// `#c,operand`
    AddCounter,
    /// `#c,operand`
    SubtractCounter,
    /// `#c,operand`
    MultiplyCounter,
    /// `#c,operand`
    DivideCounter,
    /// Prompt for a fresh integer.
    InputCounter,
    /// Prompt for an integer, defaulting to the current value.
    ChangeCounter,
    /// `#c,min,max`
    RandomCounter,
    /// Delete a counter.
    DropCounter,

    // --- Strings (`$name`) ---
    /// `$s,text`
    SetString,
    /// Prompt for a single-line string.
    InputString,
    /// Prompt for a multi-line string.
    InputLongString,
    /// Prompt for a single-line string, defaulting to the current value.
    ChangeString,
    /// Prompt for a multi-line string, defaulting to the current value.
    ChangeLongString,
    /// Delete a string.
    DropString,

    // --- Time values (`!name`) ---
    /// `!t,literal|!other|now|today`
    SetTime,
    /// Prompt for a date.
    InputDate,
    /// Prompt for a time of day.
    InputTime,
    /// Prompt for an interval.
    InputInterval,
    /// Prompt for a date, defaulting to the current value.
    ChangeDate,
    /// Prompt for a time of day, defaulting to the current value.
    ChangeTime,
    /// Prompt for an interval, defaulting to the current value.
    ChangeInterval,
    /// `!t,interval|!other`
    AddTime,
    /// `!t,interval|!other`
    SubtractTime,
    /// `!t,n|#c`
    AddDays,
    /// `!t,n|#c`
    SubtractDays,
    /// `!t,interval` -- round to the nearest multiple.
    RoundTime,
    /// `!t,low,high`
    RandomTime,
    /// `#c,!t` -- whole days.
    ExtractDays,
    /// `#c,!t` -- whole hours.
    ExtractHours,
    /// `#c,!t` -- whole minutes.
    ExtractMinutes,
    /// `!t,#c` -- days into an interval.
    ConvertDays,
    /// `!t,#c` -- hours into an interval.
    ConvertHours,
    /// `!t,#c` -- minutes into an interval.
    ConvertMinutes,
    /// Delete a time value.
    DropTime,

    // --- Status ---
    /// Enter a status (sub or primary per its definition).
    NewStatus,
    /// Enter a status as a sub-status.
    NewSubStatus,
    /// Return to the previous status.
    ReturnStatus,

    // --- Assignments ---
    /// Mark an assignment instance done.
    MarkDone,
    /// Abort an assignment instance (runs its abort procedure).
    Abort,
    /// Remove an assignment instance silently.
    Delete,
    /// Assign and announce a job.
    AnnounceJob,

    // --- Interaction ---
    /// Show a message.
    Message,
    /// Ask a defined question.
    Question,
    /// `key,prompt` -- free-text answer stored under `key`.
    Input,
    /// `severity|#c[,group[,message]]`
    Punish,
    /// Ask the user to describe their outfit.
    ClothReport,
    /// Clear the recorded outfit.
    ClearCloth,
    /// Set the required clothing.
    Clothing,
    /// Show a named instruction set.
    Instructions,
    /// Capture a photo.
    PointCamera,
    /// Show a pose prompt, then capture a photo.
    PoseCamera,
    /// Play a sound file.
    Sound,

    // --- Timers ---
    /// Activate a named timer.
    Timer,
}

impl ActionKind {
    /// Whether this kind takes part in control flow rather than being
    /// dispatched to a handler.
    pub const fn is_control(self) -> bool {
        matches!(self, Self::If | Self::NotIf | Self::ProcedureCall)
    }
}

// ---------------------------------------------------------------------------
// ScriptAction
// ---------------------------------------------------------------------------

/// One tagged instruction with its raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptAction {
    /// What to do.
    pub kind: ActionKind,
    /// Action-specific payload. Empty for kinds that take none.
    #[serde(default)]
    pub value: String,
}

impl ScriptAction {
    /// Build an action from a kind and payload.
    pub fn new(kind: ActionKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Split the payload on commas into at most `parts` trimmed fields.
    ///
    /// The final field keeps any further commas, so free text in the last
    /// position survives intact.
    pub fn fields(&self, parts: usize) -> Vec<&str> {
        self.value.splitn(parts, ',').map(str::trim).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_trailing_commas_in_last_part() {
        let action = ScriptAction::new(ActionKind::SetString, "$greeting, Hello, world");
        assert_eq!(action.fields(2), vec!["$greeting", "Hello, world"]);
    }

    #[test]
    fn deserializes_from_yaml_mapping() {
        let action: ScriptAction = serde_yml::from_str("kind: AddMerit\nvalue: \"5\"\n").unwrap();
        assert_eq!(action.kind, ActionKind::AddMerit);
        assert_eq!(action.value, "5");
    }

    #[test]
    fn missing_value_defaults_to_empty() {
        let action: ScriptAction = serde_json::from_str(r#"{"kind":"ReturnStatus"}"#).unwrap();
        assert!(action.value.is_empty());
    }

    #[test]
    fn control_kinds() {
        assert!(ActionKind::If.is_control());
        assert!(ActionKind::ProcedureCall.is_control());
        assert!(!ActionKind::SetFlag.is_control());
    }
}
