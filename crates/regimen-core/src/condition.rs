//! Condition evaluation.
//!
//! Script conditions come in three shapes:
//!
//! - a bare flag test: `Grounded` or `#Grounded`
//! - a negated flag test: `!Grounded` or `not Grounded`
//! - a comparison: `#counter OP value`, `$string OP value` or
//!   `!time OP value`, where OP is one of `= == <> != > < >= <=`
//!
//! Eligibility lists are OR-of-AND groups of such conditions.

use std::cmp::Ordering;

use regimen_types::{Eligibility, TimeValue};
use tracing::warn;

use crate::interpreter::Subject;
use crate::simulation::Simulation;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=` or `==`
    Eq,
    /// `<>` or `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl CompareOp {
    /// Whether `ordering` (lhs compared to rhs) satisfies the operator.
    pub const fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Ne => !matches!(ordering, Ordering::Equal),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Ge => !matches!(ordering, Ordering::Less),
            Self::Le => !matches!(ordering, Ordering::Greater),
        }
    }
}

/// Two-character operators are matched before their one-character
/// prefixes at the same position.
const OPERATORS: [(&str, CompareOp); 8] = [
    (">=", CompareOp::Ge),
    ("<=", CompareOp::Le),
    ("<>", CompareOp::Ne),
    ("!=", CompareOp::Ne),
    ("==", CompareOp::Eq),
    ("=", CompareOp::Eq),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
];

/// A parsed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Flag test.
    Flag {
        /// Flag name, as written (sigil stripped).
        name: String,
        /// Whether the test is negated.
        negated: bool,
    },
    /// Variable comparison.
    Compare {
        /// Left operand including its sigil.
        lhs: String,
        /// Operator.
        op: CompareOp,
        /// Right operand, unquoted.
        rhs: String,
    },
}

/// Parse a condition expression. Returns `None` for an empty expression.
pub fn parse_condition(expression: &str) -> Option<Condition> {
    let expression = expression.trim();
    if expression.is_empty() {
        return None;
    }

    if let Some((at, symbol, op)) = find_operator(expression) {
        let (lhs, rest) = expression.split_at(at);
        let rhs = rest.get(symbol.len()..).unwrap_or_default().trim();
        let lhs = lhs.trim();
        if !lhs.is_empty() {
            return Some(Condition::Compare {
                lhs: lhs.to_owned(),
                op,
                rhs: unquote(rhs).to_owned(),
            });
        }
    }

    let (name, negated) = if let Some(rest) = expression.strip_prefix('!') {
        (rest, true)
    } else if let Some(rest) = strip_keyword(expression, "not") {
        (rest, true)
    } else {
        (expression, false)
    };
    let name = name.trim();
    let name = name.strip_prefix('#').unwrap_or(name).trim();
    if name.is_empty() {
        return None;
    }
    Some(Condition::Flag {
        name: name.to_owned(),
        negated,
    })
}

fn find_operator(expression: &str) -> Option<(usize, &'static str, CompareOp)> {
    expression.char_indices().find_map(|(at, _)| {
        let tail = expression.get(at..)?;
        OPERATORS
            .iter()
            .find(|(symbol, _)| tail.starts_with(symbol))
            .map(|&(symbol, op)| (at, symbol, op))
    })
}

fn strip_keyword<'a>(expression: &'a str, keyword: &str) -> Option<&'a str> {
    let head = expression.get(..keyword.len())?;
    let rest = expression.get(keyword.len()..)?;
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

impl Simulation {
    /// Evaluate a condition expression. Malformed expressions are false.
    pub fn evaluate(&self, expression: &str, subject: Option<&Subject>) -> bool {
        match parse_condition(expression) {
            Some(Condition::Flag { name, negated }) => self.is_flag_active(&name) != negated,
            Some(Condition::Compare { lhs, op, rhs }) => {
                match self.compare(&lhs, &rhs, subject) {
                    Some(ordering) => op.holds(ordering),
                    None => {
                        warn!(expression, "Condition operands cannot be compared");
                        false
                    }
                }
            }
            None => {
                warn!(expression, "Empty condition");
                false
            }
        }
    }

    /// Whether a flag counts as set, including the predefined merit flags.
    pub fn is_flag_active(&self, name: &str) -> bool {
        let key = name.trim().trim_start_matches('#').to_lowercase();
        let general = &self.script.general;
        match key.as_str() {
            "zzlowmerits" => general.low_merits.is_some_and(|low| self.state.merits < low),
            "zzhighmerits" => general
                .high_merits
                .is_some_and(|high| self.state.merits > high),
            _ => self.state.is_flag_set(&key, self.now()),
        }
    }

    fn compare(&self, lhs: &str, rhs: &str, subject: Option<&Subject>) -> Option<Ordering> {
        if lhs.starts_with('$') {
            let left = self.string_value(lhs, subject).unwrap_or_default();
            let right = if rhs.starts_with('$') {
                self.string_value(rhs, subject).unwrap_or_default()
            } else {
                rhs.to_owned()
            };
            return Some(left.to_lowercase().cmp(&right.to_lowercase()));
        }
        if lhs.starts_with('!') {
            let left = self.time_value(lhs)?;
            let right = if rhs.starts_with('!') {
                self.time_value(rhs)?
            } else {
                TimeValue::parse(rhs)?
            };
            return Some(left.as_seconds().cmp(&right.as_seconds()));
        }
        let left = self.counter_value(lhs, subject).unwrap_or(0);
        let right = if rhs.starts_with('#') {
            self.counter_value(rhs, subject).unwrap_or(0)
        } else {
            rhs.parse::<i64>().ok()?
        };
        Some(left.cmp(&right))
    }

    /// Whether every condition in `group` holds.
    pub fn group_satisfied(&self, group: &[String]) -> bool {
        group.iter().all(|condition| self.evaluate(condition, None))
    }

    /// OR over groups. An empty list imposes no requirement.
    pub fn any_group_satisfied(&self, groups: &[Vec<String>]) -> bool {
        groups.is_empty() || groups.iter().any(|group| self.group_satisfied(group))
    }

    /// True when no group is fully satisfied.
    pub fn no_group_satisfied(&self, groups: &[Vec<String>]) -> bool {
        !groups.iter().any(|group| self.group_satisfied(group))
    }

    /// Check declarative eligibility. The error names the failed
    /// constraint.
    pub fn check_eligibility(&self, eligibility: &Eligibility) -> Result<(), String> {
        if !eligibility.status_allows(&self.state.status) {
            return Err(format!("not allowed in status {}", self.state.status));
        }
        if !eligibility.time_allows(self.clock.time()) {
            return Err("not allowed at this time".to_owned());
        }
        if !self.any_group_satisfied(&eligibility.if_flags) {
            return Err("required flags not set".to_owned());
        }
        if !self.no_group_satisfied(&eligibility.not_if_flags) {
            return Err("forbidding flags set".to_owned());
        }
        let chosen_ok = eligibility.if_chosen.is_empty()
            || eligibility.if_chosen.iter().any(|group| {
                group
                    .iter()
                    .all(|name| self.state.chosen.contains(&name.to_lowercase()))
            });
        if !chosen_ok {
            return Err("required answers not chosen".to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime};
    use regimen_types::{Script, TimeWindow};

    use super::*;
    use crate::config::EngineSettings;

    fn simulation() -> Simulation {
        let script = Script::from_yaml(
            "general:\n  low_merits: 100\n  high_merits: 800\nstatuses:\n  Home: {}\n  Away: {}\n",
        )
        .unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Simulation::new(Arc::new(script), EngineSettings::default(), start)
    }

    fn set(sim: &mut Simulation, flag: &str) {
        let now = sim.now();
        sim.state.set_flag(flag, now, None, String::new(), Vec::new());
    }

    #[test]
    fn parses_shapes() {
        assert_eq!(
            parse_condition("#Grounded"),
            Some(Condition::Flag {
                name: "Grounded".to_owned(),
                negated: false
            })
        );
        assert_eq!(
            parse_condition("not Grounded"),
            Some(Condition::Flag {
                name: "Grounded".to_owned(),
                negated: true
            })
        );
        assert_eq!(
            parse_condition("#laps >= 10"),
            Some(Condition::Compare {
                lhs: "#laps".to_owned(),
                op: CompareOp::Ge,
                rhs: "10".to_owned()
            })
        );
        assert_eq!(
            parse_condition("$mood<>\"happy\""),
            Some(Condition::Compare {
                lhs: "$mood".to_owned(),
                op: CompareOp::Ne,
                rhs: "happy".to_owned()
            })
        );
        assert_eq!(parse_condition("   "), None);
    }

    #[test]
    fn notable_is_a_flag_not_a_negation() {
        assert_eq!(
            parse_condition("notable"),
            Some(Condition::Flag {
                name: "notable".to_owned(),
                negated: false
            })
        );
    }

    #[test]
    fn flag_tests() {
        let mut sim = simulation();
        assert!(!sim.evaluate("Grounded", None));
        assert!(sim.evaluate("!Grounded", None));
        set(&mut sim, "grounded");
        assert!(sim.evaluate("#GROUNDED", None));
        assert!(!sim.evaluate("not grounded", None));
    }

    #[test]
    fn counter_comparisons() {
        let mut sim = simulation();
        sim.state.variables.set_counter("laps", 7).unwrap();
        sim.state.variables.set_counter("goal", 10).unwrap();
        assert!(sim.evaluate("#laps < #goal", None));
        assert!(sim.evaluate("#laps=7", None));
        assert!(sim.evaluate("#laps != 8", None));
        assert!(sim.evaluate("#missing = 0", None));
        assert!(!sim.evaluate("#laps > seven", None));
        assert!(sim.evaluate("#zzMerits >= 500", None));
    }

    #[test]
    fn string_comparison_ignores_case() {
        let mut sim = simulation();
        sim.state
            .variables
            .set_string("mood", "Happy".to_owned())
            .unwrap();
        assert!(sim.evaluate("$mood == happy", None));
        assert!(sim.evaluate("$mood > apple", None));
    }

    #[test]
    fn merit_threshold_flags() {
        let mut sim = simulation();
        assert!(!sim.evaluate("zzLowMerits", None));
        sim.state.merits = 50;
        assert!(sim.evaluate("zzLowMerits", None));
        sim.state.merits = 900;
        assert!(sim.evaluate("zzHighMerits", None));
    }

    #[test]
    fn grouped_lists() {
        let mut sim = simulation();
        set(&mut sim, "a");
        set(&mut sim, "b");
        let groups = vec![
            vec!["a".to_owned(), "c".to_owned()],
            vec!["a".to_owned(), "b".to_owned()],
        ];
        assert!(sim.any_group_satisfied(&groups));
        assert!(!sim.no_group_satisfied(&groups));
        assert!(sim.any_group_satisfied(&[]));
        assert!(sim.no_group_satisfied(&[]));
    }

    #[test]
    fn eligibility_checks_each_constraint() {
        let mut sim = simulation();
        assert_eq!(sim.state.status, "home");
        let mut eligibility = Eligibility {
            pre_status: vec!["Away".to_owned()],
            ..Eligibility::default()
        };
        assert!(sim.check_eligibility(&eligibility).is_err());
        eligibility.pre_status = vec!["HOME".to_owned()];
        assert!(sim.check_eligibility(&eligibility).is_ok());

        eligibility.forbidden_windows = vec![TimeWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        )];
        assert!(sim.check_eligibility(&eligibility).is_err());
        eligibility.forbidden_windows.clear();

        eligibility.if_chosen = vec![vec!["yes".to_owned()]];
        assert!(sim.check_eligibility(&eligibility).is_err());
        sim.state.chosen.insert("yes".to_owned());
        assert!(sim.check_eligibility(&eligibility).is_ok());

        eligibility.not_if_flags = vec![vec!["busy".to_owned()]];
        set(&mut sim, "busy");
        assert!(sim.check_eligibility(&eligibility).is_err());
    }
}
