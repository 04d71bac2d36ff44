//! Punishment selection.
//!
//! A severity becomes one or more concrete punishment instances:
//!
//! 1. clamp into the script's global bounds;
//! 2. pick a covering definition from a weighted pool, or split the
//!    severity into the largest coverable chunk plus the remainder;
//! 3. size each pick in units of the definition's `value`;
//! 4. offer the result for accept/decline, escalating on each decline;
//! 5. merge into accumulative instances or create new suffixed ones.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rand::Rng;
use regimen_types::{EventHandler, PunishmentDefinition, SelectMode, ValueUnit};
use tracing::{debug, info, warn};

use crate::assignment::offset;
use crate::error::EngineError;
use crate::interpreter::CallContext;
use crate::presentation::Presentation;
use crate::simulation::Simulation;
use crate::state::{Assignment, AssignmentKind};

/// Ask range used when the script leaves both bounds at zero.
const FALLBACK_ASK_RANGE: (u32, u32) = (25, 75);

/// What one call to [`Simulation::apply_punishment`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PunishmentOutcome {
    /// Severity offered at each round, before rounding.
    pub offered: Vec<f64>,
    /// Instances created or extended.
    pub applied: Vec<String>,
    /// Number of declines.
    pub declined: u32,
}

/// One planned punishment: a definition, the severity it absorbs and its
/// size in units.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pick {
    definition: String,
    severity: u32,
    units: u32,
}

/// Units needed to cover `severity` with `punishment`: `round(severity /
/// value)`, never below `min`. Without a value the count is `min`.
pub fn unit_count(punishment: &PunishmentDefinition, severity: u32) -> u32 {
    let floor = punishment.min.max(1);
    match punishment.value.filter(|v| *v > 0) {
        Some(value) => severity
            .saturating_add(value / 2)
            .checked_div(value)
            .unwrap_or(0)
            .max(floor),
        None => floor,
    }
}

/// Split `total` units into chunks of at most `max`.
pub fn split_units(total: u32, max: Option<u32>) -> Vec<u32> {
    let Some(max) = max.filter(|m| *m > 0) else {
        return vec![total];
    };
    let mut chunks = Vec::new();
    let mut left = total;
    while left > max {
        chunks.push(max);
        left = left.saturating_sub(max);
    }
    if left > 0 || chunks.is_empty() {
        chunks.push(left);
    }
    chunks
}

/// Share `severity` across `chunks` in proportion to their unit counts.
/// The shares always add up to `severity`.
pub fn split_severity(severity: u32, chunks: &[u32]) -> Vec<u32> {
    let total: u64 = chunks.iter().copied().map(u64::from).sum();
    if total == 0 {
        // Zero-unit chunks: spread evenly, earlier chunks take the remainder.
        let pieces = u32::try_from(chunks.len()).unwrap_or(u32::MAX).max(1);
        let (base, extra) = (severity / pieces, severity % pieces);
        return (0..pieces)
            .take(chunks.len())
            .map(|i| base.saturating_add(u32::from(i < extra)))
            .collect();
    }
    let mut covered: u64 = 0;
    let mut given: u64 = 0;
    chunks
        .iter()
        .map(|&units| {
            covered = covered.saturating_add(u64::from(units));
            let upto = u64::from(severity).saturating_mul(covered) / total;
            let share = upto.saturating_sub(given);
            given = upto;
            u32::try_from(share).unwrap_or(u32::MAX)
        })
        .collect()
}

/// Deadline for `amount` units of `punishment` assigned at `from`: the
/// respite if set, else `value * amount` in the value unit, else the
/// script's default respite.
pub fn punishment_deadline(
    punishment: &PunishmentDefinition,
    amount: u32,
    from: NaiveDateTime,
    default_respite: i64,
) -> NaiveDateTime {
    let secs = punishment.respite.unwrap_or_else(|| {
        punishment.value_unit.seconds().map_or(default_respite, |unit| {
            i64::from(punishment.value.unwrap_or(1))
                .saturating_mul(i64::from(amount))
                .saturating_mul(unit)
        })
    });
    offset(from, Some(secs)).unwrap_or(from)
}

/// Convert an escalated severity back to an integer within bounds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_severity(value: f64, min: u32, max: u32) -> u32 {
    if value.is_nan() || value <= f64::from(min) {
        min
    } else if value >= f64::from(max) {
        max
    } else {
        value.round() as u32
    }
}

fn describe(punishment: &PunishmentDefinition, units: u32) -> String {
    let value = punishment.value.unwrap_or(1).saturating_mul(units);
    match punishment.value_unit {
        ValueUnit::Once => format!("{} ({units}x)", punishment.title),
        ValueUnit::Minute => format!("{}: {value} minutes", punishment.title),
        ValueUnit::Hour => format!("{}: {value} hours", punishment.title),
        ValueUnit::Day => format!("{}: {value} days", punishment.title),
    }
}

impl Simulation {
    /// Punish with `severity`, optionally restricted to `group`.
    ///
    /// The user may decline up to `max_decline` times; each decline
    /// multiplies the severity by the configured factor. After the last
    /// allowed decline the punishment is shown without a choice.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnsatisfiableSeverity`] when no definition or split
    /// covers the severity; the user is told and nothing is applied.
    pub fn apply_punishment(
        &mut self,
        ui: &mut dyn Presentation,
        severity: u32,
        group: Option<&str>,
        message: Option<&str>,
    ) -> Result<PunishmentOutcome, EngineError> {
        let script = Arc::clone(&self.script);
        let general = &script.general;
        let (min, max) = (
            general.punishment_min,
            general.punishment_max.max(general.punishment_min),
        );
        let pool = self.weighted_pool(group);
        let factor = self.settings.decline_factor;

        let mut outcome = PunishmentOutcome::default();
        let mut current = f64::from(severity.clamp(min, max));
        let picks = loop {
            outcome.offered.push(current);
            let target = to_severity(current, min, max);
            let picks = match self.plan(&pool, target) {
                Ok(picks) => picks,
                Err(err) => {
                    warn!(severity = target, group = ?group, "No suitable punishment");
                    ui.show_message(&format!("No suitable punishment for severity {target}."));
                    return Err(err);
                }
            };

            let mut text: Vec<String> = message.map(str::to_owned).into_iter().collect();
            text.extend(picks.iter().filter_map(|pick| {
                script
                    .punishment(&pick.definition)
                    .map(|p| describe(p, pick.units))
            }));
            let text = text.join("\n");

            if outcome.declined >= general.max_decline {
                ui.show_message(&text);
                break picks;
            }
            if ui.confirm(&format!("{text}\nAccept?")) {
                break picks;
            }
            outcome.declined = outcome.declined.saturating_add(1);
            current *= factor;
            debug!(declined = outcome.declined, severity = current, "Punishment declined");
        };

        for pick in picks {
            let Some(punishment) = script.punishment(&pick.definition) else {
                continue;
            };
            let chunks = split_units(pick.units, punishment.max);
            let shares = split_severity(pick.severity, &chunks);
            for (units, share) in chunks.into_iter().zip(shares) {
                let instance = self.add_punishment_to_assignments(&pick.definition, units, share)?;
                info!(
                    punishment = %pick.definition,
                    instance = %instance,
                    units,
                    severity = share,
                    "Punishment given"
                );
                self.state.daily.punishments_given.push(pick.definition.clone());
                let subject = self
                    .state
                    .assignments
                    .get(&instance)
                    .map(|a| a.subject(&instance));
                let mut ctx = subject.map_or_else(CallContext::new, CallContext::with_subject);
                self.run_actions(ui, &punishment.actions, SelectMode::All, &mut ctx);
                self.run_hook(ui, EventHandler::PunishmentGiven);
                outcome.applied.push(instance);
            }
        }
        Ok(outcome)
    }

    /// The user asks to be punished: roll a severity in the ask range.
    pub fn request_punishment(
        &mut self,
        ui: &mut dyn Presentation,
    ) -> Result<PunishmentOutcome, EngineError> {
        let general = &self.script.general;
        let (low, high) = match (general.punishment_ask_min, general.punishment_ask_max) {
            (0, 0) => FALLBACK_ASK_RANGE,
            (a, b) => (a.min(b), a.max(b)),
        };
        let severity = self.rng.random_range(low..=high);
        debug!(severity, "Punishment requested");
        self.apply_punishment(ui, severity, None, None)
    }

    /// Merge `amount` units into an accumulative instance with room, or
    /// create a new instance. Returns the instance name.
    pub fn add_punishment_to_assignments(
        &mut self,
        name: &str,
        amount: u32,
        severity: u32,
    ) -> Result<String, EngineError> {
        let key = name.trim().to_lowercase();
        let script = Arc::clone(&self.script);
        let general = &script.general;
        let punishment = script
            .punishment(&key)
            .ok_or_else(|| EngineError::not_found("punishment", &key))?;
        let expire_after = punishment.expire.after.or(general.expire_after);

        if punishment.accumulative {
            for instance in self.state.instances_of(AssignmentKind::Punishment, &key) {
                let Some(existing) = self.state.assignments.get_mut(&instance) else {
                    continue;
                };
                let total = existing.amount.saturating_add(amount);
                if punishment.max.is_some_and(|max| total > max) {
                    continue;
                }
                existing.amount = total;
                existing.severity = existing.severity.saturating_add(severity);
                existing.deadline = punishment_deadline(
                    punishment,
                    total,
                    existing.assigned_at,
                    general.default_respite,
                );
                existing.expiry = offset(existing.deadline, expire_after);
                debug!(instance = %instance, amount = total, "Punishment accumulated");
                return Ok(instance);
            }
        }

        let now = self.now();
        let instance = self.state.next_instance_name(&key);
        let deadline = punishment_deadline(punishment, amount, now, general.default_respite);
        self.state.insert_assignment(
            instance.clone(),
            Assignment {
                kind: AssignmentKind::Punishment,
                definition: key,
                title: punishment.title.clone(),
                assigned_at: now,
                deadline,
                expiry: offset(deadline, expire_after),
                remind_interval: punishment
                    .remind
                    .interval
                    .unwrap_or(general.remind_interval),
                next_reminder: None,
                late: false,
                late_refund: None,
                amount,
                severity,
                started_at: None,
            },
        );
        Ok(instance)
    }

    /// Candidate definitions with their rolled weights. Weights are rolled
    /// once per call; a zero weight drops the definition.
    fn weighted_pool(&mut self, group: Option<&str>) -> Vec<(String, u32)> {
        let script = Arc::clone(&self.script);
        let mut pool = Vec::new();
        for (name, punishment) in &script.punishments {
            let in_scope = match group {
                Some(group) => punishment.in_group(group),
                None => !punishment.group_only,
            };
            if !in_scope || self.check_eligibility(&punishment.eligibility).is_err() {
                continue;
            }
            let low = punishment.weight_min.min(punishment.weight_max);
            let high = punishment.weight_min.max(punishment.weight_max);
            let weight = self.rng.random_range(low..=high);
            if weight > 0 {
                pool.push((name.clone(), weight));
            }
        }
        pool
    }

    /// Weighted uniform pick among pool entries covering `severity`.
    fn pick_covering(&mut self, pool: &[(String, u32)], severity: u32) -> Option<String> {
        let slots: Vec<&String> = pool
            .iter()
            .filter(|(name, _)| {
                self.script
                    .punishment(name)
                    .is_some_and(|p| p.covers(severity))
            })
            .flat_map(|(name, weight)| {
                std::iter::repeat_n(name, usize::try_from(*weight).unwrap_or(0))
            })
            .collect();
        if slots.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..slots.len());
        slots.get(index).map(|name| (*name).clone())
    }

    /// Cover `severity` with as few splits as possible: a direct pick if
    /// one exists, else the largest coverable chunk below the remainder,
    /// repeated until nothing is left.
    fn plan(&mut self, pool: &[(String, u32)], severity: u32) -> Result<Vec<Pick>, EngineError> {
        let script = Arc::clone(&self.script);
        let mut picks = Vec::new();
        let mut remaining = severity;
        loop {
            let (chunk, definition) = match self.pick_covering(pool, remaining) {
                Some(definition) => (remaining, definition),
                None => {
                    let below = remaining.saturating_sub(1);
                    let chunk = pool
                        .iter()
                        .filter_map(|(name, _)| {
                            let p = script.punishment(name)?;
                            let c = p.severity_max.min(below);
                            (c >= 1 && c >= p.severity_min).then_some(c)
                        })
                        .max()
                        .ok_or(EngineError::UnsatisfiableSeverity { severity })?;
                    let definition = self
                        .pick_covering(pool, chunk)
                        .ok_or(EngineError::UnsatisfiableSeverity { severity })?;
                    (chunk, definition)
                }
            };
            let units = script
                .punishment(&definition)
                .map_or(1, |p| unit_count(p, chunk));
            picks.push(Pick {
                definition,
                severity: chunk,
                units,
            });
            remaining = remaining.saturating_sub(chunk);
            if remaining == 0 {
                return Ok(picks);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::NaiveDate;
    use regimen_types::Script;

    use super::*;
    use crate::config::EngineSettings;
    use crate::presentation::ScriptedPresentation;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn simulation(yaml: &str) -> Simulation {
        let settings = EngineSettings {
            seed: Some(7),
            ..EngineSettings::default()
        };
        Simulation::new(Arc::new(Script::from_yaml(yaml).unwrap()), settings, start())
    }

    fn definition(yaml: &str) -> PunishmentDefinition {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn units_round_and_floor_at_min() {
        let corner = definition("value: 5\nvalue_unit: Minute\nmin: 1");
        assert_eq!(unit_count(&corner, 17), 3);
        assert_eq!(unit_count(&corner, 18), 4);
        assert_eq!(unit_count(&corner, 1), 1);
        let spanking = definition("min: 4");
        assert_eq!(unit_count(&spanking, 100), 4);
    }

    #[test]
    fn units_split_at_max() {
        assert_eq!(split_units(7, Some(3)), vec![3, 3, 1]);
        assert_eq!(split_units(6, Some(3)), vec![3, 3]);
        assert_eq!(split_units(7, None), vec![7]);
    }

    #[test]
    fn severity_shares_follow_chunk_sizes() {
        assert_eq!(split_severity(17, &[3, 3, 3]), vec![5, 6, 6]);
        assert_eq!(split_severity(14, &[3, 3, 1]), vec![6, 6, 2]);
        assert_eq!(split_severity(10, &[4]), vec![10]);
        assert_eq!(split_severity(5, &[0, 0]), vec![3, 2]);
    }

    #[test]
    fn split_punishment_keeps_full_severity() {
        let mut sim = simulation(
            r"
statuses:
  Home: {}
punishments:
  Corner:
    value: 5
    value_unit: Minute
    max: 3
",
        );
        let mut ui = ScriptedPresentation::new();
        let outcome = sim.apply_punishment(&mut ui, 35, None, None).unwrap();
        assert_eq!(outcome.applied, ["corner", "corner_2", "corner_3"]);
        let severities: Vec<u32> = outcome
            .applied
            .iter()
            .map(|i| sim.state.assignments[i].severity)
            .collect();
        assert_eq!(severities.iter().sum::<u32>(), 35);
        assert_eq!(severities.last(), Some(&5));
    }

    #[test]
    fn deadline_follows_unit_or_respite() {
        let corner = definition("value: 5\nvalue_unit: Minute");
        assert_eq!(
            punishment_deadline(&corner, 3, start(), 86_400),
            start() + chrono::TimeDelta::try_minutes(15).unwrap()
        );
        let lines = definition("value_unit: Once");
        assert_eq!(
            punishment_deadline(&lines, 3, start(), 3_600),
            start() + chrono::TimeDelta::try_hours(1).unwrap()
        );
        let fixed = definition("value: 5\nvalue_unit: Hour\nrespite: 60");
        assert_eq!(
            punishment_deadline(&fixed, 3, start(), 3_600),
            start() + chrono::TimeDelta::try_minutes(1).unwrap()
        );
    }

    #[test]
    fn severity_is_decomposed_into_covered_chunks() {
        let mut sim = simulation(
            r"
statuses:
  Home: {}
punishments:
  Corner:
    severity_min: 1
    severity_max: 10
    value: 1
  Lines:
    severity_min: 1
    severity_max: 10
    value: 1
",
        );
        let mut ui = ScriptedPresentation::new();
        let outcome = sim.apply_punishment(&mut ui, 15, None, None).unwrap();
        assert_eq!(outcome.applied.len(), 2);
        let severities: Vec<u32> = outcome
            .applied
            .iter()
            .map(|i| sim.state.assignments[i].severity)
            .collect();
        assert_eq!(severities.iter().sum::<u32>(), 15);
        assert!(severities.iter().all(|s| (1..=10).contains(s)));
    }

    #[test]
    fn uncoverable_severity_is_reported() {
        let mut sim = simulation(
            r"
statuses:
  Home: {}
punishments:
  Big:
    severity_min: 20
    severity_max: 30
",
        );
        let mut ui = ScriptedPresentation::new();
        let result = sim.apply_punishment(&mut ui, 5, None, None);
        assert_eq!(result, Err(EngineError::UnsatisfiableSeverity { severity: 5 }));
        assert!(ui.saw("No suitable punishment"));
        assert!(sim.state.assignments.is_empty());
    }

    #[test]
    fn declines_escalate_then_force_acceptance() {
        let mut sim = simulation(
            r"
general:
  max_decline: 3
statuses:
  Home: {}
punishments:
  Corner:
    value: 10
    value_unit: Minute
",
        );
        let mut ui = ScriptedPresentation::new();
        ui.confirm_default = false;
        let outcome = sim.apply_punishment(&mut ui, 100, None, None).unwrap();
        assert_eq!(outcome.declined, 3);
        let expected = [100.0, 120.0, 144.0, 172.8];
        assert_eq!(outcome.offered.len(), expected.len());
        for (got, want) in outcome.offered.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert_eq!(sim.state.assignments["corner"].amount, 17);
        assert_eq!(ui.prompts.len(), 3);
    }

    #[test]
    fn accumulative_instances_merge_until_max() {
        let mut sim = simulation(
            r"
statuses:
  Home: {}
punishments:
  Corner:
    value: 5
    value_unit: Minute
    accumulative: true
    max: 5
",
        );
        let mut ui = ScriptedPresentation::new();
        sim.apply_punishment(&mut ui, 10, None, None).unwrap();
        sim.apply_punishment(&mut ui, 10, None, None).unwrap();
        assert_eq!(sim.state.assignments["corner"].amount, 4);
        assert_eq!(sim.state.assignments["corner"].severity, 20);
        sim.apply_punishment(&mut ui, 10, None, None).unwrap();
        assert_eq!(sim.state.assignments["corner_2"].amount, 2);
    }

    #[test]
    fn separate_instances_get_suffixes() {
        let mut sim = simulation(
            r"
statuses:
  Home: {}
punishments:
  Lines:
    value: 10
",
        );
        let mut ui = ScriptedPresentation::new();
        sim.apply_punishment(&mut ui, 10, None, None).unwrap();
        sim.apply_punishment(&mut ui, 10, None, None).unwrap();
        sim.apply_punishment(&mut ui, 10, None, None).unwrap();
        let names: Vec<&String> = sim.state.assignments.keys().collect();
        assert_eq!(names, ["lines", "lines_2", "lines_3"]);
    }

    #[test]
    fn groups_and_weights_filter_the_pool() {
        let mut sim = simulation(
            r"
statuses:
  Home: {}
punishments:
  Special:
    group_only: true
    groups: [Rude]
  Never:
    weight_min: 0
    weight_max: 0
  Normal: {}
event_handlers:
  PunishmentGiven: Count
procedures:
  Count:
    actions:
      - kind: AddCounter
        value: '#given,1'
",
        );
        let mut ui = ScriptedPresentation::new();
        for _ in 0..5 {
            let outcome = sim.apply_punishment(&mut ui, 10, None, None).unwrap();
            assert!(outcome.applied[0].starts_with("normal"));
        }
        let outcome = sim.apply_punishment(&mut ui, 10, Some("rude"), None).unwrap();
        assert_eq!(outcome.applied, ["special"]);
        assert_eq!(sim.state.variables.counter("given"), Some(6));
        assert_eq!(sim.state.daily.punishments_given.len(), 6);
    }

    #[test]
    fn requested_punishment_stays_in_ask_range() {
        let mut sim = simulation(
            r"
general:
  punishment_ask_min: 30
  punishment_ask_max: 40
statuses:
  Home: {}
punishments:
  Corner:
    value: 1
",
        );
        let mut ui = ScriptedPresentation::new();
        let outcome = sim.request_punishment(&mut ui).unwrap();
        assert!((30.0..=40.0).contains(&outcome.offered[0]));
    }
}
