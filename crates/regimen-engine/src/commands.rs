//! Console commands.
//!
//! One line of input is one command. Runtime errors are shown to the user
//! and never end the session.

use regimen_core::{Denial, PermissionAnswer, Presentation, Simulation, StatusMenu};

/// Help text shown by `help`.
const HELP: &str = "\
Commands:
  status                 current status, merits and time
  list                   active jobs and punishments
  menu                   permissions, confessions and reports
  done <instance>        mark a job or punishment done
  start <instance>       start long-running work
  abort <instance>       abort work
  ask <permission>       ask for a permission
  confess <name>         make a confession
  report <name>          make a report
  punish                 ask for a punishment
  clothes                report what you are wearing
  signin                 sign in
  instructions <name>    show instructions
  ff <d> <h> <m> <s>     fast-forward the simulated clock
  save                   save the session now
  quit                   save and exit";

/// What the tick loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep running.
    Continue,
    /// Save the session, then keep running.
    Save,
    /// Save and exit.
    Quit,
}

/// Execute one command line.
pub fn execute(sim: &mut Simulation, ui: &mut dyn Presentation, line: &str) -> Flow {
    let line = line.trim();
    let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
    let argument = argument.trim();

    let result = match command.to_lowercase().as_str() {
        "" => Ok(()),
        "help" | "?" => {
            ui.show_message(HELP);
            Ok(())
        }
        "status" => {
            show_status(sim, ui);
            Ok(())
        }
        "list" => {
            show_assignments(sim, ui);
            Ok(())
        }
        "menu" => {
            show_menu(sim, ui);
            Ok(())
        }
        "done" => sim.mark_done(ui, argument),
        "start" => sim.start_assignment(ui, argument),
        "abort" => sim.abort_assignment(ui, argument),
        "ask" => sim.ask_permission(ui, argument).map(|answer| {
            ui.show_message(&describe_answer(answer));
        }),
        "confess" => sim.confess(ui, argument),
        "report" => sim.report(ui, argument),
        "punish" => sim.request_punishment(ui).map(|_| ()),
        "clothes" => {
            sim.cloth_report(ui);
            Ok(())
        }
        "signin" => {
            sim.sign_in(ui);
            Ok(())
        }
        "instructions" => sim.show_instructions(ui, argument),
        "ff" => {
            fast_forward(sim, ui, argument);
            Ok(())
        }
        "save" => return Flow::Save,
        "quit" | "exit" => return Flow::Quit,
        other => {
            ui.show_message(&format!("Unknown command '{other}'. Type 'help'."));
            Ok(())
        }
    };
    if let Err(err) = result {
        ui.show_message(&err.to_string());
    }
    Flow::Continue
}

fn describe_answer(answer: PermissionAnswer) -> String {
    match answer {
        PermissionAnswer::Granted => "Permission granted.".to_owned(),
        PermissionAnswer::Denied(Denial::Locked { until }) => {
            format!("Denied. Ask again after {}.", until.format("%Y-%m-%d %H:%M"))
        }
        PermissionAnswer::Denied(Denial::DailyLimit) => "Denied. Not again today.".to_owned(),
        PermissionAnswer::Denied(Denial::TooFewMerits) => {
            "Denied. You have not earned it.".to_owned()
        }
        PermissionAnswer::Denied(Denial::Chance) => "Denied.".to_owned(),
    }
}

fn show_status(sim: &Simulation, ui: &mut dyn Presentation) {
    let status = sim.expand("{zzStatus}", None);
    let mut text = format!(
        "{}\nStatus: {status}\nMerits: {}\nActive: {}",
        sim.now().format("%A %Y-%m-%d %H:%M"),
        sim.state.merits,
        sim.state.assignments.len(),
    );
    if let Some(clothing) = &sim.state.required_clothing {
        text.push_str(&format!("\nClothing: {clothing}"));
    }
    ui.show_message(&text);
}

fn show_assignments(sim: &Simulation, ui: &mut dyn Presentation) {
    if sim.state.assignments.is_empty() {
        ui.show_message("Nothing to do.");
        return;
    }
    let lines: Vec<String> = sim
        .state
        .assignments
        .iter()
        .map(|(instance, a)| {
            let mut line = format!(
                "{instance:<16} {:<10} {} due {}",
                a.kind.as_str(),
                a.title,
                a.deadline.format("%m-%d %H:%M")
            );
            if a.late {
                line.push_str(" LATE");
            }
            if a.is_started() {
                line.push_str(" (started)");
            }
            line
        })
        .collect();
    ui.show_message(&lines.join("\n"));
}

fn show_menu(sim: &Simulation, ui: &mut dyn Presentation) {
    let script = sim.script();
    let names = |menu: StatusMenu, keys: Vec<&String>| {
        keys.into_iter()
            .filter(|name| sim.status_enables(menu, name))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    ui.show_message(&format!(
        "Permissions: {}\nConfessions: {}\nReports: {}",
        names(StatusMenu::Permissions, script.permissions.keys().collect()),
        names(StatusMenu::Confessions, script.confessions.keys().collect()),
        names(StatusMenu::Reports, script.reports.keys().collect()),
    ));
}

fn fast_forward(sim: &mut Simulation, ui: &mut dyn Presentation, argument: &str) {
    let parts: Vec<i64> = argument
        .split_whitespace()
        .map_while(|p| p.parse().ok())
        .collect();
    let [days, hours, minutes, seconds] = parts.as_slice() else {
        ui.show_message("Usage: ff <days> <hours> <minutes> <seconds>");
        return;
    };
    match sim.fast_forward(ui, *days, *hours, *minutes, *seconds) {
        Ok(summary) => ui.show_message(&format!(
            "Now {}. {} assigned, {} late, {} expired.",
            sim.now().format("%Y-%m-%d %H:%M"),
            summary.jobs_assigned.len(),
            summary.late.len(),
            summary.expired.len(),
        )),
        Err(err) => ui.show_message(&err.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use regimen_core::{EngineSettings, ScriptedPresentation};
    use regimen_types::Script;

    use super::*;

    const SCRIPT: &str = r"
statuses:
  Home: {}
  Work:
    permissions: [Coffee]
    reports: [Arrived]
jobs:
  Dishes:
    title: Do the dishes
    end_time: '20:00:00'
permissions:
  Snack: {}
  Coffee: {}
reports:
  Arrived: {}
  Bedtime: {}
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
    fn commands_drive_the_simulation() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        sim.assign_job(&mut ui, "dishes", false).unwrap();

        assert_eq!(execute(&mut sim, &mut ui, "list"), Flow::Continue);
        assert!(ui.saw("Do the dishes due 03-01 20:00"));
        execute(&mut sim, &mut ui, "done dishes");
        assert!(sim.state.assignments.is_empty());
        execute(&mut sim, &mut ui, "ask snack");
        assert!(ui.saw("Permission granted."));
    }

    #[test]
    fn errors_are_shown_not_fatal() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        assert_eq!(execute(&mut sim, &mut ui, "done nothing"), Flow::Continue);
        assert!(ui.saw("nothing"));
        execute(&mut sim, &mut ui, "dance");
        assert!(ui.saw("Unknown command 'dance'"));
        execute(&mut sim, &mut ui, "ff 1 2");
        assert!(ui.saw("Usage: ff"));
    }

    #[test]
    fn demo_script_runs_a_morning() {
        let script = Script::from_yaml(include_str!("../../../demos/household.yaml")).unwrap();
        assert_eq!(script.initial_status(), "home");
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let settings = EngineSettings {
            seed: Some(7),
            ..EngineSettings::default()
        };
        let mut sim = Simulation::new(Arc::new(script), settings, start);
        let mut ui = ScriptedPresentation::new();
        sim.open(&mut ui);
        assert!(ui.saw("Welcome, Alex. You have 500 merits."));

        execute(&mut sim, &mut ui, "ff 0 1 10 0");
        assert!(ui.saw("Good morning. It is Friday."));
        assert!(sim.state.assignments.contains_key("dishes"));
        assert!(sim.state.assignments.contains_key("plants"));
        assert!(!sim.state.assignments.contains_key("laundry"));
    }

    #[test]
    fn menu_lists_what_the_status_enables() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        execute(&mut sim, &mut ui, "menu");
        assert!(ui.saw("Permissions: coffee, snack"));
        assert!(ui.saw("Reports: arrived, bedtime"));

        sim.change_status(&mut ui, "Work", false).unwrap();
        execute(&mut sim, &mut ui, "menu");
        assert!(ui.saw("Permissions: coffee\n"));
        assert!(ui.saw("Reports: arrived"));
        assert!(!ui.messages.last().unwrap().contains("snack"));
    }

    #[test]
    fn fast_forward_and_exit() {
        let mut sim = simulation();
        let mut ui = ScriptedPresentation::new();
        execute(&mut sim, &mut ui, "ff 0 2 30 0");
        assert!(ui.saw("Now 2024-03-01 11:30."));
        assert_eq!(execute(&mut sim, &mut ui, "save"), Flow::Save);
        assert_eq!(execute(&mut sim, &mut ui, "QUIT"), Flow::Quit);
    }
}
