//! The status state machine.
//!
//! Entering a sub-status pushes the current status onto the history stack,
//! so N nested sub-status entries unwind in N returns. Entering a primary
//! status clears the stack. Returning pops the stack, or falls back to the
//! script's default status when it is empty.

use std::sync::Arc;

use regimen_types::{EventHandler, SelectMode};
use tracing::info;

use crate::error::EngineError;
use crate::interpreter::CallContext;
use crate::presentation::Presentation;
use crate::simulation::Simulation;

/// How the history stack changes on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Primary,
    Sub,
    Return,
}

impl Simulation {
    /// Enter status `name`. `as_sub` forces sub-status entry even if the
    /// definition is not marked as one.
    pub fn change_status(
        &mut self,
        ui: &mut dyn Presentation,
        name: &str,
        as_sub: bool,
    ) -> Result<(), EngineError> {
        let key = name.trim().to_lowercase();
        let sub = as_sub
            || self
                .script
                .status(&key)
                .ok_or_else(|| EngineError::not_found("status", &key))?
                .sub_status;
        self.enter_status(ui, &key, if sub { Entry::Sub } else { Entry::Primary })
    }

    /// Return to the previous status, or the default status if there is
    /// none.
    pub fn return_to_last_status(&mut self, ui: &mut dyn Presentation) -> Result<(), EngineError> {
        let target = match self.state.status_history.last() {
            Some(previous) => previous.clone(),
            None => self.script.general.default_status.clone(),
        };
        if target.is_empty() {
            return Err(EngineError::not_found("status", "(default)"));
        }
        self.enter_status(ui, &target, Entry::Return)
    }

    fn enter_status(
        &mut self,
        ui: &mut dyn Presentation,
        key: &str,
        entry: Entry,
    ) -> Result<(), EngineError> {
        let script = Arc::clone(&self.script);
        let status = script
            .status(key)
            .ok_or_else(|| EngineError::not_found("status", key))?;
        self.run_hook(ui, EventHandler::BeforeStatusChange);
        self.check_eligibility(&status.eligibility)
            .map_err(|reason| EngineError::ineligible("status", key, reason))?;

        let previous = std::mem::replace(&mut self.state.status, key.to_owned());
        match entry {
            Entry::Primary => self.state.status_history.clear(),
            Entry::Sub => self.state.status_history.push(previous.clone()),
            Entry::Return => {
                self.state.status_history.pop();
            }
        }
        info!(
            from = %previous,
            to = %key,
            ?entry,
            depth = self.state.status_history.len(),
            "Status changed"
        );

        self.run_actions(ui, &status.actions, SelectMode::All, &mut CallContext::new());
        self.run_hook(ui, EventHandler::AfterStatusChange);
        Ok(())
    }

    /// Whether menu item `name` of `menu` is enabled in the current status.
    /// An empty list on the status enables everything.
    pub fn status_enables(&self, menu: StatusMenu, name: &str) -> bool {
        let Some(status) = self.script.status(&self.state.status) else {
            return true;
        };
        let list = match menu {
            StatusMenu::Permissions => &status.permissions,
            StatusMenu::Confessions => &status.confessions,
            StatusMenu::Reports => &status.reports,
        };
        list.is_empty() || list.iter().any(|entry| entry.eq_ignore_ascii_case(name))
    }
}

/// Status-scoped menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMenu {
    /// Permissions the user may ask for.
    Permissions,
    /// Confessions the user may make.
    Confessions,
    /// Reports the user may file.
    Reports,
}
