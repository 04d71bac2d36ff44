//! Menu operations: permissions, confessions, reports, sign-in and outfit
//! reports.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rand::Rng;
use regimen_types::{EventHandler, SelectMode};
use tracing::{debug, info};

use crate::assignment::offset;
use crate::error::EngineError;
use crate::interpreter::CallContext;
use crate::presentation::Presentation;
use crate::simulation::Simulation;
use crate::state::{PendingNotification, UsageCounters};
use crate::status::StatusMenu;

/// Outcome of asking for a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAnswer {
    /// Granted.
    Granted,
    /// Denied, with the rule that refused it.
    Denied(Denial),
}

/// Why a permission was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Still locked out after a previous grant.
    Locked {
        /// End of the lockout.
        until: NaiveDateTime,
    },
    /// The daily grant limit is used up.
    DailyLimit,
    /// Merits are below the permission's minimum.
    TooFewMerits,
    /// The chance roll failed.
    Chance,
}

impl Simulation {
    /// Ask for permission `name`.
    ///
    /// # Errors
    ///
    /// [`EngineError::DefinitionNotFound`] for an unknown permission and
    /// [`EngineError::Ineligible`] when the current status or the time of
    /// day does not offer it. A denial is not an error.
    pub fn ask_permission(
        &mut self,
        ui: &mut dyn Presentation,
        name: &str,
    ) -> Result<PermissionAnswer, EngineError> {
        let key = name.trim().to_lowercase();
        let script = Arc::clone(&self.script);
        let permission = script
            .permission(&key)
            .ok_or_else(|| EngineError::not_found("permission", &key))?;
        if !self.status_enables(StatusMenu::Permissions, &key) {
            return Err(EngineError::ineligible(
                "permission",
                &key,
                "not offered in this status",
            ));
        }
        self.check_eligibility(&permission.eligibility)
            .map_err(|reason| EngineError::ineligible("permission", &key, reason))?;
        self.enforce_interruptions(ui);

        UsageCounters::bump(&mut self.state.usage.permissions, &key);
        self.state.last_permission.clone_from(&permission.title);

        let now = self.now();
        let record = self.state.permissions.entry(key.clone()).or_default();
        let denial = if let Some(until) = record.locked_until.filter(|until| *until > now) {
            Some(Denial::Locked { until })
        } else if permission
            .max_per_day
            .is_some_and(|max| record.grants_on(now.date()) >= max)
        {
            Some(Denial::DailyLimit)
        } else if permission
            .min_merits
            .is_some_and(|min| self.state.merits < min)
        {
            Some(Denial::TooFewMerits)
        } else if self.rng.random_range(0..100) >= permission.chance {
            Some(Denial::Chance)
        } else {
            None
        };

        let mut ctx = CallContext::new();
        let Some(denial) = denial else {
            let record = self.state.permissions.entry(key.clone()).or_default();
            record.record_grant(now);
            record.locked_until = offset(now, permission.delay);
            if let Some(until) = record.locked_until.filter(|_| permission.notify) {
                self.state.pending_notifications.push(PendingNotification {
                    due: until,
                    message: format!("You may ask for {} again.", permission.title),
                });
            }
            self.state.daily.permissions_granted.push(key.clone());
            info!(permission = %key, "Permission granted");
            self.run_actions(ui, &permission.granted, SelectMode::All, &mut ctx);
            self.run_hook(ui, EventHandler::PermissionGiven);
            return Ok(PermissionAnswer::Granted);
        };

        let record = self.state.permissions.entry(key.clone()).or_default();
        record.denials = record.denials.saturating_add(1);
        self.state.daily.permissions_denied.push(key.clone());
        info!(permission = %key, ?denial, "Permission denied");
        self.run_actions(ui, &permission.denied, SelectMode::All, &mut ctx);
        self.run_hook(ui, EventHandler::PermissionDenied);
        Ok(PermissionAnswer::Denied(denial))
    }

    /// Make confession `name`.
    pub fn confess(&mut self, ui: &mut dyn Presentation, name: &str) -> Result<(), EngineError> {
        let key = name.trim().to_lowercase();
        let script = Arc::clone(&self.script);
        let confession = script
            .confession(&key)
            .ok_or_else(|| EngineError::not_found("confession", &key))?;
        if !self.status_enables(StatusMenu::Confessions, &key) {
            return Err(EngineError::ineligible(
                "confession",
                &key,
                "not offered in this status",
            ));
        }
        self.check_eligibility(&confession.eligibility)
            .map_err(|reason| EngineError::ineligible("confession", &key, reason))?;
        self.enforce_interruptions(ui);

        UsageCounters::bump(&mut self.state.usage.confessions, &key);
        self.state.daily.confessions.push(key.clone());
        info!(confession = %key, "Confession");
        self.run_actions(ui, &confession.actions, SelectMode::All, &mut CallContext::new());
        Ok(())
    }

    /// Make report `name`.
    pub fn report(&mut self, ui: &mut dyn Presentation, name: &str) -> Result<(), EngineError> {
        let key = name.trim().to_lowercase();
        let script = Arc::clone(&self.script);
        let report = script
            .report(&key)
            .ok_or_else(|| EngineError::not_found("report", &key))?;
        if !self.status_enables(StatusMenu::Reports, &key) {
            return Err(EngineError::ineligible(
                "report",
                &key,
                "not offered in this status",
            ));
        }
        self.check_eligibility(&report.eligibility)
            .map_err(|reason| EngineError::ineligible("report", &key, reason))?;
        self.enforce_interruptions(ui);

        UsageCounters::bump(&mut self.state.usage.reports, &key);
        self.state.daily.reports.push(key.clone());
        self.state.last_report.clone_from(&report.title);
        info!(report = %key, "Report");
        self.run_actions(ui, &report.actions, SelectMode::All, &mut CallContext::new());
        Ok(())
    }

    /// Run the SignIn hook.
    pub fn sign_in(&mut self, ui: &mut dyn Presentation) {
        info!("Sign in");
        self.run_hook(ui, EventHandler::SignIn);
    }

    /// Ask what the user is wearing. Returns `false` if cancelled.
    pub fn cloth_report(&mut self, ui: &mut dyn Presentation) -> bool {
        let current = self.state.outfit.clone();
        let Some(outfit) = ui
            .prompt_long_text("What are you wearing?", current.as_deref())
            .filter(|text| !text.trim().is_empty())
        else {
            debug!("Cloth report cancelled");
            return false;
        };
        self.state.daily.outfits.push(outfit.clone());
        self.state.outfit = Some(outfit);
        info!("Cloth report");
        self.run_hook(ui, EventHandler::AfterClothReport);
        true
    }
}
