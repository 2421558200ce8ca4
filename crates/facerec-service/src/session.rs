use crate::outcome::{Outcome, Toast};
use serde::Serialize;

const INITIAL_REGISTRATION_STATUS: &str = "Status: Not registered yet.";

/// Per-UI-session status of the last registration and management actions.
///
/// Never mutated in place: each action produces a new value that replaces
/// the previous one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub registration: Option<Outcome>,
    pub management: Option<Outcome>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registration(self, outcome: Outcome) -> Self {
        Self {
            registration: Some(outcome),
            ..self
        }
    }

    pub fn with_management(self, outcome: Outcome) -> Self {
        Self {
            management: Some(outcome),
            ..self
        }
    }

    /// Markdown line for the registration status display.
    pub fn registration_status_line(&self) -> String {
        match &self.registration {
            Some(outcome) => format!("**Status:** {}", outcome.message),
            None => INITIAL_REGISTRATION_STATUS.to_string(),
        }
    }

    pub fn registration_toast(&self) -> Option<Toast> {
        self.registration.as_ref().and_then(Outcome::toast)
    }

    pub fn management_toast(&self) -> Option<Toast> {
        self.management.as_ref().and_then(Outcome::toast)
    }

    /// The name box empties only after a successful registration.
    pub fn should_clear_name_input(&self) -> bool {
        self.registration.as_ref().is_some_and(|o| o.success)
    }

    /// The new-name box empties only after a successful rename or delete.
    pub fn should_clear_rename_input(&self) -> bool {
        self.management.as_ref().is_some_and(|o| o.success)
    }
}
