//! Config gate: is an action meaningful for this study, and for this
//! particular recording?
//!
//! A gated-out action is simply absent from "possible" results; it is never
//! reported as blocked.

use crate::action::{Action, Scope};
use crate::config::{RecordingDef, StudyConfig};
use crate::table::RuleTable;

impl RuleTable {
    /// Whether `action` is meaningful at all under `config`.
    pub fn is_possible_given_config(&self, action: Action, config: &StudyConfig) -> bool {
        (self.rule(action).config_gate)(config)
    }

    /// Whether `action` is meaningful for `recording`. Implies the config
    /// gate. Session-scoped actions never run on a recording.
    pub fn is_possible_for_recording(
        &self,
        recording: &RecordingDef,
        action: Action,
        config: &StudyConfig,
    ) -> bool {
        action.scope() == Scope::Recording
            && self.is_possible_given_config(action, config)
            && (self.rule(action).recording_gate)(recording, config)
    }

    /// The actions of the catalog meaningful under `config`, in order.
    pub fn configured_actions(&self, config: &StudyConfig) -> Vec<Action> {
        Action::all()
            .iter()
            .copied()
            .filter(|a| self.is_possible_given_config(*a, config))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
