//! Writing an action's new state and cascading the invalidation.
//!
//! A cascade may touch several files: the acting unit, its session, or the
//! recordings of a session. Each file is rewritten atomically on its own;
//! the cascade as a whole is not, so a crash in between leaves the later
//! files stale until the next update touches them.

use tracing::info;

use crate::action::{Action, ActionState, ActionStateMap, Scope};
use crate::config::StudyConfig;
use crate::error::{GazeflowError, Result};
use crate::session::Unit;
use crate::store::{IfMissing, StateStore};
use crate::table::RuleTable;

/// One request to move `action` on `unit` to `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub unit: Unit,
    pub action: Action,
    pub state: ActionState,
    /// Reset everything the action invalidates. Off when re-confirming an
    /// unchanged result.
    pub cascade: bool,
    /// Policy for the acting unit's own file. Other files touched by the
    /// cascade are always skipped when missing: a unit without a file has
    /// nothing to invalidate.
    pub if_missing: IfMissing,
}

impl StateUpdate {
    pub fn new(unit: Unit, action: Action, state: ActionState) -> Self {
        Self {
            unit,
            action,
            state,
            cascade: true,
            if_missing: IfMissing::Error,
        }
    }

    pub fn cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn if_missing(mut self, if_missing: IfMissing) -> Self {
        self.if_missing = if_missing;
        self
    }
}

/// Apply `update`, returning every unit whose file was written or
/// confirmed, acting unit first.
pub fn update_action_state(
    store: &StateStore,
    rules: &RuleTable,
    config: &StudyConfig,
    update: &StateUpdate,
) -> Result<Vec<Unit>> {
    let unit = &update.unit;
    if update.action.scope() != unit.scope() {
        return Err(GazeflowError::ScopeMismatch {
            action: update.action,
            action_scope: update.action.scope(),
            unit_scope: unit.scope(),
        });
    }

    let mut own = ActionStateMap::from([(update.action, update.state)]);
    let mut other = ActionStateMap::new();
    if update.cascade {
        for stale in rules.invalidation_set(update.action, config) {
            if stale.scope() == unit.scope() {
                own.insert(stale, ActionState::NotRun);
            } else {
                other.insert(stale, ActionState::NotRun);
            }
        }
    }

    let mut touched = Vec::new();
    if store.apply(unit, &own, update.if_missing)?.is_some() {
        touched.push(unit.clone());
    }

    if !other.is_empty() {
        let targets: Vec<Unit> = match unit.scope() {
            // Recording-scoped fallout of a session action hits every
            // recording of the session.
            Scope::Session => config
                .session_def
                .iter()
                .map(|r| Unit::recording(unit.session_name(), &r.name))
                .collect(),
            Scope::Recording => vec![unit.owning_session()],
        };
        for target in targets {
            if store.apply(&target, &other, IfMissing::Skip)?.is_some() {
                touched.push(target);
            }
        }
    }

    if update.cascade {
        info!(
            unit = %unit,
            action = %update.action,
            state = %update.state,
            reset = own.len() - 1 + other.len(),
            units = touched.len(),
            "updated action state with cascade"
        );
    } else {
        info!(unit = %unit, action = %update.action, state = %update.state, "updated action state");
    }
    Ok(touched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
