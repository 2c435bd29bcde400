//! Durable action state, one YAML file per unit.
//!
//! Every read-modify-write on a file happens under a lock for that file's
//! path and always re-reads the file first, so concurrent job callbacks and
//! external writers are merged rather than overwritten. Writes are
//! temp-file-plus-rename; a cascade that spans several files is only
//! atomic per file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::action::{fresh_action_states, Action, ActionState, ActionStateMap};
use crate::error::{GazeflowError, Result};
use crate::io::{atomic_write, read_if_exists};
use crate::session::Unit;

// ---------------------------------------------------------------------------
// IfMissing
// ---------------------------------------------------------------------------

/// What to do when a unit's state file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfMissing {
    /// Fail with [`GazeflowError::StateFileMissing`].
    Error,
    /// Materialize a fresh all-`NotRun` file first.
    Create,
    /// Do nothing and report `None`.
    Skip,
}

// ---------------------------------------------------------------------------
// Upgrade
// ---------------------------------------------------------------------------

/// Reconcile a stored map with the current catalog.
///
/// Keys naming no catalog action (or an action outside `catalog`) are
/// dropped, catalog actions absent from `stored` are added as `NotRun`, and
/// every kept value must be a known state. Returns the upgraded map and
/// whether it differs from what was stored.
pub fn upgrade_action_states(
    stored: &BTreeMap<String, String>,
    catalog: impl IntoIterator<Item = Action>,
) -> Result<(ActionStateMap, bool)> {
    let mut upgraded = ActionStateMap::new();
    for action in catalog {
        let state = match stored.get(action.as_str()) {
            Some(value) => ActionState::parse_for(action.as_str(), value)?,
            None => ActionState::NotRun,
        };
        upgraded.insert(action, state);
    }
    let changed = stored.len() != upgraded.len()
        || stored
            .keys()
            .any(|k| !upgraded.keys().any(|a| a.as_str() == k));
    Ok((upgraded, changed))
}

fn parse_stored(data: &str) -> Result<BTreeMap<String, String>> {
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let stored: Option<BTreeMap<String, String>> = serde_yaml::from_str(data)?;
    Ok(stored.unwrap_or_default())
}

fn check_scope(unit: &Unit, action: Action) -> Result<()> {
    if action.scope() != unit.scope() {
        return Err(GazeflowError::ScopeMismatch {
            action,
            action_scope: action.scope(),
            unit_scope: unit.scope(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

pub struct StateStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, unit: &Unit) -> PathBuf {
        unit.states_path(&self.root)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    fn write(&self, path: &Path, states: &ActionStateMap) -> Result<()> {
        let data = serde_yaml::to_string(states)?;
        atomic_write(path, data.as_bytes())
    }

    /// Read, upgrade and (if the catalog changed) rewrite one file. The
    /// caller must hold the path lock.
    fn read_locked(
        &self,
        unit: &Unit,
        path: &Path,
        missing: IfMissing,
    ) -> Result<Option<ActionStateMap>> {
        let Some(data) = read_if_exists(path)? else {
            return match missing {
                IfMissing::Error => Err(GazeflowError::StateFileMissing(path.to_path_buf())),
                IfMissing::Skip => Ok(None),
                IfMissing::Create => {
                    let fresh = fresh_action_states(unit.scope());
                    self.write(path, &fresh)?;
                    debug!(unit = %unit, "created action state file");
                    Ok(Some(fresh))
                }
            };
        };
        let stored = parse_stored(&data)?;
        let (states, changed) = upgrade_action_states(&stored, Action::for_scope(unit.scope()))?;
        if changed {
            self.write(path, &states)?;
            info!(unit = %unit, "upgraded action state file to current catalog");
        }
        Ok(Some(states))
    }

    /// Load a unit's states, upgrading the file in place if needed.
    pub fn load(&self, unit: &Unit, missing: IfMissing) -> Result<Option<ActionStateMap>> {
        unit.validate()?;
        let path = self.path_for(unit);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_locked(unit, &path, missing)
    }

    /// Re-read the file and hand the current map to `f` under the path
    /// lock; whatever `f` leaves behind is written back if it changed.
    pub fn modify<F>(&self, unit: &Unit, missing: IfMissing, f: F) -> Result<Option<ActionStateMap>>
    where
        F: FnOnce(&mut ActionStateMap),
    {
        unit.validate()?;
        let path = self.path_for(unit);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut states) = self.read_locked(unit, &path, missing)? else {
            debug!(unit = %unit, "no action state file, skipping update");
            return Ok(None);
        };
        let before = states.clone();
        f(&mut states);
        if states != before {
            self.write(&path, &states)?;
        }
        Ok(Some(states))
    }

    /// Set each listed action to its state on one unit.
    pub fn apply(
        &self,
        unit: &Unit,
        mutations: &ActionStateMap,
        missing: IfMissing,
    ) -> Result<Option<ActionStateMap>> {
        for action in mutations.keys() {
            check_scope(unit, *action)?;
        }
        self.modify(unit, missing, |states| {
            for (action, state) in mutations {
                states.insert(*action, *state);
            }
        })
    }

    pub fn set_state(
        &self,
        unit: &Unit,
        action: Action,
        state: ActionState,
        missing: IfMissing,
    ) -> Result<Option<ActionStateMap>> {
        self.apply(unit, &ActionStateMap::from([(action, state)]), missing)
    }

    /// No job survives a restart: `Running` becomes `Failed` and `Pending`
    /// goes back to `NotRun`. Returns the actions that changed, with their
    /// new state.
    pub fn recover_interrupted(&self, unit: &Unit) -> Result<Vec<(Action, ActionState)>> {
        let mut recovered = Vec::new();
        self.modify(unit, IfMissing::Skip, |states| {
            for (action, state) in states.iter_mut() {
                let next = match *state {
                    ActionState::Running => ActionState::Failed,
                    ActionState::Pending => ActionState::NotRun,
                    _ => continue,
                };
                *state = next;
                recovered.push((*action, next));
            }
        })?;
        if !recovered.is_empty() {
            info!(unit = %unit, count = recovered.len(), "recovered interrupted actions");
        }
        Ok(recovered)
    }

    #[cfg(test)]
    pub(crate) fn exists(&self, unit: &Unit) -> bool {
        self.path_for(unit).is_file()
    }

    /// Bring a unit's file up to the current catalog. Returns whether the
    /// file was rewritten.
    pub fn upgrade(&self, unit: &Unit) -> Result<bool> {
        unit.validate()?;
        let path = self.path_for(unit);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(data) = read_if_exists(&path)? else {
            return Ok(false);
        };
        let stored = parse_stored(&data)?;
        let (states, changed) = upgrade_action_states(&stored, Action::for_scope(unit.scope()))?;
        if changed {
            self.write(&path, &states)?;
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
