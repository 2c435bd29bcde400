use std::path::PathBuf;

use gazeflow_pool::PoolError;
use thiserror::Error;

use crate::action::{Action, ActionState, Scope};
use crate::session::Unit;

#[derive(Debug, Error)]
pub enum GazeflowError {
    #[error("not initialized: no study.yaml found in the study root")]
    NotInitialized,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("recording not found: {0}")]
    RecordingNotFound(String),

    #[error("invalid name '{0}': must be a single path component of letters, digits, '.', '_', '-' or spaces")]
    InvalidName(String),

    #[error("action state file missing: {}", .0.display())]
    StateFileMissing(PathBuf),

    #[error("unknown action: {0}")]
    InvalidAction(String),

    #[error("invalid state '{value}' for action '{action}'")]
    InvalidState { action: String, value: String },

    #[error("action '{action}' is {action_scope}-scoped but was applied to a {unit_scope}")]
    ScopeMismatch {
        action: Action,
        action_scope: Scope,
        unit_scope: Scope,
    },

    #[error("'{action}' is already {state} on {unit}")]
    AlreadyInFlight {
        action: Action,
        unit: Unit,
        state: ActionState,
    },

    #[error("rule table has no rule for action '{0}'")]
    MissingRule(Action),

    #[error("rule table defines action '{0}' more than once")]
    DuplicateRule(Action),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GazeflowError>;
