use gazeflow_pool::JobState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::GazeflowError;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Whether an action runs once per recording or once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Recording,
    Session,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Recording => "recording",
            Scope::Session => "session",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A pipeline stage. Declaration order is the catalog order: `Ord` and
/// [`Action::index`] both follow it, and "later" always means a higher index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Import,
    MakeOverlayVideo,
    CodeEpisodes,
    DetectMarkers,
    GazeToPlane,
    AutoCodeSync,
    AutoCodeTrials,
    SyncToCam,
    SyncToReference,
    Validate,
    ExportTrials,
    MakeMappedVideo,
}

impl Action {
    pub fn all() -> &'static [Action] {
        &[
            Action::Import,
            Action::MakeOverlayVideo,
            Action::CodeEpisodes,
            Action::DetectMarkers,
            Action::GazeToPlane,
            Action::AutoCodeSync,
            Action::AutoCodeTrials,
            Action::SyncToCam,
            Action::SyncToReference,
            Action::Validate,
            Action::ExportTrials,
            Action::MakeMappedVideo,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Every action after this one in catalog order.
    pub fn later(self) -> &'static [Action] {
        &Action::all()[self.index() + 1..]
    }

    /// Catalog actions of one scope, in order.
    pub fn for_scope(scope: Scope) -> impl Iterator<Item = Action> {
        Action::all().iter().copied().filter(move |a| a.scope() == scope)
    }

    pub fn scope(self) -> Scope {
        match self {
            Action::SyncToReference | Action::ExportTrials | Action::MakeMappedVideo => {
                Scope::Session
            }
            _ => Scope::Recording,
        }
    }

    /// Needs a human in the loop (e.g. manual episode coding).
    pub fn needs_interactive_input(self) -> bool {
        matches!(self, Action::CodeEpisodes)
    }

    /// Accepts extra per-run options beyond the study configuration.
    pub fn has_extra_options(self) -> bool {
        matches!(self, Action::MakeOverlayVideo | Action::MakeMappedVideo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Import => "import",
            Action::MakeOverlayVideo => "make_overlay_video",
            Action::CodeEpisodes => "code_episodes",
            Action::DetectMarkers => "detect_markers",
            Action::GazeToPlane => "gaze_to_plane",
            Action::AutoCodeSync => "auto_code_sync",
            Action::AutoCodeTrials => "auto_code_trials",
            Action::SyncToCam => "sync_to_cam",
            Action::SyncToReference => "sync_to_reference",
            Action::Validate => "validate",
            Action::ExportTrials => "export_trials",
            Action::MakeMappedVideo => "make_mapped_video",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = GazeflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| GazeflowError::InvalidAction(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ActionState
// ---------------------------------------------------------------------------

/// Persisted state of one action for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    #[default]
    NotRun,
    Pending,
    Running,
    Completed,
    Canceled,
    Failed,
}

impl ActionState {
    pub fn all() -> &'static [ActionState] {
        &[
            ActionState::NotRun,
            ActionState::Pending,
            ActionState::Running,
            ActionState::Completed,
            ActionState::Canceled,
            ActionState::Failed,
        ]
    }

    pub fn is_completed(self) -> bool {
        self == ActionState::Completed
    }

    /// A job for this action is queued or executing.
    pub fn is_in_flight(self) -> bool {
        matches!(self, ActionState::Pending | ActionState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionState::NotRun => "not_run",
            ActionState::Pending => "pending",
            ActionState::Running => "running",
            ActionState::Completed => "completed",
            ActionState::Canceled => "canceled",
            ActionState::Failed => "failed",
        }
    }

    /// Parse a persisted value; `action` only feeds the error message.
    pub fn parse_for(action: &str, value: &str) -> crate::error::Result<Self> {
        ActionState::all()
            .iter()
            .copied()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| GazeflowError::InvalidState {
                action: action.to_string(),
                value: value.to_string(),
            })
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionState {
    type Err = GazeflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionState::parse_for("?", s)
    }
}

impl From<JobState> for ActionState {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Pending => ActionState::Pending,
            JobState::Running => ActionState::Running,
            JobState::Completed => ActionState::Completed,
            JobState::Canceled => ActionState::Canceled,
            JobState::Failed => ActionState::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionStateMap
// ---------------------------------------------------------------------------

/// Action -> state for one unit, iterated in catalog order.
pub type ActionStateMap = BTreeMap<Action, ActionState>;

/// A fresh map for a unit of `scope`: every action of that scope, `NotRun`.
pub fn fresh_action_states(scope: Scope) -> ActionStateMap {
    Action::for_scope(scope)
        .map(|a| (a, ActionState::NotRun))
        .collect()
}

// ---------------------------------------------------------------------------
// RecordingKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingKind {
    EyeTracker,
    Camera,
}

impl RecordingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordingKind::EyeTracker => "eye_tracker",
            RecordingKind::Camera => "camera",
        }
    }
}

impl fmt::Display for RecordingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
