use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::action::{fresh_action_states, Action, ActionState, ActionStateMap, Scope};
use crate::config::{RecordingDef, StudyConfig};
use crate::error::{GazeflowError, Result};
use crate::paths;
use crate::store::{IfMissing, StateStore};

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// Something that owns an action state file: a session or one of its
/// recordings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Unit {
    Session { session: String },
    Recording { session: String, recording: String },
}

impl Unit {
    pub fn session(session: impl Into<String>) -> Self {
        Unit::Session {
            session: session.into(),
        }
    }

    pub fn recording(session: impl Into<String>, recording: impl Into<String>) -> Self {
        Unit::Recording {
            session: session.into(),
            recording: recording.into(),
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Unit::Session { .. } => Scope::Session,
            Unit::Recording { .. } => Scope::Recording,
        }
    }

    pub fn session_name(&self) -> &str {
        match self {
            Unit::Session { session } | Unit::Recording { session, .. } => session.as_str(),
        }
    }

    pub fn recording_name(&self) -> Option<&str> {
        match self {
            Unit::Session { .. } => None,
            Unit::Recording { recording, .. } => Some(recording.as_str()),
        }
    }

    /// The session this unit belongs to (itself, for a session).
    pub fn owning_session(&self) -> Unit {
        Unit::session(self.session_name())
    }

    pub fn dir(&self, root: &Path) -> PathBuf {
        match self {
            Unit::Session { session } => paths::session_dir(root, session),
            Unit::Recording { session, recording } => {
                paths::recording_dir(root, session, recording)
            }
        }
    }

    pub fn states_path(&self, root: &Path) -> PathBuf {
        match self {
            Unit::Session { session } => paths::session_states_path(root, session),
            Unit::Recording { session, recording } => {
                paths::recording_states_path(root, session, recording)
            }
        }
    }

    /// Reject names that would escape the study root or hide the directory.
    pub fn validate(&self) -> Result<()> {
        paths::validate_name(self.session_name())?;
        if let Some(recording) = self.recording_name() {
            paths::validate_name(recording)?;
        }
        Ok(())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Session { session } => f.write_str(session),
            Unit::Recording { session, recording } => write!(f, "{session}/{recording}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recording / Session
// ---------------------------------------------------------------------------

/// A recording of a session together with its current action states.
#[derive(Debug, Clone, Serialize)]
pub struct Recording {
    #[serde(flatten)]
    pub def: RecordingDef,
    pub states: ActionStateMap,
    /// A state file exists on disk. A recording that has not been imported
    /// yet is still listed, with every action `NotRun`.
    pub persisted: bool,
}

impl Recording {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn state(&self, action: Action) -> ActionState {
        self.states.get(&action).copied().unwrap_or_default()
    }
}

/// Snapshot of one session: its own states plus every recording the study
/// defines. The files remain authoritative; reload after mutations.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub name: String,
    pub states: ActionStateMap,
    pub recordings: Vec<Recording>,
}

impl Session {
    pub fn load(store: &StateStore, config: &StudyConfig, name: &str) -> Result<Self> {
        paths::validate_name(name)?;
        if !paths::session_dir(store.root(), name).is_dir() {
            return Err(GazeflowError::SessionNotFound(name.to_string()));
        }
        let states = store
            .load(&Unit::session(name), IfMissing::Skip)?
            .unwrap_or_else(|| fresh_action_states(Scope::Session));

        let mut recordings = Vec::with_capacity(config.session_def.len());
        for def in &config.session_def {
            let loaded = store.load(&Unit::recording(name, &def.name), IfMissing::Skip)?;
            recordings.push(Recording {
                def: def.clone(),
                persisted: loaded.is_some(),
                states: loaded.unwrap_or_else(|| fresh_action_states(Scope::Recording)),
            });
        }

        Ok(Self {
            name: name.to_string(),
            states,
            recordings,
        })
    }

    pub fn state(&self, action: Action) -> ActionState {
        self.states.get(&action).copied().unwrap_or_default()
    }

    pub fn recording(&self, name: &str) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.name() == name)
    }
}

/// Every unit `config` defines for `session`: the session first, then its
/// recordings. Reads nothing from disk.
pub fn session_units(config: &StudyConfig, session: &str) -> Vec<Unit> {
    std::iter::once(Unit::session(session))
        .chain(
            config
                .session_def
                .iter()
                .map(|r| Unit::recording(session, &r.name)),
        )
        .collect()
}

/// Session directories under the study root, sorted by name. Hidden
/// entries and plain files are ignored.
pub fn list_sessions(root: &Path) -> Result<Vec<String>> {
    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if paths::validate_name(&name).is_ok() {
            sessions.push(name);
        }
    }
    sessions.sort();
    Ok(sessions)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::RecordingKind;
    use tempfile::TempDir;

    fn config() -> StudyConfig {
        StudyConfig {
            session_def: vec![
                RecordingDef::new("tutor", RecordingKind::EyeTracker),
                RecordingDef::new("cam", RecordingKind::Camera),
            ],
            ..StudyConfig::default()
        }
    }

    #[test]
    fn unit_paths_and_display() {
        let root = Path::new("/study");
        let rec = Unit::recording("s1", "cam");
        assert_eq!(rec.to_string(), "s1/cam");
        assert_eq!(rec.scope(), Scope::Recording);
        assert_eq!(rec.owning_session(), Unit::session("s1"));
        assert_eq!(
            rec.states_path(root),
            PathBuf::from("/study/s1/cam/action_states.yaml")
        );
        assert_eq!(Unit::session("s1").dir(root), PathBuf::from("/study/s1"));
    }

    #[test]
    fn unit_validation_rejects_traversal() {
        assert!(Unit::recording("s1", "..").validate().is_err());
        assert!(Unit::session("s1/x").validate().is_err());
        assert!(Unit::recording("s1", "cam").validate().is_ok());
    }

    #[test]
    fn load_missing_session_fails() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(matches!(
            Session::load(&store, &config(), "nope"),
            Err(GazeflowError::SessionNotFound(_))
        ));
    }

    #[test]
    fn load_lists_unimported_recordings_as_not_run() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        store
            .load(&Unit::recording("s1", "tutor"), IfMissing::Create)
            .unwrap();

        let session = Session::load(&store, &config(), "s1").unwrap();
        assert_eq!(session.recordings.len(), 2);
        assert!(session.recording("tutor").unwrap().persisted);
        let cam = session.recording("cam").unwrap();
        assert!(!cam.persisted);
        assert_eq!(cam.state(Action::Import), ActionState::NotRun);
        assert_eq!(session.state(Action::ExportTrials), ActionState::NotRun);
        assert_eq!(
            session_units(&config(), "s1"),
            vec![
                Unit::session("s1"),
                Unit::recording("s1", "tutor"),
                Unit::recording("s1", "cam"),
            ]
        );
    }

    #[test]
    fn list_sessions_skips_hidden_and_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("s2")).unwrap();
        std::fs::create_dir_all(dir.path().join("s1")).unwrap();
        std::fs::create_dir_all(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join("study.yaml"), "").unwrap();
        assert_eq!(list_sessions(dir.path()).unwrap(), vec!["s1", "s2"]);
    }
}
