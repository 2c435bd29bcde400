use crate::error::{GazeflowError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

pub const STUDY_CONFIG_FILE: &str = "study.yaml";
pub const ACTION_STATES_FILE: &str = "action_states.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn study_config_path(root: &Path) -> PathBuf {
    root.join(STUDY_CONFIG_FILE)
}

pub fn session_dir(root: &Path, session: &str) -> PathBuf {
    root.join(session)
}

pub fn recording_dir(root: &Path, session: &str, recording: &str) -> PathBuf {
    session_dir(root, session).join(recording)
}

pub fn session_states_path(root: &Path, session: &str) -> PathBuf {
    session_dir(root, session).join(ACTION_STATES_FILE)
}

pub fn recording_states_path(root: &Path, session: &str, recording: &str) -> PathBuf {
    recording_dir(root, session, recording).join(ACTION_STATES_FILE)
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_. \-]*$").unwrap_or_else(|e| {
            unreachable!("session name pattern is a valid regex: {e}")
        })
    })
}

/// Session and recording names become directory names, so they must be a
/// single, non-hidden path component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 || name.ends_with(' ') || !name_re().is_match(name) {
        return Err(GazeflowError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["session_01", "cam1", "participant 3", "et.left", "S-2"] {
            validate_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", ".hidden", "a/b", "..", "-x", "trailing ", "a\\b"] {
            assert!(validate_name(name).is_err(), "expected invalid: {name}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/data/study");
        assert_eq!(
            study_config_path(root),
            PathBuf::from("/data/study/study.yaml")
        );
        assert_eq!(
            session_states_path(root, "s1"),
            PathBuf::from("/data/study/s1/action_states.yaml")
        );
        assert_eq!(
            recording_states_path(root, "s1", "tutor"),
            PathBuf::from("/data/study/s1/tutor/action_states.yaml")
        );
    }
}
