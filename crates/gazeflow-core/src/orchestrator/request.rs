//! What travels with a job: the ticket the pool keeps, and the request the
//! worker process reads on stdin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::action::Action;
use crate::config::StudyConfig;
use crate::session::Unit;

/// Pool payload identifying which action runs on which unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub action: Action,
    pub unit: Unit,
}

impl JobTicket {
    pub fn new(action: Action, unit: Unit) -> Self {
        Self { action, unit }
    }
}

/// JSON document written to a worker's stdin.
///
/// The worker performs exactly one action in `working_dir` and reports the
/// outcome through its exit status; it never touches the state files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    pub action: Action,
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<String>,
    pub working_dir: PathBuf,
    pub config: StudyConfig,
    pub submitted_at: DateTime<Utc>,
}

impl WorkRequest {
    pub fn new(ticket: &JobTicket, root: &Path, config: &StudyConfig) -> Self {
        Self {
            action: ticket.action,
            session: ticket.unit.session_name().to_string(),
            recording: ticket.unit.recording_name().map(str::to_string),
            working_dir: ticket.unit.dir(root),
            config: config.clone(),
            submitted_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_unit_and_action() {
        let ticket = JobTicket::new(Action::DetectMarkers, Unit::recording("s1", "cam"));
        let request = WorkRequest::new(&ticket, Path::new("/study"), &StudyConfig::default());
        let json: serde_json::Value =
            serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        assert_eq!(json["action"], "detect_markers");
        assert_eq!(json["session"], "s1");
        assert_eq!(json["recording"], "cam");
        assert_eq!(json["working_dir"], "/study/s1/cam");
        assert!(json["config"]["worker"]["program"].is_string());
    }

    #[test]
    fn session_request_omits_recording() {
        let ticket = JobTicket::new(Action::ExportTrials, Unit::session("s1"));
        let request = WorkRequest::new(&ticket, Path::new("/study"), &StudyConfig::default());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("recording").is_none());
        let back: WorkRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.action, Action::ExportTrials);
    }
}
