pub mod possible;
pub mod recover;
pub mod reset;
pub mod run;
pub mod status;
pub mod upgrade;

use anyhow::Context;
use gazeflow_core::action::{Action, Scope};
use gazeflow_core::config::WarnLevel;
use gazeflow_core::orchestrator::Orchestrator;
use gazeflow_core::session::Unit;
use std::path::Path;
use tracing::warn;

/// Open the study at `root`, surfacing config warnings through the log.
pub fn open(root: &Path) -> anyhow::Result<Orchestrator> {
    let orch = Orchestrator::open(root)
        .with_context(|| format!("failed to open study at {}", root.display()))?;
    for w in orch.config().validate() {
        match w.level {
            WarnLevel::Error => warn!("study.yaml error: {}", w.message),
            WarnLevel::Warning => warn!("study.yaml: {}", w.message),
        }
    }
    Ok(orch)
}

pub fn parse_action(name: &str) -> anyhow::Result<Action> {
    name.parse::<Action>().with_context(|| {
        let known: Vec<&str> = Action::all().iter().map(|a| a.as_str()).collect();
        format!("expected one of: {}", known.join(", "))
    })
}

/// The unit an action addresses: the session itself, or one recording.
pub fn unit_for(action: Action, session: &str, recording: Option<&str>) -> anyhow::Result<Unit> {
    match (action.scope(), recording) {
        (Scope::Session, None) => Ok(Unit::session(session)),
        (Scope::Session, Some(_)) => {
            anyhow::bail!("'{action}' runs once per session; drop --recording")
        }
        (Scope::Recording, Some(r)) => Ok(Unit::recording(session, r)),
        (Scope::Recording, None) => {
            anyhow::bail!("'{action}' runs per recording; pass --recording <NAME>")
        }
    }
}
