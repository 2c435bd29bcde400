use crate::output::{print_json, print_table};
use anyhow::Context;
use gazeflow_core::action::{Action, ActionState, Scope};
use gazeflow_core::session::Session;
use std::path::Path;

pub fn run(root: &Path, session: Option<&str>, json: bool) -> anyhow::Result<()> {
    let orch = super::open(root)?;
    match session {
        Some(name) => {
            let session = orch
                .load_session(name)
                .with_context(|| format!("failed to load session '{name}'"))?;
            if json {
                return print_json(&session);
            }
            print_session(&session);
            Ok(())
        }
        None => {
            let names = orch.sessions().context("failed to list sessions")?;
            let mut sessions = Vec::with_capacity(names.len());
            for name in &names {
                sessions.push(
                    orch.load_session(name)
                        .with_context(|| format!("failed to load session '{name}'"))?,
                );
            }
            if json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("No sessions found in {}", root.display());
                return Ok(());
            }
            let rows = sessions.iter().map(summary_row).collect();
            print_table(
                &["SESSION", "RECORDINGS", "COMPLETED", "IN FLIGHT", "FAILED"],
                rows,
            );
            Ok(())
        }
    }
}

#[derive(Default)]
struct Tally {
    completed: usize,
    in_flight: usize,
    failed: usize,
}

fn tally(session: &Session) -> Tally {
    let mut t = Tally::default();
    let states = session
        .states
        .values()
        .chain(session.recordings.iter().flat_map(|r| r.states.values()));
    for state in states {
        match state {
            ActionState::Completed => t.completed += 1,
            ActionState::Pending | ActionState::Running => t.in_flight += 1,
            ActionState::Failed => t.failed += 1,
            _ => {}
        }
    }
    t
}

fn summary_row(session: &Session) -> Vec<String> {
    let t = tally(session);
    let imported = session.recordings.iter().filter(|r| r.persisted).count();
    vec![
        session.name.clone(),
        format!("{imported}/{}", session.recordings.len()),
        t.completed.to_string(),
        t.in_flight.to_string(),
        t.failed.to_string(),
    ]
}

/// One row per action, one column per unit; blank where the action does
/// not apply to that unit's scope.
fn print_session(session: &Session) {
    let mut headers = vec!["ACTION".to_string(), format!("{} (session)", session.name)];
    headers.extend(session.recordings.iter().map(|r| r.name().to_string()));
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();

    let rows = Action::all()
        .iter()
        .map(|&action| {
            let mut row = vec![action.to_string()];
            match action.scope() {
                Scope::Session => {
                    row.push(session.state(action).to_string());
                    row.extend(session.recordings.iter().map(|_| String::new()));
                }
                Scope::Recording => {
                    row.push(String::new());
                    row.extend(session.recordings.iter().map(|r| r.state(action).to_string()));
                }
            }
            row
        })
        .collect();
    print_table(&header_refs, rows);
}
