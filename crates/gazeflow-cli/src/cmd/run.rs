use crate::output::{join_or_dash, print_json, print_table};
use anyhow::Context;
use gazeflow_core::action::{Action, ActionState};
use gazeflow_core::possibility::Possibility;
use gazeflow_core::session::Unit;
use gazeflow_pool::JobId;
use serde::Serialize;
use std::path::Path;
use std::sync::mpsc;

#[derive(Serialize)]
struct Outcome {
    job: JobId,
    unit: Unit,
    action: Action,
    state: ActionState,
}

pub fn run(
    root: &Path,
    action: &str,
    session: &str,
    recordings: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let orch = super::open(root)?;
    let action = super::parse_action(action)?;

    let possible = orch
        .possible_actions(session, Some(&[action]))
        .with_context(|| format!("failed to evaluate session '{session}'"))?;
    let Some(possibility) = possible.get(&action) else {
        anyhow::bail!("'{action}' does not apply to session '{session}' under the current study.yaml");
    };

    let units = match possibility {
        Possibility::Session(p) => {
            if !recordings.is_empty() {
                anyhow::bail!("'{action}' runs once per session; drop --recording");
            }
            if p.in_flight {
                anyhow::bail!(
                    "'{action}' is already pending or running on '{session}' \
                     (run `gazeflow recover` if no job is active)"
                );
            }
            if !p.runnable {
                let blockers: Vec<String> = p.blocked.keys().map(|a| a.to_string()).collect();
                anyhow::bail!("'{action}' is blocked by: {}", blockers.join(", "));
            }
            vec![Unit::session(session)]
        }
        Possibility::Recording(p) => {
            let chosen: Vec<&String> = if recordings.is_empty() {
                p.runnable.iter().collect()
            } else {
                recordings.iter().collect()
            };
            if chosen.is_empty() {
                anyhow::bail!("'{action}' is not runnable on any recording of '{session}'");
            }
            for rec in &chosen {
                if p.in_flight.contains(*rec) {
                    anyhow::bail!(
                        "'{action}' is already pending or running on '{rec}' \
                         (run `gazeflow recover` if no job is active)"
                    );
                }
                if let Some(unmet) = p.blocked.get(rec.as_str()) {
                    anyhow::bail!(
                        "'{action}' on '{rec}' is blocked by: {}",
                        join_or_dash(unmet.iter().map(|a| a.as_str()))
                    );
                }
                if !p.runnable.contains(*rec) {
                    anyhow::bail!("'{action}' does not apply to recording '{rec}'");
                }
            }
            chosen
                .into_iter()
                .map(|rec| super::unit_for(action, session, Some(rec.as_str())))
                .collect::<anyhow::Result<Vec<Unit>>>()?
        }
    };

    let (tx, rx) = mpsc::channel();
    for unit in &units {
        let tx = tx.clone();
        orch.submit_observed(action, unit.clone(), move |job, ticket, state| {
            let _ = tx.send(Outcome {
                job,
                unit: ticket.unit.clone(),
                action: ticket.action,
                state,
            });
        })
        .with_context(|| format!("failed to submit '{action}' on {unit}"))?;
    }
    drop(tx);

    let mut outcomes: Vec<Outcome> = rx.iter().collect();
    outcomes.sort_by_key(|o| o.job);
    let failed = outcomes
        .iter()
        .filter(|o| o.state != ActionState::Completed)
        .count();

    if json {
        print_json(&outcomes)?;
    } else {
        let rows = outcomes
            .iter()
            .map(|o| vec![o.job.to_string(), o.unit.to_string(), o.state.to_string()])
            .collect();
        print_table(&["JOB", "UNIT", "STATE"], rows);
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} job(s) did not complete", outcomes.len());
    }
    Ok(())
}
