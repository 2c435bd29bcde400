use crate::output::{join_or_dash, print_json, print_table};
use anyhow::Context;
use gazeflow_core::action::Action;
use gazeflow_core::possibility::Possibility;
use std::path::Path;

pub fn run(root: &Path, session: &str, actions: &[String], json: bool) -> anyhow::Result<()> {
    let orch = super::open(root)?;
    let actions = actions
        .iter()
        .map(|a| super::parse_action(a))
        .collect::<anyhow::Result<Vec<Action>>>()?;
    let filter = (!actions.is_empty()).then_some(actions.as_slice());

    let possible = orch
        .possible_actions(session, filter)
        .with_context(|| format!("failed to evaluate session '{session}'"))?;

    if json {
        return print_json(&possible);
    }

    let rows = possible
        .iter()
        .map(|(action, p)| match p {
            Possibility::Recording(rp) => vec![
                action.to_string(),
                "recording".to_string(),
                join_or_dash(&rp.runnable),
                join_or_dash(rp.blocked.iter().map(|(rec, unmet)| {
                    format!("{rec}: {}", join_or_dash(unmet.iter().map(|a| a.as_str())))
                })),
                join_or_dash(&rp.in_flight),
            ],
            Possibility::Session(sp) => vec![
                action.to_string(),
                "session".to_string(),
                if sp.runnable { "yes" } else { "no" }.to_string(),
                join_or_dash(sp.blocked.iter().map(|(unmet, recs)| match recs {
                    Some(recs) => format!("{unmet} ({})", recs.join(", ")),
                    None => unmet.to_string(),
                })),
                if sp.in_flight { "session" } else { "-" }.to_string(),
            ],
        })
        .collect();
    print_table(&["ACTION", "SCOPE", "RUNNABLE", "BLOCKED BY", "IN FLIGHT"], rows);
    Ok(())
}
