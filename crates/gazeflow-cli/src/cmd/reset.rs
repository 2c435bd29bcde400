use crate::output::print_json;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

pub fn run(
    root: &Path,
    action: &str,
    session: &str,
    recording: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let orch = super::open(root)?;
    let action = super::parse_action(action)?;
    let unit = super::unit_for(action, session, recording)?;

    let touched = orch
        .reset_action(unit.clone(), action)
        .with_context(|| format!("failed to reset '{action}' on {unit}"))?;

    if json {
        #[derive(Serialize)]
        struct ResetOutput<'a> {
            action: &'a str,
            unit: String,
            touched: Vec<String>,
        }
        return print_json(&ResetOutput {
            action: action.as_str(),
            unit: unit.to_string(),
            touched: touched.iter().map(|u| u.to_string()).collect(),
        });
    }

    println!("Reset {action} on {unit}");
    for u in touched.iter().filter(|u| **u != unit) {
        println!("  cascaded to {u}");
    }
    Ok(())
}
