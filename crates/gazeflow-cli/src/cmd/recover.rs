use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let orch = super::open(root)?;
    let recovered = orch
        .recover_interrupted()
        .context("failed to recover interrupted actions")?;

    if json {
        return print_json(&recovered);
    }
    if recovered.is_empty() {
        println!("Nothing to recover.");
        return Ok(());
    }
    let rows = recovered
        .iter()
        .map(|r| vec![r.unit.to_string(), r.action.to_string(), r.state.to_string()])
        .collect();
    print_table(&["UNIT", "ACTION", "NOW"], rows);
    Ok(())
}
