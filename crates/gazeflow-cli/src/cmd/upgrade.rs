use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let orch = super::open(root)?;
    let upgraded = orch
        .upgrade_all()
        .context("failed to upgrade action state files")?;

    if json {
        let units: Vec<String> = upgraded.iter().map(|u| u.to_string()).collect();
        return print_json(&units);
    }
    if upgraded.is_empty() {
        println!("All action state files are current.");
    } else {
        for unit in &upgraded {
            println!("upgraded {unit}");
        }
    }
    Ok(())
}
