//! `workagent list-tools`: the registry as the model sees it.

use std::process::ExitCode;

use workagent_config::AppConfig;

use super::build_registry;

pub fn run(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let registry = build_registry(config)?;

    if registry.is_empty() {
        println!("No tools registered.");
        return Ok(ExitCode::SUCCESS);
    }

    let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);
    for tool in registry.list() {
        println!("{:<width$}  {}", tool.name(), tool.description());
    }
    Ok(ExitCode::SUCCESS)
}
