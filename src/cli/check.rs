//! `check` command
//!
//! Loads and validates a configuration without touching any dataset, then
//! prints the effective settings as JSON.

use serde::Serialize;

use super::Session;
use crate::config::Settings;
use crate::error::ZborgResult;
use crate::models::Repository;

#[derive(Serialize)]
struct CheckOutput<'a> {
    config: String,
    settings: &'a Settings,
    repositories: Vec<DatasetRepositories>,
}

#[derive(Serialize)]
struct DatasetRepositories {
    dataset: String,
    repositories: Vec<Repository>,
}

/// Render the effective configuration as pretty JSON
pub fn format_check(session: &Session) -> ZborgResult<String> {
    let settings = &session.settings;
    let output = CheckOutput {
        config: session.config_path.display().to_string(),
        settings,
        repositories: settings
            .datasets
            .iter()
            .map(|dataset| DatasetRepositories {
                dataset: dataset.name.clone(),
                repositories: settings.repositories(dataset),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Validate the configuration and its passphrase file
pub fn handle_check_command(session: &Session) -> ZborgResult<()> {
    session.credentials()?;
    println!("{}", format_check(session)?);
    Ok(())
}
