//! `run` and `snap` commands

use chrono::Local;
use tracing::info;

use super::summary::format_run_report;
use super::{Session, SystemTools};
use crate::backup::{Lifecycle, RunReport, StepPolicy};
use crate::error::ZborgResult;
use crate::process::SystemRunner;

/// Back up every dataset of the configuration with today's tier
pub fn handle_run_command(session: &Session) -> ZborgResult<RunReport> {
    let credentials = session.credentials()?;
    let runner = SystemRunner;
    let system = SystemTools::new(&runner, &session.settings, &credentials);
    let lifecycle = Lifecycle::new(&session.settings, system.tools(), StepPolicy::FailFast);

    info!(config = %session.config_path.display(), datasets = session.settings.datasets.len(), "starting run");
    let report = lifecycle.run(Local::now().naive_local())?;
    print!("{}", format_run_report(&report));
    Ok(report)
}

/// Archive the existing snapshot `label` of every dataset
pub fn handle_snap_command(session: &Session, label: &str) -> ZborgResult<RunReport> {
    let credentials = session.credentials()?;
    let runner = SystemRunner;
    let system = SystemTools::new(&runner, &session.settings, &credentials);
    let lifecycle = Lifecycle::new(&session.settings, system.tools(), StepPolicy::FailFast);

    info!(config = %session.config_path.display(), label = label, "starting snap");
    let report = lifecycle.snap(label)?;
    print!("{}", format_run_report(&report));
    Ok(report)
}
