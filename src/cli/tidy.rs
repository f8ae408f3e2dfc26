//! `tidy` command

use chrono::Local;
use tracing::info;

use super::summary::format_tidy_report;
use super::{Session, SystemTools};
use crate::backup::{SnapshotManager, StepPolicy, TidyRecovery, TidyReport};
use crate::error::ZborgResult;
use crate::process::SystemRunner;

/// Remove today's partial state so `run` can be repeated
pub fn handle_tidy_command(session: &Session) -> ZborgResult<TidyReport> {
    let credentials = session.credentials()?;
    let runner = SystemRunner;
    let system = SystemTools::new(&runner, &session.settings, &credentials);
    let tools = system.tools();
    let snapshots = SnapshotManager::new(tools.snapshots, session.settings.settle_delay());
    let tidy = TidyRecovery::new(&session.settings, &snapshots, tools.archives, StepPolicy::BestEffort);

    info!(config = %session.config_path.display(), "starting tidy");
    let report = tidy.tidy(&session.settings.datasets, Local::now().date_naive())?;
    print!("{}", format_tidy_report(&report));
    Ok(report)
}
