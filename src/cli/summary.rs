//! Tabular summaries printed after each subcommand

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::backup::{DatasetReport, RunReport, StepFailure, TidyReport};

#[derive(Tabled)]
struct DatasetRow {
    #[tabled(rename = "Dataset")]
    dataset: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Archive")]
    archive: String,
    #[tabled(rename = "Destinations")]
    destinations: String,
    #[tabled(rename = "Pruned")]
    pruned: usize,
}

impl From<&DatasetReport> for DatasetRow {
    fn from(report: &DatasetReport) -> Self {
        let tier = match report.tier {
            Some(tier) if report.forced => format!("{} (forced)", tier),
            Some(tier) => tier.to_string(),
            None => "-".to_string(),
        };
        Self {
            dataset: report.dataset.clone(),
            tier,
            archive: report.archive.clone(),
            destinations: report
                .destinations
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            pruned: report.snapshots_pruned.len(),
        }
    }
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Error")]
    message: String,
}

impl From<&StepFailure> for FailureRow {
    fn from(failure: &StepFailure) -> Self {
        Self {
            step: failure.step.clone(),
            message: failure.message.clone(),
        }
    }
}

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "Action")]
    action: &'static str,
    #[tabled(rename = "Target")]
    target: String,
}

fn failures_table(failures: &[StepFailure]) -> String {
    let mut table = Table::new(failures.iter().map(FailureRow::from));
    table.with(Style::rounded());
    table.to_string()
}

/// Summary of a `run` or `snap`
pub fn format_run_report(report: &RunReport) -> String {
    let mut out = String::new();
    if report.datasets.is_empty() {
        out.push_str("No datasets were backed up.\n");
    } else {
        let mut table = Table::new(report.datasets.iter().map(DatasetRow::from));
        table.with(Style::rounded());
        out.push_str(&table.to_string());
        out.push('\n');
    }
    if !report.failures.is_empty() {
        out.push_str("\nFailures:\n");
        out.push_str(&failures_table(&report.failures));
        out.push('\n');
    }
    out
}

/// Summary of a `tidy`
pub fn format_tidy_report(report: &TidyReport) -> String {
    if report.is_noop() {
        return "Nothing to tidy.\n".to_string();
    }

    let rows = report
        .unmounted
        .iter()
        .map(|p| ActionRow {
            action: "unmounted",
            target: p.display().to_string(),
        })
        .chain(report.snapshots_destroyed.iter().map(|s| ActionRow {
            action: "snapshot destroyed",
            target: s.clone(),
        }))
        .chain(report.archives_deleted.iter().map(|a| ActionRow {
            action: "archive deleted",
            target: a.clone(),
        }));

    let mut out = String::new();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    out.push_str(&table.to_string());
    out.push('\n');
    if !report.failures.is_empty() {
        out.push_str("\nFailures:\n");
        out.push_str(&failures_table(&report.failures));
        out.push('\n');
    }
    out
}
