//! Failure handling policy per subcommand
//!
//! `run` and `snap` stop at the first failed step; `tidy` records the failure
//! and keeps going so as much of the day's partial state as possible is
//! cleaned up.

use serde::Serialize;
use tracing::warn;

use crate::error::{ZborgError, ZborgResult};

/// How a failed step affects the rest of the invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Propagate the first error
    FailFast,
    /// Log, record and continue
    BestEffort,
}

/// A step that failed under `BestEffort`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: String,
    pub message: String,
}

impl StepPolicy {
    /// Apply the policy to a step's result
    ///
    /// Returns `Ok(Some(value))` on success, `Ok(None)` for a failure that
    /// was recorded, and `Err` when the failure must abort.
    pub fn handle<T>(
        &self,
        step: &str,
        result: ZborgResult<T>,
        failures: &mut Vec<StepFailure>,
    ) -> ZborgResult<Option<T>> {
        match (result, self) {
            (Ok(value), _) => Ok(Some(value)),
            (Err(err), Self::FailFast) => Err(err),
            (Err(err), Self::BestEffort) => {
                warn!(step = step, error = %err, "step failed, continuing");
                failures.push(StepFailure {
                    step: step.to_string(),
                    message: err.to_string(),
                });
                Ok(None)
            }
        }
    }
}

/// Run every attempt, then return the first error (if any)
///
/// Used where independent targets must all be tried even though one failure
/// fails the whole step, e.g. pruning both destinations.
pub fn first_error(results: Vec<ZborgResult<()>>) -> ZborgResult<()> {
    results.into_iter().collect::<Result<Vec<()>, ZborgError>>().map(|_| ())
}
