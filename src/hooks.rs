//! Per-dataset pre/post hook scripts
//!
//! A hook is called as `<hook> <dataset>` with the details of the run in
//! the environment. The pre hook runs just before a dataset is captured and
//! the post hook right after, so services can be quiesced only for the
//! moment the copy is taken.

use std::fmt;
use std::path::PathBuf;

use tracing::info;

use crate::config::Settings;
use crate::error::{ZborgError, ZborgResult};
use crate::models::{Dataset, Tier};
use crate::process::{CommandRunner, CommandSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Pre,
    Post,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

pub struct Hooks<'a> {
    runner: &'a dyn CommandRunner,
    pre: Option<PathBuf>,
    post: Option<PathBuf>,
}

impl<'a> Hooks<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &Settings) -> Self {
        Self {
            runner,
            pre: settings.pre_hook.clone(),
            post: settings.post_hook.clone(),
        }
    }

    /// Run the hook for `phase`, if one is configured
    ///
    /// `tier` is absent for `snap`, whose labels are arbitrary.
    pub fn run(&self, phase: HookPhase, dataset: &Dataset, label: &str, tier: Option<Tier>) -> ZborgResult<()> {
        let hook = match phase {
            HookPhase::Pre => &self.pre,
            HookPhase::Post => &self.post,
        };
        let Some(hook) = hook else {
            return Ok(());
        };

        let mut spec = CommandSpec::new(hook.to_string_lossy())
            .arg(&dataset.name)
            .env("ZBORG_DATASET", &dataset.name)
            .env("ZBORG_PHASE", phase.to_string())
            .env("ZBORG_LABEL", label)
            .inherit_output();
        if let Some(tier) = tier {
            spec = spec.env("ZBORG_TIER", tier.to_string());
        }

        info!(dataset = %dataset, %phase, hook = %hook.display(), "running hook");
        self.runner
            .run(&spec)
            .and_then(|output| output.check(&spec))
            .map(|_| ())
            .map_err(|e| ZborgError::Hook {
                hook: hook.display().to_string(),
                dataset: dataset.name.clone(),
                reason: e.to_string(),
            })
    }
}
