//! Ordered, verified fallback chain that makes a required tool runnable.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::context::EnvironmentContext;
use crate::pathreg::Registration;
use crate::platform::Platform;
use crate::probe::ToolRequirement;
use crate::strategy::{AcquisitionStrategy, DirectDownload};

#[derive(Debug, Clone)]
/// Result of [`acquire`] for one tool.
pub struct AcquisitionOutcome {
    pub tool: String,
    /// Strategy that succeeded, or the last one attempted on failure; `None` when nothing ran.
    pub strategy_used: Option<AcquisitionStrategy>,
    pub succeeded: bool,
    /// Absolute path of the primary executable when it is only reachable outside PATH.
    pub resolved_executable_path: Option<PathBuf>,
    /// Every probed program found outside PATH, keyed by program name.
    pub resolved: BTreeMap<String, PathBuf>,
    /// Directories newly added to the system PATH.
    pub registered_paths: Vec<PathBuf>,
    /// Number of strategies actually executed.
    pub attempts: usize,
    pub diagnostic: String,
}

impl AcquisitionOutcome {
    fn present(requirement: &ToolRequirement) -> Self {
        Self {
            tool: requirement.name.clone(),
            strategy_used: None,
            succeeded: true,
            resolved_executable_path: None,
            resolved: BTreeMap::new(),
            registered_paths: Vec::new(),
            attempts: 0,
            diagnostic: String::new(),
        }
    }

    /// True when a strategy ran and the tool is now usable.
    pub fn newly_installed(&self) -> bool {
        self.succeeded && self.attempts > 0
    }
}

/// Make `requirement` runnable, trying its strategies in declared order.
///
/// Package managers are used only without elevation and only when their own probe
/// passes. Direct downloads run when elevated or as the last resort. After every
/// attempt the tool is probed again and the chain stops at the first success.
pub fn acquire(
    ctx: &EnvironmentContext,
    platform: &dyn Platform,
    requirement: &ToolRequirement,
) -> AcquisitionOutcome {
    if platform.probe(ctx, requirement) {
        tracing::debug!(tool = %requirement.name, "already available");
        return AcquisitionOutcome::present(requirement);
    }

    let mut outcome = AcquisitionOutcome {
        succeeded: false,
        ..AcquisitionOutcome::present(requirement)
    };
    outcome.diagnostic = "no install strategy applies to this environment".to_string();

    for strategy in &requirement.strategies {
        match strategy {
            AcquisitionStrategy::PackageManager { manager, package } => {
                if ctx.is_elevated() {
                    tracing::debug!(manager = manager.name(), "skipping package manager while elevated");
                    continue;
                }
                if !platform.probe_invocation(ctx, &manager.probe()) {
                    tracing::info!(manager = manager.name(), "package manager not available");
                    continue;
                }
                outcome.attempts += 1;
                outcome.strategy_used = Some(strategy.clone());
                if let Err(err) = platform.install_package(*manager, package) {
                    tracing::warn!(tool = %requirement.name, %strategy, error = %err, "install failed");
                    outcome.diagnostic = format!("{:#}", err);
                    continue;
                }
            }
            AcquisitionStrategy::DirectDownload(install) => {
                outcome.attempts += 1;
                outcome.strategy_used = Some(strategy.clone());
                if let Err(err) = platform.download_and_run(&requirement.name, install) {
                    tracing::warn!(tool = %requirement.name, %strategy, error = %err, "install failed");
                    outcome.diagnostic = format!("{:#}", err);
                    continue;
                }
                if ctx.is_elevated() {
                    register_install_paths(ctx, platform, install, &mut outcome.registered_paths);
                }
            }
        }

        if platform.probe(ctx, requirement) {
            tracing::info!(tool = %requirement.name, %strategy, "installed");
            outcome.succeeded = true;
            outcome.diagnostic.clear();
            return outcome;
        }
        if let Some(found) = platform.locate(ctx, requirement) {
            tracing::info!(tool = %requirement.name, %strategy, "installed outside PATH");
            outcome.resolved_executable_path = requirement
                .probes
                .first()
                .and_then(|invocation| found.get(&invocation.program).cloned());
            outcome.resolved = found;
            outcome.succeeded = true;
            outcome.diagnostic.clear();
            return outcome;
        }
        outcome.diagnostic = format!(
            "{} reported success but {} is still not runnable",
            strategy, requirement.name
        );
        tracing::warn!(tool = %requirement.name, %strategy, "probe still failing after install");
    }

    outcome
}

fn register_install_paths(
    ctx: &EnvironmentContext,
    platform: &dyn Platform,
    install: &DirectDownload,
    registered: &mut Vec<PathBuf>,
) {
    for dir in &install.common_install_paths {
        if !dir.is_dir() {
            continue;
        }
        match platform.register_path(ctx, dir) {
            Ok(Registration::Appended { notified }) => {
                if !notified {
                    tracing::warn!(dir = %dir.display(), "PATH updated; a restart is required for other programs to see it");
                }
                registered.push(dir.clone());
            }
            Ok(Registration::AlreadyPresent) => {}
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %format!("{:#}", err), "failed to add to system PATH");
            }
        }
    }
}
