//! Fetch/pull of a branch wrapped in a stash-protect/restore envelope.
//!
//! One call walks `Start → Stashed|StashSkipped → Fetched|FetchFailed →
//! Pulled|PullFailed → Restored|RestoreSkipped|RestoreFailed → Done`. Stash state is
//! always read fresh from git right before it is acted on.

use std::path::{Path, PathBuf};

use crate::classify::{self, Diagnosis};
use crate::clock::compact_timestamp;
use crate::error::ProvisionError;
use crate::git::Git;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A local clone being operated on by one workflow.
pub struct RepositoryHandle {
    pub working_directory: PathBuf,
    pub current_branch: String,
}

impl RepositoryHandle {
    pub fn new(working_directory: impl Into<PathBuf>, current_branch: impl Into<String>) -> Self {
        Self {
            working_directory: working_directory.into(),
            current_branch: current_branch.into(),
        }
    }

    /// Open an existing clone, using `fallback_branch` when the current branch cannot be read.
    pub fn open(git: &Git, dir: &Path, fallback_branch: &str) -> Self {
        let current_branch = match git.current_branch(dir) {
            Ok(branch) => branch,
            Err(err) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %format!("{:#}", err),
                    fallback = fallback_branch,
                    "cannot read current branch"
                );
                fallback_branch.to_string()
            }
        };
        Self::new(dir, current_branch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of a sync or branch switch.
pub enum SyncResult {
    /// New commits were integrated and protected local edits were re-applied.
    UpdatedCleanly,
    /// Nothing new upstream; any protected edits were re-applied.
    AlreadyUpToDate,
    /// New commits were integrated; there were no local edits to carry.
    NoLocalChanges,
    /// Re-applying protected edits conflicted; the stash entry `stash` is kept.
    RestoreConflict { details: String, stash: String },
    /// Integration could not fast-forward or conflicted.
    MergeConflict {
        details: String,
        pending_stash: Option<String>,
    },
    /// The client refused the directory for ownership or permission reasons.
    OwnershipError {
        suggested_remedy: String,
        pending_stash: Option<String>,
    },
    NetworkError {
        details: String,
        pending_stash: Option<String>,
    },
    OtherFailure {
        details: String,
        pending_stash: Option<String>,
    },
}

impl SyncResult {
    /// True when the workflow may proceed to its next step.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SyncResult::UpdatedCleanly | SyncResult::AlreadyUpToDate | SyncResult::NoLocalChanges
        )
    }

    /// Label of a stash entry left behind for manual recovery.
    pub fn pending_stash(&self) -> Option<&str> {
        match self {
            SyncResult::RestoreConflict { stash, .. } => Some(stash),
            SyncResult::MergeConflict { pending_stash, .. }
            | SyncResult::OwnershipError { pending_stash, .. }
            | SyncResult::NetworkError { pending_stash, .. }
            | SyncResult::OtherFailure { pending_stash, .. } => pending_stash.as_deref(),
            _ => None,
        }
    }

    /// Attach `label` as the pending stash when the result has none yet.
    pub(crate) fn with_pending_stash(self, label: Option<&str>) -> Self {
        let Some(label) = label else {
            return self;
        };
        let fill = |pending: Option<String>| pending.or_else(|| Some(label.to_string()));
        match self {
            SyncResult::MergeConflict {
                details,
                pending_stash,
            } => SyncResult::MergeConflict {
                details,
                pending_stash: fill(pending_stash),
            },
            SyncResult::OwnershipError {
                suggested_remedy,
                pending_stash,
            } => SyncResult::OwnershipError {
                suggested_remedy,
                pending_stash: fill(pending_stash),
            },
            SyncResult::NetworkError {
                details,
                pending_stash,
            } => SyncResult::NetworkError {
                details,
                pending_stash: fill(pending_stash),
            },
            SyncResult::OtherFailure {
                details,
                pending_stash,
            } => SyncResult::OtherFailure {
                details,
                pending_stash: fill(pending_stash),
            },
            other => other,
        }
    }

    /// The classified error for failing results.
    pub fn into_error(self) -> Option<ProvisionError> {
        match self {
            SyncResult::UpdatedCleanly
            | SyncResult::AlreadyUpToDate
            | SyncResult::NoLocalChanges => None,
            SyncResult::RestoreConflict { details, .. } => {
                Some(ProvisionError::RestoreConflict { details })
            }
            SyncResult::MergeConflict { details, .. } => {
                Some(ProvisionError::MergeConflict { details })
            }
            SyncResult::OwnershipError {
                suggested_remedy, ..
            } => {
                Some(ProvisionError::OwnershipOrPermission {
                    remedy: suggested_remedy,
                })
            }
            SyncResult::NetworkError { details, .. } => Some(ProvisionError::Network { details }),
            SyncResult::OtherFailure { details, .. } => Some(ProvisionError::Other { details }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of the protect step.
pub(crate) enum Protection {
    Stashed(String),
    NothingToStash,
}

impl Protection {
    pub(crate) fn label(&self) -> Option<&str> {
        match self {
            Protection::Stashed(label) => Some(label),
            Protection::NothingToStash => None,
        }
    }
}

/// Bring `handle` up to date with the remote `branch`, carrying uncommitted edits across.
pub fn sync(git: &Git, handle: &mut RepositoryHandle, branch: &str) -> SyncResult {
    let dir = handle.working_directory.clone();
    tracing::info!(dir = %dir.display(), branch, "syncing repository");

    let protection = match protect(git, &dir, "BeforeUpdate") {
        Ok(protection) => protection,
        Err(result) => return result,
    };
    let pending = protection.label();

    match git.fetch(&dir, branch) {
        Ok(output) if output.success => tracing::debug!(branch, "fetched"),
        Ok(output) => {
            if let Some(result) = ownership_failure(&output.text, &dir, pending) {
                return result;
            }
            tracing::warn!(branch, details = %output.text, "fetch failed; trying pull anyway");
        }
        Err(err) => {
            tracing::warn!(branch, error = %format!("{:#}", err), "fetch failed; trying pull anyway")
        }
    }

    let pulled = match git.pull(&dir, branch) {
        Ok(output) if output.success => output,
        Ok(output) => {
            tracing::warn!(branch, details = %output.text, "pull failed; local changes stay stashed");
            return failure_from(&output.text, &dir, pending);
        }
        Err(err) => {
            return SyncResult::OtherFailure {
                details: format!("{:#}", err),
                pending_stash: pending.map(str::to_string),
            };
        }
    };
    handle.current_branch = branch.to_string();
    let up_to_date = classify::classify(&pulled.text) == Diagnosis::AlreadyUpToDate;
    tracing::info!(branch, up_to_date, "pulled");

    match protection {
        Protection::NothingToStash if up_to_date => SyncResult::AlreadyUpToDate,
        Protection::NothingToStash => SyncResult::NoLocalChanges,
        Protection::Stashed(label) => match restore(git, &dir, &label) {
            Err(result) => result,
            Ok(()) if up_to_date => SyncResult::AlreadyUpToDate,
            Ok(()) => SyncResult::UpdatedCleanly,
        },
    }
}

/// Stash every local modification, untracked files included, under a timestamped label.
pub(crate) fn protect(git: &Git, dir: &Path, purpose: &str) -> Result<Protection, SyncResult> {
    let label = format!("AutoStash_{}_{}", purpose, compact_timestamp());
    let output = git
        .stash_push(dir, &label)
        .map_err(|err| SyncResult::OtherFailure {
            details: format!("{:#}", err),
            pending_stash: None,
        })?;
    match classify::classify(&output.text) {
        Diagnosis::NothingToStash => {
            tracing::info!(dir = %dir.display(), "no local changes to protect");
            Ok(Protection::NothingToStash)
        }
        _ if output.success => {
            if !output.text.trim().is_empty() {
                tracing::warn!(dir = %dir.display(), %label, details = %output.text, "stash reported warnings");
            }
            tracing::info!(dir = %dir.display(), %label, "local changes stashed");
            Ok(Protection::Stashed(label))
        }
        Diagnosis::Ownership | Diagnosis::Permission => Err(SyncResult::OwnershipError {
            suggested_remedy: classify::ownership_remedy(&output.text, dir),
            pending_stash: None,
        }),
        _ => Err(SyncResult::OtherFailure {
            details: format!("could not protect local changes: {}", output.text),
            pending_stash: None,
        }),
    }
}

/// Pop exactly the stash entry carrying `label`, looked up fresh.
pub(crate) fn restore(git: &Git, dir: &Path, label: &str) -> Result<(), SyncResult> {
    let pending = || Some(label.to_string());
    let entries = git.stash_list(dir).map_err(|err| SyncResult::OtherFailure {
        details: format!("{:#}", err),
        pending_stash: pending(),
    })?;
    let Some(entry) = entries.iter().find(|entry| entry.message.contains(label)) else {
        tracing::warn!(%label, "stash entry no longer exists; nothing to restore");
        return Ok(());
    };

    let output = git
        .stash_pop(dir, &entry.reference)
        .map_err(|err| SyncResult::OtherFailure {
            details: format!("{:#}", err),
            pending_stash: pending(),
        })?;
    if output.success {
        tracing::info!(%label, "local changes restored");
        return Ok(());
    }

    tracing::warn!(%label, details = %output.text, "restoring local changes failed");
    Err(match classify::classify(&output.text) {
        Diagnosis::Conflict => SyncResult::RestoreConflict {
            details: output.text,
            stash: label.to_string(),
        },
        Diagnosis::Ownership | Diagnosis::Permission => SyncResult::OwnershipError {
            suggested_remedy: classify::ownership_remedy(&output.text, dir),
            pending_stash: pending(),
        },
        _ => SyncResult::OtherFailure {
            details: output.text,
            pending_stash: pending(),
        },
    })
}

pub(crate) fn ownership_failure(text: &str, dir: &Path, pending: Option<&str>) -> Option<SyncResult> {
    match classify::classify(text) {
        Diagnosis::Ownership | Diagnosis::Permission => Some(SyncResult::OwnershipError {
            suggested_remedy: classify::ownership_remedy(text, dir),
            pending_stash: pending.map(str::to_string),
        }),
        _ => None,
    }
}

pub(crate) fn failure_from(text: &str, dir: &Path, pending: Option<&str>) -> SyncResult {
    let pending_stash = pending.map(str::to_string);
    match classify::classify(text) {
        Diagnosis::Ownership | Diagnosis::Permission => SyncResult::OwnershipError {
            suggested_remedy: classify::ownership_remedy(text, dir),
            pending_stash,
        },
        Diagnosis::Conflict => SyncResult::MergeConflict {
            details: text.to_string(),
            pending_stash,
        },
        Diagnosis::Network => SyncResult::NetworkError {
            details: text.to_string(),
            pending_stash,
        },
        _ => SyncResult::OtherFailure {
            details: text.to_string(),
            pending_stash,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_stash_is_filled_only_when_missing() {
        let result = SyncResult::NetworkError {
            details: "offline".to_string(),
            pending_stash: None,
        }
        .with_pending_stash(Some("outer"));
        assert_eq!(result.pending_stash(), Some("outer"));

        let kept = SyncResult::OtherFailure {
            details: "x".to_string(),
            pending_stash: Some("inner".to_string()),
        }
        .with_pending_stash(Some("outer"));
        assert_eq!(kept.pending_stash(), Some("inner"));

        assert_eq!(
            SyncResult::AlreadyUpToDate.with_pending_stash(Some("outer")),
            SyncResult::AlreadyUpToDate
        );
    }

    #[test]
    fn failure_text_maps_to_result_kinds() {
        let dir = Path::new("/srv/st");
        assert!(matches!(
            failure_from("fatal: Not possible to fast-forward, aborting.", dir, Some("s")),
            SyncResult::MergeConflict { pending_stash: Some(_), .. }
        ));
        assert!(matches!(
            failure_from("fatal: unable to access 'https://x/': Could not resolve host: x", dir, None),
            SyncResult::NetworkError { pending_stash: None, .. }
        ));
        assert!(matches!(
            failure_from("fatal: detected dubious ownership in repository at '/srv/st'", dir, Some("s")),
            SyncResult::OwnershipError { pending_stash: Some(_), .. }
        ));
        assert!(matches!(
            failure_from("fatal: couldn't find remote ref nope", dir, None),
            SyncResult::OtherFailure { .. }
        ));
    }

    #[test]
    fn only_failures_convert_to_errors() {
        assert!(SyncResult::NoLocalChanges.into_error().is_none());
        assert!(matches!(
            SyncResult::OwnershipError {
                suggested_remedy: "git config --global --add safe.directory /x".to_string(),
                pending_stash: None,
            }
            .into_error(),
            Some(ProvisionError::OwnershipOrPermission { .. })
        ));
    }
}
