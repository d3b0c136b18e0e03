//! Move a working tree to another branch while carrying uncommitted edits along.

use crate::git::Git;
use crate::sync::{self, Protection, RepositoryHandle, SyncResult};

/// Check out `target`, update it from the remote and re-apply the edits made before the switch.
///
/// When already on `target` this is a plain [`sync::sync`]. A failed checkout or a failed
/// update leaves the pre-switch stash in place and names it in the result.
pub fn switch_to(git: &Git, handle: &mut RepositoryHandle, target: &str) -> SyncResult {
    if handle.current_branch == target {
        tracing::info!(branch = target, "already on target branch; updating instead");
        return sync::sync(git, handle, target);
    }

    let dir = handle.working_directory.clone();
    tracing::info!(
        dir = %dir.display(),
        from = %handle.current_branch,
        to = target,
        "switching branch"
    );

    let protection = match sync::protect(git, &dir, "BeforeBranchSwitch") {
        Ok(protection) => protection,
        Err(result) => return result,
    };
    let pending = protection.label().map(str::to_string);

    match git.fetch_into_local(&dir, target) {
        Ok(output) if output.success => tracing::debug!(branch = target, "fetched into local branch"),
        Ok(output) => {
            if let Some(result) = sync::ownership_failure(&output.text, &dir, pending.as_deref()) {
                return result;
            }
            tracing::warn!(branch = target, details = %output.text, "fetch of target branch failed");
        }
        Err(err) => {
            tracing::warn!(branch = target, error = %format!("{:#}", err), "fetch of target branch failed")
        }
    }

    match git.checkout(&dir, target) {
        Ok(output) if output.success => {}
        Ok(output) => {
            if let Some(result) = sync::ownership_failure(&output.text, &dir, pending.as_deref()) {
                return result;
            }
            tracing::warn!(branch = target, details = %output.text, "checkout failed; local changes stay stashed");
            return SyncResult::OtherFailure {
                details: format!("checkout of {} failed: {}", target, output.text),
                pending_stash: pending,
            };
        }
        Err(err) => {
            return SyncResult::OtherFailure {
                details: format!("{:#}", err),
                pending_stash: pending,
            };
        }
    }
    handle.current_branch = target.to_string();
    tracing::info!(branch = target, "checked out");

    let synced = sync::sync(git, handle, target);
    if !synced.is_success() {
        return synced.with_pending_stash(pending.as_deref());
    }

    match protection {
        Protection::NothingToStash => synced,
        Protection::Stashed(label) => match sync::restore(git, &dir, &label) {
            Ok(()) => SyncResult::UpdatedCleanly,
            Err(result) => result,
        },
    }
}
