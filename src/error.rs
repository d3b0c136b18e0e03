//! Failure taxonomy shared by the acquisition chain, the PATH registrar and the sync engine.

use thiserror::Error;

#[derive(Debug, Error)]
/// Classified provisioning failures.
pub enum ProvisionError {
    /// A hard prerequisite is still missing after the whole acquisition chain ran.
    #[error("{tool} is not available after trying every install strategy: {diagnostic}")]
    ToolUnavailable { tool: String, diagnostic: String },

    /// An elevated-only action was requested without elevation.
    #[error("{action} requires elevated privileges")]
    PrivilegeRequired { action: String },

    /// The version-control client refused to operate on the directory.
    #[error("repository ownership or permission error; run: {remedy}")]
    OwnershipOrPermission { remedy: String },

    /// Integration of the remote branch produced conflicts or could not fast-forward.
    #[error("merge conflict while updating: {details}")]
    MergeConflict { details: String },

    /// Re-applying protected local edits conflicted with the updated tree.
    #[error("restoring local changes conflicted: {details}")]
    RestoreConflict { details: String },

    /// A download or remote operation failed; retrying the same action may succeed.
    #[error("network error: {details}")]
    Network { details: String },

    /// Unclassified non-zero exit.
    #[error("{details}")]
    Other { details: String },
}
