use anyhow::{Result, bail};
use std::path::Path;

use super::{Channel, Session};
use crate::context::OsFamily;
use crate::git::{self, Git};
use crate::runner;
use crate::switch;
use crate::sync::{self, RepositoryHandle, SyncResult};

/// Clone the stable branch or update the existing checkout, then install npm dependencies.
pub(super) fn install(session: &Session) -> Result<()> {
    let repo = &session.config.repository;
    let git = Git::new(&session.ctx, &repo.remote);

    if git::is_repository(&repo.dir) {
        let mut handle = RepositoryHandle::open(&git, &repo.dir, &repo.stable_branch);
        let branch = handle.current_branch.clone();
        println!("Updating {} ({})...", repo.dir.display(), branch);
        let result = sync::sync(&git, &mut handle, &branch);
        report(&result, &repo.dir);
        finish(result)?;
    } else {
        println!(
            "Cloning {} ({}) into {}...",
            repo.url,
            repo.stable_branch,
            repo.dir.display()
        );
        let output = git.clone_branch(&repo.url, &repo.stable_branch, &repo.dir)?;
        if !output.success {
            let result = sync::failure_from(&output.text, &repo.dir, None);
            report(&result, &repo.dir);
            finish(result)?;
        }
        println!("Cloned into {}", repo.dir.display());
    }

    install_dependencies(session)
}

/// Move the checkout to the branch behind `channel`, then refresh npm dependencies.
pub(super) fn switch(session: &Session, channel: Channel) -> Result<()> {
    let repo = &session.config.repository;
    if !git::is_repository(&repo.dir) {
        bail!(
            "{} is not a git checkout; run install first",
            repo.dir.display()
        );
    }
    let git = Git::new(&session.ctx, &repo.remote);
    let mut handle = RepositoryHandle::open(&git, &repo.dir, &repo.stable_branch);
    let target = session.branch_for(channel).to_string();

    println!(
        "Switching {} from {} to {}...",
        repo.dir.display(),
        handle.current_branch,
        target
    );
    let result = switch::switch_to(&git, &mut handle, &target);
    report(&result, &repo.dir);
    finish(result)?;

    install_dependencies(session)
}

fn install_dependencies(session: &Session) -> Result<()> {
    let dir = &session.config.repository.dir;
    let npm = session.ctx.program(npm_program(session.ctx.os()));
    println!(
        "Running npm install in {} (this can take a few minutes)...",
        dir.display()
    );
    let dir_arg = dir.to_string_lossy();
    let output = runner::run_output(&npm, &["install", "--prefix", dir_arg.as_ref()])?;
    if !output.status.success() {
        bail!("npm install failed: {}", runner::diagnostic_text(&output));
    }
    println!("Dependencies installed.");
    Ok(())
}

fn npm_program(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Windows => "npm.cmd",
        OsFamily::MacOs | OsFamily::Linux => "npm",
    }
}

fn finish(result: SyncResult) -> Result<()> {
    match result.into_error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Print the outcome of a sync or switch together with what the operator should do next.
fn report(result: &SyncResult, dir: &Path) {
    match result {
        SyncResult::UpdatedCleanly => {
            println!("Updated to the latest version; your local changes were re-applied.")
        }
        SyncResult::AlreadyUpToDate => println!("Already up to date."),
        SyncResult::NoLocalChanges => println!("Updated to the latest version."),
        SyncResult::RestoreConflict { details, stash } => {
            println!("Updated, but re-applying your local changes conflicted:");
            println!("{}", details);
            println!("To finish by hand in {}:", dir.display());
            println!("  1. edit the conflicted files and keep the lines you want");
            println!("  2. git add <files>");
            println!("  3. git stash drop the entry labelled {}", stash);
        }
        SyncResult::MergeConflict { details, .. } => {
            println!("The update could not be applied cleanly:");
            println!("{}", details);
            println!("Your branch has commits that upstream does not; commit, reset or rebase them, then update again.");
        }
        SyncResult::OwnershipError {
            suggested_remedy, ..
        } => {
            println!("Git refused to operate on {}.", dir.display());
            println!("Fix it with:");
            println!("  {}", suggested_remedy);
        }
        SyncResult::NetworkError { details, .. } => {
            println!("Could not reach the remote repository:");
            println!("{}", details);
            println!("Check your internet connection and try again.");
        }
        SyncResult::OtherFailure { details, .. } => {
            println!("The operation failed:");
            println!("{}", details);
        }
    }

    if let SyncResult::RestoreConflict { .. } = result {
        return;
    }
    if let Some(label) = result.pending_stash() {
        println!("Your uncommitted changes are saved in the stash entry labelled {}.", label);
        println!(
            "Recover them with: git -C \"{}\" stash list, then git stash pop <entry>",
            dir.display()
        );
    }
}
