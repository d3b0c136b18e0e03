//! Version-control subcommands used by the sync engine and the install workflow.
//!
//! Every call targets the repository through `git -C <dir>` so the provisioner's own
//! working directory never changes, and runs with `LC_ALL=C` so diagnostics reach the
//! classifiers untranslated.

use anyhow::{Result, bail};
use std::path::Path;

use crate::context::EnvironmentContext;
use crate::runner;

const GIT_ENV: &[(&str, &str)] = &[("LC_ALL", "C"), ("GIT_TERMINAL_PROMPT", "0")];

#[derive(Debug, Clone)]
/// Exit status and combined diagnostic text of one git invocation.
pub struct GitOutput {
    pub success: bool,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One line of `git stash list`.
pub struct StashEntry {
    pub reference: String,
    pub message: String,
}

#[derive(Debug, Clone)]
/// Git client bound to a resolved executable and remote name.
pub struct Git {
    program: String,
    remote: String,
}

impl Git {
    pub fn new(ctx: &EnvironmentContext, remote: &str) -> Self {
        Self {
            program: ctx.program("git"),
            remote: remote.to_string(),
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput> {
        let dir = dir.to_string_lossy();
        let mut full: Vec<&str> = vec!["-C", dir.as_ref()];
        full.extend_from_slice(args);
        self.run_raw(&full)
    }

    fn run_raw(&self, args: &[&str]) -> Result<GitOutput> {
        let output = runner::run_output_with_env(&self.program, args, GIT_ENV)?;
        Ok(GitOutput {
            success: output.status.success(),
            text: runner::diagnostic_text(&output),
        })
    }

    /// Clone `url` at `branch` into `dest`.
    pub fn clone_branch(&self, url: &str, branch: &str, dest: &Path) -> Result<GitOutput> {
        let dest = dest.to_string_lossy();
        self.run_raw(&["clone", "-b", branch, "--", url, dest.as_ref()])
    }

    /// Name of the checked-out branch; a detached HEAD is an error.
    pub fn current_branch(&self, dir: &Path) -> Result<String> {
        let output = self.run(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !output.success {
            bail!("failed to read current branch: {}", output.text);
        }
        let branch = output.text.lines().last().unwrap_or_default().trim().to_string();
        if branch.is_empty() {
            bail!("current branch is unknown");
        }
        if branch == "HEAD" {
            bail!("repository is in detached HEAD state");
        }
        Ok(branch)
    }

    /// Stash all modifications, untracked files included, under `label`.
    pub fn stash_push(&self, dir: &Path, label: &str) -> Result<GitOutput> {
        self.run(dir, &["stash", "push", "--include-untracked", "-m", label])
    }

    /// Current stash entries, newest first.
    pub fn stash_list(&self, dir: &Path) -> Result<Vec<StashEntry>> {
        let output = self.run(dir, &["stash", "list"])?;
        if !output.success {
            bail!("failed to list stash entries: {}", output.text);
        }
        Ok(parse_stash_list(&output.text))
    }

    /// Apply and drop one stash entry; git keeps the entry when applying conflicts.
    pub fn stash_pop(&self, dir: &Path, reference: &str) -> Result<GitOutput> {
        self.run(dir, &["stash", "pop", reference])
    }

    /// Fetch `branch` from the remote into its remote-tracking ref.
    pub fn fetch(&self, dir: &Path, branch: &str) -> Result<GitOutput> {
        self.run(dir, &["fetch", &self.remote, branch])
    }

    /// Fetch the remote `branch` into the local branch of the same name.
    pub fn fetch_into_local(&self, dir: &Path, branch: &str) -> Result<GitOutput> {
        let refspec = format!("{}:{}", branch, branch);
        self.run(dir, &["fetch", &self.remote, &refspec])
    }

    /// Fast-forward the checked-out branch to the remote `branch`.
    pub fn pull(&self, dir: &Path, branch: &str) -> Result<GitOutput> {
        self.run(dir, &["pull", "--ff-only", &self.remote, branch])
    }

    pub fn checkout(&self, dir: &Path, branch: &str) -> Result<GitOutput> {
        self.run(dir, &["checkout", branch])
    }
}

/// True when `dir` holds a git working copy.
pub fn is_repository(dir: &Path) -> bool {
    dir.join(".git").exists()
}

fn parse_stash_list(text: &str) -> Vec<StashEntry> {
    text.lines()
        .filter_map(|line| {
            let (reference, message) = line.split_once(": ")?;
            if !reference.starts_with("stash@{") {
                return None;
            }
            Some(StashEntry {
                reference: reference.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}
