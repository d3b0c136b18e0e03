use anyhow::Result;
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};

use rigger::context::{EnvironmentContext, OsFamily};
use rigger::git::Git;
use rigger::runner::{Runner, set_runner_for_tests};
use rigger::switch::switch_to;
use rigger::sync::{RepositoryHandle, SyncResult, sync};

const DIR: &str = "/srv/sillytavern";

#[derive(Default)]
struct TestRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    labels: Mutex<Vec<String>>,
    echo_stash_list: Mutex<bool>,
}

#[derive(Clone)]
struct Rule {
    contains: Vec<String>,
    status: i32,
    stdout: String,
    stderr: String,
}

impl Rule {
    fn matches(&self, cmd: &str) -> bool {
        self.contains.iter().all(|needle| cmd.contains(needle))
    }
}

impl TestRunner {
    fn add_rule(&self, contains: &[&str], status: i32, stdout: &str, stderr: &str) {
        self.rules.lock().expect("rules lock").push(Rule {
            contains: contains.iter().map(|s| s.to_string()).collect(),
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
    }

    /// Answer `stash list` with one entry per label pushed so far, newest first.
    fn echo_stash_list(&self) {
        *self.echo_stash_list.lock().expect("echo lock") = true;
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn called(&self, needle: &str) -> bool {
        self.calls().iter().any(|call| call.contains(needle))
    }

    fn stash_list_text(&self) -> String {
        let labels = self.labels.lock().expect("labels lock");
        labels
            .iter()
            .rev()
            .enumerate()
            .map(|(index, label)| format!("stash@{{{}}}: On release: {}", index, label))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Runner for TestRunner {
    fn output(&self, program: &str, args: &[&str]) -> Result<Output> {
        let cmdline = format!("{} {}", program, args.join(" "));
        self.calls.lock().expect("calls lock").push(cmdline.clone());

        if let Some(rule) = self
            .rules
            .lock()
            .expect("rules lock")
            .iter()
            .find(|rule| rule.matches(&cmdline))
            .cloned()
        {
            if rule.status == 0 && cmdline.contains("stash push") {
                record_label(&self.labels, args);
            }
            return Ok(Output {
                status: exit_status(rule.status),
                stdout: rule.stdout.into_bytes(),
                stderr: rule.stderr.into_bytes(),
            });
        }

        if cmdline.contains("stash push") {
            record_label(&self.labels, args);
        }
        let stdout = if cmdline.contains("stash list") && *self.echo_stash_list.lock().expect("echo lock") {
            self.stash_list_text()
        } else {
            String::new()
        };
        Ok(Output {
            status: exit_status(0),
            stdout: stdout.into_bytes(),
            stderr: Vec::new(),
        })
    }
}

fn record_label(labels: &Mutex<Vec<String>>, args: &[&str]) {
    if let Some(position) = args.iter().position(|arg| *arg == "-m") {
        if let Some(label) = args.get(position + 1) {
            labels.lock().expect("labels lock").push(label.to_string());
        }
    }
}

#[cfg(unix)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

fn git() -> Git {
    Git::new(&EnvironmentContext::new(OsFamily::Linux, false), "origin")
}

fn handle(branch: &str) -> RepositoryHandle {
    RepositoryHandle::new(DIR, branch)
}

const DUBIOUS: &str = "fatal: detected dubious ownership in repository at '/srv/sillytavern'\n\
To add an exception for this directory, call:\n\
\n\
\tgit config --global --add safe.directory /srv/sillytavern";

#[test]
fn ownership_error_while_stashing_stops_before_fetch() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["stash push"], 128, "", DUBIOUS);
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    assert_eq!(
        result,
        SyncResult::OwnershipError {
            suggested_remedy: "git config --global --add safe.directory /srv/sillytavern"
                .to_string(),
            pending_stash: None,
        }
    );
    assert_eq!(runner.calls().len(), 1);
    assert!(!runner.called("fetch"));
    assert!(!runner.called("pull"));
}

#[test]
fn ownership_error_while_fetching_is_not_retried_through_pull() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["stash push"], 0, "No local changes to save", "");
    runner.add_rule(&["fetch origin release"], 128, "", DUBIOUS);
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    assert!(matches!(result, SyncResult::OwnershipError { .. }));
    assert!(!runner.called("pull"));
}

#[test]
fn stash_warning_with_clean_exit_still_protects_changes() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(
        &["stash push"],
        0,
        "Saved working directory and index state On release: AutoStash_BeforeUpdate",
        "warning: could not open directory 'data/cache/': Permission denied",
    );
    runner.add_rule(&["pull"], 0, "Already up to date.", "");
    runner.echo_stash_list();
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    assert_eq!(result, SyncResult::AlreadyUpToDate);
    assert!(runner.called("pull --ff-only origin release"));
    assert!(runner.called("stash pop stash@{0}"));
}

#[test]
fn permission_denied_pull_names_the_pending_stash() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(
        &["pull --ff-only origin release"],
        1,
        "",
        "error: unable to unlink old 'server.js': Permission denied",
    );
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    let SyncResult::OwnershipError { pending_stash, .. } = &result else {
        panic!("expected ownership error, got {:?}", result);
    };
    assert!(
        pending_stash
            .as_deref()
            .is_some_and(|label| label.starts_with("AutoStash_BeforeUpdate_"))
    );
    assert!(!runner.called("stash pop"));
}

#[test]
fn network_failure_on_pull_keeps_stash_untouched() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(
        &["pull --ff-only origin release"],
        1,
        "",
        "fatal: unable to access 'https://github.com/SillyTavern/SillyTavern.git/': Could not resolve host: github.com",
    );
    runner.echo_stash_list();
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    let SyncResult::NetworkError { pending_stash, .. } = &result else {
        panic!("expected network error, got {:?}", result);
    };
    let label = pending_stash.as_deref().expect("pending stash");
    assert!(label.starts_with("AutoStash_BeforeUpdate_"));
    assert!(!runner.called("stash list"));
    assert!(!runner.called("stash pop"));
    assert!(result.into_error().is_some());
}

#[test]
fn fetch_failure_is_tolerated_and_changes_come_back() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(
        &["fetch origin release"],
        1,
        "",
        "fatal: unable to access 'https://github.com/': Failed to connect",
    );
    runner.add_rule(
        &["pull --ff-only origin release"],
        0,
        "Updating 1a2b3c4..5d6e7f8\nFast-forward\n public/index.html | 2 +-",
        "",
    );
    runner.echo_stash_list();
    let _guard = set_runner_for_tests(runner.clone());

    let mut repo = handle("release");
    let result = sync(&git(), &mut repo, "release");

    assert_eq!(result, SyncResult::UpdatedCleanly);
    let calls = runner.calls();
    let order: Vec<&str> = ["stash push", "fetch", "pull", "stash list", "stash pop stash@{0}"]
        .into_iter()
        .collect();
    let mut cursor = 0;
    for call in &calls {
        if cursor < order.len() && call.contains(order[cursor]) {
            cursor += 1;
        }
    }
    assert_eq!(cursor, order.len(), "unexpected call order: {:?}", calls);
    assert!(calls.iter().all(|call| call.starts_with("git -C /srv/sillytavern ")));
}

#[test]
fn clean_tree_and_nothing_new_is_already_up_to_date() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["stash push"], 1, "No local changes to save", "");
    runner.add_rule(&["pull"], 0, "Already up to date.", "");
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    assert_eq!(result, SyncResult::AlreadyUpToDate);
    assert!(!runner.called("stash list"));
    assert!(!runner.called("stash pop"));
}

#[test]
fn clean_tree_with_new_commits_reports_no_local_changes() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["stash push"], 0, "No local changes to save", "");
    runner.add_rule(&["pull"], 0, "Updating 1a2b3c4..5d6e7f8\nFast-forward", "");
    let _guard = set_runner_for_tests(runner.clone());

    assert_eq!(
        sync(&git(), &mut handle("release"), "release"),
        SyncResult::NoLocalChanges
    );
}

#[test]
fn conflicting_restore_names_the_kept_stash() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["pull"], 0, "Updating 1a2b3c4..5d6e7f8\nFast-forward", "");
    runner.add_rule(
        &["stash pop"],
        1,
        "Auto-merging default/config.yaml\nCONFLICT (content): Merge conflict in default/config.yaml",
        "The stash entry is kept in case you need it again.",
    );
    runner.echo_stash_list();
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    let SyncResult::RestoreConflict { details, stash } = &result else {
        panic!("expected restore conflict, got {:?}", result);
    };
    assert!(details.contains("CONFLICT"));
    assert!(stash.starts_with("AutoStash_BeforeUpdate_"));
    assert_eq!(result.pending_stash(), Some(stash.as_str()));
}

#[test]
fn vanished_stash_entry_is_skipped() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["pull"], 0, "Already up to date.", "");
    runner.add_rule(&["stash list"], 0, "stash@{0}: On release: someone else's work", "");
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    assert_eq!(result, SyncResult::AlreadyUpToDate);
    assert!(runner.called("stash list"));
    assert!(!runner.called("stash pop"));
}

#[test]
fn diverged_branch_is_a_merge_conflict() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["stash push"], 0, "No local changes to save", "");
    runner.add_rule(
        &["pull"],
        128,
        "",
        "hint: Diverging branches can't be fast-forwarded\nfatal: Not possible to fast-forward, aborting.",
    );
    let _guard = set_runner_for_tests(runner.clone());

    let result = sync(&git(), &mut handle("release"), "release");

    assert!(matches!(
        result,
        SyncResult::MergeConflict {
            pending_stash: None,
            ..
        }
    ));
}

#[test]
fn failed_checkout_leaves_switch_stash_pending() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(
        &["checkout staging"],
        1,
        "",
        "error: pathspec 'staging' did not match any file(s) known to git",
    );
    runner.echo_stash_list();
    let _guard = set_runner_for_tests(runner.clone());

    let mut repo = handle("release");
    let result = switch_to(&git(), &mut repo, "staging");

    let SyncResult::OtherFailure { pending_stash, .. } = &result else {
        panic!("expected other failure, got {:?}", result);
    };
    assert!(
        pending_stash
            .as_deref()
            .is_some_and(|label| label.starts_with("AutoStash_BeforeBranchSwitch_"))
    );
    assert_eq!(repo.current_branch, "release");
    assert!(!runner.called("pull"));
    assert!(!runner.called("stash pop"));
}

#[test]
fn permission_denied_checkout_names_the_switch_stash() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(
        &["checkout staging"],
        1,
        "",
        "error: unable to unlink old 'server.js': Permission denied",
    );
    let _guard = set_runner_for_tests(runner.clone());

    let mut repo = handle("release");
    let result = switch_to(&git(), &mut repo, "staging");

    let SyncResult::OwnershipError {
        suggested_remedy,
        pending_stash,
    } = &result
    else {
        panic!("expected ownership error, got {:?}", result);
    };
    assert!(suggested_remedy.contains("writable"));
    let label = pending_stash.as_deref().expect("pending stash");
    assert!(label.starts_with("AutoStash_BeforeBranchSwitch_"));
    assert_eq!(result.pending_stash(), Some(label));
    assert_eq!(repo.current_branch, "release");
    assert!(!runner.called("stash pop"));
}

#[test]
fn switch_carries_edits_to_the_target_branch() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(
        &["stash push", "AutoStash_BeforeUpdate_"],
        1,
        "No local changes to save",
        "",
    );
    runner.add_rule(&["pull --ff-only origin staging"], 0, "Already up to date.", "");
    runner.echo_stash_list();
    let _guard = set_runner_for_tests(runner.clone());

    let mut repo = handle("release");
    let result = switch_to(&git(), &mut repo, "staging");

    assert_eq!(result, SyncResult::UpdatedCleanly);
    assert_eq!(repo.current_branch, "staging");
    assert!(runner.called("fetch origin staging:staging"));
    assert!(runner.called("checkout staging"));
    assert!(runner.called("stash pop stash@{0}"));
}

#[test]
fn switch_to_current_branch_is_a_plain_update() {
    let runner = Arc::new(TestRunner::default());
    runner.add_rule(&["stash push"], 0, "No local changes to save", "");
    runner.add_rule(&["pull"], 0, "Already up to date.", "");
    let _guard = set_runner_for_tests(runner.clone());

    let result = switch_to(&git(), &mut handle("staging"), "staging");

    assert_eq!(result, SyncResult::AlreadyUpToDate);
    assert!(runner.called("AutoStash_BeforeUpdate_"));
    assert!(!runner.called("AutoStash_BeforeBranchSwitch_"));
    assert!(!runner.called("checkout"));
}
