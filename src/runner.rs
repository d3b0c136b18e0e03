//! Command runner for every external tool the provisioner drives.
//!
//! All git, npm, package-manager, installer and PowerShell invocations go through
//! [`run_output`], so tests can script the whole outside world by installing a
//! fake [`Runner`] with [`set_runner_for_tests`].

use anyhow::{Context, Result};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Runner interface for invoking external commands.
pub trait Runner: Send + Sync {
    /// Execute a command to completion and return its captured output.
    fn output(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Like [`Runner::output`] with extra environment variables for the child.
    fn output_with_env(
        &self,
        program: &str,
        args: &[&str],
        _env: &[(&str, &str)],
    ) -> Result<Output> {
        self.output(program, args)
    }
}

struct ProcessRunner;

impl Runner for ProcessRunner {
    fn output(&self, program: &str, args: &[&str]) -> Result<Output> {
        std::process::Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {} {:?}", program, args))
    }

    fn output_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<Output> {
        std::process::Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .output()
            .with_context(|| format!("failed to run {} {:?}", program, args))
    }
}

static RUNNER: OnceLock<RwLock<Arc<dyn Runner>>> = OnceLock::new();
static TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn runner_lock() -> &'static RwLock<Arc<dyn Runner>> {
    RUNNER.get_or_init(|| RwLock::new(Arc::new(ProcessRunner)))
}

/// Run a command and capture stdout and stderr separately.
pub fn run_output(program: &str, args: &[&str]) -> Result<Output> {
    let runner = runner_lock()
        .read()
        .expect("runner lock poisoned")
        .clone();
    tracing::debug!(program, ?args, "spawning");
    runner.output(program, args)
}

/// Run a command with extra environment variables and capture its output.
pub fn run_output_with_env(program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<Output> {
    let runner = runner_lock()
        .read()
        .expect("runner lock poisoned")
        .clone();
    tracing::debug!(program, ?args, "spawning");
    runner.output_with_env(program, args, env)
}

/// Run a command and return its exit status.
pub fn run_status(program: &str, args: &[&str]) -> Result<ExitStatus> {
    Ok(run_output(program, args)?.status)
}

/// Join stdout and stderr into one trimmed diagnostic string.
pub fn diagnostic_text(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{}\n{}", out, err),
    }
}

/// Guard that restores the previous runner when dropped.
pub struct RunnerGuard {
    previous: Arc<dyn Runner>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl Drop for RunnerGuard {
    fn drop(&mut self) {
        let mut runner = runner_lock().write().expect("runner lock poisoned");
        *runner = self.previous.clone();
    }
}

/// Override the runner for tests; restores on guard drop.
pub fn set_runner_for_tests(runner: Arc<dyn Runner>) -> RunnerGuard {
    let lock = TEST_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let previous = {
        let mut slot = runner_lock().write().expect("runner lock poisoned");
        let previous = slot.clone();
        *slot = runner;
        previous
    };
    RunnerGuard {
        previous,
        _lock: guard,
    }
}
