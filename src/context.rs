//! Process-wide facts discovered once at startup and passed explicitly to every component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::runner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Operating system family the provisioner runs on.
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

impl OsFamily {
    /// OS family of the running binary.
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else {
            OsFamily::Linux
        }
    }
}

#[derive(Debug, Clone)]
/// Elevation flag, OS family and tool executables resolved outside PATH.
pub struct EnvironmentContext {
    os: OsFamily,
    elevated: bool,
    resolved: BTreeMap<String, PathBuf>,
}

impl EnvironmentContext {
    /// Build a context from known facts.
    pub fn new(os: OsFamily, elevated: bool) -> Self {
        Self {
            os,
            elevated,
            resolved: BTreeMap::new(),
        }
    }

    /// Detect the OS family and whether the process holds elevated privileges.
    pub fn detect() -> Self {
        let os = OsFamily::current();
        let elevated = detect_elevated(os);
        tracing::debug!(?os, elevated, "environment detected");
        Self::new(os, elevated)
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    /// Program to spawn for `name`: a resolved absolute path when one was recorded, else the bare name.
    pub fn program(&self, name: &str) -> String {
        self.resolved
            .get(name)
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string())
    }

    /// Record an executable found outside PATH so later invocations use it directly.
    pub fn record_resolved(&mut self, name: &str, path: &Path) {
        self.resolved.insert(name.to_string(), path.to_path_buf());
    }

    /// Executables recorded so far, keyed by bare program name.
    pub fn resolved(&self) -> &BTreeMap<String, PathBuf> {
        &self.resolved
    }
}

fn detect_elevated(os: OsFamily) -> bool {
    match os {
        // `net session` only succeeds for members of the Administrators group running elevated.
        OsFamily::Windows => runner::run_status("net", &["session"])
            .map(|status| status.success())
            .unwrap_or(false),
        OsFamily::MacOs | OsFamily::Linux => runner::run_output("id", &["-u"])
            .map(|output| {
                output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "0"
            })
            .unwrap_or(false),
    }
}
