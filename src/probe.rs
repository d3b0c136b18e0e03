//! Presence checks for required external tools.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::context::EnvironmentContext;
use crate::runner;
use crate::strategy::AcquisitionStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
/// A version query such as `git --version`; only its exit status matters.
pub struct ProbeInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ProbeInvocation {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// `<program> --version`.
    pub fn version(program: &str) -> Self {
        Self::new(program, &["--version"])
    }

    fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

impl TryFrom<Vec<String>> for ProbeInvocation {
    type Error = String;

    fn try_from(mut parts: Vec<String>) -> Result<Self, Self::Error> {
        if parts.is_empty() {
            return Err("probe invocation needs at least a program name".to_string());
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
/// A tool that must be runnable before any repository operation.
pub struct ToolRequirement {
    pub name: String,
    pub probes: Vec<ProbeInvocation>,
    #[serde(default)]
    pub strategies: Vec<AcquisitionStrategy>,
}

impl ToolRequirement {
    /// Directories installers for this tool commonly place executables in.
    pub fn install_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for strategy in &self.strategies {
            if let AcquisitionStrategy::DirectDownload(install) = strategy {
                for dir in &install.common_install_paths {
                    if !dirs.contains(dir) {
                        dirs.push(dir.clone());
                    }
                }
            }
        }
        dirs
    }
}

/// True when every probe of the requirement exits cleanly.
pub fn probe(ctx: &EnvironmentContext, requirement: &ToolRequirement) -> bool {
    requirement
        .probes
        .iter()
        .all(|invocation| probe_invocation(ctx, invocation))
}

/// Run one version query through PATH (or a previously resolved path).
pub fn probe_invocation(ctx: &EnvironmentContext, invocation: &ProbeInvocation) -> bool {
    run_clean(&ctx.program(&invocation.program), &invocation.arg_refs())
}

/// Run one version query against an explicit executable path.
pub fn probe_at(executable: &Path, invocation: &ProbeInvocation) -> bool {
    run_clean(executable.to_string_lossy().as_ref(), &invocation.arg_refs())
}

fn run_clean(program: &str, args: &[&str]) -> bool {
    runner::run_status(program, args)
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_invocation_parses_from_list() {
        let parsed = ProbeInvocation::try_from(vec!["npm.cmd".to_string(), "--version".to_string()])
            .expect("parse");
        assert_eq!(parsed, ProbeInvocation::version("npm.cmd"));
        assert!(ProbeInvocation::try_from(Vec::new()).is_err());
    }
}
