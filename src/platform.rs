//! Per-OS capabilities the acquisition chain depends on.

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::{EnvironmentContext, OsFamily};
use crate::download;
use crate::pathreg::{self, EnvironmentFileStore, PathStore, Registration, RegistryPathStore};
use crate::probe::{self, ProbeInvocation, ToolRequirement};
use crate::runner;
use crate::strategy::{DirectDownload, InstallerKind, PackageManager};

/// Operations whose implementation differs per operating system.
pub trait Platform {
    /// True when every probe of `requirement` exits cleanly.
    fn probe(&self, ctx: &EnvironmentContext, requirement: &ToolRequirement) -> bool {
        probe::probe(ctx, requirement)
    }

    /// True when a single version query exits cleanly.
    fn probe_invocation(&self, ctx: &EnvironmentContext, invocation: &ProbeInvocation) -> bool {
        probe::probe_invocation(ctx, invocation)
    }

    /// Find working executables for every probe in one of the requirement's install dirs.
    fn locate(
        &self,
        _ctx: &EnvironmentContext,
        requirement: &ToolRequirement,
    ) -> Option<BTreeMap<String, PathBuf>> {
        locate_in_install_dirs(requirement)
    }

    /// Install `package` through `manager` without prompting.
    fn install_package(&self, manager: PackageManager, package: &str) -> Result<()>;

    /// Download the installer, run it silently and remove the download afterwards.
    fn download_and_run(&self, tool: &str, install: &DirectDownload) -> Result<()>;

    /// Persisted system PATH for this OS.
    fn path_store(&self) -> &dyn PathStore;

    /// Permanently add `dir` to the system PATH.
    fn register_path(&self, ctx: &EnvironmentContext, dir: &Path) -> Result<Registration> {
        pathreg::register(ctx, self.path_store(), dir)
    }
}

/// Platform implementation for the running OS.
pub fn native() -> Box<dyn Platform> {
    match OsFamily::current() {
        OsFamily::Windows => Box::new(WindowsPlatform::new()),
        OsFamily::MacOs | OsFamily::Linux => Box::new(UnixPlatform::new()),
    }
}

/// winget/chocolatey, MSI/EXE installers, registry PATH.
pub struct WindowsPlatform {
    store: RegistryPathStore,
    scratch: PathBuf,
}

impl WindowsPlatform {
    pub fn new() -> Self {
        Self {
            store: RegistryPathStore,
            scratch: std::env::temp_dir(),
        }
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for WindowsPlatform {
    fn install_package(&self, manager: PackageManager, package: &str) -> Result<()> {
        if manager == PackageManager::Brew {
            bail!("brew is not available on Windows");
        }
        run_package_manager(manager, package)
    }

    fn download_and_run(&self, tool: &str, install: &DirectDownload) -> Result<()> {
        if install.installer == InstallerKind::Pkg {
            bail!("pkg installers cannot run on Windows");
        }
        download_and_install(&self.scratch, tool, install)
    }

    fn path_store(&self) -> &dyn PathStore {
        &self.store
    }
}

/// brew, macOS pkg installers, `/etc/environment` PATH.
pub struct UnixPlatform {
    store: EnvironmentFileStore,
    scratch: PathBuf,
}

impl UnixPlatform {
    pub fn new() -> Self {
        Self {
            store: EnvironmentFileStore::system(),
            scratch: std::env::temp_dir(),
        }
    }
}

impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for UnixPlatform {
    fn install_package(&self, manager: PackageManager, package: &str) -> Result<()> {
        if manager != PackageManager::Brew {
            bail!("{} is only available on Windows", manager.name());
        }
        run_package_manager(manager, package)
    }

    fn download_and_run(&self, tool: &str, install: &DirectDownload) -> Result<()> {
        if install.installer != InstallerKind::Pkg {
            bail!("{:?} installers cannot run on this OS", install.installer);
        }
        download_and_install(&self.scratch, tool, install)
    }

    fn path_store(&self) -> &dyn PathStore {
        &self.store
    }
}

fn run_package_manager(manager: PackageManager, package: &str) -> Result<()> {
    let (program, args) = manager.install_command(package);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    tracing::info!(manager = manager.name(), package, "installing through package manager");
    let output = runner::run_output(&program, &args)?;
    if !output.status.success() {
        bail!(
            "{} install {} exited with {}: {}",
            manager.name(),
            package,
            output.status,
            runner::diagnostic_text(&output)
        );
    }
    Ok(())
}

fn download_and_install(scratch: &Path, tool: &str, install: &DirectDownload) -> Result<()> {
    let installer_path = scratch.join(&install.installer_name);
    let log_path = scratch.join(format!("{}_install.log", tool));
    let result = download::fetch(&install.url, &installer_path)
        .and_then(|_| run_installer(install, &installer_path, &log_path));
    if installer_path.exists() {
        if let Err(err) = fs::remove_file(&installer_path) {
            tracing::warn!(file = %installer_path.display(), error = %err, "failed to remove installer");
        }
    }
    result
}

fn run_installer(install: &DirectDownload, installer_path: &Path, log_path: &Path) -> Result<()> {
    let (program, args) = installer_command(
        install.installer,
        installer_path,
        &install.silent_args,
        log_path,
    );
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    tracing::info!(installer = %installer_path.display(), "running installer");
    let output = runner::run_output(&program, &args)?;
    if !output.status.success() {
        let mut message = format!(
            "installer exited with {}: {}",
            output.status,
            runner::diagnostic_text(&output)
        );
        if install.installer == InstallerKind::Msi {
            message.push_str(&format!(" (msi log: {})", log_path.display()));
        }
        bail!(message);
    }
    Ok(())
}

/// Program and arguments running an installer of `kind` without any UI.
pub fn installer_command(
    kind: InstallerKind,
    installer_path: &Path,
    silent_args: &[String],
    log_path: &Path,
) -> (String, Vec<String>) {
    let installer = installer_path.to_string_lossy().into_owned();
    let (program, mut args) = match kind {
        InstallerKind::Msi => (
            "msiexec".to_string(),
            vec![
                "/i".to_string(),
                installer,
                "/quiet".to_string(),
                "/norestart".to_string(),
                "/L*v".to_string(),
                log_path.to_string_lossy().into_owned(),
            ],
        ),
        InstallerKind::Exe => (installer, Vec::new()),
        InstallerKind::Pkg => (
            "installer".to_string(),
            vec![
                "-pkg".to_string(),
                installer,
                "-target".to_string(),
                "/".to_string(),
            ],
        ),
    };
    args.extend(silent_args.iter().cloned());
    (program, args)
}

/// Executable for `program` inside `dir`, honoring PATHEXT on Windows.
fn resolve_in(dir: &Path, program: &str) -> Option<PathBuf> {
    which::which_in(program, Some(dir), dir).ok()
}

fn locate_in_install_dirs(requirement: &ToolRequirement) -> Option<BTreeMap<String, PathBuf>> {
    for dir in requirement.install_dirs() {
        if !dir.is_dir() {
            continue;
        }
        let mut found = BTreeMap::new();
        for invocation in &requirement.probes {
            let hit = resolve_in(&dir, &invocation.program)
                .filter(|candidate| probe::probe_at(candidate, invocation));
            match hit {
                Some(path) => {
                    found.insert(invocation.program.clone(), path);
                }
                None => break,
            }
        }
        if found.len() == requirement.probes.len() {
            tracing::debug!(tool = %requirement.name, dir = %dir.display(), "located outside PATH");
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msi_runs_quietly_with_a_log() {
        let (program, args) = installer_command(
            InstallerKind::Msi,
            Path::new("C:/Temp/node.msi"),
            &[],
            Path::new("C:/Temp/node_install.log"),
        );
        assert_eq!(program, "msiexec");
        assert_eq!(
            args.join(" "),
            "/i C:/Temp/node.msi /quiet /norestart /L*v C:/Temp/node_install.log"
        );
    }

    #[test]
    fn exe_runs_itself_with_silent_args() {
        let (program, args) = installer_command(
            InstallerKind::Exe,
            Path::new("C:/Temp/git.exe"),
            &["/VERYSILENT".to_string(), "/NORESTART".to_string()],
            Path::new("C:/Temp/git_install.log"),
        );
        assert_eq!(program, "C:/Temp/git.exe");
        assert_eq!(args, vec!["/VERYSILENT", "/NORESTART"]);
    }

    #[cfg(unix)]
    #[test]
    fn resolve_in_only_returns_executables_from_the_dir() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new()?;
        let node = dir.path().join("node");
        fs::write(&node, "#!/bin/sh\nexit 0\n")?;
        fs::set_permissions(&node, fs::Permissions::from_mode(0o755))?;
        let npm = dir.path().join("npm");
        fs::write(&npm, "#!/bin/sh\nexit 0\n")?;
        fs::set_permissions(&npm, fs::Permissions::from_mode(0o644))?;

        assert_eq!(resolve_in(dir.path(), "node"), Some(node));
        assert_eq!(resolve_in(dir.path(), "npm"), None);
        assert_eq!(resolve_in(dir.path(), "git"), None);
        Ok(())
    }
}
