//! Provisioner configuration loaded from rigger.toml, with per-platform tool defaults.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::context::OsFamily;
use crate::probe::{ProbeInvocation, ToolRequirement};
use crate::strategy::{AcquisitionStrategy, DirectDownload, InstallerKind, PackageManager};

const GIT_FOR_WINDOWS_URL: &str = "https://github.com/git-for-windows/git/releases/download/v2.49.0.windows.1/Git-2.49.0-64-bit.exe";
const NODE_WINDOWS_URL: &str = "https://nodejs.org/dist/v22.15.0/node-v22.15.0-x64.msi";
const NODE_MACOS_URL: &str = "https://nodejs.org/dist/v22.15.0/node-v22.15.0.pkg";

#[derive(Debug, Deserialize)]
/// Top-level rigger.toml representation.
pub struct ProvisionerConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub tools: Vec<ToolRequirement>,
}

#[derive(Debug, Deserialize, Clone)]
/// Where the application is cloned from and which branches the menu offers.
pub struct RepositoryConfig {
    #[serde(default = "default_repository_url")]
    pub url: String,
    #[serde(default = "default_repository_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_stable_branch")]
    pub stable_branch: String,
    #[serde(default = "default_staging_branch")]
    pub staging_branch: String,
    #[serde(default = "default_remote")]
    pub remote: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: default_repository_url(),
            dir: default_repository_dir(),
            stable_branch: default_stable_branch(),
            staging_branch: default_staging_branch(),
            remote: default_remote(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
/// Location of the application's own YAML config.
pub struct SettingsConfig {
    /// Relative paths are resolved against the repository directory.
    pub file: Option<PathBuf>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            settings: SettingsConfig::default(),
            tools: Vec::new(),
        }
    }
}

impl ProvisionerConfig {
    /// Path of the application's YAML config.
    pub fn settings_path(&self) -> PathBuf {
        match &self.settings.file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) => self.repository.dir.join(file),
            None => self.repository.dir.join("config.yaml"),
        }
    }

    /// Configured tool requirements, or the defaults for `os` when none are configured.
    pub fn requirements(&self, os: OsFamily) -> Vec<ToolRequirement> {
        if self.tools.is_empty() {
            default_requirements(os)
        } else {
            self.tools.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                bail!("every [[tools]] entry needs a name");
            }
            if tool.probes.is_empty() {
                bail!("tool {} needs at least one probe", tool.name);
            }
        }
        if self.repository.url.trim().is_empty() {
            bail!("repository.url must not be empty");
        }
        Ok(())
    }
}

/// Load rigger.toml; a missing file yields the built-in defaults.
pub fn load_config(path: &Path) -> Result<ProvisionerConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(ProvisionerConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let cfg: ProvisionerConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Tool requirements used when rigger.toml lists none.
pub fn default_requirements(os: OsFamily) -> Vec<ToolRequirement> {
    match os {
        OsFamily::Windows => windows_requirements(),
        OsFamily::MacOs | OsFamily::Linux => unix_requirements(os),
    }
}

fn windows_requirements() -> Vec<ToolRequirement> {
    let program_files = env_dir("ProgramFiles", r"C:\Program Files");
    let program_files_x86 = env_dir("ProgramFiles(x86)", r"C:\Program Files (x86)");

    let git = ToolRequirement {
        name: "git".to_string(),
        probes: vec![ProbeInvocation::version("git")],
        strategies: vec![
            package(PackageManager::Winget, "Git.Git"),
            package(PackageManager::Chocolatey, "git.install"),
            AcquisitionStrategy::DirectDownload(DirectDownload {
                url: GIT_FOR_WINDOWS_URL.to_string(),
                installer_name: "Git-2.49.0-64-bit.exe".to_string(),
                installer: InstallerKind::Exe,
                silent_args: [
                    "/VERYSILENT",
                    "/NORESTART",
                    "/NOCANCEL",
                    "/SP-",
                    "/CLOSEAPPLICATIONS",
                    "/RESTARTAPPLICATIONS",
                    "/MERGETASKS=!desktopicon",
                    "/PATHOPT=CmdTools",
                    r"/COMPONENTS=icons,ext\reg\shellhere,assoc,assoc_sh,gitlfs,scalar",
                ]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
                common_install_paths: vec![
                    program_files.join("Git").join("cmd"),
                    program_files.join("Git").join("bin"),
                    program_files_x86.join("Git").join("cmd"),
                    PathBuf::from(r"C:\Git\cmd"),
                ],
            }),
        ],
    };

    let node = ToolRequirement {
        name: "node".to_string(),
        probes: vec![
            ProbeInvocation::version("node"),
            ProbeInvocation::version("npm.cmd"),
        ],
        strategies: vec![
            package(PackageManager::Winget, "OpenJS.NodeJS.LTS"),
            package(PackageManager::Chocolatey, "nodejs-lts"),
            AcquisitionStrategy::DirectDownload(DirectDownload {
                url: NODE_WINDOWS_URL.to_string(),
                installer_name: "node-v22.15.0-x64.msi".to_string(),
                installer: InstallerKind::Msi,
                silent_args: Vec::new(),
                common_install_paths: vec![
                    program_files.join("nodejs"),
                    program_files_x86.join("nodejs"),
                ],
            }),
        ],
    };

    vec![git, node]
}

fn unix_requirements(os: OsFamily) -> Vec<ToolRequirement> {
    let git = ToolRequirement {
        name: "git".to_string(),
        probes: vec![ProbeInvocation::version("git")],
        strategies: vec![package(PackageManager::Brew, "git")],
    };

    let mut node_strategies = vec![package(PackageManager::Brew, "node")];
    if os == OsFamily::MacOs {
        node_strategies.push(AcquisitionStrategy::DirectDownload(DirectDownload {
            url: NODE_MACOS_URL.to_string(),
            installer_name: "node-v22.15.0.pkg".to_string(),
            installer: InstallerKind::Pkg,
            silent_args: Vec::new(),
            common_install_paths: vec![PathBuf::from("/usr/local/bin")],
        }));
    }
    let node = ToolRequirement {
        name: "node".to_string(),
        probes: vec![
            ProbeInvocation::version("node"),
            ProbeInvocation::version("npm"),
        ],
        strategies: node_strategies,
    };

    vec![git, node]
}

fn package(manager: PackageManager, package: &str) -> AcquisitionStrategy {
    AcquisitionStrategy::PackageManager {
        manager,
        package: package.to_string(),
    }
}

fn env_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(fallback))
}

fn default_repository_url() -> String {
    "https://github.com/SillyTavern/SillyTavern.git".to_string()
}

fn default_repository_dir() -> PathBuf {
    PathBuf::from("SillyTavern")
}

fn default_stable_branch() -> String {
    "release".to_string()
}

fn default_staging_branch() -> String {
    "staging".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}
