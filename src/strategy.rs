//! Installation strategies tried, in declared order, for a missing tool.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::probe::ProbeInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Package managers the provisioner knows how to drive non-interactively.
pub enum PackageManager {
    Winget,
    Chocolatey,
    Brew,
}

impl PackageManager {
    pub fn name(self) -> &'static str {
        match self {
            PackageManager::Winget => "winget",
            PackageManager::Chocolatey => "choco",
            PackageManager::Brew => "brew",
        }
    }

    /// Version query proving the manager itself is usable.
    pub fn probe(self) -> ProbeInvocation {
        ProbeInvocation::version(self.name())
    }

    /// Program and arguments installing `package` with every agreement pre-accepted.
    pub fn install_command(self, package: &str) -> (String, Vec<String>) {
        let (program, args): (&str, Vec<&str>) = match self {
            PackageManager::Winget => (
                "winget",
                vec![
                    "install",
                    "--id",
                    package,
                    "-e",
                    "--accept-source-agreements",
                    "--accept-package-agreements",
                ],
            ),
            // choco is usually a shim; route through cmd so PATHEXT resolution applies.
            PackageManager::Chocolatey => ("cmd", vec!["/c", "choco", "install", package, "-y"]),
            PackageManager::Brew => ("brew", vec!["install", package]),
        };
        (
            program.to_string(),
            args.into_iter().map(str::to_string).collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Installer file formats with a known silent invocation.
pub enum InstallerKind {
    Msi,
    Exe,
    Pkg,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// Download an installer and run it silently.
pub struct DirectDownload {
    pub url: String,
    pub installer_name: String,
    pub installer: InstallerKind,
    #[serde(default)]
    pub silent_args: Vec<String>,
    #[serde(default)]
    pub common_install_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// One concrete way to install a missing tool.
pub enum AcquisitionStrategy {
    PackageManager {
        manager: PackageManager,
        package: String,
    },
    DirectDownload(DirectDownload),
}

impl fmt::Display for AcquisitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStrategy::PackageManager { manager, package } => {
                write!(f, "{} install {}", manager.name(), package)
            }
            AcquisitionStrategy::DirectDownload(install) => {
                write!(f, "download {}", install.url)
            }
        }
    }
}
