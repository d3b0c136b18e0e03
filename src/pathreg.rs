//! Permanent, idempotent registration of directories in the system-wide PATH.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::EnvironmentContext;
use crate::error::ProvisionError;
use crate::runner;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Raw PATH value as persisted, plus whether it uses expandable encoding.
pub struct PathValue {
    pub raw: String,
    pub expandable: bool,
}

/// Persisted system PATH storage.
pub trait PathStore {
    /// Separator between PATH entries.
    fn separator(&self) -> char;
    /// Read the persisted value.
    fn read(&self) -> Result<PathValue>;
    /// Persist a new value, keeping the encoding described by `value.expandable`.
    fn write(&self, value: &PathValue) -> Result<()>;
    /// Tell running processes the environment changed.
    fn broadcast(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a registration did.
pub enum Registration {
    AlreadyPresent,
    /// `notified` is false when the broadcast failed and a restart is needed.
    Appended { notified: bool },
}

/// Append `dir` to the system PATH held by `store` unless an equivalent entry exists.
pub fn register(
    ctx: &EnvironmentContext,
    store: &dyn PathStore,
    dir: &Path,
) -> Result<Registration> {
    if !ctx.is_elevated() {
        return Err(ProvisionError::PrivilegeRequired {
            action: format!("adding {} to the system PATH", dir.display()),
        }
        .into());
    }

    let candidate = dir.to_string_lossy().trim().to_string();
    if candidate.is_empty() {
        bail!("refusing to register an empty PATH entry");
    }

    let current = store.read().context("failed to read the system PATH")?;
    let separator = store.separator();
    let wanted = normalize_entry(&candidate);
    if current
        .raw
        .split(separator)
        .any(|entry| !entry.trim().is_empty() && normalize_entry(entry) == wanted)
    {
        tracing::info!(dir = %candidate, "already on system PATH");
        return Ok(Registration::AlreadyPresent);
    }

    let trimmed = current.raw.trim().trim_end_matches(separator);
    let raw = if trimmed.is_empty() {
        candidate.clone()
    } else {
        format!("{}{}{}", trimmed, separator, candidate)
    };
    store
        .write(&PathValue {
            raw,
            expandable: current.expandable,
        })
        .context("failed to write the system PATH")?;
    tracing::info!(dir = %candidate, "appended to system PATH");

    let notified = match store.broadcast() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "environment change broadcast failed");
            false
        }
    };
    Ok(Registration::Appended { notified })
}

/// Case-folded, separator-normalized form used for PATH entry comparison.
pub fn normalize_entry(entry: &str) -> String {
    let unquoted = entry.trim().trim_matches('"');
    let unified = unquoted.replace('\\', "/");
    let mut collapsed = String::with_capacity(unified.len());
    for ch in unified.chars() {
        if ch == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(ch);
    }
    let stripped = collapsed.trim_end_matches('/');
    let stripped = if stripped.is_empty() && !collapsed.is_empty() {
        "/"
    } else {
        stripped
    };
    stripped.to_lowercase()
}

const ENVIRONMENT_KEY: &str =
    r"HKLM:\SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

/// Machine-wide PATH in the Windows registry, driven through PowerShell.
pub struct RegistryPathStore;

impl PathStore for RegistryPathStore {
    fn separator(&self) -> char {
        ';'
    }

    fn read(&self) -> Result<PathValue> {
        let script = format!(
            "[Console]::OutputEncoding = [Text.Encoding]::UTF8; \
             $k = Get-Item -LiteralPath '{key}'; \
             if ($k.GetValueNames() -contains 'Path') {{ \
             [Console]::Out.WriteLine($k.GetValueKind('Path')); \
             [Console]::Out.Write($k.GetValue('Path', '', 'DoNotExpandEnvironmentNames')) \
             }} else {{ [Console]::Out.WriteLine('Missing') }}",
            key = ENVIRONMENT_KEY
        );
        let stdout = powershell(&script)?;
        parse_registry_read(&stdout)
    }

    fn write(&self, value: &PathValue) -> Result<()> {
        let kind = if value.expandable {
            "ExpandString"
        } else {
            "String"
        };
        let script = format!(
            "Set-ItemProperty -LiteralPath '{key}' -Name Path -Type {kind} -Value '{value}'",
            key = ENVIRONMENT_KEY,
            kind = kind,
            value = value.raw.replace('\'', "''")
        );
        powershell(&script).map(|_| ())
    }

    fn broadcast(&self) -> Result<()> {
        let script = "Add-Type -Namespace Rigger -Name Env -MemberDefinition '\
            [DllImport(\"user32.dll\", SetLastError = true, CharSet = CharSet.Unicode)] \
            public static extern System.IntPtr SendMessageTimeout(System.IntPtr hWnd, uint Msg, \
            System.UIntPtr wParam, string lParam, uint fuFlags, uint uTimeout, \
            out System.UIntPtr lpdwResult);'; \
            $r = [System.UIntPtr]::Zero; \
            $ok = [Rigger.Env]::SendMessageTimeout([System.IntPtr]0xffff, 0x1A, \
            [System.UIntPtr]::Zero, 'Environment', 2, 5000, [ref]$r); \
            if ($ok -eq [System.IntPtr]::Zero) { exit 1 }";
        powershell(script).map(|_| ())
    }
}

fn powershell(script: &str) -> Result<String> {
    let output = runner::run_output(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
    )?;
    if !output.status.success() {
        bail!(
            "powershell failed: {}",
            runner::diagnostic_text(&output)
        );
    }
    String::from_utf8(output.stdout).context("powershell output is not valid UTF-8")
}

fn parse_registry_read(stdout: &str) -> Result<PathValue> {
    let stdout = stdout.trim_start_matches('\u{feff}');
    let (kind, rest) = match stdout.split_once('\n') {
        Some((kind, rest)) => (kind.trim(), rest),
        None => (stdout.trim(), ""),
    };
    let raw = rest.trim_end_matches(['\r', '\n']).to_string();
    match kind {
        "ExpandString" => Ok(PathValue {
            raw,
            expandable: true,
        }),
        "String" => Ok(PathValue {
            raw,
            expandable: false,
        }),
        // Windows default for a fresh machine PATH.
        "Missing" => Ok(PathValue {
            raw: String::new(),
            expandable: true,
        }),
        other => bail!("unexpected registry value kind for Path: {}", other),
    }
}

/// Login PATH a pam_env session gets when `/etc/environment` sets none.
pub const DEFAULT_SYSTEM_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// `PATH="..."` line of a pam_env style file such as `/etc/environment`.
pub struct EnvironmentFileStore {
    path: PathBuf,
}

impl EnvironmentFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The system-wide `/etc/environment`.
    pub fn system() -> Self {
        Self::new(PathBuf::from("/etc/environment"))
    }
}

impl PathStore for EnvironmentFileStore {
    fn separator(&self) -> char {
        ':'
    }

    fn read(&self) -> Result<PathValue> {
        let contents = if self.path.exists() {
            fs::read_to_string(&self.path)
                .with_context(|| format!("failed to read {}", self.path.display()))?
        } else {
            String::new()
        };
        let raw = match contents.lines().find_map(parse_path_line) {
            Some(raw) => raw,
            None => {
                tracing::info!(
                    file = %self.path.display(),
                    seed = DEFAULT_SYSTEM_PATH,
                    "no PATH line; seeding the login default"
                );
                DEFAULT_SYSTEM_PATH.to_string()
            }
        };
        Ok(PathValue {
            raw,
            expandable: false,
        })
    }

    fn write(&self, value: &PathValue) -> Result<()> {
        let contents = if self.path.exists() {
            fs::read_to_string(&self.path)
                .with_context(|| format!("failed to read {}", self.path.display()))?
        } else {
            String::new()
        };
        let line = format!("PATH=\"{}\"", value.raw);
        let mut replaced = false;
        let mut lines: Vec<String> = Vec::new();
        for existing in contents.lines() {
            if !replaced && parse_path_line(existing).is_some() {
                lines.push(line.clone());
                replaced = true;
            } else {
                lines.push(existing.to_string());
            }
        }
        if !replaced {
            lines.push(line);
        }
        let mut output = lines.join("\n");
        output.push('\n');
        fs::write(&self.path, output)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn broadcast(&self) -> Result<()> {
        bail!("running sessions pick up /etc/environment only after logging in again")
    }
}

fn parse_path_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let value = trimmed.strip_prefix("PATH=")?;
    Some(value.trim().trim_matches('"').trim_matches('\'').to_string())
}
