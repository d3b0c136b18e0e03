//! The application's YAML config: port and IP whitelist edits with backup-on-write.

use anyhow::{Context, Result, bail};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::clock::compact_timestamp;

const PORT_KEY: &str = "port";
const WHITELIST_KEY: &str = "whitelist";

#[derive(Debug, Clone)]
/// A loaded YAML document; keys the provisioner does not know are kept untouched.
pub struct SettingsDocument {
    path: PathBuf,
    root: Mapping,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// Per-address outcome of a whitelist edit.
pub struct WhitelistChange {
    pub added: Vec<String>,
    pub duplicates: Vec<String>,
    pub invalid: Vec<String>,
}

impl SettingsDocument {
    /// Load the document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let value: Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let root = match value {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            _ => bail!("{} is not a YAML mapping", path.display()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured port, whether stored as a number or a string.
    pub fn port(&self) -> Option<u16> {
        match self.root.get(PORT_KEY)? {
            Value::Number(number) => number.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn set_port(&mut self, port: u16) -> Result<()> {
        if port == 0 {
            bail!("port must be between 1 and 65535");
        }
        self.root
            .insert(Value::from(PORT_KEY), Value::from(u64::from(port)));
        Ok(())
    }

    /// Whitelisted addresses in file order.
    pub fn whitelist(&self) -> Vec<String> {
        match self.root.get(WHITELIST_KEY) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Append valid, not yet listed IP addresses, keeping existing order.
    pub fn add_to_whitelist<S: AsRef<str>>(&mut self, candidates: &[S]) -> WhitelistChange {
        let mut current = self.whitelist();
        let mut change = WhitelistChange::default();
        for candidate in candidates {
            let candidate = candidate.as_ref().trim();
            if candidate.is_empty() {
                continue;
            }
            if candidate.parse::<IpAddr>().is_err() {
                change.invalid.push(candidate.to_string());
                continue;
            }
            if current.iter().any(|existing| existing == candidate) {
                change.duplicates.push(candidate.to_string());
                continue;
            }
            current.push(candidate.to_string());
            change.added.push(candidate.to_string());
        }
        if change.added.is_empty() {
            return change;
        }

        let key = Value::from(WHITELIST_KEY);
        match self.root.get_mut(&key) {
            Some(Value::Sequence(items)) => {
                items.extend(change.added.iter().map(|ip| Value::from(ip.as_str())));
            }
            _ => {
                let items = current.iter().map(|ip| Value::from(ip.as_str())).collect();
                self.root.insert(key, Value::Sequence(items));
            }
        }
        change
    }

    /// Write the document, first renaming the existing file to a timestamped backup.
    ///
    /// When writing fails the backup is moved back into place. Returns the backup path.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        let data = serde_yaml::to_string(&Value::Mapping(self.root.clone()))
            .context("failed to serialize config")?;

        let backup = if self.path.exists() {
            let backup = backup_path(&self.path);
            fs::rename(&self.path, &backup).with_context(|| {
                format!(
                    "failed to back up {} to {}",
                    self.path.display(),
                    backup.display()
                )
            })?;
            tracing::info!(backup = %backup.display(), "config backed up");
            Some(backup)
        } else {
            None
        };

        if let Err(err) = fs::write(&self.path, data) {
            if let Some(backup) = &backup {
                if let Err(restore_err) = fs::rename(backup, &self.path) {
                    bail!(
                        "failed to write {}: {}; restoring backup {} failed: {}",
                        self.path.display(),
                        err,
                        backup.display(),
                        restore_err
                    );
                }
            }
            return Err(err).with_context(|| {
                format!("failed to write {}; previous file restored", self.path.display())
            });
        }
        Ok(backup)
    }
}

/// Parse operator input into a port between 1 and 65535.
pub fn parse_port(input: &str) -> Result<u16> {
    let port: u16 = input
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a port number between 1 and 65535", input.trim()))?;
    if port == 0 {
        bail!("port must be between 1 and 65535");
    }
    Ok(port)
}

/// Split comma- or whitespace-separated operator input into address candidates.
pub fn split_addresses(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.yaml".to_string());
    path.with_file_name(format!("{}.bak.{}", name, compact_timestamp()))
}
