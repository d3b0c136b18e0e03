use anyhow::{Result, bail};

use super::Session;
use crate::settings::{SettingsDocument, WhitelistChange, parse_port, split_addresses};

/// Print the configured port, or validate and store a new one.
pub(super) fn handle_port(session: &Session, value: Option<&str>) -> Result<()> {
    let mut doc = open(session)?;
    let Some(raw) = value else {
        match doc.port() {
            Some(port) => println!("port={}", port),
            None => println!("no port set in {}", doc.path().display()),
        }
        return Ok(());
    };

    let port = parse_port(raw)?;
    doc.set_port(port)?;
    save(&doc)?;
    println!("port set to {}", port);
    Ok(())
}

/// Print the whitelist, or add the given addresses to it.
pub(super) fn handle_whitelist(session: &Session, addresses: &[String]) -> Result<()> {
    let mut doc = open(session)?;
    let candidates: Vec<String> = addresses
        .iter()
        .flat_map(|arg| split_addresses(arg))
        .collect();
    if candidates.is_empty() {
        print_whitelist(&doc);
        return Ok(());
    }

    let change = doc.add_to_whitelist(&candidates);
    print_change(&change);
    if change.added.is_empty() {
        println!("whitelist unchanged");
        return Ok(());
    }
    save(&doc)?;
    print_whitelist(&doc);
    Ok(())
}

pub(super) fn open(session: &Session) -> Result<SettingsDocument> {
    let path = session.config.settings_path();
    if !path.exists() {
        bail!(
            "{} not found; start SillyTavern once so it creates its config",
            path.display()
        );
    }
    SettingsDocument::load(&path)
}

pub(super) fn save(doc: &SettingsDocument) -> Result<()> {
    if let Some(backup) = doc.save()? {
        println!("previous config saved as {}", backup.display());
    }
    Ok(())
}

pub(super) fn print_whitelist(doc: &SettingsDocument) {
    let whitelist = doc.whitelist();
    if whitelist.is_empty() {
        println!("whitelist is empty");
        return;
    }
    println!("whitelist:");
    for address in whitelist {
        println!("  {}", address);
    }
}

pub(super) fn print_change(change: &WhitelistChange) {
    for address in &change.added {
        println!("added {}", address);
    }
    for address in &change.duplicates {
        println!("skipped {} (already listed)", address);
    }
    for address in &change.invalid {
        println!("skipped {} (not a valid IP address)", address);
    }
}
