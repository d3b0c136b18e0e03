use anyhow::Result;

use super::{Channel, Session, prereq, prompt, repo, settings};
use crate::settings::{parse_port, split_addresses};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Install,
    Switch(Channel),
    Port,
    Whitelist,
    Exit,
}

/// Interactive loop; failures of one action are printed and the menu is shown again.
pub(super) fn run(session: &mut Session) -> Result<()> {
    prereq::ensure(session)?;

    loop {
        print_menu(session);
        let Some(choice) = prompt::read_line("Choose an option: ")? else {
            return Ok(());
        };
        let Some(action) = parse_choice(&choice) else {
            println!("unknown option: {}", choice);
            continue;
        };

        let outcome = match action {
            Action::Install => repo::install(session),
            Action::Switch(channel) => repo::switch(session, channel),
            Action::Port => edit_port(session),
            Action::Whitelist => edit_whitelist(session),
            Action::Exit => return Ok(()),
        };
        if let Err(err) = outcome {
            tracing::warn!(?action, error = %format!("{:#}", err), "menu action failed");
            println!("error: {:#}", err);
        }
        println!();
    }
}

fn print_menu(session: &Session) {
    let repo = &session.config.repository;
    println!("SillyTavern at {}", repo.dir.display());
    println!("  1) Install or update");
    println!("  2) Switch to {} (stable)", repo.stable_branch);
    println!("  3) Switch to {} (staging)", repo.staging_branch);
    println!("  4) Set port");
    println!("  5) Add addresses to the whitelist");
    println!("  0) Exit");
}

fn parse_choice(choice: &str) -> Option<Action> {
    match choice.trim().to_ascii_lowercase().as_str() {
        "1" => Some(Action::Install),
        "2" => Some(Action::Switch(Channel::Stable)),
        "3" => Some(Action::Switch(Channel::Staging)),
        "4" => Some(Action::Port),
        "5" => Some(Action::Whitelist),
        "0" | "q" | "quit" | "exit" => Some(Action::Exit),
        _ => None,
    }
}

fn edit_port(session: &Session) -> Result<()> {
    let mut doc = settings::open(session)?;
    match doc.port() {
        Some(port) => println!("current port: {}", port),
        None => println!("no port set"),
    }
    let Some(input) = prompt::read_line("New port (empty to cancel): ")? else {
        return Ok(());
    };
    if input.is_empty() {
        return Ok(());
    }
    let port = parse_port(&input)?;
    doc.set_port(port)?;
    settings::save(&doc)?;
    println!("port set to {}", port);
    Ok(())
}

fn edit_whitelist(session: &Session) -> Result<()> {
    let mut doc = settings::open(session)?;
    settings::print_whitelist(&doc);
    let Some(input) = prompt::read_line("Addresses to add, comma separated (empty to cancel): ")?
    else {
        return Ok(());
    };
    let candidates = split_addresses(&input);
    if candidates.is_empty() {
        return Ok(());
    }
    let change = doc.add_to_whitelist(&candidates);
    settings::print_change(&change);
    if !change.added.is_empty() {
        settings::save(&doc)?;
    }
    Ok(())
}
