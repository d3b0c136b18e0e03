//! CLI entrypoints and command routing.

mod doctor;
mod menu;
mod prereq;
mod prompt;
mod repo;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{ProvisionerConfig, load_config};
use crate::context::EnvironmentContext;
use crate::platform::{self, Platform};

#[derive(Parser, Debug)]
#[command(
    name = "rigger",
    version,
    about = "Install, update and configure a SillyTavern checkout"
)]
struct Cli {
    #[arg(
        short = 'c',
        long,
        default_value = "rigger.toml",
        help = "Provisioner config path"
    )]
    config: PathBuf,
    #[arg(short = 'd', long, help = "Repository directory override")]
    dir: Option<PathBuf>,
    #[arg(short = 'y', long, help = "Install missing tools without asking")]
    yes: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive menu (default)
    #[command(alias = "m")]
    Menu,
    /// Clone or update the application and install its dependencies
    #[command(alias = "i")]
    Install,
    /// Switch the checkout to another branch, keeping local edits
    #[command(alias = "s")]
    Switch {
        #[arg(value_enum)]
        channel: Channel,
    },
    /// Show or set the server port
    #[command(alias = "p")]
    Port { port: Option<String> },
    /// Show the IP whitelist or add addresses to it
    #[command(alias = "w")]
    Whitelist { addresses: Vec<String> },
    /// Report tool availability and privileges without changing anything
    Doctor,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
/// Branch families offered to the operator.
pub enum Channel {
    Stable,
    Staging,
}

/// Everything a command handler needs: configuration, environment facts and the platform.
pub(crate) struct Session {
    config: ProvisionerConfig,
    ctx: EnvironmentContext,
    platform: Box<dyn Platform>,
    assume_yes: bool,
}

impl Session {
    fn branch_for(&self, channel: Channel) -> &str {
        match channel {
            Channel::Stable => &self.config.repository.stable_branch,
            Channel::Staging => &self.config.repository.staging_branch,
        }
    }
}

/// Entry point for the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(dir) = cli.dir {
        config.repository.dir = dir;
    }
    let mut session = Session {
        config,
        ctx: EnvironmentContext::detect(),
        platform: platform::native(),
        assume_yes: cli.yes,
    };

    match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => menu::run(&mut session),
        Command::Install => {
            prereq::ensure(&mut session)?;
            repo::install(&session)
        }
        Command::Switch { channel } => {
            prereq::ensure(&mut session)?;
            repo::switch(&session, channel)
        }
        Command::Port { port } => settings::handle_port(&session, port.as_deref()),
        Command::Whitelist { addresses } => settings::handle_whitelist(&session, &addresses),
        Command::Doctor => doctor::handle(&session),
    }
}
