use anyhow::Result;

use super::{Session, prompt};
use crate::acquire;
use crate::error::ProvisionError;

/// Make every required tool runnable, asking before installing anything.
///
/// A declined install or an exhausted strategy chain is a [`ProvisionError::ToolUnavailable`].
pub(super) fn ensure(session: &mut Session) -> Result<()> {
    let requirements = session.config.requirements(session.ctx.os());
    let mut installed = Vec::new();

    for requirement in &requirements {
        if session.platform.probe(&session.ctx, requirement) {
            tracing::debug!(tool = %requirement.name, "prerequisite present");
            continue;
        }

        println!("{} is not installed or not on PATH.", requirement.name);
        if !session.assume_yes
            && !prompt::confirm(&format!("Install {} automatically?", requirement.name))?
        {
            return Err(ProvisionError::ToolUnavailable {
                tool: requirement.name.clone(),
                diagnostic: "automatic installation declined".to_string(),
            }
            .into());
        }

        println!("Installing {}...", requirement.name);
        let outcome = acquire::acquire(&session.ctx, session.platform.as_ref(), requirement);
        if !outcome.succeeded {
            tracing::error!(tool = %outcome.tool, attempts = outcome.attempts, "acquisition failed");
            return Err(ProvisionError::ToolUnavailable {
                tool: outcome.tool,
                diagnostic: outcome.diagnostic,
            }
            .into());
        }

        if let Some(strategy) = &outcome.strategy_used {
            println!("{} installed via {}", outcome.tool, strategy);
        }
        for (program, path) in &outcome.resolved {
            session.ctx.record_resolved(program, path);
            println!("Using {} at {}", program, path.display());
        }
        for dir in &outcome.registered_paths {
            println!("Added {} to the system PATH", dir.display());
        }
        if outcome.newly_installed() {
            installed.push(outcome.tool);
        }
    }

    if !installed.is_empty() {
        println!(
            "Installed {}. Open a new terminal (or log in again) so other programs see the updated PATH.",
            installed.join(" and ")
        );
    }
    Ok(())
}
