use anyhow::Result;

use super::Session;
use crate::git;

/// Report tool availability, privileges and the checkout without changing anything.
pub(super) fn handle(session: &Session) -> Result<()> {
    println!("os={:?}", session.ctx.os());
    println!("elevated={}", session.ctx.is_elevated());

    for requirement in session.config.requirements(session.ctx.os()) {
        let present = session.platform.probe(&session.ctx, &requirement);
        println!("{}_ok={}", requirement.name, present);
        if !present {
            for strategy in &requirement.strategies {
                println!("  would try: {}", strategy);
            }
        }
    }

    let repo = &session.config.repository;
    println!("repository={}", repo.dir.display());
    println!("repository_ok={}", git::is_repository(&repo.dir));
    let settings = session.config.settings_path();
    println!("settings={}", settings.display());
    println!("settings_ok={}", settings.exists());
    Ok(())
}
