use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Print `prompt` and read one trimmed line; `None` once input is closed.
pub(super) fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask a yes/no question; anything but an explicit yes is a no.
pub(super) fn confirm(question: &str) -> Result<bool> {
    let answer = read_line(&format!("{} [y/N]: ", question))?;
    Ok(answer.as_deref().is_some_and(is_yes))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}
