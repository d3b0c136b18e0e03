//! Fetch an installer over HTTP(S) into a local file.

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_REDIRECTS: usize = 10;
const BODY_EXCERPT_LEN: usize = 512;

/// Download `url` to `destination`, returning the number of bytes written.
///
/// Parent directories are created as needed. Any non-2xx status is an error, and a
/// partially written file is removed when the body copy fails.
pub fn fetch(url: &str, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    tracing::info!(url, dest = %destination.display(), "downloading");
    let client = Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
        .context("failed to build http client")?;
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("http request to {} failed", url))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        bail!(
            "download of {} failed with status {}: {}",
            url,
            status,
            excerpt(&body)
        );
    }

    let mut file = fs::File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    match response.copy_to(&mut file) {
        Ok(bytes) => {
            tracing::info!(
                file = %destination.display(),
                mib = %format!("{:.2}", bytes as f64 / (1024.0 * 1024.0)),
                "download complete"
            );
            Ok(bytes)
        }
        Err(err) => {
            drop(file);
            let _ = fs::remove_file(destination);
            Err(err).with_context(|| format!("failed to write {}", destination.display()))
        }
    }
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= BODY_EXCERPT_LEN {
        return body;
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
