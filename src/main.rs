use std::process::exit;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    let layer = fmt::layer().compact().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(err) = rigger::cli::run() {
        error!("{err:#}");
        exit(1);
    }
}
