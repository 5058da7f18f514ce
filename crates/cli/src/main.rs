#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use txbuild_cli::cli::Cli;
use txbuild_cli::settings::Settings;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    logging_init(&settings.log_filter);
    debug!(?settings, "settings loaded");

    txbuild_cli::run(cli, &settings)
}

/// Logs go to stderr so command output on stdout stays parseable.
fn logging_init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
