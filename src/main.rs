use anyhow::Context;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Log filter variable, e.g. `FRONTDESK_LOG=frontdesk=debug`.
const LOG_ENV_VAR: &str = "FRONTDESK_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    frontdesk::run().context("frontdesk command failed")
}
