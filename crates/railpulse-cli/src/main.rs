use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod command;
mod config;
mod util;

const DEFAULT_LOG_FILTER: &str = "railpulse=info";

fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    command::run()
}
