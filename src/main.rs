use anyhow::Result;
use syleaf::cli::{self, Verbosity};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    init_logging(cli::verbosity(&args));
    cli::run(&args)
}

/// `-v`/`-vv` win over `SYLEAF_LOG`; without either only warnings are shown.
fn init_logging(verbosity: Verbosity) {
    let filter = match verbosity {
        Verbosity::Quiet => EnvFilter::try_from_env("SYLEAF_LOG")
            .unwrap_or_else(|_| EnvFilter::new(verbosity.filter())),
        _ => EnvFilter::new(verbosity.filter()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
