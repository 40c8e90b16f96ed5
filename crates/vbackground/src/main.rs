mod chroma;
mod cli;
mod run;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    initialise_tracing();
    let args = cli::Args::parse();
    run::run(args)
}

fn initialise_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
