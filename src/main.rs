use clap::Parser;

use usage_pipeline::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    cli::run(Cli::parse()).await
}
