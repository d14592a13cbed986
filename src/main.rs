use anyhow::Result;
use clap::Parser;
use memnet_qa::cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("memnet_qa=info".parse()?),
        )
        .init();

    Cli::parse().run()
}
