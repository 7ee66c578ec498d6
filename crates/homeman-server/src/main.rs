//! `homeman` entry point.

use clap::Parser;
use homeman_server::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    homeman_server::run(args).await?;
    Ok(())
}
