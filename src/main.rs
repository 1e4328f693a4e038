use brokerage_cache::cli::{self, Cli, Command};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let base_url = cli.base_url.as_deref();

    match cli.command {
        Command::List(args) => cli::list::run(base_url, args).await,
        Command::Show(args) => cli::show::run(base_url, args).await,
        Command::Warm(args) => cli::warm::run(base_url, args).await,
        Command::Entities => cli::entities::run(),
    }
}
