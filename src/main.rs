mod callbacks;
mod cli;
mod client;
mod compositor;
mod context;
mod daemon;
mod events;
mod ipc;
mod registry;
mod resolver;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Daemon(args) => {
            if let Err(e) = daemon::run(args.config()).await {
                tracing::error!(error = %e, "daemon failed");
                eprintln!("shellctxd daemon: {e}");
                std::process::exit(1);
            }
        }
        Command::Client { action } => {
            if let Err(e) = client::run(action).await {
                tracing::error!(error = %e, "client failed");
                eprintln!("shellctxd client: {e}");
                std::process::exit(1);
            }
        }
    }
}
