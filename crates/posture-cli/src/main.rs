use clap::Parser;

mod args;
mod commands;

use args::Cli;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = commands::dispatch(cli).await {
        eprintln!("fatal: {e:?}");
        std::process::exit(2);
    }
}
