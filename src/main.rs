use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use barrage::cli::Config;
use barrage::runner::Runner;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let runner = match Runner::new(config) {
        Ok(runner) => runner,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };

    // A completed run exits 0 regardless of the error rate; only failing to
    // run (or to write the report) is fatal.
    if let Err(err) = runner.run().await {
        error!("{err}");
        std::process::exit(1);
    }
}
