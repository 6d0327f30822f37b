mod daemon;

use clap::Parser;
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

/// Keep bare git mirrors up to date and serve them over HTTP.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Path to config TOML
    config: PathBuf,
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
    /// Validate the config, print the resolved repos and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match daemon::config::load(&args.config) {
        Ok((global, registry)) if args.check => {
            daemon::describe(&global, &registry);
            Ok(())
        }
        Ok((global, registry)) => daemon::run(global, registry).await,
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
