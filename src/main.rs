use clap::Parser;
use moneytalk_sync::args::{Args, Command};
use moneytalk_sync::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().moneytalk_home().path();

    // When MONEYTALK_IN_TEST_MODE is set and non-empty, the in-memory ledger is used instead of
    // the API.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(
            home,
            init_args.api_url(),
            init_args.user_id(),
            init_args.token_file(),
        )
        .await?
        .print(),

        Command::Add(add_args) => {
            let config = Config::load(home).await?;
            commands::add(config, mode, add_args.clone()).await?.print()
        }

        Command::Pending => commands::pending(Config::load(home).await?).await?.print(),

        Command::Sync => commands::sync(Config::load(home).await?, mode)
            .await?
            .print(),

        Command::List(list_args) => {
            let config = Config::load(home).await?;
            commands::list(config, mode, list_args.clone())
                .await?
                .print()
        }

        Command::Update(update_args) => {
            let config = Config::load(home).await?;
            commands::update(config, mode, update_args.clone())
                .await?
                .print()
        }

        Command::Delete(delete_args) => {
            let config = Config::load(home).await?;
            commands::delete(config, mode, delete_args.clone())
                .await?
                .print()
        }

        Command::Status => commands::status(Config::load(home).await?, mode)
            .await?
            .print(),

        Command::Watch(watch_args) => {
            let config = Config::load(home).await?;
            commands::watch(config, mode, watch_args.clone())
                .await?
                .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                "moneytalk_sync",
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
