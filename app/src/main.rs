use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use onboard_lib::config::JsonFileStore;
use onboard_lib::settings::{SetupSettings, DEFAULT_POLL_INTERVAL};
use onboard_lib::{commands, logging, Error};

#[derive(Parser)]
#[command(name = "onboard")]
#[command(about = "Set up a local Ollama runtime for the desktop assistant")]
#[command(version)]
struct Cli {
    /// Ollama host, e.g. localhost or 10.0.0.5:11434 [default: $OLLAMA_HOST or localhost]
    #[arg(long, global = true)]
    host: Option<String>,

    /// Model to check for and pull [default: $ONBOARD_MODEL or gpt-oss:20b]
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Config file to commit settings to [default: platform config dir]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect Ollama, download the model and connect the assistant (default)
    Setup {
        /// Seconds between checks while waiting for Ollama to start
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
        poll_interval: u64,

        /// Stop waiting for Ollama after this many seconds
        #[arg(long)]
        poll_timeout: Option<u64>,

        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show whether Ollama is running and what the assistant is configured for
    Status,

    /// List models installed in Ollama
    Models,

    /// Download the model without running setup
    Pull,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::debug!("{:?}", e);
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool, Error> {
    let mut settings = SetupSettings::from_env();
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(model) = cli.model {
        settings.model = model;
    }

    let command = cli.command.unwrap_or(Commands::Setup {
        poll_interval: DEFAULT_POLL_INTERVAL.as_secs(),
        poll_timeout: None,
        yes: false,
    });

    match command {
        Commands::Setup {
            poll_interval,
            poll_timeout,
            yes,
        } => {
            settings.poll_interval = Duration::from_secs(poll_interval.max(1));
            settings.poll_timeout = poll_timeout.map(Duration::from_secs);
            let store = open_store(cli.config)?;
            log::info!("Committing settings to {}", store.path().display());
            commands::setup::run(settings, store, yes).await
        }
        Commands::Status => {
            let store = match open_store(cli.config) {
                Ok(store) => Some(store),
                Err(e) => {
                    log::warn!("Could not open config store: {}", e);
                    None
                }
            };
            commands::status::run(&settings, store.as_ref()).await
        }
        Commands::Models => commands::models::run(&settings).await,
        Commands::Pull => commands::pull::run(&settings).await,
    }
}

fn open_store(path: Option<PathBuf>) -> Result<JsonFileStore, Error> {
    let store = match path {
        Some(path) => JsonFileStore::open(path)?,
        None => JsonFileStore::open_default()?,
    };
    Ok(store)
}
