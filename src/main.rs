use std::path::PathBuf;
use std::process::ExitCode;

use bracket_challenge_lib::config::{load_config_from, load_config_inner, load_env_file, logs_dir};
use bracket_challenge_lib::{init_tracing, scoreboard_text, scores_csv_text, serve, validate_roster};
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "bracket-challenge")]
#[command(about = "Bracket challenge scoring and leaderboard server")]
struct Cli {
    /// Path to config.json
    #[arg(short, long, env = "BRACKET_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Listen address (overrides config file)
    #[arg(long, env = "BRACKET_BIND_ADDR")]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the leaderboard and viewer over HTTP
    Serve,
    /// Print the current scoreboard and exit
    Score {
        /// Print `Name,Current Score` CSV sorted by name
        #[arg(long)]
        csv: bool,
    },
    /// Compare a tournament data document against the configured roster
    Validate { document: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    load_env_file();
    let cli = Cli::parse();
    let _guard = init_tracing(&logs_dir());
    info!("bracket challenge starting");

    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config_inner(),
    };
    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Score { csv: false } => scoreboard_text(&config).map(|text| print!("{text}")),
        Command::Score { csv: true } => scores_csv_text(&config).map(|text| print!("{text}")),
        Command::Validate { document } => validate_roster(&config, &document).map(|text| print!("{text}")),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
