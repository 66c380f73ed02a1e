mod args;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use dedupmail::config::validate_config;
use dedupmail::db::{default_database_path, seen_repo};
use dedupmail::pipeline::LogProgress;
use dedupmail::secrets::expand_home;
use dedupmail::{
    CancelToken, Config, ConfigError, Database, ImapTransport, Pipeline, PipelineConfig,
    RunOutcome, RunReport,
};

use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(&args.log_level) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting dedupmail v{}", env!("CARGO_PKG_VERSION"));

    match run(&args).await {
        Ok(report) => {
            println!("{}", report);
            match report.outcome {
                RunOutcome::Completed => ExitCode::SUCCESS,
                RunOutcome::Cancelled => ExitCode::from(130),
                RunOutcome::Aborted { .. } => ExitCode::FAILURE,
            }
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> dedupmail::Result<RunReport> {
    let config = args.resolve_config()?;
    validate_config(&config)?;

    let db = Database::open(&database_path(&config)?)?;
    if args.reset_index {
        let removed = seen_repo::delete_by_mailbox(&db, &config.dedupe.mailbox)?;
        info!(
            "Reset index for {}: {} fingerprints removed",
            config.dedupe.mailbox, removed
        );
    }

    let pipeline = Pipeline::new(PipelineConfig::from_config(&config), db)?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing the current batch");
        handler_token.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    info!(
        "Connecting to {}:{} as {}",
        config.imap.host, config.imap.port, config.imap.username
    );
    let mut transport = ImapTransport::connect(config.imap.clone()).await?;
    let report = pipeline.run(&mut transport, &LogProgress, &cancel).await;
    transport.disconnect().await;

    Ok(report)
}

fn database_path(config: &Config) -> Result<PathBuf, ConfigError> {
    match &config.database_path {
        Some(path) => Ok(PathBuf::from(expand_home(path))),
        None => default_database_path().ok_or_else(|| ConfigError::Validation {
            message: "Cannot determine home directory; pass --db".to_string(),
        }),
    }
}
