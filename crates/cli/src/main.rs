use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use visionq_core::ArtifactName;
use visionq_infra::{
    Dispatcher, FsArtifactStore, PredictError, PredictionService, RedisConnection, Settings,
    UploadStore,
};
use visionq_observability::{LogFormat, LogSettings};

/// Exit status when the file extension is not a supported image type.
const EXIT_UNSUPPORTED_FILE: u8 = 2;
/// Exit status when the prediction came back as the error sentinel.
const EXIT_PREDICTION_FAILED: u8 = 3;
/// Exit status when no worker answered within the wait budget.
const EXIT_TIMEOUT: u8 = 4;

#[derive(Parser)]
#[command(name = "visionq-cli", about = "Submit images to the visionq inference workers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload an image, wait for its classification and print it as JSON
    Predict {
        file: PathBuf,
        /// Wait budget in seconds (overrides API_SLEEP_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<u64>,
        /// Upload folder shared with the workers (overrides UPLOAD_FOLDER)
        #[arg(long)]
        upload_folder: Option<PathBuf>,
    },
    /// Print the canonical stored name of an image without uploading it
    Name { file: PathBuf },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    visionq_observability::init_with(
        &LogSettings::default()
            .with_format(LogFormat::Compact)
            .with_default_directive("warn"),
    );

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Name { file } => {
            let (filename, content) = read_upload(&file)?;
            println!("{}", ArtifactName::for_content(&filename, &content));
            Ok(ExitCode::SUCCESS)
        }
        Command::Predict {
            file,
            timeout,
            upload_folder,
        } => {
            let mut settings = Settings::from_env().context("invalid configuration")?;
            if let Some(secs) = timeout {
                settings.poll_timeout = Duration::from_secs(secs);
            }
            if let Some(folder) = upload_folder {
                settings.upload_folder = folder;
            }
            predict(&settings, &file)
        }
    }
}

fn predict(settings: &Settings, file: &Path) -> Result<ExitCode> {
    let (filename, content) = read_upload(file)?;

    let redis = RedisConnection::open(&settings.redis_url)
        .with_context(|| format!("cannot reach redis at {}", settings.redis_url))?;
    let dispatcher = Dispatcher::new(
        redis.queue(settings.queue_name.clone()),
        redis.results(settings.result_namespace.clone(), settings.result_ttl),
        settings.dispatcher_config(),
    );
    let artifacts = FsArtifactStore::open(&settings.upload_folder).with_context(|| {
        format!("cannot open upload folder {}", settings.upload_folder.display())
    })?;
    let service = PredictionService::new(UploadStore::new(Arc::new(artifacts)), dispatcher);

    debug!(file = %file.display(), bytes = content.len(), "submitting");
    match service.predict(&filename, &content) {
        Ok(response) => {
            println!("{}", serde_json::to_string(&response)?);
            if response.success {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_PREDICTION_FAILED))
            }
        }
        Err(e) if e.is_timeout() => {
            eprintln!("error: {e}");
            Ok(ExitCode::from(EXIT_TIMEOUT))
        }
        Err(e @ PredictError::UnsupportedFile { .. }) => {
            eprintln!("error: {e}");
            Ok(ExitCode::from(EXIT_UNSUPPORTED_FILE))
        }
        Err(e) => Err(e.into()),
    }
}

fn read_upload(file: &Path) -> Result<(String, Vec<u8>)> {
    let content = fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((filename, content))
}
