use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use visionq_ai::CommandClassifier;
use visionq_infra::{FsArtifactStore, RedisConnection, Settings, UploadStore, Worker, WorkerPool};
use visionq_observability::{LogFormat, LogSettings};

/// Consume inference jobs from Redis and write their results back.
///
/// Everything not given on the command line comes from the environment
/// (and `.env`).
#[derive(Parser, Debug)]
#[command(name = "visionq-worker")]
struct Cli {
    /// Number of worker threads (overrides WORKER_CONCURRENCY).
    #[arg(short = 'n', long)]
    workers: Option<usize>,

    /// Classifier command line (overrides CLASSIFIER_CMD).
    #[arg(long)]
    classifier: Option<String>,

    /// Log output: json or compact.
    #[arg(long, env = "LOG_FORMAT", default_value = "json", value_parser = parse_log_format)]
    log_format: LogFormat,
}

fn parse_log_format(raw: &str) -> Result<LogFormat, String> {
    LogFormat::parse(raw)
        .ok_or_else(|| format!("unknown log format `{raw}` (expected json or compact)"))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    visionq_observability::init_with(&LogSettings::default().with_format(cli.log_format));

    let mut settings = Settings::from_env().context("invalid configuration")?;
    if let Some(workers) = cli.workers {
        anyhow::ensure!(workers > 0, "--workers must be at least 1");
        settings.worker_concurrency = workers;
    }
    if let Some(cmd) = cli.classifier {
        settings.classifier_cmd = Some(cmd);
    }

    let classifier = CommandClassifier::from_command_line(settings.require_classifier_cmd()?)?
        .with_timeout(settings.classifier_timeout);

    let redis = RedisConnection::open(&settings.redis_url)
        .with_context(|| format!("cannot reach redis at {}", settings.redis_url))?;
    let queue = redis.queue(settings.queue_name.clone());
    let results = redis.results(settings.result_namespace.clone(), settings.result_ttl);

    let artifacts = FsArtifactStore::open(&settings.upload_folder).with_context(|| {
        format!("cannot open upload folder {}", settings.upload_folder.display())
    })?;
    let uploads = UploadStore::new(Arc::new(artifacts));

    let worker = Worker::new(
        queue,
        results,
        uploads,
        Arc::new(classifier),
        settings.worker_config("visionq-worker"),
    );
    let pool = WorkerPool::spawn(worker, settings.worker_concurrency)?;

    info!(
        workers = pool.len(),
        queue = %settings.queue_name,
        upload_folder = %settings.upload_folder.display(),
        "worker pool running"
    );

    // Workers only stop on process exit; an in-flight job is then lost.
    pool.join();
    Ok(())
}
