use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use ocrmeter_core::client::monitor::TaskMonitor;
use ocrmeter_core::client::{OcrClient, RemoteConfig};
use ocrmeter_core::history::HistoryStore;
use ocrmeter_core::metrics::TestMetrics;
use ocrmeter_core::session::SessionReporter;
use ocrmeter_core::OcrmeterError;

/// Performance test harness for a deployed OCR API.
#[derive(Parser)]
#[command(name = "ocrmeter-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a document repeatedly, monitor task completion, and emit
    /// HTML/JSON reports with historical tracking.
    Run {
        /// Base URL of the deployment (overrides OCRMETER_BASE_URL).
        #[arg(long)]
        base_url: Option<String>,
        /// Document to submit for OCR.
        #[arg(long)]
        file: PathBuf,
        /// Number of submissions to drive.
        #[arg(long, default_value_t = 3)]
        requests: u32,
        /// Processing mode sent with each submission.
        #[arg(long, default_value = "basic")]
        mode: String,
        /// Scenario name used in reports and history.
        #[arg(long, default_value = "real_ocr_performance")]
        test_name: String,
        /// Per-task completion timeout in seconds.
        #[arg(long, default_value_t = 180)]
        task_timeout: u64,
        /// Directory where report files are written.
        #[arg(long, default_value = "performance_reports")]
        reports_dir: PathBuf,
        /// SQLite database for historical tracking.
        #[arg(long, default_value = "performance_data.db")]
        db: PathBuf,
        /// Report file name prefix.
        #[arg(long, default_value = "performance_report")]
        prefix: String,
        /// Skip chart rendering.
        #[arg(long)]
        no_charts: bool,
    },
    /// Print historical runs from the tracking database.
    History {
        /// Filter to one scenario name.
        #[arg(long)]
        test_name: Option<String>,
        /// Look-back window in days.
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long, default_value = "performance_data.db")]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), OcrmeterError> {
    match cli.command {
        Command::Run {
            base_url,
            file,
            requests,
            mode,
            test_name,
            task_timeout,
            reports_dir,
            db,
            prefix,
            no_charts,
        } => {
            let mut config = RemoteConfig::from_env();
            if let Some(url) = base_url {
                config.base_url = url;
            }
            let client = OcrClient::from_config(&config)?;

            let store = HistoryStore::open(&db)?;
            let mut builder = SessionReporter::builder(&reports_dir)
                .deployment_url(&config.base_url)
                .history_store(store);
            if no_charts {
                builder = builder.without_charts();
            }
            let mut session = builder.build()?;

            let metrics = run_scenario(
                &client,
                &file,
                requests,
                &mode,
                &test_name,
                Duration::from_secs(task_timeout),
            )
            .await?;
            session.record(metrics)?;

            let paths = session.finalize(&prefix)?;
            println!("HTML report: {}", paths.html.display());
            println!("JSON report: {}", paths.json.display());
        }
        Command::History {
            test_name,
            days,
            db,
        } => {
            let store = HistoryStore::open(&db)?;
            let rows = store.query(test_name.as_deref(), days)?;
            if rows.is_empty() {
                println!("No runs recorded in the last {days} days.");
                return Ok(());
            }
            println!(
                "{:<20} {:<28} {:>9} {:>9} {:>11} {:>13}",
                "test", "timestamp", "requests", "errors", "avg (s)", "p95 (s)"
            );
            for row in rows {
                println!(
                    "{:<20} {:<28} {:>9} {:>9} {:>11.3} {:>13.3}",
                    row.test_name,
                    row.timestamp.to_rfc3339(),
                    row.total_requests,
                    row.error_count,
                    row.summary.avg_response_time,
                    row.summary.percentile_95_response_time,
                );
            }
        }
    }
    Ok(())
}

/// Drive `requests` submissions of one document and collect the scenario's
/// metrics, including the per-task timing breakdown from status monitoring.
async fn run_scenario(
    client: &OcrClient,
    file: &Path,
    requests: u32,
    mode: &str,
    test_name: &str,
    task_timeout: Duration,
) -> Result<TestMetrics, OcrmeterError> {
    let bytes = tokio::fs::read(file).await?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();

    let monitor = TaskMonitor::new(client);
    let scenario_start = Instant::now();

    let mut response_times = Vec::new();
    let mut creation_times = Vec::new();
    let mut processing_times = Vec::new();
    let mut queue_wait_times = Vec::new();
    let mut errors = Vec::new();
    let mut success_count = 0u64;
    let mut error_count = 0u64;

    for i in 0..requests {
        tracing::info!("Submission {}/{requests}", i + 1);
        match client
            .submit_document(&file_name, bytes.clone(), mode)
            .await
        {
            Ok((submission, creation_time)) => {
                response_times.push(creation_time);
                creation_times.push(creation_time);

                let outcome = monitor
                    .wait_for_completion(&submission.task_id, task_timeout)
                    .await;
                if outcome.is_success() {
                    success_count += 1;
                    if let Some(wait) = outcome.queue_wait_time {
                        queue_wait_times.push(wait);
                    }
                    if let Some(processing) = outcome.processing_time {
                        processing_times.push(processing);
                    }
                } else {
                    error_count += 1;
                    if let Some(err) = outcome.error {
                        errors.push(format!("task {}: {err}", submission.task_id));
                    }
                }
            }
            Err(err) => {
                error_count += 1;
                errors.push(format!("submission {}: {err}", i + 1));
            }
        }
    }

    let duration = scenario_start.elapsed().as_secs_f64();
    Ok(
        TestMetrics::new(test_name, response_times, success_count, error_count, duration)
            .with_errors(errors)
            .with_metadata(serde_json::json!({
                "file": file_name,
                "file_bytes": bytes.len(),
                "mode": mode,
                "requests": requests,
            }))
            .with_timing_breakdown(creation_times, processing_times, queue_wait_times),
    )
}
