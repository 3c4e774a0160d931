// crates/cli/src/main.rs
//! codetrace binary.
//!
//! Submits AI-detection repository scans, reattaches to a scan that outlived
//! a previous invocation, renders progress, and cancels cleanly on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use codetrace_client::{
    JobBackend, JobId, JobObserver, JobOutcome, JobSnapshot, JobStatus, PollConfig,
    RemoteJobClient, ScanReport, ScanRequest,
};
use codetrace_http::{HttpBackendConfig, HttpScanBackend};

#[derive(Parser)]
#[command(name = "codetrace", version, about = "Drive AI-detection repository scans")]
struct Cli {
    /// Base URL of the scan service.
    #[arg(long, env = "CODETRACE_API_URL", default_value = "http://127.0.0.1:8791")]
    api_url: String,

    /// Bearer token for the scan service.
    #[arg(long, env = "CODETRACE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Delay between status polls, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a repository (or reattach to the scan already running).
    Scan {
        /// Repository in `owner/name` form.
        repository: String,

        /// Branch, tag, or commit to scan. Service default branch when omitted.
        #[arg(long)]
        git_ref: Option<String>,
    },
    /// Show the scan currently running, if any.
    Status,
    /// Cancel the scan currently running, if any.
    Cancel,
    /// Print the report for a completed scan.
    Result {
        /// Scan id as printed by `scan`.
        id: String,
    },
}

fn init_tracing() -> Result<()> {
    // Quiet by default; progress UX uses the terminal directly.
    let level = std::env::var("CODETRACE_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut config = HttpBackendConfig::new(&cli.api_url);
    if let Some(token) = &cli.api_token {
        config = config.with_api_token(token);
    }
    let backend = Arc::new(HttpScanBackend::new(config)?);

    match cli.command {
        Command::Scan {
            repository,
            git_ref,
        } => run_scan(backend, repository, git_ref, cli.poll_interval_ms).await,
        Command::Status => show_status(backend).await,
        Command::Cancel => cancel_active(backend).await,
        Command::Result { id } => show_result(backend, id).await,
    }
}

/// Renders scan progress as a terminal bar.
struct ProgressRenderer {
    bar: ProgressBar,
}

impl ProgressRenderer {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos:>3}% {msg}")
                .expect("valid progress template"),
        );
        Self { bar }
    }
}

impl JobObserver for ProgressRenderer {
    fn on_progress(&self, snapshot: &JobSnapshot) {
        self.bar.set_position(u64::from(snapshot.progress_percent));
        let step = snapshot.step_description.as_deref().unwrap_or("working");
        self.bar.set_message(format!(
            "{} findings \u{2014} {step}",
            snapshot.findings_so_far
        ));
    }

    fn on_terminal(&self, _outcome: &JobOutcome) {
        self.bar.finish_and_clear();
    }
}

async fn run_scan(
    backend: Arc<HttpScanBackend>,
    repository: String,
    git_ref: Option<String>,
    poll_interval_ms: u64,
) -> Result<()> {
    let renderer = Arc::new(ProgressRenderer::new());
    let config = PollConfig {
        interval: Duration::from_millis(poll_interval_ms),
        max_consecutive_failures: Some(30),
    };
    let client = RemoteJobClient::new(backend)
        .with_observer(renderer)
        .with_poll_config(config);

    // Reattach before submitting: the service runs one scan per principal,
    // and one may have outlived a previous invocation of this tool. Display
    // state comes from the service's job record, not from local memory.
    let handle = match client.resume_active().await? {
        Some((active, handle)) => {
            eprintln!(
                "  \u{21bb} Reattaching to running scan of {} ({})",
                active.slug(),
                handle.id()
            );
            handle
        }
        None => {
            let mut request = parse_repository(&repository)?;
            if let Some(git_ref) = git_ref {
                request = request.with_git_ref(git_ref);
            }
            let handle = client.submit(&request).await?;
            eprintln!(
                "  \u{2713} Scan {} started for {}",
                handle.id(),
                request.slug()
            );
            handle
        }
    };

    let wait = handle.wait();
    tokio::pin!(wait);
    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            // Benign if the scan finished in the meantime.
            let _ = client.cancel();
            wait.await
        }
    };

    match outcome {
        JobOutcome::Completed => {
            let report = client.fetch_result().await?;
            print_report(&report);
            Ok(())
        }
        JobOutcome::Cancelled => {
            eprintln!("  Scan cancelled.");
            Ok(())
        }
        JobOutcome::Failed { message } => bail!("scan failed: {message}"),
    }
}

async fn show_status(backend: Arc<HttpScanBackend>) -> Result<()> {
    match backend.get_active_job().await? {
        Some(active) => {
            let snapshot = backend.get_status(&active.id).await?;
            println!(
                "{} ({}) \u{2014} {} at {}%",
                active.slug(),
                active.id,
                status_label(snapshot.status),
                snapshot.progress_percent
            );
            if let Some(step) = snapshot.step_description {
                println!("  current: {step}");
            }
            if let Some(started) = active.started_at {
                println!("  started: {started}");
            }
            Ok(())
        }
        None => {
            println!("No scan is currently running.");
            Ok(())
        }
    }
}

async fn cancel_active(backend: Arc<HttpScanBackend>) -> Result<()> {
    match backend.get_active_job().await? {
        Some(active) => {
            backend.cancel(&active.id).await?;
            eprintln!(
                "  \u{2713} Cancellation requested for scan {} ({})",
                active.id,
                active.slug()
            );
            Ok(())
        }
        None => {
            println!("No scan is currently running.");
            Ok(())
        }
    }
}

async fn show_result(backend: Arc<HttpScanBackend>, id: String) -> Result<()> {
    let report = backend
        .get_result(&JobId::new(id))
        .await
        .context("could not fetch the scan report")?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ScanReport) {
    println!(
        "\n  {} findings across {} files scanned",
        report.summary.total_findings, report.summary.files_scanned
    );
    for finding in &report.findings {
        let detector = finding.detector.as_deref().unwrap_or("unknown");
        println!(
            "  {:>5.1}%  {}:{}  [{}]",
            finding.confidence * 100.0,
            finding.path,
            finding.line,
            detector
        );
    }
    if report.findings.is_empty() && report.summary.total_findings == 0 {
        println!("  \u{2713} No AI-generated code detected.");
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Cloning => "cloning",
        JobStatus::Scanning => "scanning",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

/// Parse `owner/name` into a scan request.
fn parse_repository(input: &str) -> Result<ScanRequest> {
    match input.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(ScanRequest::new(owner, name))
        }
        _ => bail!("expected repository in owner/name form, got `{input}`"),
    }
}
