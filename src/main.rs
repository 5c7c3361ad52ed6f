use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};

use llm_batch_tracker::{
    config::{AppConfig, ConfigError},
    logging,
    models::{
        job::{JobExtra, JobRecord, ProviderKind},
        report::JobReport,
    },
    providers::{BatchProvider, ProviderClient, ProviderError},
    services::{
        reconciler::{ReconcileError, ReconcileOptions, Reconciler},
        report_log::{self, ReportLogError},
        state_file::{self, StateFileError},
    },
};

#[derive(Parser, Debug)]
#[command(version, about = "Track and reconcile LLM vendor batch jobs")]
struct Cli {
    /// Vendor API to talk to.
    #[arg(long)]
    provider: ProviderKind,

    /// Action(s) to perform, in order.
    #[arg(long = "action", value_enum, required = true)]
    actions: Vec<Action>,

    /// Job id for single-job actions; repeat for track_jobs.
    #[arg(long = "job-id")]
    job_ids: Vec<String>,

    /// State file to reconcile.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Window for check_recent_jobs.
    #[arg(long, default_value_t = 36)]
    hours_ago: i64,

    /// Terminal-outcome report; defaults to `{provider}_final_reports.jsonl`
    /// next to the state file.
    #[arg(long)]
    report_file: Option<PathBuf>,

    /// Directory for new state files and downloaded results.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Cancel jobs still running after the vendor processing window.
    #[arg(long)]
    cancel_overdue: bool,

    #[arg(long)]
    enable_download_results: bool,

    #[arg(long)]
    debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
enum Action {
    /// Start tracking existing vendor jobs in a new state file.
    TrackJobs,
    CheckJobsFromFile,
    CheckSingleJob,
    CheckRecentJobs,
    CancelJob,
    DownloadResults,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    StateFile(#[from] StateFileError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Report(#[from] ReportLogError),

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.debug);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Action failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    let config = AppConfig::from_env()?;
    let provider = config.provider_client(cli.provider)?;

    for action in &cli.actions {
        tracing::info!(provider = %cli.provider, action = ?action, "Running action");
        match action {
            Action::TrackJobs => track_jobs(cli, &provider).await?,
            Action::CheckJobsFromFile => check_jobs_from_file(cli, &provider).await?,
            Action::CheckSingleJob => check_single_job(cli, &provider).await?,
            Action::CheckRecentJobs => check_recent_jobs(cli, &provider).await?,
            Action::CancelJob => {
                for job_id in required_job_ids(cli, "cancel_job")? {
                    provider.cancel_job(job_id).await?;
                }
            }
            Action::DownloadResults => download_results(cli, &provider).await?,
        }
    }
    Ok(())
}

fn required_job_ids<'a>(cli: &'a Cli, action: &str) -> Result<&'a [String], CliError> {
    if cli.job_ids.is_empty() {
        return Err(CliError::Usage(format!(
            "The --job-id flag is required for the '{action}' action"
        )));
    }
    Ok(&cli.job_ids)
}

fn report_path(cli: &Cli, state_dir: &Path) -> PathBuf {
    cli.report_file
        .clone()
        .unwrap_or_else(|| report_log::default_path(state_dir, cli.provider))
}

fn print_report(report: &JobReport) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}

/// Write the initial state file for jobs that already exist at the vendor.
async fn track_jobs(cli: &Cli, provider: &ProviderClient) -> Result<(), CliError> {
    let job_ids = required_job_ids(cli, "track_jobs")?;
    let now = Utc::now();

    let mut tracked = Vec::new();
    let mut finished = Vec::new();
    for job_id in job_ids {
        let snapshot = provider.get_job_status(job_id, &JobExtra::new()).await?;
        let record = JobRecord::from_snapshot(cli.provider, &snapshot, now);
        tracing::info!(
            job_id = %record.job_id(),
            status = %record.unified_status(),
            "Tracking job"
        );
        if record.is_terminal() {
            finished.push(JobReport::from_observation(&record, &snapshot));
        } else {
            tracked.push(record);
        }
    }

    report_log::append(&report_path(cli, &cli.output_dir), &finished)?;
    let path = cli
        .output_dir
        .join(state_file::file_name(cli.provider, now));
    state_file::write(&path, &tracked)?;

    for report in &finished {
        print_report(report)?;
    }
    println!("{}", path.display());
    Ok(())
}

async fn check_jobs_from_file(cli: &Cli, provider: &ProviderClient) -> Result<(), CliError> {
    let state_path = cli.state_file.as_deref().ok_or_else(|| {
        CliError::Usage(
            "The --state-file flag is required for the 'check_jobs_from_file' action".to_string(),
        )
    })?;
    let state_dir = state_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let options = ReconcileOptions {
        report_path: Some(report_path(cli, &state_dir)),
        cancel_overdue: cli.cancel_overdue,
    };
    let outcome = Reconciler::new(provider, options)
        .reconcile(state_path)
        .await?;

    for report in &outcome.finished {
        print_report(report)?;
    }
    println!("{}", outcome.state_file.display());
    Ok(())
}

async fn check_single_job(cli: &Cli, provider: &ProviderClient) -> Result<(), CliError> {
    let now = Utc::now();
    for job_id in required_job_ids(cli, "check_single_job")? {
        let snapshot = provider.get_job_status(job_id, &JobExtra::new()).await?;
        let record = JobRecord::from_snapshot(cli.provider, &snapshot, now);
        print_report(&JobReport::from_observation(&record, &snapshot))?;
    }
    Ok(())
}

/// Print a report for every job created in the window, and append them to
/// `--report-file` when one is given.
async fn check_recent_jobs<P: BatchProvider>(cli: &Cli, provider: &P) -> Result<(), CliError> {
    let now = Utc::now();
    let since = now - Duration::hours(cli.hours_ago);
    let jobs = provider.list_jobs(since).await?;
    tracing::info!(count = jobs.len(), since = %since, "Found recent jobs");

    let reports: Vec<JobReport> = jobs
        .iter()
        .map(|snapshot| {
            let record = JobRecord::from_snapshot(cli.provider, snapshot, now);
            JobReport::from_observation(&record, snapshot)
        })
        .collect();

    for report in &reports {
        print_report(report)?;
    }
    if let Some(path) = &cli.report_file {
        report_log::append(path, &reports)?;
    }
    Ok(())
}

async fn download_results(cli: &Cli, provider: &ProviderClient) -> Result<(), CliError> {
    if !cli.enable_download_results {
        return Err(CliError::Usage(
            "The 'download_results' action is not enabled; rerun with --enable-download-results"
                .to_string(),
        ));
    }
    for job_id in required_job_ids(cli, "download_results")? {
        let dest = cli.output_dir.join(format!(
            "{}_results_{}.jsonl",
            cli.provider,
            job_id.replace('/', "_")
        ));
        let bytes = provider.download_results(job_id, &dest).await?;
        tracing::info!(job_id = %job_id, path = %dest.display(), bytes, "Downloaded results");
    }
    Ok(())
}
