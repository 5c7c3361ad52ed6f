use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use llm_batch_tracker::{
    config::AppConfig,
    logging,
    models::job::ProviderKind,
    services::{poller::Poller, reconciler::ReconcileOptions, report_log},
};

/// Reconcile a provider's newest state file until it is empty.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long)]
    provider: ProviderKind,

    /// Directory holding the provider's state files.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Seconds to wait between passes.
    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    #[arg(long)]
    report_file: Option<PathBuf>,

    #[arg(long)]
    cancel_overdue: bool,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.debug);

    let provider = match AppConfig::from_env().and_then(|c| c.provider_client(args.provider)) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "Failed to configure provider");
            return ExitCode::FAILURE;
        }
    };

    let options = ReconcileOptions {
        report_path: Some(
            args.report_file
                .clone()
                .unwrap_or_else(|| report_log::default_path(&args.dir, args.provider)),
        ),
        cancel_overdue: args.cancel_overdue,
    };
    let poller = Poller::new(&provider, args.dir.clone(), options);

    tracing::info!(
        provider = %args.provider,
        dir = %poller.dir().display(),
        interval_secs = args.interval_secs,
        "Starting polling loop"
    );

    match poller.run(Duration::from_secs(args.interval_secs)).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Reconciliation cannot continue");
            ExitCode::FAILURE
        }
    }
}
