use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use workshop_dl::client::HttpContentClient;
use workshop_dl::config::{ConfigLoader, ResolvedConfig};
use workshop_dl::download::{DownloadPipeline, PipelineSettings};
use workshop_dl::error::{ErrorCategory, WorkshopError};
use workshop_dl::output::{DownloadReport, JsonOutput};
use workshop_dl::progress::DownloadProgress;
use workshop_dl::search::SearchOrchestrator;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "workshop-dl")]
#[command(about = "Search and download community workshop maps")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search the catalog and print one page of results")]
    Search(SearchArgs),
    #[command(about = "Search, then download one result into the workshop folder")]
    Download(DownloadArgs),
}

#[derive(Args)]
struct SearchArgs {
    keywords: String,

    #[arg(long, default_value_t = 0)]
    page: u32,
}

#[derive(Args)]
struct DownloadArgs {
    keywords: String,

    #[arg(long, default_value_t = 0)]
    page: u32,

    #[arg(long)]
    index: usize,

    #[arg(long)]
    release: Option<usize>,

    #[arg(long)]
    dest: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<WorkshopError>() {
                return ExitCode::from(map_exit_code(err.category()));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(category: ErrorCategory) -> u8 {
    match category {
        ErrorCategory::Usage => 2,
        ErrorCategory::Transport | ErrorCategory::Parse => 3,
        ErrorCategory::Filesystem => 4,
        ErrorCategory::Extraction => 5,
        ErrorCategory::Busy => 6,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let client = Arc::new(HttpContentClient::new(config.request_timeout)?);

    match cli.command {
        Commands::Search(args) => run_search(client, &config, args),
        Commands::Download(args) => run_download(client, &config, args),
    }
}

fn search_and_wait(
    orchestrator: &SearchOrchestrator<Arc<HttpContentClient>>,
    keywords: &str,
    page: u32,
) {
    let generation = orchestrator.search(keywords, page);
    while orchestrator.is_searching() {
        thread::sleep(POLL_INTERVAL);
    }
    info!(generation, results = orchestrator.results().len(), "search settled");
}

fn run_search(
    client: Arc<HttpContentClient>,
    config: &ResolvedConfig,
    args: SearchArgs,
) -> miette::Result<ExitCode> {
    let orchestrator = SearchOrchestrator::from_config(client, config, None)?;
    search_and_wait(&orchestrator, &args.keywords, args.page);

    let status = orchestrator.status();
    JsonOutput::print_search(&status, &orchestrator.snapshot()).into_diagnostic()?;
    if status.error.is_some() {
        return Ok(ExitCode::from(map_exit_code(ErrorCategory::Transport)));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_download(
    client: Arc<HttpContentClient>,
    config: &ResolvedConfig,
    args: DownloadArgs,
) -> miette::Result<ExitCode> {
    let orchestrator = SearchOrchestrator::from_config(client.clone(), config, None)?;
    search_and_wait(&orchestrator, &args.keywords, args.page);
    if let Some(message) = orchestrator.search_error() {
        return Err(WorkshopError::Http(message).into());
    }

    let result = orchestrator
        .results()
        .get(args.index)
        .ok_or(WorkshopError::InvalidIndex(args.index))?;
    let destination = args.dest.unwrap_or_else(|| config.workshop_dir.clone());

    let pipeline = DownloadPipeline::new(client, PipelineSettings::from_config(config));
    let handle = pipeline.download(
        &result,
        args.release,
        &destination,
        Some(Box::new(|progress: &DownloadProgress| {
            let _ = JsonOutput::print_progress_line(progress);
        })),
    )?;
    let outcome = handle.join();

    let progress = pipeline.progress();
    let folder_error = pipeline.folder_error();
    let report = DownloadReport {
        progress: &progress,
        map: outcome.as_ref().ok(),
        folder_error: folder_error.as_deref(),
    };
    JsonOutput::print_download(&report).into_diagnostic()?;

    outcome?;
    Ok(ExitCode::SUCCESS)
}
