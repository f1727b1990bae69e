use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cellmaps_downloader::config::{Config, ConfigLoader};
use cellmaps_downloader::download::HttpFetcher;
use cellmaps_downloader::error::DownloaderError;
use cellmaps_downloader::genequery::MyGeneHttpClient;
use cellmaps_downloader::output::{JsonOutput, TracingSink};
use cellmaps_downloader::runner::Runner;

#[derive(Parser)]
#[command(name = "cellmaps-downloader")]
#[command(about = "Downloads immunofluorescence images and builds gene node attribute tables")]
#[command(version, author)]
struct Cli {
    #[arg(help = "Output directory")]
    outdir: Option<Utf8PathBuf>,

    #[arg(long, help = "JSON file with default values for the options below")]
    config: Option<String>,

    #[arg(long, help = "Sample table (CSV)")]
    csv: Option<Utf8PathBuf>,

    #[arg(long, help = "Unique antibody table (CSV); omit to keep every sample")]
    unique: Option<Utf8PathBuf>,

    #[arg(long, help = "Interaction edge list (TSV)")]
    apms_edgelist: Option<Utf8PathBuf>,

    #[arg(long, help = "Bait list (TSV)")]
    apms_baitlist: Option<Utf8PathBuf>,

    #[arg(long)]
    image_url: Option<String>,

    #[arg(long, help = "Concurrent image downloads")]
    poolsize: Option<usize>,

    #[arg(long)]
    imgsuffix: Option<String>,

    #[arg(long, help = "Keep images that already exist with a non-zero size")]
    skip_existing: bool,

    #[arg(long, help = "Do not write task start/finish markers")]
    skip_logging: bool,

    #[arg(long)]
    max_retries: Option<usize>,

    #[arg(long)]
    gene_service_url: Option<String>,

    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity (-v error ... -vvvvv trace); RUST_LOG takes precedence"
    )]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> Config {
        Config {
            csv: self.csv.clone(),
            unique: self.unique.clone(),
            apms_edgelist: self.apms_edgelist.clone(),
            apms_baitlist: self.apms_baitlist.clone(),
            image_url: self.image_url.clone(),
            poolsize: self.poolsize,
            imgsuffix: self.imgsuffix.clone(),
            skip_existing: self.skip_existing.then_some(true),
            skip_logging: self.skip_logging.then_some(true),
            max_retries: self.max_retries,
            gene_service_url: self.gene_service_url.clone(),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DownloaderError>() {
            return ExitCode::from(error.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "off",
        1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level_for(cli.verbose))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let file_config = ConfigLoader::resolve(cli.config.as_deref())?;
    let config = ConfigLoader::resolve_config(cli.outdir.clone(), file_config.merge(cli.overrides()))?;

    let genes = MyGeneHttpClient::new(&config.gene_service_url)?;
    let fetcher = HttpFetcher::new()?;
    let runner = Runner::new(config, genes, fetcher);
    let summary = runner.run(&TracingSink)?;
    JsonOutput::print_summary(&summary).into_diagnostic()?;
    Ok(())
}
