use std::io::IsTerminal;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use galaxy_pipeline::app::{
    App, DownloadOptions, ProgressEvent, ProgressSink, StageResult, UploadOptions, UploadSource,
};
use galaxy_pipeline::config::{
    ConfigLoader, Credentials, ResolvedConfig, load_database_selection, save_database_selection,
};
use galaxy_pipeline::domain::{DownloadTarget, KrakenDatabase, Stage, parse_database_codes};
use galaxy_pipeline::error::PipelineError;
use galaxy_pipeline::galaxy::GalaxyHttpClient;
use galaxy_pipeline::log::RunLog;
use galaxy_pipeline::output::{JsonOutput, OutputMode};
use galaxy_pipeline::tui;

#[derive(Parser)]
#[command(name = "galaxy-pipeline")]
#[command(about = "Run the metagenome assembly and taxonomy pipeline on a Galaxy server")]
#[command(version, author)]
struct Cli {
    /// Print a JSON report on stdout instead of echoing the log, and never prompt
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Path to a galaxy-pipeline.json config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Seconds between status checks (overrides the config for this stage)
    #[arg(long, global = true)]
    interval: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Upload trimmed .fastq.gz reads into the history")]
    Upload(UploadArgs),
    #[command(about = "Assemble paired reads with MEGAHIT")]
    Assemble,
    #[command(about = "Assess MEGAHIT assemblies with QUAST (metagenome mode)")]
    Qc,
    #[command(about = "Classify MEGAHIT assemblies with Kraken")]
    Classify(ClassifyArgs),
    #[command(about = "Translate Kraken classifications to taxonomy names")]
    Translate,
    #[command(about = "Download QUAST reports or translated taxonomy tables")]
    Download(DownloadArgs),
}

#[derive(Args, Clone)]
struct UploadArgs {
    /// Import files of the same name from the Galaxy FTP area instead of sending them
    #[arg(long)]
    ftp: bool,

    /// Skip the local gzip/FASTQ check
    #[arg(long)]
    no_verify: bool,
}

#[derive(Args, Clone)]
struct ClassifyArgs {
    /// Database codes: V = Viral, B = Bacteria, P = Plasmid, A = Archaea (e.g. "VB")
    #[arg(long)]
    databases: Option<String>,
}

#[derive(Args, Clone)]
struct DownloadArgs {
    target: DownloadTarget,

    /// Keep zip archives as downloaded instead of extracting them
    #[arg(long)]
    no_extract: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    let stage = stage_for(&cli.command);
    if let Some(secs) = cli.interval {
        config.set_poll_interval(stage, Duration::from_secs(secs));
    }

    let echo = matches!(output_mode, OutputMode::Interactive);
    let log = RunLog::open(config.log_path(stage).as_std_path(), echo).into_diagnostic()?;

    match run_stage(cli.command, config, output_mode, &log) {
        Ok(()) => Ok(()),
        Err(err) => {
            log.event(ProgressEvent::error(format!("ERROR: {err}")));
            Err(miette::Report::new(err))
        }
    }
}

fn stage_for(command: &Commands) -> Stage {
    match command {
        Commands::Upload(_) => Stage::Upload,
        Commands::Assemble => Stage::Assembly,
        Commands::Qc => Stage::AssemblyQc,
        Commands::Classify(_) => Stage::Classification,
        Commands::Translate => Stage::Translation,
        Commands::Download(args) => Stage::from(args.target),
    }
}

fn run_stage(
    command: Commands,
    config: ResolvedConfig,
    output_mode: OutputMode,
    log: &RunLog,
) -> Result<(), PipelineError> {
    let credentials = Credentials::load(&config.paths)?;
    let client = GalaxyHttpClient::new(&config.galaxy_url, &credentials.api_key)?;
    let app = App::new(client, config);
    let history = credentials.history_name.as_str();

    let result = match command {
        Commands::Upload(args) => {
            let options = UploadOptions {
                source: if args.ftp {
                    UploadSource::Ftp
                } else {
                    UploadSource::Local
                },
                verify: !args.no_verify,
            };
            app.upload(history, options, log)?
        }
        Commands::Assemble => app.assemble(history, log)?,
        Commands::Qc => app.assess_assemblies(history, log)?,
        Commands::Classify(args) => {
            let databases = choose_databases(&args, app.config(), output_mode)?;
            save_database_selection(app.config().paths.databases_file.as_std_path(), &databases)?;
            app.classify(history, &databases, log)?
        }
        Commands::Translate => app.translate(history, log)?,
        Commands::Download(args) => {
            let options = DownloadOptions {
                target: args.target,
                extract_archives: !args.no_extract,
            };
            app.download(history, options, log)?
        }
    };

    report(&result, output_mode)?;
    result.ensure_success().map(|_| ())
}

fn choose_databases(
    args: &ClassifyArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> Result<Vec<KrakenDatabase>, PipelineError> {
    if let Some(codes) = args.databases.as_deref() {
        return parse_database_codes(codes);
    }

    let previous =
        load_database_selection(config.paths.databases_file.as_std_path())?.unwrap_or_default();
    let interactive = matches!(output_mode, OutputMode::Interactive)
        && std::io::stdin().is_terminal()
        && std::io::stdout().is_terminal();
    if interactive {
        return match tui::select_databases(&previous) {
            Ok(Some(selection)) => Ok(selection),
            Ok(None) => Err(PipelineError::NoDatabasesSelected),
            Err(err) => Err(PipelineError::Filesystem(format!("terminal error: {err}"))),
        };
    }

    if previous.is_empty() {
        return Err(PipelineError::NoDatabasesSelected);
    }
    Ok(previous)
}

fn report(result: &StageResult, output_mode: OutputMode) -> Result<(), PipelineError> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_stage(result)
            .map_err(|err| PipelineError::Filesystem(err.to_string())),
        OutputMode::Interactive => Ok(()),
    }
}
