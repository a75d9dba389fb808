use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use spectrator::app::{App, RetrievalMode};
use spectrator::catalog::{CatalogLookup, FileCatalog};
use spectrator::config::{ConfigLoader, Settings};
use spectrator::domain::SourceName;
use spectrator::error::SpectraError;
use spectrator::fits;
use spectrator::output::{self, ConsoleProgress, JsonOutput, OutputMode};
use spectrator::resolver::IdentityResolver;
use spectrator::simbad::SimbadHttpClient;
use spectrator::sources::{
    GaiaDataLinkClient, GaiaRvsSource, GalahHttpClient, GalahSource, LamostHttpClient,
    LamostSource, RaveSource, RaveTapClient, SpectrumSource,
};
use spectrator::store::write_bytes_atomic;

#[derive(Parser)]
#[command(name = "spectrator")]
#[command(about = "Resolve a star and collect its spectra from Gaia RVS, LAMOST, GALAH and RAVE")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(flatten)]
    overrides: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// JSON config file (default: ./spectrator.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    output_dir: Option<Utf8PathBuf>,

    /// RAVE TAP access token (also read from RAVE_TOKEN)
    #[arg(long, global = true)]
    rave_token: Option<String>,

    /// Query the archives concurrently
    #[arg(long, global = true)]
    parallel: bool,

    /// Restrict retrieval to these sources (repeatable)
    #[arg(long = "source", global = true, value_enum)]
    sources: Vec<SourceName>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve an object and download its spectra as CSV")]
    Fetch { identifier: String },
    #[command(about = "Resolve an object to coordinates and survey ids")]
    Resolve { identifier: String },
    #[command(about = "Convert a local FITS spectrum to CSV")]
    Decode {
        path: Utf8PathBuf,
        #[arg(long)]
        out: Option<Utf8PathBuf>,
    },
    #[command(about = "Look up a Gaia source id in a survey catalog")]
    Lookup {
        #[arg(value_enum)]
        survey: SourceName,
        id: String,
    },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SpectraError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SpectraError) -> u8 {
    match error {
        SpectraError::NotFound(_) => 2,
        SpectraError::ResolutionFailed(_) => 3,
        _ => 1,
    }
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
    let settings = load_settings(&cli.overrides)?;

    match cli.command {
        Commands::Fetch { identifier } => run_fetch(&identifier, &settings, output_mode),
        Commands::Resolve { identifier } => run_resolve(&identifier, &settings, output_mode),
        Commands::Decode { path, out } => run_decode(&path, out),
        Commands::Lookup { survey, id } => run_lookup(survey, &id, &settings),
    }
}

fn load_settings(args: &GlobalArgs) -> miette::Result<Settings> {
    let mut settings = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(dir) = &args.output_dir {
        settings.output_root = dir.clone();
    }
    if let Some(token) = &args.rave_token {
        settings.rave.token = Some(token.clone());
    }
    if args.parallel {
        settings.parallel = true;
    }
    if !args.sources.is_empty() {
        let mut sources = args.sources.clone();
        sources.sort();
        sources.dedup();
        settings.sources = sources;
    }
    Ok(settings)
}

fn build_app(settings: &Settings) -> miette::Result<App<SimbadHttpClient>> {
    let simbad = SimbadHttpClient::new(&settings.endpoints.simbad)?;
    let catalog = |path: &Option<Utf8PathBuf>| {
        path.as_ref()
            .map(|path| FileCatalog::new(path.clone(), settings.catalog_match))
    };

    let mut sources: Vec<Box<dyn SpectrumSource>> = Vec::new();
    for source in &settings.sources {
        match source {
            SourceName::GaiaRvs => {
                let client = GaiaDataLinkClient::new(&settings.endpoints.gaia)?;
                sources.push(Box::new(GaiaRvsSource::new(client)));
            }
            SourceName::Lamost => {
                let client = LamostHttpClient::new(&settings.endpoints.lamost)?;
                let lookup = catalog(&settings.lamost_catalog);
                sources.push(Box::new(LamostSource::new(client, lookup)));
            }
            SourceName::Galah => {
                let client = GalahHttpClient::new(&settings.endpoints.galah)?;
                let lookup = catalog(&settings.galah_catalog);
                sources.push(Box::new(GalahSource::new(client, lookup)));
            }
            SourceName::Rave => {
                let client = RaveTapClient::new(&settings.endpoints.rave, settings.rave.clone())?;
                sources.push(Box::new(RaveSource::new(
                    client,
                    settings.rave.search_radius_deg,
                )));
            }
        }
    }

    let mode = if settings.parallel {
        RetrievalMode::Parallel
    } else {
        RetrievalMode::Sequential
    };
    let app = App::new(settings.store(), IdentityResolver::new(simbad), sources)
        .with_mode(mode)
        .with_artifact_base_url(settings.artifact_base_url.clone());
    Ok(app)
}

fn run_fetch(
    identifier: &str,
    settings: &Settings,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = build_app(settings)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(identifier, &JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.fetch(identifier, &ConsoleProgress)?;
            output::print_fetch_summary(&result);
        }
    }
    Ok(())
}

fn run_resolve(
    identifier: &str,
    settings: &Settings,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = build_app(settings)?;
    let identity = match output_mode {
        OutputMode::NonInteractive => app.resolve(identifier, &JsonOutput)?,
        OutputMode::Interactive => app.resolve(identifier, &ConsoleProgress)?,
    };
    JsonOutput::print_identity(&identity).into_diagnostic()?;
    Ok(())
}

fn run_decode(path: &Utf8PathBuf, out: Option<Utf8PathBuf>) -> miette::Result<()> {
    let payload = fs::read(path.as_std_path())
        .map_err(|err| SpectraError::Filesystem(format!("read {path}: {err}")))?;
    let series = fits::decode(&payload).map_err(SpectraError::from)?;
    let csv = series.to_csv();
    match out {
        Some(out) => {
            write_bytes_atomic(&out, csv.as_bytes())?;
            eprintln!("wrote {} samples to {out}", series.len());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn run_lookup(survey: SourceName, id: &str, settings: &Settings) -> miette::Result<()> {
    let path = match survey {
        SourceName::Lamost => settings.lamost_catalog.as_ref(),
        SourceName::Galah => settings.galah_catalog.as_ref(),
        SourceName::GaiaRvs | SourceName::Rave => {
            return Err(SpectraError::UnknownSurvey(format!(
                "{} has no reference catalog",
                survey.label()
            ))
            .into());
        }
    };
    let Some(path) = path else {
        return Err(miette::miette!(
            "no catalog configured for {}",
            output::describe_source(survey)
        ));
    };
    let catalog = FileCatalog::new(path.clone(), settings.catalog_match);
    match catalog.lookup(id) {
        Some(record) => {
            println!("{}", record.key);
            Ok(())
        }
        None => Err(SpectraError::NotFound(format!("{id} in {}", catalog.path())).into()),
    }
}
