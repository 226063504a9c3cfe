//! DIAX CLI: align diabetes signal bundles onto a regular time grid.
//!
//! Commands:
//! - `align`: align one bundle; CSV to stdout, or to a `.csv`/`.parquet` file
//! - `batch`: align every `*.json` bundle in a directory, with a manifest
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use diax_core::{align, AlignConfig, Bundle, PolicyOverride};
use diax_runner::{export_csv, write_csv, write_parquet, BatchRunner, MANIFEST_FILE};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "diax",
    about = "DIAX: time-series alignment for diabetes data bundles"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by `align` and `batch`. Flags override the config file.
#[derive(clap::Args, Debug, Default)]
struct AlignArgs {
    /// TOML or JSON alignment config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Grid spacing in minutes.
    #[arg(long)]
    sampling_period: Option<f64>,

    /// Grid start (e.g. 2024-01-01T00:00:00). Defaults to the earliest sample.
    #[arg(long)]
    start: Option<String>,

    /// Grid end. Defaults to the latest sample.
    #[arg(long)]
    end: Option<String>,

    /// Signals to align, comma-separated, in output order.
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Aggregation: `mean`, or per signal `cgm=mean` (repeatable).
    #[arg(long = "resample")]
    resample: Vec<String>,

    /// Gap fill: `interpolate`, or per signal `bolus=fill0` (repeatable).
    #[arg(long = "missing")]
    missing: Vec<String>,

    /// Gap-fill tolerance in minutes (or `unbounded`), optionally per signal.
    #[arg(long = "tolerance")]
    tolerance: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Align a single bundle.
    Align {
        /// Bundle JSON file.
        bundle: PathBuf,

        #[command(flatten)]
        args: AlignArgs,

        /// Output file (.csv or .parquet). Defaults to CSV on stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Align signals in parallel.
        #[arg(long, default_value_t = false)]
        parallel: bool,
    },
    /// Align every bundle in a directory.
    Batch {
        /// Directory of bundle JSON files, one per subject.
        input_dir: PathBuf,

        #[command(flatten)]
        args: AlignArgs,

        /// Where tables and manifest.json are written.
        #[arg(long)]
        output_dir: PathBuf,

        /// Also write a Parquet file per subject.
        #[arg(long, default_value_t = false)]
        parquet: bool,

        /// Process subjects one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Align {
            bundle,
            args,
            output,
            parallel,
        } => run_align(&bundle, &args, output.as_deref(), parallel),
        Commands::Batch {
            input_dir,
            args,
            output_dir,
            parquet,
            sequential,
        } => run_batch(&input_dir, &args, &output_dir, parquet, sequential),
    }
}

fn run_align(bundle_path: &Path, args: &AlignArgs, output: Option<&Path>, parallel: bool) -> Result<()> {
    let mut config = build_config(args)?;
    config.parallel |= parallel;
    let options = config.to_options()?;

    let bundle = Bundle::from_path(bundle_path)?;
    let table = align(&bundle, &options)
        .with_context(|| format!("failed to align {}", bundle_path.display()))?;
    info!(
        rows = table.len(),
        columns = table.columns().len(),
        "bundle aligned"
    );

    match output {
        None => print!("{}", export_csv(&table)?),
        Some(path) if has_extension(path, "parquet") => write_parquet(&table, path)?,
        Some(path) if has_extension(path, "csv") => {
            write_csv(&table, path)?;
        }
        Some(path) => bail!(
            "unsupported output '{}': use a .csv or .parquet file",
            path.display()
        ),
    }
    Ok(())
}

fn run_batch(
    input_dir: &Path,
    args: &AlignArgs,
    output_dir: &Path,
    parquet: bool,
    sequential: bool,
) -> Result<()> {
    let config = build_config(args)?;
    let runner = BatchRunner::from_config(&config)?
        .with_parquet(parquet)
        .with_parallelism(!sequential);
    let manifest = runner.run_dir(input_dir, output_dir)?;

    println!(
        "Aligned {} of {} subjects. Manifest: {}",
        manifest.succeeded(),
        manifest.subjects.len(),
        output_dir.join(MANIFEST_FILE).display()
    );

    if manifest.failed() > 0 {
        for failure in manifest.failures() {
            eprintln!(
                "Error for {}: {}",
                failure.subject,
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Config file (if any) with command-line flags layered on top. A strategy
/// flag replaces that whole dimension of the file's config.
fn build_config(args: &AlignArgs) -> Result<AlignConfig> {
    let mut config = match &args.config {
        Some(path) => AlignConfig::from_file(path)?,
        None => AlignConfig::default(),
    };

    if let Some(period) = args.sampling_period {
        config.sampling_period = Some(period);
    }
    if let Some(start) = &args.start {
        config.start_time = Some(start.clone());
    }
    if let Some(end) = &args.end {
        config.end_time = Some(end.clone());
    }
    if let Some(columns) = &args.columns {
        config.columns = Some(columns.clone());
    }
    if let Some(rule) = parse_override("--resample", &args.resample)? {
        config.resample_strategy = Some(rule);
    }
    if let Some(rule) = parse_override("--missing", &args.missing)? {
        config.missing_strategy = Some(rule);
    }
    if let Some(rule) = parse_override("--tolerance", &args.tolerance)? {
        config.missing_tolerance = Some(rule);
    }
    Ok(config)
}

/// `["mean"]` applies to every signal; `["cgm=mean", "bolus=sum"]` is a
/// per-signal table.
fn parse_override<T>(flag: &str, values: &[String]) -> Result<Option<PolicyOverride<T>>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match values {
        [] => Ok(None),
        [single] if !single.contains('=') => Ok(Some(PolicyOverride::All(single.parse()?))),
        _ => {
            let mut entries = Vec::with_capacity(values.len());
            for value in values {
                let Some((name, token)) = value.split_once('=') else {
                    bail!("{flag}: expected NAME=VALUE when giving several values, got '{value}'");
                };
                entries.push((name.trim().to_string(), token.trim().parse()?));
            }
            Ok(Some(PolicyOverride::per_signal(entries)))
        }
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
