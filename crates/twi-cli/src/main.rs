/// TWI command-line tool: picks the best-available DEM for an area of
/// interest and derives its Topographic Wetness Index.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use twi_core::selector::assess_coverage;
use twi_core::{
    run_pipeline, select_dem, DataSource, FileSource, PlanarEngine, RunContext, TracingSink, TwiConfig, Workspace,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "twi", version, about = "Topographic Wetness Index from the best-available DEM")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select the DEM, compute the TWI and persist it in the workspace
    Run(RunArgs),
    /// Run only the DEM selection and print the decision as JSON
    Select(SelectArgs),
    /// Print how much of an AOI a footprint covers
    Coverage(CoverageArgs),
}

/// Dataset locations: a config file, individual overrides, or both.
#[derive(Args, Debug)]
struct DatasetArgs {
    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Area of interest (GeoJSON)
    #[arg(long)]
    aoi: Option<PathBuf>,

    /// High-resolution (LIDAR) DEM (.json, .tif)
    #[arg(long)]
    high_res_dem: Option<PathBuf>,

    /// Baseline (TRIM) DEM (.json, .tif)
    #[arg(long)]
    baseline_dem: Option<PathBuf>,

    /// High-resolution footprint (GeoJSON)
    #[arg(long)]
    footprint: Option<PathBuf>,

    /// Output workspace directory (created if absent)
    #[arg(short, long)]
    workspace: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    datasets: DatasetArgs,

    /// Fail instead of replacing an existing TWI output
    #[arg(long)]
    no_overwrite: bool,
}

#[derive(Args, Debug)]
struct SelectArgs {
    #[command(flatten)]
    datasets: DatasetArgs,

    /// Also write the clipped DEM to this JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CoverageArgs {
    /// Area of interest (GeoJSON)
    #[arg(long)]
    aoi: PathBuf,

    /// High-resolution footprint (GeoJSON)
    #[arg(long)]
    footprint: PathBuf,
}

// ── JSON output ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SelectionOut {
    source: twi_core::DemSource,
    coverage: twi_core::Coverage,
    coverage_percent: u8,
    width: usize,
    height: usize,
    cell_size_x: f64,
    cell_size_y: f64,
    valid_cells: usize,
}

#[derive(Serialize)]
struct CoverageOut {
    aoi_area: f64,
    covered_area: f64,
    coverage_percent: u8,
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!("unknown log level {other:?}"),
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Run(args) => run(args),
        Command::Select(args) => select(args),
        Command::Coverage(args) => coverage(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = resolve_config(&args.datasets)?;
    if args.no_overwrite {
        config.overwrite = false;
    }

    let report = run_pipeline(&config, &TracingSink).context("TWI run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn select(args: SelectArgs) -> Result<()> {
    let config = resolve_config(&args.datasets)?;
    let workspace = Workspace::open(&config.workspace)
        .with_context(|| format!("opening workspace {}", config.workspace.display()))?;
    let ctx = RunContext::new(&config, &workspace, &TracingSink);

    let aoi = FileSource
        .read_vector(&config.aoi)
        .with_context(|| format!("reading AOI {}", config.aoi.display()))?;
    let selected = select_dem(&ctx, &aoi).context("DEM selection failed")?;

    if let Some(path) = &args.output {
        let json = serde_json::to_string(&selected.dem)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    let out = SelectionOut {
        source: selected.source,
        coverage: selected.coverage,
        coverage_percent: selected.coverage.percent(),
        width: selected.dem.width(),
        height: selected.dem.height(),
        cell_size_x: selected.dem.grid.cell_size_x,
        cell_size_y: selected.dem.grid.cell_size_y,
        valid_cells: selected.dem.valid_count(),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn coverage(args: CoverageArgs) -> Result<()> {
    let aoi = FileSource
        .read_vector(&args.aoi)
        .with_context(|| format!("reading AOI {}", args.aoi.display()))?;
    let footprint = FileSource
        .read_vector(&args.footprint)
        .with_context(|| format!("reading footprint {}", args.footprint.display()))?;
    let assessment = assess_coverage(&PlanarEngine, &aoi, &footprint)?;

    let out = CoverageOut {
        aoi_area: assessment.aoi_area,
        covered_area: assessment.covered_area,
        coverage_percent: assessment.percent.value(),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ── Config resolution ────────────────────────────────────────────────────────

/// Config file (if any) with command-line overrides applied on top.
fn resolve_config(args: &DatasetArgs) -> Result<TwiConfig> {
    let mut config = match &args.config {
        Some(path) => {
            TwiConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => {
            let required = |value: &Option<PathBuf>, flag: &str| {
                value
                    .clone()
                    .with_context(|| format!("--{flag} is required without --config"))
            };
            TwiConfig::new(
                required(&args.aoi, "aoi")?,
                required(&args.high_res_dem, "high-res-dem")?,
                required(&args.baseline_dem, "baseline-dem")?,
                required(&args.footprint, "footprint")?,
                required(&args.workspace, "workspace")?,
            )
        }
    };

    if let Some(p) = &args.aoi {
        config.aoi = p.clone();
    }
    if let Some(p) = &args.high_res_dem {
        config.high_res_dem = p.clone();
    }
    if let Some(p) = &args.baseline_dem {
        config.baseline_dem = p.clone();
    }
    if let Some(p) = &args.footprint {
        config.footprint = p.clone();
    }
    if let Some(p) = &args.workspace {
        config.workspace = p.clone();
    }
    config.validate()?;
    Ok(config)
}
