//! Command-line front end: fit light curves, show saved fit reports,
//! summarise a catalog and list the model table.
//!
//! Logging goes to stderr through `tracing-subscriber`; raise the level with
//! `-v` or set `RUST_LOG`.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use grb_lcfit::guess::FixedTimes;
use grb_lcfit::models::MODEL_TABLE;
use grb_lcfit::{
    load_catalog, read_light_curve, read_report, FitConfig, FixedGuesses, GuessCollector, Guesses, LightCurveFitter,
    Pick, PromptCollector,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "GRB X-ray afterglow light-curve fitting", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a light curve (GRB directory or QDP table)
    Fit(FitArgs),
    /// Print a saved fit report
    Show {
        /// Fit-report file
        #[arg(value_hint = ValueHint::FilePath)]
        report: PathBuf,
    },
    /// Summarise every GRB directory under the data directory
    Catalog {
        /// Data directory (defaults to `data_dir` from the config)
        #[arg(value_hint = ValueHint::DirPath)]
        dir: Option<PathBuf>,

        /// JSON configuration file
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
    },
    /// List the supported models
    Models,
}

#[derive(Parser, Debug)]
struct FitArgs {
    /// GRB directory or QDP light-curve table
    #[arg(value_hint = ValueHint::AnyPath)]
    lightcurve: PathBuf,

    /// Number of flares, placed automatically
    #[arg(long, conflicts_with = "flare_times")]
    flares: Option<usize>,

    /// Flare peak times in seconds (comma separated)
    #[arg(long, value_delimiter = ',')]
    flare_times: Vec<f64>,

    /// Break times in seconds, increasing (comma separated)
    #[arg(long, value_delimiter = ',')]
    breaks: Vec<f64>,

    /// Fit-report output path (defaults to the report inside a GRB directory)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Also write the result as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Ask for flare and break times on the terminal
    #[arg(short, long, action = ArgAction::SetTrue)]
    interactive: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Show { report } => handle_show(report),
        Command::Catalog { dir, config } => handle_catalog(dir, config),
        Command::Models => {
            handle_models();
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<FitConfig> {
    match path {
        Some(path) => FitConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(FitConfig::default()),
    }
}

fn handle_fit(args: FitArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;

    let lc = read_light_curve(&args.lightcurve)
        .with_context(|| format!("failed to read light curve {}", args.lightcurve.display()))?;
    info!("{}: {} samples", args.lightcurve.display(), lc.len());

    let mut collector: Box<dyn GuessCollector> = if args.interactive {
        Box::new(PromptCollector::new(io::stdin().lock(), io::stdout()))
    } else if let Some(count) = args.flares {
        let breaks = args.breaks.iter().map(|&t| Pick::on_curve(&lc, t)).collect();
        Box::new(FixedGuesses::new(Guesses::with_flare_count(count, breaks)))
    } else {
        Box::new(FixedTimes::new(args.flare_times.clone(), args.breaks.clone()))
    };

    let fitter = LightCurveFitter::from_config(&config);
    let fit = match fitter.fit(&lc, collector.as_mut()) {
        Ok(fit) => fit,
        Err(e) => {
            if let Some(partial) = e.partial_result() {
                warn!("best parameters before failure:\n{}", partial);
            }
            return Err(e).context("fit failed");
        }
    };
    println!("{}", fit);

    let output = args
        .output
        .clone()
        .or_else(|| args.lightcurve.is_dir().then(|| config.report_path(&args.lightcurve)));
    if let Some(path) = output {
        fit.save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = &args.json {
        fit.save_json(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn handle_show(report: PathBuf) -> Result<()> {
    match read_report(&report).with_context(|| format!("failed to read {}", report.display()))? {
        Some(fit) => println!("{}", fit),
        None => println!("{}: no fit", report.display()),
    }
    Ok(())
}

fn handle_catalog(dir: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let dir = dir.unwrap_or_else(|| config.data_dir.clone());
    let records =
        load_catalog(&dir, &config).with_context(|| format!("failed to scan {}", dir.display()))?;

    println!("{:<16}{:>16}{:>10}{:>20}{:>9}", "grb", "met", "samples", "fit", "spectra");
    for record in &records {
        println!(
            "{:<16}{:>16}{:>10}{:>20}{:>9}",
            record.name,
            record.met().map_or_else(|| "-".to_string(), |met| format!("{:.1}", met)),
            record.light_curve.len(),
            record.fit.as_ref().map_or("-", |fit| fit.model().name()),
            record.spectra.len()
        );
    }
    Ok(())
}

fn handle_models() {
    println!("{:<20}{:>8}{:>8}{:>8}", "model", "flares", "breaks", "params");
    for model in MODEL_TABLE.iter() {
        println!(
            "{:<20}{:>8}{:>8}{:>8}",
            model.name(),
            model.num_flares(),
            model.num_breaks(),
            model.param_count()
        );
    }
}
