//! Timegraph CLI
//!
//! - `generate`: build a synthetic multi-tenant dataset from a JSON config,
//!   validate it, and write import-ready batches
//! - `validate`: re-check a snapshot (optionally against an earlier one)
//! - `time-travel`: reconstruct assets of a snapshot at an instant
//! - `indexes`: print the index definitions for the given conventions

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use timegraph_core::{
    generate_dataset, DatasetSnapshot, DocKey, GeneratorConfig, IndexSpec, IntegrityValidator,
    NamingConvention, TimeTravelReconstructor, Timestamp, ViolationReport,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod output;

#[derive(Parser)]
#[command(name = "timegraph")]
#[command(
    author,
    version,
    about = "Timegraph: temporally-versioned, tenant-partitioned graph datasets"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, validate and export a dataset.
    Generate {
        /// Generator configuration (JSON).
        #[arg(short, long)]
        config: PathBuf,
        /// Output directory.
        #[arg(short, long, default_value = "build/timegraph")]
        out: PathBuf,
        /// Override the configured seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a snapshot written by `generate`.
    Validate {
        snapshot: PathBuf,
        /// An earlier snapshot of the same dataset; checks anchor stability.
        #[arg(long)]
        before: Option<PathBuf>,
        /// Print the report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Reconstruct assets as they were at an instant.
    TimeTravel {
        snapshot: PathBuf,
        /// Unix seconds or RFC 3339.
        #[arg(long)]
        at: String,
        /// Restrict to one asset (its `In` anchor key).
        #[arg(long)]
        asset: Option<String>,
    },
    /// Print index definitions.
    Indexes {
        #[arg(long, value_enum, default_values_t = [Naming::Primary])]
        naming: Vec<Naming>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Naming {
    Primary,
    Alternate,
}

impl From<Naming> for NamingConvention {
    fn from(naming: Naming) -> Self {
        match naming {
            Naming::Primary => NamingConvention::Primary,
            Naming::Alternate => NamingConvention::Alternate,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate { config, out, seed } => cmd_generate(&config, &out, seed),
        Commands::Validate {
            snapshot,
            before,
            json,
        } => cmd_validate(&snapshot, before.as_deref(), json),
        Commands::TimeTravel { snapshot, at, asset } => {
            cmd_time_travel(&snapshot, &at, asset.as_deref())
        }
        Commands::Indexes { naming } => {
            let spec = IndexSpec::for_conventions(naming.into_iter().map(NamingConvention::from));
            println!("{}", serde_json::to_string_pretty(&spec)?);
            Ok(())
        }
    }
}

fn cmd_generate(config_path: &Path, out: &Path, seed: Option<u64>) -> Result<()> {
    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let mut config = GeneratorConfig::from_json_str(&raw)
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    if let Some(seed) = seed {
        config.seed = seed;
    }

    let cancel = AtomicBool::new(false);
    let generated = generate_dataset(&config, &cancel)?;
    if !generated.is_complete() {
        tracing::warn!(
            cancelled = ?generated.cancelled_tenants,
            "generation stopped early"
        );
        eprintln!(
            "{} generation cancelled for {} tenant(s)",
            "warn".yellow().bold(),
            generated.cancelled_tenants.len()
        );
    }

    let snapshot = generated.dataset.snapshot();
    let report = IntegrityValidator::report(&snapshot);
    if !report.is_clean() {
        let path = output::write_report(out, &report)?;
        print_report(&report);
        bail!(
            "dataset failed validation; report written to {}",
            path.display()
        );
    }

    let bundle = generated.dataset.export()?;
    let written = output::write_export(out, &bundle, &snapshot)?;
    tracing::info!(
        tenants = snapshot.tenants.len(),
        assets = snapshot.asset_count(),
        documents = bundle.batches.document_count(),
        files = written.len(),
        out = %out.display(),
        "export written"
    );
    eprintln!(
        "{} {} tenant(s), {} asset(s), {} document(s) in {} file(s) under {}",
        "ok".green().bold(),
        snapshot.tenants.len(),
        snapshot.asset_count(),
        bundle.batches.document_count(),
        written.len(),
        out.display().to_string().bold()
    );
    Ok(())
}

fn cmd_validate(path: &Path, before: Option<&Path>, json: bool) -> Result<()> {
    let snapshot = output::read_snapshot(path)?;
    let mut report = IntegrityValidator::report(&snapshot);
    if let Some(before) = before {
        let earlier = output::read_snapshot(before)?;
        if let Err(violations) = IntegrityValidator::validate_evolution(&earlier, &snapshot) {
            tracing::warn!(
                before = %before.display(),
                violations = violations.len(),
                "anchors changed between snapshots"
            );
            report.violations.extend(violations);
        }
    }
    tracing::info!(
        snapshot = %path.display(),
        assets = report.assets_checked,
        edges = report.edges_checked,
        violations = report.violations.len(),
        "validated snapshot"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("{} violation(s)", report.violations.len()))
    }
}

fn print_report(report: &ViolationReport) {
    if report.is_clean() {
        eprintln!(
            "{} {} asset(s), {} edge(s), no violations",
            "ok".green().bold(),
            report.assets_checked,
            report.edges_checked
        );
        return;
    }
    eprintln!(
        "{} {} violation(s) across {} asset(s), {} edge(s)",
        "error".red().bold(),
        report.violations.len(),
        report.assets_checked,
        report.edges_checked
    );
    for (invariant, count) in report.by_invariant() {
        eprintln!("  {:<16} {}", format!("{invariant:?}").bold(), count);
    }
}

fn parse_instant(raw: &str) -> Result<Timestamp> {
    if let Ok(seconds) = raw.parse::<i64>() {
        return Ok(Timestamp::new(seconds));
    }
    let at: DateTime<Utc> = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("`{raw}` is neither unix seconds nor RFC 3339"))?
        .with_timezone(&Utc);
    Ok(Timestamp::from_datetime(at))
}

fn cmd_time_travel(path: &Path, at: &str, asset: Option<&str>) -> Result<()> {
    let snapshot: DatasetSnapshot = output::read_snapshot(path)?;
    let at = parse_instant(at)?;

    let records = snapshot.tenants.iter().flat_map(|t| t.assets.iter());
    let mut states = Vec::new();
    match asset {
        Some(key) => {
            let key = DocKey::from(key);
            let record = snapshot
                .tenants
                .iter()
                .find_map(|t| t.asset(&key))
                .ok_or_else(|| anyhow!("no asset `{key}` in {}", path.display()))?;
            states.extend(TimeTravelReconstructor::state_at_record(record, at)?);
        }
        None => {
            for record in records {
                states.extend(TimeTravelReconstructor::state_at_record(record, at)?);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&states)?);
    eprintln!("{} {} asset(s) existed at {}", "ok".green().bold(), states.len(), at);
    Ok(())
}
