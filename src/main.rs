use anyhow::{Context, Result};
use chainage::chunk::Requirement;
use chainage::parser::parse_series_arg;
use chainage::{
    catalog, ChartKind, ColumnSpec, FieldSpec, Pipeline, PipelineConfig, Role, Shape, Status,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chainage")]
#[command(about = "Ingest pipeline survey exports and slice them into chainage windows for charting", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the stored datasets (overrides the config file)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a CSV or spreadsheet export and store it for a role
    Upload {
        #[arg(long)]
        role: Role,
        file: PathBuf,
    },
    /// Remove stored data for one role, or both when omitted
    Clear {
        #[arg(long)]
        role: Option<Role>,
    },
    /// Describe the dataset stored for a role
    Show {
        #[arg(long)]
        role: Role,
    },
    /// Print the map markers derived from the geodata role
    Markers,
    /// Partition a role's rows into distance windows
    Chunk {
        #[arg(long)]
        role: Role,
        /// Distance column; repeat to give fallbacks in order
        #[arg(long, required = true)]
        distance: Vec<String>,
        #[arg(long)]
        require: Vec<String>,
        #[arg(long)]
        optional: Vec<String>,
        #[arg(long)]
        width: Option<f64>,
    },
    /// Build series from a role's rows, e.g. --series 'series(column: "Elevation (m)")'
    Series {
        #[arg(long)]
        role: Role,
        /// Distance column used for labels, pairs and chunking
        #[arg(long)]
        x: Option<String>,
        /// Emit (x, y) pairs instead of index-aligned values
        #[arg(long)]
        pairs: bool,
        /// With --pairs: drop gaps and order by x
        #[arg(long, requires = "pairs")]
        sorted: bool,
        #[arg(long)]
        width: Option<f64>,
        #[arg(long = "series", required = true, value_parser = parse_series_arg)]
        series: Vec<ColumnSpec>,
    },
    /// Prepare one of the catalog charts
    Chart {
        kind: ChartKind,
        #[arg(long, conflicts_with = "whole")]
        width: Option<f64>,
        /// One section over the whole dataset instead of per-window sections
        #[arg(long)]
        whole: bool,
    },
    /// List the chart catalog
    Charts,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.store_dir {
        config.store_dir = dir.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value).context("Failed to serialize result")?;
    writeln!(handle).context("Failed to write to stdout")?;
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Rejected input exits with 2; degraded results still exit 0.
fn exit_code(status: &Status) -> i32 {
    match status {
        Status::UnsupportedFormat { .. } | Status::MalformedFile { .. } => 2,
        _ => 0,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = load_config(&args)?;

    if let Command::Charts = args.command {
        return print_json(&catalog());
    }

    let mut pipeline = Pipeline::open(config);
    let code = match args.command {
        Command::Upload { role, file } => {
            let report = pipeline.upload_path(role, &file);
            print_json(&report)?;
            exit_code(&report.status)
        }
        Command::Clear { role } => {
            let status = pipeline.clear(role);
            print_json(&status)?;
            exit_code(&status)
        }
        Command::Show { role } => {
            let dataset = pipeline.dataset(role);
            let status = if dataset.is_empty() {
                Status::no_data()
            } else {
                Status::Ok
            };
            print_json(&json!({
                "status": status,
                "role": role,
                "file_name": dataset.file_name,
                "rows": dataset.rows.len(),
                "columns": dataset.schema,
            }))?;
            0
        }
        Command::Markers => {
            print_json(&pipeline.markers())?;
            0
        }
        Command::Chunk {
            role,
            distance,
            require,
            optional,
            width,
        } => {
            let candidates: Vec<FieldSpec> = distance.into_iter().map(FieldSpec::named).collect();
            let requirements: Vec<Requirement> = require
                .into_iter()
                .map(Requirement::required)
                .chain(optional.into_iter().map(Requirement::optional))
                .collect();
            let report = pipeline.chunk(role, &candidates, &requirements, width);
            print_json(&report)?;
            0
        }
        Command::Series {
            role,
            x,
            pairs,
            sorted,
            width,
            series,
        } => {
            let x = x.map(FieldSpec::named);
            let shape = match (pairs, x) {
                (true, Some(x)) => Shape::Pairs { x, sorted },
                (true, None) => anyhow::bail!("--pairs needs --x"),
                (false, x) => Shape::Indexed { x },
            };
            let report = pipeline.series(role, &series, &shape, width);
            print_json(&report)?;
            0
        }
        Command::Chart { kind, width, whole } => {
            let width = if whole {
                None
            } else {
                Some(pipeline.config().chunk_width(width))
            };
            let report = pipeline.chart(kind, width);
            print_json(&report)?;
            0
        }
        Command::Charts => 0,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
