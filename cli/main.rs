#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use csv::WriterBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process;

use umri::data::{ColumnMatrix, load_column_matrix, read_columns};
use umri::group::group_and_summarize;
use umri::model::{WeightModel, build_risk_model};
use umri::schema::{HeaderSchema, RiskModel};
use umri::score::{Profile, ScoreError, explain_confidence};
use umri::trend::{DEFAULT_BIN_WIDTH, score_dispersion_by_bin};
use umri::value::{CoercionPolicy, parse_finite};

#[derive(Clone, Copy, ValueEnum)]
pub enum RiskModelCli {
    Ascvd,
    Smart,
    Umri,
}

impl From<RiskModelCli> for RiskModel {
    fn from(value: RiskModelCli) -> Self {
        match value {
            RiskModelCli::Ascvd => RiskModel::Ascvd,
            RiskModelCli::Smart => RiskModel::Smart,
            RiskModelCli::Umri => RiskModel::Umri,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CoercionCli {
    Permissive,
    Strict,
}

impl From<CoercionCli> for CoercionPolicy {
    fn from(value: CoercionCli) -> Self {
        match value {
            CoercionCli::Permissive => CoercionPolicy::Permissive,
            CoercionCli::Strict => CoercionPolicy::Strict,
        }
    }
}

/// Options shared by every subcommand that reads a profile dataset.
#[derive(Args)]
pub struct DatasetArgs {
    /// Path to the profile dataset (.csv, or .tsv for tab-separated)
    pub data: PathBuf,

    /// TOML file replacing the built-in 26-column header table
    #[arg(long, value_name = "PATH")]
    pub schema: Option<PathBuf>,

    /// How a column with non-numeric values is treated
    #[arg(long, value_enum, default_value_t = CoercionCli::Permissive)]
    pub coercion: CoercionCli,
}

#[derive(Args)]
pub struct TrainArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Risk score whose weight model is built
    #[arg(long, value_enum)]
    pub risk: RiskModelCli,

    /// Where the model is written
    #[arg(long, default_value = "model.toml")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct ScoreArgs {
    /// Profiles to score (.tsv for tab-separated, comma-separated otherwise); the
    /// header row holds model field labels (age, hdl, ...)
    pub profiles: PathBuf,

    /// Path to a weight model file (.toml)
    #[arg(long)]
    pub model: PathBuf,

    /// Where the scored profiles are written
    #[arg(long, default_value = "confidence.tsv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct SummarizeArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Column index of the attribute to group by
    #[arg(long)]
    pub source: usize,

    /// Column index of the score to summarise
    #[arg(long)]
    pub target: usize,
}

#[derive(Args)]
pub struct TrendArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Column index of the score to bin (defaults to the ASCVD score)
    #[arg(long, default_value = "9")]
    pub column: usize,

    /// Width of each score bin
    #[arg(long, default_value_t = DEFAULT_BIN_WIDTH)]
    pub bin_width: f64,
}

#[derive(Parser)]
#[command(
    name = "umri",
    about = "Normalized confidence scores for ASCVD, SMART and Unmet Risk profiles",
    long_about = "Builds per-attribute dispersion weight models from a table of historical \
                 risk-score profiles and scores new profiles against them."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a weight model from a profile dataset
    #[command(about = "Build a weight model (outputs: model.toml)")]
    Train(TrainArgs),

    /// Score profiles against a weight model
    #[command(about = "Score profiles (outputs: confidence.tsv)")]
    Score(ScoreArgs),

    /// Summarise a score within each value of one attribute
    #[command(about = "Per-value score statistics (outputs: group_summary.tsv)")]
    Summarize(SummarizeArgs),

    /// Report score dispersion across the score's own range
    #[command(about = "Score dispersion by bin (outputs: dispersion_trend.tsv)")]
    Trend(TrendArgs),

    /// Display version information
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Train(args)) => train(args),
        Some(Commands::Score(args)) => score(args),
        Some(Commands::Summarize(args)) => summarize(args),
        Some(Commands::Trend(args)) => trend(args),
        Some(Commands::Version) => {
            println!("umri {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_dataset(
    args: &DatasetArgs,
) -> Result<(HeaderSchema, ColumnMatrix), Box<dyn std::error::Error>> {
    let schema = match &args.schema {
        Some(path) => {
            println!("Loading header schema from: {}", path.display());
            HeaderSchema::load(path)?
        }
        None => HeaderSchema::default(),
    };
    println!("Loading profile data from: {}", args.data.display());
    let columns = load_column_matrix(&args.data, &schema)?;
    println!(
        "Loaded {} profiles with {} columns",
        columns.n_rows(),
        columns.width()
    );
    Ok((schema, columns))
}

pub fn train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (schema, columns) = load_dataset(&args.dataset)?;
    let risk = RiskModel::from(args.risk);

    println!("Building {} weight model...", risk.name());
    let model = build_risk_model(&columns, &schema, risk, args.dataset.coercion.into())?;
    for attribute in model.attributes() {
        println!(
            "  {:<28} {:>4} values  max std {:.6}",
            attribute.label(),
            attribute.weights().len(),
            attribute.max_std()
        );
    }

    model.save(&args.output)?;
    println!("Model saved to: {}", args.output.display());
    Ok(())
}

pub fn score(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading model from: {}", args.model.display());
    let model = WeightModel::load(&args.model)?;
    println!(
        "Model for '{}' expects: {}",
        model.target(),
        model.labels().collect::<Vec<_>>().join(", ")
    );

    let table = read_columns(&args.profiles)?;
    let labels: Vec<&str> = (0..table.width())
        .map(|i| table.name(i).unwrap_or_default())
        .collect();
    println!("Scoring {} profiles...", table.n_rows());

    let scored: Vec<Result<f64, ScoreError>> = (0..table.n_rows())
        .into_par_iter()
        .map(|row| {
            let profile: Profile = labels
                .iter()
                .enumerate()
                .map(|(col, label)| {
                    let value = table.column(col).map_or("", |c| c[row].as_str());
                    (label.to_string(), value.to_string())
                })
                .collect();
            explain_confidence(&model, &profile).map(|b| {
                log::debug!("Profile {}: factors {:?}", row + 1, b.factors);
                b.confidence
            })
        })
        .collect();

    let mut confidences = Vec::with_capacity(scored.len());
    for (row, result) in scored.into_iter().enumerate() {
        confidences.push(result.map_err(|e| format!("profile {}: {e}", row + 1))?);
    }

    let mut writer = tsv_writer(&args.output)?;
    let mut header: Vec<&str> = labels.clone();
    header.push("confidence");
    writer.write_record(&header)?;
    for (row, confidence) in confidences.iter().enumerate() {
        let mut record: Vec<String> = (0..table.width())
            .map(|col| table.column(col).map_or(String::new(), |c| c[row].clone()))
            .collect();
        record.push(format!("{confidence:.6}"));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    println!("Confidence scores saved to: {}", args.output.display());
    Ok(())
}

pub fn summarize(args: SummarizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (schema, columns) = load_dataset(&args.dataset)?;
    let label = schema.field_label(args.source)?;
    let target_label = schema.field_label(args.target)?;
    let column = |index: usize| {
        columns
            .column(index)
            .ok_or_else(|| format!("column {index} is outside the data"))
    };

    println!("Summarising '{target_label}' within each value of '{label}'");
    let summary = group_and_summarize(
        column(args.source)?,
        column(args.target)?,
        args.dataset.coercion.into(),
    )?;

    let output_path = Path::new("group_summary.tsv");
    let mut writer = tsv_writer(output_path)?;
    writer.write_record([label.as_str(), "count", "mean", "std", "ci_half_width"])?;
    for stats in summary.stats() {
        writer.write_record([
            stats.key.to_string(),
            stats.count.to_string(),
            format!("{:.6}", stats.mean),
            format!("{:.6}", stats.std),
            format!("{:.6}", stats.ci_half_width),
        ])?;
    }
    writer.flush()?;
    println!(
        "{} groups saved to: {}",
        summary.len(),
        output_path.display()
    );
    Ok(())
}

pub fn trend(args: TrendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (schema, columns) = load_dataset(&args.dataset)?;
    let label = schema.field_label(args.column)?;
    let raw = columns
        .column(args.column)
        .ok_or_else(|| format!("column {} is outside the data", args.column))?;
    let scores = raw
        .iter()
        .enumerate()
        .map(|(row, value)| {
            parse_finite(value)
                .ok_or_else(|| format!("'{label}' row {}: '{value}' is not a number", row + 1))
        })
        .collect::<Result<Vec<f64>, _>>()?;

    println!(
        "Binning {} '{label}' scores with width {}",
        scores.len(),
        args.bin_width
    );
    let trend = score_dispersion_by_bin(&scores, args.bin_width)?;

    let output_path = Path::new("dispersion_trend.tsv");
    let mut writer = tsv_writer(output_path)?;
    writer.write_record(["bin", "count", "std"])?;
    for ((bin, count), std) in trend
        .boundaries
        .iter()
        .zip(&trend.counts)
        .zip(&trend.stds)
    {
        writer.write_record([bin.to_string(), count.to_string(), format!("{std:.6}")])?;
    }
    writer.flush()?;
    println!(
        "{} populated bins saved to: {}",
        trend.boundaries.len(),
        output_path.display()
    );
    Ok(())
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, csv::Error> {
    WriterBuilder::new().delimiter(b'\t').from_path(path)
}
