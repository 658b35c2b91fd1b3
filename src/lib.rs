//! Recordprep: XML box annotations to TFRecord training data.
//!
//! The pipeline has two stages joined by a flat table:
//!
//! 1. [`harvest`] reads one Pascal VOC style XML file per image and emits an
//!    [`AnnotationTable`] with one row per object.
//! 2. [`record`] groups that table by filename, reads each image for its real
//!    size, normalizes the boxes, and produces one [`TrainingRecord`] per image,
//!    written as `tf.train.Example`s in a TFRecord file.
//!
//! # Modules
//!
//! - [`geom`]: Pixel and normalized bounding boxes
//! - [`table`]: The annotation table, grouping, and its CSV form
//! - [`harvest`]: XML annotation directory reader
//! - [`label_map`]: Class-name to id mapping
//! - [`record`]: Record building and TFRecord output
//! - [`validation`]: Table validation and reporting
//! - [`error`]: Error types

pub mod error;
pub mod geom;
pub mod harvest;
pub mod label_map;
pub mod record;
pub mod table;
pub mod validation;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{info, warn};

pub use error::RecordprepError;
pub use label_map::LabelMap;
pub use record::{RecordBuilder, TrainingRecord};
pub use table::{AnnotationGroup, AnnotationRow, AnnotationTable};

use record::{BuildOptions, ErrorPolicy, TfRecordWriter};

/// The recordprep CLI application.
#[derive(Parser)]
#[command(name = "recordprep")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect XML annotations into a CSV table.
    Harvest(HarvestArgs),
    /// Build a TFRecord file from a CSV table and its images.
    Build(BuildArgs),
    /// Harvest and build in one step.
    Convert(ConvertArgs),
    /// Check a CSV table for problems before building.
    Validate(ValidateArgs),
    /// Print a label map derived from a CSV table, in pbtxt form.
    Labels(LabelsArgs),
}

#[derive(clap::Args)]
struct HarvestArgs {
    /// Directory holding one XML annotation file per image.
    annotations: PathBuf,

    /// Output CSV file.
    #[arg(short, long)]
    output: PathBuf,
}

/// Options shared by `build` and `convert`.
#[derive(clap::Args)]
struct RecordArgs {
    /// Directory holding the images named in the annotations.
    #[arg(long, env = "RECORDPREP_IMAGES")]
    images: PathBuf,

    /// Label map file (.yaml, .yml, .json, or .pbtxt). Derived from the
    /// table's class names in sorted order when omitted.
    #[arg(long, env = "RECORDPREP_LABEL_MAP")]
    label_map: Option<PathBuf>,

    /// Output TFRecord file.
    #[arg(short, long)]
    output: PathBuf,

    /// Keep building the remaining images when one fails.
    #[arg(long)]
    keep_going: bool,

    /// Shuffle image order with this seed before writing.
    #[arg(long)]
    shuffle_seed: Option<u64>,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Input CSV table.
    input: PathBuf,

    #[command(flatten)]
    record: RecordArgs,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Directory holding one XML annotation file per image.
    annotations: PathBuf,

    /// Also write the intermediate table to this CSV file.
    #[arg(long)]
    csv: Option<PathBuf>,

    #[command(flatten)]
    record: RecordArgs,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Input CSV table.
    input: PathBuf,

    /// Label map to check class names against.
    #[arg(long, env = "RECORDPREP_LABEL_MAP")]
    label_map: Option<PathBuf>,

    /// Also open every image and compare its size with the table.
    #[arg(long)]
    images: Option<PathBuf>,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

#[derive(clap::Args)]
struct LabelsArgs {
    /// Input CSV table.
    input: PathBuf,
}

/// Run the recordprep CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), RecordprepError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Harvest(args)) => run_harvest(args),
        Some(Commands::Build(args)) => run_build(args),
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Labels(args)) => run_labels(args),
        None => {
            println!("recordprep {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("XML box annotations to TFRecord training data.");
            println!();
            println!("Run 'recordprep --help' for usage information.");
            Ok(())
        }
    }
}

fn run_harvest(args: HarvestArgs) -> Result<(), RecordprepError> {
    let harvested = harvest::harvest_with_summary(&args.annotations)?;
    table::io_csv::write_table_csv(&args.output, &harvested.table)?;

    println!(
        "Harvested {} row(s) from {} file(s) into {}",
        harvested.table.len(),
        harvested.summary.files,
        args.output.display()
    );
    if !harvested.summary.empty_files.is_empty() {
        println!(
            "{} file(s) declared no objects and were left out",
            harvested.summary.empty_files.len()
        );
    }
    Ok(())
}

fn run_build(args: BuildArgs) -> Result<(), RecordprepError> {
    let table = table::io_csv::read_table_csv(&args.input)?;
    write_records(&table, &args.record)
}

fn run_convert(args: ConvertArgs) -> Result<(), RecordprepError> {
    let table = harvest::harvest(&args.annotations)?;
    if let Some(csv_path) = &args.csv {
        table::io_csv::write_table_csv(csv_path, &table)?;
        info!("wrote {} row(s) to {}", table.len(), csv_path.display());
    }
    write_records(&table, &args.record)
}

fn run_validate(args: ValidateArgs) -> Result<(), RecordprepError> {
    let table = table::io_csv::read_table_csv(&args.input)?;
    let label_map = args
        .label_map
        .as_deref()
        .map(LabelMap::read)
        .transpose()?;

    let opts = validation::ValidateOptions {
        strict: args.strict,
        images_dir: args.images,
    };
    let report = validation::validate_table(&table, label_map.as_ref(), &opts);

    match args.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => print!("{}", report),
        other => {
            return Err(RecordprepError::UnsupportedFormat(format!(
                "report output '{}' (supported: text, json)",
                other
            )));
        }
    }

    if report.fails(opts.strict) {
        Err(RecordprepError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

fn run_labels(args: LabelsArgs) -> Result<(), RecordprepError> {
    let table = table::io_csv::read_table_csv(&args.input)?;
    let label_map = LabelMap::from_classes(table.class_names());
    print!("{}", label_map.to_pbtxt());
    Ok(())
}

fn write_records(table: &AnnotationTable, args: &RecordArgs) -> Result<(), RecordprepError> {
    let label_map = load_label_map(args.label_map.as_deref(), table)?;

    let mut groups = table.group_by_filename();
    if let Some(seed) = args.shuffle_seed {
        record::shuffle_groups(&mut groups, seed);
    }

    let error_policy = if args.keep_going {
        ErrorPolicy::CollectAll
    } else {
        ErrorPolicy::FailFast
    };
    let builder = RecordBuilder::new(&args.images, label_map).with_options(BuildOptions {
        error_policy,
        ..Default::default()
    });

    let mut writer = TfRecordWriter::create(&args.output)?;
    let summary = builder.write_all(&groups, &mut writer)?;
    writer.finish()?;

    println!(
        "Wrote {} record(s) with {} object(s) to {}",
        summary.written,
        summary.objects,
        args.output.display()
    );

    if summary.failures.is_empty() {
        return Ok(());
    }

    println!("{} image(s) failed:", summary.failures.len());
    for failure in &summary.failures {
        println!("  {}: {}", failure.filename, failure.error);
    }
    Err(RecordprepError::BuildFailed {
        failed: summary.failures.len(),
        total: groups.len(),
    })
}

fn load_label_map(
    path: Option<&Path>,
    table: &AnnotationTable,
) -> Result<LabelMap, RecordprepError> {
    if path.is_none() {
        warn!("no label map given; assigning ids to classes in sorted order");
    }
    let names = table.class_names();
    label_map::load_or_derive(path, names.iter().map(String::as_str))
}
