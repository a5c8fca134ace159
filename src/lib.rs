//! volset: a multi-modal volumetric dataset reader.
//!
//! volset joins per-modality manifests (headerless `subject_id,path` CSV
//! files) into one table keyed by subject, turns every joined row into a
//! multi-field record of lazily-read image handles, and serves those
//! records by index, at random, or sequentially, running each access
//! through an ordered pipeline of preprocessing stages.
//!
//! # Modules
//!
//! - [`manifest`]: manifest parsing and the inner-join merge
//! - [`catalog`]: records, the image catalog and the record builder
//! - [`pipeline`]: plain, data-dependent and randomised stages
//! - [`reader`]: the [`VolumeReader`] access layer
//! - [`config`]: YAML configuration (input sections and task schema)
//! - [`image`]: traits for the caller-supplied image codec
//! - [`error`]: error types for volset operations

pub mod catalog;
pub mod config;
pub mod error;
pub mod image;
pub mod manifest;
pub mod pipeline;
pub mod reader;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use catalog::{FieldMap, ImageCatalog, Record};
pub use config::{DataConfig, FieldSpec, ReaderConfig, TaskSchema};
pub use error::{Result, VolsetError};
pub use image::{ElementKind, ImageFactory, ImageHandle, ImageProperties, NumericKind};
pub use manifest::{JointTable, Manifest, MergeReport};
pub use pipeline::{Pipeline, Stage, StageKind};
pub use reader::{AccessRequest, Sample, VolumeReader};

/// The volset CLI application.
#[derive(Parser)]
#[command(name = "volset")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Merge the manifests of a reader configuration and report dropped subjects.
    Merge(MergeArgs),
}

/// Arguments for the merge subcommand.
#[derive(clap::Args)]
struct MergeArgs {
    /// Reader configuration file (YAML).
    config: PathBuf,

    /// Restrict the merge to these task fields (default: every active field).
    #[arg(long = "field", value_name = "NAME")]
    fields: Vec<String>,

    /// Write the joint table to this CSV file.
    #[arg(long, value_name = "PATH")]
    write_csv: Option<PathBuf>,

    /// Treat warnings as errors (exit non-zero if any subject was dropped).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Run the volset CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Merge(args)) => run_merge(args),
        None => {
            println!("volset {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Multi-modal volumetric dataset reader.");
            println!();
            println!("Run 'volset --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the merge subcommand.
fn run_merge(args: MergeArgs) -> Result<()> {
    if args.output != "text" && args.output != "json" {
        return Err(VolsetError::UnsupportedFormat(format!(
            "'{}' (supported: text, json)",
            args.output
        )));
    }

    let config = ReaderConfig::from_yaml_path(&args.config)?;
    let requested = if args.fields.is_empty() {
        config.active_fields()
    } else {
        args.fields
    };
    if let Some(unknown) = requested.iter().find(|f| config.task.get(f).is_none()) {
        return Err(VolsetError::Configuration(format!(
            "field '{}' is not declared in the task schema",
            unknown
        )));
    }
    let fields: Vec<String> = requested
        .iter()
        .filter(|f| config.task.get(f).is_some_and(|mods| !mods.is_empty()))
        .cloned()
        .collect();
    if fields.is_empty() {
        return Err(VolsetError::EmptyFieldSet { requested });
    }

    let manifests = config::manifests_for(&fields, &config.task, &config.modalities)?;
    let (table, report) = manifest::merge_manifests(&manifests)?;

    if let Some(path) = &args.write_csv {
        manifest::write_joint_csv(path, &table)?;
    }

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| VolsetError::Io(std::io::Error::other(e)))?;
            println!("{}", json);
        }
        _ => print!("{}", report),
    }

    if args.strict && report.warning_count() > 0 {
        Err(VolsetError::MergeFailed {
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}
