use std::path::PathBuf;
use thiserror::Error;

use crate::manifest::MergeReport;

/// The main error type for volset operations.
#[derive(Debug, Error)]
pub enum VolsetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest for modality '{modality}' not found: {path}")]
    ManifestNotFound { modality: String, path: PathBuf },

    #[error("Failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write joint table to {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(
        "Empty joint table after merging [{}]; check the manifest files \
         (remove them to trigger a rescan of the corpus folders)",
        modalities.join(", ")
    )]
    EmptyJointTable { modalities: Vec<String> },

    #[error("Failed to parse configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Field '{field}' requires modality '{modality}', which is not a configured \
         input section (available: [{}])",
        available.join(", ")
    )]
    MissingFieldSpec {
        field: String,
        modality: String,
        available: Vec<String>,
    },

    #[error("No active fields: none of [{}] has input sources in the task schema", requested.join(", "))]
    EmptyFieldSet { requested: Vec<String> },

    #[error("Reader not initialised: {0} requested before initialise()")]
    NotInitialised(&'static str),

    #[error("Failed to load image {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Merge finished with {warning_count} warning(s)")]
    MergeFailed {
        warning_count: usize,
        report: MergeReport,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Specialized Result type for volset operations.
pub type Result<T> = std::result::Result<T, VolsetError>;
