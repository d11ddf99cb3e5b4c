//! Error types for the analysis pipeline.
//!
//! Every variant renders a message that is safe to show to the person who
//! uploaded the dataset; the HTTP layer turns them into flash messages.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading an uploaded file into a [`crate::dataset::RawDataset`].
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Unsupported file type '{extension}'. Please upload a CSV or Excel (.xlsx) file.")]
    UnsupportedFormat { extension: String },

    #[error("The uploaded file could not be read: {0}")]
    Unreadable(String),

    #[error("{0}")]
    Schema(String),

    #[error("Dataset is too large: {found} {what} (limit {limit}).")]
    TooLarge {
        what: &'static str,
        found: usize,
        limit: usize,
    },
}

impl DatasetError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }
}

/// Failures in the metric engine.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("No valid data available after filtering.")]
    NoValidRows,

    #[error("To disaggregate by {dimension}, the dataset must include a {aliases} column.")]
    DisaggregationUnavailable {
        dimension: &'static str,
        aliases: String,
    },

    #[error(
        "Stacked gain needs at least two metric pairs like pre_q1/post_q1 and pre_q2/post_q2 (found {found})."
    )]
    InsufficientMetricPairs { found: usize },

    #[error("Scores are too large to summarize. Please check the 'pre_test' and 'post_test' values.")]
    OutOfRange,
}

/// Failures while producing a chart artifact.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Slopegraph requires a 'participant_id' or 'name' column.")]
    MissingIdentifier,

    #[error("Grouped bar chart requires a 'class' or 'student_class' column.")]
    MissingCategory,

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Chart rendering failed: {0}")]
    Render(String),

    #[error("Failed to write chart {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while building a downloadable report.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Nothing to export yet. Run an analysis first.")]
    NoAnalysisAvailable,

    #[error("Failed to build the {format} document: {message}")]
    Render {
        format: &'static str,
        message: String,
    },
}

impl ExportError {
    pub fn render(format: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Render {
            format,
            message: err.to_string(),
        }
    }
}

/// Failures reading or writing per-session state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session storage error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Top-level error for a single upload-and-analyze request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Failed to store the uploaded file: {0}")]
    Upload(#[from] std::io::Error),
}

impl AnalysisError {
    /// Whether the person uploading can fix this by changing the file.
    pub fn is_user_correctable(&self) -> bool {
        !matches!(self, Self::Upload(_))
    }
}
