//! Error taxonomy for the imputation pipeline.
//!
//! Library code returns [`ImputeError`]; the CLI layer wraps it in `anyhow`
//! with file and command context. Every variant aborts the schedule, and
//! [`ImputeError::Stage`] attaches the attribute that failed.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = ImputeError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    DomainMismatch,
    MissingDependency,
    ModelArtifact,
    Training,
    InvalidDistribution,
    Merge,
    Io,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::DomainMismatch => "domain-mismatch",
            ErrorKind::MissingDependency => "missing-dependency",
            ErrorKind::ModelArtifact => "model-artifact",
            ErrorKind::Training => "training",
            ErrorKind::InvalidDistribution => "invalid-distribution",
            ErrorKind::Merge => "merge",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ImputeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("domain mismatch: {0}")]
    DomainMismatch(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("model artifact error: {0}")]
    ModelArtifact(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("row {row} has an unusable probability distribution (mass {mass})")]
    InvalidDistribution { row: u64, mass: f64 },

    #[error("merge failed for column '{column}': {message}")]
    Merge { column: String, message: String },

    #[error("reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing CSV {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("stage '{attribute}' failed ({}): {source}", source.kind())]
    Stage {
        attribute: String,
        #[source]
        source: Box<ImputeError>,
    },
}

impl ImputeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImputeError::Configuration(_) => ErrorKind::Configuration,
            ImputeError::DomainMismatch(_) => ErrorKind::DomainMismatch,
            ImputeError::MissingDependency(_) => ErrorKind::MissingDependency,
            ImputeError::ModelArtifact(_) => ErrorKind::ModelArtifact,
            ImputeError::Training(_) => ErrorKind::Training,
            ImputeError::InvalidDistribution { .. } => ErrorKind::InvalidDistribution,
            ImputeError::Merge { .. } => ErrorKind::Merge,
            ImputeError::Io { .. } | ImputeError::Csv { .. } => ErrorKind::Io,
            ImputeError::Stage { source, .. } => source.kind(),
        }
    }

    /// Attribute whose stage raised this error, if it was raised inside one.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            ImputeError::Stage { attribute, .. } => Some(attribute),
            _ => None,
        }
    }

    pub fn in_stage(self, attribute: &str) -> Self {
        match self {
            already @ ImputeError::Stage { .. } => already,
            other => ImputeError::Stage {
                attribute: attribute.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ImputeError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        ImputeError::Csv {
            path: path.into(),
            source,
        }
    }
}
