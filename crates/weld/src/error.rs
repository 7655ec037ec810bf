//! Error taxonomy for the weld pipeline
//!
//! Every failure is fatal: the build either produces a complete artifact or
//! aborts with one of these variants naming the module, segment or marker
//! that triggered it.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, WeldError>;

#[derive(Error, Debug)]
pub enum WeldError {
    /// Neither the preferred nor any fallback path exists for a source document
    #[error("missing input for module `{module}`: none of [{}] exist", display_paths(.tried))]
    MissingInput { module: String, tried: Vec<PathBuf> },

    /// An expected declaration or marker is absent from a source document
    #[error("missing marker in `{module}`: segment `{segment}` expected a line matching `{marker}`")]
    MissingMarker {
        module: String,
        segment: String,
        marker: String,
    },

    /// Brace-depth scanning never closed, or closed before it ever opened
    #[error("structural mismatch in `{module}::{segment}` starting at line {line}: {reason}")]
    StructuralMismatch {
        module: String,
        segment: String,
        line: usize,
        reason: String,
    },

    /// The isolated code dereferences a field the namespace map cannot translate
    #[error(
        "unmapped field `{field}` on `{entity}` dereferenced inside isolated module `{module}`"
    )]
    UnmappedField {
        module: String,
        entity: String,
        field: String,
    },

    /// A rename target already exists as an identifier in the renamed scope
    #[error("rename collision in scope `{scope}`: `{name}` already appears in the source")]
    RenameCollision { scope: String, name: String },

    /// The isolated code declares a binding the host layer already owns
    #[error("isolated module `{module}` declares `{name}`, which the host already declares")]
    BindingCollision { module: String, name: String },

    /// A section uses a symbol only declared by a later section
    #[error("section `{section}` references `{name}`, which is only declared later in `{declared_in}`")]
    ForwardReference {
        section: String,
        name: String,
        declared_in: String,
    },

    /// A section needs a symbol no section declares
    #[error("section `{section}` requires `{name}`, which no earlier section declares")]
    UnresolvedSymbol { section: String, name: String },

    /// A critical segment is empty or suspiciously small
    #[error("segment `{segment}` looks truncated: {chars} chars, expected at least {min}")]
    TruncatedSegment {
        segment: String,
        chars: usize,
        min: usize,
    },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WeldError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn structural(
        module: &str,
        segment: &str,
        line: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::StructuralMismatch {
            module: module.to_owned(),
            segment: segment.to_owned(),
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn missing_marker(module: &str, segment: &str, marker: impl Into<String>) -> Self {
        Self::MissingMarker {
            module: module.to_owned(),
            segment: segment.to_owned(),
            marker: marker.into(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
