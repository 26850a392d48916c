//! Error types for assembly composition and decomposition.

use crate::config::ConfigError;
use std::path::PathBuf;
use stepasm_part21::StepError;
use thiserror::Error;

/// Errors that can occur while composing, decomposing or (de)serializing
/// an assembly.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A source STEP file is malformed.
    #[error("Malformed STEP file {}: {source}", path.display())]
    Format {
        /// File being read.
        path: PathBuf,
        /// Underlying parse error (carries line/column).
        #[source]
        source: StepError,
    },

    /// A file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The usage occurrences of a file leave more than one free root.
    #[error("{} has {} root product definitions: {}", path.display(), roots.len(), format_ids(roots))]
    MultiRoot {
        /// File being merged.
        path: PathBuf,
        /// Candidate root ids.
        roots: Vec<u64>,
    },

    /// No root product definition could be found.
    #[error("{} has no root product definition", path.display())]
    NoRoot {
        /// File being merged.
        path: PathBuf,
    },

    /// Decompose target tree does not have the merged tree's shape.
    #[error("Structural mismatch at '{node}': {message}")]
    StructuralMismatch {
        /// Name of the node where the trees diverge.
        node: String,
        /// What differs.
        message: String,
    },

    /// A product could not be located in its parsed file.
    #[error("Product '{name}' could not be located in {}", path.display())]
    Unresolved {
        /// Product name.
        name: String,
        /// File that was searched.
        path: PathBuf,
    },

    /// A `.arb` tree is malformed.
    #[error("Invalid .arb tree: {0}")]
    Arb(String),

    /// A leaf's geometry index does not resolve.
    #[error("Invalid geometry for '{name}': {message}")]
    Geometry {
        /// Product name.
        name: String,
        /// What is wrong.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Broad classification used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed source text.
    Format,
    /// Unreadable or unwritable file.
    Io,
    /// Ambiguous file root.
    MultiRoot,
    /// Decompose target disagrees with the merged tree.
    StructuralMismatch,
    /// Everything else.
    Other,
}

impl AssemblyError {
    /// Wrap a part21 error raised while processing `path`.
    pub fn step(path: impl Into<PathBuf>, source: StepError) -> Self {
        match source {
            StepError::Io(source) => Self::Io {
                path: path.into(),
                source,
            },
            source => Self::Format {
                path: path.into(),
                source,
            },
        }
    }

    /// Wrap an I/O error raised while accessing `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a structural mismatch error.
    pub fn mismatch(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StructuralMismatch {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } | Self::NoRoot { .. } => ErrorKind::Format,
            Self::Io { .. } => ErrorKind::Io,
            Self::MultiRoot { .. } => ErrorKind::MultiRoot,
            Self::StructuralMismatch { .. } => ErrorKind::StructuralMismatch,
            Self::Config(ConfigError::Read { .. }) => ErrorKind::Io,
            _ => ErrorKind::Other,
        }
    }
}

fn format_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for assembly operations.
pub type Result<T> = std::result::Result<T, AssemblyError>;
