use std::path::PathBuf;

/// Result type returned by fallible index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised while building, persisting, loading or checking an index.
///
/// Recoverable problems (unreadable document text, a parallel pool that could
/// not be started, query terms missing from the vocabulary) never surface
/// here; they are logged and recorded as diagnostics instead.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Reading or writing a file failed.
    #[error("{stage}: i/o error on {}: {source}", path.display())]
    Io {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Binary encoding of an index component failed.
    #[error("{stage}: failed to encode {component}: {source}")]
    Encode {
        stage: &'static str,
        component: &'static str,
        #[source]
        source: bincode::Error,
    },
    /// Binary decoding of an index component failed.
    #[error("{stage}: failed to decode {component}: {source}")]
    Decode {
        stage: &'static str,
        component: &'static str,
        #[source]
        source: bincode::Error,
    },
    /// The JSON metadata or configuration file could not be handled.
    #[error("{stage}: invalid json in {}: {source}", path.display())]
    Json {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The term-doc and doc-term structures disagree.
    #[error("{stage}: index is inconsistent: {detail}")]
    Inconsistent { stage: &'static str, detail: String },
    /// The build was cancelled before the given partition was started.
    #[error("build cancelled before partition {partition} ({documents_indexed} documents indexed)")]
    Cancelled {
        partition: usize,
        documents_indexed: usize,
    },
    /// The store has no live generation to load.
    #[error("no index generation found under {}", root.display())]
    NoCurrentGeneration { root: PathBuf },
    /// The persisted index was written by an incompatible format version.
    #[error("unsupported index format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexError {
    pub(crate) fn io(stage: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io { stage, path: path.into(), source }
    }

    pub(crate) fn inconsistent(stage: &'static str, detail: impl Into<String>) -> Self {
        IndexError::Inconsistent { stage, detail: detail.into() }
    }

    /// True for errors that indicate a structural bug rather than an
    /// environmental problem.
    pub fn is_structural(&self) -> bool {
        matches!(self, IndexError::Inconsistent { .. } | IndexError::UnsupportedFormat { .. })
    }
}
