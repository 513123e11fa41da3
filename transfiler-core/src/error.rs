//! Error types for transfiler-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from building, reading or comparing manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory to index does not exist or is not a directory.
    #[error("not a directory: {path}")]
    RootNotDirectory { path: PathBuf },

    /// Manifest bytes were not valid UTF-8.
    #[error("manifest at {path} is not valid UTF-8")]
    Encoding { path: PathBuf },

    /// YAML parse error on config load, with the file path.
    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Convenience constructor for [`ManifestError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
