//! Error taxonomy for image inspection

use std::io;

/// Result type for imgpeek operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from resolving images and inspecting their layers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The image reference string could not be parsed.
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// The image (manifest, index or archive) could not be retrieved.
    #[error("failed to retrieve image {reference}: {reason}")]
    FetchFailed { reference: String, reason: String },

    /// The image configuration (which holds the build history) is unavailable.
    #[error("failed to retrieve image config: {0}")]
    ConfigUnavailable(String),

    /// A layer ordinal outside `1..=available` was requested.
    #[error("the image only contains {available} layers (you requested layer {requested})")]
    LayerOutOfRange { requested: usize, available: usize },

    /// A layer blob could not be opened or its compression could not be removed.
    #[error("failed to uncompress layer {digest}: {source}")]
    DecompressFailed {
        digest: String,
        #[source]
        source: io::Error,
    },

    /// The layer archive is corrupt or was cut short.
    #[error("error reading layer archive: {0}")]
    ArchiveRead(#[source] io::Error),

    /// The requested path does not exist in the selected layer.
    #[error("{path} not found in layer #{layer}")]
    NotFound { path: String, layer: usize },

    /// The requested path is a directory, not a regular file.
    #[error("{path} is a directory, not a regular file (layer #{layer})")]
    IsDirectory { path: String, layer: usize },

    /// Local I/O error (staging files, writing output).
    #[error(transparent)]
    Io(#[from] io::Error),
}
