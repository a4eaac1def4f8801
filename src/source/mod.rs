//! Where images come from: a remote registry or a `docker save` tarball

pub mod auth;
pub mod docker_archive;
pub mod reference;
pub mod registry;

use serde::Deserialize;
use std::path::PathBuf;

use crate::image::{HistoryRecord, Image, ImageSource};
use crate::{Error, Result};

pub use docker_archive::DockerArchiveSource;
pub use registry::{Platform, RegistrySource};

/// References with this prefix name a local `docker save` archive.
pub const DOCKER_ARCHIVE_PREFIX: &str = "docker-archive:";

#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Platform to select from multi-platform images; the host by default.
    pub platform: Option<Platform>,
    /// Docker CLI config file holding registry credentials.
    pub docker_config: Option<PathBuf>,
}

/// Resolve `reference` with the source its form calls for.
pub fn open_source(reference: &str, options: &SourceOptions) -> Result<Image> {
    match reference.strip_prefix(DOCKER_ARCHIVE_PREFIX) {
        Some(path) => DockerArchiveSource::new().resolve(path),
        None => RegistrySource::new(options).resolve(reference),
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    history: Option<Vec<HistoryRecord>>,
}

/// Build history from an image configuration blob.
pub(crate) fn parse_history(config: &[u8]) -> Result<Vec<HistoryRecord>> {
    let config: ConfigFile = serde_json::from_slice(config)
        .map_err(|e| Error::ConfigUnavailable(format!("invalid image config: {e}")))?;
    Ok(config.history.unwrap_or_default())
}
