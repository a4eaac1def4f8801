//! Images saved with `docker save`
//!
//! The outer tarball holds `manifest.json`, the image config and one blob per
//! layer. Blobs are staged to a temporary directory in a single pass so each
//! layer can be reopened independently later; the directory lives as long as
//! any layer handle does.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tar::{Archive, EntryType};
use tempfile::TempDir;
use tracing::{debug, info};

use super::parse_history;
use crate::image::{BlobSource, Image, ImageSource, LayerHandle};
use crate::paths;
use crate::{Error, Result};

const MANIFEST: &str = "manifest.json";
const MAX_LINK_HOPS: usize = 8;

/// Docker manifest.json structure
/// The manifest is an array of image descriptors
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Config")]
    config: Option<String>,

    #[serde(rename = "RepoTags", default)]
    repo_tags: Option<Vec<String>>,

    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// Parse the manifest.json, keeping the first image (most archives have only one)
fn parse_manifest(manifest_bytes: &[u8]) -> std::result::Result<ManifestEntry, String> {
    let manifest: Vec<ManifestEntry> =
        serde_json::from_slice(manifest_bytes).map_err(|e| format!("failed to parse {MANIFEST}: {e}"))?;
    manifest
        .into_iter()
        .next()
        .ok_or_else(|| format!("empty {MANIFEST}"))
}

#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
    digest: String,
    size: u64,
}

/// Everything read from the outer tarball.
struct Staging {
    dir: Arc<TempDir>,
    files: HashMap<String, StagedFile>,
    links: HashMap<String, String>,
    manifest: Option<Vec<u8>>,
}

impl Staging {
    /// Follow symlinks inside the tarball to a staged regular file.
    fn lookup(&self, name: &str) -> Option<&StagedFile> {
        let mut name = paths::normalize(name).to_string();
        for _ in 0..=MAX_LINK_HOPS {
            if let Some(file) = self.files.get(&name) {
                return Some(file);
            }
            name = self.links.get(&name)?.clone();
        }
        None
    }
}

/// Image source reading a local `docker save` tarball.
#[derive(Debug, Default)]
pub struct DockerArchiveSource;

impl DockerArchiveSource {
    pub fn new() -> Self {
        DockerArchiveSource
    }
}

impl ImageSource for DockerArchiveSource {
    fn resolve(&mut self, reference: &str) -> Result<Image> {
        let archive_path = Path::new(reference);
        let fetch_failed = |reason: String| Error::FetchFailed {
            reference: reference.to_string(),
            reason,
        };

        let file = File::open(archive_path)
            .map_err(|e| fetch_failed(format!("failed to open {}: {e}", archive_path.display())))?;
        info!(archive = %archive_path.display(), "reading docker archive");

        let staging = stage(file).map_err(|e| fetch_failed(e.to_string()))?;
        let manifest = staging
            .manifest
            .as_deref()
            .ok_or_else(|| fetch_failed(format!("{MANIFEST} not found in archive")))?;
        let manifest = parse_manifest(manifest).map_err(fetch_failed)?;

        let history = match &manifest.config {
            Some(config) => {
                let staged = staging
                    .lookup(config)
                    .ok_or_else(|| Error::ConfigUnavailable(format!("{config} not found in archive")))?;
                let bytes = fs::read(&staged.path).map_err(|e| Error::ConfigUnavailable(e.to_string()))?;
                parse_history(&bytes)?
            }
            None => Vec::new(),
        };

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for name in &manifest.layers {
            let staged = staging
                .lookup(name)
                .ok_or_else(|| fetch_failed(format!("layer {name} not found in archive")))?;
            let blob = StagedLayer {
                path: staged.path.clone(),
                _staging: Arc::clone(&staging.dir),
            };
            layers.push(LayerHandle::new(staged.digest.clone(), staged.size, Box::new(blob)));
        }

        let display = manifest
            .repo_tags
            .as_ref()
            .and_then(|tags| tags.first())
            .cloned()
            .unwrap_or_else(|| reference.to_string());

        Ok(Image::new(display, layers, history))
    }
}

/// Copy every regular file of the tarball to a temporary directory, hashing
/// as it goes, and remember symlinks.
fn stage<R: Read>(reader: R) -> io::Result<Staging> {
    let dir = tempfile::tempdir()?;
    let mut files = HashMap::new();
    let mut links = HashMap::new();
    let mut manifest = None;

    let mut archive = Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let name = paths::normalize(&name).to_string();

        let kind = entry.header().entry_type();

        match kind {
            EntryType::Symlink => {
                if let Some(target) = entry.link_name()? {
                    let target = resolve_link(&name, &target.to_string_lossy());
                    debug!(link = %name, target = %target, "archive symlink");
                    links.insert(name, target);
                }
            }
            EntryType::Regular | EntryType::Continuous if name == MANIFEST => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                manifest = Some(buf);
            }
            EntryType::Regular | EntryType::Continuous => {
                let path = dir.path().join(format!("blob-{}", files.len()));
                let mut writer = HashingWriter::new(File::create(&path)?);
                io::copy(&mut entry, &mut writer)?;
                let (digest, size) = writer.finish()?;
                debug!(file = %name, digest = %digest, size, "staged archive file");
                files.insert(name, StagedFile { path, digest, size });
            }
            _ => {}
        }
    }

    Ok(Staging {
        dir: Arc::new(dir),
        files,
        links,
        manifest,
    })
}

/// Resolve a symlink target relative to the directory holding `link`.
fn resolve_link(link: &str, target: &str) -> String {
    let mut parts: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        let mut parts: Vec<&str> = link.split('/').collect();
        parts.pop();
        parts
    };

    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            component => parts.push(component),
        }
    }
    parts.join("/")
}

/// Computes the sha256 digest and size of everything written through it.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    fn finish(mut self) -> io::Result<(String, u64)> {
        self.inner.flush()?;
        let digest = format!("sha256:{}", hex::encode(self.hasher.finalize()));
        Ok((digest, self.written))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A layer blob staged on disk.
#[derive(Debug)]
struct StagedLayer {
    path: PathBuf,
    _staging: Arc<TempDir>,
}

impl BlobSource for StagedLayer {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}
