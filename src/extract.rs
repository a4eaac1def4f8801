//! Streaming a single file out of one layer

use std::io::{ErrorKind, Read, Write};
use tracing::{debug, info};

use crate::archive::LayerArchive;
use crate::image::{Image, LayerHandle};
use crate::paths;
use crate::{Error, Result};

const COPY_BUFFER: usize = 64 * 1024;

/// Which occurrence wins when a layer archive stores the same path twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Stop at the first occurrence.
    #[default]
    First,
    /// Scan the whole layer and use the last occurrence, the one an
    /// extraction would leave on disk. Reads the layer twice.
    Last,
}

#[derive(Debug, Clone, Default)]
pub struct CatOptions {
    pub policy: MatchPolicy,
}

/// Copy the content of `path` from layer `ordinal` to `sink`, byte for byte.
/// Returns the number of bytes written.
pub fn cat_file<W: Write + ?Sized>(
    image: &Image,
    ordinal: usize,
    path: &str,
    options: &CatOptions,
    sink: &mut W,
) -> Result<u64> {
    let layer = image.layer(ordinal)?;
    let target = paths::normalize_target(path);
    debug!(layer = ordinal, path = target, policy = ?options.policy, "looking up file");

    let occurrence = match options.policy {
        MatchPolicy::First => Occurrence::FirstNamed,
        MatchPolicy::Last => match last_position(layer, target)? {
            Some(position) => Occurrence::At(position),
            None => return Err(not_found(target, ordinal)),
        },
    };

    stream_entry(layer, target, occurrence, sink)
}

#[derive(Debug, Clone, Copy)]
enum Occurrence {
    FirstNamed,
    /// 1-based archive position found by a previous scan.
    At(usize),
}

fn stream_entry<W: Write + ?Sized>(
    layer: &LayerHandle,
    target: &str,
    occurrence: Occurrence,
    sink: &mut W,
) -> Result<u64> {
    let stream = layer.open_uncompressed()?;
    let mut archive = LayerArchive::new(stream);

    for mut entry in archive.entries()? {
        let wanted = match occurrence {
            Occurrence::FirstNamed => entry.path() == target,
            Occurrence::At(position) => entry.position() == position,
        };
        if !wanted {
            continue;
        }

        if entry.is_dir() {
            return Err(Error::IsDirectory {
                path: target.to_string(),
                layer: layer.ordinal(),
            });
        }

        let written = copy_content(&mut entry, sink)?;
        info!(path = target, layer = layer.ordinal(), bytes = written, "file extracted");
        return Ok(written);
    }

    Err(not_found(target, layer.ordinal()))
}

/// Position of the last entry named `target`, scanning the whole layer.
fn last_position(layer: &LayerHandle, target: &str) -> Result<Option<usize>> {
    let stream = layer.open_uncompressed()?;
    let mut archive = LayerArchive::new(stream);

    let last = archive
        .entries()?
        .filter(|entry| entry.path() == target)
        .map(|entry| entry.position())
        .last();
    Ok(last)
}

/// Copy an entry's bytes, telling archive read failures apart from sink
/// write failures.
fn copy_content<R: Read, W: Write + ?Sized>(reader: &mut R, sink: &mut W) -> Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut written = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::ArchiveRead(err)),
        };
        sink.write_all(&buf[..n])?;
        written += n as u64;
    }

    Ok(written)
}

fn not_found(target: &str, layer: usize) -> Error {
    Error::NotFound {
        path: target.to_string(),
        layer,
    }
}
