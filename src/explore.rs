//! Listing the visible files of a single layer

use tracing::debug;

use crate::archive::{EntryKind, LayerArchive};
use crate::image::Image;
use crate::whiteout::{self, Deletion};
use crate::Result;

/// One visible entry of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub mode: u32,
    pub kind: EntryKind,
    pub size: u64,
    /// Normalized path.
    pub path: String,
    pub link_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerListing {
    pub reference: String,
    pub ordinal: usize,
    pub digest: String,
    /// Entries in archive order, whiteout markers excluded.
    pub rows: Vec<FileRow>,
    /// What this layer's whiteout markers delete from the layers below.
    pub deletions: Vec<Deletion>,
    /// Set when the archive ended with a read error; rows are partial.
    pub interruption: Option<String>,
}

/// List the files stored in layer `ordinal` of `image`.
///
/// Whiteout markers never appear as rows; the archive root entry (`./`) is
/// skipped as well.
pub fn explore_filesystem(image: &Image, ordinal: usize) -> Result<LayerListing> {
    let layer = image.layer(ordinal)?;
    debug!(layer = ordinal, digest = layer.digest(), "listing layer");

    let stream = layer.open_uncompressed()?;
    let mut archive = LayerArchive::new(stream);
    let mut entries = archive.entries()?;

    let mut rows = Vec::new();
    let mut deletions = Vec::new();

    for entry in entries.by_ref() {
        let path = entry.path();
        if entry.kind() == EntryKind::Whiteout {
            deletions.extend(whiteout::deletion(path));
            continue;
        }
        if path.is_empty() {
            continue;
        }

        rows.push(FileRow {
            mode: entry.mode(),
            kind: entry.kind(),
            size: entry.size(),
            path: path.to_string(),
            link_target: entry.link_target().map(str::to_string),
        });
    }

    Ok(LayerListing {
        reference: image.reference().to_string(),
        ordinal,
        digest: layer.digest().to_string(),
        rows,
        deletions,
        interruption: entries.interruption().map(|err| err.to_string()),
    })
}
