//! Per-layer summaries of a resolved image

use tracing::debug;

use crate::archive::{EntryKind, LayerArchive};
use crate::image::{Image, LayerHandle};
use crate::Result;

/// Which layers to summarize and how deeply.
#[derive(Debug, Clone, Default)]
pub struct LayerQuery {
    /// Restrict the report to this 1-based ordinal.
    pub only: Option<usize>,
    /// Walk each layer's archive and count what it contains.
    pub scan_contents: bool,
}

/// Counts gathered by walking one layer archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentStats {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub whiteouts: usize,
    pub other: usize,
    /// Sum of regular file sizes.
    pub bytes: u64,
    /// The archive ended with a read error; counts are partial.
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub ordinal: usize,
    pub digest: String,
    pub size: u64,
    pub media_type: Option<String>,
    pub contents: Option<ContentStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerReport {
    pub reference: String,
    /// Number of layers in the image (not just the ones listed).
    pub layer_count: usize,
    pub layers: Vec<LayerSummary>,
    /// Compressed size of the listed layers.
    pub total_size: u64,
}

/// Summarize the layers of `image` in order.
///
/// A selected ordinal is checked before anything is produced.
pub fn list_layers(image: &Image, query: &LayerQuery) -> Result<LayerReport> {
    let selected: Vec<&LayerHandle> = match query.only {
        Some(ordinal) => vec![image.layer(ordinal)?],
        None => image.layers().iter().collect(),
    };

    let mut layers = Vec::with_capacity(selected.len());
    let mut total_size = 0;

    for layer in selected {
        let contents = if query.scan_contents {
            Some(scan_contents(layer)?)
        } else {
            None
        };

        total_size += layer.size();
        layers.push(LayerSummary {
            ordinal: layer.ordinal(),
            digest: layer.digest().to_string(),
            size: layer.size(),
            media_type: layer.media_type().map(str::to_string),
            contents,
        });
    }

    Ok(LayerReport {
        reference: image.reference().to_string(),
        layer_count: image.layers().len(),
        layers,
        total_size,
    })
}

fn scan_contents(layer: &LayerHandle) -> Result<ContentStats> {
    debug!(layer = layer.ordinal(), digest = layer.digest(), "scanning layer");
    let stream = layer.open_uncompressed()?;
    let mut archive = LayerArchive::new(stream);
    let mut entries = archive.entries()?;
    let mut stats = ContentStats::default();

    for entry in entries.by_ref() {
        match entry.kind() {
            EntryKind::Regular | EntryKind::HardLink => {
                stats.files += 1;
                stats.bytes += entry.size();
            }
            EntryKind::Directory if entry.path().is_empty() => {}
            EntryKind::Directory => stats.directories += 1,
            EntryKind::Symlink => stats.symlinks += 1,
            EntryKind::Whiteout => stats.whiteouts += 1,
            _ => stats.other += 1,
        }
    }

    stats.interrupted = entries.interruption().is_some();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, TarFixture};
    use crate::Error;

    fn sample_image() -> Image {
        let base = TarFixture::new()
            .dir("./")
            .dir("./etc/")
            .file("./etc/os-release", b"ID=test\n")
            .symlink("./bin", "usr/bin")
            .build();
        let top = TarFixture::new()
            .whiteout("etc/.wh.os-release")
            .file("app", &[1u8; 1000])
            .hardlink("app-link", "app")
            .build();
        testing::image(
            vec![
                testing::layer("sha256:base", testing::gzip(&base)),
                testing::layer("sha256:top", top),
            ],
            vec![],
        )
    }

    #[test]
    fn test_lists_all_layers_in_order() {
        let image = sample_image();
        let report = list_layers(&image, &LayerQuery::default()).unwrap();

        let ordinals: Vec<usize> = report.layers.iter().map(|l| l.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(report.layers[0].digest, "sha256:base");
        assert_eq!(report.layer_count, 2);
        assert_eq!(
            report.total_size,
            image.layers().iter().map(|l| l.size()).sum::<u64>()
        );
        assert!(report.layers.iter().all(|l| l.contents.is_none()));
    }

    #[test]
    fn test_single_layer_selection() {
        let image = sample_image();
        let query = LayerQuery {
            only: Some(2),
            scan_contents: false,
        };
        let report = list_layers(&image, &query).unwrap();

        assert_eq!(report.layers.len(), 1);
        assert_eq!(report.layers[0].digest, "sha256:top");
        assert_eq!(report.total_size, image.layers()[1].size());
    }

    #[test]
    fn test_selection_out_of_range() {
        let image = sample_image();
        for ordinal in [0, 3] {
            let query = LayerQuery {
                only: Some(ordinal),
                scan_contents: true,
            };
            assert!(matches!(
                list_layers(&image, &query),
                Err(Error::LayerOutOfRange { available: 2, .. })
            ));
        }
    }

    #[test]
    fn test_scan_contents() {
        let image = sample_image();
        let query = LayerQuery {
            only: None,
            scan_contents: true,
        };
        let report = list_layers(&image, &query).unwrap();

        assert_eq!(
            report.layers[0].contents,
            Some(ContentStats {
                files: 1,
                directories: 1,
                symlinks: 1,
                bytes: 8,
                ..Default::default()
            })
        );
        assert_eq!(
            report.layers[1].contents,
            Some(ContentStats {
                files: 2,
                whiteouts: 1,
                bytes: 1000,
                ..Default::default()
            })
        );
    }
}
