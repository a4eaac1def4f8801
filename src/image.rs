//! Resolved images: ordered layers plus build history

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::io::Read;

use crate::compression;
use crate::{Error, Result};

/// Opens the bytes of one layer blob as stored (possibly compressed).
///
/// Implementations must allow opening the same blob more than once.
pub trait BlobSource: fmt::Debug {
    fn open(&self) -> Result<Box<dyn Read + '_>>;
}

/// Resolves an image reference to an [`Image`].
pub trait ImageSource {
    fn resolve(&mut self, reference: &str) -> Result<Image>;
}

/// One layer blob of a resolved image.
#[derive(Debug)]
pub struct LayerHandle {
    ordinal: usize,
    digest: String,
    size: u64,
    media_type: Option<String>,
    blob: Box<dyn BlobSource>,
}

impl LayerHandle {
    pub fn new(digest: impl Into<String>, size: u64, blob: Box<dyn BlobSource>) -> Self {
        LayerHandle {
            ordinal: 0,
            digest: digest.into(),
            size,
            media_type: None,
            blob,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// 1-based position in the image, assigned by [`Image::new`].
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Compressed size in bytes, as recorded by the image source.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// Open the layer with its compression removed. The stream is closed
    /// when the returned reader is dropped.
    pub fn open_uncompressed(&self) -> Result<Box<dyn Read + '_>> {
        let raw = self.blob.open()?;
        compression::decompress(raw).map_err(|source| Error::DecompressFailed {
            digest: self.digest.clone(),
            source,
        })
    }
}

/// One build step from the image configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryRecord {
    /// Raw instruction; empty when unknown.
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_by: String,
    /// The step produced no filesystem layer.
    #[serde(default, deserialize_with = "null_as_default")]
    pub empty_layer: bool,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A resolved image. Never mutated after resolution.
#[derive(Debug)]
pub struct Image {
    reference: String,
    layers: Vec<LayerHandle>,
    history: Vec<HistoryRecord>,
}

impl Image {
    pub fn new(
        reference: impl Into<String>,
        layers: Vec<LayerHandle>,
        history: Vec<HistoryRecord>,
    ) -> Self {
        let layers = layers
            .into_iter()
            .enumerate()
            .map(|(index, mut layer)| {
                layer.ordinal = index + 1;
                layer
            })
            .collect();

        Image {
            reference: reference.into(),
            layers,
            history,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn layers(&self) -> &[LayerHandle] {
        &self.layers
    }

    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Select a layer by 1-based ordinal.
    pub fn layer(&self, ordinal: usize) -> Result<&LayerHandle> {
        ordinal
            .checked_sub(1)
            .and_then(|index| self.layers.get(index))
            .ok_or(Error::LayerOutOfRange {
                requested: ordinal,
                available: self.layers.len(),
            })
    }
}
