//! Inspect OCI/Docker images layer by layer without running them: list the
//! layers, replay the build history against them, browse one layer's files
//! and stream a single file out of a layer.

pub mod archive;
pub mod compression;
pub mod error;
pub mod explore;
pub mod extract;
pub mod history;
pub mod image;
pub mod layers;
pub mod paths;
pub mod prettify;
pub mod render;
pub mod source;
pub mod theme;
pub mod whiteout;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use explore::{explore_filesystem, LayerListing};
pub use extract::{cat_file, CatOptions, MatchPolicy};
pub use history::{reconcile, HistoryReport};
pub use image::{BlobSource, HistoryRecord, Image, ImageSource, LayerHandle};
pub use layers::{list_layers, LayerQuery, LayerReport};
pub use source::{open_source, SourceOptions};
