//! Build history replayed against the image's real layers

use tracing::warn;

use crate::image::Image;
use crate::prettify::prettify_command;

/// The layer a history step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDetail {
    pub ordinal: usize,
    pub digest: String,
    pub size: u64,
}

/// One build step, in build order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStep {
    /// 1-based position in the history.
    pub ordinal: usize,
    pub produced_layer: bool,
    /// Prettified instruction; empty when the image does not record one.
    pub command: String,
    pub created: Option<String>,
    /// Present only for steps that produced a layer and could be matched.
    pub layer: Option<LayerDetail>,
}

/// The history claims a different number of layers than the image has.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("history lists {history_layers} layer-producing steps but the image has {real_layers} layers")]
pub struct ReconciliationMismatch {
    pub history_layers: usize,
    pub real_layers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryReport {
    pub steps: Vec<HistoryStep>,
    /// Compressed size of the layers that were matched to a step.
    pub total_size: u64,
    pub mismatch: Option<ReconciliationMismatch>,
}

/// Pair each history record with the layer it produced.
///
/// Records flagged as empty layers do not consume a layer. When the history
/// announces more layers than exist, the surplus steps carry no layer detail
/// and the report's `mismatch` says so.
pub fn reconcile(image: &Image) -> HistoryReport {
    let layers = image.layers();
    let mut cursor = 0;
    let mut total_size = 0;
    let mut steps = Vec::with_capacity(image.history().len());

    for (index, record) in image.history().iter().enumerate() {
        let produced_layer = !record.empty_layer;

        let layer = if produced_layer {
            let detail = layers.get(cursor).map(|layer| {
                total_size += layer.size();
                LayerDetail {
                    ordinal: layer.ordinal(),
                    digest: layer.digest().to_string(),
                    size: layer.size(),
                }
            });
            cursor += 1;
            detail
        } else {
            None
        };

        steps.push(HistoryStep {
            ordinal: index + 1,
            produced_layer,
            command: prettify_command(&record.created_by),
            created: record.created.clone(),
            layer,
        });
    }

    let mismatch = (cursor != layers.len()).then(|| ReconciliationMismatch {
        history_layers: cursor,
        real_layers: layers.len(),
    });
    if let Some(mismatch) = &mismatch {
        warn!(image = image.reference(), "{}", mismatch);
    }

    HistoryReport {
        steps,
        total_size,
        mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, step};

    fn layer(digest: &str, size: usize) -> crate::image::LayerHandle {
        testing::layer(digest, vec![0; size])
    }

    #[test]
    fn test_empty_layers_do_not_consume() {
        let image = testing::image(
            vec![layer("sha256:one", 100), layer("sha256:two", 50)],
            vec![
                step("/bin/sh -c #(nop) ADD file:abc in /", false),
                step("/bin/sh -c #(nop)  ENV PATH=/usr/bin", true),
                step("/bin/sh -c apk add curl", false),
            ],
        );

        let report = reconcile(&image);

        assert_eq!(report.steps.len(), 3);
        assert!(report.steps[0].produced_layer);
        assert_eq!(report.steps[0].layer.as_ref().unwrap().digest, "sha256:one");
        assert!(!report.steps[1].produced_layer);
        assert_eq!(report.steps[1].layer, None);
        assert_eq!(report.steps[1].command, "ENV PATH=/usr/bin");
        let third = report.steps[2].layer.as_ref().unwrap();
        assert_eq!(third.digest, "sha256:two");
        assert_eq!(third.ordinal, 2);
        assert_eq!(report.steps[2].command, "apk add curl");
        assert_eq!(report.total_size, 150);
        assert_eq!(report.mismatch, None);
    }

    #[test]
    fn test_fewer_layers_than_history() {
        let image = testing::image(
            vec![layer("sha256:only", 10)],
            vec![step("ADD a", false), step("RUN b", false), step("CMD c", true)],
        );

        let report = reconcile(&image);

        assert!(report.steps[0].layer.is_some());
        assert!(report.steps[1].produced_layer);
        assert_eq!(report.steps[1].layer, None);
        assert_eq!(report.total_size, 10);
        assert_eq!(
            report.mismatch,
            Some(ReconciliationMismatch {
                history_layers: 2,
                real_layers: 1
            })
        );
    }

    #[test]
    fn test_more_layers_than_history() {
        let image = testing::image(
            vec![layer("sha256:a", 1), layer("sha256:b", 2)],
            vec![step("ADD a", false)],
        );

        let report = reconcile(&image);

        assert_eq!(report.total_size, 1);
        assert_eq!(
            report.mismatch,
            Some(ReconciliationMismatch {
                history_layers: 1,
                real_layers: 2
            })
        );
    }

    #[test]
    fn test_missing_command_stays_empty() {
        let image = testing::image(vec![], vec![step("", true)]);
        let report = reconcile(&image);
        assert_eq!(report.steps[0].command, "");
        assert_eq!(report.steps[0].ordinal, 1);
        assert_eq!(report.mismatch, None);
    }
}
