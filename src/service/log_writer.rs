//! A [`SeriesWriter`] that logs samples instead of sending them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backend::prometheus::{SeriesWriter, is_stale_nan};
use crate::domain::labels::labels_to_string;
use crate::domain::{FieldValues, Frame, Labels};
use crate::error::HistorianError;

/// Emits every sample as a `debug` event and the batch size at `info`.
///
/// Used by the standalone binary, which has no remote-write datasource.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSeriesWriter;

#[async_trait]
impl SeriesWriter for LogSeriesWriter {
    async fn write_datasource(
        &self,
        datasource_uid: &str,
        metric_name: &str,
        now: DateTime<Utc>,
        frames: Vec<Frame>,
        org_id: i64,
        extra_labels: &Labels,
    ) -> Result<(), HistorianError> {
        let mut series = 0usize;
        for frame in &frames {
            for field in &frame.fields {
                let (FieldValues::Float(values), Some(labels)) = (&field.values, &field.labels)
                else {
                    continue;
                };
                let mut labels = labels.clone();
                labels.extend(extra_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
                for value in values {
                    series += 1;
                    tracing::debug!(
                        datasource_uid,
                        metric = metric_name,
                        org_id,
                        labels = %labels_to_string(&labels),
                        stale = is_stale_nan(*value),
                        value,
                        "series sample"
                    );
                }
            }
        }
        tracing::info!(
            datasource_uid,
            metric = metric_name,
            org_id,
            frames = frames.len(),
            series,
            at = %now,
            "wrote alert state series"
        );
        Ok(())
    }
}
