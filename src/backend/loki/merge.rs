//! K-way merge of Loki result streams into one time-ordered frame.

use std::collections::HashSet;

use serde_json::value::RawValue;

use super::client::Stream;
use super::entry::FOLDER_UID_LABEL;
use crate::domain::{Field, FieldValues, Frame};

/// Name of the merged frame.
pub const FRAME_NAME: &str = "states";
/// Timestamp column.
pub const TIME_FIELD: &str = "time";
/// Raw JSON line column.
pub const LINE_FIELD: &str = "line";
/// JSON encoded stream labels column.
pub const LABELS_FIELD: &str = "labels";

/// Merges streams, each sorted by time, into one frame sorted by time.
///
/// If `folder_uids` is given, streams whose `folderUID` label is not in the
/// set are skipped. Lines that are not valid JSON are logged and dropped.
/// Ties keep the order of the input streams.
#[must_use]
pub fn merge(streams: &[Stream], folder_uids: Option<&[String]>) -> Frame {
    let allowed = folder_uids.map(|uids| uids.iter().map(String::as_str).collect::<HashSet<_>>());

    let mut sources = Vec::with_capacity(streams.len());
    for stream in streams {
        if let Some(allowed) = &allowed {
            let folder = stream.stream.get(FOLDER_UID_LABEL).map(String::as_str);
            if !folder.is_some_and(|uid| allowed.contains(uid)) {
                continue;
            }
        }
        let labels = match serde_json::value::to_raw_value(&stream.stream) {
            Ok(labels) => labels,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode stream labels, skipping stream");
                continue;
            }
        };
        sources.push((stream, labels));
    }

    let total = sources.iter().map(|(s, _)| s.values.len()).sum();
    let mut times = Vec::with_capacity(total);
    let mut lines: Vec<Box<RawValue>> = Vec::with_capacity(total);
    let mut labels: Vec<Box<RawValue>> = Vec::with_capacity(total);

    let mut cursors = vec![0usize; sources.len()];
    loop {
        let mut next: Option<(usize, chrono::DateTime<chrono::Utc>)> = None;
        for (i, (stream, _)) in sources.iter().enumerate() {
            let Some(sample) = cursors.get(i).and_then(|c| stream.values.get(*c)) else {
                continue;
            };
            if next.is_none_or(|(_, t)| sample.t < t) {
                next = Some((i, sample.t));
            }
        }
        let Some((i, _)) = next else {
            break;
        };
        let (Some(cursor), Some((stream, stream_labels))) = (cursors.get_mut(i), sources.get(i))
        else {
            break;
        };
        let Some(sample) = stream.values.get(*cursor) else {
            break;
        };
        *cursor += 1;

        match serde_json::from_str::<Box<RawValue>>(&sample.v) {
            Ok(line) => {
                times.push(sample.t);
                lines.push(line);
                labels.push(stream_labels.clone());
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode a state history entry, skipping");
            }
        }
    }

    Frame::new(
        FRAME_NAME,
        vec![
            Field::new(TIME_FIELD, FieldValues::Time(times)),
            Field::new(LINE_FIELD, FieldValues::Json(lines)),
            Field::new(LABELS_FIELD, FieldValues::Json(labels)),
        ],
    )
}
