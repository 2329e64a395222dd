//! Image build history annotated with layer sizes.

mod enrich;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::manifest::Layer;
use crate::shell::ShellFormatError;

pub use enrich::{EnrichOptions, enrich};

/// One build step, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// How long ago the step ran, e.g. "3 months".
    pub created: String,
    pub created_by: String,
    pub empty_layer: bool,
    /// Human-readable size of the layer this step produced, `0B` for steps
    /// that only touched metadata.
    pub layer_size: String,
    pub format_error: Option<ShellFormatError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHistory {
    /// Oldest first.
    pub entries: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    /// `created_at` relative to the same instant the entries were humanized
    /// against.
    pub last_pushed: String,
}

impl ImageHistory {
    pub fn data_layers(&self) -> usize {
        self.entries.iter().filter(|e| !e.empty_layer).count()
    }

    pub fn empty_layers(&self) -> usize {
        self.entries.iter().filter(|e| e.empty_layer).count()
    }
}

/// Pair every record with the layer it produced.
///
/// Records for which `is_empty` holds get `None` and consume nothing; every
/// other record takes the next layer in order. The two sequences share no key,
/// so any difference between the number of non-empty records and the number
/// of layers is reported rather than papered over.
pub fn correlate<'a, T>(
    records: &'a [T],
    layers: &[Layer],
    is_empty: impl Fn(&T) -> bool,
) -> Result<Vec<(&'a T, Option<Layer>)>> {
    let expected = records.iter().filter(|r| !is_empty(*r)).count();
    let mismatch = || Error::LayerCountMismatch {
        expected,
        actual: layers.len(),
    };

    let mut next = layers.iter();
    let mut merged = Vec::with_capacity(records.len());
    for record in records {
        if is_empty(record) {
            merged.push((record, None));
        } else {
            let layer = next.next().ok_or_else(mismatch)?;
            merged.push((record, Some(*layer)));
        }
    }
    if next.next().is_some() {
        return Err(mismatch());
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(sizes: &[u64]) -> Vec<Layer> {
        sizes.iter().map(|&size| Layer { size }).collect()
    }

    #[test]
    fn empty_records_skip_layers() {
        let records = [false, true, false];
        let merged = correlate(&records, &layers(&[100, 250]), |&empty| empty).unwrap();
        let sizes: Vec<Option<u64>> = merged.iter().map(|(_, l)| l.map(|l| l.size)).collect();
        assert_eq!(sizes, vec![Some(100), None, Some(250)]);
    }

    #[test]
    fn too_few_layers_is_a_mismatch() {
        let records = [false, false, false];
        match correlate(&records, &layers(&[1, 2]), |&empty| empty) {
            Err(Error::LayerCountMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn surplus_layers_is_a_mismatch() {
        let records = [false, true];
        match correlate(&records, &layers(&[1, 2]), |&empty| empty) {
            Err(Error::LayerCountMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (1, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn all_empty_history_needs_no_layers() {
        let records = [true, true];
        let merged = correlate(&records, &[], |&empty| empty).unwrap();
        assert!(merged.iter().all(|(_, l)| l.is_none()));
    }
}
