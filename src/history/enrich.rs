use chrono::{DateTime, Utc};
use tracing::debug;

use super::{HistoryEntry, ImageHistory, correlate};
use crate::error::{Error, Result};
use crate::manifest::{HistoryRecord, ImageConfig, PlatformManifest};
use crate::shell;
use crate::units::{ZERO_SIZE, bytes_size, time_ago};

#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    /// Reprint shell commands canonically.
    pub format_shell: bool,
    /// Reference instant for every relative duration in one report.
    pub now: DateTime<Utc>,
}

impl EnrichOptions {
    pub fn new(format_shell: bool) -> Self {
        Self {
            format_shell,
            now: Utc::now(),
        }
    }
}

/// Merge the config's history with the platform manifest's layer sizes.
///
/// Fails on the first unparsable timestamp, checked before anything else,
/// or when the history and layer counts disagree. Shell commands that do not
/// parse are not failures; the entry keeps its text and records the error.
pub fn enrich(
    config: &ImageConfig,
    manifest: &PlatformManifest,
    opts: &EnrichOptions,
) -> Result<ImageHistory> {
    let created = config
        .history
        .iter()
        .map(|record| parse_timestamp(record.created.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let merged = correlate(&config.history, &manifest.layers, |r| r.empty_layer)?;
    debug!(
        entries = merged.len(),
        layers = manifest.layers.len(),
        "correlated history with layers"
    );

    let entries = merged
        .into_iter()
        .zip(created)
        .map(|((record, layer), created)| {
            let mut entry = HistoryEntry {
                created: time_ago(created, opts.now),
                created_by: record.created_by.clone(),
                empty_layer: record.empty_layer,
                layer_size: layer.map_or_else(|| ZERO_SIZE.to_string(), |l| bytes_size(l.size)),
                format_error: None,
            };
            if opts.format_shell {
                normalize_into(&mut entry, record);
            }
            entry
        })
        .collect();

    let created_at = parse_timestamp(config.created.as_deref())?;
    Ok(ImageHistory {
        entries,
        created_at,
        last_pushed: time_ago(created_at, opts.now),
    })
}

fn normalize_into(entry: &mut HistoryEntry, record: &HistoryRecord) {
    if shell::is_metadata_only(&record.created_by) {
        return;
    }
    let normalized = shell::normalize(&record.created_by);
    entry.created_by = normalized.text;
    entry.format_error = normalized.error;
}

/// RFC 3339 timestamp; a missing value is as malformed as a bad one.
fn parse_timestamp(value: Option<&str>) -> Result<DateTime<Utc>> {
    let value = value.unwrap_or_default();
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| Error::TimestampParse {
            value: value.to_string(),
            source,
        })
}
