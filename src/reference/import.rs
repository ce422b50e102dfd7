//! Bulk import of an embedded reference collection.
//!
//! The input is JSON lines, one topic per line:
//!
//! ```text
//! {"id": "12", "title": "Anarchism", "url": "https://en.wikipedia.org/wiki/Anarchism", "emb": [0.01, ...]}
//! ```

use super::{ReferenceItem, ReferenceStore};
use crate::error::{RabbitholeError, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, instrument};

/// Topics written per insert when no batch size is given.
pub const DEFAULT_IMPORT_BATCH: usize = 10_000;

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// Blank lines skipped.
    pub skipped: usize,
    pub dimensions: usize,
}

/// Replace the contents of `store` with the topics in the JSONL file at `path`.
///
/// `on_progress` receives the running total after every batch. Every embedding
/// must have the same length as the first one.
#[instrument(skip(store, on_progress))]
pub async fn import_jsonl<F>(
    path: &Path,
    store: &dyn ReferenceStore,
    batch_size: usize,
    mut on_progress: F,
) -> Result<ImportSummary>
where
    F: FnMut(usize) + Send,
{
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    store.clear().await?;

    let batch_size = batch_size.max(1);
    let mut batch: Vec<ReferenceItem> = Vec::with_capacity(batch_size.min(DEFAULT_IMPORT_BATCH));
    let mut summary = ImportSummary {
        imported: 0,
        skipped: 0,
        dimensions: 0,
    };
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            summary.skipped += 1;
            continue;
        }

        let item: ReferenceItem = serde_json::from_str(line).map_err(|e| {
            RabbitholeError::ReferenceIndex(format!("line {}: {}", line_number, e))
        })?;

        if summary.dimensions == 0 {
            summary.dimensions = item.embedding.len();
        }
        if item.embedding.is_empty() || item.embedding.len() != summary.dimensions {
            return Err(RabbitholeError::ReferenceIndex(format!(
                "line {}: embedding has {} dimensions, expected {}",
                line_number,
                item.embedding.len(),
                summary.dimensions
            )));
        }

        batch.push(item);
        if batch.len() >= batch_size {
            summary.imported += store.insert_batch(&batch).await?;
            batch.clear();
            on_progress(summary.imported);
        }
    }

    if !batch.is_empty() {
        summary.imported += store.insert_batch(&batch).await?;
        on_progress(summary.imported);
    }

    info!(
        "Imported {} topics ({} dimensions) from {:?}",
        summary.imported, summary.dimensions, path
    );
    Ok(summary)
}
