//! Reference command - manage the topic index.

use crate::cli::{Output, ReferenceAction};
use crate::cli::output::format_size;
use crate::config::Settings;
use crate::reference::{import_jsonl, ReferenceIndex};
use anyhow::Result;

/// Run the reference command.
pub async fn run_reference(action: &ReferenceAction, settings: Settings) -> Result<()> {
    let index = ReferenceIndex::open(&settings)?;

    match action {
        ReferenceAction::Import { file, batch_size } => {
            if matches!(index, ReferenceIndex::Memory(_)) {
                Output::warning("The memory provider keeps nothing after this command exits.");
            }

            let spinner = Output::spinner(&format!("Importing {}...", file.display()));
            let progress = spinner.clone();
            let store = index.store();

            let summary = import_jsonl(file, store.as_ref(), *batch_size, move |done| {
                progress.set_message(format!("Imported {} topics", done));
            })
            .await?;

            spinner.finish_and_clear();
            Output::success(&format!(
                "Imported {} topics ({} dimensions)",
                summary.imported, summary.dimensions
            ));
            if summary.dimensions as u32 != settings.embedding.dimensions {
                Output::warning(&format!(
                    "Embedding dimensions in config are {}; set embedding.dimensions = {} to match",
                    settings.embedding.dimensions, summary.dimensions
                ));
            }
        }

        ReferenceAction::Stats => {
            let count = index.store().count().await?;
            Output::header("Reference index");
            Output::kv("Provider", &settings.reference.provider.to_string());
            Output::kv("Topics", &count.to_string());

            if let ReferenceIndex::Sqlite(sqlite) = &index {
                let path = settings.reference_path();
                let size = std::fs::metadata(&path)
                    .map(|m| format_size(m.len()))
                    .unwrap_or_else(|_| "unknown size".to_string());
                Output::kv("Location", &format!("{} ({})", path.display(), size));
                if let Some(at) = sqlite.last_import()? {
                    Output::kv("Last import", &at.format("%Y-%m-%d %H:%M UTC").to_string());
                }
            }
        }
    }

    Ok(())
}
