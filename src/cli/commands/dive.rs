//! Dive command - process files and build a study plan.

use crate::chat::StudyContext;
use crate::cli::preflight::{self, Requirements};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::llm::OpenAIChat;
use crate::media::Upload;
use crate::pipeline::{JobState, Orchestrator, PipelineReport};
use crate::planner::{PlanAggregator, StudyPlan};
use crate::reference::ReferenceIndex;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Run the dive command.
pub async fn run_dive(
    files: &[PathBuf],
    keywords: Option<usize>,
    no_plan: bool,
    json: Option<&PathBuf>,
    settings: Settings,
) -> Result<()> {
    let names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string())
        .collect();
    preflight::check(Requirements::for_files(names.iter().map(String::as_str)))?;

    let mut uploads = Vec::with_capacity(files.len());
    for file in files {
        let upload = Upload::from_path(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        uploads.push(upload);
    }

    let index = ReferenceIndex::open(&settings)?;
    if index.store().count().await? == 0 {
        Output::warning("The reference index is empty; documents will get no keywords.");
        Output::info("Import topics with: rabbithole reference import <file.jsonl>");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut orchestrator = Orchestrator::from_settings(&settings, index.search())?.with_events(tx);
    if let Some(count) = keywords {
        orchestrator = orchestrator.with_keyword_count(count);
    }

    let pb = Output::progress_bar(uploads.len() as u64, "Processing documents");
    let progress = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if event.state.is_terminal() {
                    pb.inc(1);
                }
                if event.state != JobState::Pending {
                    pb.set_message(format!("{}: {}", event.document, event.state));
                }
            }
        })
    };

    let report = orchestrator.process_uploads(uploads).await;
    drop(orchestrator);
    let _ = progress.await;
    pb.finish_and_clear();

    Output::header("Documents");
    for (id, outcome) in &report.documents {
        match outcome.result() {
            Some(result) => Output::document_result(result),
            None => {
                if let Some(failure) = outcome.failure() {
                    Output::document_failure(id.as_str(), failure);
                }
            }
        }
    }

    let succeeded = report.succeeded().count();
    let failed = report.len() - succeeded;
    println!();
    if failed == 0 {
        Output::success(&format!("Processed {} document(s)", succeeded));
    } else {
        Output::warning(&format!("{} processed, {} failed", succeeded, failed));
    }

    let plan = if no_plan {
        None
    } else {
        generate_plan(&report, &settings).await
    };

    if let Some(path) = json {
        StudyContext { report, plan }
            .save(path)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Output::info(&format!("Wrote results to {}", path.display()));
        Output::info(&format!(
            "Ask follow-up questions with: rabbithole chat {}",
            path.display()
        ));
    }

    Ok(())
}

/// Generate and print the plan. Failures are reported, not returned, so the
/// per-document results above are never lost.
async fn generate_plan(report: &PipelineReport, settings: &Settings) -> Option<StudyPlan> {
    let spinner = Output::spinner("Drafting study plan...");

    let result = build_plan(report, settings).await;
    spinner.finish_and_clear();

    match result {
        Ok(plan) => {
            Output::header("Study plan");
            Output::plan(&plan);
            Some(plan)
        }
        Err(e) => {
            Output::error(&format!("Could not generate a study plan: {}", e));
            None
        }
    }
}

async fn build_plan(
    report: &PipelineReport,
    settings: &Settings,
) -> crate::error::Result<StudyPlan> {
    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let chat = OpenAIChat::new(&settings.planner.model, settings.planner.temperature)?;
    PlanAggregator::new(Arc::new(chat), prompts)
        .with_retry(RetryPolicy::from(&settings.pipeline))
        .generate(report)
        .await
}
