//! Cross-document study plan.
//!
//! The keywords and summaries of every finished document are handed to a chat
//! model in one request, which answers with a JSON plan. The answer is parsed into
//! a typed [`StudyPlan`]; documents that failed earlier in the pipeline are listed
//! in [`StudyPlan::failures`] so none disappear from the output.

use crate::config::Prompts;
use crate::error::{RabbitholeError, Result};
use crate::llm::ChatModel;
use crate::pipeline::PipelineReport;
use crate::retry::{with_retry, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Study advice for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub document: String,
    pub background_concepts: Vec<String>,
    pub key_concepts: Vec<String>,
    pub further_reading: Vec<String>,
}

/// A document left out of the plan because its job failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFailure {
    pub document: String,
    pub reason: String,
}

/// The aggregated plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub entries: Vec<PlanEntry>,
    pub failures: Vec<PlanFailure>,
}

/// Builds a [`StudyPlan`] from a finished pipeline run.
pub struct PlanAggregator {
    chat: Arc<dyn ChatModel>,
    prompts: Prompts,
    retry: RetryPolicy,
}

impl PlanAggregator {
    pub fn new(chat: Arc<dyn ChatModel>, prompts: Prompts) -> Self {
        Self {
            chat,
            prompts,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate the plan. Makes no model call when no document succeeded.
    #[instrument(skip(self, report), fields(documents = report.len()))]
    pub async fn generate(&self, report: &PipelineReport) -> Result<StudyPlan> {
        let failures = report
            .failed()
            .map(|(id, failure)| PlanFailure {
                document: id.to_string(),
                reason: failure.message.clone(),
            })
            .collect();

        let documents: String = report
            .succeeded()
            .map(|r| format_document(r.document_id.as_str(), &r.summary, &r.keywords))
            .collect();

        if documents.is_empty() {
            info!("No finished documents, skipping plan generation");
            return Ok(StudyPlan {
                entries: Vec::new(),
                failures,
            });
        }

        let mut vars = HashMap::new();
        vars.insert("documents".to_string(), documents);
        let prompt = self.prompts.render_with_custom(&self.prompts.planner.user, &vars);

        let answer = with_retry(&self.retry, "planner", || {
            self.chat.complete(&self.prompts.planner.system, &prompt)
        })
        .await?;
        debug!("Planner answered with {} chars", answer.len());

        Ok(StudyPlan {
            entries: parse_plan(&answer)?,
            failures,
        })
    }
}

/// Render one document as `name`, an underline, the summary and its keywords.
pub fn format_document(name: &str, summary: &str, keywords: &[String]) -> String {
    format!(
        "{}\n{}\n{}\nKeywords: {}\n\n",
        name,
        "=".repeat(name.chars().count()),
        summary,
        keywords.join(", ")
    )
}

/// Parse the model's answer, reading the JSON between the first `{` and the last `}`.
pub fn parse_plan(answer: &str) -> Result<Vec<PlanEntry>> {
    let (Some(start), Some(end)) = (answer.find('{'), answer.rfind('}')) else {
        return Err(RabbitholeError::Planner("answer contains no JSON object".to_string()));
    };
    if end < start {
        return Err(RabbitholeError::Planner("answer contains no JSON object".to_string()));
    }

    let value: Value = serde_json::from_str(&answer[start..=end])
        .map_err(|e| RabbitholeError::Planner(format!("malformed plan JSON: {}", e)))?;

    let plan = value
        .as_object()
        .and_then(|root| lookup(root, "plan"))
        .ok_or_else(|| RabbitholeError::Planner("answer has no \"plan\" key".to_string()))?;

    let mut entries = Vec::new();
    match plan {
        Value::Array(items) => {
            for item in items {
                if let Value::Object(documents) = item {
                    for (name, sections) in documents {
                        entries.push(entry(name, sections));
                    }
                }
            }
        }
        Value::Object(documents) => {
            for (name, sections) in documents {
                entries.push(entry(name, sections));
            }
        }
        _ => return Err(RabbitholeError::Planner("\"plan\" is not a list".to_string())),
    }

    Ok(entries)
}

fn entry(document: &str, sections: &Value) -> PlanEntry {
    let Value::Object(sections) = sections else {
        return PlanEntry {
            document: document.to_string(),
            ..PlanEntry::default()
        };
    };

    PlanEntry {
        document: document.to_string(),
        background_concepts: section(sections, "background concepts"),
        key_concepts: section(sections, "key concepts"),
        further_reading: section(sections, "further reading"),
    }
}

/// Case- and whitespace-insensitive key lookup.
fn lookup<'a>(object: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let wanted = normalize(key);
    object
        .iter()
        .find(|(k, _)| normalize(k) == wanted)
        .map(|(_, v)| v)
}

fn section(sections: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    lookup(sections, key).map(strings).unwrap_or_default()
}

fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
