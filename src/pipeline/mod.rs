//! Concurrent per-document processing.
//!
//! Each document runs as its own job through
//! `Normalizing → Embedding → Ranking → Summarizing → Done`; any stage can end the
//! job in `Failed`. Jobs run in parallel and never share mutable state. The
//! [`Orchestrator`] waits for every job and returns a [`PipelineReport`] holding
//! exactly one outcome per input document.

mod orchestrator;

pub use orchestrator::Orchestrator;

use crate::error::{ErrorKind, RabbitholeError};
use crate::media::{DocumentId, TextChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stage of one document's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Normalizing,
    Embedding,
    Ranking,
    Summarizing,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Normalizing => "normalizing",
            JobState::Embedding => "embedding",
            JobState::Ranking => "ranking keywords",
            JobState::Summarizing => "summarizing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A state transition reported while jobs run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub document: DocumentId,
    pub state: JobState,
    /// Set when `state` is [`JobState::Failed`].
    pub error: Option<ErrorKind>,
}

/// Execution context of one document, owned by its job.
#[derive(Debug)]
pub struct PipelineJob {
    pub document_id: DocumentId,
    pub input_chunks: Vec<TextChunk>,
    pub state: JobState,
    pub error: Option<ErrorKind>,
}

impl PipelineJob {
    pub fn new(document_id: DocumentId, mut input_chunks: Vec<TextChunk>) -> Self {
        input_chunks.sort_by_key(|c| c.sequence_index);
        Self {
            document_id,
            input_chunks,
            state: JobState::Pending,
            error: None,
        }
    }

    /// Chunk contents in sequence order.
    pub fn texts(&self) -> Vec<String> {
        self.input_chunks.iter().map(|c| c.content.clone()).collect()
    }
}

/// Keywords and summary of a successfully processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub document_id: DocumentId,
    /// Highest weight first.
    pub keywords: Vec<String>,
    pub summary: String,
}

/// Why a document's job failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Stage the job was in when it failed.
    pub stage: JobState,
}

impl JobFailure {
    pub fn new(error: &RabbitholeError, stage: JobState) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            stage,
        }
    }
}

/// Terminal outcome of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Done(DocumentResult),
    Failed(JobFailure),
}

impl DocumentOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, DocumentOutcome::Done(_))
    }

    pub fn result(&self) -> Option<&DocumentResult> {
        match self {
            DocumentOutcome::Done(result) => Some(result),
            DocumentOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            DocumentOutcome::Done(_) => None,
            DocumentOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Results of one pipeline run, keyed by document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: BTreeMap<DocumentId, DocumentOutcome>,
}

impl PipelineReport {
    pub(crate) fn new(
        started_at: DateTime<Utc>,
        documents: BTreeMap<DocumentId, DocumentOutcome>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            documents,
        }
    }

    pub fn get(&self, document: &DocumentId) -> Option<&DocumentOutcome> {
        self.documents.get(document)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DocumentResult> {
        self.documents.values().filter_map(DocumentOutcome::result)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&DocumentId, &JobFailure)> {
        self.documents
            .iter()
            .filter_map(|(id, outcome)| outcome.failure().map(|f| (id, f)))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_sorts_chunks() {
        let id = DocumentId::from("doc");
        let chunk = |i: usize, text: &str| TextChunk {
            source_document: id.clone(),
            sequence_index: i,
            content: text.to_string(),
        };
        let job = PipelineJob::new(id.clone(), vec![chunk(1, "B"), chunk(0, "A")]);
        assert_eq!(job.texts(), vec!["A", "B"]);
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        let failed = DocumentOutcome::Failed(JobFailure::new(
            &RabbitholeError::UnsupportedMediaKind(".xyz".into()),
            JobState::Normalizing,
        ));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "unsupported_media_kind");
        assert_eq!(json["stage"], "normalizing");
    }
}
