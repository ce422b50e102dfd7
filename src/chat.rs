//! Follow-up conversation about a finished run.
//!
//! A [`StudyContext`] is what `dive --json` writes: the pipeline report and the
//! study plan. A [`StudySession`] puts that context into the system prompt and
//! keeps the turns of one conversation, opening with a greeting from the tutor.

use crate::config::Prompts;
use crate::error::{RabbitholeError, Result};
use crate::llm::{ChatMessage, ChatModel};
use crate::pipeline::PipelineReport;
use crate::planner::{format_document, StudyPlan};
use crate::retry::{with_retry, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A finished run: every document's outcome and the plan built from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyContext {
    pub report: PipelineReport,
    pub plan: Option<StudyPlan>,
}

impl StudyContext {
    /// Load a context saved by `dive --json`.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Plain-text rendering for the tutor's system prompt.
    pub fn describe(&self) -> String {
        let mut text = String::from("Documents:\n\n");
        for result in self.report.succeeded() {
            text.push_str(&format_document(
                result.document_id.as_str(),
                &result.summary,
                &result.keywords,
            ));
        }

        let Some(plan) = &self.plan else {
            return text;
        };

        text.push_str("Study plan:\n");
        for entry in &plan.entries {
            text.push_str(&format!("\n{}\n", entry.document));
            for (title, items) in [
                ("Background concepts", &entry.background_concepts),
                ("Key concepts", &entry.key_concepts),
                ("Further reading", &entry.further_reading),
            ] {
                if !items.is_empty() {
                    text.push_str(&format!("  {}: {}\n", title, items.join(", ")));
                }
            }
        }
        text
    }
}

/// One conversation with the tutor.
pub struct StudySession {
    chat: Arc<dyn ChatModel>,
    system: String,
    history: Vec<ChatMessage>,
    retry: RetryPolicy,
}

impl StudySession {
    pub fn new(chat: Arc<dyn ChatModel>, prompts: &Prompts, context: &StudyContext) -> Self {
        let vars = HashMap::from([("context".to_string(), context.describe())]);
        Self {
            chat,
            system: prompts.render_with_custom(&prompts.chat.system, &vars),
            history: vec![ChatMessage::assistant(prompts.chat.greeting.clone())],
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The tutor's opening line.
    pub fn greeting(&self) -> &str {
        self.history
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Ask a question. A failed call leaves the conversation as it was.
    #[instrument(skip(self, question), fields(turns = self.history.len()))]
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RabbitholeError::InvalidInput("empty question".to_string()));
        }

        self.history.push(ChatMessage::user(question));
        let answer = with_retry(&self.retry, "chat", || {
            self.chat.converse(&self.system, &self.history)
        })
        .await;

        match answer {
            Ok(answer) => {
                debug!("Tutor answered with {} chars", answer.len());
                self.history.push(ChatMessage::assistant(answer.clone()));
                Ok(answer)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    /// Forget every turn after the greeting.
    pub fn clear(&mut self) {
        self.history.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::media::DocumentId;
    use crate::pipeline::{DocumentOutcome, DocumentResult, JobFailure, JobState};
    use crate::planner::PlanEntry;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records what it was sent; fails when the question mentions "offline".
    #[derive(Default)]
    struct ScriptedModel {
        seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            unreachable!("sessions converse")
        }

        async fn converse(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), history.to_vec()));
            let last = &history[history.len() - 1].content;
            if last.contains("offline") {
                return Err(RabbitholeError::InvalidInput("refused".into()));
            }
            Ok(format!("About {}", last))
        }
    }

    fn context() -> StudyContext {
        let osmosis = DocumentId::from("osmosis.pdf");
        let broken = DocumentId::from("scan.png");
        let documents = BTreeMap::from([
            (
                osmosis.clone(),
                DocumentOutcome::Done(DocumentResult {
                    document_id: osmosis,
                    keywords: vec!["Osmosis".into(), "Diffusion".into()],
                    summary: "Water crosses membranes.".into(),
                }),
            ),
            (
                broken,
                DocumentOutcome::Failed(JobFailure::new(
                    &RabbitholeError::ToolNotFound("tesseract".into()),
                    JobState::Normalizing,
                )),
            ),
        ]);

        StudyContext {
            report: PipelineReport::new(chrono::Utc::now(), documents),
            plan: Some(StudyPlan {
                entries: vec![PlanEntry {
                    document: "osmosis.pdf".into(),
                    background_concepts: vec!["Cell membrane".into()],
                    key_concepts: vec!["Osmotic pressure".into()],
                    further_reading: Vec::new(),
                }],
                failures: Vec::new(),
            }),
        }
    }

    fn session(model: Arc<ScriptedModel>) -> StudySession {
        StudySession::new(model, &Prompts::default(), &context())
            .with_retry(RetryPolicy::no_retry(Duration::from_secs(5)))
    }

    #[test]
    fn test_describe_lists_documents_and_plan() {
        let text = context().describe();
        assert!(text.contains("osmosis.pdf\n===========\nWater crosses membranes."));
        assert!(text.contains("Keywords: Osmosis, Diffusion"));
        assert!(text.contains("Key concepts: Osmotic pressure"));
        assert!(!text.contains("Further reading"));
        assert!(!text.contains("scan.png"));
    }

    #[tokio::test]
    async fn test_session_keeps_turns_in_order() {
        let model = Arc::new(ScriptedModel::default());
        let mut session = session(model.clone());
        assert_eq!(session.greeting(), "Hello, I am here to help you learn more efficiently");

        assert_eq!(session.ask("  turgor  ").await.unwrap(), "About turgor");
        session.ask("tonicity").await.unwrap();

        let seen = model.seen.lock().unwrap();
        let (system, history) = &seen[1];
        assert!(system.contains("Osmotic pressure"));
        assert!(!system.contains("{{context}}"));
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant, Role::User]);
        assert_eq!(history[1].content, "turgor");
        assert_eq!(session.history().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_turn_is_rolled_back() {
        let model = Arc::new(ScriptedModel::default());
        let mut session = session(model);

        assert!(session.ask("are you offline?").await.is_err());
        assert_eq!(session.history().len(), 1);

        let err = session.ask("   ").await.unwrap_err();
        assert!(matches!(err, RabbitholeError::InvalidInput(_)));

        session.ask("osmosis").await.unwrap();
        session.clear();
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_saved_context_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let original = context();
        original.save(&path).await.unwrap();

        let loaded = StudyContext::load(&path).await.unwrap();
        assert_eq!(loaded.report.len(), 2);
        assert_eq!(loaded.report.run_id, original.report.run_id);
        assert_eq!(loaded.plan, original.plan);
        let failure = loaded.report.failed().next().unwrap().1;
        assert_eq!(failure.stage, JobState::Normalizing);
    }
}
