//! Document summarization.
//!
//! [`LlmSummarizer`] runs a map-reduce over the leading chunks of a document: each
//! chunk is summarised on its own (concurrently), then the partial summaries are
//! combined, in chunk order, by one more completion.

use crate::config::{Prompts, SummarizationSettings};
use crate::error::{RabbitholeError, Result};
use crate::llm::ChatModel;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default number of leading chunks fed into a summary.
pub const DEFAULT_MAX_CHUNKS: usize = 3;

/// Produces one summary from an ordered list of chunks.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, chunks: &[String]) -> Result<String>;
}

/// Map-reduce summarizer backed by a chat model.
pub struct LlmSummarizer {
    chat: Arc<dyn ChatModel>,
    prompts: Prompts,
    max_chunks: usize,
}

impl LlmSummarizer {
    pub fn new(chat: Arc<dyn ChatModel>, prompts: Prompts) -> Self {
        Self {
            chat,
            prompts,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }

    pub fn from_settings(
        chat: Arc<dyn ChatModel>,
        prompts: Prompts,
        settings: &SummarizationSettings,
    ) -> Self {
        Self::new(chat, prompts).with_max_chunks(settings.max_chunks)
    }

    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks.max(1);
        self
    }

    async fn summarize_chunk(&self, text: &str) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("text".to_string(), text.to_string());
        let prompt = self.prompts.render_with_custom(&self.prompts.summarize.map, &vars);
        let summary = self.chat.complete(&self.prompts.summarize.system, &prompt).await?;
        Ok(summary.trim().to_string())
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    async fn summarize(&self, chunks: &[String]) -> Result<String> {
        let selected: Vec<&String> = chunks
            .iter()
            .filter(|c| !c.trim().is_empty())
            .take(self.max_chunks)
            .collect();

        if selected.is_empty() {
            return Err(RabbitholeError::InvalidInput("nothing to summarize".to_string()));
        }

        let partials =
            try_join_all(selected.iter().map(|chunk| self.summarize_chunk(chunk))).await?;
        if partials.len() == 1 {
            return Ok(partials.into_iter().next().unwrap_or_default());
        }

        debug!("Combining {} partial summaries", partials.len());

        let mut vars = HashMap::new();
        vars.insert("summaries".to_string(), partials.join("\n\n"));
        let prompt = self.prompts.render_with_custom(&self.prompts.summarize.combine, &vars);
        let summary = self.chat.complete(&self.prompts.summarize.system, &prompt).await?;

        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Echoes the last line of the prompt body so call order is observable.
    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            if user.contains("Combine") {
                Ok("combined".to_string())
            } else {
                let body = user.lines().find(|l| l.starts_with("chunk")).unwrap_or("");
                Ok(format!(" summary of {} ", body))
            }
        }
    }

    fn chunks(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk{}", i)).collect()
    }

    #[tokio::test]
    async fn test_map_reduce_uses_leading_chunks() {
        let chat = Arc::new(RecordingChat::default());
        let summarizer = LlmSummarizer::new(chat.clone(), Prompts::default());

        let summary = summarizer.summarize(&chunks(5)).await.unwrap();
        assert_eq!(summary, "combined");

        let prompts = chat.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 4);
        let combine = prompts.last().unwrap();
        let first = combine.find("summary of chunk0").unwrap();
        let second = combine.find("summary of chunk1").unwrap();
        let third = combine.find("summary of chunk2").unwrap();
        assert!(first < second && second < third);
        assert!(!combine.contains("chunk3"));
    }

    #[tokio::test]
    async fn test_single_chunk_skips_combine() {
        let chat = Arc::new(RecordingChat::default());
        let summarizer = LlmSummarizer::new(chat.clone(), Prompts::default());

        let summary = summarizer.summarize(&chunks(1)).await.unwrap();
        assert_eq!(summary, "summary of chunk0");
        assert_eq!(chat.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_is_invalid() {
        let summarizer = LlmSummarizer::new(Arc::new(RecordingChat::default()), Prompts::default());
        let err = summarizer.summarize(&["  ".to_string()]).await.unwrap_err();
        assert!(matches!(err, RabbitholeError::InvalidInput(_)));
    }
}
