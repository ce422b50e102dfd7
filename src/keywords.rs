//! Keyword ranking over reference-index neighbors.
//!
//! Every chunk embedding of a document is matched against the reference index and
//! the titles of its neighbors are scored like terms in TF-IDF, with the chunk
//! playing the role of the "document":
//!
//! - each chunk votes once per distinct label, with term frequency `1/k` for a
//!   chunk holding `k` distinct labels
//! - a label's inverse document frequency is `ln(chunks / chunks_containing_label)`
//!
//! A label found in every chunk therefore scores zero, which keeps generic topics
//! that match everything out of the top of the list.

use crate::config::KeywordSettings;
use crate::error::{RabbitholeError, Result};
use crate::reference::VectorSearch;
use crate::retry::{with_retry, RetryPolicy};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default over-fetch multiplier for neighbor queries.
pub const DEFAULT_OVER_FETCH: usize = 3;

/// A label and its accumulated weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordScore {
    pub label: String,
    pub weight: f64,
}

/// Turns per-chunk embeddings into a weighted top-N keyword list.
pub struct KeywordRanker {
    search: Arc<dyn VectorSearch>,
    over_fetch: usize,
    retry: RetryPolicy,
}

impl KeywordRanker {
    pub fn new(search: Arc<dyn VectorSearch>) -> Self {
        Self {
            search,
            over_fetch: DEFAULT_OVER_FETCH,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_settings(search: Arc<dyn VectorSearch>, settings: &KeywordSettings) -> Self {
        Self::new(search).with_over_fetch(settings.over_fetch_multiplier)
    }

    /// Neighbors requested per chunk, as a multiple of the keyword count.
    pub fn with_over_fetch(mut self, multiplier: usize) -> Self {
        self.over_fetch = multiplier.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The top `n` labels, highest weight first.
    pub async fn rank(&self, embeddings: &[Vec<f32>], n: usize) -> Result<Vec<String>> {
        Ok(self
            .rank_scored(embeddings, n)
            .await?
            .into_iter()
            .map(|score| score.label)
            .collect())
    }

    /// The top `n` labels with their weights.
    ///
    /// Ties keep the order in which labels were first seen, walking chunks in
    /// order and each chunk's neighbors from closest to farthest.
    #[instrument(skip(self, embeddings), fields(chunks = embeddings.len()))]
    pub async fn rank_scored(
        &self,
        embeddings: &[Vec<f32>],
        n: usize,
    ) -> Result<Vec<KeywordScore>> {
        if embeddings.is_empty() {
            return Err(RabbitholeError::InvalidInput(
                "no embeddings to rank".to_string(),
            ));
        }
        if let Some(i) = embeddings.iter().position(|e| e.is_empty()) {
            return Err(RabbitholeError::InvalidInput(format!(
                "embedding {} is empty",
                i
            )));
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let top_k = n.saturating_mul(self.over_fetch);

        let neighbor_sets = try_join_all(embeddings.iter().map(|embedding| {
            with_retry(&self.retry, "vector search", move || {
                self.search.query(embedding, top_k)
            })
        }))
        .await?;

        let label_sets: Vec<Vec<String>> = neighbor_sets
            .into_iter()
            .map(|matches| unique_labels(matches.into_iter().map(|m| m.topic_label)))
            .collect();

        let mut scores = score_labels(&label_sets);
        debug!("Scored {} candidate labels", scores.len());

        scores.truncate(n);
        Ok(scores)
    }
}

/// Distinct non-empty labels in first-seen order.
fn unique_labels(labels: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|label| !label.trim().is_empty())
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

/// Weight every label across chunks, returning all labels sorted by weight.
fn score_labels(label_sets: &[Vec<String>]) -> Vec<KeywordScore> {
    let total_chunks = label_sets.len() as f64;

    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for labels in label_sets {
        for label in labels {
            *document_frequency.entry(label.as_str()).or_insert(0) += 1;
        }
    }

    let mut order: Vec<&str> = Vec::new();
    let mut weights: HashMap<&str, f64> = HashMap::new();

    for labels in label_sets {
        let term_frequency = 1.0 / labels.len().max(1) as f64;
        for label in labels {
            let df = document_frequency[label.as_str()] as f64;
            let weight = weights.entry(label.as_str()).or_insert_with(|| {
                order.push(label.as_str());
                0.0
            });
            *weight += term_frequency * (total_chunks / df).ln();
        }
    }

    let mut scores: Vec<KeywordScore> = order
        .into_iter()
        .map(|label| KeywordScore {
            label: label.to_string(),
            weight: weights[label],
        })
        .collect();

    // Stable sort so equal weights keep first-seen order.
    scores.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    scores
}
