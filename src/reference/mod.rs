//! Reference topic index.
//!
//! The keyword ranker treats the titles of a large reference collection (one
//! embedded article per topic) as a vocabulary: each chunk embedding is matched
//! against the collection and the titles of its nearest neighbors become candidate
//! keywords.

mod import;
mod memory;
mod sqlite;

pub use import::{import_jsonl, ImportSummary, DEFAULT_IMPORT_BATCH};
pub use memory::MemoryReferenceIndex;
pub use sqlite::SqliteReferenceIndex;

use crate::config::{ReferenceProvider, Settings};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One embedded reference topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub id: String,
    /// Used as the topic label.
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(alias = "emb")]
    pub embedding: Vec<f32>,
}

/// A neighbor returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborMatch {
    pub topic_label: String,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

/// Nearest-neighbor lookup over the reference index.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `top_k` neighbors of `embedding`, most similar first.
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<NeighborMatch>>;
}

/// A writable reference index.
#[async_trait]
pub trait ReferenceStore: VectorSearch {
    /// Insert or replace items, returning how many were written.
    async fn insert_batch(&self, items: &[ReferenceItem]) -> Result<usize>;

    /// Number of stored topics.
    async fn count(&self) -> Result<usize>;

    /// Remove every stored topic.
    async fn clear(&self) -> Result<()>;
}

/// A reference index opened from settings, usable both for queries and writes.
#[derive(Clone)]
pub enum ReferenceIndex {
    Memory(Arc<MemoryReferenceIndex>),
    Sqlite(Arc<SqliteReferenceIndex>),
}

impl ReferenceIndex {
    /// Open the index configured in `settings`.
    pub fn open(settings: &Settings) -> Result<Self> {
        match settings.reference.provider {
            ReferenceProvider::Memory => Ok(Self::Memory(Arc::new(MemoryReferenceIndex::new()))),
            ReferenceProvider::Sqlite => Ok(Self::Sqlite(Arc::new(SqliteReferenceIndex::open(
                &settings.reference_path(),
            )?))),
        }
    }

    pub fn search(&self) -> Arc<dyn VectorSearch> {
        match self {
            Self::Memory(index) => index.clone(),
            Self::Sqlite(index) => index.clone(),
        }
    }

    pub fn store(&self) -> Arc<dyn ReferenceStore> {
        match self {
            Self::Memory(index) => index.clone(),
            Self::Sqlite(index) => index.clone(),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Mismatched lengths, empty vectors and zero vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Rank `(label, embedding)` candidates against `query`, keeping the `top_k` best.
///
/// Equal scores keep candidate order.
pub(crate) fn nearest<'a, I>(query: &[f32], candidates: I, top_k: usize) -> Vec<NeighborMatch>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut matches: Vec<NeighborMatch> = candidates
        .into_iter()
        .map(|(label, embedding)| NeighborMatch {
            topic_label: label.to_string(),
            score: cosine_similarity(query, embedding),
        })
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches.truncate(top_k);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_reference_item_accepts_emb_alias() {
        let item: ReferenceItem = serde_json::from_str(
            r#"{"id": "12", "title": "Photosynthesis", "url": "https://en.wikipedia.org/wiki/Photosynthesis", "emb": [0.5, 0.25]}"#,
        )
        .unwrap();
        assert_eq!(item.title, "Photosynthesis");
        assert_eq!(item.embedding, vec![0.5, 0.25]);
    }

    #[test]
    fn test_nearest_orders_and_truncates() {
        let cat = [1.0f32, 0.0];
        let dog = [0.8f32, 0.6];
        let car = [0.0f32, 1.0];
        let candidates = vec![("Car", &car[..]), ("Dog", &dog[..]), ("Cat", &cat[..])];

        let matches = nearest(&[1.0, 0.0], candidates, 2);
        let labels: Vec<_> = matches.iter().map(|m| m.topic_label.as_str()).collect();
        assert_eq!(labels, vec!["Cat", "Dog"]);
    }
}
