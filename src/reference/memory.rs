//! In-memory reference index.
//!
//! Useful for testing and small collections.

use super::{nearest, NeighborMatch, ReferenceItem, ReferenceStore, VectorSearch};
use crate::error::{RabbitholeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory reference index with brute-force cosine search.
#[derive(Default)]
pub struct MemoryReferenceIndex {
    items: RwLock<Vec<ReferenceItem>>,
    positions: RwLock<HashMap<String, usize>>,
}

impl MemoryReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index holding `items`.
    pub fn with_items(items: Vec<ReferenceItem>) -> Self {
        let positions = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
        Self {
            items: RwLock::new(items),
            positions: RwLock::new(positions),
        }
    }
}

fn poisoned<T>(_: T) -> RabbitholeError {
    RabbitholeError::ReferenceIndex("index lock poisoned".to_string())
}

#[async_trait]
impl VectorSearch for MemoryReferenceIndex {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<NeighborMatch>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(nearest(
            embedding,
            items.iter().map(|item| (item.title.as_str(), item.embedding.as_slice())),
            top_k,
        ))
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceIndex {
    async fn insert_batch(&self, batch: &[ReferenceItem]) -> Result<usize> {
        let mut items = self.items.write().map_err(poisoned)?;
        let mut positions = self.positions.write().map_err(poisoned)?;

        for item in batch {
            match positions.get(&item.id) {
                Some(&i) => items[i] = item.clone(),
                None => {
                    positions.insert(item.id.clone(), items.len());
                    items.push(item.clone());
                }
            }
        }
        Ok(batch.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.items.read().map_err(poisoned)?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.items.write().map_err(poisoned)?.clear();
        self.positions.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str, embedding: Vec<f32>) -> ReferenceItem {
        ReferenceItem {
            id: id.to_string(),
            title: title.to_string(),
            url: String::new(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_memory_reference_index() {
        let index = MemoryReferenceIndex::new();
        index
            .insert_batch(&[
                item("1", "Mitochondrion", vec![1.0, 0.0, 0.0]),
                item("2", "Ribosome", vec![0.0, 1.0, 0.0]),
                item("3", "Golgi apparatus", vec![0.7, 0.7, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 3);

        let matches = index.query(&[1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].topic_label, "Mitochondrion");
        assert_eq!(matches[1].topic_label, "Golgi apparatus");
    }

    #[tokio::test]
    async fn test_insert_replaces_same_id() {
        let index = MemoryReferenceIndex::new();
        index.insert_batch(&[item("1", "Old", vec![1.0])]).await.unwrap();
        index.insert_batch(&[item("1", "New", vec![1.0])]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.query(&[1.0], 1).await.unwrap()[0].topic_label, "New");
    }

    #[tokio::test]
    async fn test_clear_and_empty_query() {
        let index = MemoryReferenceIndex::with_items(vec![item("1", "Cell", vec![1.0])]);
        index.clear().await.unwrap();

        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.query(&[1.0], 5).await.unwrap().is_empty());
    }
}
