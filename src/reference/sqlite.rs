//! SQLite-backed reference index.
//!
//! Embeddings are stored as little-endian `f32` BLOBs and compared with cosine
//! similarity computed in Rust. The table is decoded once into a shared in-memory
//! snapshot; queries score against the snapshot on the blocking pool, so concurrent
//! jobs neither wait on the connection nor stall runtime threads. Writes drop the
//! snapshot and the next query reloads it.

use super::{nearest, NeighborMatch, ReferenceItem, ReferenceStore, VectorSearch};
use crate::error::{RabbitholeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS topics (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// A decoded topic row.
struct Topic {
    title: String,
    embedding: Vec<f32>,
}

type Snapshot = Arc<Vec<Topic>>;

/// SQLite reference index.
pub struct SqliteReferenceIndex {
    conn: Arc<Mutex<Connection>>,
    snapshot: RwLock<Option<Snapshot>>,
}

impl SqliteReferenceIndex {
    /// Open (or create) an index at `path`.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened reference index at {:?}", path);

        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory index (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            snapshot: RwLock::new(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }

    /// The decoded topics, loading them on first use.
    async fn snapshot(&self) -> Result<Snapshot> {
        let cached = self.snapshot.read().await.clone();
        if let Some(topics) = cached {
            return Ok(topics);
        }

        let mut slot = self.snapshot.write().await;
        if let Some(topics) = slot.as_ref() {
            return Ok(Arc::clone(topics));
        }

        let conn = Arc::clone(&self.conn);
        let topics = tokio::task::spawn_blocking(move || load_topics(&conn))
            .await
            .map_err(|e| RabbitholeError::ReferenceIndex(format!("Topic load failed: {}", e)))??;

        info!("Loaded {} reference topics", topics.len());
        let topics = Arc::new(topics);
        *slot = Some(Arc::clone(&topics));
        Ok(topics)
    }

    async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    /// When the index was last written by an import, if ever.
    pub fn last_import(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'last_import'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }

    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| RabbitholeError::ReferenceIndex(format!("Failed to acquire lock: {}", e)))
}

fn load_topics(conn: &Mutex<Connection>) -> Result<Vec<Topic>> {
    let conn = lock(conn)?;
    let mut stmt = conn.prepare("SELECT title, embedding FROM topics ORDER BY rowid")?;

    let topics = stmt
        .query_map([], |row| {
            let bytes: Vec<u8> = row.get(1)?;
            Ok(Topic {
                title: row.get(0)?,
                embedding: SqliteReferenceIndex::bytes_to_embedding(&bytes),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(topics)
}

#[async_trait]
impl VectorSearch for SqliteReferenceIndex {
    #[instrument(skip(self, embedding))]
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<NeighborMatch>> {
        let topics = self.snapshot().await?;
        let query = embedding.to_vec();

        let matches = tokio::task::spawn_blocking(move || {
            let candidates = topics
                .iter()
                .map(|topic| (topic.title.as_str(), topic.embedding.as_slice()));
            let matches = nearest(&query, candidates, top_k);
            debug!("Found {} neighbors among {} topics", matches.len(), topics.len());
            matches
        })
        .await
        .map_err(|e| RabbitholeError::ReferenceIndex(format!("Topic scan failed: {}", e)))?;

        Ok(matches)
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceIndex {
    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn insert_batch(&self, items: &[ReferenceItem]) -> Result<usize> {
        {
            let conn = self.lock()?;
            let tx = conn.unchecked_transaction()?;

            for item in items {
                tx.execute(
                    "INSERT OR REPLACE INTO topics (id, title, url, embedding) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        item.id,
                        item.title,
                        item.url,
                        Self::embedding_to_bytes(&item.embedding)
                    ],
                )?;
            }

            tx.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('last_import', ?1)",
                params![Utc::now().to_rfc3339()],
            )?;

            tx.commit()?;
        }

        self.invalidate().await;
        debug!("Inserted {} topics", items.len());
        Ok(items.len())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?
            .execute_batch("DELETE FROM topics; DELETE FROM index_meta;")?;
        self.invalidate().await;
        info!("Cleared reference index");
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
            url: format!("https://en.wikipedia.org/wiki/{}", title),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_sqlite_query_ranks_by_similarity() {
        let index = SqliteReferenceIndex::in_memory().unwrap();
        index
            .insert_batch(&[
                item("1", "Enzyme", vec![1.0, 0.0]),
                item("2", "Protein", vec![0.6, 0.8]),
                item("3", "Glacier", vec![-1.0, 0.0]),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 3).await.unwrap();
        let labels: Vec<_> = matches.iter().map(|m| m.topic_label.as_str()).collect();
        assert_eq!(labels, vec!["Enzyme", "Protein", "Glacier"]);
        assert!((matches[1].score - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embeddings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.db");

        {
            let index = SqliteReferenceIndex::open(&path).unwrap();
            index
                .insert_batch(&[item("1", "Osmosis", vec![0.25, -1.5, 3.0])])
                .await
                .unwrap();
        }

        let index = SqliteReferenceIndex::open(&path).unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.last_import().unwrap().is_some());

        let matches = index.query(&[0.25, -1.5, 3.0], 1).await.unwrap();
        assert_eq!(matches[0].topic_label, "Osmosis");
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_writes_refresh_loaded_topics() {
        let index = SqliteReferenceIndex::in_memory().unwrap();
        index.insert_batch(&[item("1", "Enzyme", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(index.query(&[0.0, 1.0], 1).await.unwrap()[0].topic_label, "Enzyme");

        index.insert_batch(&[item("2", "Glacier", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.query(&[0.0, 1.0], 1).await.unwrap()[0].topic_label, "Glacier");

        index.clear().await.unwrap();
        assert!(index.query(&[0.0, 1.0], 1).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_queries_agree() {
        let index = Arc::new(SqliteReferenceIndex::in_memory().unwrap());
        let items: Vec<_> = (0..50)
            .map(|i| item(&i.to_string(), &format!("Topic {}", i), vec![i as f32, 1.0]))
            .collect();
        index.insert_batch(&items).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let index = Arc::clone(&index);
                tokio::spawn(async move { index.query(&[49.0, 1.0], 3).await })
            })
            .collect();

        for handle in handles {
            let matches = handle.await.unwrap().unwrap();
            assert_eq!(matches[0].topic_label, "Topic 49");
            assert_eq!(matches.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_clear_removes_topics() {
        let index = SqliteReferenceIndex::in_memory().unwrap();
        index.insert_batch(&[item("1", "Cell", vec![1.0])]).await.unwrap();
        index.clear().await.unwrap();

        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.last_import().unwrap().is_none());
    }
}
