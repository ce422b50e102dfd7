//! Chunk embedding.
//!
//! The pipeline embeds every chunk of a document in one [`Embedder::embed_batch`]
//! call. Implementations must return exactly one vector per input text, in input
//! order; the keyword ranker relies on that alignment.

mod openai;

pub use openai::OpenAIEmbedder;

use crate::error::Result;
use async_trait::async_trait;

/// Converts text into fixed-length vectors comparable with the reference index.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, one vector per text in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector length produced by this embedder.
    fn dimensions(&self) -> usize;
}
