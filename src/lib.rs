//! Rabbithole - study material in, study plan out
//!
//! Rabbithole takes a pile of heterogeneous study material (documents, scans,
//! lecture recordings) and, for each item, derives topical keywords and a summary.
//! The per-item results are then combined into one study plan.
//!
//! # Overview
//!
//! 1. [`media`] turns every upload into ordered text chunks. Documents are
//!    extracted directly; audio and video are decoded, cut into segments by
//!    [`audio`] and transcribed through [`transcription`].
//! 2. [`embedding`] embeds the chunks of a document.
//! 3. [`keywords`] matches each chunk embedding against the [`reference`] topic
//!    index and ranks the neighbor titles with a TF-IDF style weight.
//! 4. [`summarize`] summarises the leading chunks.
//! 5. [`pipeline`] runs steps 1 to 4 for every document concurrently and collects
//!    one outcome per document; [`planner`] turns the results into a study plan.
//! 6. [`chat`] continues with questions about a saved run and its plan.
//!
//! Every external call goes through [`retry::with_retry`], which applies a timeout
//! and a bounded exponential backoff.
//!
//! # Example
//!
//! ```rust,no_run
//! use rabbithole::config::Settings;
//! use rabbithole::media::Upload;
//! use rabbithole::pipeline::Orchestrator;
//! use rabbithole::reference::ReferenceIndex;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let index = ReferenceIndex::open(&settings)?;
//!     let orchestrator = Orchestrator::from_settings(&settings, index.search())?;
//!
//!     let upload = Upload::from_path("lecture.mp4".as_ref()).await?;
//!     let report = orchestrator.process_uploads(vec![upload]).await;
//!     for result in report.succeeded() {
//!         println!("{}: {}", result.document_id, result.keywords.join(", "));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod keywords;
pub mod llm;
pub mod media;
pub mod openai;
pub mod pipeline;
pub mod planner;
pub mod reference;
pub mod retry;
pub mod summarize;
pub mod transcription;

pub use error::{ErrorKind, RabbitholeError, Result};
