//! Fan-out/fan-in over document jobs.
//!
//! One `tokio` task per document, all started before any is awaited. Results come
//! back through the task handles and are keyed by document identity, so completion
//! order never matters. A failing or panicking job only ends its own document.

use super::{
    DocumentOutcome, DocumentResult, JobEvent, JobFailure, JobState, PipelineJob, PipelineReport,
};
use crate::audio::{AudioChunker, FfmpegDecoder};
use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{RabbitholeError, Result};
use crate::keywords::KeywordRanker;
use crate::llm::OpenAIChat;
use crate::media::{CharacterSplitter, DocumentId, MediaNormalizer, TextChunk, Upload};
use crate::reference::VectorSearch;
use crate::retry::{with_retry, RetryPolicy};
use crate::summarize::{LlmSummarizer, Summarizer};
use crate::transcription::WhisperTranscriber;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Default number of keywords kept per document.
const DEFAULT_KEYWORD_COUNT: usize = 10;

/// Runs document jobs concurrently and collects one outcome per document.
#[derive(Clone)]
pub struct Orchestrator {
    normalizer: Arc<MediaNormalizer>,
    embedder: Arc<dyn Embedder>,
    ranker: Arc<KeywordRanker>,
    summarizer: Arc<dyn Summarizer>,
    keyword_count: usize,
    retry: RetryPolicy,
    events: Option<UnboundedSender<JobEvent>>,
}

/// Where a job takes its chunks from.
enum JobInput {
    Chunks(Vec<TextChunk>),
    Upload(Upload),
}

impl Orchestrator {
    pub fn new(
        normalizer: Arc<MediaNormalizer>,
        embedder: Arc<dyn Embedder>,
        ranker: Arc<KeywordRanker>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            normalizer,
            embedder,
            ranker,
            summarizer,
            keyword_count: DEFAULT_KEYWORD_COUNT,
            retry: RetryPolicy::default(),
            events: None,
        }
    }

    /// Wire the OpenAI-backed services described by `settings` around `search`.
    pub fn from_settings(settings: &Settings, search: Arc<dyn VectorSearch>) -> Result<Self> {
        let retry = RetryPolicy::from(&settings.pipeline);
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let transcriber = WhisperTranscriber::with_model(&settings.transcription.model)?;
        let decoder = FfmpegDecoder::new(settings.transcription.sample_rate, settings.temp_dir());
        let normalizer =
            MediaNormalizer::new(Arc::new(transcriber), Arc::new(decoder), settings.temp_dir())
                .with_chunker(AudioChunker::from_settings(&settings.transcription))
                .with_splitter(CharacterSplitter::from_settings(&settings.splitter))
                .with_retry(retry.clone())
                .with_max_concurrent_segments(settings.transcription.max_concurrent_segments);

        let embedder = OpenAIEmbedder::from_settings(&settings.embedding)?;
        let ranker =
            KeywordRanker::from_settings(search, &settings.keywords).with_retry(retry.clone());

        let summarization = &settings.summarization;
        let chat = OpenAIChat::new(&summarization.model, summarization.temperature)?;
        let summarizer = LlmSummarizer::from_settings(Arc::new(chat), prompts, summarization);

        Ok(Self::new(
            Arc::new(normalizer),
            Arc::new(embedder),
            Arc::new(ranker),
            Arc::new(summarizer),
        )
        .with_keyword_count(settings.keywords.count)
        .with_retry(retry))
    }

    pub fn with_keyword_count(mut self, count: usize) -> Self {
        self.keyword_count = count;
        self
    }

    /// Policy applied to embedding and summarization calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Report every state transition to `events`.
    pub fn with_events(mut self, events: UnboundedSender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Process already-normalized documents.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn process_all(
        &self,
        documents: BTreeMap<DocumentId, Vec<TextChunk>>,
    ) -> PipelineReport {
        let inputs = documents
            .into_iter()
            .map(|(id, chunks)| (id, JobInput::Chunks(chunks)))
            .collect();
        self.run(inputs).await
    }

    /// Normalize and process raw uploads, one job per upload.
    ///
    /// Uploads sharing a file name are told apart with a `#n` suffix.
    #[instrument(skip(self, uploads), fields(uploads = uploads.len()))]
    pub async fn process_uploads(&self, uploads: Vec<Upload>) -> PipelineReport {
        let ids = upload_ids(&uploads);
        let inputs = ids
            .into_iter()
            .zip(uploads)
            .map(|(id, upload)| (id, JobInput::Upload(upload)))
            .collect();
        self.run(inputs).await
    }

    async fn run(&self, inputs: Vec<(DocumentId, JobInput)>) -> PipelineReport {
        let started_at = Utc::now();
        info!("Starting {} document jobs", inputs.len());

        let mut pending = FuturesUnordered::new();
        for (id, input) in inputs {
            let this = self.clone();
            let job_id = id.clone();
            // Outlives the task, so a panic can still be attributed to its stage.
            let (stage_tx, stage_rx) = watch::channel(JobState::Pending);
            let handle = tokio::spawn(async move { this.run_job(job_id, input, stage_tx).await });
            pending.push(async move { (id, stage_rx, handle.await) });
        }

        let mut documents = BTreeMap::new();
        while let Some((id, stage_rx, joined)) = pending.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    let stage = *stage_rx.borrow();
                    warn!(document = %id, %stage, "Job aborted: {}", e);
                    let error = RabbitholeError::JobPanicked(id.to_string());
                    self.emit(&id, JobState::Failed, Some(error.kind()));
                    DocumentOutcome::Failed(JobFailure::new(&error, stage))
                }
            };
            documents.insert(id, outcome);
        }

        let report = PipelineReport::new(started_at, documents);
        info!(
            "Finished {} jobs: {} done, {} failed",
            report.len(),
            report.succeeded().count(),
            report.failed().count()
        );
        report
    }

    #[instrument(skip(self, input, stage), fields(document = %document))]
    async fn run_job(
        &self,
        document: DocumentId,
        input: JobInput,
        stage: watch::Sender<JobState>,
    ) -> DocumentOutcome {
        let mut job = PipelineJob::new(document, Vec::new());
        self.emit(&job.document_id, JobState::Pending, None);

        match self.drive(&mut job, input, &stage).await {
            Ok(result) => {
                job.state = JobState::Done;
                self.emit(&job.document_id, JobState::Done, None);
                info!("Document processed with {} keywords", result.keywords.len());
                DocumentOutcome::Done(result)
            }
            Err(e) => {
                let failure = JobFailure::new(&e, job.state);
                job.error = Some(failure.kind);
                job.state = JobState::Failed;
                self.emit(&job.document_id, JobState::Failed, job.error);
                warn!(stage = %failure.stage, "Document failed: {}", e);
                DocumentOutcome::Failed(failure)
            }
        }
    }

    async fn drive(
        &self,
        job: &mut PipelineJob,
        input: JobInput,
        stage: &watch::Sender<JobState>,
    ) -> Result<DocumentResult> {
        let chunks = match input {
            JobInput::Chunks(chunks) => chunks,
            JobInput::Upload(upload) => {
                self.advance(job, stage, JobState::Normalizing);
                self.normalizer.normalize(&job.document_id, &upload).await?
            }
        };
        *job = PipelineJob::new(job.document_id.clone(), chunks);

        self.advance(job, stage, JobState::Embedding);
        let texts = job.texts();
        if texts.iter().all(|t| t.trim().is_empty()) {
            return Err(RabbitholeError::InvalidInput(
                "document has no text to process".to_string(),
            ));
        }

        let embeddings =
            with_retry(&self.retry, "embedding", || self.embedder.embed_batch(&texts)).await?;
        if embeddings.len() != texts.len() {
            return Err(RabbitholeError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        self.advance(job, stage, JobState::Ranking);
        let keywords = self.ranker.rank(&embeddings, self.keyword_count).await?;

        self.advance(job, stage, JobState::Summarizing);
        let summary = with_retry(&self.retry, "summarization", || {
            self.summarizer.summarize(&texts)
        })
        .await?;

        Ok(DocumentResult {
            document_id: job.document_id.clone(),
            keywords,
            summary,
        })
    }

    fn advance(&self, job: &mut PipelineJob, stage: &watch::Sender<JobState>, state: JobState) {
        job.state = state;
        stage.send_replace(state);
        self.emit(&job.document_id, state, None);
    }

    fn emit(&self, document: &DocumentId, state: JobState, error: Option<crate::error::ErrorKind>) {
        if let Some(events) = &self.events {
            // The receiver may already be gone; progress is best effort.
            let _ = events.send(JobEvent {
                document: document.clone(),
                state,
                error,
            });
        }
    }
}

/// One id per upload: the file name, or `name#n` for repeats. A suffixed id never
/// collides with another upload's own file name.
fn upload_ids(uploads: &[Upload]) -> Vec<DocumentId> {
    let mut taken: HashSet<String> = uploads.iter().map(|u| u.file_name.clone()).collect();
    let mut first_seen: HashSet<&str> = HashSet::new();

    uploads
        .iter()
        .map(|upload| {
            let name = upload.file_name.as_str();
            if first_seen.insert(name) {
                return DocumentId::new(name);
            }
            let mut n = 2;
            loop {
                let candidate = format!("{}#{}", name, n);
                if taken.insert(candidate.clone()) {
                    return DocumentId::new(candidate);
                }
                n += 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioDecoder, AudioSegment, AudioTrack};
    use crate::error::ErrorKind;
    use crate::reference::{MemoryReferenceIndex, ReferenceItem};
    use crate::transcription::Transcriber;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Maps text to a 2-d vector; text containing "fail" makes the whole batch fail
    /// and text containing "slow" stalls for a second.
    #[derive(Default)]
    struct StubEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(if text.contains("plants") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("slow")) {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            if texts.iter().any(|t| t.contains("fail")) {
                // Give sibling jobs time to be in flight.
                tokio::time::sleep(Duration::from_millis(5)).await;
                return Err(RabbitholeError::EmbeddingService("quota exceeded".into()));
            }
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    /// First chunk, upper-cased; panics on text containing "panic".
    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, chunks: &[String]) -> Result<String> {
            if chunks.iter().any(|c| c.contains("panic")) {
                panic!("summarizer blew up");
            }
            Ok(chunks[0].to_uppercase())
        }
    }

    struct NoTranscriber;

    #[async_trait]
    impl Transcriber for NoTranscriber {
        async fn transcribe(&self, _segment: &AudioSegment) -> Result<String> {
            Err(RabbitholeError::TranscriptionService("unused".into()))
        }
    }

    struct NoDecoder;

    #[async_trait]
    impl AudioDecoder for NoDecoder {
        async fn decode(&self, _file_name: &str, _bytes: &[u8]) -> Result<AudioTrack> {
            Ok(AudioTrack::silent(100, 0))
        }
    }

    fn topic(id: &str, title: &str, embedding: Vec<f32>) -> ReferenceItem {
        ReferenceItem {
            id: id.to_string(),
            title: title.to_string(),
            url: String::new(),
            embedding,
        }
    }

    fn orchestrator(embedder: Arc<StubEmbedder>, dir: &std::path::Path) -> Orchestrator {
        let index = Arc::new(MemoryReferenceIndex::with_items(vec![
            topic("1", "Photosynthesis", vec![1.0, 0.0]),
            topic("2", "Plate tectonics", vec![0.0, 1.0]),
        ]));
        let policy = RetryPolicy::no_retry(Duration::from_secs(5));
        let normalizer = MediaNormalizer::new(Arc::new(NoTranscriber), Arc::new(NoDecoder), dir)
            .with_retry(policy.clone());
        let ranker = KeywordRanker::new(index).with_retry(policy.clone());

        Orchestrator::new(
            Arc::new(normalizer),
            embedder,
            Arc::new(ranker),
            Arc::new(StubSummarizer),
        )
        .with_keyword_count(1)
        .with_retry(policy)
    }

    fn chunks(id: &str, texts: &[&str]) -> (DocumentId, Vec<TextChunk>) {
        let document = DocumentId::from(id);
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, text)| TextChunk {
                source_document: document.clone(),
                sequence_index: i,
                content: text.to_string(),
            })
            .collect();
        (document, chunks)
    }

    #[tokio::test]
    async fn test_failed_embedding_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(Arc::new(StubEmbedder::default()), dir.path());

        let documents = BTreeMap::from([
            chunks("A", &["plants use light", "rocks drift"]),
            chunks("B", &["this will fail"]),
        ]);
        let report = orchestrator.process_all(documents).await;

        assert_eq!(report.len(), 2);
        let a = report.get(&"A".into()).unwrap().result().unwrap();
        assert_eq!(a.keywords, vec!["Photosynthesis"]);
        assert_eq!(a.summary, "PLANTS USE LIGHT");

        let b = report.get(&"B".into()).unwrap().failure().unwrap();
        assert_eq!(b.kind, ErrorKind::EmbeddingServiceError);
        assert_eq!(b.stage, JobState::Embedding);
    }

    #[tokio::test]
    async fn test_every_document_gets_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(Arc::new(StubEmbedder::default()), dir.path());

        let mut documents = BTreeMap::new();
        for i in 0..6 {
            let (id, c) = chunks(&format!("doc{}", i), &["plants", "rocks"]);
            documents.insert(id, c);
        }
        documents.insert("empty".into(), Vec::new());
        documents.insert("broken".into(), chunks("broken", &["fail"]).1);

        let report = orchestrator.process_all(documents).await;

        assert_eq!(report.len(), 8);
        assert_eq!(report.succeeded().count(), 6);
        let failures: BTreeMap<_, _> =
            report.failed().map(|(id, f)| (id.to_string(), f.kind)).collect();
        assert_eq!(failures["empty"], ErrorKind::InvalidInput);
        assert_eq!(failures["broken"], ErrorKind::EmbeddingServiceError);
    }

    #[tokio::test]
    async fn test_state_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator =
            orchestrator(Arc::new(StubEmbedder::default()), dir.path()).with_events(tx);

        let report = orchestrator
            .process_all(BTreeMap::from([chunks("solo", &["plants"])]))
            .await;
        assert!(report.get(&"solo".into()).unwrap().is_done());

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.document.as_str(), "solo");
            states.push(event.state);
        }
        assert_eq!(
            states,
            vec![
                JobState::Pending,
                JobState::Embedding,
                JobState::Ranking,
                JobState::Summarizing,
                JobState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_uploads_with_unsupported_kind() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(StubEmbedder::default());
        let orchestrator = orchestrator(embedder.clone(), dir.path());

        let report = orchestrator
            .process_uploads(vec![
                Upload::new("notes.txt", b"plants grow".to_vec()),
                Upload::new("data.xyz", vec![0; 8]),
                Upload::new("notes.txt", b"rocks drift".to_vec()),
            ])
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(
            report.get(&"notes.txt".into()).unwrap().result().unwrap().summary,
            "PLANTS GROW"
        );
        assert_eq!(
            report.get(&"notes.txt#2".into()).unwrap().result().unwrap().summary,
            "ROCKS DRIFT"
        );

        let xyz = report.get(&"data.xyz".into()).unwrap().failure().unwrap();
        assert_eq!(xyz.kind, ErrorKind::UnsupportedMediaKind);
        assert_eq!(xyz.stage, JobState::Normalizing);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(Arc::new(StubEmbedder::default()), dir.path());

        let report = orchestrator
            .process_all(BTreeMap::from([
                chunks("calm", &["plants"]),
                chunks("wild", &["panic now"]),
            ]))
            .await;

        assert!(report.get(&"calm".into()).unwrap().is_done());
        let wild = report.get(&"wild".into()).unwrap().failure().unwrap();
        assert_eq!(wild.kind, ErrorKind::Internal);
        assert_eq!(wild.stage, JobState::Summarizing);
    }

    #[tokio::test]
    async fn test_timeout_fails_only_its_document() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(Arc::new(StubEmbedder::default()), dir.path())
            .with_retry(RetryPolicy::no_retry(Duration::from_millis(50)));

        let report = orchestrator
            .process_all(BTreeMap::from([
                chunks("quick", &["plants"]),
                chunks("stuck", &["slow rocks"]),
            ]))
            .await;

        assert_eq!(report.len(), 2);
        assert_eq!(report.get(&"quick".into()).unwrap().result().unwrap().summary, "PLANTS");
        let stuck = report.get(&"stuck".into()).unwrap().failure().unwrap();
        assert_eq!(stuck.kind, ErrorKind::ServiceTimeout);
        assert_eq!(stuck.stage, JobState::Embedding);
    }

    #[tokio::test]
    async fn test_suffixed_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(Arc::new(StubEmbedder::default()), dir.path());

        let report = orchestrator
            .process_uploads(vec![
                Upload::new("notes.txt", b"plants one".to_vec()),
                Upload::new("notes.txt", b"plants two".to_vec()),
                Upload::new("notes.txt#2", b"plants three".to_vec()),
            ])
            .await;

        assert_eq!(report.len(), 3);
        let summary = |id: &str| {
            report.get(&id.into()).unwrap().result().unwrap().summary.clone()
        };
        assert_eq!(summary("notes.txt"), "PLANTS ONE");
        assert_eq!(summary("notes.txt#3"), "PLANTS TWO");
        assert_eq!(summary("notes.txt#2"), "PLANTS THREE");
    }
}
