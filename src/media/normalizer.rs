//! Upload to text-chunk normalization.

use super::extract::extract_text;
use super::{CharacterSplitter, DocumentFormat, DocumentId, MediaKind, TextChunk, Upload};
use crate::audio::{AudioChunker, AudioDecoder, AudioTrack};
use crate::error::{RabbitholeError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::transcription::Transcriber;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Converts uploads of any supported kind into ordered [`TextChunk`]s.
pub struct MediaNormalizer {
    transcriber: Arc<dyn Transcriber>,
    decoder: Arc<dyn AudioDecoder>,
    chunker: AudioChunker,
    splitter: CharacterSplitter,
    retry: RetryPolicy,
    max_concurrent_segments: usize,
    temp_dir: PathBuf,
}

impl MediaNormalizer {
    /// Create a normalizer with default chunking, splitting and retry behaviour.
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        decoder: Arc<dyn AudioDecoder>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transcriber,
            decoder,
            chunker: AudioChunker::default(),
            splitter: CharacterSplitter::default(),
            retry: RetryPolicy::default(),
            max_concurrent_segments: 3,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn with_chunker(mut self, chunker: AudioChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_splitter(mut self, splitter: CharacterSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_concurrent_segments(mut self, max: usize) -> Self {
        self.max_concurrent_segments = max.max(1);
        self
    }

    /// Normalize an upload into chunks attributed to `document`.
    ///
    /// Unsupported kinds are rejected before any decoding, extraction or service call.
    #[instrument(skip(self, upload), fields(document = %document, file = %upload.file_name))]
    pub async fn normalize(
        &self,
        document: &DocumentId,
        upload: &Upload,
    ) -> Result<Vec<TextChunk>> {
        match upload.kind() {
            MediaKind::Unsupported(detected) => {
                Err(RabbitholeError::UnsupportedMediaKind(detected))
            }
            MediaKind::DocumentLike(format) => {
                self.normalize_document(document, format, upload).await
            }
            MediaKind::AudioVideo => self.normalize_audio_video(document, upload).await,
        }
    }

    async fn normalize_document(
        &self,
        document: &DocumentId,
        format: DocumentFormat,
        upload: &Upload,
    ) -> Result<Vec<TextChunk>> {
        let text = extract_text(format, &upload.file_name, &upload.bytes, &self.temp_dir).await?;
        let chunks = self.splitter.split(document, &text);
        debug!("Split document into {} chunks", chunks.len());
        Ok(chunks)
    }

    async fn normalize_audio_video(
        &self,
        document: &DocumentId,
        upload: &Upload,
    ) -> Result<Vec<TextChunk>> {
        let track = self.decoder.decode(&upload.file_name, &upload.bytes).await?;
        let transcript = self.transcribe_track(&track).await?;
        let chunks = self.splitter.split(document, &transcript);
        debug!("Split transcript into {} chunks", chunks.len());
        Ok(chunks)
    }

    /// Segment and transcribe a decoded track, returning the transcripts joined in
    /// segment order. Any segment failing fails the whole track.
    pub async fn transcribe_track(&self, track: &AudioTrack) -> Result<String> {
        let segments = self.chunker.chunk(track);
        if segments.is_empty() {
            return Ok(String::new());
        }

        let segment_count = segments.len();
        info!("Transcribing {} audio segments", segment_count);

        let mut results: Vec<(usize, String)> = Vec::with_capacity(segment_count);

        // Futures own their segment; the stream runs inside a spawned document job.
        let jobs: Vec<_> = segments
            .into_iter()
            .enumerate()
            .map(|(idx, segment)| {
                let transcriber = Arc::clone(&self.transcriber);
                let retry = self.retry.clone();
                async move {
                    let result = with_retry(&retry, "transcription", || {
                        transcriber.transcribe(&segment)
                    })
                    .await;
                    (idx, segment.start_offset_ms, result)
                }
            })
            .collect();

        let mut stream = stream::iter(jobs).buffer_unordered(self.max_concurrent_segments);

        while let Some((idx, start_ms, result)) = stream.next().await {
            match result {
                Ok(text) => results.push((idx, text)),
                Err(e) => {
                    return Err(RabbitholeError::TranscriptionFailed(format!(
                        "segment {} at {:.1}s: {}",
                        idx,
                        start_ms as f64 / 1000.0,
                        e
                    )));
                }
            }
        }

        // Completion order is arbitrary; the transcript must follow segment order.
        results.sort_by_key(|(idx, _)| *idx);

        Ok(results
            .into_iter()
            .map(|(_, text)| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioSegment;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Names each segment by its start second, finishing later segments first.
    struct OffsetTranscriber {
        calls: AtomicUsize,
        fail_at_ms: Option<u64>,
    }

    impl OffsetTranscriber {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_at_ms: None,
            }
        }
    }

    #[async_trait]
    impl Transcriber for OffsetTranscriber {
        async fn transcribe(&self, segment: &AudioSegment) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(segment.start_offset_ms) == self.fail_at_ms {
                return Err(RabbitholeError::TranscriptionService("rejected".into()));
            }
            // Earlier segments sleep longer so completion order is reversed.
            let delay = 30u64.saturating_sub(segment.start_offset_ms / 1000);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("part{}", segment.start_offset_ms / 1000))
        }
    }

    struct SilentDecoder {
        duration_ms: u64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AudioDecoder for SilentDecoder {
        async fn decode(&self, _file_name: &str, _bytes: &[u8]) -> Result<AudioTrack> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AudioTrack::silent(100, self.duration_ms))
        }
    }

    fn normalizer(
        transcriber: Arc<OffsetTranscriber>,
        decoder: Arc<SilentDecoder>,
        dir: &std::path::Path,
    ) -> MediaNormalizer {
        MediaNormalizer::new(transcriber, decoder, dir)
            .with_chunker(AudioChunker::new(Duration::from_secs(10)))
            .with_retry(RetryPolicy::no_retry(Duration::from_secs(5)))
            .with_max_concurrent_segments(4)
    }

    #[tokio::test]
    async fn test_text_upload_is_split_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = Arc::new(OffsetTranscriber::new());
        let decoder = Arc::new(SilentDecoder { duration_ms: 0, calls: AtomicUsize::new(0) });
        let normalizer = normalizer(transcriber.clone(), decoder.clone(), dir.path());

        let text = "x".repeat(2100);
        let upload = Upload::new("notes.txt", text.clone().into_bytes());
        let chunks = normalizer.normalize(&"notes.txt".into(), &upload).await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.content.as_str()).collect::<String>(), text);
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transcripts_keep_segment_order() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = Arc::new(OffsetTranscriber::new());
        let decoder = Arc::new(SilentDecoder { duration_ms: 35_000, calls: AtomicUsize::new(0) });
        let normalizer = normalizer(transcriber.clone(), decoder, dir.path());

        let upload = Upload::new("lecture.mp3", vec![1, 2, 3]);
        let chunks = normalizer.normalize(&"lecture.mp3".into(), &upload).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "part0 part10 part20 part30");
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_transcription_runs_inside_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = Arc::new(OffsetTranscriber::new());
        let decoder = Arc::new(SilentDecoder { duration_ms: 25_000, calls: AtomicUsize::new(0) });
        let normalizer = Arc::new(normalizer(transcriber.clone(), decoder, dir.path()));

        let handle = tokio::spawn(async move {
            let upload = Upload::new("talk.wav", vec![0; 4]);
            normalizer.normalize(&"talk.wav".into(), &upload).await
        });
        let chunks = handle.await.unwrap().unwrap();

        assert_eq!(chunks[0].content, "part0 part10 part20");
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_one_failed_segment_fails_document() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = Arc::new(OffsetTranscriber {
            calls: AtomicUsize::new(0),
            fail_at_ms: Some(10_000),
        });
        let decoder = Arc::new(SilentDecoder { duration_ms: 35_000, calls: AtomicUsize::new(0) });
        let normalizer = normalizer(transcriber, decoder, dir.path());

        let upload = Upload::new("lecture.mp4", vec![0]);
        let err = normalizer.normalize(&"lecture.mp4".into(), &upload).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TranscriptionFailed);
    }

    #[tokio::test]
    async fn test_unsupported_kind_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = Arc::new(OffsetTranscriber::new());
        let decoder = Arc::new(SilentDecoder { duration_ms: 35_000, calls: AtomicUsize::new(0) });
        let normalizer = normalizer(transcriber.clone(), decoder.clone(), dir.path());

        let upload = Upload::new("data.xyz", vec![0; 16]);
        let err = normalizer.normalize(&"data.xyz".into(), &upload).await.unwrap_err();

        match err {
            RabbitholeError::UnsupportedMediaKind(ext) => assert_eq!(ext, ".xyz"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }
}
