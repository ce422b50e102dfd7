//! Transcription module for Rabbithole.
//!
//! Turns one bounded-duration [`AudioSegment`] into text. Segmenting a whole
//! recording and stitching the transcripts back together is the media normalizer's
//! job; a [`Transcriber`] only ever sees a single segment.

mod whisper;

pub use whisper::WhisperTranscriber;

use crate::audio::AudioSegment;
use crate::error::Result;
use async_trait::async_trait;

/// Trait for transcription services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a single audio segment.
    ///
    /// Upstream failures are reported as
    /// [`RabbitholeError::TranscriptionService`](crate::error::RabbitholeError::TranscriptionService).
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String>;
}
