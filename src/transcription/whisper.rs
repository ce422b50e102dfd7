//! OpenAI Whisper transcription implementation.

use super::Transcriber;
use crate::audio::AudioSegment;
use crate::error::{RabbitholeError, Result};
use crate::openai::create_client;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// OpenAI Whisper-based transcriber.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber with the default model.
    pub fn new() -> Result<Self> {
        Self::with_model("whisper-1")
    }

    /// Create a new Whisper transcriber with a custom model.
    pub fn with_model(model: &str) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            language: None,
        })
    }

    /// Hint the spoken language (ISO-639-1).
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    /// The model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(
        skip(self, segment),
        fields(start_ms = segment.start_offset_ms, end_ms = segment.end_offset_ms)
    )]
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String> {
        let wav = segment.to_wav()?;
        debug!("Sending {} bytes to {}", wav.len(), self.model);

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(AudioInput::from_vec_u8(
                format!("segment_{}.wav", segment.start_offset_ms),
                wav,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::Json);

        if let Some(lang) = &self.language {
            request_builder.language(lang);
        }

        let request = request_builder.build().map_err(|e| {
            RabbitholeError::TranscriptionService(format!("Failed to build request: {}", e))
        })?;

        let response = self.client.audio().transcribe(request).await.map_err(|e| {
            RabbitholeError::TranscriptionService(format!("Whisper API error: {}", e))
        })?;

        let text = response.text.trim().to_string();
        debug!("Transcribed {} chars", text.len());
        Ok(text)
    }
}
