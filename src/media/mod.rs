//! Media normalization: uploads in, ordered text chunks out.
//!
//! An [`Upload`] is classified once into a [`MediaKind`] from its file extension.
//! Document-like uploads have their text extracted directly; audio and video are
//! decoded, segmented and transcribed. Either way the resulting text goes through
//! the same fixed-window [`CharacterSplitter`].

pub mod extract;
mod normalizer;
mod splitter;

pub use normalizer::MediaNormalizer;
pub use splitter::CharacterSplitter;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported plain text extensions.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Supported image extensions (text is recovered with OCR).
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Supported audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "opus", "m4a", "wma", "aiff",
];

/// Supported video file extensions (audio will be extracted).
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpeg", "mpg",
];

/// Identity of one document flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A bounded slice of a document's text. Chunks of one document concatenate,
/// in `sequence_index` order, back into the document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub source_document: DocumentId,
    pub sequence_index: usize,
    pub content: String,
}

/// Raw uploaded content plus the declared file name.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an upload from disk, keeping only the file name.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::new(file_name, bytes))
    }

    /// Classify this upload.
    pub fn kind(&self) -> MediaKind {
        MediaKind::detect(&self.file_name)
    }
}

/// Document-like formats whose text is extracted without transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Docx,
    Image,
}

/// What an upload is, resolved once from its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    DocumentLike(DocumentFormat),
    AudioVideo,
    /// Carries the detected extension (or the whole name when there is none).
    Unsupported(String),
}

impl MediaKind {
    /// Classify a file name by its extension, case-insensitively.
    pub fn detect(file_name: &str) -> Self {
        let Some(ext) = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
        else {
            return MediaKind::Unsupported(file_name.to_string());
        };

        let ext = ext.as_str();
        if TEXT_EXTENSIONS.contains(&ext) {
            MediaKind::DocumentLike(DocumentFormat::PlainText)
        } else if ext == "pdf" {
            MediaKind::DocumentLike(DocumentFormat::Pdf)
        } else if ext == "docx" {
            MediaKind::DocumentLike(DocumentFormat::Docx)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            MediaKind::DocumentLike(DocumentFormat::Image)
        } else if AUDIO_EXTENSIONS.contains(&ext) || VIDEO_EXTENSIONS.contains(&ext) {
            MediaKind::AudioVideo
        } else {
            MediaKind::Unsupported(format!(".{}", ext))
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, MediaKind::Unsupported(_))
    }
}

/// Every extension accepted by [`MediaKind::detect`].
pub fn supported_extensions() -> Vec<&'static str> {
    let mut all: Vec<&'static str> = TEXT_EXTENSIONS
        .iter()
        .chain(&["pdf", "docx"])
        .chain(IMAGE_EXTENSIONS)
        .chain(AUDIO_EXTENSIONS)
        .chain(VIDEO_EXTENSIONS)
        .copied()
        .collect();
    all.sort_unstable();
    all
}
