//! Fixed-window character splitter.

use super::{DocumentId, TextChunk};
use crate::config::SplitterSettings;

/// Default window length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Splits text into windows of `chunk_size` characters.
///
/// Windows are measured in `char`s, never bytes, so multi-byte text is never cut
/// inside a code point. With zero overlap the chunks concatenate back into the input
/// exactly.
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CharacterSplitter {
    /// Create a splitter. `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_settings(settings: &SplitterSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into windows.
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        let step = self.chunk_size - self.chunk_overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            windows.push(&text[boundaries[start]..boundaries[end]]);
            if end == char_count {
                break;
            }
            start += step;
        }

        windows
    }

    /// Split `text` into chunks attributed to `document`, numbered from zero.
    pub fn split(&self, document: &DocumentId, text: &str) -> Vec<TextChunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(sequence_index, content)| TextChunk {
                source_document: document.clone(),
                sequence_index,
                content: content.to_string(),
            })
            .collect()
    }
}

impl Default for CharacterSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, 0)
    }
}
