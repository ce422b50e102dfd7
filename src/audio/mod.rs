//! Audio decoding and segmentation.
//!
//! Audio and video uploads are decoded once into an in-memory mono PCM track
//! ([`AudioTrack`]), then cut by the [`AudioChunker`] into bounded-duration
//! [`AudioSegment`]s small enough for the transcription service.

mod chunker;
mod decoder;

pub use chunker::AudioChunker;
pub use decoder::FfmpegDecoder;

use crate::error::Result;
use async_trait::async_trait;
use std::io::Cursor;

/// A decoded mono, 16-bit PCM audio track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    /// Samples per second.
    pub sample_rate: u32,
    /// Mono samples.
    pub samples: Vec<i16>,
}

impl AudioTrack {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// A silent track of the given duration, mostly useful for tests.
    pub fn silent(sample_rate: u32, duration_ms: u64) -> Self {
        let len = (duration_ms * sample_rate as u64 / 1000) as usize;
        Self::new(sample_rate, vec![0; len])
    }

    /// Total duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    fn sample_index(&self, offset_ms: u64) -> usize {
        let index = offset_ms * self.sample_rate as u64 / 1000;
        (index as usize).min(self.samples.len())
    }

    /// Copy `[start_ms, end_ms)` into a new segment.
    pub fn slice(&self, start_ms: u64, end_ms: u64) -> AudioSegment {
        let from = self.sample_index(start_ms);
        let to = self.sample_index(end_ms).max(from);

        let bytes = self.samples[from..to]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        AudioSegment {
            start_offset_ms: start_ms,
            end_offset_ms: end_ms,
            sample_rate: self.sample_rate,
            bytes,
        }
    }
}

/// A bounded-duration slice of an audio track, the unit of transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Offset of the first sample from the start of the track.
    pub start_offset_ms: u64,
    /// Offset just past the last sample. Always greater than `start_offset_ms`.
    pub end_offset_ms: u64,
    /// Sample rate of `bytes`.
    pub sample_rate: u32,
    /// Mono 16-bit little-endian PCM.
    pub bytes: Vec<u8>,
}

impl AudioSegment {
    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_offset_ms - self.start_offset_ms
    }

    /// Encode this segment as a WAV file in memory.
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(self.bytes.len() + 44));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for pair in self.bytes.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }
}

/// Decodes uploaded audio/video bytes into a PCM track.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    /// Decode `bytes`; `file_name` carries the container hint (extension).
    async fn decode(&self, file_name: &str, bytes: &[u8]) -> Result<AudioTrack>;
}
