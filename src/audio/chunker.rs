//! Time-bounded audio segmentation.
//!
//! Segments start every `target` milliseconds and run for `target × (1 + overlap)`,
//! so consecutive segments share a short overlap and a word spoken across a cut is
//! heard by both transcriptions. Slices shorter than the minimum duration are dropped.

use super::{AudioSegment, AudioTrack};
use crate::config::TranscriptionSettings;
use std::time::Duration;
use tracing::debug;

/// Default target segment length: ten minutes.
pub const DEFAULT_SEGMENT_LENGTH: Duration = Duration::from_secs(10 * 60);

/// Default overlap between consecutive segments, as a fraction of the target length.
pub const DEFAULT_OVERLAP_TOLERANCE: f64 = 0.01;

/// Slices shorter than this are never sent for transcription.
pub const DEFAULT_MIN_SEGMENT: Duration = Duration::from_millis(1000);

/// Splits an [`AudioTrack`] into bounded-duration [`AudioSegment`]s.
#[derive(Debug, Clone)]
pub struct AudioChunker {
    target: Duration,
    overlap_tolerance: f64,
    min_segment: Duration,
}

impl AudioChunker {
    /// Create a chunker with the given target length and default overlap/minimum.
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            overlap_tolerance: DEFAULT_OVERLAP_TOLERANCE,
            min_segment: DEFAULT_MIN_SEGMENT,
        }
    }

    /// Create a chunker from transcription settings.
    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        Self::new(settings.segment_length())
            .with_overlap_tolerance(settings.overlap_tolerance)
            .with_min_segment(Duration::from_millis(settings.min_segment_ms))
    }

    /// Set the overlap fraction. Clamped to `[0, 0.5]`.
    pub fn with_overlap_tolerance(mut self, overlap_tolerance: f64) -> Self {
        self.overlap_tolerance = overlap_tolerance.clamp(0.0, 0.5);
        self
    }

    /// Set the minimum segment duration.
    pub fn with_min_segment(mut self, min_segment: Duration) -> Self {
        self.min_segment = min_segment;
        self
    }

    /// Target segment length.
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Cut `track` into segments, in start-offset order.
    pub fn chunk(&self, track: &AudioTrack) -> Vec<AudioSegment> {
        let total_ms = track.duration_ms();
        if total_ms == 0 {
            return Vec::new();
        }

        let target_ms = self.target.as_millis() as u64;

        // Short audio doesn't need splitting
        if target_ms == 0 || total_ms <= target_ms {
            return vec![track.slice(0, total_ms)];
        }

        let stride_ms = ((target_ms as f64) * (1.0 + self.overlap_tolerance)).round() as u64;
        let min_ms = self.min_segment.as_millis() as u64;

        let mut segments = Vec::new();
        let mut start_ms = 0u64;

        loop {
            let end_ms = (start_ms + stride_ms).min(total_ms);

            if end_ms - start_ms >= min_ms {
                segments.push(track.slice(start_ms, end_ms));
            } else {
                debug!(start_ms, end_ms, "Dropping short audio slice");
            }

            if end_ms >= total_ms {
                break;
            }
            start_ms += target_ms;
        }

        debug!(
            total_ms,
            target_ms,
            segments = segments.len(),
            "Split audio track"
        );
        segments
    }
}

impl Default for AudioChunker {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_LENGTH)
    }
}
