//! ffmpeg-backed audio decoding.
//!
//! Uploads are written to a temporary file (ffmpeg needs a seekable input for most
//! containers) and decoded to mono 16-bit little-endian PCM on stdout.

use super::{AudioDecoder, AudioTrack};
use crate::error::{RabbitholeError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Decodes any container ffmpeg understands.
pub struct FfmpegDecoder {
    sample_rate: u32,
    temp_dir: PathBuf,
}

impl FfmpegDecoder {
    /// Create a decoder producing `sample_rate` Hz audio, staging uploads in `temp_dir`.
    pub fn new(sample_rate: u32, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            sample_rate,
            temp_dir: temp_dir.into(),
        }
    }

    /// Decode a file on disk.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn decode_path(&self, path: &Path) -> Result<AudioTrack> {
        let result = Command::new("ffmpeg")
            .arg("-nostdin")
            .arg("-i").arg(path)
            .arg("-vn")
            .arg("-ac").arg("1")
            .arg("-ar").arg(self.sample_rate.to_string())
            .arg("-f").arg("s16le")
            .arg("-loglevel").arg("error")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RabbitholeError::ToolNotFound("ffmpeg".into()));
            }
            Err(e) => {
                return Err(RabbitholeError::ToolFailed(format!("ffmpeg execution failed: {e}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RabbitholeError::ToolFailed(format!("ffmpeg decode failed: {stderr}")));
        }

        let samples = pcm_to_samples(&output.stdout);
        let track = AudioTrack::new(self.sample_rate, samples);
        info!("Decoded {:.1}s of audio", track.duration_ms() as f64 / 1000.0);
        Ok(track)
    }
}

#[async_trait]
impl AudioDecoder for FfmpegDecoder {
    async fn decode(&self, file_name: &str, bytes: &[u8]) -> Result<AudioTrack> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let suffix = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let staged = tempfile::Builder::new()
            .prefix("rabbithole-")
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)?;
        tokio::fs::write(staged.path(), bytes).await?;
        debug!("Staged {} bytes at {:?}", bytes.len(), staged.path());

        // `staged` is removed when dropped, after ffmpeg has finished reading it.
        self.decode_path(staged.path()).await
    }
}

/// Convert little-endian 16-bit PCM bytes into samples, ignoring a trailing odd byte.
fn pcm_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_conversion() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x7f];
        assert_eq!(pcm_to_samples(&bytes), vec![1, -1, i16::MIN]);
    }
}
