//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available before a run
//! that would otherwise fail midway, one document at a time.

use crate::error::{RabbitholeError, Result};
use crate::media::{DocumentFormat, MediaKind};
use std::process::Command;

/// What a `dive` run will need, derived from its inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    pub ffmpeg: bool,
    pub tesseract: bool,
}

impl Requirements {
    /// Requirements for processing files with these names.
    pub fn for_files<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names
            .into_iter()
            .fold(Self::default(), |mut req, name| {
                match MediaKind::detect(name) {
                    MediaKind::AudioVideo => req.ffmpeg = true,
                    MediaKind::DocumentLike(DocumentFormat::Image) => req.tesseract = true,
                    _ => {}
                }
                req
            })
    }
}

/// Run pre-flight checks for a `dive` run.
pub fn check(requirements: Requirements) -> Result<()> {
    check_api_key()?;
    if requirements.ffmpeg {
        check_tool("ffmpeg")?;
    }
    if requirements.tesseract {
        check_tool("tesseract")?;
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(RabbitholeError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(RabbitholeError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(RabbitholeError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(RabbitholeError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(RabbitholeError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
