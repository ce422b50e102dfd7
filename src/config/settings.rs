//! Configuration settings for Rabbithole.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub transcription: TranscriptionSettings,
    pub splitter: SplitterSettings,
    pub embedding: EmbeddingSettings,
    pub reference: ReferenceSettings,
    pub keywords: KeywordSettings,
    pub summarization: SummarizationSettings,
    pub planner: PlannerSettings,
    pub pipeline: PipelineSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.rabbithole".to_string(),
            temp_dir: "/tmp/rabbithole".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Transcription and audio segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Whisper model to use.
    pub model: String,
    /// Target audio segment length, in minutes.
    pub segment_minutes: f64,
    /// Fractional overlap between consecutive segments (0.01 = 1%).
    pub overlap_tolerance: f64,
    /// Segments shorter than this many milliseconds are not transcribed.
    pub min_segment_ms: u64,
    /// Maximum segments transcribed concurrently for one document.
    pub max_concurrent_segments: usize,
    /// Sample rate audio is decoded to before segmentation.
    pub sample_rate: u32,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            segment_minutes: 10.0,
            overlap_tolerance: 0.01,
            min_segment_ms: 1000,
            max_concurrent_segments: 3,
            sample_rate: 16_000,
        }
    }
}

impl TranscriptionSettings {
    /// Target segment length as a duration.
    pub fn segment_length(&self) -> Duration {
        Duration::from_secs_f64((self.segment_minutes * 60.0).max(0.0))
    }
}

/// Text splitter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterSettings {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    pub chunk_overlap: usize,
}

impl Default for SplitterSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions. Must match the reference index.
    pub dimensions: u32,
    /// Texts sent per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 100,
        }
    }
}

/// Reference index provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceProvider {
    #[default]
    Sqlite,
    Memory,
}

impl std::str::FromStr for ReferenceProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(ReferenceProvider::Sqlite),
            "memory" => Ok(ReferenceProvider::Memory),
            _ => Err(format!("Unknown reference provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ReferenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceProvider::Sqlite => write!(f, "sqlite"),
            ReferenceProvider::Memory => write!(f, "memory"),
        }
    }
}

/// Reference (topic) index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSettings {
    /// Index provider (sqlite, memory).
    pub provider: ReferenceProvider,
    /// Path to the SQLite database (for the sqlite provider).
    pub sqlite_path: String,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            provider: ReferenceProvider::Sqlite,
            sqlite_path: "~/.rabbithole/reference.db".to_string(),
        }
    }
}

/// Keyword ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordSettings {
    /// Keywords kept per document.
    pub count: usize,
    /// Neighbors fetched per chunk, as a multiple of `count`.
    pub over_fetch_multiplier: usize,
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            count: 10,
            over_fetch_multiplier: 3,
        }
    }
}

/// Summarization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    /// Chat model used for the map and combine steps.
    pub model: String,
    pub temperature: f32,
    /// Leading chunks of a document fed into the summary.
    pub max_chunks: usize,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.5,
            max_chunks: 3,
        }
    }
}

/// Study plan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Chat model used to draft the plan.
    pub model: String,
    pub temperature: f32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.2,
        }
    }
}

/// Per-call timeout and retry settings for external services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Timeout applied to each external call, in seconds.
    pub call_timeout_seconds: u64,
    /// Total attempts per external call (1 disables retries).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for the retry delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            call_timeout_seconds: 300,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::RabbitholeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rabbithole")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite reference index path.
    pub fn reference_path(&self) -> PathBuf {
        Self::expand_path(&self.reference.sqlite_path)
    }
}
