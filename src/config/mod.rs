//! Configuration module for Rabbithole.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ChatPrompts, PlannerPrompts, Prompts, SummarizePrompts};
pub use settings::{
    EmbeddingSettings, GeneralSettings, KeywordSettings, PipelineSettings, PlannerSettings,
    PromptSettings, ReferenceProvider, ReferenceSettings, Settings, SplitterSettings,
    SummarizationSettings, TranscriptionSettings,
};
