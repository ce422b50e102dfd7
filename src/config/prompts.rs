//! Prompt templates for Rabbithole.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory:
//! `summarize.toml`, `planner.toml` and `chat.toml`, each overriding the matching
//! table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub summarize: SummarizePrompts,
    pub planner: PlannerPrompts,
    pub chat: ChatPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for the map-reduce summary of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizePrompts {
    pub system: String,
    /// Applied to each chunk. Variables: `{{text}}`.
    pub map: String,
    /// Applied to the ordered partial summaries. Variables: `{{summaries}}`.
    pub combine: String,
}

impl Default for SummarizePrompts {
    fn default() -> Self {
        Self {
            system: "You write faithful, compact summaries of study material. Never add facts that are not in the text."
                .to_string(),

            map: r#"Write a concise summary of the following text:

{{text}}

CONCISE SUMMARY:"#
                .to_string(),

            combine: r#"The following are summaries of consecutive parts of one document, in order:

{{summaries}}

Combine them into a single concise summary of the whole document.

CONCISE SUMMARY:"#
                .to_string(),
        }
    }
}

/// Prompts for the cross-document study plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerPrompts {
    pub system: String,
    /// Variables: `{{documents}}`.
    pub user: String,
}

impl Default for PlannerPrompts {
    fn default() -> Self {
        Self {
            system: "You are an experienced professor helping a student plan their studies. You know every subject well and answer factually and logically."
                .to_string(),

            user: r#"I have the following documents with summaries and keywords:

{{documents}}

Create a study plan formatted as follows:

{
    "plan": [
        {
            "Document 1": {
                "Background Concepts": ["Concept 1", "Concept 2", ...],
                "Key Concepts": ["Concept 1", "Concept 2", ...],
                "Further Reading": ["Concept 1", "Concept 2", ...]
            }
        }
        ...
    ]
}

Use the document names exactly as given. Only provide the JSON response and nothing else.
Make sure the JSON is well formed."#
                .to_string(),
        }
    }
}

/// Prompts for the follow-up study chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    /// Variables: `{{context}}` (documents and study plan).
    pub system: String,
    /// First tutor turn shown to the student.
    pub greeting: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a patient tutor. The student is working through the material below, and you helped them draft the study plan at the end.

{{context}}

Answer their questions about this material. When they ask what to study next, point to concepts from the plan. Keep answers short unless asked to go deeper."#
                .to_string(),

            greeting: "Hello, I am here to help you learn more efficiently".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let summarize_path = custom_path.join("summarize.toml");
            if summarize_path.exists() {
                let content = std::fs::read_to_string(&summarize_path)?;
                prompts.summarize = toml::from_str(&content)?;
            }

            let planner_path = custom_path.join("planner.toml");
            if planner_path.exists() {
                let content = std::fs::read_to_string(&planner_path)?;
                prompts.planner = toml::from_str(&content)?;
            }

            let chat_path = custom_path.join("chat.toml");
            if chat_path.exists() {
                let content = std::fs::read_to_string(&chat_path)?;
                prompts.chat = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
