//! Chat completion backend shared by the summarizer, the plan aggregator and the
//! study chat.

use crate::error::{RabbitholeError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Who wrote a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("Student"),
            Role::Assistant => f.write_str("Tutor"),
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Answer `user` under the `system` instructions.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Answer the last turn of `history`.
    ///
    /// Models without native multi-turn support see the history as one transcript.
    async fn converse(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        let transcript = history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        self.complete(system, &transcript).await
    }
}

/// OpenAI chat completions.
pub struct OpenAIChat {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAIChat {
    pub fn new(model: &str, temperature: f32) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn request_error(e: impl std::fmt::Display) -> RabbitholeError {
    RabbitholeError::SummarizationService(format!("Failed to build request: {}", e))
}

impl OpenAIChat {
    async fn send(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(request_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            RabbitholeError::SummarizationService(format!("Chat completion failed: {}", e))
        })?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| {
                RabbitholeError::SummarizationService("Empty response from LLM".to_string())
            })?
            .clone();

        debug!("Completion returned {} chars", answer.len());
        Ok(answer)
    }
}

fn system_message(content: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestSystemMessageArgs::default()
        .content(content)
        .build()
        .map_err(request_error)?
        .into())
}

fn turn_message(turn: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    Ok(match turn.role {
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.as_str())
            .build()
            .map_err(request_error)?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.as_str())
            .build()
            .map_err(request_error)?
            .into(),
    })
}

#[async_trait]
impl ChatModel for OpenAIChat {
    #[instrument(skip(self, system, user), fields(model = %self.model, prompt_chars = user.len()))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages = vec![system_message(system)?, turn_message(&ChatMessage::user(user))?];
        self.send(messages).await
    }

    #[instrument(skip(self, system, history), fields(model = %self.model, turns = history.len()))]
    async fn converse(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(system_message(system)?);
        for turn in history {
            messages.push(turn_message(turn)?);
        }
        self.send(messages).await
    }
}
