//! Reply generation: turns a moderated transcript into the text to speak.

use crate::error::{Result, VoxgateError};
use crate::http::{ApiEndpoint, build_client, describe_failure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant. \
Answer in one or two short spoken sentences. Do not use markdown, lists or emoji.";

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

/// What a reply generator may know about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    pub session_id: Uuid,
    pub language: String,
    /// Oldest first.
    pub history: Vec<ConversationTurn>,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, context: &ConversationContext, user_text: &str)
    -> Result<String>;
}

#[async_trait]
impl<T: ReplyGenerator + ?Sized> ReplyGenerator for Arc<T> {
    async fn generate_reply(
        &self,
        context: &ConversationContext,
        user_text: &str,
    ) -> Result<String> {
        (**self).generate_reply(context, user_text).await
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` reply generator.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: ApiEndpoint,
    model: String,
    system_prompt: String,
}

impl OpenAiChat {
    pub fn new(
        endpoint: ApiEndpoint,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.system_prompt = prompt;
        }
        self
    }

    fn messages<'a>(
        &'a self,
        context: &'a ConversationContext,
        user_text: &'a str,
    ) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(context.history.len() * 2 + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &self.system_prompt,
        });
        for turn in &context.history {
            messages.push(ChatMessage {
                role: "user",
                content: &turn.user,
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: &turn.assistant,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_text,
        });
        messages
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiChat {
    async fn generate_reply(
        &self,
        context: &ConversationContext,
        user_text: &str,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: self.messages(context, user_text),
        };
        let response = self
            .endpoint
            .authorize(self.client.post(self.endpoint.url("chat/completions")))
            .json(&request)
            .send()
            .await
            .map_err(|e| VoxgateError::ReplyGeneration {
                message: format!("Chat request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(VoxgateError::ReplyGeneration {
                message: describe_failure(response).await,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| VoxgateError::ReplyGeneration {
                message: format!("Failed to parse chat response: {e}"),
            })?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| VoxgateError::ReplyGeneration {
                message: "chat response has no content".to_string(),
            })
    }
}

/// Mock reply generator for testing
#[derive(Debug, Clone)]
pub struct MockReplyGenerator {
    reply: String,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockReplyGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to fail every call
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyGenerator for MockReplyGenerator {
    async fn generate_reply(
        &self,
        _context: &ConversationContext,
        _user_text: &str,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(VoxgateError::ReplyGeneration {
                message: "mock reply failure".to_string(),
            });
        }
        Ok(self.reply.clone())
    }
}
