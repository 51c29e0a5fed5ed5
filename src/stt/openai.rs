//! OpenAI-compatible `/audio/transcriptions` recognizer.

use crate::audio::codec::encode_wav;
use crate::error::{Result, VoxgateError};
use crate::http::{ApiEndpoint, build_client, describe_failure};
use crate::stt::recognizer::{SpeechRecognizer, TranscriptionRequest};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiRecognizer {
    client: reqwest::Client,
    endpoint: ApiEndpoint,
    model: String,
}

impl OpenAiRecognizer {
    pub fn new(
        endpoint: ApiEndpoint,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
            model: model.into(),
        })
    }
}

fn service_error(context: &str, e: impl std::fmt::Display) -> VoxgateError {
    VoxgateError::TranscriptionService {
        message: format!("{context}: {e}"),
    }
}

#[async_trait]
impl SpeechRecognizer for OpenAiRecognizer {
    async fn recognize(&self, request: &TranscriptionRequest) -> Result<String> {
        let wav = encode_wav(&request.audio)?;
        let file = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| service_error("Failed to build upload", e))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", request.language.clone())
            .text("temperature", "0")
            .text("response_format", "json");
        if let Some(prompt) = request.prompt.as_deref()
            && !prompt.is_empty()
        {
            form = form.text("prompt", prompt.to_string());
        }

        let response = self
            .endpoint
            .authorize(self.client.post(self.endpoint.url("audio/transcriptions")))
            .multipart(form)
            .send()
            .await
            .map_err(|e| service_error("Transcription request failed", e))?;

        if !response.status().is_success() {
            return Err(VoxgateError::TranscriptionService {
                message: describe_failure(response).await,
            });
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| service_error("Failed to parse transcription response", e))?;
        Ok(body.text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
