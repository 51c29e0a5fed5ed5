//! OpenAI-compatible `/moderations` client.

use crate::error::{Result, VoxgateError};
use crate::http::{ApiEndpoint, build_client, describe_failure};
use crate::moderation::moderator::{ModerationCheck, Moderator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, Option<bool>>,
}

#[derive(Debug, Clone)]
pub struct OpenAiModerator {
    client: reqwest::Client,
    endpoint: ApiEndpoint,
    model: String,
}

impl OpenAiModerator {
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

#[async_trait]
impl Moderator for OpenAiModerator {
    async fn check(&self, text: &str) -> Result<ModerationCheck> {
        let response = self
            .endpoint
            .authorize(self.client.post(self.endpoint.url("moderations")))
            .json(&ModerationRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| VoxgateError::ModerationService {
                message: format!("Moderation request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(VoxgateError::ModerationService {
                message: describe_failure(response).await,
            });
        }

        let body: ModerationResponse =
            response
                .json()
                .await
                .map_err(|e| VoxgateError::ModerationService {
                    message: format!("Failed to parse moderation response: {e}"),
                })?;
        let result = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| VoxgateError::ModerationService {
                message: "moderation response has no results".to_string(),
            })?;

        let categories: Vec<String> = result
            .categories
            .into_iter()
            .filter(|(_, hit)| hit.unwrap_or(false))
            .map(|(name, _)| name)
            .collect();
        Ok(ModerationCheck {
            flagged: result.flagged,
            reason: (!categories.is_empty()).then(|| categories.join(", ")),
        })
    }
}
