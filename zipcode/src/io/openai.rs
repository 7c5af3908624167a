//! OpenAI Responses API backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ProviderError;
use crate::io::provider::CapabilityProvider;

#[derive(Debug, Clone, Serialize)]
struct InputMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: Option<String>,
    role: Option<String>,
    content: Option<Vec<ContentBlock>>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Connection settings for [`OpenAiProvider`].
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Provider that posts to `{base_url}/responses`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiProvider {
    pub fn new(settings: OpenAiSettings) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ProviderError::Transport(format!("build http client: {err}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CapabilityProvider for OpenAiProvider {
    #[instrument(skip_all, fields(model = %self.settings.model))]
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let mut input = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            input.push(InputMessage {
                role: "system",
                content: system_prompt,
            });
        }
        input.push(InputMessage {
            role: "user",
            content: user_prompt,
        });
        let request = ResponsesRequest {
            model: &self.settings.model,
            input,
        };

        debug!(
            system_bytes = system_prompt.len(),
            user_bytes = user_prompt.len(),
            "posting completion request"
        );
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport(format!("read response body: {err}")))?;
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "status {}: {}",
                status.as_u16(),
                truncate(&body, 512)
            )));
        }
        debug!(body_bytes = body.len(), "completion response received");
        extract_output_text(&body)
    }
}

/// Extract the first assistant-authored text block from a Responses body.
pub fn extract_output_text(body: &str) -> Result<String, ProviderError> {
    let parsed: ResponsesBody = serde_json::from_str(body)
        .map_err(|err| ProviderError::Response(format!("parse response body: {err}")))?;

    parsed
        .output
        .iter()
        .filter(|item| is_assistant_message(item))
        .flat_map(|item| item.content.iter().flatten())
        .find_map(|block| match (block.kind.as_str(), block.text.as_deref()) {
            ("output_text" | "text", Some(text)) if !text.trim().is_empty() => {
                Some(text.to_string())
            }
            _ => None,
        })
        .ok_or_else(|| ProviderError::Response("no assistant text in response output".to_string()))
}

fn is_assistant_message(item: &OutputItem) -> bool {
    match item.role.as_deref() {
        Some(role) => role == "assistant",
        None => item.kind.as_deref() == Some("message"),
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
