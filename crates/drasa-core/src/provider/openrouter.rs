use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::{Completion, TokenUsage};
use crate::util::http;

use super::format::WireMessage;
use super::ChatProvider;

/// OpenRouter chat-completions client.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_base: String,
    referer: String,
    title: String,
    temperature: f64,
    max_tokens: u32,
}

/// Entry of the `/models` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context_length: Option<u64>,
}

impl OpenRouterClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: http::client().clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            referer: config.referer.clone(),
            title: config.title.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Check a key against `/auth/key`. Any failure counts as invalid.
    pub async fn validate_api_key(&self, api_key: &str) -> bool {
        let url = format!("{}/auth/key", self.api_base);
        match self.client.get(&url).bearer_auth(api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("API key validation failed: {}", e);
                false
            }
        }
    }

    /// List the models available to `api_key`.
    pub async fn list_models(&self, api_key: &str) -> Result<Vec<ModelInfo>, ProviderError> {
        #[derive(Deserialize)]
        struct ModelList {
            data: Vec<ModelInfo>,
        }

        let url = format!("{}/models", self.api_base);
        let response = self.client.get(&url).bearer_auth(api_key).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: "Failed to fetch models".to_string(),
            });
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(list.data)
    }
}

#[async_trait]
impl ChatProvider for OpenRouterClient {
    async fn send(
        &self,
        messages: &[WireMessage],
        credential: &str,
        model: &str,
    ) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.api_base);

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "top_p": 1,
            "frequency_penalty": 0,
            "presence_penalty": 0,
        });

        debug!(
            "OpenRouter request to {} with model {} ({} messages)",
            url,
            model,
            messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        debug!("OpenRouter response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        if !status.is_success() {
            let data: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message(&data, status),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        parse_completion(&data, model)
    }
}

fn error_message(data: &serde_json::Value, status: StatusCode) -> String {
    data.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
        .unwrap_or_else(|| format!("API request failed: {}", status.as_u16()))
}

/// Parse a chat-completions body. `requested_model` is used only when the
/// provider does not report which model answered.
pub fn parse_completion(
    data: &serde_json::Value,
    requested_model: &str,
) -> Result<Completion, ProviderError> {
    let text = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            ProviderError::MalformedResponse("No message content in response".to_string())
        })?;

    let model = data
        .get("model")
        .and_then(|m| m.as_str())
        .unwrap_or(requested_model);

    let usage = data
        .get("usage")
        .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());
    if let Some(u) = &usage {
        debug!(
            "Token usage for {}: prompt={} completion={} total={}",
            model, u.prompt_tokens, u.completion_tokens, u.total_tokens
        );
    }

    Ok(Completion {
        text: text.to_string(),
        model: model.to_string(),
        usage,
    })
}
