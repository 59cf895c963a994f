use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::chat::{ChatMessage, ChatModel, ChatRequest};
use crate::config::LlmConfig;
use crate::error::{Result, ScanError};

const SERVICE: &str = "OpenRouter";

pub struct OpenRouterClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    app_title: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CreditsResponse {
    data: Option<CreditsData>,
}

#[derive(Deserialize)]
struct CreditsData {
    total_credits: Option<f64>,
    total_usage: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CreditBalance {
    pub total_credits: f64,
    pub total_usage: f64,
    pub remaining: f64,
}

impl OpenRouterClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            app_title: config.app_title.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Account balance for status display; any failure reads as an empty balance.
    pub async fn credits(&self) -> CreditBalance {
        let Some(api_key) = self.api_key.as_deref() else {
            return CreditBalance::default();
        };

        let response = match self
            .client
            .get(format!("{}/credits", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Credit lookup rejected");
                return CreditBalance::default();
            }
            Err(e) => {
                debug!("Credit lookup failed: {}", e);
                return CreditBalance::default();
            }
        };

        let Ok(body) = response.json::<CreditsResponse>().await else {
            return CreditBalance::default();
        };
        let data = body.data;
        let total_credits = data.as_ref().and_then(|d| d.total_credits).unwrap_or(0.0);
        let total_usage = data.as_ref().and_then(|d| d.total_usage).unwrap_or(0.0);

        CreditBalance {
            total_credits,
            total_usage,
            remaining: (total_credits - total_usage).max(0.0),
        }
    }
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ScanError::MissingCredential("OPENROUTER_API_KEY"))?;

        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: request
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(model = %self.model, json_mode = request.json_mode, "OpenRouter chat request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .header("X-Title", &self.app_title)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("OpenRouter rate limited the request");
            return Err(ScanError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScanError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            ScanError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message: format!("unreadable response: {}", e),
            }
        })?;

        Ok(completion
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default())
    }
}
