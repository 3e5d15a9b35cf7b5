use crate::error::{CinephileError, Result};
use crate::providers::{CompletionRequest, CompletionResponse, Message, Provider, ProviderInfo, Role, Usage};
use async_trait::async_trait;
use reqwest::Client;

/// Any endpoint speaking the OpenAI chat-completions protocol (OpenAI, OpenRouter)
pub struct OpenAiProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
    info: ProviderInfo,
    key_name: &'static str,
}

impl OpenAiProvider {
    pub fn openai(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            client: Client::new(),
            info: ProviderInfo {
                name: "openai".to_string(),
                display_name: "OpenAI".to_string(),
                default_model: "gpt-4o-mini".to_string(),
            },
            key_name: "OPENAI_API_KEY",
        }
    }

    pub fn openrouter(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            client: Client::new(),
            info: ProviderInfo {
                name: "openrouter".to_string(),
                display_name: "OpenRouter".to_string(),
                default_model: "openrouter/auto".to_string(),
            },
            key_name: "OPENROUTER_API_KEY",
        }
    }

    /// Chat-completions payload. OpenAI reasoning models only accept the
    /// default temperature and take `max_completion_tokens` instead of `max_tokens`.
    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::convert_messages(&request.messages),
        });

        if self.info.name == "openai" && is_reasoning_model(&request.model) {
            if let Some(max_tokens) = request.max_tokens {
                body["max_completion_tokens"] = serde_json::json!(max_tokens);
            }
        } else {
            body["temperature"] = serde_json::json!(request.temperature.unwrap_or(0.7));
            if let Some(max_tokens) = request.max_tokens {
                body["max_tokens"] = serde_json::json!(max_tokens);
            }
        }

        body
    }

    /// The `tool` role needs a `tool_call_id` we do not track, so tool output
    /// is replayed as a user message.
    fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|msg| match (&msg.role, &msg.name) {
                (Role::Tool, Some(name)) => serde_json::json!({
                    "role": "user",
                    "content": format!("[{} result]\n{}", name, msg.content),
                }),
                (Role::Tool, None) => serde_json::json!({
                    "role": "user",
                    "content": msg.content,
                }),
                (role, _) => serde_json::json!({
                    "role": role,
                    "content": msg.content,
                }),
            })
            .collect()
    }
}

/// o-series and gpt-5 reasoning models
fn is_reasoning_model(model: &str) -> bool {
    let bare = model.rsplit('/').next().unwrap_or(model);
    ["o1", "o3", "o4"].iter().any(|p| bare.starts_with(p))
        || (bare.starts_with("gpt-5") && !bare.contains("chat"))
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        self.info.clone()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            CinephileError::Authentication(format!("{} not configured", self.key_name))
        })?;

        let body = self.request_body(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CinephileError::ApiRequest(format!(
                "{} API error ({}): {}",
                self.info.display_name,
                status.as_u16(),
                error_text
            )));
        }

        let data: serde_json::Value = response.json().await?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let finish_reason = data["choices"][0]["finish_reason"]
            .as_str()
            .map(|s| s.to_string());

        let usage = data.get("usage").map(|usage| Usage {
            prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: usage["total_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(CompletionResponse {
            id: data["id"].as_str().unwrap_or("unknown").to_string(),
            model: request.model,
            content,
            finish_reason,
            usage,
        })
    }

    fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }
}
