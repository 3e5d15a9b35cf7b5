use crate::error::{CinephileError, Result};
use crate::providers::{CompletionRequest, CompletionResponse, Message, Provider, ProviderInfo, Role, Usage};
use async_trait::async_trait;
use reqwest::Client;

pub struct ClaudeProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
    version: String,
}

impl ClaudeProvider {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";

    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            client: Client::new(),
            version: "2023-06-01".to_string(),
        }
    }

    pub fn static_info() -> ProviderInfo {
        ProviderInfo {
            name: "anthropic".to_string(),
            display_name: "Claude (Anthropic)".to_string(),
            default_model: "claude-haiku-4-5-20251001".to_string(),
        }
    }

    /// Anthropic only knows `user` and `assistant`; tool output goes back as user text.
    fn convert_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                };
                let content = match (&msg.role, &msg.name) {
                    (Role::Tool, Some(name)) => format!("[{} result]\n{}", name, msg.content),
                    _ => msg.content.clone(),
                };
                serde_json::json!({
                    "role": role,
                    "content": content,
                })
            })
            .collect()
    }

    fn extract_system_message(&self, messages: &[Message]) -> Option<String> {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        }
    }
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn info(&self) -> ProviderInfo {
        Self::static_info()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            CinephileError::Authentication("ANTHROPIC_API_KEY not configured".to_string())
        })?;

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": self.convert_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(1024),
            "temperature": request.temperature.unwrap_or(0.7),
        });

        if let Some(system) = self.extract_system_message(&request.messages) {
            body["system"] = serde_json::json!(system);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.version)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CinephileError::ApiRequest(format!(
                "Claude API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let data: serde_json::Value = response.json().await?;

        let content = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = data["stop_reason"].as_str().map(|s| s.to_string());

        let usage = data.get("usage").map(|usage| {
            let input = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
            let output = usage["output_tokens"].as_u64().unwrap_or(0) as u32;
            Usage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            }
        });

        Ok(CompletionResponse {
            id: data["id"].as_str().unwrap_or("unknown").to_string(),
            model: data["model"].as_str().unwrap_or(&request.model).to_string(),
            content,
            finish_reason,
            usage,
        })
    }

    fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_is_split_out() {
        let provider = ClaudeProvider::new(Some("key".into()), None);
        let messages = vec![
            Message::system("be a cinephile"),
            Message::assistant("hello"),
            Message::user("a space movie"),
        ];

        assert_eq!(
            provider.extract_system_message(&messages).as_deref(),
            Some("be a cinephile")
        );

        let converted = provider.convert_messages(&messages);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0]["role"], "assistant");
        assert_eq!(converted[1]["role"], "user");
        assert_eq!(converted[1]["content"], "a space movie");
    }

    #[test]
    fn test_tool_messages_become_user_text() {
        let provider = ClaudeProvider::new(None, None);
        let converted = provider.convert_messages(&[Message::tool("search_movies", "Interstellar")]);

        assert_eq!(converted[0]["role"], "user");
        assert_eq!(converted[0]["content"], "[search_movies result]\nInterstellar");
    }

    #[tokio::test]
    async fn test_complete_without_key_fails() {
        let provider = ClaudeProvider::new(None, None);
        let request = CompletionRequest {
            model: "claude-haiku-4-5-20251001".into(),
            messages: vec![Message::user("hi")],
            temperature: None,
            max_tokens: None,
        };

        let result = provider.complete(request).await;
        assert!(matches!(result, Err(CinephileError::Authentication(_))));
    }
}
