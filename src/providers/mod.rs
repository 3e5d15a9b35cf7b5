use crate::config::Settings;
use crate::error::{CinephileError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod claude;
pub mod openai;
pub mod retry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    pub fn new(id: String, model: String, content: String) -> Self {
        Self {
            id,
            model,
            content,
            finish_reason: None,
            usage: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub display_name: String,
    pub default_model: String,
}

/// A hosted chat-completion endpoint
#[async_trait]
pub trait Provider: Send + Sync {
    fn info(&self) -> ProviderInfo;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    fn is_authenticated(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    OpenRouter,
}

/// Provider and bare model id resolved from a configured model name.
///
/// An explicit `provider:model` prefix wins; otherwise the provider is
/// inferred from well-known model name prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    pub kind: ProviderKind,
    pub model: String,
}

impl ModelRoute {
    pub fn parse(model_name: &str) -> Result<Self> {
        let model_name = model_name.trim();
        if model_name.is_empty() {
            return Err(CinephileError::MissingModelName);
        }

        if let Some((prefix, model)) = model_name.split_once(':') {
            let kind = match prefix {
                "anthropic" => Some(ProviderKind::Anthropic),
                "openai" => Some(ProviderKind::OpenAi),
                "openrouter" => Some(ProviderKind::OpenRouter),
                _ => None,
            };
            if let Some(kind) = kind {
                return Ok(Self {
                    kind,
                    model: model.to_string(),
                });
            }
        }

        let kind = if model_name.starts_with("claude") {
            ProviderKind::Anthropic
        } else if ["gpt-", "o1", "o3", "o4", "chatgpt"]
            .iter()
            .any(|p| model_name.starts_with(p))
        {
            ProviderKind::OpenAi
        } else if model_name.contains('/') {
            ProviderKind::OpenRouter
        } else {
            return Err(CinephileError::UnknownModelProvider(model_name.to_string()));
        };

        Ok(Self {
            kind,
            model: model_name.to_string(),
        })
    }
}

/// Build the chat provider for `model_name`, returning it with the bare model id.
pub fn create_provider(
    model_name: &str,
    settings: &Settings,
) -> Result<(Arc<dyn Provider>, String)> {
    let route = ModelRoute::parse(model_name)?;
    let chat = &settings.chat;

    let provider: Arc<dyn Provider> = match route.kind {
        ProviderKind::Anthropic => Arc::new(claude::ClaudeProvider::new(
            chat.anthropic_api_key.clone(),
            chat.base_url.clone(),
        )),
        ProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::openai(
            chat.openai_api_key.clone(),
            chat.base_url.clone(),
        )),
        ProviderKind::OpenRouter => Arc::new(openai::OpenAiProvider::openrouter(
            chat.openrouter_api_key.clone(),
            chat.base_url.clone(),
        )),
    };

    tracing::debug!(provider = %provider.info().name, model = %route.model, "Chat provider created");

    Ok((provider, route.model))
}
