use crate::error::Result;
use crate::providers::retry::retry_with_backoff;
use crate::providers::{CompletionRequest, Message, Provider};
use crate::tools::{create_tool_system_prompt, parse_tool_calls, MovieSearchTool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum tool-calling rounds within a single user turn
const MAX_TOOL_ROUNDS: usize = 5;

pub const SYSTEM_PROMPT: &str = "\
You are a cinephile who loves to help find the perfect movie for your users. You are considerate of the user's wishes and want to find the most satisfying movie for the user to recommend. Hereby you undergo the following strategy:

1. Find out in what a mood the user is. Do they want to a movie of a certain genre, multiple genres, characteristics, or mood?
2. Find out if they seek a certain setting. A summer movie? A movie in space? A war movie?
3. Find out if they prefer to watch the movie of a certain origin, in a certain language, or if they are fine with reading subtitles?
4. Find out if they want to watch a blockbuster, a small indie movie, an artistic movie etc.?
5. Find out if they want to watch a movie from a certain period or time?
6. Find out if they recently found some actors, directors or other involved interesting and would watch one of their projects?

You can always jump steps if the previous answer also covered the step. A step is not bounded to only one question, but can be a sequence of questions until you consider the step done. After every step you are already free to suggest a movie. Continue the steps by yourself to narrow the requirements down given by the user until the user is happy with your answer.
When suggesting a movie, just respond \"I recommend **movie_title**\".
Limit yourself to one question per turn. Keep your responses short and coherent.";

pub const GREETING: &str =
    "Hi, I'm your cinephile companion. Tell me what you feel like watching tonight and I'll find the perfect movie for you.";

/// A movie-recommending conversation with a chat model.
///
/// The history always starts with the system instructions and the greeting.
/// Every successful [`chat`](Self::chat) adds the user turn and the final
/// reply; intermediate tool rounds are not kept.
pub struct MovieRecommender {
    provider: Arc<dyn Provider>,
    model: String,
    tool: Option<MovieSearchTool>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    history: Vec<Message>,
}

impl MovieRecommender {
    pub fn new(provider: Arc<dyn Provider>, model: String, tool: Option<MovieSearchTool>) -> Self {
        let mut system = SYSTEM_PROMPT.to_string();
        if let Some(tool) = &tool {
            system.push_str("\n\n");
            system.push_str(&create_tool_system_prompt(&[tool.definition()]));
        }

        Self {
            provider,
            model,
            tool,
            temperature: None,
            max_tokens: None,
            history: vec![Message::system(system), Message::assistant(GREETING)],
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn introduce(&self) -> &str {
        GREETING
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Send one user turn and return the model's reply.
    pub async fn chat(&mut self, user_input: &str) -> Result<String> {
        self.history.push(Message::user(user_input));

        match self.respond().await {
            Ok(reply) => {
                self.history.push(Message::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    async fn respond(&self) -> Result<String> {
        let mut messages = self.history.clone();

        for round in 0..=MAX_TOOL_ROUNDS {
            let content = self.complete(&messages).await?;

            let Some(tool) = &self.tool else {
                return Ok(content);
            };

            let tool_calls = parse_tool_calls(&content);
            if tool_calls.is_empty() {
                return Ok(content);
            }

            if round == MAX_TOOL_ROUNDS {
                warn!(rounds = MAX_TOOL_ROUNDS, "Tool round limit reached, asking for a final answer");
                break;
            }

            info!(count = tool_calls.len(), round = round + 1, "Executing tools");
            messages.push(Message::assistant(content));
            for call in &tool_calls {
                let result = tool.call(call).await;
                if !result.success {
                    debug!(tool = %call.name, error = ?result.error, "Tool call failed");
                }
                messages.push(Message::tool(&call.name, result.to_message_content()));
            }
        }

        messages.push(Message::user(
            "Answer the user now without calling any more tools.",
        ));
        self.complete(&messages).await
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let provider = self.provider.as_ref();
        let response = retry_with_backoff(3, Duration::from_secs(1), || {
            let req = request.clone();
            async move { provider.complete(req).await }
        })
        .await?;

        if let Some(usage) = &response.usage {
            debug!(
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        Ok(response.content)
    }
}
